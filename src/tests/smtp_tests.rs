//! SMTP backend scenarios against the mock server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::backends::{factory, SmtpBackend};
use crate::config::{ConnectionOptions, MailSettings};
use crate::mail::{Mail, SendOptions};
use crate::mocks::{MockConnector, MockTransport};

fn mail_with(settings: MailSettings, connector: &MockConnector) -> Mail {
    let mail = Mail::new(settings).unwrap();
    let connector = connector.clone();
    mail.register_backend(
        "tests.MockSmtpEmailBackend",
        factory(move |ctx| Ok(SmtpBackend::new(ctx)?.with_connector(Arc::new(connector.clone())))),
    )
    .unwrap();
    mail.set_backend("tests.MockSmtpEmailBackend").unwrap();
    mail
}

fn plain_settings() -> MailSettings {
    MailSettings::builder()
        .server("smtp.example.com")
        .no_tls()
        .default_sender("Sender <from@example.com>")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_login_auth_when_only_login_advertised() {
    let transport = MockTransport::new().with_capabilities(&["AUTH LOGIN"]);
    let connector = MockConnector::new(transport);
    let settings = MailSettings::builder()
        .server("smtp.example.com")
        .port(465)
        .credentials("user@example.com", "secret")
        .build()
        .unwrap();
    let mail = mail_with(settings, &connector);

    let sent = mail
        .send_mail("Subject", "Content", None, ["to@example.com"], None, SendOptions::new())
        .await
        .unwrap();
    assert_eq!(sent, 1);

    let commands = connector.transport().commands();
    assert_eq!(commands[1], "AUTH LOGIN");
    assert!(commands[4].starts_with("MAIL FROM:<user@example.com>"));
    assert!(connector.last_params().unwrap().implicit_tls);
    assert!(connector.transport().tls_enabled());
}

#[tokio::test]
async fn test_connection_overrides() {
    let connector = MockConnector::new(MockTransport::new());
    let mail = mail_with(plain_settings(), &connector);

    let connection = mail
        .get_connection(
            None,
            ConnectionOptions::new()
                .host("relay.example.com")
                .port(2525)
                .timeout(Duration::from_secs(3))
                .client_cert("/etc/mail/client.pem", "/etc/mail/client.key")
                .username("relay-user")
                .password("relay-pass"),
        )
        .unwrap();
    connection.open().await.unwrap();

    let params = connector.last_params().unwrap();
    assert_eq!(params.address(), "relay.example.com:2525");
    assert_eq!(params.timeout, Duration::from_secs(3));
    assert_eq!(params.tls.server_name, "relay.example.com");
    assert_eq!(params.tls.client_cert, Some(PathBuf::from("/etc/mail/client.pem")));
    assert_eq!(params.tls.client_key, Some(PathBuf::from("/etc/mail/client.key")));
    assert!(!params.implicit_tls);

    let commands = connector.transport().commands();
    assert!(commands.iter().any(|c| c == "AUTH CRAM-MD5"));
    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_null_sender_and_bcc_envelope() {
    let connector = MockConnector::new(MockTransport::new());
    let mail = mail_with(plain_settings(), &connector);

    let message = mail
        .message()
        .no_sender()
        .subject("Subject")
        .body("Content")
        .to(["to@example.com"])
        .bcc(["Hidden <hidden@example.com>"])
        .build()
        .unwrap();
    assert_eq!(message.send(false).await.unwrap(), 1);

    let commands = connector.transport().commands();
    assert!(commands.iter().any(|c| c.starts_with("MAIL FROM:<> ")));
    assert!(commands.iter().any(|c| c == "RCPT TO:<hidden@example.com>"));

    let data = String::from_utf8(connector.transport().received_data()[0].clone()).unwrap();
    assert!(!data.contains("hidden@example.com"));
}

#[tokio::test]
async fn test_eight_bit_body_and_dot_stuffing() {
    let connector = MockConnector::new(MockTransport::new());
    let mail = mail_with(plain_settings(), &connector);

    mail.send_mail(
        "Grüße",
        "Grüße\n.hidden line\nbye",
        None,
        ["to@example.com"],
        None,
        SendOptions::new(),
    )
    .await
    .unwrap();

    let commands = connector.transport().commands();
    let mail_from = commands.iter().find(|c| c.starts_with("MAIL FROM:")).unwrap();
    assert!(mail_from.ends_with(" BODY=8BITMIME"));

    let data = String::from_utf8(connector.transport().received_data()[0].clone()).unwrap();
    assert!(data.contains("\r\n..hidden line\r\n"));
    assert!(data.contains("Subject: =?utf-8?b?"));
    assert!(data.ends_with("\r\n.\r\n"));
}

#[tokio::test]
async fn test_ehlo_rejected_falls_back_to_helo() {
    let transport = MockTransport::new();
    transport.queue_response(crate::mocks::greeting_response());
    transport.queue_error(502, "Command not implemented");
    let connector = MockConnector::new(transport);
    let mail = mail_with(plain_settings(), &connector);

    let sent = mail
        .send_mail("Subject", "Content", None, ["to@example.com"], None, SendOptions::new())
        .await
        .unwrap();
    assert_eq!(sent, 1);

    let commands = connector.transport().commands();
    assert!(commands[0].starts_with("EHLO "));
    assert!(commands[1].starts_with("HELO "));
    assert_eq!(commands[2], "MAIL FROM:<from@example.com>");
}
