//! Connection lifecycle tests.

use std::sync::Arc;

use crate::backends::{BackendSpec, Opened, SmtpBackend};
use crate::config::{ConnectionOptions, MailSettings};
use crate::errors::{MailError, MailErrorKind};
use crate::mail::Mail;
use crate::message::EmailMessage;
use crate::mocks::{MockConnector, MockTransport};

fn mail(backend: &str) -> Mail {
    Mail::new(
        MailSettings::builder()
            .no_tls()
            .backend(backend)
            .default_sender("from@example.com")
            .build()
            .unwrap(),
    )
    .unwrap()
}

fn message(mail: &Mail, subject: &str) -> EmailMessage {
    mail.message()
        .subject(subject)
        .body("Content")
        .to(["to@example.com"])
        .build()
        .unwrap()
}

fn smtp_connection(mail: &Mail, connector: &MockConnector) -> crate::backends::Connection {
    let backend = SmtpBackend::with_settings(MailSettings::clone(&mail.settings()))
        .unwrap()
        .with_connector(Arc::new(connector.clone()));
    mail.get_connection(
        Some(BackendSpec::Instance(Box::new(backend))),
        ConnectionOptions::new(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_reused_connection() {
    let mail = mail("locmem");
    let connection = mail.get_connection(None, ConnectionOptions::new()).unwrap();

    let mut first = message(&mail, "first");
    first.set_connection(Some(connection.clone()));
    let mut second = message(&mail, "second");
    second.set_connection(Some(connection.clone()));

    assert_eq!(first.send(false).await.unwrap(), 1);
    assert_eq!(second.send(false).await.unwrap(), 1);
    assert_eq!(mail.outbox().len(), 2);
}

#[tokio::test]
async fn test_ten_messages_one_batch() {
    let mail = mail("locmem");
    let connection = mail.get_connection(None, ConnectionOptions::new()).unwrap();
    let messages: Vec<_> = (0..10)
        .map(|i| message(&mail, &format!("Message {}", i)))
        .collect();

    assert_eq!(connection.send_messages(&messages).await.unwrap(), 10);
    let outbox = mail.outbox();
    assert_eq!(outbox.len(), 10);
    assert_eq!(outbox.get(9).unwrap().subject, "Message 9");
}

#[tokio::test]
async fn test_batch_with_bad_header_delivers_nothing() {
    let mail = mail("locmem");
    let connection = mail.get_connection(None, ConnectionOptions::new()).unwrap();
    let mut bad = message(&mail, "second");
    bad.subject = "second\nBcc: victim@example.com".to_string();

    let err = connection
        .send_messages(&[message(&mail, "first"), bad])
        .await
        .unwrap_err();
    assert!(err.is_bad_header());
    assert!(mail.outbox().is_empty());
}

#[tokio::test]
async fn test_smtp_batch_with_bad_header_never_connects() {
    let mail = mail("smtp");
    let connector = MockConnector::new(MockTransport::new());
    let connection = smtp_connection(&mail, &connector);
    let mut bad = message(&mail, "second");
    bad.subject = "second\r\nX-Injected: yes".to_string();

    let err = connection
        .send_messages(&[message(&mail, "first"), bad])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), MailErrorKind::BadHeader);
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn test_explicit_open_stays_open() {
    let mail = mail("smtp");
    let connector = MockConnector::new(MockTransport::new());
    let connection = smtp_connection(&mail, &connector);

    assert_eq!(connection.open().await.unwrap(), Opened::Created);
    assert_eq!(connection.open().await.unwrap(), Opened::AlreadyOpen);

    let messages = [message(&mail, "a"), message(&mail, "b"), message(&mail, "c")];
    assert_eq!(connection.send_messages(&messages).await.unwrap(), 3);
    assert_eq!(connection.send_messages(&messages[..1]).await.unwrap(), 1);

    assert_eq!(connector.connect_count(), 1);
    assert!(!connector.transport().commands().contains(&"QUIT".to_string()));

    connection.close().await.unwrap();
    connection.close().await.unwrap();
    let quits = connector
        .transport()
        .commands()
        .iter()
        .filter(|c| *c == "QUIT")
        .count();
    assert_eq!(quits, 1);
    assert_eq!(connector.transport().received_data().len(), 4);
}

#[tokio::test]
async fn test_implicit_open_closes() {
    let mail = mail("smtp");
    let connector = MockConnector::new(MockTransport::new());
    let connection = smtp_connection(&mail, &connector);

    connection.send_messages(&[message(&mail, "a")]).await.unwrap();
    connection.send_messages(&[message(&mail, "b")]).await.unwrap();

    assert_eq!(connector.connect_count(), 2);
    let quits = connector
        .transport()
        .commands()
        .iter()
        .filter(|c| *c == "QUIT")
        .count();
    assert_eq!(quits, 2);
}

#[tokio::test]
async fn test_scoped_closes_on_success_and_error() {
    let mail = mail("smtp");
    let connector = MockConnector::new(MockTransport::new());
    let connection = smtp_connection(&mail, &connector);

    let msg = message(&mail, "scoped");
    let sent = connection
        .scoped(|conn| async move {
            let first = conn.send_messages(std::slice::from_ref(&msg)).await?;
            let second = conn.send_messages(std::slice::from_ref(&msg)).await?;
            Ok(first + second)
        })
        .await
        .unwrap();
    assert_eq!(sent, 2);
    assert_eq!(connector.connect_count(), 1);

    let result: Result<(), MailError> = connection
        .scoped(|_| async { Err(MailError::new(MailErrorKind::Unknown, "caller failure")) })
        .await;
    assert_eq!(result.unwrap_err().kind(), MailErrorKind::Unknown);

    let quits = connector
        .transport()
        .commands()
        .iter()
        .filter(|c| *c == "QUIT")
        .count();
    assert_eq!(quits, 2);
}

#[tokio::test]
async fn test_scoped_open_failure() {
    let mail = mail("smtp");
    let connector = MockConnector::failing(MailErrorKind::ConnectionRefused);
    let connection = smtp_connection(&mail, &connector);

    let err = connection
        .scoped(|_| async { Ok(()) })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), MailErrorKind::ConnectionRefused);
}

#[tokio::test]
async fn test_concurrent_sends_share_connection() {
    let mail = mail("smtp");
    let connector = MockConnector::new(MockTransport::new());
    let connection = smtp_connection(&mail, &connector);
    connection.open().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let connection = connection.clone();
        let msg = message(&mail, &format!("Concurrent {}", i));
        handles.push(tokio::spawn(async move {
            connection.send_messages(&[msg]).await
        }));
    }

    let results = futures::future::join_all(handles).await;
    let sent: usize = results.into_iter().map(|r| r.unwrap().unwrap()).sum();
    assert_eq!(sent, 8);

    // Each transaction stays contiguous: MAIL, RCPT, DATA.
    let commands = connector.transport().commands();
    let transactions: Vec<_> = commands.iter().skip_while(|c| c.starts_with("EHLO")).collect();
    for chunk in transactions.chunks(3) {
        assert!(chunk[0].starts_with("MAIL FROM:"));
        assert!(chunk[1].starts_with("RCPT TO:"));
        assert_eq!(chunk[2], "DATA");
    }
    connection.close().await.unwrap();
}
