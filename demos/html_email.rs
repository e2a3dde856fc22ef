//! HTML Email Example
//!
//! This example demonstrates how to:
//! - Send a text body with an HTML alternative
//! - Build a message by hand with cc, reply-to and custom headers
//! - Print the rendered message with the console backend

use integrations_mailer::{Mail, MailError, MailSettings, SendOptions};

#[tokio::main]
async fn main() -> Result<(), MailError> {
    let settings = MailSettings::builder()
        .backend("console")
        .default_sender("Newsletter <news@example.com>")
        .build()?;
    let mail = Mail::new(settings)?;

    let text_body = "Welcome aboard!\n\nVisit https://example.com to get started.";
    let html_body = r#"<html>
<body>
  <h1>Welcome aboard!</h1>
  <p>Visit <a href="https://example.com">example.com</a> to get started.</p>
</body>
</html>"#;

    // send_mail attaches the HTML body as a text/html alternative.
    let sent = mail
        .send_mail(
            "Welcome",
            text_body,
            None,
            ["reader@example.com"],
            Some(html_body),
            SendOptions::new(),
        )
        .await?;
    println!("Sent {} message(s)", sent);

    let message = mail
        .message()
        .subject("Weekly digest \u{2013} issue 42")
        .body(text_body)
        .to(["reader@example.com"])
        .cc(["archive@example.com"])
        .reply_to(["editors@example.com"])
        .header("X-Campaign", "digest-42")
        .alternative(html_body, "text/html")
        .build()?;
    message.send(false).await?;

    Ok(())
}
