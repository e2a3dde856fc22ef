//! Connection Reuse Example
//!
//! This example demonstrates how to:
//! - Open one SMTP session and send several batches over it
//! - Use `scoped` so the session is closed even when a send fails
//! - Send a batch with `send_mass_mail`

use integrations_mailer::{ConnectionOptions, Mail, MailError, MailSettings, SendOptions};

#[tokio::main]
async fn main() -> Result<(), MailError> {
    let settings = MailSettings::builder()
        .server("smtp.example.com")
        .port(465)
        .credentials("user@example.com", "your-password")
        .build()?;
    let mail = Mail::new(settings)?;

    let connection = mail.get_connection(None, ConnectionOptions::new())?;

    let messages = (1..=5)
        .map(|i| {
            mail.message()
                .subject(format!("Notification {}", i))
                .body(format!("This is notification number {}.", i))
                .to([format!("user{}@example.com", i)])
                .build()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let sent = connection
        .scoped(|conn| async move {
            let mut sent = 0;
            for chunk in messages.chunks(2) {
                sent += conn.send_messages(chunk).await?;
            }
            Ok(sent)
        })
        .await?;
    println!("Sent {} message(s) over one session", sent);

    let sent = mail
        .send_mass_mail(
            [
                ("Hello", "First message", None, vec!["a@example.com"]),
                ("Hello", "Second message", None, vec!["b@example.com"]),
            ],
            SendOptions::new().connection(connection),
        )
        .await?;
    println!("Sent {} message(s) with send_mass_mail", sent);

    Ok(())
}
