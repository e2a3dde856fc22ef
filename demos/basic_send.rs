//! Basic Email Sending Example
//!
//! This example demonstrates how to:
//! - Configure the mailer for an SMTP server
//! - Send a plain text email with `send_mail`
//! - Handle the result

use integrations_mailer::{Mail, MailError, MailSettings, SendOptions};

#[tokio::main]
async fn main() -> Result<(), MailError> {
    let settings = MailSettings::builder()
        .server("smtp.example.com")
        .port(587)
        .use_ssl(false)
        .use_tls(true)
        .credentials("user@example.com", "your-password")
        .default_sender("Sender Name <sender@example.com>")
        .build()?;

    let mail = Mail::new(settings)?;

    println!("Sending email...");
    match mail
        .send_mail(
            "Hello from Rust!",
            "This is a simple text email.\n\nBest regards,\nThe Mail Bot",
            None,
            ["Recipient Name <recipient@example.com>"],
            None,
            SendOptions::new(),
        )
        .await
    {
        Ok(sent) => println!("Sent {} message(s)", sent),
        Err(e) => {
            eprintln!("Failed to send email: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
