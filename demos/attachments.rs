//! Email with Attachments Example
//!
//! This example demonstrates how to:
//! - Attach in-memory content with a guessed or explicit mimetype
//! - Attach a file read from disk
//! - Write the result to a directory with the file backend

use integrations_mailer::{Attachment, Mail, MailError, MailSettings};

#[tokio::main]
async fn main() -> Result<(), MailError> {
    let settings = MailSettings::builder()
        .backend("file")
        .file_path(std::env::temp_dir().join("mailer-demo"))
        .default_sender("reports@example.com")
        .build()?;
    let mail = Mail::new(settings)?;

    let csv = "region,sales\nnorth,120\nsouth,95\n";

    let mut message = mail
        .message()
        .subject("Monthly Report")
        .body("Please find the monthly report attached.")
        .to(["team@example.com"])
        .attachment(Attachment::new("report.csv", csv, None))
        .attachment(Attachment::new(
            "summary.txt",
            "Sales are up 4% month over month.",
            Some("text/plain"),
        ))
        .build()?;

    if let Ok(path) = std::env::current_dir().map(|d| d.join("Cargo.toml")) {
        message.attach_file(path, Some("text/plain")).await?;
    }

    let connection = mail.get_connection(None, Default::default())?;
    message.set_connection(Some(connection.clone()));
    let sent = message.send(false).await?;

    println!("Sent {} message(s)", sent);
    if let Some(path) = connection.output_path().await {
        println!("Written to {}", path.display());
    }

    Ok(())
}
