//! Backend writing messages to standard output.

use async_trait::async_trait;
use std::fmt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{BackendContext, EmailBackend};
use crate::errors::{MailError, MailResult};
use crate::message::EmailMessage;

/// Rendered message followed by a separator line, as written by the
/// console and file backends.
pub(crate) fn framed(message: &EmailMessage) -> MailResult<Vec<u8>> {
    let mut out = message.as_bytes("\n")?;
    out.push(b'\n');
    out.extend_from_slice(&[b'-'; 79]);
    out.push(b'\n');
    Ok(out)
}

/// Writes each message to stdout or to an injected writer.
pub struct ConsoleBackend {
    writer: Option<Box<dyn AsyncWrite + Send + Sync + Unpin>>,
    fail_silently: bool,
}

impl fmt::Debug for ConsoleBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleBackend")
            .field("stdout", &self.writer.is_none())
            .field("fail_silently", &self.fail_silently)
            .finish()
    }
}

impl ConsoleBackend {
    /// Creates a backend writing to stdout.
    pub fn new(ctx: &BackendContext) -> Self {
        Self {
            writer: None,
            fail_silently: ctx.options.fail_silently,
        }
    }

    /// Creates a backend writing to `writer`.
    pub fn with_writer(writer: impl AsyncWrite + Send + Sync + Unpin + 'static) -> Self {
        Self {
            writer: Some(Box::new(writer)),
            fail_silently: false,
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match &mut self.writer {
            Some(writer) => {
                writer.write_all(bytes).await?;
                writer.flush().await
            }
            None => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(bytes).await?;
                stdout.flush().await
            }
        }
    }
}

#[async_trait]
impl EmailBackend for ConsoleBackend {
    fn name(&self) -> &'static str {
        "console"
    }

    fn fail_silently(&self) -> bool {
        self.fail_silently
    }

    async fn deliver(&mut self, message: &EmailMessage) -> MailResult<bool> {
        let bytes = framed(message)?;
        self.write(&bytes)
            .await
            .map_err(|e| MailError::io("Failed to write message to console", e))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailSettings;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_console_output() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let mut backend = ConsoleBackend::with_writer(client);

        let settings = Arc::new(MailSettings::builder().no_tls().build().unwrap());
        let message = EmailMessage::builder(settings)
            .subject("Subject")
            .body("Content")
            .from_email("from@example.com")
            .to(["to@example.com"])
            .build()
            .unwrap();

        assert_eq!(backend.send_messages(&[message]).await.unwrap(), 1);
        drop(backend);

        let mut output = String::new();
        server.read_to_string(&mut output).await.unwrap();
        assert!(output.contains("To: to@example.com"));
        assert!(output.contains("Subject: Subject"));
        assert!(output.ends_with(&format!("\n{}\n", "-".repeat(79))));
    }
}
