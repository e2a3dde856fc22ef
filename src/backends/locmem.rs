//! In-memory backend for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{BackendContext, EmailBackend};
use crate::errors::MailResult;
use crate::message::EmailMessage;

/// Messages captured by [`LocmemBackend`], shared by every connection of
/// one mailer.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    messages: Arc<Mutex<Vec<EmailMessage>>>,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message.
    pub fn push(&self, message: EmailMessage) {
        self.messages.lock().push(message);
    }

    /// Returns the number of captured messages.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Returns true if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Returns a snapshot of the captured messages, oldest first.
    pub fn messages(&self) -> Vec<EmailMessage> {
        self.messages.lock().clone()
    }

    /// Returns the message at `index`.
    pub fn get(&self, index: usize) -> Option<EmailMessage> {
        self.messages.lock().get(index).cloned()
    }

    /// Drops every captured message.
    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

/// Backend appending messages to an [`Outbox`].
#[derive(Debug)]
pub struct LocmemBackend {
    outbox: Outbox,
    fail_silently: bool,
}

impl LocmemBackend {
    /// Creates a backend writing to the context's outbox.
    pub fn new(ctx: &BackendContext) -> Self {
        Self {
            outbox: ctx.outbox.clone(),
            fail_silently: ctx.options.fail_silently,
        }
    }

    /// Creates a backend writing to a standalone outbox.
    pub fn with_outbox(outbox: Outbox) -> Self {
        Self {
            outbox,
            fail_silently: false,
        }
    }
}

#[async_trait]
impl EmailBackend for LocmemBackend {
    fn name(&self) -> &'static str {
        "locmem"
    }

    fn fail_silently(&self) -> bool {
        self.fail_silently
    }

    async fn deliver(&mut self, message: &EmailMessage) -> MailResult<bool> {
        // Render once so invalid headers fail here as they would on the wire.
        message.message()?;
        self.outbox.push(message.detached());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailSettings;

    fn message(subject: &str) -> EmailMessage {
        let settings = Arc::new(MailSettings::builder().no_tls().build().unwrap());
        EmailMessage::builder(settings)
            .subject(subject)
            .body("Content")
            .from_email("from@example.com")
            .to(["to@example.com"])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_messages_captured_in_order() {
        let outbox = Outbox::new();
        let mut backend = LocmemBackend::with_outbox(outbox.clone());

        let sent = backend
            .send_messages(&[message("first"), message("second")])
            .await
            .unwrap();

        assert_eq!(sent, 2);
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox.get(0).unwrap().subject, "first");
        assert_eq!(outbox.get(1).unwrap().subject, "second");

        outbox.clear();
        assert!(outbox.is_empty());
    }

    #[tokio::test]
    async fn test_bad_header_not_captured() {
        let outbox = Outbox::new();
        let mut backend = LocmemBackend::with_outbox(outbox.clone());

        let err = backend
            .send_messages(&[message("testing\n\r")])
            .await
            .unwrap_err();

        assert!(err.is_bad_header());
        assert!(outbox.is_empty());
    }
}
