//! Backend that discards everything.

use async_trait::async_trait;

use super::{BackendContext, EmailBackend};
use crate::errors::MailResult;
use crate::message::EmailMessage;

/// Reports every message as sent without doing anything.
#[derive(Debug, Default)]
pub struct DummyBackend {
    fail_silently: bool,
}

impl DummyBackend {
    /// Creates a dummy backend.
    pub fn new(ctx: &BackendContext) -> Self {
        Self {
            fail_silently: ctx.options.fail_silently,
        }
    }
}

#[async_trait]
impl EmailBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn fail_silently(&self) -> bool {
        self.fail_silently
    }

    async fn deliver(&mut self, _message: &EmailMessage) -> MailResult<bool> {
        Ok(true)
    }
}
