//! Delivery backends.
//!
//! Every backend implements [`EmailBackend`]. Callers hold a
//! [`Connection`], a cloneable handle whose mutex serializes batch sends.
//! Backends are looked up by identifier in a [`BackendRegistry`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{ConnectionOptions, MailSettings};
use crate::errors::{MailError, MailResult};
use crate::message::EmailMessage;

pub mod console;
pub mod dummy;
pub mod file;
pub mod locmem;
pub mod smtp;

pub use console::ConsoleBackend;
pub use dummy::DummyBackend;
pub use file::FileBackend;
pub use locmem::{LocmemBackend, Outbox};
pub use smtp::SmtpBackend;

/// Module path the built-in backends are registered under.
pub const BUILTIN_NAMESPACE: &str = "integrations_mailer.backends";

/// Class name assumed when an identifier names only a module.
pub const DEFAULT_BACKEND_CLASS: &str = "EmailBackend";

/// Built-in backend names, in the order error messages list them.
pub const AVAILABLE_BACKENDS: &[&str] = &["console", "dummy", "file", "smtp", "locmem"];

/// Outcome of [`EmailBackend::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opened {
    /// A new underlying session was established.
    Created,
    /// The backend was already open; nothing happened.
    AlreadyOpen,
    /// Opening failed and `fail_silently` swallowed the error. Do not send.
    Suppressed,
}

impl Opened {
    /// Returns true if this call created the session.
    pub fn is_created(&self) -> bool {
        matches!(self, Opened::Created)
    }

    /// Returns true if the open failure was swallowed.
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Opened::Suppressed)
    }
}

/// A delivery backend.
#[async_trait]
pub trait EmailBackend: Send + Sync + fmt::Debug {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Whether transport failures are swallowed.
    fn fail_silently(&self) -> bool;

    /// Opens the underlying session. Idempotent.
    async fn open(&mut self) -> MailResult<Opened> {
        Ok(Opened::AlreadyOpen)
    }

    /// Closes the underlying session. Idempotent.
    async fn close(&mut self) -> MailResult<()> {
        Ok(())
    }

    /// Delivers one message over an open session. Returns false when the
    /// message was skipped.
    async fn deliver(&mut self, message: &EmailMessage) -> MailResult<bool>;

    /// Path of the artifact written by this backend, if any.
    fn output_path(&self) -> Option<PathBuf> {
        None
    }

    /// Sends a batch and returns how many messages were delivered.
    ///
    /// Every message is rendered first, so a bad header fails the whole
    /// batch before any I/O. Opens the session when needed and closes it
    /// again if this call opened it. Under `fail_silently` a transport
    /// failure skips only the message it happened on.
    async fn send_messages(&mut self, messages: &[EmailMessage]) -> MailResult<usize> {
        if messages.is_empty() {
            return Ok(0);
        }

        for message in messages {
            message.message()?;
        }

        let opened = self.open().await?;
        if opened.is_suppressed() {
            return Ok(0);
        }

        let mut sent = 0;
        for message in messages {
            match self.deliver(message).await {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(err) if self.fail_silently() && err.is_suppressible() => {
                    tracing::warn!(backend = self.name(), error = %err, "Suppressed delivery failure");
                }
                Err(err) => {
                    if opened.is_created() {
                        if let Err(close_err) = self.close().await {
                            tracing::debug!(backend = self.name(), error = %close_err, "Close after failure failed");
                        }
                    }
                    return Err(err);
                }
            }
        }

        if opened.is_created() {
            self.close().await?;
        }

        tracing::info!(backend = self.name(), sent, total = messages.len(), "Sent messages");
        Ok(sent)
    }
}

/// Shared handle to a backend instance.
#[derive(Clone)]
pub struct Connection {
    backend: Arc<Mutex<Box<dyn EmailBackend>>>,
    name: &'static str,
    fail_silently: bool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.name)
            .field("fail_silently", &self.fail_silently)
            .finish()
    }
}

impl Connection {
    /// Wraps a backend instance.
    pub fn new(backend: Box<dyn EmailBackend>) -> Self {
        Self {
            name: backend.name(),
            fail_silently: backend.fail_silently(),
            backend: Arc::new(Mutex::new(backend)),
        }
    }

    /// Returns the backend name.
    pub fn backend_name(&self) -> &'static str {
        self.name
    }

    /// Returns whether transport failures are swallowed.
    pub fn fail_silently(&self) -> bool {
        self.fail_silently
    }

    /// Opens the backend session.
    pub async fn open(&self) -> MailResult<Opened> {
        self.backend.lock().await.open().await
    }

    /// Closes the backend session.
    pub async fn close(&self) -> MailResult<()> {
        self.backend.lock().await.close().await
    }

    /// Sends a batch of messages. Concurrent callers are serialized.
    pub async fn send_messages(&self, messages: &[EmailMessage]) -> MailResult<usize> {
        self.backend.lock().await.send_messages(messages).await
    }

    /// Returns the artifact path of a file backend.
    pub async fn output_path(&self) -> Option<PathBuf> {
        self.backend.lock().await.output_path()
    }

    /// Runs `f` with the session open and closes it afterwards, whatever
    /// the outcome.
    pub async fn scoped<F, Fut, T>(&self, f: F) -> MailResult<T>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = MailResult<T>>,
    {
        if let Err(err) = self.open().await {
            if let Err(close_err) = self.close().await {
                tracing::debug!(backend = self.name, error = %close_err, "Close after failed open failed");
            }
            return Err(err);
        }

        let result = f(self.clone()).await;
        let closed = self.close().await;
        let value = result?;
        closed?;
        Ok(value)
    }
}

/// Everything a factory needs to build a backend.
#[derive(Debug, Clone)]
pub struct BackendContext {
    /// Settings snapshot of the facade.
    pub settings: Arc<MailSettings>,
    /// Outbox shared by locmem backends.
    pub outbox: Outbox,
    /// Per-connection flags and overrides.
    pub options: ConnectionOptions,
}

/// Builds a backend for a context.
pub type BackendFactory =
    Arc<dyn Fn(BackendContext) -> MailResult<Box<dyn EmailBackend>> + Send + Sync>;

/// Wraps a typed constructor into a [`BackendFactory`].
pub fn factory<B, F>(build: F) -> BackendFactory
where
    B: EmailBackend + 'static,
    F: Fn(&BackendContext) -> MailResult<B> + Send + Sync + 'static,
{
    Arc::new(move |ctx: BackendContext| -> MailResult<Box<dyn EmailBackend>> {
        Ok(Box::new(build(&ctx)?))
    })
}

/// How a caller picks a backend.
pub enum BackendSpec {
    /// Identifier resolved through the registry.
    Path(String),
    /// Factory invoked with the connection context.
    Factory(BackendFactory),
    /// Ready-made instance.
    Instance(Box<dyn EmailBackend>),
}

impl fmt::Debug for BackendSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendSpec::Path(path) => f.debug_tuple("Path").field(path).finish(),
            BackendSpec::Factory(_) => f.write_str("Factory(..)"),
            BackendSpec::Instance(backend) => f.debug_tuple("Instance").field(backend).finish(),
        }
    }
}

impl From<&str> for BackendSpec {
    fn from(path: &str) -> Self {
        BackendSpec::Path(path.to_string())
    }
}

impl From<String> for BackendSpec {
    fn from(path: String) -> Self {
        BackendSpec::Path(path)
    }
}

/// Canonical `module.Class` form of a backend identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendPath {
    /// Dotted module path.
    pub module: String,
    /// Class name.
    pub class: String,
}

impl BackendPath {
    /// Parses an identifier.
    ///
    /// A bare name maps into the built-in namespace, a dotted path ending
    /// in `EmailBackend` names module and class, and any other dotted path
    /// names a module with the default class. `::` works like `.`.
    pub fn parse(identifier: &str) -> MailResult<Self> {
        let normalized = identifier.trim().replace("::", ".");
        if normalized.is_empty() || normalized.split('.').any(str::is_empty) {
            return Err(resolution_error(identifier));
        }

        match normalized.rsplit_once('.') {
            None => Ok(Self {
                module: format!("{}.{}", BUILTIN_NAMESPACE, normalized),
                class: DEFAULT_BACKEND_CLASS.to_string(),
            }),
            Some((module, class)) if class.ends_with(DEFAULT_BACKEND_CLASS) => Ok(Self {
                module: module.to_string(),
                class: class.to_string(),
            }),
            Some(_) => Ok(Self {
                module: normalized,
                class: DEFAULT_BACKEND_CLASS.to_string(),
            }),
        }
    }

    /// Returns the registry key.
    pub fn key(&self) -> String {
        format!("{}.{}", self.module, self.class)
    }
}

fn resolution_error(identifier: &str) -> MailError {
    MailError::backend_resolution(format!(
        "Unable to import backend: {}. The available built-in mail backends are: {}",
        identifier,
        AVAILABLE_BACKENDS.join(", ")
    ))
}

/// Maps backend identifiers to factories.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.factories.keys().collect();
        keys.sort();
        f.debug_struct("BackendRegistry").field("backends", &keys).finish()
    }
}

impl BackendRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in backends.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, BackendFactory); 5] = [
            ("console", factory(|ctx| Ok(ConsoleBackend::new(ctx)))),
            ("dummy", factory(|ctx| Ok(DummyBackend::new(ctx)))),
            ("file", factory(FileBackend::new)),
            ("smtp", factory(SmtpBackend::new)),
            ("locmem", factory(|ctx| Ok(LocmemBackend::new(ctx)))),
        ];
        for (name, factory) in builtins {
            let path = BackendPath {
                module: format!("{}.{}", BUILTIN_NAMESPACE, name),
                class: DEFAULT_BACKEND_CLASS.to_string(),
            };
            registry.factories.insert(path.key(), factory);
        }
        registry
    }

    /// Registers a factory under an identifier.
    pub fn register(&mut self, identifier: &str, factory: BackendFactory) -> MailResult<()> {
        let path = BackendPath::parse(identifier)?;
        tracing::debug!(backend = %path.key(), "Registered mail backend");
        self.factories.insert(path.key(), factory);
        Ok(())
    }

    /// Returns true if the identifier resolves.
    pub fn contains(&self, identifier: &str) -> bool {
        BackendPath::parse(identifier)
            .map(|path| self.factories.contains_key(&path.key()))
            .unwrap_or(false)
    }

    /// Looks up the factory for an identifier.
    pub fn resolve(&self, identifier: &str) -> MailResult<BackendFactory> {
        let path = BackendPath::parse(identifier)?;
        self.factories
            .get(&path.key())
            .cloned()
            .ok_or_else(|| resolution_error(identifier))
    }

    /// Builds a backend from a spec.
    pub fn build(&self, spec: BackendSpec, context: BackendContext) -> MailResult<Box<dyn EmailBackend>> {
        match spec {
            BackendSpec::Path(identifier) => (self.resolve(&identifier)?)(context),
            BackendSpec::Factory(factory) => factory(context),
            BackendSpec::Instance(backend) => Ok(backend),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MailErrorKind;
    use rstest::rstest;

    #[rstest]
    #[case("locmem", "integrations_mailer.backends.locmem.EmailBackend")]
    #[case("integrations_mailer.backends.locmem", "integrations_mailer.backends.locmem.EmailBackend")]
    #[case(
        "integrations_mailer.backends.locmem.EmailBackend",
        "integrations_mailer.backends.locmem.EmailBackend"
    )]
    #[case("integrations_mailer::backends::smtp", "integrations_mailer.backends.smtp.EmailBackend")]
    #[case("myapp.mail.QueueEmailBackend", "myapp.mail.QueueEmailBackend")]
    fn test_backend_path_grammar(#[case] identifier: &str, #[case] key: &str) {
        assert_eq!(BackendPath::parse(identifier).unwrap().key(), key);
    }

    #[rstest]
    #[case("")]
    #[case("a..b")]
    #[case("trailing.")]
    fn test_backend_path_rejects_malformed(#[case] identifier: &str) {
        let err = BackendPath::parse(identifier).unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::BackendResolution);
    }

    #[test]
    fn test_unknown_backend_lists_builtins() {
        let registry = BackendRegistry::with_builtins();
        let err = match registry.resolve("unknown") {
            Ok(_) => panic!("unknown backend resolved"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), MailErrorKind::BackendResolution);
        assert!(err
            .message()
            .contains("The available built-in mail backends are: console, dummy, file, smtp, locmem"));
    }

    #[test]
    fn test_builtins_registered() {
        let registry = BackendRegistry::with_builtins();
        for name in AVAILABLE_BACKENDS {
            assert!(registry.contains(name), "{} missing", name);
        }
        assert!(!registry.contains("sendgrid"));
    }

    #[test]
    fn test_opened_flags() {
        assert!(Opened::Created.is_created());
        assert!(!Opened::AlreadyOpen.is_created());
        assert!(Opened::Suppressed.is_suppressed());
    }
}
