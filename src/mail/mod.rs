//! Dispatch facade.
//!
//! [`Mail`] owns the settings, the backend registry and the locmem
//! outbox. It hands out connections and implements the one-call helpers
//! [`send_mail`](Mail::send_mail) and [`send_mass_mail`](Mail::send_mass_mail).

use parking_lot::RwLock;
use secrecy::SecretString;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backends::{
    BackendContext, BackendFactory, BackendRegistry, BackendSpec, Connection, Outbox,
};
use crate::config::{ConnectionOptions, MailSettings};
use crate::errors::MailResult;
use crate::message::{EmailMessage, EmailMessageBuilder};

/// Options shared by [`Mail::send_mail`] and [`Mail::send_mass_mail`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Swallow transport failures.
    pub fail_silently: bool,
    /// Username override for a newly created connection.
    pub auth_user: Option<String>,
    /// Password override for a newly created connection.
    pub auth_password: Option<SecretString>,
    /// Connection to reuse instead of creating one.
    pub connection: Option<Connection>,
}

impl SendOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `fail_silently`.
    pub fn fail_silently(mut self, enabled: bool) -> Self {
        self.fail_silently = enabled;
        self
    }

    /// Sets the credentials used for a new connection.
    pub fn auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_user = Some(user.into());
        self.auth_password = Some(SecretString::new(password.into()));
        self
    }

    /// Reuses an existing connection.
    pub fn connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            fail_silently: self.fail_silently,
            username: self.auth_user.clone(),
            password: self.auth_password.clone(),
            ..ConnectionOptions::default()
        }
    }
}

/// One item of [`Mail::send_mass_mail`].
#[derive(Debug, Clone)]
pub struct MassMessage {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub message: String,
    /// Sender; `None` uses the default sender.
    pub from_email: Option<String>,
    /// Recipients.
    pub recipients: Vec<String>,
}

impl<S, M, R> From<(S, M, Option<&str>, R)> for MassMessage
where
    S: Into<String>,
    M: Into<String>,
    R: IntoIterator,
    R::Item: Into<String>,
{
    fn from((subject, message, from_email, recipients): (S, M, Option<&str>, R)) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
            from_email: from_email.map(str::to_string),
            recipients: recipients.into_iter().map(Into::into).collect(),
        }
    }
}

struct MailInner {
    settings: RwLock<Arc<MailSettings>>,
    registry: RwLock<BackendRegistry>,
    outbox: Outbox,
}

/// Mail dispatch facade. Cheap to clone.
#[derive(Clone)]
pub struct Mail {
    inner: Arc<MailInner>,
}

impl fmt::Debug for Mail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mail")
            .field("backend", &self.inner.settings.read().backend)
            .field("outbox", &self.inner.outbox.len())
            .finish()
    }
}

impl Mail {
    /// Creates a facade with the built-in backends registered.
    ///
    /// The username becomes the default sender when none is configured.
    pub fn new(mut settings: MailSettings) -> MailResult<Self> {
        settings.resolve_default_sender();
        settings.validate()?;
        tracing::debug!(backend = %settings.backend, server = %settings.address(), "Mail initialized");
        Ok(Self {
            inner: Arc::new(MailInner {
                settings: RwLock::new(Arc::new(settings)),
                registry: RwLock::new(BackendRegistry::with_builtins()),
                outbox: Outbox::new(),
            }),
        })
    }

    /// Returns the current settings snapshot.
    pub fn settings(&self) -> Arc<MailSettings> {
        self.inner.settings.read().clone()
    }

    /// Applies `f` to a copy of the settings and installs it if it
    /// validates. Messages and connections created earlier keep their
    /// snapshot.
    pub fn update_settings(&self, f: impl FnOnce(&mut MailSettings)) -> MailResult<()> {
        let mut settings = MailSettings::clone(&self.settings());
        f(&mut settings);
        settings.validate()?;
        *self.inner.settings.write() = Arc::new(settings);
        Ok(())
    }

    /// Selects the backend used when none is given.
    pub fn set_backend(&self, backend: impl Into<String>) -> MailResult<()> {
        let backend = backend.into();
        self.update_settings(|s| s.backend = backend)
    }

    /// Replaces the default sender.
    pub fn set_default_sender(&self, sender: Option<&str>) -> MailResult<()> {
        let sender = sender.map(str::to_string);
        self.update_settings(|s| s.default_sender = sender)
    }

    /// Sets the directory of the file backend.
    pub fn set_file_path(&self, path: impl Into<PathBuf>) -> MailResult<()> {
        let path = path.into();
        self.update_settings(|s| s.file_path = Some(path))
    }

    /// Registers a custom backend under a dotted path.
    pub fn register_backend(&self, path: &str, factory: BackendFactory) -> MailResult<()> {
        self.inner.registry.write().register(path, factory)
    }

    /// Returns the outbox filled by the locmem backend.
    pub fn outbox(&self) -> Outbox {
        self.inner.outbox.clone()
    }

    /// Starts a message bound to this facade.
    pub fn message(&self) -> EmailMessageBuilder {
        EmailMessageBuilder::new(self.settings()).mail(self.clone())
    }

    /// Creates a connection to `backend`, or to the configured backend.
    pub fn get_connection(
        &self,
        backend: Option<BackendSpec>,
        options: ConnectionOptions,
    ) -> MailResult<Connection> {
        let settings = self.settings();
        let spec = backend.unwrap_or_else(|| BackendSpec::Path(settings.backend.clone()));
        let context = BackendContext {
            settings,
            outbox: self.outbox(),
            options,
        };
        let backend = self.inner.registry.read().build(spec, context)?;
        tracing::debug!(backend = backend.name(), "Created mail connection");
        Ok(Connection::new(backend))
    }

    /// Sends one message and returns how many were delivered (0 or 1).
    ///
    /// `html_message` is attached as a `text/html` alternative.
    pub async fn send_mail<I, S>(
        &self,
        subject: &str,
        message: &str,
        from_email: Option<&str>,
        recipient_list: I,
        html_message: Option<&str>,
        options: SendOptions,
    ) -> MailResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let connection = match &options.connection {
            Some(connection) => connection.clone(),
            None => self.get_connection(None, options.connection_options())?,
        };

        let mut builder = self
            .message()
            .subject(subject)
            .body(message)
            .sender(from_email)
            .to(recipient_list)
            .connection(connection);
        if let Some(html) = html_message.filter(|html| !html.is_empty()) {
            builder = builder.alternative(html, "text/html");
        }

        builder.build()?.send(options.fail_silently).await
    }

    /// Sends one message per item over a single connection and returns the
    /// total delivered.
    pub async fn send_mass_mail<I, T>(&self, items: I, options: SendOptions) -> MailResult<usize>
    where
        I: IntoIterator<Item = T>,
        T: Into<MassMessage>,
    {
        let connection = match &options.connection {
            Some(connection) => connection.clone(),
            None => self.get_connection(None, options.connection_options())?,
        };

        let messages = items
            .into_iter()
            .map(|item| {
                let item = item.into();
                self.message()
                    .subject(item.subject)
                    .body(item.message)
                    .sender(item.from_email)
                    .to(item.recipients)
                    .connection(connection.clone())
                    .build()
            })
            .collect::<MailResult<Vec<EmailMessage>>>()?;

        for message in &messages {
            message.message()?;
        }

        connection.send_messages(&messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MailErrorKind;

    fn mail() -> Mail {
        Mail::new(
            MailSettings::builder()
                .no_tls()
                .backend("locmem")
                .default_sender("from@example.com")
                .build()
                .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_username_becomes_default_sender() {
        let mut settings = MailSettings::default();
        settings.use_ssl = false;
        settings.username = Some("user@example.com".to_string());
        let mail = Mail::new(settings).unwrap();
        assert_eq!(
            mail.settings().default_sender.as_deref(),
            Some("user@example.com")
        );
    }

    #[test]
    fn test_invalid_update_rejected() {
        let mail = mail();
        let err = mail
            .update_settings(|s| {
                s.use_tls = true;
                s.use_ssl = true;
            })
            .unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::ConfigurationInvalid);
        assert!(!mail.settings().use_tls);
    }

    #[test]
    fn test_mass_message_from_tuple() {
        let item: MassMessage = ("Subject", "Body", Some("a@example.com"), ["b@example.com"]).into();
        assert_eq!(item.from_email.as_deref(), Some("a@example.com"));
        assert_eq!(item.recipients, vec!["b@example.com"]);
    }

    #[tokio::test]
    async fn test_send_mail_with_html() {
        let mail = mail();
        let sent = mail
            .send_mail(
                "Subject",
                "Content",
                None,
                ["to@example.com"],
                Some("<p>Content</p>"),
                SendOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(sent, 1);
        let message = mail.outbox().get(0).unwrap();
        assert_eq!(message.from_email.as_deref(), Some("from@example.com"));
        assert_eq!(message.alternatives.len(), 1);
        assert_eq!(message.alternatives[0].mimetype, "text/html");
    }
}
