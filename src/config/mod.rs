//! Configuration types for the mailer.
//!
//! Provides [`MailSettings`], the settings snapshot shared by messages and
//! backends, a builder for it, and [`ConnectionOptions`] for per-connection
//! overrides:
//! - Server connection settings
//! - TLS/SSL selection and client certificates
//! - Authentication credentials
//! - Default sender and charset
//! - Backend selection and file backend output directory

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{MailError, MailResult};

/// Default SMTP port.
pub const DEFAULT_PORT: u16 = 25;

/// Default charset for message bodies and encoded headers.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Default backend identifier.
pub const DEFAULT_BACKEND: &str = "smtp";

/// Default SMTP timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default host name for EHLO and Message-ID domains.
pub const DEFAULT_LOCAL_HOSTNAME: &str = "localhost";

/// Mail settings snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailSettings {
    /// SMTP server hostname.
    #[serde(default = "default_server")]
    pub server: String,
    /// SMTP server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Authentication username.
    #[serde(default)]
    pub username: Option<String>,
    /// Authentication password (serialization skipped for security).
    #[serde(default, skip_serializing)]
    pub password: Option<SecretString>,
    /// Upgrade the connection with STARTTLS.
    #[serde(default)]
    pub use_tls: bool,
    /// Connect with implicit TLS.
    #[serde(default = "default_true")]
    pub use_ssl: bool,
    /// Sender used when a message does not name one.
    #[serde(default)]
    pub default_sender: Option<String>,
    /// SMTP connect and command timeout.
    #[serde(default, with = "humantime_serde_opt")]
    pub timeout: Option<Duration>,
    /// PEM private key for client authentication.
    #[serde(default)]
    pub ssl_keyfile: Option<PathBuf>,
    /// PEM certificate chain for client authentication.
    #[serde(default)]
    pub ssl_certfile: Option<PathBuf>,
    /// Write the Date header in local time instead of UTC.
    #[serde(default)]
    pub use_localtime: bool,
    /// Output directory of the file backend.
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    /// Charset used when a message does not set one.
    #[serde(default = "default_charset")]
    pub default_charset: String,
    /// Backend identifier.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Template folder for callers that render bodies.
    #[serde(default)]
    pub template_folder: Option<PathBuf>,
    /// Host name announced in EHLO and used for Message-IDs.
    #[serde(default)]
    pub local_hostname: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_server() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_charset() -> String {
    DEFAULT_CHARSET.to_string()
}
fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            use_tls: false,
            use_ssl: true,
            default_sender: None,
            timeout: None,
            ssl_keyfile: None,
            ssl_certfile: None,
            use_localtime: false,
            file_path: None,
            default_charset: default_charset(),
            backend: default_backend(),
            template_folder: None,
            local_hostname: None,
        }
    }
}

impl MailSettings {
    /// Creates a new settings builder.
    pub fn builder() -> MailSettingsBuilder {
        MailSettingsBuilder::default()
    }

    /// Validates the settings.
    pub fn validate(&self) -> MailResult<()> {
        if self.server.is_empty() {
            return Err(MailError::configuration("Server is required"));
        }

        if self.port == 0 {
            return Err(MailError::configuration("Port must be non-zero"));
        }

        if self.use_tls && self.use_ssl {
            return Err(MailError::configuration(
                "use_tls and use_ssl are mutually exclusive, so only set one of those settings to true",
            ));
        }

        if self.backend.trim().is_empty() {
            return Err(MailError::configuration("Backend identifier is required"));
        }

        Ok(())
    }

    /// Falls back to the username when no default sender is set.
    pub(crate) fn resolve_default_sender(&mut self) {
        if self.default_sender.is_none() {
            self.default_sender = self.username.clone();
        }
    }

    /// Returns the full server address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    /// Returns true if authentication is configured.
    pub fn has_auth(&self) -> bool {
        self.username.is_some()
            && self
                .password
                .as_ref()
                .is_some_and(|p| !p.expose_secret().is_empty())
    }

    /// Returns the host name for EHLO and Message-IDs.
    pub fn local_hostname(&self) -> &str {
        self.local_hostname
            .as_deref()
            .unwrap_or(DEFAULT_LOCAL_HOSTNAME)
    }

    /// Returns the timeout applied to SMTP exchanges.
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Returns a copy with the per-connection overrides applied.
    pub fn with_overrides(&self, options: &ConnectionOptions) -> MailSettings {
        let mut settings = self.clone();
        if let Some(host) = &options.host {
            settings.server = host.clone();
        }
        if let Some(port) = options.port {
            settings.port = port;
        }
        if let Some(username) = &options.username {
            settings.username = Some(username.clone());
        }
        if let Some(password) = &options.password {
            settings.password = Some(password.clone());
        }
        if let Some(use_tls) = options.use_tls {
            settings.use_tls = use_tls;
        }
        if let Some(use_ssl) = options.use_ssl {
            settings.use_ssl = use_ssl;
        }
        if let Some(timeout) = options.timeout {
            settings.timeout = Some(timeout);
        }
        if let Some(path) = &options.ssl_keyfile {
            settings.ssl_keyfile = Some(path.clone());
        }
        if let Some(path) = &options.ssl_certfile {
            settings.ssl_certfile = Some(path.clone());
        }
        if let Some(path) = &options.file_path {
            settings.file_path = Some(path.clone());
        }
        settings
    }
}

/// Builder for mail settings.
#[derive(Debug, Default)]
pub struct MailSettingsBuilder {
    settings: MailSettings,
}

impl MailSettingsBuilder {
    /// Sets the SMTP server host.
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.settings.server = server.into();
        self
    }

    /// Sets the SMTP server port.
    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    /// Sets plain credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.settings.username = Some(username.into());
        self.settings.password = Some(SecretString::new(password.into()));
        self
    }

    /// Sets the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.settings.username = Some(username.into());
        self
    }

    /// Sets the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.settings.password = Some(SecretString::new(password.into()));
        self
    }

    /// Enables or disables STARTTLS.
    pub fn use_tls(mut self, enabled: bool) -> Self {
        self.settings.use_tls = enabled;
        self
    }

    /// Enables or disables implicit TLS.
    pub fn use_ssl(mut self, enabled: bool) -> Self {
        self.settings.use_ssl = enabled;
        self
    }

    /// Disables both STARTTLS and implicit TLS.
    pub fn no_tls(mut self) -> Self {
        self.settings.use_tls = false;
        self.settings.use_ssl = false;
        self
    }

    /// Sets the default sender.
    pub fn default_sender(mut self, sender: impl Into<String>) -> Self {
        self.settings.default_sender = Some(sender.into());
        self
    }

    /// Sets the SMTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = Some(timeout);
        self
    }

    /// Sets the client certificate and key paths.
    pub fn client_cert(mut self, certfile: impl Into<PathBuf>, keyfile: impl Into<PathBuf>) -> Self {
        self.settings.ssl_certfile = Some(certfile.into());
        self.settings.ssl_keyfile = Some(keyfile.into());
        self
    }

    /// Writes the Date header in local time.
    pub fn use_localtime(mut self, enabled: bool) -> Self {
        self.settings.use_localtime = enabled;
        self
    }

    /// Sets the file backend output directory.
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.file_path = Some(path.into());
        self
    }

    /// Sets the default charset.
    pub fn default_charset(mut self, charset: impl Into<String>) -> Self {
        self.settings.default_charset = charset.into();
        self
    }

    /// Sets the backend identifier.
    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.settings.backend = backend.into();
        self
    }

    /// Sets the template folder.
    pub fn template_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.template_folder = Some(path.into());
        self
    }

    /// Sets the local host name.
    pub fn local_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.settings.local_hostname = Some(hostname.into());
        self
    }

    /// Builds the settings.
    pub fn build(self) -> MailResult<MailSettings> {
        let mut settings = self.settings;
        settings.resolve_default_sender();
        settings.validate()?;
        Ok(settings)
    }
}

/// Per-connection overrides and flags.
///
/// Unset fields fall back to the facade's [`MailSettings`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// Swallow transport failures instead of returning them.
    pub fail_silently: bool,
    /// Server host override.
    pub host: Option<String>,
    /// Server port override.
    pub port: Option<u16>,
    /// Username override.
    pub username: Option<String>,
    /// Password override.
    pub password: Option<SecretString>,
    /// STARTTLS override.
    pub use_tls: Option<bool>,
    /// Implicit TLS override.
    pub use_ssl: Option<bool>,
    /// Timeout override.
    pub timeout: Option<Duration>,
    /// Client key override.
    pub ssl_keyfile: Option<PathBuf>,
    /// Client certificate override.
    pub ssl_certfile: Option<PathBuf>,
    /// File backend directory override.
    pub file_path: Option<PathBuf>,
}

impl ConnectionOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fail-silently flag.
    pub fn fail_silently(mut self, enabled: bool) -> Self {
        self.fail_silently = enabled;
        self
    }

    /// Overrides the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Overrides the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Overrides the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Overrides the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::new(password.into()));
        self
    }

    /// Overrides STARTTLS.
    pub fn use_tls(mut self, enabled: bool) -> Self {
        self.use_tls = Some(enabled);
        self
    }

    /// Overrides implicit TLS.
    pub fn use_ssl(mut self, enabled: bool) -> Self {
        self.use_ssl = Some(enabled);
        self
    }

    /// Overrides the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the client certificate and key.
    pub fn client_cert(mut self, certfile: impl Into<PathBuf>, keyfile: impl Into<PathBuf>) -> Self {
        self.ssl_certfile = Some(certfile.into());
        self.ssl_keyfile = Some(keyfile.into());
        self
    }

    /// Overrides the file backend directory.
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}

// Humantime serde support for optional durations
mod humantime_serde_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
