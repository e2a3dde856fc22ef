//! Error types for composing and dispatching mail.
//!
//! Every failure carries a [`MailErrorKind`], which maps onto a coarse
//! [`ErrorCategory`]. Backends use the category to decide which failures a
//! `fail_silently` connection may swallow.

use std::fmt;
use thiserror::Error;

/// Result type for mail operations.
pub type MailResult<T> = Result<T, MailError>;

/// Mail error kinds categorizing different failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailErrorKind {
    // Header errors
    /// A header value or address contained a line break.
    BadHeader,

    // Message errors
    /// Address could not be parsed or encoded.
    InvalidAddress,
    /// Attachment or alternative arguments were invalid.
    AttachmentError,
    /// Content could not be represented in the requested charset.
    EncodingFailed,

    // Configuration errors
    /// Configuration is invalid.
    ConfigurationInvalid,
    /// Backend identifier could not be resolved.
    BackendResolution,

    // Connection errors
    /// DNS resolution failed.
    DnsResolution,
    /// Connection was refused.
    ConnectionRefused,
    /// Connection timed out.
    ConnectionTimeout,
    /// Connection was reset.
    ConnectionReset,
    /// Server closed the connection.
    ServerDisconnected,

    // TLS errors
    /// TLS handshake failed.
    TlsHandshakeFailed,
    /// Certificate or key file could not be loaded.
    CertificateInvalid,
    /// STARTTLS not supported by server.
    StarttlsNotSupported,

    // Authentication errors
    /// Credentials are invalid.
    CredentialsInvalid,
    /// Authentication method not supported.
    AuthMethodNotSupported,
    /// Authentication is required.
    AuthenticationRequired,

    // Protocol errors
    /// Invalid response from server.
    InvalidResponse,
    /// Unexpected response code.
    UnexpectedResponse,
    /// Server is shutting down (421).
    ServerShutdown,
    /// Sender refused by server.
    SenderRefused,
    /// Every recipient was refused by server.
    RecipientsRefused,
    /// Message exceeds size limit.
    MessageTooLarge,

    // Timeout errors
    /// Read timeout.
    ReadTimeout,
    /// Write timeout.
    WriteTimeout,

    // Local I/O
    /// Local I/O failure (file or console output).
    Io,

    // Generic
    /// Unknown or internal error.
    Unknown,
}

impl MailErrorKind {
    /// Returns the category this kind belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            MailErrorKind::BadHeader => ErrorCategory::BadHeader,
            MailErrorKind::InvalidAddress
            | MailErrorKind::AttachmentError
            | MailErrorKind::EncodingFailed => ErrorCategory::Message,
            MailErrorKind::ConfigurationInvalid => ErrorCategory::Configuration,
            MailErrorKind::BackendResolution => ErrorCategory::BackendResolution,
            _ => ErrorCategory::Transport,
        }
    }

    /// Returns true if this kind reports a transport failure.
    pub fn is_transport(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }
}

impl fmt::Display for MailErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailErrorKind::BadHeader => write!(f, "Bad header"),
            MailErrorKind::InvalidAddress => write!(f, "Invalid address"),
            MailErrorKind::AttachmentError => write!(f, "Attachment error"),
            MailErrorKind::EncodingFailed => write!(f, "Encoding failed"),
            MailErrorKind::ConfigurationInvalid => write!(f, "Invalid configuration"),
            MailErrorKind::BackendResolution => write!(f, "Backend resolution failed"),
            MailErrorKind::DnsResolution => write!(f, "DNS resolution failed"),
            MailErrorKind::ConnectionRefused => write!(f, "Connection refused"),
            MailErrorKind::ConnectionTimeout => write!(f, "Connection timed out"),
            MailErrorKind::ConnectionReset => write!(f, "Connection reset"),
            MailErrorKind::ServerDisconnected => write!(f, "Server disconnected"),
            MailErrorKind::TlsHandshakeFailed => write!(f, "TLS handshake failed"),
            MailErrorKind::CertificateInvalid => write!(f, "Invalid certificate"),
            MailErrorKind::StarttlsNotSupported => write!(f, "STARTTLS not supported"),
            MailErrorKind::CredentialsInvalid => write!(f, "Invalid credentials"),
            MailErrorKind::AuthMethodNotSupported => write!(f, "Auth method not supported"),
            MailErrorKind::AuthenticationRequired => write!(f, "Authentication required"),
            MailErrorKind::InvalidResponse => write!(f, "Invalid server response"),
            MailErrorKind::UnexpectedResponse => write!(f, "Unexpected response"),
            MailErrorKind::ServerShutdown => write!(f, "Server shutting down"),
            MailErrorKind::SenderRefused => write!(f, "Sender refused"),
            MailErrorKind::RecipientsRefused => write!(f, "Recipients refused"),
            MailErrorKind::MessageTooLarge => write!(f, "Message too large"),
            MailErrorKind::ReadTimeout => write!(f, "Read timeout"),
            MailErrorKind::WriteTimeout => write!(f, "Write timeout"),
            MailErrorKind::Io => write!(f, "I/O error"),
            MailErrorKind::Unknown => write!(f, "Unknown error"),
        }
    }
}

/// Coarse error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Header injection attempt; never silenced.
    BadHeader,
    /// Malformed message content; never silenced.
    Message,
    /// Invalid settings or arguments; never silenced.
    Configuration,
    /// Unknown backend identifier.
    BackendResolution,
    /// Network, TLS, authentication, server or output I/O failure.
    Transport,
}

/// Enhanced SMTP status code (RFC 2034).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedStatusCode {
    /// Class (2=success, 4=temporary, 5=permanent).
    pub class: u8,
    /// Subject (e.g., 1=addressing, 2=mailbox, 3=mail system).
    pub subject: u16,
    /// Detail code.
    pub detail: u16,
}

impl EnhancedStatusCode {
    /// Creates a new enhanced status code.
    pub fn new(class: u8, subject: u16, detail: u16) -> Self {
        Self { class, subject, detail }
    }

    /// Parses an enhanced status code from a string (e.g., "5.1.1").
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('.');
        let code = Self {
            class: parts.next()?.parse().ok()?,
            subject: parts.next()?.parse().ok()?,
            detail: parts.next()?.parse().ok()?,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(code)
    }

    /// Returns true if this is a permanent failure.
    pub fn is_permanent(&self) -> bool {
        self.class == 5
    }
}

impl fmt::Display for EnhancedStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

/// Mail error with detailed information.
#[derive(Error, Debug)]
pub struct MailError {
    kind: MailErrorKind,
    message: String,
    smtp_code: Option<u16>,
    enhanced_code: Option<EnhancedStatusCode>,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MailError {
    /// Creates a new mail error.
    pub fn new(kind: MailErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            smtp_code: None,
            enhanced_code: None,
            cause: None,
        }
    }

    /// Sets the SMTP status code.
    pub fn with_smtp_code(mut self, code: u16) -> Self {
        self.smtp_code = Some(code);
        self
    }

    /// Sets the enhanced status code.
    pub fn with_enhanced_code(mut self, code: EnhancedStatusCode) -> Self {
        self.enhanced_code = Some(code);
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause<E: std::error::Error + Send + Sync + 'static>(mut self, cause: E) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> MailErrorKind {
        self.kind
    }

    /// Returns the error category.
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the SMTP status code if available.
    pub fn smtp_code(&self) -> Option<u16> {
        self.smtp_code
    }

    /// Returns the enhanced status code if available.
    pub fn enhanced_code(&self) -> Option<&EnhancedStatusCode> {
        self.enhanced_code.as_ref()
    }

    /// Returns true for header-injection failures.
    pub fn is_bad_header(&self) -> bool {
        self.kind == MailErrorKind::BadHeader
    }

    /// Returns true if a `fail_silently` connection may swallow this error.
    pub fn is_suppressible(&self) -> bool {
        self.kind.is_transport()
    }

    // Convenience constructors

    /// Creates a header injection error.
    pub fn bad_header(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::BadHeader, message)
    }

    /// Creates an address error.
    pub fn invalid_address(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::InvalidAddress, message)
    }

    /// Creates an attachment error.
    pub fn attachment(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::AttachmentError, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::ConfigurationInvalid, message)
    }

    /// Creates a backend resolution error.
    pub fn backend_resolution(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::BackendResolution, message)
    }

    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::ConnectionRefused, message)
    }

    /// Creates a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::TlsHandshakeFailed, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::CredentialsInvalid, message)
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::InvalidResponse, message)
    }

    /// Creates a local I/O error.
    pub fn io(message: impl Into<String>, cause: std::io::Error) -> Self {
        Self::new(MailErrorKind::Io, message).with_cause(cause)
    }

    /// Creates an error from an SMTP reply.
    pub fn from_smtp_response(code: u16, message: impl Into<String>) -> Self {
        let kind = match code {
            421 => MailErrorKind::ServerShutdown,
            500..=503 => MailErrorKind::InvalidResponse,
            530 => MailErrorKind::AuthenticationRequired,
            535 => MailErrorKind::CredentialsInvalid,
            550 | 551 => MailErrorKind::RecipientsRefused,
            552 => MailErrorKind::MessageTooLarge,
            553 => MailErrorKind::SenderRefused,
            400.. => MailErrorKind::UnexpectedResponse,
            _ => MailErrorKind::Unknown,
        };
        Self::new(kind, message).with_smtp_code(code)
    }
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(code) = self.smtp_code {
            write!(f, " (SMTP {})", code)?;
        }
        if let Some(enhanced) = &self.enhanced_code {
            write!(f, " [{}]", enhanced)?;
        }
        Ok(())
    }
}
