//! # Mailer Integration Library
//!
//! Email composition and multi-backend dispatch:
//! - RFC 5322 / MIME message construction with alternatives and attachments
//! - Header-injection protection and RFC 2047 encoding of non-ASCII headers
//! - Pluggable delivery backends (smtp, locmem, console, file, dummy)
//! - SMTP with implicit TLS or STARTTLS, client certificates and
//!   PLAIN / LOGIN / CRAM-MD5 authentication
//! - `fail_silently` suppression of transport failures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_mailer::{Mail, MailSettings, SendOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = MailSettings::builder()
//!         .server("smtp.example.com")
//!         .port(465)
//!         .credentials("user@example.com", "password")
//!         .build()?;
//!
//!     let mail = Mail::new(settings)?;
//!
//!     let sent = mail
//!         .send_mail(
//!             "Hello from Rust!",
//!             "This is a test email.",
//!             None,
//!             ["recipient@example.com"],
//!             None,
//!             SendOptions::new(),
//!         )
//!         .await?;
//!     println!("Sent {} message(s)", sent);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;

// Message model
pub mod mime;
pub mod message;
pub mod sanitize;

// SMTP client layer
pub mod auth;
pub mod protocol;
pub mod transport;

// Delivery
pub mod backends;
pub mod mail;

// Mocks for testing
pub mod mocks;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use backends::{
    BackendContext, BackendFactory, BackendRegistry, BackendSpec, Connection, ConsoleBackend,
    DummyBackend, EmailBackend, FileBackend, LocmemBackend, Opened, Outbox, SmtpBackend,
};
pub use config::{ConnectionOptions, MailSettings, MailSettingsBuilder};
pub use errors::{ErrorCategory, MailError, MailErrorKind, MailResult};
pub use mail::{Mail, MassMessage, SendOptions};
pub use message::{Alternative, Attachment, EmailMessage, EmailMessageBuilder};
pub use mime::MimePart;
pub use sanitize::{forbid_multi_line_headers, sanitize_address, sanitize_header, Address};
