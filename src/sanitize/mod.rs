//! Header and address sanitization.
//!
//! Every header written by the message model goes through
//! [`forbid_multi_line_headers`]. It rejects header injection and
//! RFC 2047-encodes non-ASCII values. Addresses are parsed into
//! [`Address`] and re-rendered so display names and local parts are safe
//! to put on the wire.

use std::fmt;

use crate::errors::{MailError, MailResult};
use crate::mime::{encode_word, Charset, MAX_LINE_LENGTH};

/// Headers whose values are address lists.
pub const ADDRESS_HEADERS: &[&str] = &[
    "from",
    "sender",
    "reply-to",
    "to",
    "cc",
    "bcc",
    "resent-from",
    "resent-sender",
    "resent-to",
    "resent-cc",
    "resent-bcc",
];

/// Characters that force a display name to be quoted.
const SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];

/// Email address with optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Display name (e.g., "John Doe").
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com").
    pub email: String,
}

impl Address {
    /// Creates a new address with just an email.
    pub fn new(email: impl Into<String>) -> MailResult<Self> {
        let email = email.into();
        Self::validate_email(&email)?;
        Ok(Self { name: None, email })
    }

    /// Creates a new address with display name and email.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> MailResult<Self> {
        let email = email.into();
        Self::validate_email(&email)?;
        let name = name.into();
        Ok(Self {
            name: (!name.is_empty()).then_some(name),
            email,
        })
    }

    /// Parses an address from a string (e.g., "John Doe <john@example.com>").
    pub fn parse(s: &str) -> MailResult<Self> {
        reject_line_breaks("address", s)?;
        let s = s.trim();

        if let Some(start) = s.rfind('<') {
            let Some(inner) = s[start + 1..].strip_suffix('>') else {
                return Err(MailError::invalid_address(format!(
                    "Invalid address; unterminated angle bracket in {:?}",
                    s
                )));
            };
            let name = unquote(s[..start].trim());
            return Self::with_name(name, inner.trim());
        }

        Self::new(s)
    }

    fn validate_email(email: &str) -> MailResult<()> {
        if email.is_empty() {
            return Err(MailError::invalid_address("Email address cannot be empty"));
        }

        if email.len() > 254 {
            return Err(MailError::invalid_address(
                "Email address too long (max 254 characters)",
            ));
        }

        let Some((local, domain)) = email.rsplit_once('@') else {
            return Err(MailError::invalid_address(format!(
                "Invalid address {:?}; missing @",
                email
            )));
        };

        if local.is_empty() || domain.is_empty() {
            return Err(MailError::invalid_address(format!(
                "Invalid address {:?}; empty local part or domain",
                email
            )));
        }

        if email.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(MailError::invalid_address(format!(
                "Invalid address {:?}; contains whitespace or control characters",
                email
            )));
        }

        Ok(())
    }

    /// Returns the email part only.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the display name if present.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns a copy safe for headers in the given charset.
    ///
    /// Non-ASCII display names and local parts become encoded words.
    /// Non-ASCII domains are rejected.
    pub fn encoded(&self, charset: Charset) -> MailResult<Address> {
        let (local, domain) = self
            .email
            .rsplit_once('@')
            .ok_or_else(|| MailError::invalid_address("Email address must contain @"))?;

        if !domain.is_ascii() {
            return Err(MailError::invalid_address(format!(
                "Non-ASCII domain in {:?} is not supported",
                self.email
            )));
        }

        let local = if local.is_ascii() {
            local.to_string()
        } else {
            encode_word(local, charset)
        };

        let name = self.name.as_ref().map(|name| {
            if name.is_ascii() {
                name.clone()
            } else {
                encode_word(name, charset)
            }
        });

        Ok(Address {
            name,
            email: format!("{}@{}", local, domain),
        })
    }

    /// Formats the address for SMTP MAIL FROM/RCPT TO commands.
    pub fn to_smtp(&self) -> String {
        format!("<{}>", self.email)
    }

    /// Formats the address for email headers.
    pub fn to_header(&self) -> String {
        match &self.name {
            Some(name) if name.starts_with("=?") => format!("{} <{}>", name, self.email),
            Some(name) if name.contains(SPECIALS) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\" <{}>", escaped, self.email)
            }
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_header())
    }
}

impl TryFrom<&str> for Address {
    type Error = MailError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Address::parse(s)
    }
}

fn unquote(name: &str) -> String {
    match name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => name.to_string(),
    }
}

fn reject_line_breaks(name: &str, value: &str) -> MailResult<()> {
    if value.contains(['\n', '\r']) {
        return Err(MailError::bad_header(format!(
            "Header values can't contain newlines (got {:?} for header {:?})",
            value, name
        )));
    }
    Ok(())
}

/// Rejects a header value containing a line break.
pub fn sanitize_header(name: &str, value: &str) -> MailResult<String> {
    reject_line_breaks(name, value)?;
    Ok(value.to_string())
}

/// Validates a header and returns its wire-safe value.
///
/// ASCII values pass through unchanged. Non-ASCII address headers are
/// sanitized address by address; any other non-ASCII value is
/// RFC 2047-encoded.
pub fn forbid_multi_line_headers(name: &str, value: &str, charset: &str) -> MailResult<String> {
    reject_line_breaks(name, value)?;

    let is_address = ADDRESS_HEADERS.contains(&name.to_ascii_lowercase().as_str());

    if value.is_ascii() {
        // A word too long to fold is split into encoded words instead.
        if !is_address && has_unfoldable_word(name, value) {
            return Ok(encode_word(value, Charset::parse(charset)?));
        }
        return Ok(value.to_string());
    }

    if is_address {
        let addresses = split_addresses(value)
            .into_iter()
            .map(|addr| sanitize_address(&addr, charset))
            .collect::<MailResult<Vec<_>>>()?;
        return Ok(addresses.join(", "));
    }

    Ok(encode_word(value, Charset::parse(charset)?))
}

fn has_unfoldable_word(name: &str, value: &str) -> bool {
    value
        .split(' ')
        .any(|word| name.len() + 2 + word.len() > MAX_LINE_LENGTH)
}

/// Parses and re-renders an address for use in a header.
pub fn sanitize_address(address: &str, charset: &str) -> MailResult<String> {
    let charset = Charset::parse(charset)?;
    Ok(Address::parse(address)?.encoded(charset)?.to_header())
}

/// Returns the `<local@domain>` form of an address for the SMTP envelope.
pub fn envelope_address(address: &str, charset: &str) -> MailResult<String> {
    let charset = Charset::parse(charset)?;
    Ok(Address::parse(address)?.encoded(charset)?.to_smtp())
}

/// Splits an address list on commas outside quotes and angle brackets.
pub fn split_addresses(value: &str) -> Vec<String> {
    let mut addresses = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;

    for c in value.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                if !current.trim().is_empty() {
                    addresses.push(current.trim().to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }

    if !current.trim().is_empty() {
        addresses.push(current.trim().to_string());
    }
    addresses
}
