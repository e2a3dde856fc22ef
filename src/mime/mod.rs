//! MIME document model and serialization.
//!
//! Provides RFC 5322 compliant message formatting with:
//! - Header encoding (RFC 2047) and folding
//! - 7bit, 8bit, quoted-printable and Base64 body encoding
//! - Multipart documents with generated boundaries
//! - Message-ID and Date helpers

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Local, Utc};
use uuid::Uuid;

use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::sanitize::forbid_multi_line_headers;

/// Longest line allowed by RFC 5322, excluding the line separator.
pub const MAX_LINE_LENGTH: usize = 998;

/// Header lines longer than this are folded.
const FOLD_WIDTH: usize = 78;

/// Source bytes per RFC 2047 encoded word; keeps each word under 75 chars.
const ENCODED_WORD_CHUNK: usize = 45;

/// Supported body and header charsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8.
    Utf8,
    /// US-ASCII.
    UsAscii,
}

impl Charset {
    /// Parses a charset name.
    pub fn parse(name: &str) -> MailResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "us-ascii" | "ascii" => Ok(Charset::UsAscii),
            other => Err(MailError::configuration(format!(
                "Unsupported charset {:?}; expected utf-8 or us-ascii",
                other
            ))),
        }
    }

    /// Returns the canonical charset label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::UsAscii => "us-ascii",
        }
    }
}

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII (no encoding).
    SevenBit,
    /// 8-bit data.
    EightBit,
    /// Quoted-printable encoding.
    QuotedPrintable,
    /// Base64 encoding.
    Base64,
}

impl TransferEncoding {
    /// Returns the header value.
    pub fn header_value(&self) -> &'static str {
        match self {
            TransferEncoding::SevenBit => "7bit",
            TransferEncoding::EightBit => "8bit",
            TransferEncoding::QuotedPrintable => "quoted-printable",
            TransferEncoding::Base64 => "base64",
        }
    }
}

/// Body of a MIME part.
#[derive(Debug, Clone)]
pub enum MimeBody {
    /// Already transfer-encoded content with `\n` line breaks.
    Single(String),
    /// Nested parts separated by a boundary.
    Multipart {
        /// Boundary delimiter.
        boundary: String,
        /// Child parts in order.
        parts: Vec<MimePart>,
    },
}

/// A MIME entity: ordered headers plus a body.
#[derive(Debug, Clone)]
pub struct MimePart {
    headers: Vec<(String, String)>,
    body: MimeBody,
}

impl MimePart {
    /// Creates a `text/<subtype>` part.
    ///
    /// The transfer encoding is 7bit for ASCII, 8bit otherwise, and
    /// quoted-printable once any line exceeds [`MAX_LINE_LENGTH`].
    pub fn text(content: &str, subtype: &str, charset: Charset) -> MailResult<Self> {
        validate_token("subtype", subtype)?;

        let content = normalize_newlines(content);
        if charset == Charset::UsAscii && !content.is_ascii() {
            return Err(MailError::new(
                MailErrorKind::EncodingFailed,
                "Body contains non-ASCII characters but charset is us-ascii",
            ));
        }

        let long_lines = content.split('\n').any(|line| line.len() > MAX_LINE_LENGTH);
        let (encoding, body) = if long_lines {
            (TransferEncoding::QuotedPrintable, encode_quoted_printable(&content))
        } else if content.is_ascii() {
            (TransferEncoding::SevenBit, content)
        } else {
            (TransferEncoding::EightBit, content)
        };

        Ok(Self {
            headers: vec![
                (
                    "Content-Type".to_string(),
                    format!("text/{}; charset=\"{}\"", subtype, charset.as_str()),
                ),
                (
                    "Content-Transfer-Encoding".to_string(),
                    encoding.header_value().to_string(),
                ),
            ],
            body: MimeBody::Single(body),
        })
    }

    /// Creates a base64-encoded part for arbitrary bytes.
    pub fn binary(data: &[u8], mimetype: &str) -> MailResult<Self> {
        let mimetype = mimetype.trim();
        if mimetype.is_empty() || mimetype.contains(['\n', '\r']) {
            return Err(MailError::attachment(format!("Invalid mimetype {:?}", mimetype)));
        }

        Ok(Self {
            headers: vec![
                ("Content-Type".to_string(), mimetype.to_string()),
                (
                    "Content-Transfer-Encoding".to_string(),
                    TransferEncoding::Base64.header_value().to_string(),
                ),
            ],
            body: MimeBody::Single(encode_base64(data)),
        })
    }

    /// Creates a `multipart/<subtype>` part with a fresh boundary.
    pub fn multipart(subtype: &str, parts: Vec<MimePart>) -> MailResult<Self> {
        validate_token("subtype", subtype)?;
        let boundary = generate_boundary();
        Ok(Self {
            headers: vec![(
                "Content-Type".to_string(),
                format!("multipart/{}; boundary=\"{}\"", subtype, boundary),
            )],
            body: MimeBody::Multipart { boundary, parts },
        })
    }

    /// Sets a header, replacing any existing header of the same name.
    ///
    /// The value passes through [`forbid_multi_line_headers`].
    pub fn set_header(&mut self, name: &str, value: &str, charset: &str) -> MailResult<()> {
        validate_header_name(name)?;
        let value = forbid_multi_line_headers(name, value, charset)?;
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value));
        Ok(())
    }

    /// Returns the first header value with the given name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns all headers in order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the media type without parameters (e.g. `text/plain`).
    pub fn content_type(&self) -> &str {
        self.header("Content-Type")
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .unwrap_or("text/plain")
    }

    /// Returns the body.
    pub fn body(&self) -> &MimeBody {
        &self.body
    }

    /// Returns true for multipart entities.
    pub fn is_multipart(&self) -> bool {
        matches!(self.body, MimeBody::Multipart { .. })
    }

    /// Returns child parts; empty for single parts.
    pub fn parts(&self) -> &[MimePart] {
        match &self.body {
            MimeBody::Multipart { parts, .. } => parts,
            MimeBody::Single(_) => &[],
        }
    }

    /// Serializes the document using `linesep` between lines.
    pub fn as_bytes(&self, linesep: &str) -> Vec<u8> {
        let mut output = Vec::new();
        self.write_to(&mut output, linesep);
        output
    }

    /// Serializes the document to a string.
    pub fn as_string(&self, linesep: &str) -> String {
        String::from_utf8_lossy(&self.as_bytes(linesep)).into_owned()
    }

    fn write_to(&self, output: &mut Vec<u8>, linesep: &str) {
        for (name, value) in &self.headers {
            let folded = fold_header(&format!("{}: {}", name, value), linesep);
            output.extend_from_slice(folded.as_bytes());
            output.extend_from_slice(linesep.as_bytes());
        }
        output.extend_from_slice(linesep.as_bytes());

        match &self.body {
            MimeBody::Single(body) => {
                output.extend_from_slice(body.replace('\n', linesep).as_bytes());
            }
            MimeBody::Multipart { boundary, parts } => {
                for part in parts {
                    output.extend_from_slice(format!("--{}{}", boundary, linesep).as_bytes());
                    part.write_to(output, linesep);
                    output.extend_from_slice(linesep.as_bytes());
                }
                output.extend_from_slice(format!("--{}--{}", boundary, linesep).as_bytes());
            }
        }
    }
}

fn validate_header_name(name: &str) -> MailResult<()> {
    if name.is_empty()
        || !name.is_ascii()
        || name.chars().any(|c| c.is_control() || c == ':' || c == ' ')
    {
        return Err(MailError::bad_header(format!("Invalid header name: {:?}", name)));
    }
    Ok(())
}

fn validate_token(what: &str, token: &str) -> MailResult<()> {
    let valid = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_'));
    if !valid {
        return Err(MailError::attachment(format!("Invalid MIME {}: {:?}", what, token)));
    }
    Ok(())
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Encodes text as quoted-printable, returning `\n`-separated lines.
pub fn encode_quoted_printable(text: &str) -> String {
    let crlf = normalize_newlines(text).replace('\n', "\r\n");
    let encoded = quoted_printable::encode(crlf.as_bytes());
    String::from_utf8_lossy(&encoded).replace("\r\n", "\n")
}

/// Encodes bytes as base64 in 76-character lines.
pub fn encode_base64(data: &[u8]) -> String {
    let encoded = BASE64.encode(data);
    let mut output = String::with_capacity(encoded.len() + encoded.len() / 76 + 1);
    for chunk in encoded.as_bytes().chunks(76) {
        output.push_str(&String::from_utf8_lossy(chunk));
        output.push('\n');
    }
    output
}

/// Encodes text as one or more RFC 2047 encoded words.
pub fn encode_word(text: &str, charset: Charset) -> String {
    // Non-ASCII text cannot be labelled us-ascii.
    let label = if charset == Charset::UsAscii && !text.is_ascii() {
        Charset::Utf8.as_str()
    } else {
        charset.as_str()
    };

    let mut words = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + ENCODED_WORD_CHUNK).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        words.push(format!(
            "=?{}?b?{}?=",
            label,
            BASE64.encode(&text.as_bytes()[start..end])
        ));
        start = end;
    }
    words.join(" ")
}

/// Folds a header line at 78 characters.
pub fn fold_header(header: &str, linesep: &str) -> String {
    if header.len() <= FOLD_WIDTH {
        return header.to_string();
    }

    let mut result = String::new();
    let mut current_line = String::new();

    for word in header.split(' ') {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= FOLD_WIDTH - 2 {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            result.push_str(&current_line);
            result.push_str(linesep);
            result.push(' ');
            current_line = word.to_string();
        }
    }

    result.push_str(&current_line);
    result
}

/// Builds a `Content-Disposition` value for an attachment.
///
/// Non-ASCII file names use RFC 2231 parameter encoding.
pub fn content_disposition(filename: Option<&str>) -> String {
    match filename {
        None => "attachment".to_string(),
        Some(name) if name.is_ascii() => {
            let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
            format!("attachment; filename=\"{}\"", escaped)
        }
        Some(name) => {
            let mut encoded = String::new();
            for byte in name.bytes() {
                if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
                    encoded.push(byte as char);
                } else {
                    encoded.push_str(&format!("%{:02X}", byte));
                }
            }
            format!("attachment; filename*=utf-8''{}", encoded)
        }
    }
}

/// Generates a unique boundary.
pub fn generate_boundary() -> String {
    format!("----=_Part_{}", Uuid::new_v4().simple())
}

/// Generates a unique Message-ID for the given domain.
pub fn make_msgid(domain: &str) -> String {
    format!(
        "<{}.{}@{}>",
        Utc::now().format("%Y%m%d%H%M%S"),
        Uuid::new_v4().simple(),
        domain
    )
}

/// Formats the current time for the Date header.
pub fn format_date(localtime: bool) -> String {
    const FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";
    if localtime {
        Local::now().format(FORMAT).to_string()
    } else {
        Utc::now().format(FORMAT).to_string()
    }
}

/// Prepares the DATA content with dot-stuffing and the terminating dot.
pub fn prepare_data_content(encoded_email: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(encoded_email.len() + 100);
    let mut at_line_start = true;

    for &byte in encoded_email {
        if at_line_start && byte == b'.' {
            output.push(b'.');
        }

        output.push(byte);
        at_line_start = byte == b'\n';
    }

    if !output.ends_with(b"\r\n") {
        if output.ends_with(b"\n") {
            output.pop();
        }
        output.extend_from_slice(b"\r\n");
    }

    output.extend_from_slice(b".\r\n");
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_parse() {
        assert_eq!(Charset::parse("UTF-8").unwrap(), Charset::Utf8);
        assert_eq!(Charset::parse("utf8").unwrap(), Charset::Utf8);
        assert_eq!(Charset::parse("ascii").unwrap(), Charset::UsAscii);
        let err = Charset::parse("iso-8859-1").unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::ConfigurationInvalid);
    }

    #[test]
    fn test_text_part_encoding_selection() {
        let part = MimePart::text("Hello World!", "plain", Charset::Utf8).unwrap();
        assert_eq!(part.header("Content-Transfer-Encoding"), Some("7bit"));
        assert_eq!(part.header("content-type"), Some("text/plain; charset=\"utf-8\""));

        let part = MimePart::text("Grüße", "plain", Charset::Utf8).unwrap();
        assert_eq!(part.header("Content-Transfer-Encoding"), Some("8bit"));

        let long = "x".repeat(MAX_LINE_LENGTH + 1);
        let part = MimePart::text(&long, "plain", Charset::Utf8).unwrap();
        assert_eq!(
            part.header("Content-Transfer-Encoding"),
            Some("quoted-printable")
        );
        let serialized = part.as_string("\r\n");
        assert!(serialized.lines().all(|l| l.len() <= MAX_LINE_LENGTH));
    }

    #[test]
    fn test_us_ascii_rejects_non_ascii_body() {
        let err = MimePart::text("Grüße", "plain", Charset::UsAscii).unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::EncodingFailed);
    }

    #[test]
    fn test_binary_part_wraps_base64() {
        let data = vec![0u8; 200];
        let part = MimePart::binary(&data, "application/octet-stream").unwrap();
        let serialized = part.as_string("\n");
        assert!(serialized.contains("Content-Transfer-Encoding: base64"));
        let body = serialized.split("\n\n").nth(1).unwrap();
        assert!(body.lines().all(|l| l.len() <= 76));
    }

    #[test]
    fn test_multipart_serialization() {
        let text = MimePart::text("plain body", "plain", Charset::Utf8).unwrap();
        let html = MimePart::text("<p>html body</p>", "html", Charset::Utf8).unwrap();
        let part = MimePart::multipart("alternative", vec![text, html]).unwrap();

        let MimeBody::Multipart { boundary, .. } = part.body() else {
            panic!("expected multipart body");
        };
        let serialized = part.as_string("\r\n");
        assert_eq!(part.content_type(), "multipart/alternative");
        assert_eq!(serialized.matches(&format!("--{}\r\n", boundary)).count(), 2);
        assert!(serialized.ends_with(&format!("--{}--\r\n", boundary)));
        assert!(serialized.contains("plain body\r\n--"));
        assert_eq!(part.parts().len(), 2);
        assert_eq!(part.parts()[1].content_type(), "text/html");
    }

    #[test]
    fn test_set_header_replaces_and_validates() {
        let mut part = MimePart::text("body", "plain", Charset::Utf8).unwrap();
        part.set_header("Subject", "first", "utf-8").unwrap();
        part.set_header("subject", "second", "utf-8").unwrap();
        assert_eq!(part.header("Subject"), Some("second"));
        assert_eq!(
            part.headers().iter().filter(|(n, _)| n.eq_ignore_ascii_case("subject")).count(),
            1
        );

        assert!(part.set_header("Subject", "a\nb", "utf-8").unwrap_err().is_bad_header());
        assert!(part.set_header("Bad:Name", "x", "utf-8").unwrap_err().is_bad_header());
    }

    #[test]
    fn test_encode_word_chunks() {
        let text = "ü".repeat(60);
        let encoded = encode_word(&text, Charset::Utf8);
        let words: Vec<&str> = encoded.split(' ').collect();
        assert!(words.len() > 1);
        assert!(words.iter().all(|w| w.len() <= 75 && w.starts_with("=?utf-8?b?")));

        let decoded: Vec<u8> = words
            .iter()
            .flat_map(|w| {
                let b64 = w.trim_start_matches("=?utf-8?b?").trim_end_matches("?=");
                BASE64.decode(b64).unwrap()
            })
            .collect();
        assert_eq!(String::from_utf8(decoded).unwrap(), text);
    }

    #[test]
    fn test_fold_header() {
        let header = format!("Subject: {}", "word ".repeat(30).trim_end());
        let folded = fold_header(&header, "\r\n");
        assert!(folded.contains("\r\n "));
        assert!(folded.split("\r\n").all(|l| l.len() <= FOLD_WIDTH));
        assert_eq!(folded.replace("\r\n", ""), header);
    }

    #[test]
    fn test_long_header_word_stays_within_line_limit() {
        let mut part = MimePart::text("Hello", "plain", Charset::Utf8).unwrap();
        part.set_header("Subject", &"x".repeat(2 * MAX_LINE_LENGTH), "utf-8")
            .unwrap();
        let serialized = part.as_string("\r\n");
        assert!(serialized.split("\r\n").all(|l| l.len() <= MAX_LINE_LENGTH));
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition(Some("report.pdf")),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            content_disposition(Some("résumé.txt")),
            "attachment; filename*=utf-8''r%C3%A9sum%C3%A9.txt"
        );
        assert_eq!(content_disposition(None), "attachment");
    }

    #[test]
    fn test_boundary_generation() {
        assert_ne!(generate_boundary(), generate_boundary());
    }

    #[test]
    fn test_make_msgid() {
        let id = make_msgid("example.com");
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@example.com>"));
        assert_ne!(id, make_msgid("example.com"));
    }

    #[test]
    fn test_dot_stuffing() {
        let input = b"Hello\r\n.World\r\n..Test\r\n";
        let output = prepare_data_content(input);
        let output_str = String::from_utf8_lossy(&output);
        assert!(output_str.contains("\r\n..World"));
        assert!(output_str.contains("\r\n...Test"));
        assert!(output_str.ends_with("\r\n.\r\n"));

        let output = prepare_data_content(b"no trailing newline");
        assert!(output.ends_with(b"newline\r\n.\r\n"));
    }
}
