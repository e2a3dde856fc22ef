//! Email message model.
//!
//! An [`EmailMessage`] holds the logical fields of an email and renders
//! them into a [`MimePart`] on demand. Messages are bound to the settings
//! snapshot they were built with. Messages built through
//! [`Mail::message`](crate::Mail::message) can also send themselves.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::backends::Connection;
use crate::config::{ConnectionOptions, MailSettings};
use crate::errors::{MailError, MailResult};
use crate::mail::Mail;
use crate::mime::{content_disposition, format_date, make_msgid, Charset, MimePart};

/// Mimetype used when none is given and none can be guessed.
pub const DEFAULT_ATTACHMENT_MIME_TYPE: &str = "application/octet-stream";

/// Headers rendered from dedicated fields; extra headers of these names
/// override the field instead of being appended.
const FIELD_HEADERS: &[&str] = &["from", "to", "cc", "reply-to"];

/// File attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown to the recipient.
    pub filename: Option<String>,
    /// Raw content.
    pub content: Vec<u8>,
    /// MIME content type.
    pub mimetype: String,
}

impl Attachment {
    /// Creates a new attachment, guessing the mimetype from the file name
    /// when none is given.
    pub fn new(
        filename: impl Into<String>,
        content: impl Into<Vec<u8>>,
        mimetype: Option<&str>,
    ) -> Self {
        let filename = filename.into();
        let mimetype = match mimetype {
            Some(m) => m.to_string(),
            None => mime_guess::from_path(&filename)
                .first_raw()
                .unwrap_or(DEFAULT_ATTACHMENT_MIME_TYPE)
                .to_string(),
        };
        Self {
            filename: (!filename.is_empty()).then_some(filename),
            content: content.into(),
            mimetype,
        }
    }

    /// Reads an attachment from disk.
    pub async fn from_path(path: impl AsRef<Path>, mimetype: Option<&str>) -> MailResult<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                MailError::attachment(format!("Attachment path {} has no file name", path.display()))
            })?;
        let content = tokio::fs::read(path).await.map_err(|e| {
            MailError::attachment(format!("Failed to read attachment {}", path.display()))
                .with_cause(e)
        })?;
        Ok(Self::new(filename, content, mimetype))
    }

    fn to_part(&self, charset: Charset) -> MailResult<MimePart> {
        let mimetype: mime::Mime = self.mimetype.parse().map_err(|e| {
            MailError::attachment(format!("Invalid attachment mimetype {:?}", self.mimetype))
                .with_cause(e)
        })?;

        let text = (mimetype.type_() == mime::TEXT)
            .then(|| std::str::from_utf8(&self.content).ok())
            .flatten();

        let mut part = match text {
            Some(text) => {
                let charset = if text.is_ascii() { charset } else { Charset::Utf8 };
                MimePart::text(text, mimetype.subtype().as_str(), charset)?
            }
            // Undecodable text falls back to an opaque binary part.
            None if mimetype.type_() == mime::TEXT => {
                MimePart::binary(&self.content, DEFAULT_ATTACHMENT_MIME_TYPE)?
            }
            None => MimePart::binary(&self.content, mimetype.essence_str())?,
        };

        part.set_header(
            "Content-Disposition",
            &content_disposition(self.filename.as_deref()),
            charset.as_str(),
        )?;
        Ok(part)
    }
}

/// Alternative rendering of the body (e.g. HTML).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    /// Content of the alternative.
    pub content: String,
    /// MIME content type.
    pub mimetype: String,
}

impl Alternative {
    /// Creates an alternative; both fields must be non-empty.
    pub fn new(content: impl Into<String>, mimetype: impl Into<String>) -> MailResult<Self> {
        let content = content.into();
        let mimetype = mimetype.into();
        if content.is_empty() || mimetype.trim().is_empty() {
            return Err(MailError::attachment(
                "Both content and mimetype must be provided",
            ));
        }
        Ok(Self { content, mimetype })
    }

    fn to_part(&self, charset: Charset) -> MailResult<MimePart> {
        let mimetype: mime::Mime = self.mimetype.parse().map_err(|e| {
            MailError::attachment(format!("Invalid alternative mimetype {:?}", self.mimetype))
                .with_cause(e)
        })?;
        if mimetype.type_() == mime::TEXT {
            let charset = if self.content.is_ascii() { charset } else { Charset::Utf8 };
            MimePart::text(&self.content, mimetype.subtype().as_str(), charset)
        } else {
            MimePart::binary(self.content.as_bytes(), mimetype.essence_str())
        }
    }
}

/// An email message.
#[derive(Clone)]
pub struct EmailMessage {
    /// Subject line.
    pub subject: String,
    /// Main body.
    pub body: String,
    /// Sender; `None` means the message has no sender.
    pub from_email: Option<String>,
    /// Primary recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    pub cc: Vec<String>,
    /// Blind carbon-copy recipients; never written to headers.
    pub bcc: Vec<String>,
    /// Reply-To addresses.
    pub reply_to: Vec<String>,
    /// Extra headers in insertion order.
    pub extra_headers: Vec<(String, String)>,
    /// Attachments.
    pub attachments: Vec<Attachment>,
    /// Alternative renderings of the body.
    pub alternatives: Vec<Alternative>,
    /// Charset override; falls back to the settings' default charset.
    pub encoding: Option<String>,
    /// Subtype of the main body (`plain`, `html`, ...).
    pub content_subtype: String,
    settings: Arc<MailSettings>,
    mail: Option<Mail>,
    connection: Option<Connection>,
}

impl fmt::Debug for EmailMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailMessage")
            .field("subject", &self.subject)
            .field("from_email", &self.from_email)
            .field("to", &self.to)
            .field("cc", &self.cc)
            .field("bcc", &self.bcc)
            .field("attachments", &self.attachments.len())
            .field("alternatives", &self.alternatives.len())
            .field("bound", &self.mail.is_some())
            .field("connection", &self.connection)
            .finish()
    }
}

impl EmailMessage {
    /// Creates a builder bound to a settings snapshot but not to a mailer.
    pub fn builder(settings: Arc<MailSettings>) -> EmailMessageBuilder {
        EmailMessageBuilder::new(settings)
    }

    /// Returns the charset used to render this message.
    pub fn encoding(&self) -> &str {
        self.encoding
            .as_deref()
            .unwrap_or(&self.settings.default_charset)
    }

    /// Returns the settings snapshot this message was built with.
    pub fn settings(&self) -> &MailSettings {
        &self.settings
    }

    /// Returns the value of an extra header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.extra_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets an extra header, replacing any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.extra_headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.extra_headers.push((name, value.into()));
    }

    /// Returns every envelope recipient (to, cc, bcc), skipping empty ones.
    pub fn recipients(&self) -> Vec<String> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .filter(|addr| !addr.trim().is_empty())
            .cloned()
            .collect()
    }

    /// Adds an attachment from memory.
    pub fn attach(
        &mut self,
        filename: impl Into<String>,
        content: impl Into<Vec<u8>>,
        mimetype: Option<&str>,
    ) {
        self.attachments
            .push(Attachment::new(filename, content, mimetype));
    }

    /// Adds an attachment read from disk.
    pub async fn attach_file(
        &mut self,
        path: impl AsRef<Path>,
        mimetype: Option<&str>,
    ) -> MailResult<()> {
        let attachment = Attachment::from_path(path, mimetype).await?;
        self.attachments.push(attachment);
        Ok(())
    }

    /// Adds an alternative rendering of the body.
    pub fn attach_alternative(
        &mut self,
        content: impl Into<String>,
        mimetype: impl Into<String>,
    ) -> MailResult<()> {
        self.alternatives.push(Alternative::new(content, mimetype)?);
        Ok(())
    }

    /// Returns the explicitly bound connection, if any.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Binds the message to a connection used by [`send`](Self::send).
    pub fn set_connection(&mut self, connection: Option<Connection>) {
        self.connection = connection;
    }

    /// Renders the message into a MIME document.
    ///
    /// Every header is validated; a line break anywhere fails with
    /// [`MailErrorKind::BadHeader`].
    pub fn message(&self) -> MailResult<MimePart> {
        let encoding = self.encoding();
        let charset = Charset::parse(encoding)?;

        let mut msg = MimePart::text(&self.body, &self.content_subtype, charset)?;

        if !self.alternatives.is_empty() {
            let mut parts = Vec::with_capacity(self.alternatives.len() + 1);
            parts.push(msg);
            for alternative in &self.alternatives {
                parts.push(alternative.to_part(charset)?);
            }
            msg = MimePart::multipart("alternative", parts)?;
        }

        if !self.attachments.is_empty() {
            let mut parts = Vec::with_capacity(self.attachments.len() + 1);
            if !self.body.is_empty() || msg.is_multipart() {
                parts.push(msg);
            }
            for attachment in &self.attachments {
                parts.push(attachment.to_part(charset)?);
            }
            msg = MimePart::multipart("mixed", parts)?;
        }

        msg.set_header("MIME-Version", "1.0", encoding)?;
        msg.set_header("Subject", &self.subject, encoding)?;

        let from = self
            .header("From")
            .map(str::to_string)
            .or_else(|| self.from_email.clone());
        if let Some(from) = from {
            msg.set_header("From", &from, encoding)?;
        }

        self.set_list_header(&mut msg, "To", &self.to)?;
        self.set_list_header(&mut msg, "Cc", &self.cc)?;
        self.set_list_header(&mut msg, "Reply-To", &self.reply_to)?;

        if self.header("Date").is_none() {
            msg.set_header("Date", &format_date(self.settings.use_localtime), encoding)?;
        }
        if self.header("Message-ID").is_none() {
            msg.set_header(
                "Message-ID",
                &make_msgid(self.settings.local_hostname()),
                encoding,
            )?;
        }

        for (name, value) in &self.extra_headers {
            if !FIELD_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                msg.set_header(name, value, encoding)?;
            }
        }

        Ok(msg)
    }

    fn set_list_header(&self, msg: &mut MimePart, name: &str, values: &[String]) -> MailResult<()> {
        let value = match self.header(name) {
            Some(value) => value.to_string(),
            None if values.is_empty() => return Ok(()),
            None => values.join(", "),
        };
        msg.set_header(name, &value, self.encoding())
    }

    /// Renders and serializes the message.
    pub fn as_bytes(&self, linesep: &str) -> MailResult<Vec<u8>> {
        Ok(self.message()?.as_bytes(linesep))
    }

    /// Sends the message, returning the number delivered (0 or 1).
    ///
    /// A message without recipients returns 0 without touching any
    /// backend. Header validation happens before any I/O.
    pub async fn send(&self, fail_silently: bool) -> MailResult<usize> {
        if self.recipients().is_empty() {
            return Ok(0);
        }

        self.message()?;

        let connection = match &self.connection {
            Some(connection) => connection.clone(),
            None => {
                let mail = self.mail.as_ref().ok_or_else(|| {
                    MailError::configuration(
                        "Message has neither a connection nor a mailer to create one",
                    )
                })?;
                mail.get_connection(None, ConnectionOptions::new().fail_silently(fail_silently))?
            }
        };

        connection.send_messages(std::slice::from_ref(self)).await
    }

    /// Returns a copy that holds no mailer or connection handles.
    pub(crate) fn detached(&self) -> EmailMessage {
        EmailMessage {
            mail: None,
            connection: None,
            ..self.clone()
        }
    }
}

/// Builder for email messages.
#[derive(Debug)]
pub struct EmailMessageBuilder {
    settings: Arc<MailSettings>,
    mail: Option<Mail>,
    connection: Option<Connection>,
    subject: String,
    body: String,
    from_email: Option<Option<String>>,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    reply_to: Vec<String>,
    headers: Vec<(String, String)>,
    attachments: Vec<Attachment>,
    alternatives: Vec<(String, String)>,
    encoding: Option<String>,
    content_subtype: Option<String>,
}

impl EmailMessageBuilder {
    /// Creates a builder for the given settings snapshot.
    pub fn new(settings: Arc<MailSettings>) -> Self {
        Self {
            settings,
            mail: None,
            connection: None,
            subject: String::new(),
            body: String::new(),
            from_email: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            headers: Vec::new(),
            attachments: Vec::new(),
            alternatives: Vec::new(),
            encoding: None,
            content_subtype: None,
        }
    }

    pub(crate) fn mail(mut self, mail: Mail) -> Self {
        self.mail = Some(mail);
        self
    }

    /// Sets the subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the sender.
    pub fn from_email(mut self, from_email: impl Into<String>) -> Self {
        self.from_email = Some(Some(from_email.into()));
        self
    }

    /// Sets the sender if given, otherwise keeps the default sender.
    pub fn sender(mut self, from_email: Option<impl Into<String>>) -> Self {
        if let Some(from_email) = from_email {
            self.from_email = Some(Some(from_email.into()));
        }
        self
    }

    /// Sends without a sender, ignoring the default sender.
    pub fn no_sender(mut self) -> Self {
        self.from_email = Some(None);
        self
    }

    /// Adds primary recipients.
    pub fn to<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Adds carbon-copy recipients.
    pub fn cc<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cc.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Adds blind carbon-copy recipients.
    pub fn bcc<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bcc.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Adds Reply-To addresses.
    pub fn reply_to<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reply_to.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Adds a custom header, replacing any previous value.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Adds an attachment.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Adds an alternative rendering of the body.
    pub fn alternative(mut self, content: impl Into<String>, mimetype: impl Into<String>) -> Self {
        self.alternatives.push((content.into(), mimetype.into()));
        self
    }

    /// Overrides the charset.
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Sets the body subtype (defaults to `plain`).
    pub fn content_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.content_subtype = Some(subtype.into());
        self
    }

    /// Binds the message to a connection.
    pub fn connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Builds the message, resolving the sender against the settings.
    pub fn build(self) -> MailResult<EmailMessage> {
        if let Some(encoding) = &self.encoding {
            Charset::parse(encoding)?;
        }

        let alternatives = self
            .alternatives
            .into_iter()
            .map(|(content, mimetype)| Alternative::new(content, mimetype))
            .collect::<MailResult<Vec<_>>>()?;

        let from_email = match self.from_email {
            Some(explicit) => explicit,
            None => self.settings.default_sender.clone(),
        };

        Ok(EmailMessage {
            subject: self.subject,
            body: self.body,
            from_email,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
            extra_headers: self.headers,
            attachments: self.attachments,
            alternatives,
            encoding: self.encoding,
            content_subtype: self.content_subtype.unwrap_or_else(|| "plain".to_string()),
            settings: self.settings,
            mail: self.mail,
            connection: self.connection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MailErrorKind;

    fn settings() -> Arc<MailSettings> {
        Arc::new(
            MailSettings::builder()
                .no_tls()
                .default_sender("from@example.com")
                .local_hostname("mail.example.com")
                .build()
                .unwrap(),
        )
    }

    fn message() -> EmailMessageBuilder {
        EmailMessage::builder(settings())
            .subject("testing")
            .body("testing")
            .to(["to@example.com"])
    }

    #[test]
    fn test_default_sender_resolution() {
        let msg = message().build().unwrap();
        assert_eq!(msg.from_email.as_deref(), Some("from@example.com"));

        let msg = message().from_email("other@example.com").build().unwrap();
        assert_eq!(msg.from_email.as_deref(), Some("other@example.com"));

        let msg = message().no_sender().build().unwrap();
        assert_eq!(msg.from_email, None);
        let rendered = msg.message().unwrap();
        assert_eq!(rendered.header("From"), None);
    }

    #[test]
    fn test_plain_message_headers() {
        let msg = message()
            .cc(["cc@example.com"])
            .bcc(["hidden@example.com"])
            .reply_to(["reply@example.com"])
            .build()
            .unwrap();
        let rendered = msg.message().unwrap();

        assert_eq!(rendered.content_type(), "text/plain");
        assert_eq!(rendered.header("Subject"), Some("testing"));
        assert_eq!(rendered.header("From"), Some("from@example.com"));
        assert_eq!(rendered.header("To"), Some("to@example.com"));
        assert_eq!(rendered.header("Cc"), Some("cc@example.com"));
        assert_eq!(rendered.header("Reply-To"), Some("reply@example.com"));
        assert_eq!(rendered.header("MIME-Version"), Some("1.0"));
        assert_eq!(rendered.header("Bcc"), None);
        assert!(rendered.header("Date").is_some());
        assert!(rendered
            .header("Message-ID")
            .unwrap()
            .ends_with("@mail.example.com>"));

        let text = msg.as_bytes("\n").map(String::from_utf8).unwrap().unwrap();
        assert!(!text.contains("hidden@example.com"));
        assert!(text.ends_with("\n\ntesting"));
    }

    #[test]
    fn test_recipients_include_bcc() {
        let msg = message()
            .cc(["cc@example.com", ""])
            .bcc(["hidden@example.com"])
            .build()
            .unwrap();
        assert_eq!(
            msg.recipients(),
            vec!["to@example.com", "cc@example.com", "hidden@example.com"]
        );
    }

    #[test]
    fn test_extra_headers_override_fields() {
        let msg = message()
            .header("From", "Override <override@example.com>")
            .header("To", "list@example.com")
            .header("Message-ID", "<fixed@example.com>")
            .header("X-Mailer", "integrations-mailer")
            .build()
            .unwrap();
        let rendered = msg.message().unwrap();

        assert_eq!(rendered.header("From"), Some("Override <override@example.com>"));
        assert_eq!(rendered.header("To"), Some("list@example.com"));
        assert_eq!(rendered.header("Message-ID"), Some("<fixed@example.com>"));
        assert_eq!(rendered.header("X-Mailer"), Some("integrations-mailer"));
        assert_eq!(
            rendered.headers().iter().filter(|(n, _)| n == "To").count(),
            1
        );
    }

    #[test]
    fn test_bad_headers_rejected() {
        let msg = message().subject("testing\n\r").build().unwrap();
        assert!(msg.message().unwrap_err().is_bad_header());

        let msg = message().header("X-Custom", "a\r\nBcc: x@example.com").build().unwrap();
        assert!(msg.message().unwrap_err().is_bad_header());

        let msg = message().to(["victim@example.com\nX-Injected: 1"]).build().unwrap();
        assert!(msg.message().unwrap_err().is_bad_header());
    }

    #[test]
    fn test_alternative_structure() {
        let msg = message()
            .alternative("<p>testing</p>", "text/html")
            .build()
            .unwrap();
        let rendered = msg.message().unwrap();

        assert_eq!(rendered.content_type(), "multipart/alternative");
        assert_eq!(rendered.parts().len(), 2);
        assert_eq!(rendered.parts()[0].content_type(), "text/plain");
        assert_eq!(rendered.parts()[1].content_type(), "text/html");
    }

    #[test]
    fn test_mixed_with_nested_alternative() {
        let mut msg = message()
            .alternative("<p>testing</p>", "text/html")
            .build()
            .unwrap();
        msg.attach("report.pdf", vec![0x25, 0x50, 0x44, 0x46], None);
        msg.attach("notes.txt", "plain notes", None);
        let rendered = msg.message().unwrap();

        assert_eq!(rendered.content_type(), "multipart/mixed");
        let parts = rendered.parts();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].content_type(), "multipart/alternative");
        assert_eq!(parts[1].content_type(), "application/pdf");
        assert_eq!(parts[1].header("Content-Transfer-Encoding"), Some("base64"));
        assert_eq!(
            parts[1].header("Content-Disposition"),
            Some("attachment; filename=\"report.pdf\"")
        );
        assert_eq!(parts[2].content_type(), "text/plain");
        assert_eq!(parts[2].header("Content-Transfer-Encoding"), Some("7bit"));
    }

    #[test]
    fn test_attachment_without_body_omits_body_part() {
        let mut msg = message().body("").build().unwrap();
        msg.attach("data.bin", vec![1, 2, 3], None);
        let rendered = msg.message().unwrap();
        assert_eq!(rendered.parts().len(), 1);
        assert_eq!(rendered.parts()[0].content_type(), "application/octet-stream");
    }

    #[test]
    fn test_attach_alternative_requires_content_and_mimetype() {
        let mut msg = message().build().unwrap();
        let err = msg.attach_alternative("", "text/html").unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::AttachmentError);
        assert!(msg.attach_alternative("<p>x</p>", "").is_err());
        assert!(message().alternative("x", " ").build().is_err());
    }

    #[test]
    fn test_non_ascii_subject_and_body() {
        let msg = message().subject("Grüße").body("Grüße aus Köln").build().unwrap();
        let rendered = msg.message().unwrap();
        assert!(rendered.header("Subject").unwrap().starts_with("=?utf-8?b?"));
        assert_eq!(rendered.header("Content-Transfer-Encoding"), Some("8bit"));
    }

    #[test]
    fn test_unsupported_encoding() {
        let err = message().encoding("koi8-r").build().unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::ConfigurationInvalid);
    }

    #[test]
    fn test_html_subtype() {
        let msg = message().body("<b>hi</b>").content_subtype("html").build().unwrap();
        assert_eq!(msg.message().unwrap().content_type(), "text/html");
    }

    #[tokio::test]
    async fn test_attach_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.csv");
        tokio::fs::write(&path, "a,b\n1,2\n").await.unwrap();

        let mut msg = message().build().unwrap();
        msg.attach_file(&path, None).await.unwrap();
        assert_eq!(msg.attachments[0].filename.as_deref(), Some("invoice.csv"));
        assert_eq!(msg.attachments[0].mimetype, "text/csv");

        let missing = msg.attach_file(dir.path().join("missing.txt"), None).await;
        assert_eq!(missing.unwrap_err().kind(), MailErrorKind::AttachmentError);
    }

    #[tokio::test]
    async fn test_unbound_message_cannot_send() {
        let msg = message().build().unwrap();
        let err = msg.send(false).await.unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::ConfigurationInvalid);

        let empty = EmailMessage::builder(settings()).subject("x").build().unwrap();
        assert_eq!(empty.send(false).await.unwrap(), 0);
    }
}
