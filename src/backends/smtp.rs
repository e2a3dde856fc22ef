//! SMTP delivery backend.
//!
//! One backend instance owns at most one SMTP session. The session is
//! established by [`open`](EmailBackend::open):
//!
//! 1. connect, with implicit TLS when `use_ssl`
//! 2. read the 220 greeting
//! 3. EHLO, falling back to HELO
//! 4. STARTTLS and a second EHLO when `use_tls`
//! 5. AUTH when a username and password are configured
//!
//! Each message is then sent as one MAIL/RCPT/DATA transaction.

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;

use super::{BackendContext, EmailBackend, Opened};
use crate::auth::{Authenticator, Credentials};
use crate::config::MailSettings;
use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::message::EmailMessage;
use crate::mime::prepare_data_content;
use crate::protocol::{codes, EsmtpCapabilities, SmtpCommand};
use crate::sanitize::envelope_address;
use crate::transport::{ConnectParams, SmtpConnector, SmtpTransport, TcpConnector};

/// Backend delivering over SMTP.
#[derive(Debug)]
pub struct SmtpBackend {
    settings: MailSettings,
    fail_silently: bool,
    connector: Arc<dyn SmtpConnector>,
    transport: Option<Box<dyn SmtpTransport>>,
    capabilities: EsmtpCapabilities,
}

impl SmtpBackend {
    /// Creates a backend from the context's settings and overrides.
    pub fn new(ctx: &BackendContext) -> MailResult<Self> {
        let mut backend = Self::with_settings(ctx.settings.with_overrides(&ctx.options))?;
        backend.fail_silently = ctx.options.fail_silently;
        Ok(backend)
    }

    /// Creates a backend for fully merged settings.
    pub fn with_settings(settings: MailSettings) -> MailResult<Self> {
        if settings.use_tls && settings.use_ssl {
            return Err(MailError::configuration(
                "use_tls and use_ssl are mutually exclusive, so only set one of those settings to true",
            ));
        }
        Ok(Self {
            settings,
            fail_silently: false,
            connector: Arc::new(TcpConnector),
            transport: None,
            capabilities: EsmtpCapabilities::default(),
        })
    }

    /// Replaces the connector used to open sessions.
    pub fn with_connector(mut self, connector: Arc<dyn SmtpConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Sets whether transport failures are swallowed.
    pub fn with_fail_silently(mut self, fail_silently: bool) -> Self {
        self.fail_silently = fail_silently;
        self
    }

    /// Returns the merged settings.
    pub fn settings(&self) -> &MailSettings {
        &self.settings
    }

    /// Returns true while a session is open.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Returns the capabilities of the open session.
    pub fn capabilities(&self) -> &EsmtpCapabilities {
        &self.capabilities
    }

    async fn connect(&self) -> MailResult<(Box<dyn SmtpTransport>, EsmtpCapabilities)> {
        let params = ConnectParams::from_settings(&self.settings);
        tracing::debug!(
            address = %params.address(),
            implicit_tls = params.implicit_tls,
            starttls = self.settings.use_tls,
            "Opening SMTP session"
        );

        let mut transport = self.connector.connect(&params).await?;
        match self.handshake(transport.as_mut(), &params).await {
            Ok(capabilities) => Ok((transport, capabilities)),
            Err(err) => {
                Self::shutdown(transport.as_mut()).await;
                Err(err)
            }
        }
    }

    async fn handshake(
        &self,
        transport: &mut dyn SmtpTransport,
        params: &ConnectParams,
    ) -> MailResult<EsmtpCapabilities> {
        transport
            .read_response()
            .await?
            .expect_code(codes::SERVICE_READY)?;

        let mut capabilities = self.hello(transport).await?;

        if self.settings.use_tls && !transport.is_tls() {
            if !capabilities.starttls {
                return Err(MailError::new(
                    MailErrorKind::StarttlsNotSupported,
                    "STARTTLS extension not supported by server",
                ));
            }
            transport
                .send_command(&SmtpCommand::StartTls)
                .await?
                .expect_code(codes::SERVICE_READY)?;
            transport.upgrade_tls(&params.tls).await?;
            capabilities = self.hello(transport).await?;
        }

        if let Some(credentials) = self.credentials() {
            Authenticator::authenticate(transport, &capabilities, &credentials).await?;
        }

        Ok(capabilities)
    }

    async fn hello(&self, transport: &mut dyn SmtpTransport) -> MailResult<EsmtpCapabilities> {
        let hostname = self.settings.local_hostname().to_string();
        let response = transport
            .send_command(&SmtpCommand::Ehlo(hostname.clone()))
            .await?;
        if response.is_success() {
            return Ok(EsmtpCapabilities::from_ehlo_response(&response));
        }

        tracing::debug!(code = response.code, "EHLO rejected, falling back to HELO");
        transport
            .send_command(&SmtpCommand::Helo(hostname))
            .await?
            .expect_success()?;
        Ok(EsmtpCapabilities::default())
    }

    fn credentials(&self) -> Option<Credentials> {
        if !self.settings.has_auth() {
            return None;
        }
        let username = self.settings.username.clone()?;
        let password: SecretString = self.settings.password.clone()?;
        Some(Credentials::new(username, password))
    }

    async fn shutdown(transport: &mut dyn SmtpTransport) {
        if let Err(err) = transport.shutdown().await {
            tracing::debug!(error = %err, "Transport shutdown failed");
        }
    }

    async fn reset(transport: &mut dyn SmtpTransport) {
        if let Err(err) = transport.send_command(&SmtpCommand::Rset).await {
            tracing::debug!(error = %err, "RSET failed");
        }
    }
}

#[async_trait]
impl EmailBackend for SmtpBackend {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn fail_silently(&self) -> bool {
        self.fail_silently
    }

    async fn open(&mut self) -> MailResult<Opened> {
        if self.transport.is_some() {
            return Ok(Opened::AlreadyOpen);
        }

        match self.connect().await {
            Ok((transport, capabilities)) => {
                self.transport = Some(transport);
                self.capabilities = capabilities;
                Ok(Opened::Created)
            }
            Err(err) if self.fail_silently && err.is_suppressible() => {
                tracing::warn!(server = %self.settings.address(), error = %err, "Suppressed SMTP open failure");
                Ok(Opened::Suppressed)
            }
            Err(err) => Err(err),
        }
    }

    async fn close(&mut self) -> MailResult<()> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        self.capabilities = EsmtpCapabilities::default();

        let result = transport.send_command(&SmtpCommand::Quit).await;
        Self::shutdown(transport.as_mut()).await;

        match result {
            Ok(_) => {
                tracing::debug!(server = %self.settings.address(), "Closed SMTP session");
                Ok(())
            }
            Err(err) if err.kind() == MailErrorKind::ServerDisconnected => Ok(()),
            Err(err) if self.fail_silently => {
                tracing::warn!(error = %err, "Suppressed SMTP close failure");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn deliver(&mut self, message: &EmailMessage) -> MailResult<bool> {
        let recipients = message.recipients();
        if recipients.is_empty() {
            return Ok(false);
        }

        let encoding = message.encoding();
        let from = match &message.from_email {
            Some(from) => envelope_address(from, encoding)?,
            None => "<>".to_string(),
        };
        let recipients = recipients
            .iter()
            .map(|addr| envelope_address(addr, encoding))
            .collect::<MailResult<Vec<_>>>()?;
        let content = message.as_bytes("\r\n")?;

        let capabilities = &self.capabilities;
        let transport = self.transport.as_deref_mut().ok_or_else(|| {
            MailError::new(MailErrorKind::ServerDisconnected, "SMTP session is not open")
        })?;

        let response = transport
            .send_command(&SmtpCommand::MailFrom {
                address: from.clone(),
                size: capabilities.size.map(|_| content.len()),
                body_8bit: capabilities.eight_bit_mime && !content.is_ascii(),
            })
            .await?;
        if !response.is_success() {
            Self::reset(transport).await;
            let err = response.to_error();
            let kind = match err.kind() {
                MailErrorKind::RecipientsRefused => MailErrorKind::SenderRefused,
                other => other,
            };
            return Err(MailError::new(kind, format!("Sender {} refused: {}", from, err.message()))
                .with_smtp_code(response.code));
        }

        let mut accepted = 0;
        for recipient in &recipients {
            let response = transport
                .send_command(&SmtpCommand::RcptTo {
                    address: recipient.clone(),
                })
                .await?;
            if response.is_success() {
                accepted += 1;
            } else {
                tracing::warn!(recipient = %recipient, reply = %response, "Recipient refused");
            }
        }
        if accepted == 0 {
            Self::reset(transport).await;
            return Err(MailError::new(
                MailErrorKind::RecipientsRefused,
                format!("All recipients were refused: {}", recipients.join(", ")),
            ));
        }

        transport
            .send_command(&SmtpCommand::Data)
            .await?
            .expect_code(codes::START_MAIL_INPUT)?;
        transport.send_data(&prepare_data_content(&content)).await?;
        transport.read_response().await?.expect_success()?;

        tracing::debug!(from = %from, recipients = accepted, size = content.len(), "Message accepted");
        Ok(true)
    }
}
