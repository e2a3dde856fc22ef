//! Mock implementations for testing.
//!
//! [`MockTransport`] plays a scripted SMTP server: queued replies are
//! returned first, otherwise each command gets the reply a well-behaved
//! server would send. Clones share state, so a test can keep one handle
//! while the smtp backend owns another through [`MockConnector`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::protocol::{codes, SmtpCommand, SmtpResponse};
use crate::transport::{ConnectParams, SmtpConnector, SmtpTransport, TlsParams};

#[derive(Debug)]
struct MockState {
    responses: VecDeque<SmtpResponse>,
    commands: Vec<SmtpCommand>,
    data: Vec<Vec<u8>>,
    ehlo_lines: Vec<String>,
    fail_next: Option<(MailErrorKind, String)>,
    fail_shutdown: bool,
    tls_enabled: bool,
    shut_down: bool,
    data_pending: bool,
    auth_continuations: u8,
}

/// Mock SMTP transport for testing.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a new mock transport advertising the default capabilities.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                responses: VecDeque::new(),
                commands: Vec::new(),
                data: Vec::new(),
                ehlo_lines: default_ehlo_lines(),
                fail_next: None,
                fail_shutdown: false,
                tls_enabled: false,
                shut_down: false,
                data_pending: false,
                auth_continuations: 0,
            })),
        }
    }

    /// Replaces the capability lines sent after the EHLO greeting line.
    pub fn with_capabilities(self, lines: &[&str]) -> Self {
        self.state.lock().ehlo_lines = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Queues a response.
    pub fn queue_response(&self, response: SmtpResponse) -> &Self {
        self.state.lock().responses.push_back(response);
        self
    }

    /// Queues an OK response.
    pub fn queue_ok(&self) -> &Self {
        self.queue_response(SmtpResponse::new(codes::OK, "OK"))
    }

    /// Queues an error response.
    pub fn queue_error(&self, code: u16, message: &str) -> &Self {
        self.queue_response(SmtpResponse::new(code, message))
    }

    /// Sets the next call to fail.
    pub fn fail_next_with(&self, kind: MailErrorKind, message: &str) -> &Self {
        self.state.lock().fail_next = Some((kind, message.to_string()));
        self
    }

    /// Makes every later `shutdown` fail after closing the connection.
    pub fn fail_shutdown(&self) -> &Self {
        self.state.lock().fail_shutdown = true;
        self
    }

    /// Returns recorded commands as sent on the wire.
    pub fn commands(&self) -> Vec<String> {
        self.state
            .lock()
            .commands
            .iter()
            .map(SmtpCommand::to_smtp_string)
            .collect()
    }

    /// Returns recorded commands.
    pub fn recorded_commands(&self) -> Vec<SmtpCommand> {
        self.state.lock().commands.clone()
    }

    /// Returns received data.
    pub fn received_data(&self) -> Vec<Vec<u8>> {
        self.state.lock().data.clone()
    }

    /// Returns true once TLS was negotiated.
    pub fn tls_enabled(&self) -> bool {
        self.state.lock().tls_enabled
    }

    /// Returns true once the transport was dropped without QUIT.
    pub fn was_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    fn take_failure(&self) -> MailResult<()> {
        match self.state.lock().fail_next.take() {
            Some((kind, message)) => Err(MailError::new(kind, message)),
            None => Ok(()),
        }
    }

    fn scripted_reply(state: &mut MockState, command: &SmtpCommand) -> SmtpResponse {
        match command {
            SmtpCommand::Ehlo(_) => {
                let mut message = vec!["smtp.example.com Hello".to_string()];
                message.extend(state.ehlo_lines.iter().cloned());
                SmtpResponse {
                    code: codes::OK,
                    enhanced_code: None,
                    message,
                }
            }
            SmtpCommand::StartTls => greeting_response(),
            SmtpCommand::Auth {
                initial_response: Some(_),
                ..
            } => auth_success_response(),
            SmtpCommand::Auth { mechanism, .. } if mechanism == "LOGIN" => {
                state.auth_continuations = 1;
                auth_continue_response("VXNlcm5hbWU6")
            }
            SmtpCommand::Auth { .. } => {
                state.auth_continuations = 0;
                auth_continue_response(CRAM_MD5_CHALLENGE)
            }
            SmtpCommand::AuthResponse(_) if state.auth_continuations > 0 => {
                state.auth_continuations -= 1;
                auth_continue_response("UGFzc3dvcmQ6")
            }
            SmtpCommand::AuthResponse(_) => auth_success_response(),
            SmtpCommand::Data => data_ready_response(),
            SmtpCommand::Quit => SmtpResponse::new(codes::SERVICE_CLOSING, "Bye"),
            _ => SmtpResponse::new(codes::OK, "OK"),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SmtpTransport for MockTransport {
    async fn send_command(&mut self, command: &SmtpCommand) -> MailResult<SmtpResponse> {
        self.take_failure()?;

        let mut state = self.state.lock();
        if state.shut_down {
            return Err(MailError::new(
                MailErrorKind::ServerDisconnected,
                "Connection is closed",
            ));
        }
        state.commands.push(command.clone());
        let queued = state.responses.pop_front();
        Ok(match queued {
            Some(reply) => reply,
            None => Self::scripted_reply(&mut state, command),
        })
    }

    async fn send_data(&mut self, data: &[u8]) -> MailResult<()> {
        self.take_failure()?;
        let mut state = self.state.lock();
        state.data.push(data.to_vec());
        state.data_pending = true;
        Ok(())
    }

    async fn read_response(&mut self) -> MailResult<SmtpResponse> {
        self.take_failure()?;
        let mut state = self.state.lock();
        let data_pending = std::mem::take(&mut state.data_pending);
        Ok(match state.responses.pop_front() {
            Some(reply) => reply,
            None if data_pending => SmtpResponse::new(codes::OK, "Queued"),
            None => greeting_response(),
        })
    }

    async fn upgrade_tls(&mut self, _params: &TlsParams) -> MailResult<()> {
        self.take_failure()?;
        self.state.lock().tls_enabled = true;
        Ok(())
    }

    fn is_tls(&self) -> bool {
        self.state.lock().tls_enabled
    }

    async fn shutdown(&mut self) -> MailResult<()> {
        let mut state = self.state.lock();
        state.shut_down = true;
        if state.fail_shutdown {
            return Err(MailError::new(
                MailErrorKind::ConnectionReset,
                "Connection reset during shutdown",
            ));
        }
        Ok(())
    }
}

/// Connector handing out clones of one [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockConnector {
    transport: MockTransport,
    connects: Arc<AtomicUsize>,
    last_params: Arc<Mutex<Option<ConnectParams>>>,
    failure: Option<MailErrorKind>,
}

impl MockConnector {
    /// Creates a connector around a transport.
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport,
            connects: Arc::new(AtomicUsize::new(0)),
            last_params: Arc::new(Mutex::new(None)),
            failure: None,
        }
    }

    /// Creates a connector whose connects always fail with `kind`.
    pub fn failing(kind: MailErrorKind) -> Self {
        Self {
            failure: Some(kind),
            ..Self::new(MockTransport::new())
        }
    }

    /// Returns the shared transport.
    pub fn transport(&self) -> &MockTransport {
        &self.transport
    }

    /// Returns how many times `connect` was called.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Returns the parameters of the last connect.
    pub fn last_params(&self) -> Option<ConnectParams> {
        self.last_params.lock().clone()
    }
}

#[async_trait]
impl SmtpConnector for MockConnector {
    async fn connect(&self, params: &ConnectParams) -> MailResult<Box<dyn SmtpTransport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock() = Some(params.clone());
        if let Some(kind) = self.failure {
            return Err(MailError::new(
                kind,
                format!("Connection refused to {}", params.address()),
            ));
        }
        let mut transport = self.transport.clone();
        transport.state.lock().shut_down = false;
        if params.implicit_tls {
            transport.upgrade_tls(&params.tls).await?;
        }
        Ok(Box::new(transport))
    }
}

/// RFC 2195 sample challenge, base64-encoded.
const CRAM_MD5_CHALLENGE: &str = "PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+";

fn default_ehlo_lines() -> Vec<String> {
    vec![
        "SIZE 10485760".to_string(),
        "AUTH PLAIN LOGIN CRAM-MD5".to_string(),
        "STARTTLS".to_string(),
        "8BITMIME".to_string(),
    ]
}

/// Creates a greeting response.
pub fn greeting_response() -> SmtpResponse {
    SmtpResponse::new(codes::SERVICE_READY, "smtp.example.com ESMTP ready")
}

/// Creates an authentication success response.
pub fn auth_success_response() -> SmtpResponse {
    SmtpResponse::new(codes::AUTH_SUCCESS, "Authentication successful")
}

/// Creates a DATA ready response.
pub fn data_ready_response() -> SmtpResponse {
    SmtpResponse::new(codes::START_MAIL_INPUT, "Start mail input")
}

/// Creates an AUTH continue response.
pub fn auth_continue_response(challenge: &str) -> SmtpResponse {
    SmtpResponse::new(codes::AUTH_CONTINUE, challenge)
}
