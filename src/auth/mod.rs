//! SASL authentication for the smtp backend.
//!
//! Supports the mechanisms a username/password pair can drive:
//! - PLAIN (RFC 4616)
//! - LOGIN (obsolete but widely used)
//! - CRAM-MD5 (RFC 2195)

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::Md5;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::protocol::{codes, EsmtpCapabilities, SmtpCommand, SmtpResponse};
use crate::transport::SmtpTransport;

/// Authentication mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    /// PLAIN authentication (RFC 4616).
    Plain,
    /// LOGIN authentication (obsolete).
    Login,
    /// CRAM-MD5 challenge-response.
    CramMd5,
}

impl AuthMethod {
    /// Every mechanism usable with a username and password.
    pub const ALL: [AuthMethod; 3] = [AuthMethod::CramMd5, AuthMethod::Plain, AuthMethod::Login];

    /// Returns the SMTP AUTH mechanism name.
    pub fn mechanism_name(&self) -> &'static str {
        match self {
            AuthMethod::Plain => "PLAIN",
            AuthMethod::Login => "LOGIN",
            AuthMethod::CramMd5 => "CRAM-MD5",
        }
    }

    /// Returns the priority for auto-selection (higher is better).
    pub fn priority(&self) -> u8 {
        match self {
            AuthMethod::CramMd5 => 3,
            AuthMethod::Plain => 2,
            AuthMethod::Login => 1,
        }
    }

    /// Parses from SMTP capability string.
    pub fn from_capability(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Some(AuthMethod::Plain),
            "LOGIN" => Some(AuthMethod::Login),
            "CRAM-MD5" => Some(AuthMethod::CramMd5),
            _ => None,
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mechanism_name())
    }
}

/// Username and password for SMTP AUTH.
#[derive(Clone)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password (protected).
    pub password: SecretString,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// SASL response encoders.
pub struct Authenticator;

impl Authenticator {
    /// Generates the initial response for PLAIN authentication.
    pub fn plain_initial_response(username: &str, password: &SecretString) -> String {
        BASE64.encode(format!("\0{}\0{}", username, password.expose_secret()))
    }

    /// Generates LOGIN username response.
    pub fn login_username(username: &str) -> String {
        BASE64.encode(username)
    }

    /// Generates LOGIN password response.
    pub fn login_password(password: &SecretString) -> String {
        BASE64.encode(password.expose_secret())
    }

    /// Generates CRAM-MD5 response.
    pub fn cram_md5_response(
        challenge: &str,
        username: &str,
        password: &SecretString,
    ) -> MailResult<String> {
        let challenge_bytes = BASE64.decode(challenge.trim()).map_err(|e| {
            MailError::authentication(format!("Invalid CRAM-MD5 challenge: {}", e))
        })?;

        let mut mac = Hmac::<Md5>::new_from_slice(password.expose_secret().as_bytes())
            .map_err(|e| MailError::authentication(format!("HMAC error: {}", e)))?;
        mac.update(&challenge_bytes);
        let digest = mac.finalize().into_bytes();

        let hex_digest: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Ok(BASE64.encode(format!("{} {}", username, hex_digest)))
    }

    /// Picks the strongest mechanism advertised by the server.
    pub fn select_method(capabilities: &EsmtpCapabilities) -> MailResult<AuthMethod> {
        capabilities
            .best_auth_method(&AuthMethod::ALL)
            .ok_or_else(|| {
                MailError::new(
                    MailErrorKind::AuthMethodNotSupported,
                    "No suitable authentication method found",
                )
            })
    }

    /// Runs the SASL exchange over an established transport.
    pub async fn authenticate(
        transport: &mut dyn SmtpTransport,
        capabilities: &EsmtpCapabilities,
        credentials: &Credentials,
    ) -> MailResult<AuthMethod> {
        let method = Self::select_method(capabilities)?;
        tracing::debug!(method = %method, username = %credentials.username, "Authenticating");

        let response = match method {
            AuthMethod::Plain => {
                let initial = Self::plain_initial_response(&credentials.username, &credentials.password);
                transport
                    .send_command(&SmtpCommand::Auth {
                        mechanism: method.mechanism_name().to_string(),
                        initial_response: Some(initial),
                    })
                    .await?
            }
            AuthMethod::Login => {
                let challenge = start(transport, method).await?;
                expect_continue(challenge)?;
                let response = transport
                    .send_command(&SmtpCommand::AuthResponse(Self::login_username(
                        &credentials.username,
                    )))
                    .await?;
                expect_continue(response)?;
                transport
                    .send_command(&SmtpCommand::AuthResponse(Self::login_password(
                        &credentials.password,
                    )))
                    .await?
            }
            AuthMethod::CramMd5 => {
                let challenge = expect_continue(start(transport, method).await?)?;
                let answer = Self::cram_md5_response(
                    challenge.first_message(),
                    &credentials.username,
                    &credentials.password,
                )?;
                transport
                    .send_command(&SmtpCommand::AuthResponse(answer))
                    .await?
            }
        };

        response.expect_code(codes::AUTH_SUCCESS)?;
        Ok(method)
    }
}

async fn start(transport: &mut dyn SmtpTransport, method: AuthMethod) -> MailResult<SmtpResponse> {
    transport
        .send_command(&SmtpCommand::Auth {
            mechanism: method.mechanism_name().to_string(),
            initial_response: None,
        })
        .await
}

fn expect_continue(response: SmtpResponse) -> MailResult<SmtpResponse> {
    response.expect_code(codes::AUTH_CONTINUE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{auth_continue_response, auth_success_response, MockTransport};
    use crate::protocol::SmtpResponse;

    fn caps(mechanisms: &[AuthMethod]) -> EsmtpCapabilities {
        EsmtpCapabilities {
            auth_mechanisms: mechanisms.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("user", SecretString::new("password".to_string()))
    }

    #[test]
    fn test_auth_method_from_capability() {
        assert_eq!(AuthMethod::from_capability("PLAIN"), Some(AuthMethod::Plain));
        assert_eq!(AuthMethod::from_capability("login"), Some(AuthMethod::Login));
        assert_eq!(AuthMethod::from_capability("CRAM-MD5"), Some(AuthMethod::CramMd5));
        assert_eq!(AuthMethod::from_capability("XOAUTH2"), None);
    }

    #[test]
    fn test_plain_initial_response() {
        let password = SecretString::new("password".to_string());
        let response = Authenticator::plain_initial_response("user", &password);
        assert_eq!(BASE64.decode(response).unwrap(), b"\0user\0password");
    }

    #[test]
    fn test_cram_md5_response() {
        // RFC 2195 example
        let challenge = BASE64.encode("<1896.697170952@postoffice.reston.mci.net>");
        let password = SecretString::new("tanstaaftanstaaf".to_string());
        let response = Authenticator::cram_md5_response(&challenge, "tim", &password).unwrap();
        assert_eq!(
            String::from_utf8(BASE64.decode(response).unwrap()).unwrap(),
            "tim b913a602c7eda7a495b4e6e7334d3890"
        );
    }

    #[test]
    fn test_select_method() {
        let all = caps(&[AuthMethod::Plain, AuthMethod::Login, AuthMethod::CramMd5]);
        assert_eq!(Authenticator::select_method(&all).unwrap(), AuthMethod::CramMd5);

        let err = Authenticator::select_method(&caps(&[])).unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::AuthMethodNotSupported);
    }

    #[test]
    fn test_credentials_debug() {
        let creds = Credentials::new("user", SecretString::new("secret_password".to_string()));
        let debug_str = format!("{:?}", creds);
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("secret_password"));
    }

    #[tokio::test]
    async fn test_login_exchange() {
        let mut transport = MockTransport::new();
        transport.queue_response(auth_continue_response("VXNlcm5hbWU6"));
        transport.queue_response(auth_continue_response("UGFzc3dvcmQ6"));
        transport.queue_response(auth_success_response());

        let method = Authenticator::authenticate(
            &mut transport,
            &caps(&[AuthMethod::Login]),
            &credentials(),
        )
        .await
        .unwrap();

        assert_eq!(method, AuthMethod::Login);
        let commands = transport.commands();
        assert_eq!(commands[0], "AUTH LOGIN");
        assert_eq!(commands[1], BASE64.encode("user"));
        assert_eq!(commands[2], BASE64.encode("password"));
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let mut transport = MockTransport::new();
        transport.queue_response(SmtpResponse::new(535, "Authentication failed"));

        let err = Authenticator::authenticate(
            &mut transport,
            &caps(&[AuthMethod::Plain]),
            &credentials(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), MailErrorKind::CredentialsInvalid);
        assert!(transport.commands()[0].starts_with("AUTH PLAIN "));
    }
}
