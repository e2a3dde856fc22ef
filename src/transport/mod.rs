//! Transport layer for SMTP connections.
//!
//! Provides the byte-level seam the smtp backend talks through: a TCP
//! connection with optional implicit TLS or STARTTLS upgrade, and the
//! [`SmtpConnector`] factory that opens one.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::MailSettings;
use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::protocol::{SmtpCommand, SmtpResponse};

/// Trait for SMTP transport abstraction.
#[async_trait]
pub trait SmtpTransport: Send + Sync + fmt::Debug {
    /// Sends a command and receives a response.
    async fn send_command(&mut self, command: &SmtpCommand) -> MailResult<SmtpResponse>;

    /// Sends raw data (for DATA command body).
    async fn send_data(&mut self, data: &[u8]) -> MailResult<()>;

    /// Reads a response from the server.
    async fn read_response(&mut self) -> MailResult<SmtpResponse>;

    /// Upgrades the connection to TLS.
    async fn upgrade_tls(&mut self, params: &TlsParams) -> MailResult<()>;

    /// Returns true if TLS is enabled.
    fn is_tls(&self) -> bool;

    /// Drops the connection without a QUIT exchange.
    async fn shutdown(&mut self) -> MailResult<()>;
}

/// Opens transports. The smtp backend holds one of these so tests can
/// substitute an in-memory server.
#[async_trait]
pub trait SmtpConnector: Send + Sync + fmt::Debug {
    /// Connects and returns a transport positioned before the greeting.
    async fn connect(&self, params: &ConnectParams) -> MailResult<Box<dyn SmtpTransport>>;
}

/// TLS parameters for a handshake.
#[derive(Debug, Clone)]
pub struct TlsParams {
    /// Name checked against the server certificate.
    pub server_name: String,
    /// PEM certificate chain presented to the server.
    pub client_cert: Option<PathBuf>,
    /// PEM private key matching `client_cert`.
    pub client_key: Option<PathBuf>,
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Connect and per-command timeout.
    pub timeout: Duration,
    /// Wrap the socket in TLS before the greeting.
    pub implicit_tls: bool,
    /// TLS parameters for implicit TLS or STARTTLS.
    pub tls: TlsParams,
}

impl ConnectParams {
    /// Derives connection parameters from settings.
    pub fn from_settings(settings: &MailSettings) -> Self {
        Self {
            host: settings.server.clone(),
            port: settings.port,
            timeout: settings.effective_timeout(),
            implicit_tls: settings.use_ssl,
            tls: TlsParams {
                server_name: settings.server.clone(),
                client_cert: settings.ssl_certfile.clone(),
                client_key: settings.ssl_keyfile.clone(),
            },
        }
    }

    /// Returns `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connector for real TCP sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl SmtpConnector for TcpConnector {
    async fn connect(&self, params: &ConnectParams) -> MailResult<Box<dyn SmtpTransport>> {
        Ok(Box::new(TcpTransport::connect(params).await?))
    }
}

/// TCP connection with optional TLS.
pub struct TcpTransport {
    /// Read/write stream.
    stream: TransportStream,
    /// Command timeout.
    command_timeout: Duration,
    /// TLS enabled flag.
    tls_enabled: bool,
    /// Server host.
    host: String,
}

/// Stream type that can be plain TCP or TLS.
enum TransportStream {
    Plain(BufReader<TcpStream>),
    #[cfg(feature = "rustls-tls")]
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
    Closed,
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("host", &self.host)
            .field("tls_enabled", &self.tls_enabled)
            .field("closed", &matches!(self.stream, TransportStream::Closed))
            .finish()
    }
}

impl TcpTransport {
    /// Connects to an SMTP server. The greeting is left unread.
    pub async fn connect(params: &ConnectParams) -> MailResult<Self> {
        let address = params.address();

        let stream = timeout(params.timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                MailError::new(
                    MailErrorKind::ConnectionTimeout,
                    format!("Connect to {} timed out", address),
                )
            })?
            .map_err(|e| Self::map_io_error(e, &address))?;

        stream.set_nodelay(true).ok();

        let mut transport = Self {
            stream: TransportStream::Plain(BufReader::new(stream)),
            command_timeout: params.timeout,
            tls_enabled: false,
            host: params.host.clone(),
        };

        if params.implicit_tls {
            transport.upgrade_tls(&params.tls).await?;
        }

        tracing::debug!(address = %address, tls = transport.tls_enabled, "Connected to SMTP server");
        Ok(transport)
    }

    /// Maps IO errors to mail errors.
    fn map_io_error(error: io::Error, address: &str) -> MailError {
        let (kind, message) = match error.kind() {
            io::ErrorKind::ConnectionRefused => (
                MailErrorKind::ConnectionRefused,
                format!("Connection refused to {}", address),
            ),
            io::ErrorKind::TimedOut => (
                MailErrorKind::ConnectionTimeout,
                format!("Connect to {} timed out", address),
            ),
            io::ErrorKind::ConnectionReset => (
                MailErrorKind::ConnectionReset,
                "Connection reset by server".to_string(),
            ),
            io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => (
                MailErrorKind::DnsResolution,
                format!("Could not resolve {}", address),
            ),
            _ => (
                MailErrorKind::ConnectionRefused,
                format!("Connection error: {}", error),
            ),
        };
        MailError::new(kind, message).with_cause(error)
    }

    fn closed_error() -> MailError {
        MailError::new(MailErrorKind::ServerDisconnected, "Connection is closed")
    }

    /// Reads lines until we have a complete response.
    async fn read_response_inner<R: AsyncBufReadExt + Unpin>(
        reader: &mut R,
        timeout_duration: Duration,
    ) -> MailResult<SmtpResponse> {
        let mut lines = Vec::new();

        loop {
            let mut line = String::new();

            let read = timeout(timeout_duration, reader.read_line(&mut line))
                .await
                .map_err(|_| MailError::new(MailErrorKind::ReadTimeout, "Read timed out"))?
                .map_err(|e| {
                    MailError::new(MailErrorKind::ConnectionReset, format!("Read error: {}", e))
                        .with_cause(e)
                })?;

            if read == 0 {
                return Err(MailError::new(
                    MailErrorKind::ServerDisconnected,
                    "Server closed connection",
                ));
            }

            let line = line.trim_end().to_string();

            // Continuation lines carry a hyphen after the code.
            let is_continuation = line.as_bytes().get(3) == Some(&b'-');
            lines.push(line);

            if !is_continuation {
                break;
            }
        }

        SmtpResponse::parse(&lines)
    }

    /// Writes data to the stream.
    async fn write_all<W: AsyncWrite + Unpin>(
        writer: &mut W,
        data: &[u8],
        timeout_duration: Duration,
    ) -> MailResult<()> {
        timeout(timeout_duration, writer.write_all(data))
            .await
            .map_err(|_| MailError::new(MailErrorKind::WriteTimeout, "Write timed out"))?
            .map_err(|e| {
                MailError::new(MailErrorKind::ConnectionReset, format!("Write error: {}", e))
                    .with_cause(e)
            })?;

        timeout(timeout_duration, writer.flush())
            .await
            .map_err(|_| MailError::new(MailErrorKind::WriteTimeout, "Flush timed out"))?
            .map_err(|e| {
                MailError::new(MailErrorKind::ConnectionReset, format!("Flush error: {}", e))
                    .with_cause(e)
            })?;

        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> MailResult<()> {
        match &mut self.stream {
            TransportStream::Plain(stream) => {
                Self::write_all(stream.get_mut(), data, self.command_timeout).await
            }
            #[cfg(feature = "rustls-tls")]
            TransportStream::Tls(stream) => {
                Self::write_all(stream.get_mut(), data, self.command_timeout).await
            }
            TransportStream::Closed => Err(Self::closed_error()),
        }
    }
}

#[async_trait]
impl SmtpTransport for TcpTransport {
    async fn send_command(&mut self, command: &SmtpCommand) -> MailResult<SmtpResponse> {
        let cmd_str = format!("{}\r\n", command.to_smtp_string());
        tracing::debug!(command = %command, "Sending SMTP command");

        self.write(cmd_str.as_bytes()).await?;
        self.read_response().await
    }

    async fn send_data(&mut self, data: &[u8]) -> MailResult<()> {
        self.write(data).await
    }

    async fn read_response(&mut self) -> MailResult<SmtpResponse> {
        let response = match &mut self.stream {
            TransportStream::Plain(stream) => {
                Self::read_response_inner(stream, self.command_timeout).await?
            }
            #[cfg(feature = "rustls-tls")]
            TransportStream::Tls(stream) => {
                Self::read_response_inner(stream.as_mut(), self.command_timeout).await?
            }
            TransportStream::Closed => return Err(Self::closed_error()),
        };

        tracing::debug!(code = response.code, message = %response.first_message(), "Received SMTP response");
        Ok(response)
    }

    async fn upgrade_tls(&mut self, params: &TlsParams) -> MailResult<()> {
        if self.tls_enabled {
            return Ok(());
        }

        #[cfg(feature = "rustls-tls")]
        {
            use rustls::pki_types::ServerName;
            use std::sync::Arc;

            let tls_config = tls::client_config(params).await?;
            let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));
            let server_name = ServerName::try_from(params.server_name.clone()).map_err(|_| {
                MailError::tls(format!("Invalid server name: {}", params.server_name))
            })?;

            let tcp_stream = match std::mem::replace(&mut self.stream, TransportStream::Closed) {
                TransportStream::Plain(reader) => reader.into_inner(),
                TransportStream::Closed => return Err(Self::closed_error()),
                other => {
                    self.stream = other;
                    return Err(MailError::tls("Already using TLS"));
                }
            };

            let tls_stream = timeout(
                self.command_timeout,
                connector.connect(server_name, tcp_stream),
            )
            .await
            .map_err(|_| {
                MailError::new(MailErrorKind::ConnectionTimeout, "TLS handshake timed out")
            })?
            .map_err(tls::handshake_error)?;

            self.stream = TransportStream::Tls(Box::new(BufReader::new(tls_stream)));
            self.tls_enabled = true;
            tracing::debug!(host = %self.host, "TLS established");

            Ok(())
        }

        #[cfg(not(feature = "rustls-tls"))]
        {
            let _ = params;
            Err(MailError::configuration("No TLS implementation available"))
        }
    }

    fn is_tls(&self) -> bool {
        self.tls_enabled
    }

    async fn shutdown(&mut self) -> MailResult<()> {
        match std::mem::replace(&mut self.stream, TransportStream::Closed) {
            TransportStream::Plain(mut stream) => {
                let _ = stream.get_mut().shutdown().await;
            }
            #[cfg(feature = "rustls-tls")]
            TransportStream::Tls(mut stream) => {
                let _ = stream.get_mut().shutdown().await;
            }
            TransportStream::Closed => {}
        }
        Ok(())
    }
}

#[cfg(feature = "rustls-tls")]
mod tls {
    use rustls::pki_types::{CertificateDer, PrivateKeyDer};
    use std::path::Path;

    use super::TlsParams;
    use crate::errors::{MailError, MailErrorKind, MailResult};

    /// Builds a client config trusting the webpki roots, with an optional
    /// client certificate.
    pub(super) async fn client_config(params: &TlsParams) -> MailResult<rustls::ClientConfig> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let builder = rustls::ClientConfig::builder().with_root_certificates(root_store);

        match (&params.client_cert, &params.client_key) {
            (Some(cert), Some(key)) => {
                let certs = load_certs(cert).await?;
                let key = load_key(key).await?;
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(|e| MailError::tls(format!("Invalid client certificate: {}", e)))
            }
            (None, None) => Ok(builder.with_no_client_auth()),
            _ => Err(MailError::configuration(
                "ssl_certfile and ssl_keyfile must be set together",
            )),
        }
    }

    async fn load_certs(path: &Path) -> MailResult<Vec<CertificateDer<'static>>> {
        let pem = read(path).await?;
        let certs = rustls_pemfile::certs(&mut pem.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MailError::io(format!("Invalid certificate {}", path.display()), e))?;
        if certs.is_empty() {
            return Err(MailError::configuration(format!(
                "No certificates found in {}",
                path.display()
            )));
        }
        Ok(certs)
    }

    async fn load_key(path: &Path) -> MailResult<PrivateKeyDer<'static>> {
        let pem = read(path).await?;
        rustls_pemfile::private_key(&mut pem.as_slice())
            .map_err(|e| MailError::io(format!("Invalid private key {}", path.display()), e))?
            .ok_or_else(|| {
                MailError::configuration(format!("No private key found in {}", path.display()))
            })
    }

    async fn read(path: &Path) -> MailResult<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| MailError::io(format!("Failed to read {}", path.display()), e))
    }

    pub(super) fn handshake_error(error: std::io::Error) -> MailError {
        let kind = match error
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            Some(rustls::Error::InvalidCertificate(_)) => MailErrorKind::CertificateInvalid,
            _ => MailErrorKind::TlsHandshakeFailed,
        };
        MailError::new(kind, format!("TLS handshake failed: {}", error)).with_cause(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_params_from_settings() {
        let settings = MailSettings::builder()
            .server("smtp.example.com")
            .port(465)
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let params = ConnectParams::from_settings(&settings);
        assert_eq!(params.address(), "smtp.example.com:465");
        assert!(params.implicit_tls);
        assert_eq!(params.timeout, Duration::from_secs(5));
        assert_eq!(params.tls.server_name, "smtp.example.com");
        assert!(params.tls.client_cert.is_none());
    }

    #[test]
    fn test_io_error_mapping() {
        let err = TcpTransport::map_io_error(
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            "localhost:25",
        );
        assert_eq!(err.kind(), MailErrorKind::ConnectionRefused);
        assert!(err.is_suppressible());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with no listener.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let params = ConnectParams {
            host: "127.0.0.1".to_string(),
            port,
            timeout: Duration::from_secs(5),
            implicit_tls: false,
            tls: TlsParams {
                server_name: "127.0.0.1".to_string(),
                client_cert: None,
                client_key: None,
            },
        };
        let err = TcpConnector.connect(&params).await.unwrap_err();
        assert!(err.is_suppressible());
    }

    #[tokio::test]
    async fn test_plain_exchange() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"220 ready\r\n").await.unwrap();
            let mut buf = [0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"NOOP\r\n");
            socket.write_all(b"250-first\r\n250 2.0.0 done\r\n").await.unwrap();
        });

        let params = ConnectParams {
            host: "127.0.0.1".to_string(),
            port,
            timeout: Duration::from_secs(5),
            implicit_tls: false,
            tls: TlsParams {
                server_name: "127.0.0.1".to_string(),
                client_cert: None,
                client_key: None,
            },
        };
        let mut transport = TcpTransport::connect(&params).await.unwrap();
        assert_eq!(transport.read_response().await.unwrap().code, 220);
        let response = transport.send_command(&SmtpCommand::Noop).await.unwrap();
        assert_eq!(response.message.len(), 2);
        assert!(response.enhanced_code.is_none());
        server.await.unwrap();

        transport.shutdown().await.unwrap();
        let err = transport.send_command(&SmtpCommand::Noop).await.unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::ServerDisconnected);
    }
}
