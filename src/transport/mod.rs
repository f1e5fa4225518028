//! Wire transport for the SMTP session.
//!
//! Wraps a TCP stream (optionally upgraded to TLS in place) and knows how
//! to write SMTP command lines and read back possibly-multiline responses.
//! A single [`TcpTransport`] carries exactly one session from connect
//! through `QUIT`; there is no pooling or reuse across sends.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{SmtpConfig, TlsConfig};
use crate::errors::{SmtpError, SmtpErrorKind, SmtpResult};
use crate::protocol::{EsmtpCapabilities, SessionState, SmtpCommand, SmtpResponse};

#[cfg(feature = "rustls-tls")]
use std::sync::Arc;

/// The underlying byte stream, plain or TLS.
pub enum TransportStream {
    /// Unencrypted TCP.
    Plain(BufReader<TcpStream>),
    /// TLS over TCP (rustls).
    #[cfg(feature = "rustls-tls")]
    Tls(BufReader<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl TransportStream {
    async fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        match self {
            TransportStream::Plain(r) => r.read_line(buf).await,
            #[cfg(feature = "rustls-tls")]
            TransportStream::Tls(r) => r.read_line(buf).await,
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            TransportStream::Plain(r) => r.get_mut().write_all(data).await,
            #[cfg(feature = "rustls-tls")]
            TransportStream::Tls(r) => r.get_mut().write_all(data).await,
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        match self {
            TransportStream::Plain(r) => r.get_mut().flush().await,
            #[cfg(feature = "rustls-tls")]
            TransportStream::Tls(r) => r.get_mut().flush().await,
        }
    }
}

/// Behaviour a send orchestrator needs from a transport. Implemented by
/// [`TcpTransport`] for real sends and by [`crate::mocks::MockTransport`]
/// for tests.
#[async_trait]
pub trait SmtpTransport: Send {
    /// Sends a command line and reads back the response.
    async fn send_command(&mut self, command: &SmtpCommand) -> SmtpResult<SmtpResponse>;

    /// Sends a pre-formatted continuation line (e.g. an AUTH LOGIN
    /// username/password step) and reads back the response. Never logged
    /// verbatim — callers pass credential-bearing lines here rather than
    /// through `send_command` so the transport can redact them.
    async fn send_auth_line(&mut self, line: &str) -> SmtpResult<SmtpResponse>;

    /// Streams raw message body bytes (already dot-stuffed) and reads the
    /// final response once the terminating `.` has been sent.
    async fn send_data(&mut self, data: &[u8]) -> SmtpResult<SmtpResponse>;

    /// Reads a single (possibly multiline) response without sending
    /// anything first. Used for reading the initial greeting.
    async fn read_response(&mut self) -> SmtpResult<SmtpResponse>;

    /// Current session phase.
    fn state(&self) -> SessionState;

    /// Overrides the session phase.
    fn set_state(&mut self, state: SessionState);

    /// Advertised server capabilities, once EHLO has been issued.
    fn capabilities(&self) -> Option<&EsmtpCapabilities>;

    /// Records parsed EHLO capabilities.
    fn set_capabilities(&mut self, capabilities: EsmtpCapabilities);

    /// True once the stream has been upgraded to TLS.
    fn is_tls(&self) -> bool;

    /// Upgrades the connection to TLS in place (STARTTLS).
    async fn upgrade_tls(&mut self, tls_config: &TlsConfig, host: &str) -> SmtpResult<()>;

    /// Sends `QUIT` and drops the socket.
    async fn close(&mut self) -> SmtpResult<()>;
}

/// A live TCP (or TLS-over-TCP) connection to an SMTP server.
pub struct TcpTransport {
    stream: Option<TransportStream>,
    timeout: Duration,
    state: SessionState,
    capabilities: Option<EsmtpCapabilities>,
    tls_enabled: bool,
    debug: bool,
}

impl TcpTransport {
    /// Opens a TCP connection, reads the greeting, and upgrades to TLS
    /// immediately when `config.secure` is set (implicit TLS, RFC 8314).
    pub async fn connect(config: &SmtpConfig) -> SmtpResult<Self> {
        let address = config.address();
        let connect_timeout = Duration::from_millis(config.timeout_ms);

        let tcp_stream = timeout(connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                SmtpError::timeout(
                    SmtpErrorKind::ConnectTimeout,
                    format!("Connecting to {} timed out", address),
                )
            })?
            .map_err(|e| Self::map_io_error(e, &address))?;

        let _ = tcp_stream.set_nodelay(true);

        let mut transport = Self {
            stream: Some(TransportStream::Plain(BufReader::new(tcp_stream))),
            timeout: connect_timeout,
            state: SessionState::Disconnected,
            capabilities: None,
            tls_enabled: false,
            debug: config.debug,
        };

        let greeting = transport.read_response_inner().await?;
        if !greeting.is_success() {
            return Err(greeting.to_error());
        }
        transport.state = SessionState::Greeted;

        if config.secure {
            transport.upgrade_tls(&config.tls_config(), &config.host).await?;
        }

        Ok(transport)
    }

    /// Maps an I/O error to an [`SmtpError`], classifying the common
    /// connection-establishment failure modes.
    fn map_io_error(err: io::Error, address: &str) -> SmtpError {
        let kind = match err.kind() {
            io::ErrorKind::ConnectionRefused => SmtpErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                SmtpErrorKind::ConnectionReset
            }
            io::ErrorKind::TimedOut => SmtpErrorKind::ConnectionTimeout,
            io::ErrorKind::NotFound | io::ErrorKind::AddrNotAvailable => SmtpErrorKind::DnsResolution,
            _ => SmtpErrorKind::NetworkUnreachable,
        };
        SmtpError::new(kind, format!("Failed to connect to {}: {}", address, err)).with_cause(err)
    }

    fn stream_mut(&mut self) -> SmtpResult<&mut TransportStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| SmtpError::connection("Transport has no active stream"))
    }

    async fn write_line(&mut self, line: &str) -> SmtpResult<()> {
        let framed = format!("{}\r\n", line);
        let timeout_duration = self.timeout;
        let write = async {
            let stream = self.stream_mut()?;
            stream.write_all(framed.as_bytes()).await.map_err(|e| {
                SmtpError::new(SmtpErrorKind::WriteTimeout, format!("Write failed: {}", e)).with_cause(e)
            })?;
            stream.flush().await.map_err(|e| {
                SmtpError::new(SmtpErrorKind::WriteTimeout, format!("Flush failed: {}", e)).with_cause(e)
            })
        };
        timeout(timeout_duration, write)
            .await
            .map_err(|_| SmtpError::timeout(SmtpErrorKind::WriteTimeout, "Write timed out"))?
    }

    async fn read_response_inner(&mut self) -> SmtpResult<SmtpResponse> {
        let timeout_duration = self.timeout;
        let read = async {
            let mut lines = Vec::new();
            loop {
                let mut line = String::new();
                let stream = self.stream_mut()?;
                let n = stream.read_line(&mut line).await.map_err(|e| {
                    SmtpError::new(SmtpErrorKind::ReadTimeout, format!("Read failed: {}", e)).with_cause(e)
                })?;

                if n == 0 {
                    return Err(SmtpError::new(
                        SmtpErrorKind::ConnectionReset,
                        "Connection closed while reading response",
                    ));
                }

                let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
                let continues = trimmed.as_bytes().get(3) == Some(&b'-');
                lines.push(trimmed);

                if !continues {
                    break;
                }
            }
            SmtpResponse::parse(&lines)
        };

        timeout(timeout_duration, read)
            .await
            .map_err(|_| SmtpError::timeout(SmtpErrorKind::ReadTimeout, "Read timed out"))?
    }

    fn log_command(&self, line: &str) {
        if !self.debug {
            return;
        }
        if is_credential_bearing(line) {
            tracing::debug!(command = "[credentials hidden]", "C:");
        } else {
            tracing::debug!(command = %line, "C:");
        }
    }

    fn log_response(&self, response: &SmtpResponse) {
        if self.debug {
            tracing::debug!(code = response.code, message = %response.first_message(), "S:");
        }
    }
}

/// True for commands whose wire form carries a credential: `AUTH PLAIN`
/// and `AUTH LOGIN` initial responses embed base64 username/password.
fn is_credential_bearing(line: &str) -> bool {
    let upper = line.to_uppercase();
    upper.starts_with("AUTH PLAIN") || upper.starts_with("AUTH LOGIN ")
}

#[async_trait]
impl SmtpTransport for TcpTransport {
    async fn send_command(&mut self, command: &SmtpCommand) -> SmtpResult<SmtpResponse> {
        let line = command.to_smtp_string();
        self.log_command(&line);
        self.write_line(&line).await?;
        let response = self.read_response_inner().await?;
        self.log_response(&response);
        Ok(response)
    }

    async fn send_auth_line(&mut self, line: &str) -> SmtpResult<SmtpResponse> {
        if self.debug {
            tracing::debug!(command = "[credentials hidden]", "C:");
        }
        self.write_line(line).await?;
        let response = self.read_response_inner().await?;
        self.log_response(&response);
        Ok(response)
    }

    async fn send_data(&mut self, data: &[u8]) -> SmtpResult<SmtpResponse> {
        let timeout_duration = self.timeout;
        let write = async {
            let stream = self.stream_mut()?;
            stream.write_all(data).await.map_err(|e| {
                SmtpError::new(SmtpErrorKind::WriteTimeout, format!("Write failed: {}", e)).with_cause(e)
            })?;
            stream.flush().await.map_err(|e| {
                SmtpError::new(SmtpErrorKind::WriteTimeout, format!("Flush failed: {}", e)).with_cause(e)
            })
        };
        timeout(timeout_duration, write)
            .await
            .map_err(|_| SmtpError::timeout(SmtpErrorKind::WriteTimeout, "Write timed out"))??;

        let response = self.read_response_inner().await?;
        self.log_response(&response);
        Ok(response)
    }

    async fn read_response(&mut self) -> SmtpResult<SmtpResponse> {
        let response = self.read_response_inner().await?;
        self.log_response(&response);
        Ok(response)
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    fn capabilities(&self) -> Option<&EsmtpCapabilities> {
        self.capabilities.as_ref()
    }

    fn set_capabilities(&mut self, capabilities: EsmtpCapabilities) {
        self.capabilities = Some(capabilities);
    }

    fn is_tls(&self) -> bool {
        self.tls_enabled
    }

    /// Upgrades the connection to TLS in place (STARTTLS or implicit).
    ///
    /// The reference this specification was distilled from moved the live
    /// stream out of its enum with `std::mem::replace(&mut self.stream,
    /// TransportStream::Plain(BufReader::new(unsafe { std::mem::zeroed() })))`
    /// — constructing a zeroed `TcpStream` is undefined behavior. Storing
    /// `stream` as an `Option` and using `.take()` moves it out safely.
    async fn upgrade_tls(&mut self, _tls_config: &TlsConfig, host: &str) -> SmtpResult<()> {
        if self.tls_enabled {
            return Ok(());
        }

        #[cfg(feature = "rustls-tls")]
        {
            let tcp_stream = match self.stream.take() {
                Some(TransportStream::Plain(reader)) => reader.into_inner(),
                Some(other) => {
                    self.stream = Some(other);
                    return Err(SmtpError::tls("Transport is already using TLS"));
                }
                None => return Err(SmtpError::connection("Transport has no active stream")),
            };

            let mut root_store = rustls::RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let client_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));
            let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
                .map_err(|e| SmtpError::tls(format!("Invalid server name {}: {}", host, e)))?;

            let tls_stream = timeout(self.timeout, connector.connect(server_name, tcp_stream))
                .await
                .map_err(|_| SmtpError::timeout(SmtpErrorKind::ConnectTimeout, "TLS handshake timed out"))?
                .map_err(|e| SmtpError::tls(format!("TLS handshake failed: {}", e)))?;

            self.stream = Some(TransportStream::Tls(BufReader::new(tls_stream)));
            self.tls_enabled = true;
            self.state = SessionState::Secured;
            Ok(())
        }

        #[cfg(not(feature = "rustls-tls"))]
        {
            let _ = host;
            Err(SmtpError::tls("No TLS backend compiled in"))
        }
    }

    async fn close(&mut self) -> SmtpResult<()> {
        if self.stream.is_some() {
            let _ = self.send_command(&SmtpCommand::Quit).await;
        }
        self.stream = None;
        self.state = SessionState::Closed;
        Ok(())
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("state", &self.state)
            .field("tls_enabled", &self.tls_enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_credential_bearing() {
        assert!(is_credential_bearing("AUTH PLAIN AGJvYgBzZWNyZXQ="));
        assert!(is_credential_bearing("AUTH LOGIN dXNlcg=="));
        assert!(!is_credential_bearing("AUTH LOGIN"));
        assert!(!is_credential_bearing("MAIL FROM:<a@b.com>"));
    }

    #[test]
    fn test_transport_debug() {
        // Debug impl should not require an active stream.
        let transport = TcpTransport {
            stream: None,
            timeout: Duration::from_secs(1),
            state: SessionState::Greeted,
            capabilities: None,
            tls_enabled: false,
            debug: false,
        };
        let debug_str = format!("{:?}", transport);
        assert!(debug_str.contains("Greeted"));
    }
}
