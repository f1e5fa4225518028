//! Main SMTP client implementation.
//!
//! Provides a high-level interface for sending a single [`Email`]:
//! connect, authenticate, run the mail transaction, and on a transient
//! failure reset and retry with a flat delay. There is no connection
//! pooling — a client instance opens a fresh socket per attempt and
//! drops it at the end of `send`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use secrecy::ExposeSecret;

use crate::auth::{AuthMethod, Authenticator, CredentialProvider, Credentials, StaticCredentialProvider};
use crate::config::SmtpConfig;
use crate::errors::{SmtpError, SmtpErrorKind, SmtpResult};
use crate::mime::MimeEncoder;
use crate::observability::SmtpMetrics;
use crate::protocol::{EsmtpCapabilities, SessionState, SmtpCommand, codes};
use crate::transport::{SmtpTransport, TcpTransport};
use crate::types::{Email, RejectedRecipient, SendResult, SentMessage};

/// High-level SMTP client. Built once from an [`SmtpConfig`], then used
/// to `send` one or more emails; each send is fully independent.
pub struct SmtpClient {
    config: Arc<SmtpConfig>,
    credential_provider: Option<Arc<dyn CredentialProvider>>,
    metrics: Arc<SmtpMetrics>,
}

impl SmtpClient {
    /// Creates a new SMTP client from a configuration.
    pub async fn new(config: SmtpConfig) -> SmtpResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let credential_provider: Option<Arc<dyn CredentialProvider>> = if config.has_auth() {
            Some(Arc::new(StaticCredentialProvider::plain(
                config.user.clone(),
                config.password.expose_secret().to_string(),
            )))
        } else {
            None
        };

        Ok(Self {
            config,
            credential_provider,
            metrics: Arc::new(SmtpMetrics::new()),
        })
    }

    /// Creates a builder for the SMTP client.
    pub fn builder() -> SmtpClientBuilder {
        SmtpClientBuilder::default()
    }

    /// Returns a reference to the metrics collector.
    pub fn metrics(&self) -> &SmtpMetrics {
        &self.metrics
    }

    /// Sends an email. Never returns `Err` — both outcomes are carried
    /// in the returned [`SendResult`].
    pub async fn send(&self, email: Email) -> SendResult {
        let start = Instant::now();
        match self.send_with_retry(&email).await {
            Ok(mut sent) => {
                sent.duration = start.elapsed();
                self.metrics.record_send_success();
                SendResult::Success(sent)
            }
            Err(e) => {
                self.metrics.record_send_failure();
                SendResult::Failure(e)
            }
        }
    }

    /// Encodes the message once, then drives the send orchestrator:
    /// connect, run the transaction, and on a retryable failure sleep
    /// `retry_delay_ms` and try again on a fresh connection, up to
    /// `max_retries` additional attempts.
    async fn send_with_retry(&self, email: &Email) -> SmtpResult<SentMessage> {
        if email.to.is_empty() {
            return Err(SmtpError::message_error(
                SmtpErrorKind::InvalidRecipientAddress,
                "At least one `to` recipient is required",
            ));
        }

        let encoder = MimeEncoder::new(message_id_domain(&self.config.user));
        let encoded = encoder.encode(email)?;

        if encoded.len() > self.config.max_message_size {
            return Err(SmtpError::message_error(
                SmtpErrorKind::MessageTooLarge,
                format!(
                    "Message size {} exceeds limit {}",
                    encoded.len(),
                    self.config.max_message_size
                ),
            ));
        }

        let message_id = extract_message_id(&encoded)
            .unwrap_or_else(|| email.message_id.clone().unwrap_or_default());
        let data = MimeEncoder::prepare_data_content(&encoded);

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                self.metrics.record_retry();
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }

            match self.try_send_once(email, &data, &message_id).await {
                Ok(sent) => return Ok(sent),
                Err(e) => {
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable || attempt == self.config.max_retries {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SmtpError::connection("send failed with no recorded error")))
    }

    /// Opens a fresh connection and runs one complete attempt. On a
    /// retryable failure, issues a best-effort `RSET` (response ignored)
    /// before the socket is destroyed, per §4.7/§7's "RSET, destroy the
    /// socket, continue the loop" retry discipline.
    async fn try_send_once(
        &self,
        email: &Email,
        data: &[u8],
        message_id: &str,
    ) -> SmtpResult<SentMessage> {
        let connect_result = TcpTransport::connect(&self.config).await;
        self.metrics.record_connection_attempt(connect_result.is_ok());
        let mut transport = connect_result?;

        let result = self.perform_transaction(&mut transport, email, data, message_id).await;
        if let Err(e) = &result {
            if e.is_retryable() {
                let _ = transport.send_command(&SmtpCommand::Rset).await;
            }
        }
        let _ = transport.close().await;
        result
    }

    /// Runs EHLO/STARTTLS/AUTH, then the mail transaction, against any
    /// [`SmtpTransport`] implementation — generic so it can be driven by
    /// [`crate::mocks::MockTransport`] in tests without a live socket.
    async fn perform_transaction<T: SmtpTransport + ?Sized>(
        &self,
        transport: &mut T,
        email: &Email,
        data: &[u8],
        message_id: &str,
    ) -> SmtpResult<SentMessage> {
        self.ensure_ready(transport).await?;

        let mail_from = SmtpCommand::MailFrom {
            address: email.from.to_smtp(),
            size: Some(data.len()),
            body_8bit: transport.capabilities().map(|c| c.eight_bit_mime).unwrap_or(false),
            smtputf8: false,
        };

        let response = transport.send_command(&mail_from).await?;
        if !response.is_success() {
            return Err(response.to_error());
        }
        transport.set_state(SessionState::MailIssued);

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for recipient in email.all_recipients() {
            let rcpt_to = SmtpCommand::RcptTo {
                address: recipient.to_smtp(),
            };

            let response = transport.send_command(&rcpt_to).await?;
            if response.is_success() {
                accepted.push(recipient.clone());
            } else {
                rejected.push(RejectedRecipient {
                    address: recipient.clone(),
                    code: response.code,
                    message: response.full_message(),
                });
            }
        }

        if accepted.is_empty() {
            let _ = transport.send_command(&SmtpCommand::Rset).await;
            return Err(SmtpError::message_error(
                SmtpErrorKind::InvalidRecipientAddress,
                "All recipients were rejected",
            ));
        }
        transport.set_state(SessionState::RcptIssued);

        let response = transport.send_command(&SmtpCommand::Data).await?;
        if response.code != codes::START_MAIL_INPUT {
            return Err(response.to_error());
        }
        transport.set_state(SessionState::DataOpen);

        let response = transport.send_data(data).await?;
        if !response.is_success() {
            return Err(response.to_error());
        }

        Ok(SentMessage {
            message_id: message_id.to_string(),
            accepted,
            rejected,
            response: response.full_message(),
            duration: Duration::ZERO,
        })
    }

    /// Brings a newly-connected transport up to [`SessionState::Authenticated`]:
    /// EHLO (falling back to HELO), STARTTLS when advertised and the
    /// connection isn't already secure, then authentication if
    /// credentials are configured.
    async fn ensure_ready<T: SmtpTransport + ?Sized>(&self, transport: &mut T) -> SmtpResult<()> {
        let client_name = self.config.client_name();
        let response = transport.send_command(&SmtpCommand::Ehlo(client_name.clone())).await?;

        let response = if response.is_success() {
            response
        } else {
            let response = transport.send_command(&SmtpCommand::Helo(client_name.clone())).await?;
            if !response.is_success() {
                return Err(response.to_error());
            }
            response
        };

        let capabilities = EsmtpCapabilities::from_ehlo_response(&response);
        transport.set_capabilities(capabilities.clone());
        transport.set_state(SessionState::Ehloed);

        if !transport.is_tls() && !self.config.secure && capabilities.starttls {
            let response = transport.send_command(&SmtpCommand::StartTls).await?;
            if response.is_success() {
                transport.upgrade_tls(&self.config.tls_config(), &self.config.host).await?;
                self.metrics.record_tls_upgrade();

                let response = transport.send_command(&SmtpCommand::Ehlo(client_name)).await?;
                if response.is_success() {
                    let capabilities = EsmtpCapabilities::from_ehlo_response(&response);
                    transport.set_capabilities(capabilities);
                }
                transport.set_state(SessionState::Secured);
            }
        }

        if let Some(provider) = &self.credential_provider {
            let credentials = provider.get_credentials().await?;
            self.authenticate(transport, &credentials).await?;
        } else {
            transport.set_state(SessionState::Authenticated);
        }

        Ok(())
    }

    /// Selects the strongest mechanism both sides support and runs it.
    async fn authenticate<T: SmtpTransport + ?Sized>(
        &self,
        transport: &mut T,
        credentials: &Credentials,
    ) -> SmtpResult<()> {
        let available: Vec<AuthMethod> = transport
            .capabilities()
            .map(|c| c.auth_mechanisms.iter().copied().collect())
            .unwrap_or_default();

        let method = Authenticator::select_best_method(&available);

        let result = match method {
            AuthMethod::Plain => self.auth_plain(transport, credentials).await,
            AuthMethod::Login => self.auth_login(transport, credentials).await,
            AuthMethod::CramMd5 => self.auth_cram_md5(transport, credentials).await,
        };

        self.metrics.record_auth_attempt(result.is_ok());
        result?;
        transport.set_state(SessionState::Authenticated);
        Ok(())
    }

    async fn auth_plain<T: SmtpTransport + ?Sized>(
        &self,
        transport: &mut T,
        credentials: &Credentials,
    ) -> SmtpResult<()> {
        let initial_response =
            Authenticator::plain_initial_response(&credentials.username, &credentials.password);
        let command = SmtpCommand::Auth {
            mechanism: "PLAIN".to_string(),
            initial_response: Some(initial_response),
        };

        let response = transport.send_command(&command).await?;
        if response.code == codes::AUTH_SUCCESS {
            Ok(())
        } else {
            Err(response.to_error())
        }
    }

    async fn auth_login<T: SmtpTransport + ?Sized>(
        &self,
        transport: &mut T,
        credentials: &Credentials,
    ) -> SmtpResult<()> {
        let command = SmtpCommand::Auth {
            mechanism: "LOGIN".to_string(),
            initial_response: None,
        };

        let response = transport.send_command(&command).await?;
        if response.code != codes::AUTH_CONTINUE {
            return Err(response.to_error());
        }

        let username_encoded = Authenticator::login_username(&credentials.username);
        let response = transport.send_auth_line(&username_encoded).await?;
        if response.code != codes::AUTH_CONTINUE {
            return Err(response.to_error());
        }

        let password_encoded = Authenticator::login_password(&credentials.password);
        let response = transport.send_auth_line(&password_encoded).await?;
        if response.code == codes::AUTH_SUCCESS {
            Ok(())
        } else {
            Err(response.to_error())
        }
    }

    async fn auth_cram_md5<T: SmtpTransport + ?Sized>(
        &self,
        transport: &mut T,
        credentials: &Credentials,
    ) -> SmtpResult<()> {
        let command = SmtpCommand::Auth {
            mechanism: "CRAM-MD5".to_string(),
            initial_response: None,
        };

        let response = transport.send_command(&command).await?;
        if response.code != codes::AUTH_CONTINUE {
            return Err(response.to_error());
        }

        let challenge = response.first_message();
        let response_str =
            Authenticator::cram_md5_response(challenge, &credentials.username, &credentials.password)?;
        let response = transport.send_auth_line(&response_str).await?;
        if response.code == codes::AUTH_SUCCESS {
            Ok(())
        } else {
            Err(response.to_error())
        }
    }
}

/// Domain portion of the configured user, or `localhost` if the user
/// has none (no `@`) or authentication is unconfigured.
fn message_id_domain(user: &str) -> String {
    match user.split_once('@') {
        Some((_, domain)) if !domain.is_empty() => domain.to_string(),
        _ => "localhost".to_string(),
    }
}

/// Pulls the value out of the `Message-ID: <...>` header the encoder
/// just wrote, so the returned [`SentMessage`] always reports the ID
/// actually present in the transmitted headers.
fn extract_message_id(encoded: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(encoded);
    for line in text.split("\r\n") {
        if let Some(rest) = line.strip_prefix("Message-ID: ") {
            return Some(rest.trim_start_matches('<').trim_end_matches('>').to_string());
        }
    }
    None
}

/// Builder for [`SmtpClient`].
#[derive(Debug, Default)]
pub struct SmtpClientBuilder {
    config_builder: Option<crate::config::SmtpConfigBuilder>,
    credential_provider: Option<Arc<dyn CredentialProvider>>,
}

impl SmtpClientBuilder {
    /// Sets the SMTP host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config_builder = Some(
            self.config_builder
                .unwrap_or_else(crate::config::SmtpConfig::builder)
                .host(host),
        );
        self
    }

    /// Sets the SMTP port.
    pub fn port(mut self, port: u16) -> Self {
        if let Some(builder) = self.config_builder.take() {
            self.config_builder = Some(builder.port(port));
        }
        self
    }

    /// Sets plain credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        if let Some(builder) = self.config_builder.take() {
            self.config_builder = Some(builder.credentials(username, password));
        }
        self
    }

    /// Sets a custom credential provider.
    pub fn credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credential_provider = Some(provider);
        self
    }

    /// Builds the client.
    pub async fn build(self) -> SmtpResult<SmtpClient> {
        let config = self
            .config_builder
            .ok_or_else(|| SmtpError::configuration("Host is required"))?
            .build()?;

        let mut client = SmtpClient::new(config).await?;
        if let Some(provider) = self.credential_provider {
            client.credential_provider = Some(provider);
        }
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{self, MockTransport};
    use crate::protocol::SmtpResponse;

    #[test]
    fn test_client_builder() {
        let builder = SmtpClient::builder().host("smtp.example.com").port(587);
        assert!(builder.config_builder.is_some());
    }

    #[test]
    fn test_message_id_domain() {
        assert_eq!(message_id_domain("user@example.com"), "example.com");
        assert_eq!(message_id_domain("user"), "localhost");
        assert_eq!(message_id_domain(""), "localhost");
    }

    async fn test_client() -> SmtpClient {
        SmtpClient::new(
            SmtpConfig::builder()
                .host("smtp.example.com")
                .skip_authentication(true)
                .build()
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_perform_transaction_success() {
        let client = test_client().await;
        let mut transport = MockTransport::new();
        transport.queue_response(mocks::ehlo_response()); // EHLO
        transport.queue_ok(); // STARTTLS
        transport.queue_ok(); // EHLO after TLS upgrade
        transport.queue_ok(); // MAIL FROM
        transport.queue_ok(); // RCPT TO
        transport.queue_response(mocks::data_ready_response()); // DATA
        transport.queue_ok(); // message accepted

        let email = mocks::test_email().unwrap();
        let encoder = MimeEncoder::new("example.com");
        let encoded = encoder.encode(&email).unwrap();
        let data = MimeEncoder::prepare_data_content(&encoded);

        let sent = client
            .perform_transaction(&mut transport, &email, &data, "test-id@example.com")
            .await
            .unwrap();

        assert_eq!(sent.accepted.len(), 1);
        assert!(sent.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_perform_transaction_all_recipients_rejected() {
        let client = test_client().await;
        let mut transport = MockTransport::new();
        transport.queue_response(mocks::ehlo_response()); // EHLO
        transport.queue_ok(); // STARTTLS
        transport.queue_ok(); // EHLO after TLS upgrade
        transport.queue_ok(); // MAIL FROM
        transport.queue_response(SmtpResponse::new(550, "Mailbox unavailable")); // RCPT TO
        transport.queue_ok(); // RSET

        let email = mocks::test_email().unwrap();
        let encoder = MimeEncoder::new("example.com");
        let encoded = encoder.encode(&email).unwrap();
        let data = MimeEncoder::prepare_data_content(&encoded);

        let result = client
            .perform_transaction(&mut transport, &email, &data, "test-id@example.com")
            .await;

        assert!(result.is_err());
        let commands = transport.recorded_commands();
        assert!(commands.iter().any(|c| matches!(c, SmtpCommand::Rset)));
    }

    /// S5: a transient `421` on `MAIL FROM` must drive an `RSET` on the
    /// live connection, then a reconnect-and-retry that succeeds.
    #[tokio::test]
    async fn test_transient_mail_from_issues_rset_and_retries() {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // First attempt: MAIL FROM rejected transiently, RSET follows.
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            socket.get_mut().write_all(b"220 fake.example.com ESMTP\r\n").await.unwrap();

            let mut line = String::new();
            socket.read_line(&mut line).await.unwrap(); // EHLO
            socket.get_mut().write_all(b"250 fake.example.com\r\n").await.unwrap();

            line.clear();
            socket.read_line(&mut line).await.unwrap(); // MAIL FROM
            socket.get_mut().write_all(b"421 Service busy\r\n").await.unwrap();

            line.clear();
            socket.read_line(&mut line).await.unwrap();
            assert_eq!(line.trim_end(), "RSET", "expected RSET on transient failure");
            socket.get_mut().write_all(b"250 OK\r\n").await.unwrap();

            line.clear();
            socket.read_line(&mut line).await.unwrap(); // QUIT
            socket.get_mut().write_all(b"221 Bye\r\n").await.unwrap();

            // Second attempt: fresh connection, full success.
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            socket.get_mut().write_all(b"220 fake.example.com ESMTP\r\n").await.unwrap();

            line.clear();
            socket.read_line(&mut line).await.unwrap(); // EHLO
            socket.get_mut().write_all(b"250 fake.example.com\r\n").await.unwrap();

            line.clear();
            socket.read_line(&mut line).await.unwrap(); // MAIL FROM
            socket.get_mut().write_all(b"250 OK\r\n").await.unwrap();

            line.clear();
            socket.read_line(&mut line).await.unwrap(); // RCPT TO
            socket.get_mut().write_all(b"250 OK\r\n").await.unwrap();

            line.clear();
            socket.read_line(&mut line).await.unwrap(); // DATA
            socket.get_mut().write_all(b"354 Go ahead\r\n").await.unwrap();

            loop {
                line.clear();
                socket.read_line(&mut line).await.unwrap();
                if line == ".\r\n" {
                    break;
                }
            }
            socket.get_mut().write_all(b"250 Message accepted\r\n").await.unwrap();

            line.clear();
            socket.read_line(&mut line).await.unwrap(); // QUIT
            socket.get_mut().write_all(b"221 Bye\r\n").await.unwrap();
        });

        let config = SmtpConfig::builder()
            .host(addr.ip().to_string())
            .port(addr.port())
            .skip_authentication(true)
            .max_retries(1)
            .retry_delay_ms(5)
            .build()
            .unwrap();

        let client = SmtpClient::new(config).await.unwrap();
        let email = mocks::test_email().unwrap();

        let result = client.send(email).await;
        server.await.unwrap();

        assert!(result.is_success(), "expected eventual success, got {:?}", result);
    }
}
