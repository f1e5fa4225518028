//! Configuration types for the SMTP client.
//!
//! A `SmtpConfig` is immutable once built; construct one with
//! [`SmtpConfig::builder`]. Mirrors the `ClientConfiguration` data model:
//! connection target, credentials, TLS mode, timeouts, and retry policy.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::{SmtpError, SmtpResult};

/// Default port for implicit TLS (RFC 8314).
pub const DEFAULT_SECURE_PORT: u16 = 465;

/// Default port for opportunistic STARTTLS submission.
pub const DEFAULT_PORT: u16 = 587;

/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default maximum message size (10 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Default retry attempts after the first.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between retries, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Minimum negotiated TLS version. The engine never negotiates below 1.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsVersion {
    /// TLS 1.2 (floor, default).
    #[default]
    Tls12,
    /// TLS 1.3 (preferred when the peer supports it).
    Tls13,
}

/// TLS parameters applied to both implicit TLS and STARTTLS upgrades.
///
/// These mirror §4.3's fixed parameters (minimum version 1.2, certificate
/// verification always on) rather than a user-tunable surface; `mikromail`
/// never allows disabling certificate verification.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Minimum acceptable negotiated TLS version.
    pub min_version: TlsVersion,
    /// Verify the server's certificate chain. Always `true`.
    pub verify_certificate: bool,
    /// Verify the certificate's hostname against the connection target.
    pub verify_hostname: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: TlsVersion::Tls12,
            verify_certificate: true,
            verify_hostname: true,
        }
    }
}

/// SMTP client configuration.
///
/// Immutable after construction. A client instance is built from one of
/// these, performs at most one `send`, then closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// SMTP server hostname.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Authentication username (also the default `From` address domain
    /// source and, via its local part, the SASL identity).
    #[serde(default)]
    pub user: String,
    /// Authentication password. May be empty when `skip_authentication`.
    #[serde(skip, default = "default_password")]
    pub password: SecretString,
    /// True for implicit TLS from the first byte (RFC 8314, typically
    /// port 465); false for opportunistic STARTTLS (RFC 3207).
    #[serde(default)]
    pub secure: bool,
    /// Overall per-attempt timeout (connection and each command), in ms.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// EHLO/HELO identifier. Defaults to the local machine's hostname.
    #[serde(default)]
    pub client_name: Option<String>,
    /// Maximum message size accepted before DATA is sent.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Additional attempts after the first, on transient failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between retry attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Bypass the authenticator regardless of advertised server capability.
    #[serde(default)]
    pub skip_authentication: bool,
    /// Enable verbose protocol-level logging (with credential redaction).
    #[serde(default)]
    pub debug: bool,
}

fn default_password() -> SecretString {
    SecretString::from(String::new())
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            user: String::new(),
            password: SecretString::new(String::new()),
            secure: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            client_name: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            skip_authentication: false,
            debug: false,
        }
    }
}

impl SmtpConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> SmtpConfigBuilder {
        SmtpConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SmtpResult<()> {
        if self.host.is_empty() {
            return Err(SmtpError::configuration("host is required"));
        }

        if self.port == 0 {
            return Err(SmtpError::configuration("port must be non-zero"));
        }

        if self.timeout_ms == 0 {
            return Err(SmtpError::configuration("timeout_ms must be positive"));
        }

        Ok(())
    }

    /// Returns the full server address (`host:port`).
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns true if authentication should be attempted.
    pub fn has_auth(&self) -> bool {
        !self.skip_authentication && !self.user.is_empty()
    }

    /// Returns the EHLO/HELO client identifier, defaulting to the local
    /// machine's hostname when unset.
    pub fn client_name(&self) -> String {
        self.client_name.clone().unwrap_or_else(local_hostname)
    }

    /// Returns the TLS parameters this configuration implies.
    pub fn tls_config(&self) -> TlsConfig {
        TlsConfig::default()
    }
}

fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Builder for [`SmtpConfig`].
#[derive(Debug, Default)]
pub struct SmtpConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<SecretString>,
    secure: bool,
    timeout_ms: Option<u64>,
    client_name: Option<String>,
    max_message_size: Option<usize>,
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    skip_authentication: bool,
    debug: bool,
}

impl SmtpConfigBuilder {
    /// Sets the SMTP server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the SMTP server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the username and password together.
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(SecretString::new(password.into()));
        self
    }

    /// Sets the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::new(password.into()));
        self
    }

    /// Enables implicit TLS from the first byte (typically port 465).
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the overall per-attempt timeout, in milliseconds.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets the EHLO/HELO client identifier.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Sets the maximum accepted message size.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Sets the maximum number of retry attempts after the first.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Sets the delay between retry attempts, in milliseconds.
    pub fn retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = Some(delay_ms);
        self
    }

    /// Bypasses authentication regardless of server capability.
    pub fn skip_authentication(mut self, skip: bool) -> Self {
        self.skip_authentication = skip;
        self
    }

    /// Enables verbose protocol logging (credential-bearing lines redacted).
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> SmtpResult<SmtpConfig> {
        let secure = self.secure;
        let port = self.port.unwrap_or(if secure {
            DEFAULT_SECURE_PORT
        } else {
            DEFAULT_PORT
        });

        let config = SmtpConfig {
            host: self.host.ok_or_else(|| SmtpError::configuration("host is required"))?,
            port,
            user: self.user.unwrap_or_default(),
            password: self.password.unwrap_or_else(|| SecretString::new(String::new())),
            secure,
            timeout_ms: self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            client_name: self.client_name,
            max_message_size: self.max_message_size.unwrap_or(DEFAULT_MAX_MESSAGE_SIZE),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay_ms: self.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
            skip_authentication: self.skip_authentication,
            debug: self.debug,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_config_builder() {
        let config = SmtpConfig::builder()
            .host("smtp.example.com")
            .port(587)
            .credentials("user", "pass")
            .build()
            .unwrap();

        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.user, "user");
        assert_eq!(config.password.expose_secret(), "pass");
    }

    #[test]
    fn test_config_defaults() {
        let config = SmtpConfig::builder().host("smtp.example.com").build().unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(!config.secure);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_secure_default_port() {
        let config = SmtpConfig::builder()
            .host("smtp.example.com")
            .secure(true)
            .build()
            .unwrap();

        assert_eq!(config.port, DEFAULT_SECURE_PORT);
    }

    #[test]
    fn test_config_validation() {
        let result = SmtpConfig::builder().build();
        assert!(result.is_err());

        let result = SmtpConfig::builder().host("smtp.example.com").port(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_skip_authentication() {
        let config = SmtpConfig::builder()
            .host("smtp.example.com")
            .skip_authentication(true)
            .build()
            .unwrap();

        assert!(config.skip_authentication);
        assert!(!config.has_auth());
    }

    #[test]
    fn test_client_name_defaults() {
        let config = SmtpConfig::builder().host("smtp.example.com").build().unwrap();
        assert!(!config.client_name().is_empty());
    }
}
