//! SASL authentication for SMTP (RFC 4954).
//!
//! Supports the three mechanisms named in the authenticator design:
//! PLAIN (RFC 4616), LOGIN, and CRAM-MD5 (RFC 2195).

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use md5::Md5;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{SmtpError, SmtpResult};

/// Authentication methods supported by the SMTP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// PLAIN authentication (RFC 4616).
    Plain,
    /// LOGIN authentication (obsolete but widely deployed).
    Login,
    /// CRAM-MD5 challenge-response (RFC 2195).
    CramMd5,
}

/// Selection order: strongest mechanism first.
const SELECTION_ORDER: [AuthMethod; 3] = [AuthMethod::CramMd5, AuthMethod::Login, AuthMethod::Plain];

impl AuthMethod {
    /// Returns the SMTP AUTH mechanism name.
    pub fn mechanism_name(&self) -> &'static str {
        match self {
            AuthMethod::Plain => "PLAIN",
            AuthMethod::Login => "LOGIN",
            AuthMethod::CramMd5 => "CRAM-MD5",
        }
    }

    /// Returns the selection priority (higher is preferred).
    pub fn priority(&self) -> u8 {
        match self {
            AuthMethod::CramMd5 => 3,
            AuthMethod::Login => 2,
            AuthMethod::Plain => 1,
        }
    }

    /// Parses a mechanism token from an EHLO `AUTH` line.
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

/// Username/password credentials shared by all three mechanisms.
#[derive(Clone)]
pub struct Credentials {
    /// Username (SASL identity / LOGIN username / CRAM-MD5 identity).
    pub username: String,
    /// Password (protected).
    pub password: SecretString,
}

impl Credentials {
    /// Creates plain credentials.
    pub fn plain(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
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

/// Provider for credentials with optional refresh.
#[async_trait]
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// Returns the current credentials.
    async fn get_credentials(&self) -> SmtpResult<Credentials>;

    /// Refreshes credentials if needed.
    async fn refresh(&self) -> SmtpResult<()>;
}

/// Static credential provider (no refresh).
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credentials: Credentials,
}

impl StaticCredentialProvider {
    /// Creates a new static provider.
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Creates a provider with plain credentials.
    pub fn plain(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(Credentials::plain(username, password))
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_credentials(&self) -> SmtpResult<Credentials> {
        Ok(self.credentials.clone())
    }

    async fn refresh(&self) -> SmtpResult<()> {
        Ok(())
    }
}

/// Authentication mechanism implementation (stateless).
pub struct Authenticator;

impl Authenticator {
    /// Generates the initial response for PLAIN authentication.
    pub fn plain_initial_response(username: &str, password: &SecretString) -> String {
        let response = format!("\0{}\0{}", username, password.expose_secret());
        BASE64.encode(response)
    }

    /// Generates the LOGIN username response.
    pub fn login_username(username: &str) -> String {
        BASE64.encode(username)
    }

    /// Generates the LOGIN password response.
    pub fn login_password(password: &SecretString) -> String {
        BASE64.encode(password.expose_secret())
    }

    /// Generates the CRAM-MD5 response to a base64-encoded server challenge.
    pub fn cram_md5_response(
        challenge: &str,
        username: &str,
        password: &SecretString,
    ) -> SmtpResult<String> {
        let challenge_bytes = BASE64
            .decode(challenge)
            .map_err(|e| SmtpError::authentication(format!("Invalid CRAM-MD5 challenge: {}", e)))?;

        type HmacMd5 = Hmac<Md5>;
        let mut mac = HmacMd5::new_from_slice(password.expose_secret().as_bytes())
            .map_err(|e| SmtpError::authentication(format!("HMAC error: {}", e)))?;
        mac.update(&challenge_bytes);
        let digest = mac.finalize().into_bytes();

        let hex_digest: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        let response = format!("{} {}", username, hex_digest);
        Ok(BASE64.encode(response))
    }

    /// Selects the strongest advertised mechanism: CRAM-MD5, then LOGIN,
    /// then PLAIN. Defaults to PLAIN when no mechanism is advertised at
    /// all (i.e. the server sent no `AUTH` line).
    pub fn select_best_method(available: &[AuthMethod]) -> AuthMethod {
        for method in SELECTION_ORDER {
            if available.contains(&method) {
                return method;
            }
        }
        AuthMethod::Plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
        let decoded = BASE64.decode(&response).unwrap();
        assert_eq!(decoded, b"\0user\0password");
    }

    #[test]
    fn test_login_responses() {
        let username = Authenticator::login_username("user");
        assert_eq!(BASE64.decode(&username).unwrap(), b"user");

        let password = SecretString::new("pass".to_string());
        let response = Authenticator::login_password(&password);
        assert_eq!(BASE64.decode(&response).unwrap(), b"pass");
    }

    #[test]
    fn test_cram_md5_response() {
        let password = SecretString::new("tanstaaftanstaaf".to_string());
        let challenge = BASE64.encode("<1896.697170952@postoffice.reston.mci.net>");
        let response =
            Authenticator::cram_md5_response(&challenge, "tim", &password).unwrap();
        let decoded = String::from_utf8(BASE64.decode(&response).unwrap()).unwrap();
        assert!(decoded.starts_with("tim "));
        assert_eq!(decoded.split(' ').nth(1).unwrap().len(), 32);
    }

    #[test]
    fn test_select_best_method_prefers_cram_md5() {
        let available = vec![AuthMethod::Plain, AuthMethod::Login, AuthMethod::CramMd5];
        assert_eq!(Authenticator::select_best_method(&available), AuthMethod::CramMd5);
    }

    #[test]
    fn test_select_best_method_prefers_login_over_plain() {
        let available = vec![AuthMethod::Plain, AuthMethod::Login];
        assert_eq!(Authenticator::select_best_method(&available), AuthMethod::Login);
    }

    #[test]
    fn test_select_best_method_plain_only() {
        let available = vec![AuthMethod::Plain];
        assert_eq!(Authenticator::select_best_method(&available), AuthMethod::Plain);
    }

    #[test]
    fn test_select_best_method_defaults_to_plain_when_absent() {
        let available: Vec<AuthMethod> = vec![];
        assert_eq!(Authenticator::select_best_method(&available), AuthMethod::Plain);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::plain("user", "secret_password");
        let debug_str = format!("{:?}", creds);
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("secret_password"));
    }
}
