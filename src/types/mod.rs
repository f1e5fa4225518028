//! Core message types for the SMTP client.
//!
//! This module provides the email address type (with its syntactic
//! validator), the composable [`Email`]/[`EmailBuilder`], and the
//! tagged-union [`SendResult`] every send eventually produces.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{SmtpError, SmtpErrorKind, SmtpResult};

/// Email address with optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Display name (e.g., "John Doe").
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com").
    pub email: String,
}

const LOCAL_PART_CHARS: &str = "!#$%&'*+-/=?^_`{|}~.";

impl Address {
    /// Creates a new address with just an email.
    pub fn new(email: impl Into<String>) -> SmtpResult<Self> {
        let email = email.into();
        Self::require_valid(&email)?;
        Ok(Self { name: None, email })
    }

    /// Creates a new address with display name and email.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> SmtpResult<Self> {
        let email = email.into();
        Self::require_valid(&email)?;
        Ok(Self {
            name: Some(name.into()),
            email,
        })
    }

    /// Parses an address from a string (e.g., "John Doe <john@example.com>").
    pub fn parse(s: &str) -> SmtpResult<Self> {
        let s = s.trim();

        if let Some(start) = s.find('<') {
            if let Some(end) = s.find('>') {
                let name = s[..start].trim().trim_matches('"');
                let email = s[start + 1..end].trim();
                return Self::with_name(name, email);
            }
        }

        Self::new(s)
    }

    fn require_valid(email: &str) -> SmtpResult<()> {
        if is_valid_email(email) {
            Ok(())
        } else {
            Err(SmtpError::message_error(
                SmtpErrorKind::InvalidFromAddress,
                format!("Invalid email address: {}", email),
            ))
        }
    }

    /// Returns the email part only.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the display name if present.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Formats the address for SMTP MAIL FROM/RCPT TO commands.
    pub fn to_smtp(&self) -> String {
        format!("<{}>", self.email)
    }

    /// Formats the address for email headers.
    pub fn to_header(&self) -> String {
        match &self.name {
            Some(name) => {
                if name.contains(|c: char| !c.is_alphanumeric() && c != ' ') {
                    format!("\"{}\" <{}>", name, self.email)
                } else {
                    format!("{} <{}>", name, self.email)
                }
            }
            None => self.email.clone(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_header())
    }
}

impl TryFrom<&str> for Address {
    type Error = SmtpError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = SmtpError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Address::parse(&s)
    }
}

/// Pure syntactic predicate over `local@domain`. Never panics; returns
/// `false` on any parse or constraint failure rather than raising.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() {
        return false;
    }

    let Some(at) = email.find('@') else {
        return false;
    };
    if email[at + 1..].contains('@') {
        return false;
    }

    let local = &email[..at];
    let domain = &email[at + 1..];

    is_valid_local_part(local) && is_valid_domain(domain)
}

fn is_valid_local_part(local: &str) -> bool {
    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || LOCAL_PART_CHARS.contains(c))
}

fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 255 {
        return false;
    }

    if let Some(inner) = domain.strip_prefix('[').and_then(|d| d.strip_suffix(']')) {
        return is_valid_bracketed_domain(inner);
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    if !labels.iter().all(|label| is_valid_label(label)) {
        return false;
    }

    labels.last().map(|top| top.len() >= 2).unwrap_or(false)
}

fn is_valid_bracketed_domain(inner: &str) -> bool {
    if let Some(v6) = inner.strip_prefix("IPv6:") {
        return !v6.is_empty();
    }

    let groups: Vec<&str> = inner.split('.').collect();
    groups.len() == 4
        && groups
            .iter()
            .all(|g| !g.is_empty() && g.len() <= 3 && g.chars().all(|c| c.is_ascii_digit()))
}

fn is_valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    let bytes = label.as_bytes();
    if !bytes[0].is_ascii_alphanumeric() || !bytes[bytes.len() - 1].is_ascii_alphanumeric() {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}

/// Complete email message.
#[derive(Debug, Clone)]
pub struct Email {
    /// Sender address.
    pub from: Address,
    /// Primary recipients.
    pub to: Vec<Address>,
    /// CC recipients.
    pub cc: Vec<Address>,
    /// BCC recipients (envelope only, never a header).
    pub bcc: Vec<Address>,
    /// Reply-to address.
    pub reply_to: Option<Address>,
    /// Email subject.
    pub subject: String,
    /// Plain text body.
    pub text: Option<String>,
    /// HTML body.
    pub html: Option<String>,
    /// Additional headers, in insertion order (an "ordered mapping" per the
    /// message description — a `HashMap` would make composed output
    /// nondeterministic).
    pub headers: Vec<(String, String)>,
    /// Message ID (generated if not set).
    pub message_id: Option<String>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// References header.
    pub references: Vec<String>,
}

impl Email {
    /// Creates a new email builder.
    pub fn builder() -> EmailBuilder {
        EmailBuilder::default()
    }

    /// Returns all envelope recipients (to + cc + bcc) — everyone who
    /// receives a `RCPT TO`, regardless of whether they appear in a header.
    pub fn all_recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }

    /// Returns the count of all envelope recipients.
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }

    /// Returns true if the email has both text and HTML parts.
    pub fn is_multipart_alternative(&self) -> bool {
        self.text.is_some() && self.html.is_some()
    }
}

/// Builder for Email messages.
#[derive(Debug, Default)]
pub struct EmailBuilder {
    from: Option<Address>,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    reply_to: Option<Address>,
    subject: String,
    text: Option<String>,
    html: Option<String>,
    headers: Vec<(String, String)>,
    message_id: Option<String>,
    in_reply_to: Option<String>,
    references: Vec<String>,
}

impl EmailBuilder {
    /// Sets the sender address.
    pub fn from(mut self, address: impl TryInto<Address, Error = SmtpError>) -> SmtpResult<Self> {
        self.from = Some(address.try_into()?);
        Ok(self)
    }

    /// Adds a primary recipient.
    pub fn to(mut self, address: impl TryInto<Address, Error = SmtpError>) -> SmtpResult<Self> {
        self.to.push(address.try_into()?);
        Ok(self)
    }

    /// Adds multiple primary recipients.
    pub fn to_many<I, A>(mut self, addresses: I) -> SmtpResult<Self>
    where
        I: IntoIterator<Item = A>,
        A: TryInto<Address, Error = SmtpError>,
    {
        for addr in addresses {
            self.to.push(addr.try_into()?);
        }
        Ok(self)
    }

    /// Adds a CC recipient. An address that fails syntactic validation is
    /// silently dropped rather than aborting the whole build — only `from`
    /// and `to` addresses are held to that bar.
    pub fn cc(mut self, address: impl TryInto<Address, Error = SmtpError>) -> Self {
        if let Ok(address) = address.try_into() {
            self.cc.push(address);
        }
        self
    }

    /// Adds a BCC recipient. Invalid addresses are silently dropped, same
    /// as [`EmailBuilder::cc`].
    pub fn bcc(mut self, address: impl TryInto<Address, Error = SmtpError>) -> Self {
        if let Ok(address) = address.try_into() {
            self.bcc.push(address);
        }
        self
    }

    /// Sets the reply-to address.
    pub fn reply_to(mut self, address: impl TryInto<Address, Error = SmtpError>) -> SmtpResult<Self> {
        self.reply_to = Some(address.try_into()?);
        Ok(self)
    }

    /// Sets the subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the plain text body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the HTML body.
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Adds a custom header. Dropped at composition time if the name
    /// collides with a standard header or contains characters outside
    /// `[A-Za-z0-9-]`.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the message ID.
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Sets the In-Reply-To header.
    pub fn in_reply_to(mut self, id: impl Into<String>) -> Self {
        self.in_reply_to = Some(id.into());
        self
    }

    /// Adds a reference.
    pub fn reference(mut self, id: impl Into<String>) -> Self {
        self.references.push(id.into());
        self
    }

    /// Builds the email.
    pub fn build(self) -> SmtpResult<Email> {
        let from = self.from.ok_or_else(|| {
            SmtpError::message_error(SmtpErrorKind::InvalidFromAddress, "From address is required")
        })?;

        if self.to.is_empty() {
            return Err(SmtpError::message_error(
                SmtpErrorKind::InvalidRecipientAddress,
                "At least one `to` recipient is required",
            ));
        }

        if self.text.is_none() && self.html.is_none() {
            return Err(SmtpError::message_error(
                SmtpErrorKind::EncodingFailed,
                "Email body is required (text or HTML)",
            ));
        }

        Ok(Email {
            from,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
            subject: self.subject,
            text: self.text,
            html: self.html,
            headers: self.headers,
            message_id: self.message_id,
            in_reply_to: self.in_reply_to,
            references: self.references,
        })
    }
}

/// A recipient that was rejected by the server.
#[derive(Debug, Clone)]
pub struct RejectedRecipient {
    /// The rejected address.
    pub address: Address,
    /// SMTP status code.
    pub code: u16,
    /// Error message from server.
    pub message: String,
}

/// The successful half of a send attempt.
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Message ID extracted from the composed headers.
    pub message_id: String,
    /// Recipients the server accepted.
    pub accepted: Vec<Address>,
    /// Recipients the server rejected (a partial success).
    pub rejected: Vec<RejectedRecipient>,
    /// Final server response text.
    pub response: String,
    /// Wall-clock time spent in `send`, including retries.
    pub duration: Duration,
}

/// Result of sending a single email: a tagged union rather than a
/// `Result<T, E>` alias, because `send` never raises — both outcomes are
/// ordinary values the facade can log without a try/catch.
#[derive(Debug)]
pub enum SendResult {
    /// The message was accepted by the server.
    Success(SentMessage),
    /// The send failed, permanently or after exhausting retries.
    Failure(SmtpError),
}

impl SendResult {
    /// Returns true if the send succeeded (all recipients accepted).
    pub fn is_success(&self) -> bool {
        matches!(self, SendResult::Success(_))
    }

    /// Returns the message ID, if the send succeeded.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            SendResult::Success(m) => Some(&m.message_id),
            SendResult::Failure(_) => None,
        }
    }

    /// Returns the error, if the send failed.
    pub fn error(&self) -> Option<&SmtpError> {
        match self {
            SendResult::Success(_) => None,
            SendResult::Failure(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse() {
        let addr = Address::parse("test@example.com").unwrap();
        assert_eq!(addr.email, "test@example.com");
        assert!(addr.name.is_none());

        let addr = Address::parse("John Doe <john@example.com>").unwrap();
        assert_eq!(addr.email, "john@example.com");
        assert_eq!(addr.name, Some("John Doe".to_string()));

        let addr = Address::parse("\"John, Doe\" <john@example.com>").unwrap();
        assert_eq!(addr.email, "john@example.com");
        assert_eq!(addr.name, Some("John, Doe".to_string()));
    }

    #[test]
    fn test_address_validator_accepts() {
        for candidate in [
            "test@example.com",
            "test.name@sub.example.com",
            "a!#$%&'*+-/=?^_`{|}~@example.com",
            "user@[192.168.1.1]",
            "user@[IPv6:2001:db8::1]",
            "a@a.bb",
            "x@a-b.co",
        ] {
            assert!(is_valid_email(candidate), "expected {} to be valid", candidate);
        }
    }

    #[test]
    fn test_address_validator_rejects() {
        for candidate in [
            "",
            "no-at-sign",
            "two@@signs.com",
            "@no-local.com",
            "no-domain@",
            ".leading@example.com",
            "trailing.@example.com",
            "double..dot@example.com",
            "user@single-label",
            "user@-leads-with-hyphen.com",
            "user@trails-with-hyphen-.com",
            "user@a.c",
            "user@[300.1.1.1.1]",
            "user@[not.bracketed.right",
        ] {
            assert!(!is_valid_email(candidate), "expected {} to be invalid", candidate);
        }
    }

    #[test]
    fn test_email_builder() {
        let email = Email::builder()
            .from("sender@example.com").unwrap()
            .to("recipient@example.com").unwrap()
            .subject("Test")
            .text("Hello!")
            .build()
            .unwrap();

        assert_eq!(email.from.email, "sender@example.com");
        assert_eq!(email.to.len(), 1);
        assert_eq!(email.subject, "Test");
        assert_eq!(email.text, Some("Hello!".to_string()));
    }

    #[test]
    fn test_email_builder_validation() {
        let result = Email::builder()
            .to("test@example.com").unwrap()
            .text("Hello")
            .build();
        assert!(result.is_err());

        let result = Email::builder()
            .from("test@example.com").unwrap()
            .text("Hello")
            .build();
        assert!(result.is_err());

        let result = Email::builder()
            .from("test@example.com").unwrap()
            .to("test@example.com").unwrap()
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_all_recipients_includes_bcc() {
        let email = Email::builder()
            .from("sender@example.com").unwrap()
            .to("a@example.com").unwrap()
            .bcc("b@example.com")
            .text("hi")
            .build()
            .unwrap();

        let all: Vec<_> = email.all_recipients().map(|a| a.email.as_str()).collect();
        assert_eq!(all, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_invalid_cc_bcc_silently_skipped() {
        let email = Email::builder()
            .from("sender@example.com").unwrap()
            .to("a@example.com").unwrap()
            .cc("not-an-address")
            .bcc("also-not-an-address")
            .text("hi")
            .build()
            .unwrap();

        assert!(email.cc.is_empty());
        assert!(email.bcc.is_empty());
    }

    #[test]
    fn test_empty_to_rejected_even_with_cc_bcc() {
        let result = Email::builder()
            .from("sender@example.com").unwrap()
            .cc("c@example.com")
            .bcc("b@example.com")
            .text("hi")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_send_result_success() {
        let result = SendResult::Success(SentMessage {
            message_id: "abc@x".to_string(),
            accepted: vec![],
            rejected: vec![],
            response: "250 OK".to_string(),
            duration: Duration::ZERO,
        });
        assert!(result.is_success());
        assert_eq!(result.message_id(), Some("abc@x"));
        assert!(result.error().is_none());
    }

    #[test]
    fn test_send_result_failure() {
        let result = SendResult::Failure(SmtpError::connection("refused"));
        assert!(!result.is_success());
        assert!(result.message_id().is_none());
        assert!(result.error().is_some());
    }
}
