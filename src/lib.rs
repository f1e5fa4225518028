//! # mikromail
//!
//! A dependency-light SMTP submission client implementation with:
//! - Full RFC 5321 SMTP and RFC 5322 message format compliance
//! - Authentication via CRAM-MD5, LOGIN, and PLAIN (selected by priority)
//! - Transport security (STARTTLS, implicit TLS)
//! - MIME message construction (plain text, HTML, or multipart/alternative)
//! - Flat-delay retry on transient failures
//! - Comprehensive observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mikromail::{SmtpClient, SmtpConfig, Email};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Create client from configuration
//!     let config = SmtpConfig::builder()
//!         .host("smtp.example.com")
//!         .port(587)
//!         .credentials("user@example.com", "password")
//!         .build()?;
//!
//!     let client = SmtpClient::new(config).await?;
//!
//!     // Build and send an email
//!     let email = Email::builder()
//!         .from("sender@example.com")?
//!         .to("recipient@example.com")?
//!         .subject("Hello from Rust!")
//!         .text("This is a test email.")
//!         .build()?;
//!
//!     let result = client.send(email).await;
//!     println!("Send result: {:?}", result);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Protocol layer
pub mod protocol;

// Transport layer
pub mod transport;

// Authentication
pub mod auth;

// MIME encoding
pub mod mime;

// Observability
pub mod observability;

// Client
pub mod client;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use client::{SmtpClient, SmtpClientBuilder};
pub use config::{SmtpConfig, SmtpConfigBuilder, TlsConfig, TlsVersion};
pub use errors::{SmtpError, SmtpErrorKind, SmtpResult};
pub use types::{Email, EmailBuilder, Address, SendResult, SentMessage, RejectedRecipient};
pub use auth::{AuthMethod, Credentials, CredentialProvider};
pub use protocol::{SmtpCommand, SmtpResponse, EsmtpCapabilities};
pub use transport::SmtpTransport;
pub use mime::{MimeEncoder, ContentType};
