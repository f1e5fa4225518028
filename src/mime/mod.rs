//! MIME message composition.
//!
//! Assembles an RFC 5322 header block and a body that is either
//! `multipart/alternative` (text + HTML), `text/html`, or `text/plain`,
//! each part quoted-printable encoded. Headers that can carry
//! attacker-controlled text are routed through a sanitizer before
//! RFC 2047 encoding, closing off header-injection via embedded CRLF.

use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::errors::{SmtpError, SmtpErrorKind, SmtpResult};
use crate::types::Email;

const STANDARD_HEADER_NAMES: [&str; 6] = ["from", "to", "cc", "bcc", "subject", "date"];

/// MIME content types this composer ever emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    /// `text/plain; charset=utf-8`.
    TextPlain,
    /// `text/html; charset=utf-8`.
    TextHtml,
    /// `multipart/alternative; boundary="..."`.
    MultipartAlternative(String),
}

impl ContentType {
    /// Returns the MIME type string.
    pub fn mime_type(&self) -> String {
        match self {
            ContentType::TextPlain => "text/plain; charset=utf-8".to_string(),
            ContentType::TextHtml => "text/html; charset=utf-8".to_string(),
            ContentType::MultipartAlternative(boundary) => {
                format!("multipart/alternative; boundary=\"{}\"", boundary)
            }
        }
    }
}

/// Composes RFC 5322 messages for one email at a time.
pub struct MimeEncoder {
    date: DateTime<Utc>,
    /// Domain used for generated `Message-ID`s: the portion of
    /// `config.user` after `@`, or `localhost` if absent.
    message_id_domain: String,
}

impl MimeEncoder {
    /// Creates a new encoder. `message_id_domain` should be the domain
    /// part of the configured user, already resolved by the caller.
    pub fn new(message_id_domain: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            message_id_domain: message_id_domain.into(),
        }
    }

    /// Encodes an email to an RFC 5322 byte blob (header block + body),
    /// ready for dot-stuffing and the `DATA` phase.
    pub fn encode(&self, email: &Email) -> SmtpResult<Vec<u8>> {
        let mut output = Vec::new();

        let message_id = email.message_id.clone().unwrap_or_else(|| self.generate_message_id());

        self.write_header(&mut output, "From", &email.from.to_header())?;

        if !email.to.is_empty() {
            let to_list: Vec<String> = email.to.iter().map(|a| a.to_header()).collect();
            self.write_header(&mut output, "To", &to_list.join(", "))?;
        }

        self.write_header(&mut output, "Subject", &email.subject)?;
        self.write_header(&mut output, "Message-ID", &format!("<{}>", message_id))?;
        self.write_raw_header(&mut output, "Date", &self.format_date());
        self.write_raw_header(&mut output, "MIME-Version", "1.0");

        if !email.cc.is_empty() {
            let cc_list: Vec<String> = email.cc.iter().map(|a| a.to_header()).collect();
            self.write_header(&mut output, "Cc", &cc_list.join(", "))?;
        }

        if let Some(reply_to) = &email.reply_to {
            self.write_header(&mut output, "Reply-To", &reply_to.to_header())?;
        }

        if let Some(in_reply_to) = &email.in_reply_to {
            self.write_raw_header(&mut output, "In-Reply-To", &format!("<{}>", in_reply_to));
        }

        if !email.references.is_empty() {
            let refs: Vec<String> = email.references.iter().map(|r| format!("<{}>", r)).collect();
            self.write_raw_header(&mut output, "References", &refs.join(" "));
        }

        // Note: BCC is never written to a header — envelope-only.

        for (name, value) in &email.headers {
            if is_standard_header_name(name) || !is_valid_extra_header_name(name) {
                continue;
            }
            self.write_header(&mut output, name, value)?;
        }

        let has_text = email.text.is_some();
        let has_html = email.html.is_some();

        if has_text && has_html {
            let boundary = self.generate_boundary();
            self.write_raw_header(
                &mut output,
                "Content-Type",
                &ContentType::MultipartAlternative(boundary.clone()).mime_type(),
            );
            output.extend_from_slice(b"\r\n");
            self.write_alternative_body(&mut output, email, &boundary);
        } else if has_html {
            self.write_single_part(&mut output, ContentType::TextHtml, email.html.as_deref().unwrap_or(""));
        } else {
            self.write_single_part(&mut output, ContentType::TextPlain, email.text.as_deref().unwrap_or(""));
        }

        Ok(output)
    }

    /// Sanitizes and RFC 2047-encodes a header value, then writes it.
    fn write_header(&self, output: &mut Vec<u8>, name: &str, value: &str) -> SmtpResult<()> {
        if name.chars().any(|c| c.is_control() || c == ':') {
            return Err(SmtpError::message_error(
                SmtpErrorKind::InvalidHeader,
                format!("Invalid header name: {}", name),
            ));
        }
        let encoded = encode_header_value(&sanitize_header_value(value));
        self.write_raw_header(output, name, &encoded);
        Ok(())
    }

    /// Writes a header whose value is already known-safe (dates, MIME
    /// boilerplate, angle-bracketed IDs) without sanitizing or encoding it.
    fn write_raw_header(&self, output: &mut Vec<u8>, name: &str, value: &str) {
        output.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }

    /// Generates a `Message-ID` local part: `hex(16 random bytes)@domain`.
    fn generate_message_id(&self) -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("{}@{}", to_hex(&bytes), self.message_id_domain)
    }

    /// Generates a MIME boundary: `----=_NextPart_hex(12 random bytes)`.
    fn generate_boundary(&self) -> String {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("----=_NextPart_{}", to_hex(&bytes))
    }

    fn format_date(&self) -> String {
        self.date.format("%a, %d %b %Y %H:%M:%S %z").to_string()
    }

    fn write_single_part(&self, output: &mut Vec<u8>, content_type: ContentType, body: &str) {
        self.write_raw_header(output, "Content-Type", &content_type.mime_type());
        self.write_raw_header(output, "Content-Transfer-Encoding", "quoted-printable");
        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(&encode_quoted_printable(body));
    }

    fn write_alternative_body(&self, output: &mut Vec<u8>, email: &Email, boundary: &str) {
        if let Some(text) = &email.text {
            output.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            self.write_raw_header(output, "Content-Type", &ContentType::TextPlain.mime_type());
            self.write_raw_header(output, "Content-Transfer-Encoding", "quoted-printable");
            output.extend_from_slice(b"\r\n");
            output.extend_from_slice(&encode_quoted_printable(text));
            output.extend_from_slice(b"\r\n");
        }

        if let Some(html) = &email.html {
            output.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            self.write_raw_header(output, "Content-Type", &ContentType::TextHtml.mime_type());
            self.write_raw_header(output, "Content-Transfer-Encoding", "quoted-printable");
            output.extend_from_slice(b"\r\n");
            output.extend_from_slice(&encode_quoted_printable(html));
            output.extend_from_slice(b"\r\n");
        }

        output.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    }

    /// Dot-stuffs an encoded message and appends the `<CRLF>.<CRLF>`
    /// terminator expected by the `DATA` phase.
    pub fn prepare_data_content(encoded_email: &[u8]) -> Vec<u8> {
        let mut output = Vec::with_capacity(encoded_email.len() + 100);
        let mut at_line_start = true;

        for &byte in encoded_email {
            if at_line_start && byte == b'.' {
                output.push(b'.');
            }
            output.push(byte);
            at_line_start = byte == b'\n';
        }

        if !output.ends_with(b"\r\n") {
            if output.ends_with(b"\n") {
                output.pop();
                output.extend_from_slice(b"\r\n");
            } else {
                output.extend_from_slice(b"\r\n");
            }
        }

        output.extend_from_slice(b".\r\n");
        output
    }
}

fn is_standard_header_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    STANDARD_HEADER_NAMES.contains(&lower.as_str()) || lower == "message-id"
}

fn is_valid_extra_header_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Collapses CR/LF/TAB runs to a single space, collapses runs of 2+
/// spaces to one, and trims — defeats header injection via embedded
/// newlines before the value ever reaches the encoder.
pub fn sanitize_header_value(value: &str) -> String {
    let mut collapsed = String::with_capacity(value.len());
    let mut last_was_space = false;

    for c in value.chars() {
        if c == '\r' || c == '\n' || c == '\t' || c == ' ' {
            if !last_was_space {
                collapsed.push(' ');
                last_was_space = true;
            }
        } else {
            collapsed.push(c);
            last_was_space = false;
        }
    }

    collapsed.trim().to_string()
}

/// RFC 2047 Q-form header encoding: ASCII values pass through unchanged;
/// otherwise every non-ASCII byte is replaced by `=HH` inside a
/// `=?UTF-8?Q?...?=` encoded word.
pub fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut encoded = String::from("=?UTF-8?Q?");
    for byte in value.as_bytes() {
        if byte.is_ascii() {
            encoded.push(*byte as char);
        } else {
            encoded.push_str(&format!("={:02X}", byte));
        }
    }
    encoded.push_str("?=");
    encoded
}

/// Quoted-printable body encoding (RFC 2045 §6.7).
///
/// A single per-byte pass: CRLF is normalized first, then every byte is
/// classified and either passed through or escaped as `=HH`. `=` always
/// becomes the three-byte sequence `=3D`. This differs from the
/// reference this specification was distilled from, which replaced `=`
/// with the literal text `=3D` before the per-byte pass ran — which then
/// re-encoded that pass's own `=` into `=3D3D`. RFC 2045 requires `=3D`,
/// so this encoder only ever emits it once.
pub fn encode_quoted_printable(text: &str) -> Vec<u8> {
    let normalized = normalize_line_endings(text);
    let mut output = Vec::with_capacity(normalized.len());
    let mut line_len = 0usize;

    for &byte in &normalized {
        if byte == b'\r' {
            output.push(b'\r');
            continue;
        }
        if byte == b'\n' {
            output.push(b'\n');
            line_len = 0;
            continue;
        }

        let chunk: Vec<u8> = if byte == b'=' {
            vec![b'=', b'3', b'D']
        } else if (0x21..=0x7E).contains(&byte) || byte == b' ' {
            vec![byte]
        } else {
            format!("={:02X}", byte).into_bytes()
        };

        if line_len + chunk.len() > 75 {
            output.extend_from_slice(b"=\r\n");
            line_len = 0;
        }
        output.extend_from_slice(&chunk);
        line_len += chunk.len();
    }

    output
}

fn normalize_line_endings(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                out.extend_from_slice(b"\r\n");
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            }
            b'\n' => out.extend_from_slice(b"\r\n"),
            b => out.push(b),
        }
        i += 1;
    }
    out
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    #[test]
    fn test_header_encoding_ascii_passthrough() {
        assert_eq!(encode_header_value("Hello"), "Hello");
    }

    #[test]
    fn test_header_encoding_non_ascii() {
        let encoded = encode_header_value("H\u{e9}llo");
        assert!(encoded.starts_with("=?UTF-8?Q?"));
        assert!(encoded.ends_with("?="));
        assert!(encoded.contains("=C3=A9"));
    }

    #[test]
    fn test_sanitize_header_value_collapses_injection() {
        let dirty = "Subject\r\nBcc: attacker@evil.com";
        let clean = sanitize_header_value(dirty);
        assert!(!clean.contains('\r'));
        assert!(!clean.contains('\n'));
        assert_eq!(clean, "Subject Bcc: attacker@evil.com");
    }

    #[test]
    fn test_sanitize_collapses_multi_space() {
        assert_eq!(sanitize_header_value("a    b"), "a b");
        assert_eq!(sanitize_header_value("  leading and trailing  "), "leading and trailing");
    }

    #[test]
    fn test_qp_identity_for_plain_ascii() {
        let input = "Hello World, this is a normal sentence (no equals).";
        let encoded = encode_quoted_printable(input);
        assert_eq!(encoded, input.as_bytes());
    }

    #[test]
    fn test_qp_equals_sign() {
        // OQ-1: a single '=' must become exactly "=3D", never "=3D3D".
        let encoded = encode_quoted_printable("a=b");
        assert_eq!(encoded, b"a=3Db");
    }

    #[test]
    fn test_qp_byte_coverage() {
        for byte in 0u16..=255 {
            let byte = byte as u8;
            let input = String::from_utf8_lossy(&[byte]).to_string();
            let encoded = encode_quoted_printable(&input);
            for &out_byte in &encoded {
                let ok = (0x21..=0x7E).contains(&out_byte)
                    || out_byte == b' '
                    || out_byte == b'\r'
                    || out_byte == b'\n';
                assert!(ok, "byte {:#04x} produced disallowed output byte {:#04x}", byte, out_byte);
            }
        }
    }

    #[test]
    fn test_qp_line_length() {
        let input = "x".repeat(500);
        let encoded = encode_quoted_printable(&input);
        for line in encoded.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            assert!(line.len() <= 76, "line length {} exceeds 76", line.len());
        }
    }

    #[test]
    fn test_message_id_format() {
        let encoder = MimeEncoder::new("example.com");
        let id = encoder.generate_message_id();
        assert!(id.ends_with("@example.com"));
        let hex_part = id.split('@').next().unwrap();
        assert_eq!(hex_part.len(), 32);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_boundary_format() {
        let encoder = MimeEncoder::new("example.com");
        let b1 = encoder.generate_boundary();
        let b2 = encoder.generate_boundary();
        assert_ne!(b1, b2);
        assert!(b1.starts_with("----=_NextPart_"));
        assert_eq!(b1.len(), "----=_NextPart_".len() + 24);
    }

    #[test]
    fn test_dot_stuffing() {
        let input = b"Hello\r\n.World\r\n..Test\r\n";
        let output = MimeEncoder::prepare_data_content(input);
        let output_str = String::from_utf8_lossy(&output);
        assert!(output_str.contains("\r\n..World"));
        assert!(output_str.contains("\r\n...Test"));
        assert!(output_str.ends_with("\r\n.\r\n"));
    }

    #[test]
    fn test_bcc_excluded_from_headers() {
        let email = Email {
            from: Address::new("sender@example.com").unwrap(),
            to: vec![Address::new("a@example.com").unwrap()],
            cc: vec![],
            bcc: vec![
                Address::new("b@example.com").unwrap(),
                Address::new("c@example.com").unwrap(),
            ],
            reply_to: None,
            subject: "Hi".to_string(),
            text: Some("hello".to_string()),
            html: None,
            headers: vec![],
            message_id: None,
            in_reply_to: None,
            references: vec![],
        };

        let encoder = MimeEncoder::new("example.com");
        let encoded = encoder.encode(&email).unwrap();
        let content = String::from_utf8_lossy(&encoded);
        let without_message_id: String = content
            .lines()
            .filter(|line| !line.starts_with("Message-ID:"))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(!without_message_id.contains("Bcc:"));
        assert!(!without_message_id.contains("b@example.com"));
        assert!(!without_message_id.contains("c@example.com"));
    }

    #[test]
    fn test_custom_header_filtering() {
        let email = Email {
            from: Address::new("sender@example.com").unwrap(),
            to: vec![Address::new("a@example.com").unwrap()],
            cc: vec![],
            bcc: vec![],
            reply_to: None,
            subject: "Hi".to_string(),
            text: Some("hello".to_string()),
            html: None,
            headers: vec![
                ("X-Mailer".to_string(), "mikromail".to_string()),
                ("Subject".to_string(), "spoofed".to_string()),
                ("Bad Name!".to_string(), "dropped".to_string()),
            ],
            message_id: None,
            in_reply_to: None,
            references: vec![],
        };

        let encoder = MimeEncoder::new("example.com");
        let encoded = encoder.encode(&email).unwrap();
        let content = String::from_utf8_lossy(&encoded);
        assert!(content.contains("X-Mailer: mikromail"));
        assert!(!content.contains("spoofed"));
        assert!(!content.contains("dropped"));
    }

    #[test]
    fn test_multipart_alternative() {
        let email = Email {
            from: Address::new("sender@example.com").unwrap(),
            to: vec![Address::new("a@example.com").unwrap()],
            cc: vec![],
            bcc: vec![],
            reply_to: None,
            subject: "Hi".to_string(),
            text: Some("hi".to_string()),
            html: Some("<b>hi</b>".to_string()),
            headers: vec![],
            message_id: None,
            in_reply_to: None,
            references: vec![],
        };

        let encoder = MimeEncoder::new("example.com");
        let encoded = encoder.encode(&email).unwrap();
        let content = String::from_utf8_lossy(&encoded);
        assert!(content.contains("multipart/alternative; boundary=\"----=_NextPart_"));
        assert!(content.contains("Content-Type: text/plain; charset=utf-8"));
        assert!(content.contains("Content-Type: text/html; charset=utf-8"));
    }
}
