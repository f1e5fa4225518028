//! Basic SMTP Email Sending Example
//!
//! Demonstrates:
//! - Building an `SmtpClient` from a configuration
//! - Constructing a simple text email
//! - Sending it and inspecting the `SendResult`

use mikromail::{Email, SendResult, SmtpClient, SmtpConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = SmtpConfig::builder()
        .host("smtp.example.com")
        .port(587)
        .credentials("user@example.com", "your-password")
        .build()?;

    println!("Creating SMTP client...");
    let client = SmtpClient::new(config).await?;

    let email = Email::builder()
        .from("Sender Name <sender@example.com>")?
        .to("Recipient Name <recipient@example.com>")?
        .subject("Hello from Rust SMTP!")
        .text("This is a simple text email sent using mikromail.\n\nBest regards,\nThe SMTP Bot")
        .build()?;

    println!("Sending email...");
    println!("  From: {}", email.from);
    println!("  To: {}", email.to.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", "));
    println!("  Subject: {}", email.subject);

    match client.send(email).await {
        SendResult::Success(sent) => {
            println!("Email sent successfully!");
            println!("  Message ID: {}", sent.message_id);
            println!("  Accepted: {}", sent.accepted.len());
        }
        SendResult::Failure(err) => {
            eprintln!("Failed to send email: {}", err);
            return Err(Box::new(err) as Box<dyn std::error::Error>);
        }
    }

    Ok(())
}
