//! Basic Mail Sending Example
//!
//! This example demonstrates how to:
//! - Build a STARTTLS connection configuration
//! - Create a dispatcher with the system hostname resolver
//! - Send a plain text message with credentials

use integrations_mail::{
    ConnectionConfig, Credentials, Dispatcher, HostnameResolver, MailError, MimeContent,
    OutgoingMessage,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), MailError> {
    let config = ConnectionConfig::builder("smtp.example.com", 587)
        .tls(true)
        .connection_timeout(Duration::from_secs(10))
        .read_timeout(Duration::from_secs(30))
        .build()?;

    println!("Resolving local hostname...");
    let resolver = HostnameResolver::system();
    let dispatcher = Dispatcher::new(config, &resolver).await?;
    println!("  EHLO name: {}", resolver.cached().unwrap_or("-"));

    let message = OutgoingMessage::parse(
        "Hello from Rust!",
        MimeContent::text("This is a simple text email.\n\nBest regards,\nThe Mail Bot")?,
        "Sender Name <sender@example.com>",
        &["Recipient Name <recipient@example.com>"],
        &[],
        &[],
    )?;

    println!("Sending {}", message);
    let credentials = Credentials::new("sender@example.com", "your-password");

    match dispatcher.send(Some(&credentials), &message).await {
        Ok(message_id) => {
            println!("Email sent successfully!");
            println!("  Message ID: {}", message_id);
        }
        Err(e) => {
            eprintln!("Failed to send email: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
