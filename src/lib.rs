//! # Mail Dispatch Library
//!
//! A thin SMTP/SMTPS send layer over lettre:
//! - Connection options flattened into session properties, caller overrides last
//! - Messages validated when constructed, never at send time
//! - Best-effort discovery of the EHLO name (external IP, PTR, platform lookup)
//! - Per-message success/failure hooks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_mail::{ConnectionConfig, Credentials, Dispatcher, HostnameResolver, MimeContent, OutgoingMessage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::builder("smtp.example.com", 587)
//!         .tls(true)
//!         .build()?;
//!
//!     let resolver = HostnameResolver::system();
//!     let dispatcher = Dispatcher::new(config, &resolver).await?;
//!
//!     let message = OutgoingMessage::parse(
//!         "Hello from Rust!",
//!         MimeContent::text("This is a test email.")?,
//!         "sender@example.com",
//!         &["recipient@example.com"],
//!         &[],
//!         &[],
//!     )?;
//!
//!     let credentials = Credentials::new("sender@example.com", "password");
//!     let message_id = dispatcher.send(Some(&credentials), &message).await?;
//!     println!("Message sent with ID: {}", message_id);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod properties;
pub mod types;

// Authentication
pub mod auth;

// Local hostname discovery
pub mod hostname;

// Transport layer
pub mod transport;

// Observability
pub mod observability;

// Client
pub mod client;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use auth::Credentials;
pub use client::{generate_message_id, Callbacks, DeliveryHooks, Dispatcher, NoHooks};
pub use config::{ConnectionConfig, ConnectionConfigBuilder, Protocol};
pub use errors::{MailError, MailErrorKind, MailResult};
pub use hostname::{HostnameResolver, FALLBACK_HOSTNAME};
pub use observability::{DispatchMetrics, MetricsSnapshot};
pub use properties::SessionProperties;
pub use transport::{LettreTransport, MailTransport, SessionSettings};
pub use types::{BatchSendResult, MimeContent, OutgoingMessage, OutgoingMessageBuilder};
