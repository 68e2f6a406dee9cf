//! Error types for mail dispatch.
//!
//! Every fallible operation in the crate returns a [`MailError`] whose
//! [`MailErrorKind`] says which stage failed: building the configuration,
//! parsing an address, validating an external IP, talking to the SMTP
//! server, or looking up the local hostname.

use std::fmt;
use thiserror::Error;

/// Result type for mail operations.
pub type MailResult<T> = Result<T, MailError>;

/// Mail error kinds categorizing different failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailErrorKind {
    /// Invalid host, port, subject, content or recipient set.
    Configuration,
    /// An email address string could not be parsed.
    AddressParse,
    /// A value did not have the expected textual format (e.g. IPv4).
    InvalidFormat,
    /// Connect, authenticate or submit failed.
    Transport,
    /// A hostname lookup source failed. Never escapes the resolver.
    HostnameResolution,
    /// Unknown or internal error.
    Unknown,
}

impl MailErrorKind {
    /// Returns true if retrying the same call cannot succeed.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            MailErrorKind::Configuration | MailErrorKind::AddressParse | MailErrorKind::InvalidFormat
        )
    }
}

impl fmt::Display for MailErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailErrorKind::Configuration => write!(f, "Invalid configuration"),
            MailErrorKind::AddressParse => write!(f, "Invalid email address"),
            MailErrorKind::InvalidFormat => write!(f, "Invalid format"),
            MailErrorKind::Transport => write!(f, "Transport failure"),
            MailErrorKind::HostnameResolution => write!(f, "Hostname resolution failed"),
            MailErrorKind::Unknown => write!(f, "Unknown error"),
        }
    }
}

/// Mail error with detailed information.
#[derive(Error, Debug)]
pub struct MailError {
    /// Error kind.
    kind: MailErrorKind,
    /// Human-readable message.
    message: String,
    /// SMTP reply code if the server answered.
    smtp_code: Option<u16>,
    /// Underlying cause.
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MailError {
    /// Creates a new mail error.
    pub fn new(kind: MailErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            smtp_code: None,
            cause: None,
        }
    }

    /// Sets the SMTP reply code.
    pub fn with_smtp_code(mut self, code: u16) -> Self {
        self.smtp_code = Some(code);
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause<E: std::error::Error + Send + Sync + 'static>(mut self, cause: E) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> MailErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the SMTP reply code if available.
    pub fn smtp_code(&self) -> Option<u16> {
        self.smtp_code
    }

    /// Returns true for permanent failures: caller errors and 5xx replies.
    pub fn is_permanent(&self) -> bool {
        if let Some(code) = self.smtp_code {
            return (500..600).contains(&code);
        }
        self.kind.is_caller_error()
    }

    // Convenience constructors

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::Configuration, message)
    }

    /// Creates an address parse error.
    pub fn address_parse(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::AddressParse, message)
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::InvalidFormat, message)
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::Transport, message)
    }

    /// Creates a hostname resolution error.
    pub fn hostname_resolution(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::HostnameResolution, message)
    }
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(code) = self.smtp_code {
            write!(f, " (SMTP {})", code)?;
        }
        Ok(())
    }
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        let message = if err.is_timeout() {
            "SMTP session timed out".to_string()
        } else if err.is_tls() {
            "TLS negotiation with the SMTP server failed".to_string()
        } else if err.is_permanent() {
            "SMTP server rejected the message permanently".to_string()
        } else if err.is_transient() {
            "SMTP server rejected the message temporarily".to_string()
        } else {
            format!("SMTP session failed: {}", err)
        };

        let code = err
            .status()
            .and_then(|code| code.to_string().parse::<u16>().ok());

        let mut error = MailError::transport(message);
        if let Some(code) = code {
            error = error.with_smtp_code(code);
        }
        error.with_cause(err)
    }
}

impl From<lettre::address::AddressError> for MailError {
    fn from(err: lettre::address::AddressError) -> Self {
        MailError::address_parse(err.to_string()).with_cause(err)
    }
}
