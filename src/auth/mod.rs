//! Per-call SMTP credentials.
//!
//! Credentials are handed to each send call and never retained by the
//! dispatcher. The password stays wrapped in a [`SecretString`] until the
//! transport needs it.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Username and password for SMTP AUTH.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    /// Returns the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password in clear text.
    pub fn expose_password(&self) -> &str {
        self.password.expose_secret()
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

impl From<&Credentials> for lettre::transport::smtp::authentication::Credentials {
    fn from(credentials: &Credentials) -> Self {
        Self::new(
            credentials.username.clone(),
            credentials.expose_password().to_string(),
        )
    }
}
