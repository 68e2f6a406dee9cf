//! Flattened session property map.
//!
//! A [`ConnectionConfig`](crate::config::ConnectionConfig) is translated into
//! `mail.<protocol>.<suffix>` keys. The transport reads the same keys back,
//! so caller-supplied overrides take effect without any special casing.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};

use crate::config::Protocol;

/// Well-known property keys and per-protocol key suffixes.
pub mod keys {
    /// Selected transport protocol (`smtp` or `smtps`).
    pub const TRANSPORT_PROTOCOL: &str = "mail.transport.protocol";
    /// Global debug switch.
    pub const DEBUG: &str = "mail.debug";

    /// Server host.
    pub const HOST: &str = "host";
    /// Server port.
    pub const PORT: &str = "port";
    /// Name announced in EHLO/HELO.
    pub const LOCALHOST: &str = "localhost";
    /// Implicit TLS on connect.
    pub const SSL_ENABLE: &str = "ssl.enable";
    /// Space separated list of accepted TLS protocol versions.
    pub const SSL_PROTOCOLS: &str = "ssl.protocols";
    /// Hosts whose certificates are trusted without verification (`*` = all).
    pub const SSL_TRUST: &str = "ssl.trust";
    /// Use STARTTLS when offered.
    pub const STARTTLS_ENABLE: &str = "starttls.enable";
    /// Fail unless STARTTLS succeeds.
    pub const STARTTLS_REQUIRED: &str = "starttls.required";
    /// Socket connect timeout in milliseconds.
    pub const CONNECTION_TIMEOUT: &str = "connectiontimeout";
    /// Socket read timeout in milliseconds.
    pub const READ_TIMEOUT: &str = "timeout";
    /// Socket write timeout in milliseconds.
    pub const WRITE_TIMEOUT: &str = "writetimeout";
    /// Per-protocol debug switch.
    pub const PROTOCOL_DEBUG: &str = "debug";
    /// Authenticate before submitting.
    pub const AUTH: &str = "auth";
    /// Envelope sender.
    pub const FROM: &str = "from";
}

/// Ordered string-to-string property map consumed by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionProperties(BTreeMap<String, String>);

impl SessionProperties {
    /// Creates an empty property map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the per-protocol key `mail.<protocol>.<suffix>`.
    pub fn key(protocol: Protocol, suffix: &str) -> String {
        format!("mail.{}.{}", protocol.as_str(), suffix)
    }

    /// Returns the raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the value for the per-protocol `suffix` of the selected protocol.
    pub fn get_for(&self, suffix: &str) -> Option<&str> {
        self.get(&Self::key(self.protocol(), suffix))
    }

    /// Returns true when `key` is set to `true` (case-insensitive).
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Parses `key` as an unsigned integer. `None` when absent.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, std::num::ParseIntError> {
        self.get(key).map(|v| v.trim().parse::<u64>()).transpose()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no property is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The protocol named by `mail.transport.protocol` (defaults to smtp).
    pub fn protocol(&self) -> Protocol {
        match self.get(keys::TRANSPORT_PROTOCOL) {
            Some(p) if p.eq_ignore_ascii_case("smtps") => Protocol::Smtps,
            _ => Protocol::Smtp,
        }
    }

    /// Returns a copy with `pairs` layered on top; `self` is left untouched.
    pub fn with_overlay<I, K, V>(&self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut copy = self.clone();
        copy.extend(pairs);
        copy
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for SessionProperties {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SessionProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Self::new();
        props.extend(iter);
        props
    }
}

impl fmt::Display for SessionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.0 {
            writeln!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}
