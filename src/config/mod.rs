//! Connection configuration for the mail dispatcher.
//!
//! A [`ConnectionConfig`] can be written as a struct literal with
//! `..Default::default()`, deserialized from JSON/TOML, or assembled with
//! [`ConnectionConfigBuilder`]. In every case [`ConnectionConfig::validate`]
//! is the one check that decides whether it is usable, and
//! [`ConnectionConfig::session_properties`] flattens it into the keys the
//! transport consumes.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{MailError, MailResult};
use crate::properties::{keys, SessionProperties};

/// Default SMTP port (plain relay).
pub const DEFAULT_PORT: u16 = 25;

/// Default SMTPS port (implicit TLS).
pub const DEFAULT_SSL_PORT: u16 = 465;

/// Protocol versions accepted when implicit TLS is enabled.
pub const SSL_PROTOCOLS: &[&str] = &["TLSv1.2", "TLSv1.3"];

/// Protocol versions accepted when STARTTLS is enabled.
pub const TLS_PROTOCOLS: &[&str] = &["TLSv1.2"];

/// Hosts trusted without certificate verification unless overridden.
pub const DEFAULT_SSL_TRUST: &str = "*";

/// Transport protocol selected by the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain SMTP, optionally upgraded with STARTTLS.
    #[default]
    Smtp,
    /// SMTP over implicit TLS.
    Smtps,
}

impl Protocol {
    /// Returns the protocol identifier used in property keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Smtp => "smtp",
            Protocol::Smtps => "smtps",
        }
    }

    /// Returns the well-known port for this protocol.
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Smtp => DEFAULT_PORT,
            Protocol::Smtps => DEFAULT_SSL_PORT,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// SMTP server hostname.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Connect with implicit TLS (`smtps`).
    pub use_ssl: bool,
    /// Require STARTTLS.
    pub use_tls: bool,
    /// Socket connect timeout. `None` leaves the transport default.
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Option<Duration>,
    /// Socket read timeout. `None` leaves the transport default.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Option<Duration>,
    /// Socket write timeout. `None` leaves the transport default.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Option<Duration>,
    /// Raw session properties; these win over computed keys.
    pub extra_properties: BTreeMap<String, String>,
    /// Log the session properties on every send.
    pub debug: bool,
    /// Name announced in EHLO. When unset it is discovered at startup.
    pub local_hostname: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            use_ssl: false,
            use_tls: false,
            connection_timeout: None,
            read_timeout: None,
            write_timeout: None,
            extra_properties: BTreeMap::new(),
            debug: false,
            local_hostname: None,
        }
    }
}

/// Checks that an untyped port value is within `[1, 65535]`.
pub fn validate_port(port: i64) -> MailResult<u16> {
    if !(1..=i64::from(u16::MAX)).contains(&port) {
        return Err(MailError::configuration(format!(
            "port [{}] <> (1, 65535)",
            port
        )));
    }
    // Range checked above.
    Ok(port as u16)
}

/// Whole milliseconds for a timeout property, rounding up so a non-zero
/// duration never becomes `0` (which the transport reads as "no timeout").
fn timeout_millis(timeout: Duration) -> u128 {
    (timeout.as_nanos() + 999_999) / 1_000_000
}

impl ConnectionConfig {
    /// Creates a new configuration builder.
    pub fn builder(host: impl Into<String>, port: u16) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(host, port)
    }

    /// Creates a builder from an untyped port, rejecting values outside `[1, 65535]`.
    pub fn builder_checked(host: impl Into<String>, port: i64) -> MailResult<ConnectionConfigBuilder> {
        Ok(ConnectionConfigBuilder::new(host, validate_port(port)?))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> MailResult<()> {
        if self.host.trim().is_empty() {
            return Err(MailError::configuration("Host is required"));
        }

        validate_port(i64::from(self.port))?;

        if let Some(name) = &self.local_hostname {
            if name.trim().is_empty() {
                return Err(MailError::configuration("local_hostname must not be blank"));
            }
        }

        Ok(())
    }

    /// Returns the protocol implied by `use_ssl`.
    pub fn protocol(&self) -> Protocol {
        if self.use_ssl {
            Protocol::Smtps
        } else {
            Protocol::Smtp
        }
    }

    /// Returns the full server address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the accepted TLS protocol versions, SSL list first, without duplicates.
    pub fn ssl_protocols(&self) -> Vec<&'static str> {
        let mut protocols: Vec<&'static str> = Vec::new();
        if self.use_ssl {
            protocols.extend_from_slice(SSL_PROTOCOLS);
        }
        if self.use_tls {
            for version in TLS_PROTOCOLS {
                if !protocols.contains(version) {
                    protocols.push(version);
                }
            }
        }
        protocols
    }

    /// Flattens the configuration into session properties.
    ///
    /// Keys are layered base, SSL, TLS, timeouts, debug and finally
    /// `extra_properties`, so caller overrides win on overlap.
    pub fn session_properties(&self, local_hostname: &str) -> SessionProperties {
        let protocol = self.protocol();
        let key = |suffix: &str| SessionProperties::key(protocol, suffix);
        let mut props = SessionProperties::new();

        props.insert(keys::TRANSPORT_PROTOCOL, protocol.as_str());
        props.insert(key(keys::HOST), self.host.as_str());
        props.insert(key(keys::PORT), self.port.to_string());
        props.insert(key(keys::LOCALHOST), local_hostname);
        props.insert(key(keys::SSL_TRUST), DEFAULT_SSL_TRUST);

        if self.use_ssl {
            props.insert(key(keys::SSL_ENABLE), "true");
        }

        if self.use_tls {
            props.insert(key(keys::STARTTLS_ENABLE), "true");
            props.insert(key(keys::STARTTLS_REQUIRED), "true");
        }

        let protocols = self.ssl_protocols();
        if !protocols.is_empty() {
            props.insert(key(keys::SSL_PROTOCOLS), protocols.join(" "));
        }

        let timeouts = [
            (keys::CONNECTION_TIMEOUT, self.connection_timeout),
            (keys::READ_TIMEOUT, self.read_timeout),
            (keys::WRITE_TIMEOUT, self.write_timeout),
        ];
        for (suffix, timeout) in timeouts {
            if let Some(timeout) = timeout {
                props.insert(key(suffix), timeout_millis(timeout).to_string());
            }
        }

        if self.debug {
            props.insert(keys::DEBUG, "true");
            props.insert(key(keys::PROTOCOL_DEBUG), "true");
        }

        props.extend(self.extra_properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        props
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Starts a builder for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            config: ConnectionConfig {
                host: host.into(),
                port,
                ..Default::default()
            },
        }
    }

    /// Connect with implicit TLS.
    pub fn ssl(mut self, enabled: bool) -> Self {
        self.config.use_ssl = enabled;
        self
    }

    /// Require STARTTLS.
    pub fn tls(mut self, enabled: bool) -> Self {
        self.config.use_tls = enabled;
        self
    }

    /// Sets the socket connect timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = Some(timeout);
        self
    }

    /// Sets the socket read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// Sets the socket write timeout.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = Some(timeout);
        self
    }

    /// Adds one raw session property.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.extra_properties.insert(key.into(), value.into());
        self
    }

    /// Adds raw session properties.
    pub fn properties<I, K, V>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.config
            .extra_properties
            .extend(properties.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Log session properties on every send.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Sets the name announced in EHLO, skipping discovery.
    pub fn local_hostname(mut self, name: impl Into<String>) -> Self {
        self.config.local_hostname = Some(name.into());
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> MailResult<ConnectionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// Humantime serde support
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
