//! Transport layer for SMTP submission.
//!
//! [`MailTransport`] is the seam between the dispatcher and the wire. The
//! production implementation, [`LettreTransport`], reads the flattened
//! session properties back into [`SessionSettings`] and opens one lettre
//! SMTP connection per submission.
//!
//! Submission uses lettre's blocking client on tokio's blocking pool: it
//! applies the socket timeout to the connect and to every read and write,
//! so a server that accepts and then stalls cannot hang a send.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use lettre::address::Envelope;
use lettre::transport::smtp::client::{Tls, TlsParameters, TlsVersion};
use lettre::transport::smtp::extension::ClientId;
use lettre::{SmtpTransport, Transport};

use crate::auth::Credentials;
use crate::config::{validate_port, Protocol};
use crate::errors::{MailError, MailResult};
use crate::hostname::FALLBACK_HOSTNAME;
use crate::properties::{keys, SessionProperties};

/// Trait for mail transport abstraction.
#[async_trait]
pub trait MailTransport: Send + Sync + fmt::Debug {
    /// Connects, authenticates when asked to, submits `message` for
    /// `envelope` and closes the connection, on every exit path.
    async fn submit(
        &self,
        session: &SessionProperties,
        credentials: Option<&Credentials>,
        envelope: &Envelope,
        message: &[u8],
    ) -> MailResult<()>;
}

/// Connection security derived from the session properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// No TLS.
    None,
    /// STARTTLS when the server offers it.
    Opportunistic,
    /// STARTTLS or fail.
    Required,
    /// TLS from the first byte.
    Implicit,
}

/// Lowest TLS version the client will negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinTlsVersion {
    /// TLS 1.2.
    Tls12,
    /// TLS 1.3.
    Tls13,
}

/// Typed view of the session properties used to open a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Protocol in use.
    pub protocol: Protocol,
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// EHLO name.
    pub hello_name: String,
    /// Connection security.
    pub security: Security,
    /// Skip certificate verification for this host.
    pub accept_invalid_certs: bool,
    /// Minimum TLS version.
    pub min_tls_version: MinTlsVersion,
    /// Socket timeout for connect, reads and writes; the smallest
    /// non-zero value of connect/read/write. `0` means no timeout.
    pub timeout: Option<Duration>,
    /// Authenticate before submitting.
    pub auth: bool,
}

impl SessionSettings {
    /// Reads settings back from session properties.
    pub fn from_properties(props: &SessionProperties) -> MailResult<Self> {
        let protocol = props.protocol();
        let key = |suffix: &str| SessionProperties::key(protocol, suffix);

        let host = props
            .get(&key(keys::HOST))
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| MailError::configuration(format!("{} is not set", key(keys::HOST))))?
            .to_string();

        let port = match Self::number(props, &key(keys::PORT))? {
            Some(port) => validate_port(i64::try_from(port).unwrap_or(i64::MAX))?,
            None => protocol.default_port(),
        };

        let hello_name = props
            .get(&key(keys::LOCALHOST))
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(FALLBACK_HOSTNAME)
            .to_string();

        let security = if props.get_bool(&key(keys::SSL_ENABLE)) {
            Security::Implicit
        } else if props.get_bool(&key(keys::STARTTLS_REQUIRED)) {
            Security::Required
        } else if props.get_bool(&key(keys::STARTTLS_ENABLE)) {
            Security::Opportunistic
        } else {
            Security::None
        };

        let accept_invalid_certs = props
            .get(&key(keys::SSL_TRUST))
            .map(|trust| trust.split_whitespace().any(|h| h == "*" || h.eq_ignore_ascii_case(&host)))
            .unwrap_or(false);

        let min_tls_version = match props.get(&key(keys::SSL_PROTOCOLS)) {
            Some(list) if list.split_whitespace().next().is_some()
                && list.split_whitespace().all(|v| v == "TLSv1.3") => MinTlsVersion::Tls13,
            _ => MinTlsVersion::Tls12,
        };

        let mut timeout: Option<Duration> = None;
        for suffix in [keys::CONNECTION_TIMEOUT, keys::READ_TIMEOUT, keys::WRITE_TIMEOUT] {
            if let Some(ms) = Self::number(props, &key(suffix))?.filter(|ms| *ms > 0) {
                let candidate = Duration::from_millis(ms);
                timeout = Some(timeout.map_or(candidate, |t| t.min(candidate)));
            }
        }

        Ok(Self {
            protocol,
            host,
            port,
            hello_name,
            security,
            accept_invalid_certs,
            min_tls_version,
            timeout,
            auth: props.get_bool(&key(keys::AUTH)),
        })
    }

    fn number(props: &SessionProperties, key: &str) -> MailResult<Option<u64>> {
        props.get_u64(key).map_err(|e| {
            MailError::configuration(format!("{} is not a number", key)).with_cause(e)
        })
    }

    fn tls_parameters(&self) -> MailResult<TlsParameters> {
        let version = match self.min_tls_version {
            MinTlsVersion::Tls12 => TlsVersion::Tlsv12,
            MinTlsVersion::Tls13 => TlsVersion::Tlsv13,
        };

        TlsParameters::builder(self.host.clone())
            .dangerous_accept_invalid_certs(self.accept_invalid_certs)
            .set_min_tls_version(version)
            .build()
            .map_err(|e| MailError::configuration("invalid TLS parameters").with_cause(e))
    }

    /// Builds a lettre transport for one submission.
    pub fn build_transport(&self, credentials: Option<&Credentials>) -> MailResult<SmtpTransport> {
        let tls = match self.security {
            Security::None => Tls::None,
            Security::Opportunistic => Tls::Opportunistic(self.tls_parameters()?),
            Security::Required => Tls::Required(self.tls_parameters()?),
            Security::Implicit => Tls::Wrapper(self.tls_parameters()?),
        };

        let mut builder = SmtpTransport::builder_dangerous(self.host.as_str())
            .port(self.port)
            .hello_name(ClientId::Domain(self.hello_name.clone()))
            .timeout(self.timeout)
            .tls(tls);

        if self.auth {
            if let Some(credentials) = credentials {
                builder = builder.credentials(credentials.into());
            }
        }

        Ok(builder.build())
    }
}

/// SMTP transport backed by lettre, one connection per submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct LettreTransport;

#[async_trait]
impl MailTransport for LettreTransport {
    async fn submit(
        &self,
        session: &SessionProperties,
        credentials: Option<&Credentials>,
        envelope: &Envelope,
        message: &[u8],
    ) -> MailResult<()> {
        let settings = SessionSettings::from_properties(session)?;
        let transport = settings.build_transport(credentials)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            host = %settings.host,
            port = settings.port,
            protocol = %settings.protocol,
            security = ?settings.security,
            "Opening SMTP connection"
        );

        let envelope = envelope.clone();
        let message = message.to_vec();

        // Dropping `transport` closes the connection.
        tokio::task::spawn_blocking(move || transport.send_raw(&envelope, &message))
            .await
            .map_err(|e| MailError::transport("SMTP submission task failed").with_cause(e))??;
        Ok(())
    }
}
