//! Mail dispatcher.
//!
//! A [`Dispatcher`] holds the validated configuration and the base session
//! properties computed from it. Each send overlays per-call keys on a copy of
//! that base, formats the message and hands it to a [`MailTransport`], which
//! opens and closes one connection for the call.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use lettre::address::{Address, Envelope};
use lettre::message::header::ContentType;
use lettre::Message;

use crate::auth::Credentials;
use crate::config::{ConnectionConfig, Protocol};
use crate::errors::{MailError, MailResult};
use crate::hostname::{HostnameResolver, FALLBACK_HOSTNAME};
use crate::observability::{DispatchMetrics, Timer};
use crate::properties::{keys, SessionProperties};
use crate::transport::{LettreTransport, MailTransport};
use crate::types::{BatchSendResult, OutgoingMessage};

/// Per-message delivery outcome hooks.
///
/// The dispatcher calls exactly one of them once per attempted delivery.
pub trait DeliveryHooks: Send + Sync {
    /// Called after the server accepted the message.
    fn success(&self, _message_id: &str) {}

    /// Called when the transport failed, before the error is returned.
    fn failure(&self, _error: &MailError) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl DeliveryHooks for NoHooks {}

type SuccessFn = Box<dyn Fn(&str) + Send + Sync>;
type FailureFn = Box<dyn Fn(&MailError) + Send + Sync>;

/// Hooks made of two optional closures.
#[derive(Default)]
pub struct Callbacks {
    on_success: Option<SuccessFn>,
    on_failure: Option<FailureFn>,
}

impl Callbacks {
    /// Creates callbacks with neither closure set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the success closure.
    pub fn on_success(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Sets the failure closure.
    pub fn on_failure(mut self, f: impl Fn(&MailError) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

impl DeliveryHooks for Callbacks {
    fn success(&self, message_id: &str) {
        if let Some(f) = &self.on_success {
            f(message_id);
        }
    }

    fn failure(&self, error: &MailError) {
        if let Some(f) = &self.on_failure {
            f(error);
        }
    }
}

/// Generates a message-id of the form `<uuid.millis@localhost>`.
pub fn generate_message_id() -> String {
    format!(
        "<{}.{}@localhost>",
        uuid::Uuid::new_v4(),
        chrono::Utc::now().timestamp_millis()
    )
}

/// Sends messages with a fixed connection configuration.
#[derive(Debug)]
pub struct Dispatcher {
    config: ConnectionConfig,
    session: SessionProperties,
    protocol: Protocol,
    transport: Arc<dyn MailTransport>,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    /// Creates a dispatcher that submits over SMTP with lettre.
    pub async fn new(config: ConnectionConfig, resolver: &HostnameResolver) -> MailResult<Self> {
        Self::with_transport(config, resolver, Arc::new(LettreTransport)).await
    }

    /// Creates a dispatcher with a custom transport.
    ///
    /// The EHLO name is `config.local_hostname` when set; otherwise it comes
    /// from `resolver`, which never fails.
    pub async fn with_transport(
        config: ConnectionConfig,
        resolver: &HostnameResolver,
        transport: Arc<dyn MailTransport>,
    ) -> MailResult<Self> {
        config.validate()?;

        let metrics = Arc::new(DispatchMetrics::new());
        let local_hostname = match &config.local_hostname {
            Some(name) => name.trim().to_string(),
            None => {
                let name = resolver.resolve().await;
                if name == FALLBACK_HOSTNAME {
                    metrics.record_hostname_fallback();
                }
                name.to_string()
            }
        };

        let protocol = config.protocol();
        let session = config.session_properties(&local_hostname);

        #[cfg(feature = "tracing")]
        tracing::info!(
            server = %config.address(),
            %protocol,
            localhost = %local_hostname,
            "Mail dispatcher ready"
        );

        Ok(Self {
            config,
            session,
            protocol,
            transport,
            metrics,
        })
    }

    /// Sends a message without hooks. Returns its message-id.
    pub async fn send(
        &self,
        credentials: Option<&Credentials>,
        message: &OutgoingMessage,
    ) -> MailResult<String> {
        self.send_with(credentials, message, &NoHooks).await
    }

    /// Sends a message and reports the outcome to `hooks`.
    ///
    /// Transport failures reach `hooks.failure` and are then returned.
    /// Errors while formatting the message are returned without calling
    /// either hook.
    pub async fn send_with(
        &self,
        credentials: Option<&Credentials>,
        message: &OutgoingMessage,
        hooks: &dyn DeliveryHooks,
    ) -> MailResult<String> {
        let timer = Timer::start("send");
        let session = self.call_properties(credentials, message);

        if let Some(_listing) = self.debug_listing(&session) {
            #[cfg(feature = "tracing")]
            tracing::info!(properties = %_listing, "Session properties");
            #[cfg(not(feature = "tracing"))]
            eprint!("{}", _listing);
        }

        let message_id = generate_message_id();
        let envelope = Self::envelope(&session, message)?;
        let formatted = Self::format(message, &message_id)?;

        match self
            .transport
            .submit(&session, credentials, &envelope, &formatted)
            .await
        {
            Ok(()) => {
                self.metrics.record_send_success();

                #[cfg(feature = "tracing")]
                tracing::info!(
                    message_id = %message_id,
                    recipients = message.recipient_count(),
                    duration_ms = timer.elapsed().as_millis() as u64,
                    "Message sent"
                );

                hooks.success(&message_id);
                timer.stop();
                Ok(message_id)
            }
            Err(error) => {
                self.metrics.record_send_failure();

                #[cfg(feature = "tracing")]
                {
                    if error.is_permanent() {
                        tracing::error!(error = %error, server = %self.config.address(), "Message rejected");
                    } else {
                        tracing::warn!(error = %error, server = %self.config.address(), "Message not sent");
                    }
                }

                hooks.failure(&error);
                timer.stop();
                Err(error)
            }
        }
    }

    /// Sends messages one after another without hooks.
    pub async fn send_batch(
        &self,
        credentials: Option<&Credentials>,
        messages: &[OutgoingMessage],
    ) -> BatchSendResult {
        self.send_batch_with(credentials, messages, &NoHooks).await
    }

    /// Sends messages one after another, one connection each.
    ///
    /// A failure does not stop the batch. `hooks` is called once per message.
    pub async fn send_batch_with(
        &self,
        credentials: Option<&Credentials>,
        messages: &[OutgoingMessage],
        hooks: &dyn DeliveryHooks,
    ) -> BatchSendResult {
        let start = Instant::now();
        let total = messages.len();
        let mut results = Vec::with_capacity(total);
        let mut succeeded = 0;
        let mut failed = 0;

        for message in messages {
            match self.send_with(credentials, message, hooks).await {
                Ok(id) => {
                    succeeded += 1;
                    results.push(Ok(id));
                }
                Err(e) => {
                    failed += 1;
                    results.push(Err(e));
                }
            }
        }

        BatchSendResult {
            results,
            total,
            succeeded,
            failed,
            duration: start.elapsed(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns the base session properties.
    pub fn session_properties(&self) -> &SessionProperties {
        &self.session
    }

    /// Returns the protocol in use.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns a reference to the metrics collector.
    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// The per-call property listing emitted when `debug` is set.
    fn debug_listing(&self, session: &SessionProperties) -> Option<String> {
        self.config.debug.then(|| session.to_string())
    }

    fn call_properties(
        &self,
        credentials: Option<&Credentials>,
        message: &OutgoingMessage,
    ) -> SessionProperties {
        let key = |suffix: &str| SessionProperties::key(self.protocol, suffix);
        let mut overlay = vec![(key(keys::FROM), message.from().email.to_string())];
        if credentials.is_some() {
            overlay.push((key(keys::AUTH), "true".to_string()));
        }
        self.session.with_overlay(overlay)
    }

    fn envelope(session: &SessionProperties, message: &OutgoingMessage) -> MailResult<Envelope> {
        let sender = match session.get_for(keys::FROM) {
            Some(from) => from.parse::<Address>()?,
            None => message.from().email.clone(),
        };
        let recipients: Vec<Address> = message.all_recipients().map(|m| m.email.clone()).collect();

        Envelope::new(Some(sender), recipients)
            .map_err(|e| MailError::invalid_format("cannot build envelope").with_cause(e))
    }

    fn format(message: &OutgoingMessage, message_id: &str) -> MailResult<Vec<u8>> {
        let content_type = ContentType::parse(message.content().mime_type()).map_err(|e| {
            MailError::invalid_format(format!(
                "unsupported content type {}",
                message.content().mime_type()
            ))
            .with_cause(e)
        })?;

        let mut builder = Message::builder()
            .message_id(Some(message_id.to_string()))
            .from(message.from().clone())
            .subject(message.subject());
        for mailbox in message.to() {
            builder = builder.to(mailbox.clone());
        }
        for mailbox in message.cc() {
            builder = builder.cc(mailbox.clone());
        }
        for mailbox in message.bcc() {
            builder = builder.bcc(mailbox.clone());
        }

        let email = builder
            .header(content_type)
            .body(message.content().content().to_string())
            .map_err(|e| MailError::invalid_format("cannot build message").with_cause(e))?;

        Ok(email.formatted())
    }
}

impl PartialEq for Dispatcher {
    fn eq(&self, other: &Self) -> bool {
        self.session == other.session
    }
}

impl Eq for Dispatcher {}

impl Hash for Dispatcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session.hash(state);
    }
}
