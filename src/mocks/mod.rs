//! Mock implementations for testing.
//!
//! Transport, lookup sources and hooks that record what they were asked to
//! do, so dispatcher and resolver behavior can be checked without a network.

use async_trait::async_trait;
use lettre::address::Envelope;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::auth::Credentials;
use crate::client::DeliveryHooks;
use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::hostname::{ExternalIpSource, PlatformReverseLookup, PtrLookup};
use crate::properties::SessionProperties;
use crate::transport::MailTransport;

/// One recorded call to [`MockTransport::submit`].
#[derive(Debug, Clone)]
pub struct Submission {
    /// Session properties the call was made with.
    pub session: SessionProperties,
    /// Username of the supplied credentials.
    pub username: Option<String>,
    /// Envelope sender.
    pub envelope_from: Option<String>,
    /// Envelope recipients.
    pub envelope_to: Vec<String>,
    /// Formatted message.
    pub message: Vec<u8>,
}

impl Submission {
    /// Returns the formatted message as text.
    pub fn message_text(&self) -> String {
        String::from_utf8_lossy(&self.message).into_owned()
    }
}

/// Mock mail transport.
#[derive(Debug, Default)]
pub struct MockTransport {
    submissions: Arc<Mutex<Vec<Submission>>>,
    failures: Arc<Mutex<VecDeque<MailError>>>,
}

impl MockTransport {
    /// Creates a transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next submission fail with `error`. Calls queue up.
    pub fn fail_next_with(&self, error: MailError) -> &Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    /// Makes the next submission fail as if the server answered `code`.
    pub fn reject_next(&self, code: u16, message: &str) -> &Self {
        self.fail_next_with(MailError::transport(message.to_string()).with_smtp_code(code))
    }

    /// Returns recorded submissions, including failed ones.
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    /// Number of submissions (connections) made.
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    /// Clears recorded data and queued failures.
    pub fn clear(&self) {
        self.submissions.lock().unwrap().clear();
        self.failures.lock().unwrap().clear();
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn submit(
        &self,
        session: &SessionProperties,
        credentials: Option<&Credentials>,
        envelope: &Envelope,
        message: &[u8],
    ) -> MailResult<()> {
        self.submissions.lock().unwrap().push(Submission {
            session: session.clone(),
            username: credentials.map(|c| c.username().to_string()),
            envelope_from: envelope.from().map(|a| a.to_string()),
            envelope_to: envelope.to().iter().map(|a| a.to_string()).collect(),
            message: message.to_vec(),
        });

        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// External IP source with a fixed answer.
#[derive(Debug)]
pub struct StaticExternalIp {
    answer: Option<String>,
    calls: AtomicUsize,
}

impl StaticExternalIp {
    /// Answers `ip` (unparsed).
    pub fn ok(ip: &str) -> Self {
        Self {
            answer: Some(ip.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails like an unreachable endpoint.
    pub fn failing() -> Self {
        Self {
            answer: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of lookups made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalIpSource for StaticExternalIp {
    async fn external_ip(&self) -> MailResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .clone()
            .ok_or_else(|| MailError::hostname_resolution("connection refused"))
    }
}

#[derive(Debug, Clone)]
enum PtrAnswer {
    Found(String),
    Empty,
    Failing,
}

/// PTR lookup with a fixed answer.
#[derive(Debug)]
pub struct StaticPtrLookup {
    answer: PtrAnswer,
    queried: Mutex<Vec<Ipv4Addr>>,
}

impl StaticPtrLookup {
    fn with(answer: PtrAnswer) -> Self {
        Self {
            answer,
            queried: Mutex::new(Vec::new()),
        }
    }

    /// Answers `name`.
    pub fn found(name: &str) -> Self {
        Self::with(PtrAnswer::Found(name.to_string()))
    }

    /// No PTR record.
    pub fn empty() -> Self {
        Self::with(PtrAnswer::Empty)
    }

    /// Fails like an unreachable DNS server.
    pub fn failing() -> Self {
        Self::with(PtrAnswer::Failing)
    }

    /// Addresses looked up so far.
    pub fn queried(&self) -> Vec<Ipv4Addr> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl PtrLookup for StaticPtrLookup {
    async fn lookup_ptr(&self, ip: Ipv4Addr) -> MailResult<Option<String>> {
        self.queried.lock().unwrap().push(ip);
        match &self.answer {
            PtrAnswer::Found(name) => Ok(Some(name.clone())),
            PtrAnswer::Empty => Ok(None),
            PtrAnswer::Failing => Err(MailError::hostname_resolution("SERVFAIL")),
        }
    }
}

/// Platform reverse lookup with a fixed answer.
#[derive(Debug)]
pub struct StaticReverseLookup {
    answer: Option<String>,
    calls: AtomicUsize,
}

impl StaticReverseLookup {
    /// Answers `name`.
    pub fn ok(name: &str) -> Self {
        Self {
            answer: Some(name.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails for every address.
    pub fn failing() -> Self {
        Self {
            answer: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of lookups made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformReverseLookup for StaticReverseLookup {
    async fn lookup(&self, ip: Ipv4Addr) -> MailResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .clone()
            .ok_or_else(|| MailError::hostname_resolution(format!("no name for {}", ip)))
    }
}

/// A hook invocation seen by [`RecordingHooks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    /// `success` with the message-id.
    Success(String),
    /// `failure` with the error's kind, SMTP code and message.
    Failure {
        /// Error kind.
        kind: MailErrorKind,
        /// SMTP reply code, if any.
        smtp_code: Option<u16>,
        /// Error message.
        message: String,
    },
}

/// Delivery hooks that record every invocation.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<HookEvent>>,
}

impl RecordingHooks {
    /// Creates empty hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// All invocations in order.
    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Message-ids passed to `success`.
    pub fn successes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::Success(id) => Some(id),
                HookEvent::Failure { .. } => None,
            })
            .collect()
    }

    /// Number of `failure` invocations.
    pub fn failure_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, HookEvent::Failure { .. }))
            .count()
    }
}

impl DeliveryHooks for RecordingHooks {
    fn success(&self, message_id: &str) {
        self.events
            .lock()
            .unwrap()
            .push(HookEvent::Success(message_id.to_string()));
    }

    fn failure(&self, error: &MailError) {
        self.events.lock().unwrap().push(HookEvent::Failure {
            kind: error.kind(),
            smtp_code: error.smtp_code(),
            message: error.message().to_string(),
        });
    }
}
