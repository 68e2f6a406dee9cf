//! Core types for mail dispatch.
//!
//! This module provides:
//! - [`MimeContent`], a body paired with its MIME type
//! - [`OutgoingMessage`], validated when constructed so malformed messages
//!   never reach the network
//! - [`BatchSendResult`] for sequential batch sends

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use lettre::message::Mailbox;

use crate::errors::{MailError, MailResult};

/// Message body with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MimeContent {
    content: String,
    mime_type: String,
}

impl MimeContent {
    /// Creates content of the given MIME type, e.g. `text/html; charset=utf-8`.
    pub fn new(content: impl Into<String>, mime_type: impl Into<String>) -> MailResult<Self> {
        let content = content.into();
        let mime_type = mime_type.into();

        if content.is_empty() {
            return Err(MailError::configuration("content is empty"));
        }

        mime_type.parse::<mime::Mime>().map_err(|e| {
            MailError::configuration(format!("invalid MIME type {:?}", mime_type)).with_cause(e)
        })?;

        Ok(Self { content, mime_type })
    }

    /// Creates `text/plain; charset=utf-8` content.
    pub fn text(content: impl Into<String>) -> MailResult<Self> {
        Self::new(content, "text/plain; charset=utf-8")
    }

    /// Creates `text/html; charset=utf-8` content.
    pub fn html(content: impl Into<String>) -> MailResult<Self> {
        Self::new(content, "text/html; charset=utf-8")
    }

    /// Returns the body.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the MIME type.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// Parses a list of address strings, accepting `Name <user@host>`.
fn parse_mailboxes(addresses: &[&str]) -> MailResult<Vec<Mailbox>> {
    addresses
        .iter()
        .map(|a| a.trim().parse::<Mailbox>().map_err(MailError::from))
        .collect()
}

/// A message ready to be dispatched.
///
/// Always has one sender and at least one recipient across `to`, `cc` and
/// `bcc`. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    subject: String,
    content: MimeContent,
    from: Mailbox,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
}

impl OutgoingMessage {
    /// Creates a message from already parsed mailboxes.
    pub fn new(
        subject: impl Into<String>,
        content: MimeContent,
        from: Mailbox,
        to: Vec<Mailbox>,
        cc: Vec<Mailbox>,
        bcc: Vec<Mailbox>,
    ) -> MailResult<Self> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(MailError::configuration("subject is empty"));
        }

        if to.is_empty() && cc.is_empty() && bcc.is_empty() {
            return Err(MailError::configuration(
                "Either \"to\", \"cc\", or \"bcc\" must not be empty",
            ));
        }

        Ok(Self { subject, content, from, to, cc, bcc })
    }

    /// Creates a message, parsing every address string.
    pub fn parse(
        subject: impl Into<String>,
        content: MimeContent,
        from: &str,
        to: &[&str],
        cc: &[&str],
        bcc: &[&str],
    ) -> MailResult<Self> {
        let from = from.trim().parse::<Mailbox>()?;
        Self::new(
            subject,
            content,
            from,
            parse_mailboxes(to)?,
            parse_mailboxes(cc)?,
            parse_mailboxes(bcc)?,
        )
    }

    /// Creates a message builder.
    pub fn builder() -> OutgoingMessageBuilder {
        OutgoingMessageBuilder::default()
    }

    /// Returns the subject.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the content.
    pub fn content(&self) -> &MimeContent {
        &self.content
    }

    /// Returns the sender.
    pub fn from(&self) -> &Mailbox {
        &self.from
    }

    /// Returns the `To` recipients.
    pub fn to(&self) -> &[Mailbox] {
        &self.to
    }

    /// Returns the `Cc` recipients.
    pub fn cc(&self) -> &[Mailbox] {
        &self.cc
    }

    /// Returns the `Bcc` recipients.
    pub fn bcc(&self) -> &[Mailbox] {
        &self.bcc
    }

    /// Returns all recipients, `to` then `cc` then `bcc`.
    pub fn all_recipients(&self) -> impl Iterator<Item = &Mailbox> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }

    /// Returns the total number of recipients.
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }
}

impl Hash for OutgoingMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        fn hash_mailbox<H: Hasher>(mailbox: &Mailbox, state: &mut H) {
            mailbox.name.hash(state);
            let email: &str = mailbox.email.as_ref();
            email.hash(state);
        }

        self.subject.hash(state);
        self.content.hash(state);
        hash_mailbox(&self.from, state);
        for list in [&self.to, &self.cc, &self.bcc] {
            list.len().hash(state);
            for mailbox in list {
                hash_mailbox(mailbox, state);
            }
        }
    }
}

impl fmt::Display for OutgoingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |list: &[Mailbox]| {
            list.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        };
        write!(f, "subject: {}, to: [{}]", self.subject, join(&self.to))?;
        if !self.cc.is_empty() {
            write!(f, ", cc: [{}]", join(&self.cc))?;
        }
        if !self.bcc.is_empty() {
            write!(f, ", bcc: [{}]", join(&self.bcc))?;
        }
        Ok(())
    }
}

/// Builder for [`OutgoingMessage`]. Address parsing errors surface from `build`.
#[derive(Debug, Default)]
pub struct OutgoingMessageBuilder {
    subject: Option<String>,
    content: Option<MimeContent>,
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
}

impl OutgoingMessageBuilder {
    /// Sets the subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the content.
    pub fn content(mut self, content: MimeContent) -> Self {
        self.content = Some(content);
        self
    }

    /// Sets the sender.
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Adds a `To` recipient.
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Adds a `Cc` recipient.
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Adds a `Bcc` recipient.
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    /// Builds the message.
    pub fn build(self) -> MailResult<OutgoingMessage> {
        let subject = self.subject.ok_or_else(|| MailError::configuration("subject is required"))?;
        let content = self.content.ok_or_else(|| MailError::configuration("content is required"))?;
        let from = self.from.ok_or_else(|| MailError::configuration("from is required"))?;

        fn as_refs(list: &[String]) -> Vec<&str> {
            list.iter().map(String::as_str).collect()
        }

        OutgoingMessage::parse(
            subject,
            content,
            &from,
            &as_refs(&self.to),
            &as_refs(&self.cc),
            &as_refs(&self.bcc),
        )
    }
}

/// Result of a sequential batch send.
#[derive(Debug)]
pub struct BatchSendResult {
    /// Per-message outcome in submission order: message-id or error.
    pub results: Vec<MailResult<String>>,
    /// Number of messages attempted.
    pub total: usize,
    /// Number delivered.
    pub succeeded: usize,
    /// Number failed.
    pub failed: usize,
    /// Wall time for the whole batch.
    pub duration: Duration,
}

impl BatchSendResult {
    /// Returns true if every message was delivered.
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    /// Returns the message-ids of delivered messages.
    pub fn message_ids(&self) -> impl Iterator<Item = &str> {
        self.results.iter().filter_map(|r| r.as_ref().ok().map(String::as_str))
    }

    /// Returns the errors of failed messages.
    pub fn failures(&self) -> impl Iterator<Item = &MailError> {
        self.results.iter().filter_map(|r| r.as_ref().err())
    }
}
