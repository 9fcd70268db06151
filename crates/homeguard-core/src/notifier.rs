//! Outbound message delivery.
//!
//! The protocol only needs a yes/no answer from delivery: a failed send
//! leaves the instance free to try again on the next change in the burst.
//! Transports log their own failures.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::jsonl::JsonLinesFile;

/// Sends a message to a recipient.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message. Returns `true` if the transport accepted it.
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> bool;
}

/// A message as handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub queued_at: DateTime<Utc>,
}

impl OutboundMessage {
    fn new(recipient: &str, subject: &str, body: &str) -> Self {
        Self {
            recipient: recipient.to_owned(),
            subject: subject.to_owned(),
            body: body.to_owned(),
            queued_at: Utc::now(),
        }
    }
}

/// Notifier that appends each message as a JSON line to a spool file, for
/// pickup by an external mail relay.
#[derive(Debug)]
pub struct SpoolNotifier {
    file: JsonLinesFile,
}

impl SpoolNotifier {
    /// Create a notifier spooling to `path`. The file is opened on first send.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            file: JsonLinesFile::new(path),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for SpoolNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> bool {
        let message = OutboundMessage::new(recipient, subject, body);
        match self.file.append(&message).await {
            Ok(()) => {
                info!(path = %self.file.path().display(), "message spooled");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to spool message");
                false
            }
        }
    }
}

/// Notifier that keeps messages in memory. It can be told to refuse
/// delivery, which makes it useful for exercising failure paths.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
    attempts: Mutex<usize>,
    refuse: AtomicBool,
}

impl MemoryNotifier {
    /// Create a notifier that accepts every message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a notifier that refuses every message.
    #[must_use]
    pub fn refusing() -> Self {
        let notifier = Self::default();
        notifier.set_refusing(true);
        notifier
    }

    /// Toggle whether sends are refused.
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Messages accepted so far.
    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    /// Number of send calls, accepted or not.
    pub async fn attempts(&self) -> usize {
        *self.attempts.lock().await
    }
}

#[async_trait::async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> bool {
        *self.attempts.lock().await += 1;
        if self.refuse.load(Ordering::SeqCst) {
            return false;
        }
        self.sent
            .lock()
            .await
            .push(OutboundMessage::new(recipient, subject, body));
        true
    }
}
