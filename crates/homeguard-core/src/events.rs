//! Restore protocol events for external auditing.
//!
//! Every email dispatch attempt, applied restore, and rejected key produces
//! an [`EventEntry`]. The [`EventLog`] fans entries out to all registered
//! sinks on a best-effort basis: a failing sink is logged and skipped, and
//! never fails the protocol step that produced the event.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::error::EventError;
use crate::jsonl::JsonLinesFile;
use crate::watched::WatchedName;

/// Something observable the restore protocol did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RestoreEvent {
    /// A restore-link email was handed to the notifier.
    EmailAttempted { success: bool },
    /// A valid key was presented and at least one value was restored.
    RestoreApplied { restored: Vec<WatchedName> },
    /// A presented key did not match the stored key.
    RestoreRejected,
}

/// An event with its identity and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEntry {
    /// Unique entry ID.
    pub id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    #[serde(flatten)]
    pub event: RestoreEvent,
}

impl EventEntry {
    /// Stamp an event with a fresh ID and the current time.
    #[must_use]
    pub fn new(event: RestoreEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Destination for restore events.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    /// The sink's name (for error reporting).
    fn name(&self) -> &str;

    /// Persist one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be recorded.
    async fn record(&self, entry: &EventEntry) -> Result<(), EventError>;
}

/// Fans events out to every registered sink.
#[derive(Default)]
pub struct EventLog {
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl EventLog {
    /// Create an event log with no sinks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink.
    pub async fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().await.push(sink);
    }

    /// Record an event in every sink. Returns how many sinks accepted it.
    pub async fn emit(&self, event: RestoreEvent) -> usize {
        let entry = EventEntry::new(event);
        let sinks = self.sinks.read().await;

        let mut delivered = 0;
        for sink in sinks.iter() {
            match sink.record(&entry).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(sink = sink.name(), error = %e, "event sink failed"),
            }
        }
        delivered
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").finish_non_exhaustive()
    }
}

/// Sink that appends JSON lines to a file.
#[derive(Debug)]
pub struct FileEventSink {
    file: JsonLinesFile,
}

impl FileEventSink {
    /// Create a sink writing to `path`. The file is opened on first event.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            file: JsonLinesFile::new(path),
        }
    }
}

#[async_trait::async_trait]
impl EventSink for FileEventSink {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "file"
    }

    async fn record(&self, entry: &EventEntry) -> Result<(), EventError> {
        self.file
            .append(entry)
            .await
            .map_err(|e| EventError::SinkFailure {
                name: self.name().to_owned(),
                reason: e.to_string(),
            })
    }
}

/// Sink that keeps events in memory, for tests and in-process inspection.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    entries: Mutex<Vec<EventEntry>>,
}

impl MemoryEventSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The events recorded so far, oldest first.
    pub async fn events(&self) -> Vec<RestoreEvent> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| e.event.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl EventSink for MemoryEventSink {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "memory"
    }

    async fn record(&self, entry: &EventEntry) -> Result<(), EventError> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }
}
