//! Request-scoped diagnostic log stored as a capped JSON array.
//!
//! Entries are keyed by a per-request correlation id so an operator can
//! follow one generation through prompt synthesis and image synthesis.
//! Writing must never break a request: every I/O failure is swallowed.

use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Maximum number of entries kept on disk.
pub const MAX_ENTRIES: usize = 100;

/// Kind of event being logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    /// Progress note.
    Info,
    /// Completed operation.
    Success,
    /// Failure, with the user-facing message.
    Error,
    /// Synthesized prompt text.
    Prompt,
    /// Generated image URLs.
    Image,
}

/// Subsystem that produced the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    /// Prompt synthesis.
    Baddie,
    /// Image synthesis.
    Replicate,
    /// Anything outside the two generation stages.
    System,
}

/// A stored log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique entry id assigned on write.
    pub id: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Correlation id shared by every entry of one generation.
    #[serde(rename = "requestId")]
    pub request_id: String,
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: LogType,
    /// Producing subsystem.
    pub source: LogSource,
    /// Human-readable summary.
    pub message: String,
    /// Structured payload, e.g. model input or output URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// An entry before the store assigns its id and timestamp.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    /// Correlation id of the request being logged.
    pub request_id: String,
    /// Event kind.
    pub kind: LogType,
    /// Producing subsystem.
    pub source: LogSource,
    /// Human-readable summary.
    pub message: String,
    /// Optional structured payload.
    pub details: Option<serde_json::Value>,
}

impl NewLogEntry {
    /// Build an entry without details.
    pub fn new(
        request_id: impl Into<String>,
        kind: LogType,
        source: LogSource,
        message: impl Into<String>,
    ) -> Self {
        Self { request_id: request_id.into(), kind, source, message: message.into(), details: None }
    }

    /// Attach an arbitrary detail payload.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// File-backed request log.
pub struct RequestLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RequestLog {
    /// Create a log backed by the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    /// Prepend an entry, keeping the newest [`MAX_ENTRIES`].
    ///
    /// Returns the stored entry, or `None` if the file could not be written.
    pub async fn write(&self, entry: NewLogEntry) -> Option<LogEntry> {
        let entry = LogEntry {
            id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            request_id: entry.request_id,
            kind: entry.kind,
            source: entry.source,
            message: entry.message,
            details: entry.details,
        };
        trace_entry(&entry);

        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await;
        entries.insert(0, entry.clone());
        entries.truncate(MAX_ENTRIES);

        match self.write_entries(&entries).await {
            Ok(()) => Some(entry),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to write log");
                None
            }
        }
    }

    /// All stored entries, newest first. Empty on any read failure.
    pub async fn entries(&self) -> Vec<LogEntry> {
        let _guard = self.lock.lock().await;
        self.read_entries().await
    }

    /// Entries for one correlation id, newest first.
    pub async fn entries_for(&self, request_id: &str) -> Vec<LogEntry> {
        self.entries().await.into_iter().filter(|e| e.request_id == request_id).collect()
    }

    /// Replace the log with an empty array.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn clear(&self) -> Result<(), std::io::Error> {
        let _guard = self.lock.lock().await;
        self.write_entries(&[]).await
    }

    async fn read_entries(&self) -> Vec<LogEntry> {
        let Ok(raw) = tokio::fs::read_to_string(&self.path).await else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    async fn write_entries(&self, entries: &[LogEntry]) -> Result<(), std::io::Error> {
        let body = serde_json::to_string_pretty(entries).map_err(std::io::Error::other)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, body).await
    }
}

fn trace_entry(entry: &LogEntry) {
    let source = format!("{:?}", entry.source);
    match entry.kind {
        LogType::Error => tracing::error!(
            request_id = %entry.request_id,
            source = %source,
            "{}",
            entry.message
        ),
        _ => tracing::info!(
            request_id = %entry.request_id,
            source = %source,
            kind = ?entry.kind,
            "{}",
            entry.message
        ),
    }
}

/// Fresh correlation id for one request.
#[must_use]
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..7].to_string()
}
