//! # Observability Log
//!
//! Bounded, most-recent-first ring of human-readable entries describing bus
//! activity. Surfaced read-only to the diagnostic panel and mirrored to
//! `tracing` at the matching level.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info, warn};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One entry of the observability log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Sequence number, unique per log.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Ring buffer of the most recent log entries.
pub struct ActivityLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl ActivityLog {
    /// Create a log keeping at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn info(&self, message: impl Into<String>, details: Option<Value>) {
        self.record(LogLevel::Info, message, details);
    }

    pub fn warn(&self, message: impl Into<String>, details: Option<Value>) {
        self.record(LogLevel::Warn, message, details);
    }

    pub fn error(&self, message: impl Into<String>, details: Option<Value>) {
        self.record(LogLevel::Error, message, details);
    }

    /// Append an entry, discarding the oldest one when full.
    pub fn record(&self, level: LogLevel, message: impl Into<String>, details: Option<Value>) {
        let message = message.into();

        match level {
            LogLevel::Info => info!(details = ?details, "{}", message),
            LogLevel::Warn => warn!(details = ?details, "{}", message),
            LogLevel::Error => error!(details = ?details, "{}", message),
        }

        let entry = LogEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            level,
            message,
            details,
        };

        let mut entries = self.entries.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    /// Snapshot, most recent first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of retained entries at `level`.
    pub fn count_at(&self, level: LogLevel) -> usize {
        self.entries.lock().iter().filter(|e| e.level == level).count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
