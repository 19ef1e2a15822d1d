//! # Diagnostics Monitor
//!
//! Read-only view of the bus for the diagnostic panel: traffic per event type,
//! recent log entries, active tools and the dead-letter queue.
//!
//! The monitor subscribes anonymously to `"*"`, so it also sees targeted
//! messages addressed to other tools.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use workbench_bus::{DeadLetter, LogEntry, LogLevel, Subscription, ToolBus};
use workbench_types::{EventType, ToolId};

/// Log entries included in a snapshot.
pub const RECENT_LOG_ENTRIES: usize = 10;

pub struct DiagnosticsMonitor {
    traffic: Arc<Mutex<BTreeMap<String, u64>>>,
    _subscription: Subscription,
}

impl DiagnosticsMonitor {
    pub fn attach(bus: &ToolBus) -> Self {
        let traffic: Arc<Mutex<BTreeMap<String, u64>>> = Arc::default();
        let counts = traffic.clone();
        let subscription = bus.subscribe(EventType::wildcard(), move |delivery| {
            *counts
                .lock()
                .entry(delivery.message.event_type.to_string())
                .or_default() += 1;
            Ok(())
        });

        Self {
            traffic,
            _subscription: subscription,
        }
    }

    /// Delivered messages per event type.
    pub fn traffic(&self) -> BTreeMap<String, u64> {
        self.traffic.lock().clone()
    }

    pub fn snapshot(&self, bus: &ToolBus) -> DiagnosticsSnapshot {
        let logs = bus.logs();
        let count = |level| logs.iter().filter(|e| e.level == level).count();

        DiagnosticsSnapshot {
            active_tools: bus.active_tools(),
            shared_keys: bus.shared_keys(),
            traffic: self.traffic(),
            log_levels: LogLevelCounts {
                info: count(LogLevel::Info),
                warn: count(LogLevel::Warn),
                error: count(LogLevel::Error),
            },
            recent_logs: logs.iter().take(RECENT_LOG_ENTRIES).cloned().collect(),
            dead_letters: bus.dead_letters().iter().map(DeadLetterSummary::from).collect(),
        }
    }
}

/// What the diagnostic panel renders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub active_tools: Vec<ToolId>,
    pub shared_keys: Vec<String>,
    pub traffic: BTreeMap<String, u64>,
    pub log_levels: LogLevelCounts,
    pub recent_logs: Vec<LogEntry>,
    pub dead_letters: Vec<DeadLetterSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogLevelCounts {
    pub info: usize,
    pub warn: usize,
    pub error: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterSummary {
    pub message_id: Uuid,
    pub event_type: EventType,
    pub source_tool_id: ToolId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_tool_id: Option<ToolId>,
    /// `validation`, `unauthorized` or `delivery_exhausted`.
    pub reason: &'static str,
    pub detail: String,
    pub retry_count: u32,
}

impl From<&DeadLetter> for DeadLetterSummary {
    fn from(dead: &DeadLetter) -> Self {
        Self {
            message_id: dead.message.id,
            event_type: dead.message.event_type.clone(),
            source_tool_id: dead.message.source_tool_id.clone(),
            target_tool_id: dead.message.target_tool_id.clone(),
            reason: dead.reason.label(),
            detail: dead.reason.to_string(),
            retry_count: dead.message.retry_count,
        }
    }
}

/// Re-dispatch every dead letter accepted by `filter`. Returns how many were
/// re-submitted.
pub fn retry_dead_letters<F>(bus: &ToolBus, filter: F) -> usize
where
    F: Fn(&DeadLetter) -> bool,
{
    bus.dead_letters()
        .iter()
        .filter(|dead| filter(dead))
        .filter(|dead| bus.retry_dead_letter(dead.message.id))
        .count()
}
