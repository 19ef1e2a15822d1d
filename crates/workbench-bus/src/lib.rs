//! # Workbench Bus - Message Bus for Tool Panels
//!
//! Connects independently developed tool panels (notebook, data browser,
//! labeling, deployment, experiments, settings) inside one workbench process.
//!
//! ## Rules
//!
//! - All panel-to-panel communication goes through the bus. Panels never
//!   hold references to each other.
//! - `source_tool_id` on the envelope is the only sender identity.
//! - Invalid, unauthorized and undeliverable messages are dead-lettered,
//!   never silently dropped.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Notebook    │                    │  Experiments │
//! │              │   broadcast()      │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │   ToolBus    │          │
//!                  │ schema → ACL │ ─────────┘
//!                  └──────────────┘  subscribe()
//!                        │
//!                        ▼ (failures)
//!                  dead-letter queue
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

use std::time::Duration;
use thiserror::Error;

pub mod acl;
pub mod config;
pub mod dead_letter;
pub mod dispatcher;
pub mod lifecycle;
pub mod observe;
pub mod retry;
pub mod schema;
pub mod state;
pub mod subscriptions;

// Re-export main types
pub use acl::{AccessControl, AclDenied, ToolCatalog, ToolDescriptor, ToolDirectory};
pub use config::{BusConfig, ConfigError};
pub use dead_letter::{DeadLetter, DeadLetterQueue, DeadLetterReason};
pub use dispatcher::{DeliveryError, ToolBus, WeakToolBus};
pub use lifecycle::{ActiveTools, ToolSession};
pub use observe::{ActivityLog, LogEntry, LogLevel};
pub use retry::{DeliveryOutcome, DeliveryState, RetryPolicy};
pub use schema::{SchemaRegistry, SchemaRule};
pub use state::SharedState;
pub use subscriptions::{Handler, Subscription, SubscriptionId};

/// Delivery attempts before a message is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// First retry delay; doubles per attempt.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);

pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_millis(2000);

/// Entries kept in the observability log.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Nested deliveries allowed on one thread.
pub const DEFAULT_MAX_DISPATCH_DEPTH: u32 = 16;

/// Event broadcast by the bus after every shared-state write.
pub const SHARED_STATE_UPDATE: &str = workbench_types::event_types::SHARED_STATE_UPDATE;

/// Errors building a bus.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("invalid bus configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("telemetry setup failed: {0}")]
    Telemetry(#[from] workbench_telemetry::TelemetryError),
}
