//! Delivery retry state machine.
//!
//! A delivery pass either succeeds or fails at bus level. Failures are retried
//! with exponential backoff until the attempt budget is spent.
//!
//! State Machine:
//! ```text
//! [PENDING] ──success──→ [DELIVERED {attempts: 1}]
//!     │
//!     └── failure ──→ [BACKOFF {attempt: 1, delay}]
//!                          │
//!                          ├── success ──→ [DELIVERED {attempts: n+1}]
//!                          │
//!                          └── failure ──→ [BACKOFF {attempt: n+1, delay}]
//!                                                │
//!                                                ↓
//!                                 attempt >= max_attempts? ──→ [EXHAUSTED]
//! ```
//!
//! The machine only decides; scheduling the delay is the dispatcher's job.

use std::time::Duration;

use crate::config::BusConfig;

/// Where a message's delivery currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DeliveryState {
    /// No attempt made yet
    #[default]
    Pending,
    /// `attempt` passes failed; wait `delay` before the next one
    Backoff { attempt: u32, delay: Duration },
    /// Terminal: a pass completed
    Delivered { attempts: u32 },
    /// Terminal: every attempt failed, dead-letter the message
    Exhausted { attempts: u32 },
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered { .. } | Self::Exhausted { .. })
    }

    fn attempts_made(&self) -> u32 {
        match *self {
            Self::Pending => 0,
            Self::Backoff { attempt, .. } => attempt,
            Self::Delivered { attempts } | Self::Exhausted { attempts } => attempts,
        }
    }
}

/// Result of one delivery pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Succeeded,
    Failed,
}

/// Attempt budget and backoff curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &BusConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base, config.backoff_max)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the `attempt`-th failure: `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Pure, deterministic transition. Terminal states absorb every outcome.
    pub fn next_state(&self, current: DeliveryState, outcome: DeliveryOutcome) -> DeliveryState {
        if current.is_terminal() {
            return current;
        }

        let attempts = current.attempts_made() + 1;
        match outcome {
            DeliveryOutcome::Succeeded => DeliveryState::Delivered { attempts },
            DeliveryOutcome::Failed if attempts >= self.max_attempts => {
                DeliveryState::Exhausted { attempts }
            }
            DeliveryOutcome::Failed => DeliveryState::Backoff {
                attempt: attempts,
                delay: self.delay_for(attempts),
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&BusConfig::default())
    }
}
