//! # Message Dispatcher
//!
//! The [`ToolBus`] handle ties every bus component together.
//!
//! ## Dispatch Pipeline
//!
//! ```text
//! dispatch(msg)
//!   │
//!   ├─ validate ──✗──→ error log + dead letter (Validation)
//!   ├─ authorize ─✗──→ error log + dead letter (Unauthorized)
//!   ├─ info log
//!   └─ deliver ──✗──→ retry with backoff ──exhausted──→ dead letter
//!        │
//!        └─ exact-type subscribers, then wildcard subscribers
//!           (each isolated: an Err or a panic is logged, delivery goes on)
//! ```
//!
//! Nothing is returned to the sender. Outcomes are visible through the log,
//! the dead-letter queue and the metrics.
//!
//! ## Re-entrancy
//!
//! No lock is held while a handler runs, so handlers may subscribe, broadcast
//! or write shared state. Nested deliveries run on the caller's stack; a pass
//! nested deeper than `max_dispatch_depth` fails at bus level and goes through
//! the retry path, which defers it to the runtime once the stack unwinds.

use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::any::Any;
use std::cell::Cell;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use uuid::Uuid;
use workbench_telemetry::{log_message_event, time_histogram, BusMetrics, TelemetryError};
use workbench_types::{Delivery, EventType, HandlerError, Message, ToolEvent, ToolId, ValidationError};

use crate::acl::{AccessControl, ToolDirectory};
use crate::config::BusConfig;
use crate::dead_letter::{DeadLetter, DeadLetterQueue, DeadLetterReason};
use crate::lifecycle::{ActiveTools, ToolSession};
use crate::observe::{ActivityLog, LogEntry};
use crate::retry::{DeliveryOutcome, DeliveryState, RetryPolicy};
use crate::schema::SchemaRegistry;
use crate::state::SharedState;
use crate::subscriptions::{Handler, Subscriber, Subscription, SubscriptionTable};
use crate::{BusError, SHARED_STATE_UPDATE};

/// Bus-level delivery failure. Retried with backoff, never seen by senders.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("dispatch nested deeper than {limit} levels")]
    DepthExceeded { limit: u32 },
}

thread_local! {
    static DISPATCH_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Marks one delivery pass on the current thread's stack.
struct DepthGuard;

impl DepthGuard {
    fn enter(limit: u32) -> Result<Self, DeliveryError> {
        DISPATCH_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= limit {
                return Err(DeliveryError::DepthExceeded { limit });
            }
            depth.set(current + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

struct BusInner {
    config: BusConfig,
    policy: RetryPolicy,
    log: Arc<ActivityLog>,
    schemas: SchemaRegistry,
    acl: AccessControl,
    subscriptions: Arc<SubscriptionTable>,
    state: SharedState,
    tools: ActiveTools,
    dead_letters: DeadLetterQueue,
    metrics: BusMetrics,
}

/// Handle to one tool bus. Cheap to clone; every clone talks to the same bus.
#[derive(Clone)]
pub struct ToolBus {
    inner: Arc<BusInner>,
}

/// Non-owning handle, for handlers that need to call back into the bus
/// without keeping it alive.
#[derive(Clone)]
pub struct WeakToolBus {
    inner: Weak<BusInner>,
}

impl WeakToolBus {
    pub fn upgrade(&self) -> Option<ToolBus> {
        self.inner.upgrade().map(|inner| ToolBus { inner })
    }
}

impl ToolBus {
    /// Build a bus from validated configuration and a tool directory.
    pub fn new(config: BusConfig, directory: Arc<dyn ToolDirectory>) -> Result<Self, BusError> {
        config.validate()?;
        let metrics = BusMetrics::new(&config.metrics_namespace)?;
        let log = Arc::new(ActivityLog::new(config.log_capacity));

        let inner = BusInner {
            policy: RetryPolicy::from_config(&config),
            schemas: SchemaRegistry::new(log.clone()),
            acl: AccessControl::new(directory),
            subscriptions: Arc::new(SubscriptionTable::new()),
            state: SharedState::new(),
            tools: ActiveTools::new(),
            dead_letters: DeadLetterQueue::new(),
            log,
            metrics,
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Bus with default configuration.
    pub fn with_directory(directory: Arc<dyn ToolDirectory>) -> Result<Self, BusError> {
        Self::new(BusConfig::default(), directory)
    }

    pub fn downgrade(&self) -> WeakToolBus {
        WeakToolBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    // =========================================================================
    // MESSAGING
    // =========================================================================

    /// Validate, authorize and deliver a message.
    pub fn dispatch(&self, message: Message) {
        let inner = &self.inner;
        inner.metrics.messages_dispatched.inc();

        let event = match inner.schemas.validate(&message) {
            Ok(event) => event,
            Err(err) => {
                self.reject_invalid(message, err);
                return;
            }
        };
        if matches!(event, ToolEvent::Unrecognized { .. }) {
            inner.metrics.unknown_schema.inc();
        }

        if let Err(denied) = inner.acl.check(&message) {
            inner.log.error(
                denied.to_string(),
                Some(json!({
                    "messageId": message.id,
                    "type": message.event_type,
                    "sourceToolId": denied.source_tool,
                    "targetToolId": denied.target_tool,
                })),
            );
            self.file_dead_letter(
                message,
                DeadLetterReason::Unauthorized {
                    source: denied.source_tool,
                    target: denied.target_tool,
                },
            );
            return;
        }

        inner.log.info(
            describe(&message),
            Some(json!({
                "messageId": message.id,
                "type": message.event_type,
                "sourceToolId": message.source_tool_id,
                "targetToolId": message.target_tool_id,
            })),
        );

        self.run_delivery(Delivery::new(message, event), DeliveryState::Pending);
    }

    /// Send to every subscriber of `event_type`. Returns the message id.
    pub fn broadcast(
        &self,
        event_type: impl Into<EventType>,
        payload: Value,
        source: impl Into<ToolId>,
    ) -> Uuid {
        let message = Message::broadcast(event_type, payload, source);
        let id = message.id;
        self.dispatch(message);
        id
    }

    /// Send to one tool. Sending to an inactive tool is allowed but logged.
    pub fn send_to_tool(
        &self,
        target: impl Into<ToolId>,
        event_type: impl Into<EventType>,
        payload: Value,
        source: impl Into<ToolId>,
    ) -> Uuid {
        let message = Message::targeted(target, event_type, payload, source);
        let id = message.id;

        if let Some(target) = &message.target_tool_id {
            if !self.inner.tools.is_active(target) {
                self.inner.log.warn(
                    format!("Target tool {target} is not active; dispatching anyway"),
                    Some(json!({"messageId": id, "targetToolId": target})),
                );
            }
        }

        self.dispatch(message);
        id
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Register a handler for `event_type` (or `"*"` for every message).
    pub fn subscribe<F>(&self, event_type: impl Into<EventType>, handler: F) -> Subscription
    where
        F: Fn(&Delivery) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe_owned(event_type.into(), None, Handler::Sync(Arc::new(handler)))
    }

    /// Register an async handler. The bus never waits for the future.
    pub fn subscribe_async<F, Fut>(
        &self,
        event_type: impl Into<EventType>,
        handler: F,
    ) -> Subscription
    where
        F: Fn(&Delivery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let boxed = move |delivery: &Delivery| -> BoxFuture<'static, Result<(), HandlerError>> {
            Box::pin(handler(delivery))
        };
        self.subscribe_owned(event_type.into(), None, Handler::Async(Arc::new(boxed)))
    }

    pub(crate) fn subscribe_owned(
        &self,
        event_type: EventType,
        owner: Option<ToolId>,
        handler: Handler,
    ) -> Subscription {
        let table = &self.inner.subscriptions;
        let id = table.insert(event_type.clone(), owner, handler);
        Subscription::new(id, event_type, table)
    }

    /// Handlers registered for exactly `event_type`.
    #[must_use]
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.inner.subscriptions.count(event_type)
    }

    #[must_use]
    pub fn subscribed_types(&self) -> Vec<EventType> {
        self.inner.subscriptions.event_types()
    }

    // =========================================================================
    // SCHEMAS
    // =========================================================================

    /// Add or replace the schema rule for `event_type`.
    pub fn register_schema<F>(&self, event_type: impl Into<EventType>, rule: F)
    where
        F: Fn(&Value) -> Result<ToolEvent, ValidationError> + Send + Sync + 'static,
    {
        self.inner.schemas.register(event_type, rule);
    }

    /// Require a JSON object with the given fields for `event_type`.
    pub fn register_object_schema(&self, event_type: impl Into<EventType>, required: &[&str]) {
        self.inner.schemas.register_object(event_type, required);
    }

    #[must_use]
    pub fn known_types(&self) -> Vec<String> {
        self.inner.schemas.known_types()
    }

    // =========================================================================
    // SHARED STATE
    // =========================================================================

    /// Store a value and broadcast `SHARED_STATE_UPDATE` from `"system"`.
    pub fn set_shared_data(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.inner.state.set(key.clone(), value.clone());
        self.broadcast(
            SHARED_STATE_UPDATE,
            json!({"key": key, "value": value}),
            ToolId::system(),
        );
    }

    #[must_use]
    pub fn get_shared_data(&self, key: &str) -> Option<Value> {
        self.inner.state.get(key)
    }

    #[must_use]
    pub fn shared_keys(&self) -> Vec<String> {
        self.inner.state.keys()
    }

    // =========================================================================
    // TOOL LIFECYCLE
    // =========================================================================

    /// Mark a tool active. Returns false if it already was.
    pub fn register_tool(&self, tool_id: impl Into<ToolId>) -> bool {
        let tool_id = tool_id.into();
        let added = self.inner.tools.register(tool_id.clone());
        if added {
            self.tool_registered(&tool_id);
        }
        added
    }

    /// Mark a tool inactive. Its subscriptions are left alone.
    pub fn unregister_tool(&self, tool_id: &ToolId) -> bool {
        let removed = self.inner.tools.unregister(tool_id);
        if removed {
            self.tool_unregistered(tool_id);
        }
        removed
    }

    pub(crate) fn attach_session(&self, tool_id: ToolId) {
        if self.inner.tools.open_session(tool_id.clone()) {
            self.tool_registered(&tool_id);
        } else {
            let sessions = self.inner.tools.sessions(&tool_id);
            self.inner.log.warn(
                format!("Tool {tool_id} already active; open sessions: {sessions}"),
                Some(json!({"toolId": tool_id, "sessions": sessions})),
            );
        }
    }

    pub(crate) fn detach_session(&self, tool_id: &ToolId) {
        if self.inner.tools.close_session(tool_id) {
            self.tool_unregistered(tool_id);
        }
    }

    #[must_use]
    pub fn is_tool_active(&self, tool_id: &ToolId) -> bool {
        self.inner.tools.is_active(tool_id)
    }

    #[must_use]
    pub fn active_tools(&self) -> Vec<ToolId> {
        self.inner.tools.snapshot()
    }

    /// Register `tool_id` and return a session that owns its subscriptions.
    pub fn open_session(&self, tool_id: impl Into<ToolId>) -> ToolSession {
        ToolSession::open(self.clone(), tool_id.into())
    }

    // =========================================================================
    // DIAGNOSTICS
    // =========================================================================

    /// Observability log, most recent first.
    #[must_use]
    pub fn logs(&self) -> Vec<LogEntry> {
        self.inner.log.entries()
    }

    pub fn clear_logs(&self) {
        self.inner.log.clear();
    }

    /// Dead-letter queue, most recent first.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.dead_letters.entries()
    }

    pub fn take_dead_letter(&self, message_id: Uuid) -> Option<DeadLetter> {
        self.inner.dead_letters.take(message_id)
    }

    /// Remove a dead letter and dispatch it again with a fresh attempt budget.
    pub fn retry_dead_letter(&self, message_id: Uuid) -> bool {
        let Some(dead) = self.inner.dead_letters.take(message_id) else {
            return false;
        };

        let mut message = dead.message;
        message.retry_count = 0;
        self.inner.log.info(
            format!("Re-dispatching dead letter {message_id}"),
            Some(json!({"messageId": message_id, "previousReason": dead.reason.to_string()})),
        );
        self.dispatch(message);
        true
    }

    pub fn clear_dead_letters(&self) {
        self.inner.dead_letters.clear();
    }

    pub fn metrics(&self) -> &BusMetrics {
        &self.inner.metrics
    }

    /// Prometheus text exposition of the bus metrics.
    pub fn metrics_text(&self) -> Result<String, TelemetryError> {
        self.inner.metrics.encode()
    }

    /// Drop every subscription, tool, shared value, log entry and dead letter.
    ///
    /// Meant for application exit. Clones of the handle stay usable.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        inner.subscriptions.clear();
        inner.tools.clear();
        inner.state.clear();
        inner.log.clear();
        inner.dead_letters.clear();
        self.refresh_tool_gauge();
        tracing::info!("Tool bus shut down");
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn reject_invalid(&self, message: Message, err: ValidationError) {
        self.inner.log.error(
            format!(
                "Validation failed for {} from {}: {err}",
                message.event_type, message.source_tool_id
            ),
            Some(json!({
                "messageId": message.id,
                "type": message.event_type,
                "sourceToolId": message.source_tool_id,
                "payload": message.payload,
            })),
        );
        self.file_dead_letter(message, DeadLetterReason::Validation(err));
    }

    fn file_dead_letter(&self, message: Message, reason: DeadLetterReason) {
        self.inner.metrics.record_dead_letter(reason.label());
        log_message_event!(
            debug,
            "Message filed to dead-letter queue",
            message,
            reason = reason.label(),
            retry_count = message.retry_count
        );
        self.inner.dead_letters.push(message, reason);
    }

    /// One delivery attempt, then advance the retry state machine.
    fn run_delivery(&self, mut delivery: Delivery, state: DeliveryState) {
        let result = self.deliver(&delivery);
        let outcome = match result {
            Ok(()) => DeliveryOutcome::Succeeded,
            Err(_) => DeliveryOutcome::Failed,
        };

        match self.inner.policy.next_state(state, outcome) {
            DeliveryState::Delivered { attempts } if attempts > 1 => {
                self.inner.log.info(
                    format!(
                        "Message {} delivered after {attempts} attempts",
                        delivery.message.id
                    ),
                    None,
                );
            }
            next @ DeliveryState::Backoff { attempt, delay } => {
                delivery.message.record_failed_attempt();
                self.inner.metrics.delivery_retries.inc();
                self.inner.log.warn(
                    format!(
                        "Delivery of {} failed (attempt {attempt}), retrying in {}ms",
                        delivery.message.id,
                        delay.as_millis()
                    ),
                    Some(json!({
                        "messageId": delivery.message.id,
                        "error": error_text(&result),
                    })),
                );
                self.schedule_retry(delivery, next, delay);
            }
            DeliveryState::Exhausted { attempts } => {
                delivery.message.record_failed_attempt();
                let last_error = error_text(&result);
                self.inner.log.error(
                    format!(
                        "Delivery of {} failed after {attempts} attempts: {last_error}",
                        delivery.message.id
                    ),
                    Some(json!({
                        "messageId": delivery.message.id,
                        "type": delivery.message.event_type,
                        "retryCount": delivery.message.retry_count,
                    })),
                );
                self.file_dead_letter(
                    delivery.message,
                    DeadLetterReason::DeliveryExhausted {
                        attempts,
                        last_error,
                    },
                );
            }
            DeliveryState::Delivered { .. } | DeliveryState::Pending => {}
        }
    }

    /// Wait out the backoff on the runtime, or retry at once without one.
    fn schedule_retry(&self, delivery: Delivery, state: DeliveryState, delay: Duration) {
        log_message_event!(
            debug,
            "Retry scheduled",
            delivery.message,
            delay_ms = delay.as_millis() as u64
        );
        match Handle::try_current() {
            Ok(handle) => {
                let bus = self.clone();
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    bus.run_delivery(delivery, state);
                });
            }
            Err(_) => self.run_delivery(delivery, state),
        }
    }

    /// One pass over the matching subscribers.
    fn deliver(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        let _depth = DepthGuard::enter(self.inner.config.max_dispatch_depth)?;
        let _timer = time_histogram!(self.inner.metrics.delivery_duration);

        for subscriber in self.inner.subscriptions.matching(&delivery.message) {
            self.invoke(&subscriber, delivery);
        }
        Ok(())
    }

    fn invoke(&self, subscriber: &Subscriber, delivery: &Delivery) {
        match &subscriber.handler {
            Handler::Sync(handler) => {
                let result = catch_unwind(AssertUnwindSafe(|| handler(delivery)))
                    .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_text(panic))));
                self.record_handler_result(subscriber, &delivery.message, result);
            }
            Handler::Async(handler) => {
                let mut future = match catch_unwind(AssertUnwindSafe(|| handler(delivery))) {
                    Ok(future) => future,
                    Err(panic) => {
                        let err = HandlerError::Panicked(panic_text(panic));
                        self.record_handler_result(subscriber, &delivery.message, Err(err));
                        return;
                    }
                };

                match catch_unwind(AssertUnwindSafe(|| (&mut future).now_or_never())) {
                    Ok(Some(result)) => {
                        self.record_handler_result(subscriber, &delivery.message, result)
                    }
                    Ok(None) => self.spawn_pending(subscriber, &delivery.message, future),
                    Err(panic) => {
                        let err = HandlerError::Panicked(panic_text(panic));
                        self.record_handler_result(subscriber, &delivery.message, Err(err));
                    }
                }
            }
        }
    }

    fn spawn_pending(
        &self,
        subscriber: &Subscriber,
        message: &Message,
        future: BoxFuture<'static, Result<(), HandlerError>>,
    ) {
        let Ok(handle) = Handle::try_current() else {
            self.inner.log.warn(
                format!(
                    "Async subscriber {} for {} is pending with no runtime; dropped",
                    subscriber.id, message.event_type
                ),
                Some(json!({"messageId": message.id})),
            );
            return;
        };

        let bus = self.downgrade();
        let subscriber = subscriber.clone();
        let message = message.clone();
        handle.spawn(async move {
            let result = AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_text(panic))));
            if let Some(bus) = bus.upgrade() {
                bus.record_handler_result(&subscriber, &message, result);
            }
        });
    }

    fn record_handler_result(
        &self,
        subscriber: &Subscriber,
        message: &Message,
        result: Result<(), HandlerError>,
    ) {
        match result {
            Ok(()) => self.inner.metrics.handler_invocations.inc(),
            Err(err) => {
                self.inner.metrics.subscriber_errors.inc();
                self.inner.log.error(
                    format!(
                        "Subscriber {} failed handling {}: {err}",
                        subscriber.id, message.event_type
                    ),
                    Some(json!({
                        "messageId": message.id,
                        "subscription": subscriber.id.to_string(),
                        "owner": subscriber.owner,
                    })),
                );
            }
        }
    }

    fn tool_registered(&self, tool_id: &ToolId) {
        self.inner.log.info(format!("Tool {tool_id} registered"), None);
        self.refresh_tool_gauge();
    }

    fn tool_unregistered(&self, tool_id: &ToolId) {
        self.inner.log.info(format!("Tool {tool_id} unregistered"), None);
        self.refresh_tool_gauge();
    }

    fn refresh_tool_gauge(&self) {
        self.inner
            .metrics
            .active_tools
            .set(i64::try_from(self.inner.tools.len()).unwrap_or(i64::MAX));
    }
}

impl std::fmt::Debug for ToolBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBus")
            .field("subscriptions", &self.inner.subscriptions.total())
            .field("active_tools", &self.inner.tools.len())
            .field("dead_letters", &self.inner.dead_letters.len())
            .finish()
    }
}

fn describe(message: &Message) -> String {
    match &message.target_tool_id {
        Some(target) => format!(
            "Dispatching {} from {} to {}",
            message.event_type, message.source_tool_id, target
        ),
        None => format!(
            "Broadcasting {} from {}",
            message.event_type, message.source_tool_id
        ),
    }
}

fn error_text(result: &Result<(), DeliveryError>) -> String {
    match result {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

fn panic_text(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
