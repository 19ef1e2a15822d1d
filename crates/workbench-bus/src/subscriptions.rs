//! # Subscription Manager
//!
//! Maps an event type (or the wildcard `"*"`) to the ordered list of handlers
//! interested in it.
//!
//! - Fan-out: any number of handlers per type, invoked in registration order.
//! - No deduplication: registering the same handler twice delivers twice.
//! - A [`Subscription`] handle removes exactly its own registration when
//!   unsubscribed or dropped; the last removal for a type clears the type entry.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;
use workbench_types::{Delivery, EventType, HandlerError, Message, ToolId};

/// Synchronous subscriber callback.
pub type SyncHandler = Arc<dyn Fn(&Delivery) -> Result<(), HandlerError> + Send + Sync>;

/// Asynchronous subscriber callback. The bus never awaits the returned future.
pub type AsyncHandler =
    Arc<dyn Fn(&Delivery) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// A registered callback.
#[derive(Clone)]
pub enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Handler::Sync"),
            Self::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

/// Identifier of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One row of the subscription table.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: SubscriptionId,
    pub event_type: EventType,
    /// Tool that owns the registration, when made through a tool session.
    pub owner: Option<ToolId>,
    pub handler: Handler,
}

impl Subscriber {
    /// Owned registrations only see targeted messages addressed to their owner.
    fn accepts(&self, message: &Message) -> bool {
        match (&self.owner, &message.target_tool_id) {
            (Some(owner), Some(target)) => owner == target,
            _ => true,
        }
    }
}

/// Event type -> ordered handlers.
#[derive(Default)]
pub struct SubscriptionTable {
    by_type: RwLock<HashMap<EventType, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `event_type`.
    pub fn insert(
        &self,
        event_type: EventType,
        owner: Option<ToolId>,
        handler: Handler,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(subscription = %id, event_type = %event_type, owner = ?owner, "Subscription created");

        self.by_type
            .write()
            .entry(event_type.clone())
            .or_default()
            .push(Subscriber {
                id,
                event_type,
                owner,
                handler,
            });
        id
    }

    /// Remove one registration. Returns false if it was already gone.
    pub fn remove(&self, event_type: &EventType, id: SubscriptionId) -> bool {
        let mut by_type = self.by_type.write();
        let Some(subscribers) = by_type.get_mut(event_type) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() < before;

        if subscribers.is_empty() {
            by_type.remove(event_type);
        }
        if removed {
            debug!(subscription = %id, event_type = %event_type, "Subscription removed");
        }
        removed
    }

    /// Remove every registration owned by `owner`.
    pub fn remove_owned_by(&self, owner: &ToolId) -> usize {
        let mut by_type = self.by_type.write();
        let mut removed = 0;

        by_type.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|s| s.owner.as_ref() != Some(owner));
            removed += before - subscribers.len();
            !subscribers.is_empty()
        });
        removed
    }

    /// Handlers for `message`: exact-type first, then wildcard, each in
    /// registration order.
    pub fn matching(&self, message: &Message) -> Vec<Subscriber> {
        let by_type = self.by_type.read();
        let exact = by_type.get(&message.event_type).into_iter().flatten();
        let wildcard = by_type.get(EventType::WILDCARD).into_iter().flatten();

        exact
            .chain(wildcard)
            .filter(|s| s.accepts(message))
            .cloned()
            .collect()
    }

    pub fn contains(&self, event_type: &EventType, id: SubscriptionId) -> bool {
        self.by_type
            .read()
            .get(event_type)
            .is_some_and(|subs| subs.iter().any(|s| s.id == id))
    }

    /// Handlers registered for exactly `event_type`.
    pub fn count(&self, event_type: &str) -> usize {
        self.by_type.read().get(event_type).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.by_type.read().values().map(Vec::len).sum()
    }

    /// Types that currently have at least one handler.
    pub fn event_types(&self) -> Vec<EventType> {
        let mut types: Vec<EventType> = self.by_type.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn clear(&self) {
        self.by_type.write().clear();
    }
}

/// Handle to one registration.
///
/// When dropped, the subscription is automatically removed.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    id: SubscriptionId,
    event_type: EventType,
    table: Weak<SubscriptionTable>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, event_type: EventType, table: &Arc<SubscriptionTable>) -> Self {
        Self {
            id,
            event_type,
            table: Arc::downgrade(table),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// True while the registration is still in the table.
    pub fn is_active(&self) -> bool {
        self.table
            .upgrade()
            .is_some_and(|t| t.contains(&self.event_type, self.id))
    }

    /// Stop future deliveries to this handler.
    ///
    /// A delivery already in progress is not retracted.
    pub fn unsubscribe(self) -> bool {
        // Drop performs the removal; report whether there was anything to remove.
        let was_active = self.is_active();
        drop(self);
        was_active
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.remove(&self.event_type, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .finish()
    }
}
