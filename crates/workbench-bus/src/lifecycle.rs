//! # Tool Lifecycle
//!
//! Tracks which tool panels are mounted, and hands each mounted panel a
//! [`ToolSession`] that owns its subscriptions.
//!
//! Raw `register_tool` / `unregister_tool` calls only touch the active set.
//! A session additionally releases every subscription it opened when it is
//! closed or dropped, so a panel cannot leak handlers on any exit path.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::future::Future;
use tracing::debug;
use uuid::Uuid;
use workbench_types::{Delivery, EventType, HandlerError, ToolId};

use crate::dispatcher::ToolBus;
use crate::subscriptions::{Handler, Subscription, SubscriptionId};

/// Ordered set of active tool ids. Registration is idempotent.
///
/// A tool also counts its open sessions: it stays active until the last
/// session for it is closed.
#[derive(Default)]
pub struct ActiveTools {
    tools: RwLock<Vec<ActiveTool>>,
}

struct ActiveTool {
    id: ToolId,
    sessions: usize,
}

impl ActiveTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the tool was already active.
    pub fn register(&self, tool_id: ToolId) -> bool {
        let mut tools = self.tools.write();
        if tools.iter().any(|t| t.id == tool_id) {
            return false;
        }
        tools.push(ActiveTool {
            id: tool_id,
            sessions: 0,
        });
        true
    }

    /// Returns false if the tool was not active. Open sessions are forgotten.
    pub fn unregister(&self, tool_id: &ToolId) -> bool {
        let mut tools = self.tools.write();
        let before = tools.len();
        tools.retain(|t| &t.id != tool_id);
        tools.len() < before
    }

    /// Count one more session for `tool_id`. Returns true if this made the
    /// tool active.
    pub fn open_session(&self, tool_id: ToolId) -> bool {
        let mut tools = self.tools.write();
        match tools.iter_mut().find(|t| t.id == tool_id) {
            Some(tool) => {
                tool.sessions += 1;
                false
            }
            None => {
                tools.push(ActiveTool {
                    id: tool_id,
                    sessions: 1,
                });
                true
            }
        }
    }

    /// Count one session fewer. Returns true if that was the last one and
    /// the tool is now inactive.
    pub fn close_session(&self, tool_id: &ToolId) -> bool {
        let mut tools = self.tools.write();
        let Some(index) = tools.iter().position(|t| &t.id == tool_id) else {
            return false;
        };
        if tools[index].sessions > 1 {
            tools[index].sessions -= 1;
            return false;
        }
        tools.remove(index);
        true
    }

    /// Open sessions for `tool_id`.
    pub fn sessions(&self, tool_id: &ToolId) -> usize {
        self.tools
            .read()
            .iter()
            .find(|t| &t.id == tool_id)
            .map_or(0, |t| t.sessions)
    }

    pub fn is_active(&self, tool_id: &ToolId) -> bool {
        self.tools.read().iter().any(|t| &t.id == tool_id)
    }

    /// Active tools in registration order.
    pub fn snapshot(&self) -> Vec<ToolId> {
        self.tools.read().iter().map(|t| t.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.tools.write().clear();
    }
}

/// Scoped handle for one mounted tool panel.
///
/// Messages sent through the session carry the tool as their source, and
/// subscriptions opened through it are owned by the tool: targeted messages
/// reach them only when addressed to this tool.
pub struct ToolSession {
    bus: ToolBus,
    tool_id: ToolId,
    subscriptions: Vec<Subscription>,
    closed: bool,
}

impl ToolSession {
    pub(crate) fn open(bus: ToolBus, tool_id: ToolId) -> Self {
        bus.attach_session(tool_id.clone());
        debug!(tool = %tool_id, "Tool session opened");
        Self {
            bus,
            tool_id,
            subscriptions: Vec::new(),
            closed: false,
        }
    }

    pub fn tool_id(&self) -> &ToolId {
        &self.tool_id
    }

    pub fn bus(&self) -> &ToolBus {
        &self.bus
    }

    /// Subscribe on behalf of this tool.
    pub fn subscribe<F>(&mut self, event_type: impl Into<EventType>, handler: F) -> SubscriptionId
    where
        F: Fn(&Delivery) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let subscription = self.bus.subscribe_owned(
            event_type.into(),
            Some(self.tool_id.clone()),
            Handler::Sync(std::sync::Arc::new(handler)),
        );
        self.keep(subscription)
    }

    /// Subscribe an async handler on behalf of this tool.
    pub fn subscribe_async<F, Fut>(
        &mut self,
        event_type: impl Into<EventType>,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(&Delivery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let boxed = move |delivery: &Delivery| -> BoxFuture<'static, Result<(), HandlerError>> {
            Box::pin(handler(delivery))
        };
        let subscription = self.bus.subscribe_owned(
            event_type.into(),
            Some(self.tool_id.clone()),
            Handler::Async(std::sync::Arc::new(boxed)),
        );
        self.keep(subscription)
    }

    /// Drop one of this session's subscriptions.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        match self.subscriptions.iter().position(|s| s.id() == id) {
            Some(index) => self.subscriptions.swap_remove(index).unsubscribe(),
            None => false,
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn broadcast(&self, event_type: impl Into<EventType>, payload: Value) -> Uuid {
        self.bus.broadcast(event_type, payload, self.tool_id.clone())
    }

    pub fn send_to(
        &self,
        target: impl Into<ToolId>,
        event_type: impl Into<EventType>,
        payload: Value,
    ) -> Uuid {
        self.bus.send_to_tool(target, event_type, payload, self.tool_id.clone())
    }

    pub fn set_shared_data(&self, key: impl Into<String>, value: Value) {
        self.bus.set_shared_data(key, value);
    }

    pub fn get_shared_data(&self, key: &str) -> Option<Value> {
        self.bus.get_shared_data(key)
    }

    /// Release every subscription. The tool is unregistered once no other
    /// session for it is open.
    pub fn close(mut self) {
        self.release();
    }

    fn keep(&mut self, subscription: Subscription) -> SubscriptionId {
        let id = subscription.id();
        self.subscriptions.push(subscription);
        id
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let released = self.subscriptions.len();
        self.subscriptions.clear();
        self.bus.detach_session(&self.tool_id);
        debug!(tool = %self.tool_id, released, "Tool session closed");
    }
}

impl Drop for ToolSession {
    fn drop(&mut self) {
        self.release();
    }
}
