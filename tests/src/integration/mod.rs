//! Cross-crate integration scenarios.

pub mod failures;
pub mod flows;
pub mod sessions;

#[cfg(test)]
pub(crate) mod fixtures {
    use parking_lot::Mutex;
    use std::sync::Arc;
    use workbench_bus::{Subscription, ToolBus, ToolCatalog, ToolDescriptor};
    use workbench_types::{Delivery, Message};

    /// Catalog with one restricted tool (`deployment`, experiments only).
    pub fn catalog() -> ToolCatalog {
        ToolCatalog::new()
            .with(ToolDescriptor::new("data-browser", "Data Browser"))
            .with(ToolDescriptor::new("notebook", "Notebook"))
            .with(ToolDescriptor::new("experiments", "Experiments"))
            .with(ToolDescriptor::new("deployment", "Deployment").allow_sources(["experiments"]))
    }

    pub fn bus() -> ToolBus {
        ToolBus::with_directory(Arc::new(catalog())).unwrap()
    }

    /// Subscribe a handler that records every message it receives.
    pub fn recorder(bus: &ToolBus, event_type: &str) -> (Subscription, Arc<Mutex<Vec<Message>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = bus.subscribe(event_type, move |delivery: &Delivery| {
            sink.lock().push(delivery.message.clone());
            Ok(())
        });
        (sub, seen)
    }
}
