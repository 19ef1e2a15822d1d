//! # Tool Sessions
//!
//! Panels talk to the bus through a [`ToolSession`](workbench_bus::ToolSession):
//! subscriptions it creates belong to the tool and go away with it.

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use workbench_bus::LogLevel;
    use workbench_types::event_types as types;
    use workbench_types::{Delivery, HandlerError, ToolId};

    use crate::integration::fixtures::{bus, recorder};

    fn counter() -> (Arc<Mutex<usize>>, impl Fn(&Delivery) -> Result<(), HandlerError>) {
        let count = Arc::new(Mutex::new(0));
        let hits = count.clone();
        (count, move |_: &Delivery| {
            *hits.lock() += 1;
            Ok(())
        })
    }

    fn load() -> serde_json::Value {
        json!({"datasetId": "iris", "format": "csv"})
    }

    #[test]
    fn test_close_releases_subscriptions_and_tool() {
        let bus = bus();
        let mut session = bus.open_session("notebook");
        let (count, handler) = counter();
        session.subscribe(types::DATA_LOAD, handler);

        assert!(bus.is_tool_active(&"notebook".into()));
        assert_eq!(bus.subscriber_count(types::DATA_LOAD), 1);

        session.close();
        bus.broadcast(types::DATA_LOAD, load(), "data-browser");

        assert_eq!(*count.lock(), 0);
        assert!(!bus.is_tool_active(&"notebook".into()));
        assert!(bus.subscribed_types().is_empty());
    }

    #[test]
    fn test_dropped_session_releases() {
        let bus = bus();
        {
            let mut session = bus.open_session("notebook");
            session.subscribe(types::DATA_LOAD, |_| Ok(()));
            session.subscribe(types::SETTINGS_CHANGED, |_| Ok(()));
            assert_eq!(bus.subscribed_types().len(), 2);
        }

        assert!(bus.active_tools().is_empty());
        assert!(bus.subscribed_types().is_empty());
    }

    #[test]
    fn test_second_session_keeps_tool_active() {
        let bus = bus();
        let mut first = bus.open_session("notebook");
        let mut second = bus.open_session("notebook");
        first.subscribe("X", |_| Ok(()));
        let (count, handler) = counter();
        second.subscribe("X", handler);

        first.close();
        assert!(bus.is_tool_active(&"notebook".into()));
        assert_eq!(bus.subscriber_count("X"), 1);

        bus.send_to_tool("notebook", "X", json!({}), "data-browser");
        assert_eq!(*count.lock(), 1);

        second.close();
        assert!(bus.active_tools().is_empty());
        assert!(bus.subscribed_types().is_empty());
        assert!(bus
            .logs()
            .iter()
            .any(|e| e.level == LogLevel::Warn && e.message.contains("already active")));
    }

    #[test]
    fn test_targeted_message_reaches_owner_only() {
        let bus = bus();
        let mut notebook = bus.open_session("notebook");
        let mut experiments = bus.open_session("experiments");
        let (to_notebook, handler) = counter();
        notebook.subscribe(types::NOTEBOOK_EXECUTE, handler);
        let (to_experiments, handler) = counter();
        experiments.subscribe(types::NOTEBOOK_EXECUTE, handler);
        let (_monitor, everything) = recorder(&bus, "*");

        let id = experiments.send_to(
            "notebook",
            types::NOTEBOOK_EXECUTE,
            json!({"notebookId": "nb", "cellId": "c1", "code": "1 + 1"}),
        );

        assert_eq!(*to_notebook.lock(), 1);
        assert_eq!(*to_experiments.lock(), 0);
        let everything = everything.lock();
        assert_eq!(everything.len(), 1);
        assert_eq!(everything[0].id, id);
        assert_eq!(everything[0].source_tool_id, ToolId::from("experiments"));
        assert_eq!(everything[0].target_tool_id, Some(ToolId::from("notebook")));
    }

    #[test]
    fn test_duplicate_subscriptions_each_fire() {
        let bus = bus();
        let mut session = bus.open_session("notebook");
        let count = Arc::new(Mutex::new(0));
        for _ in 0..2 {
            let hits = count.clone();
            session.subscribe(types::DATA_LOAD, move |_| {
                *hits.lock() += 1;
                Ok(())
            });
        }

        bus.broadcast(types::DATA_LOAD, load(), "data-browser");

        assert_eq!(*count.lock(), 2);
        assert_eq!(session.subscription_count(), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = bus();
        let mut session = bus.open_session("notebook");
        let (count, handler) = counter();
        let id = session.subscribe(types::DATA_LOAD, handler);

        bus.broadcast(types::DATA_LOAD, load(), "data-browser");
        assert!(session.unsubscribe(id));
        assert!(!session.unsubscribe(id));
        bus.broadcast(types::DATA_LOAD, load(), "data-browser");

        assert_eq!(*count.lock(), 1);
        assert_eq!(session.subscription_count(), 0);
        assert!(bus.is_tool_active(&"notebook".into()));
    }

    #[test]
    fn test_session_state_roundtrip_announces_update() {
        let bus = bus();
        let session = bus.open_session("settings");
        let (_sub, updates) = recorder(&bus, types::SHARED_STATE_UPDATE);

        session.set_shared_data("theme", json!("dark"));

        assert_eq!(session.get_shared_data("theme"), Some(json!("dark")));
        assert_eq!(updates.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_async_session_handler_completes_on_runtime() {
        let bus = bus();
        let mut session = bus.open_session("experiments");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.subscribe_async(types::EXPERIMENT_METRIC, move |delivery| {
            let sink = sink.clone();
            let name = delivery.message.payload["name"].clone();
            async move {
                tokio::task::yield_now().await;
                sink.lock().push(name);
                Ok::<(), HandlerError>(())
            }
        });

        session.broadcast(
            types::EXPERIMENT_METRIC,
            json!({"experimentId": "e1", "name": "accuracy", "value": 0.91, "step": 3}),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*seen.lock(), vec![json!("accuracy")]);
        assert!(bus.dead_letters().is_empty());
    }
}
