//! # Integration Test Flows
//!
//! Panel-to-panel traffic over a real bus.
//!
//! ## Flows Tested
//!
//! 1. **Data browser → notebook**: a typed `DATA_LOAD` arrives intact
//! 2. **Unknown types**: delivered with a warning, never dropped
//! 3. **Shared state**: one write, one `SHARED_STATE_UPDATE`
//! 4. **Tool lifecycle**: idempotent registration
//! 5. **Mounted workbench**: the built-in panels chain reactions together

#[cfg(test)]
mod tests {
    use serde_json::json;
    use workbench_bus::{LogLevel, SHARED_STATE_UPDATE};
    use workbench_runtime::panels::{DATA_BROWSER, LABELING, NOTEBOOK, SETTINGS};
    use workbench_runtime::{RuntimeConfig, WorkbenchRuntime};
    use workbench_types::event_types as types;
    use workbench_types::{DataFormat, ToolEvent, ToolId};

    use crate::integration::fixtures::{bus, recorder};

    // =============================================================================
    // MESSAGE DELIVERY
    // =============================================================================

    #[test]
    fn test_data_load_reaches_subscriber() {
        let bus = bus();
        let typed = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let slot = typed.clone();
        let _sub = bus.subscribe(types::DATA_LOAD, move |delivery| {
            if let ToolEvent::DataLoad(load) = &delivery.event {
                *slot.lock() = Some(load.clone());
            }
            Ok(())
        });
        let (_raw, seen) = recorder(&bus, types::DATA_LOAD);

        bus.broadcast(
            types::DATA_LOAD,
            json!({"datasetId": "123", "format": "csv"}),
            "A",
        );

        let load = typed.lock().clone().unwrap();
        assert_eq!(load.dataset_id, "123");
        assert_eq!(load.format, DataFormat::Csv);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].source_tool_id, "A");
        assert_eq!(seen[0].retry_count, 0);
    }

    #[test]
    fn test_unregistered_type_delivered_with_warning() {
        let bus = bus();
        let (_sub, seen) = recorder(&bus, "CUSTOM_PLUGIN_EVENT");

        bus.broadcast("CUSTOM_PLUGIN_EVENT", json!({"anything": [1, 2]}), "plugin");

        assert_eq!(seen.lock().len(), 1);
        let warnings: Vec<_> = bus
            .logs()
            .into_iter()
            .filter(|e| e.level == LogLevel::Warn)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("CUSTOM_PLUGIN_EVENT"));
    }

    #[test]
    fn test_runtime_registered_schema_applies() {
        let bus = bus();
        bus.register_object_schema("PROJECT_OPENED", &["projectId"]);
        let (_sub, seen) = recorder(&bus, "PROJECT_OPENED");

        bus.broadcast("PROJECT_OPENED", json!({"projectId": "p1"}), "shell");
        bus.broadcast("PROJECT_OPENED", json!({"name": "p1"}), "shell");

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(bus.dead_letters().len(), 1);
        assert!(bus.known_types().contains(&"PROJECT_OPENED".to_string()));
    }

    // =============================================================================
    // SHARED STATE & LIFECYCLE
    // =============================================================================

    #[test]
    fn test_shared_state_write_announces_once() {
        let bus = bus();
        let (_sub, updates) = recorder(&bus, SHARED_STATE_UPDATE);

        bus.set_shared_data("k", json!({"rows": [1, 2, 3]}));

        assert_eq!(bus.get_shared_data("k"), Some(json!({"rows": [1, 2, 3]})));
        let updates = updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].source_tool_id, ToolId::system());
        assert_eq!(
            updates[0].payload,
            json!({"key": "k", "value": {"rows": [1, 2, 3]}})
        );
        assert_eq!(bus.shared_keys(), vec!["k".to_string()]);
    }

    #[test]
    fn test_tool_registration_lifecycle() {
        let bus = bus();
        bus.register_tool("t1");
        bus.register_tool("t1");
        assert_eq!(bus.active_tools(), vec![ToolId::from("t1")]);

        bus.unregister_tool(&"t1".into());
        assert!(bus.active_tools().is_empty());
        assert!(!bus.unregister_tool(&"t1".into()));
    }

    // =============================================================================
    // MOUNTED WORKBENCH
    // =============================================================================

    #[test]
    fn test_mounted_panels_chain_reactions() {
        let runtime = WorkbenchRuntime::new(&RuntimeConfig::default()).unwrap();
        let bus = runtime.bus();

        bus.broadcast(
            types::DATA_LOAD,
            json!({"datasetId": "mnist", "format": "image"}),
            DATA_BROWSER,
        );

        let journal = runtime.journal();
        assert_eq!(journal.notes_for(NOTEBOOK), vec!["loaded dataset mnist"]);
        assert_eq!(journal.notes_for(LABELING), vec!["queued mnist for labelling"]);
        assert_eq!(
            journal.notes_for(DATA_BROWSER),
            vec!["item-0 labelled setosa in mnist"]
        );
        assert!(journal
            .notes_for(SETTINGS)
            .contains(&"activeDataset = \"mnist\"".to_string()));

        let traffic = runtime.monitor().traffic();
        assert_eq!(traffic.get(types::DATA_LOAD), Some(&1));
        assert_eq!(traffic.get(types::LABEL_CREATED), Some(&1));
        assert!(bus.dead_letters().is_empty());
    }
}
