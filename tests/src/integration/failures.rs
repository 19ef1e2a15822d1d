//! # Failure Paths
//!
//! Everything that must end up in the dead-letter queue (or must not).
//!
//! | Failure | Outcome |
//! |---------|---------|
//! | Schema violation | dead letter, `retry_count == 0` |
//! | Allow-list denial | dead letter, `retry_count == 0` |
//! | Handler error / panic | logged, other subscribers still run |
//! | Bus-level delivery failure | retried with backoff, then dead letter |

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use workbench_bus::{BusConfig, DeadLetterReason, LogLevel, ToolBus};
    use workbench_types::event_types as types;
    use workbench_types::{HandlerError, ToolId, ValidationError};

    use crate::integration::fixtures::{bus, catalog, recorder};

    fn shallow_bus() -> ToolBus {
        let config = BusConfig {
            max_dispatch_depth: 1,
            ..BusConfig::default()
        };
        ToolBus::new(config, Arc::new(catalog())).unwrap()
    }

    /// `experiments` re-broadcasts every NOTEBOOK_OUTPUT as a metric.
    fn relay_outputs_as_metrics(bus: &ToolBus) -> workbench_bus::Subscription {
        let weak = bus.downgrade();
        bus.subscribe(types::NOTEBOOK_OUTPUT, move |_| {
            let bus = weak
                .upgrade()
                .ok_or_else(|| HandlerError::msg("bus gone"))?;
            bus.broadcast(
                types::EXPERIMENT_METRIC,
                json!({"experimentId": "e1", "name": "loss", "value": 0.2, "step": 1}),
                "experiments",
            );
            Ok(())
        })
    }

    fn notebook_output() -> serde_json::Value {
        json!({"notebookId": "nb", "cellId": "c1", "status": "success"})
    }

    // =============================================================================
    // VALIDATION & ACCESS CONTROL
    // =============================================================================

    #[test]
    fn test_missing_required_field_never_reaches_subscribers() {
        let bus = bus();
        let (_sub, seen) = recorder(&bus, types::DATA_LOAD);

        bus.broadcast(types::DATA_LOAD, json!({"datasetId": "123"}), "data-browser");

        assert!(seen.lock().is_empty());
        let dead = bus.dead_letters();
        assert_eq!(dead.len(), 1);
        assert!(matches!(
            &dead[0].reason,
            DeadLetterReason::Validation(ValidationError::InvalidPayload { .. })
        ));
        assert!(bus.logs().iter().any(|e| e.level == LogLevel::Error));
    }

    #[test]
    fn test_out_of_range_accuracy_dead_lettered() {
        let bus = bus();
        bus.broadcast(
            types::MODEL_EXPORT,
            json!({"modelId": "m1", "format": "onnx", "accuracy": 1.5}),
            "experiments",
        );

        let dead = bus.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message.retry_count, 0);
        match &dead[0].reason {
            DeadLetterReason::Validation(ValidationError::OutOfRange { field, value, .. }) => {
                assert_eq!(field, "accuracy");
                assert_eq!(*value, 1.5);
            }
            other => panic!("Expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_allow_list_blocks_unlisted_source() {
        let bus = bus();
        let (_sub, seen) = recorder(&bus, types::MODEL_EXPORT);
        let export = json!({"modelId": "m1", "format": "onnx", "accuracy": 0.8});

        bus.send_to_tool("deployment", types::MODEL_EXPORT, export.clone(), "data-browser");
        assert!(seen.lock().is_empty());
        assert_eq!(
            bus.dead_letters()[0].reason,
            DeadLetterReason::Unauthorized {
                source: "data-browser".into(),
                target: "deployment".into(),
            }
        );

        bus.send_to_tool("deployment", types::MODEL_EXPORT, export.clone(), "experiments");
        bus.send_to_tool("deployment", types::MODEL_EXPORT, export, ToolId::system());
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(bus.dead_letters().len(), 1);
    }

    // =============================================================================
    // HANDLER ISOLATION
    // =============================================================================

    #[test]
    fn test_failing_panels_do_not_block_others() {
        let bus = bus();
        let _broken = bus.subscribe(types::DATA_LOAD, |_| panic!("panel crashed"));
        let _grumpy = bus.subscribe(types::DATA_LOAD, |_| Err(HandlerError::msg("not today")));
        let (_ok, seen) = recorder(&bus, types::DATA_LOAD);

        bus.broadcast(
            types::DATA_LOAD,
            json!({"datasetId": "1", "format": "json"}),
            "data-browser",
        );

        assert_eq!(seen.lock().len(), 1);
        assert!(bus.dead_letters().is_empty());
        let errors = bus
            .logs()
            .into_iter()
            .filter(|e| e.level == LogLevel::Error)
            .count();
        assert_eq!(errors, 2);
    }

    // =============================================================================
    // RETRY & BACKOFF
    // =============================================================================

    #[test]
    fn test_exhausted_delivery_dead_lettered_with_retry_count() {
        let bus = shallow_bus();
        let _relay = relay_outputs_as_metrics(&bus);
        let (_sub, metrics) = recorder(&bus, types::EXPERIMENT_METRIC);

        bus.broadcast(types::NOTEBOOK_OUTPUT, notebook_output(), "notebook");

        assert!(metrics.lock().is_empty());
        let dead = bus.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message.event_type, types::EXPERIMENT_METRIC);
        assert_eq!(dead[0].message.retry_count, 3);
        assert!(matches!(
            dead[0].reason,
            DeadLetterReason::DeliveryExhausted { attempts: 3, .. }
        ));

        let wire = serde_json::to_value(&dead[0].message).unwrap();
        assert_eq!(wire["retryCount"], 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_delivery_waits_for_backoff() {
        let bus = shallow_bus();
        let _relay = relay_outputs_as_metrics(&bus);
        let (_sub, metrics) = recorder(&bus, types::EXPERIMENT_METRIC);

        bus.broadcast(types::NOTEBOOK_OUTPUT, notebook_output(), "notebook");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(metrics.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let metrics = metrics.lock();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].retry_count, 1);
        assert!(bus.dead_letters().is_empty());
    }

    #[test]
    fn test_operator_retry_redispatches() {
        let bus = shallow_bus();
        let _relay = relay_outputs_as_metrics(&bus);
        let (_sub, metrics) = recorder(&bus, types::EXPERIMENT_METRIC);

        bus.broadcast(types::NOTEBOOK_OUTPUT, notebook_output(), "notebook");
        let id = bus.dead_letters()[0].message.id;

        assert!(bus.retry_dead_letter(id));
        let metrics = metrics.lock();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].id, id);
        assert_eq!(metrics[0].retry_count, 0);
        assert!(bus.take_dead_letter(id).is_none());
    }
}
