//! Demonstration session driven against the mounted panels.
//!
//! Covers one full happy path (load → execute → metric → deploy) and the
//! three rejection paths the diagnostic panel is meant to surface: a payload
//! that fails its schema, a targeted send the allow-list refuses, and an
//! event type with no schema at all.

use serde_json::json;
use std::time::Duration;
use tracing::info;
use workbench_types::event_types as types;

use crate::panels::{DATA_BROWSER, DEPLOYMENT, EXPERIMENTS, LABELING, NOTEBOOK, SETTINGS};
use crate::WorkbenchRuntime;

/// Time given to async handlers and retries to finish.
pub const SETTLE_TIME: Duration = Duration::from_millis(50);

pub async fn run_demo_session(runtime: &WorkbenchRuntime) {
    let bus = runtime.bus();

    info!("Opening dataset iris");
    bus.broadcast(
        types::DATA_LOAD,
        json!({"datasetId": "iris", "format": "csv", "rowCount": 150}),
        DATA_BROWSER,
    );

    info!("Training from the notebook");
    bus.send_to_tool(
        NOTEBOOK,
        types::NOTEBOOK_EXECUTE,
        json!({"notebookId": "train-iris", "cellId": "fit", "code": "model.fit(iris)"}),
        DATA_BROWSER,
    );

    bus.broadcast(
        types::SETTINGS_CHANGED,
        json!({"section": "appearance", "values": {"theme": "dark"}}),
        SETTINGS,
    );

    info!("Sending messages the bus must reject");
    bus.broadcast(
        types::MODEL_EXPORT,
        json!({"modelId": "overfit", "format": "onnx", "accuracy": 1.5}),
        EXPERIMENTS,
    );
    bus.send_to_tool(
        DEPLOYMENT,
        types::MODEL_EXPORT,
        json!({"modelId": "unreviewed", "format": "pickle", "accuracy": 0.7}),
        LABELING,
    );
    bus.broadcast("PLUGIN_PING", json!({"plugin": "profiler"}), "profiler");

    tokio::time::sleep(SETTLE_TIME).await;
    info!("Demo session finished");
}
