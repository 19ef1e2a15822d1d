//! # Tool Events
//!
//! Typed payloads for every event type the workbench panels exchange.
//!
//! A [`Message`](crate::Message) carries raw JSON. The bus schema registry
//! parses it into one of these shapes keyed by the message type; types without
//! a strict shape end up as [`ToolEvent::Unrecognized`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::EventType;

/// Event type tags with a strict schema.
pub mod event_types {
    pub const DATA_LOAD: &str = "DATA_LOAD";
    pub const DATA_SELECTED: &str = "DATA_SELECTED";
    pub const NOTEBOOK_EXECUTE: &str = "NOTEBOOK_EXECUTE";
    pub const NOTEBOOK_OUTPUT: &str = "NOTEBOOK_OUTPUT";
    pub const LABEL_CREATED: &str = "LABEL_CREATED";
    pub const MODEL_EXPORT: &str = "MODEL_EXPORT";
    pub const DEPLOYMENT_STATUS: &str = "DEPLOYMENT_STATUS";
    pub const EXPERIMENT_METRIC: &str = "EXPERIMENT_METRIC";
    pub const SETTINGS_CHANGED: &str = "SETTINGS_CHANGED";
    pub const SHARED_STATE_UPDATE: &str = "SHARED_STATE_UPDATE";

    /// Every built-in tag, in registration order.
    pub const ALL: [&str; 10] = [
        DATA_LOAD,
        DATA_SELECTED,
        NOTEBOOK_EXECUTE,
        NOTEBOOK_OUTPUT,
        LABEL_CREATED,
        MODEL_EXPORT,
        DEPLOYMENT_STATUS,
        EXPERIMENT_METRIC,
        SETTINGS_CHANGED,
        SHARED_STATE_UPDATE,
    ];
}

// =============================================================================
// DATA BROWSER
// =============================================================================

/// Storage format of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Csv,
    Json,
    Parquet,
    Image,
    Text,
}

/// A dataset was opened and should be loaded by interested tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataLoad {
    pub dataset_id: String,
    pub format: DataFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

/// Rows were selected in the data browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSelected {
    pub dataset_id: String,
    pub row_ids: Vec<String>,
}

// =============================================================================
// NOTEBOOK
// =============================================================================

/// Request to run code in a notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookExecute {
    pub notebook_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
    pub code: String,
}

/// Execution state of a notebook cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    Running,
    Success,
    Error,
}

/// Output (or progress) of a notebook cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookOutput {
    pub notebook_id: String,
    pub cell_id: String,
    pub status: CellStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

// =============================================================================
// LABELING
// =============================================================================

/// A label was attached to a dataset item. `confidence` is in `0..=1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelCreated {
    pub dataset_id: String,
    pub item_id: String,
    pub label: String,
    pub confidence: f64,
}

// =============================================================================
// MODELS & DEPLOYMENT
// =============================================================================

/// Serialization format of an exported model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Onnx,
    Pickle,
    SavedModel,
    TorchScript,
}

/// A trained model was exported. `accuracy` is in `0..=1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelExport {
    pub model_id: String,
    pub format: ModelFormat,
    pub accuracy: f64,
}

/// Lifecycle state of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    Pending,
    Running,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub deployment_id: String,
    pub status: DeploymentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

// =============================================================================
// EXPERIMENTS & SETTINGS
// =============================================================================

/// One scalar metric sample of an experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentMetric {
    pub experiment_id: String,
    pub name: String,
    pub value: f64,
    pub step: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsChanged {
    pub section: String,
    pub values: Map<String, Value>,
}

// =============================================================================
// SYSTEM
// =============================================================================

/// Emitted by the bus whenever a shared state key is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedStateUpdate {
    pub key: String,
    pub value: Value,
}

/// A validated message payload, keyed by event type.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    DataLoad(DataLoad),
    DataSelected(DataSelected),
    NotebookExecute(NotebookExecute),
    NotebookOutput(NotebookOutput),
    LabelCreated(LabelCreated),
    ModelExport(ModelExport),
    DeploymentStatus(DeploymentStatus),
    ExperimentMetric(ExperimentMetric),
    SettingsChanged(SettingsChanged),
    SharedStateUpdate(SharedStateUpdate),

    /// Accepted by a rule registered at runtime for a non-built-in type.
    Custom { event_type: EventType, payload: Value },

    /// No schema exists for the type; only the generic envelope was checked.
    Unrecognized { event_type: EventType, payload: Value },
}

impl ToolEvent {
    /// The event type tag this payload was validated against.
    pub fn event_type(&self) -> &str {
        match self {
            Self::DataLoad(_) => event_types::DATA_LOAD,
            Self::DataSelected(_) => event_types::DATA_SELECTED,
            Self::NotebookExecute(_) => event_types::NOTEBOOK_EXECUTE,
            Self::NotebookOutput(_) => event_types::NOTEBOOK_OUTPUT,
            Self::LabelCreated(_) => event_types::LABEL_CREATED,
            Self::ModelExport(_) => event_types::MODEL_EXPORT,
            Self::DeploymentStatus(_) => event_types::DEPLOYMENT_STATUS,
            Self::ExperimentMetric(_) => event_types::EXPERIMENT_METRIC,
            Self::SettingsChanged(_) => event_types::SETTINGS_CHANGED,
            Self::SharedStateUpdate(_) => event_types::SHARED_STATE_UPDATE,
            Self::Custom { event_type, .. } | Self::Unrecognized { event_type, .. } => {
                event_type.as_str()
            }
        }
    }
}
