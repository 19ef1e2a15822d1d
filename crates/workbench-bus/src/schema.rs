//! # Schema Registry
//!
//! Maps an event type to the rule that turns a raw JSON payload into a typed
//! [`ToolEvent`].
//!
//! ## Validation Steps (in order)
//!
//! 1. **Envelope Check**: every message needs an id, a source, a concrete type
//!    and a non-null payload, whatever its type.
//! 2. **Typed Check**: known types are parsed into their payload struct, then
//!    field constraints (non-empty ids, `0..=1` scores) are applied.
//! 3. **Fallback**: unknown types pass as [`ToolEvent::Unrecognized`] and leave
//!    a warning in the activity log so they can be given a schema later.
//!
//! Validation never panics; failures come back as [`ValidationError`].

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use workbench_types::event_types as types;
use workbench_types::{
    DataLoad, DataSelected, DeploymentStatus, EventType, ExperimentMetric, LabelCreated, Message,
    ModelExport, NotebookExecute, NotebookOutput, SettingsChanged, SharedStateUpdate, ToolEvent,
    ValidationError,
};

use crate::observe::ActivityLog;

/// A payload rule: raw JSON in, typed event or validation error out.
pub type SchemaRule = Arc<dyn Fn(&Value) -> Result<ToolEvent, ValidationError> + Send + Sync>;

/// Registry of payload rules keyed by event type.
pub struct SchemaRegistry {
    rules: RwLock<HashMap<String, SchemaRule>>,
    log: Arc<ActivityLog>,
}

impl SchemaRegistry {
    /// Create a registry holding the built-in workbench schemas.
    pub fn new(log: Arc<ActivityLog>) -> Self {
        let registry = Self {
            rules: RwLock::new(HashMap::new()),
            log,
        };
        registry.install_builtin();
        registry
    }

    /// Add or replace the rule for `event_type`.
    pub fn register<F>(&self, event_type: impl Into<EventType>, rule: F)
    where
        F: Fn(&Value) -> Result<ToolEvent, ValidationError> + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        self.rules
            .write()
            .insert(event_type.as_str().to_string(), Arc::new(rule));
    }

    /// Register a loose object schema: the payload must be a JSON object
    /// containing every field in `required`. Accepted payloads become
    /// [`ToolEvent::Custom`].
    pub fn register_object(&self, event_type: impl Into<EventType>, required: &[&str]) {
        let event_type = event_type.into();
        let required: Vec<String> = required.iter().map(|f| f.to_string()).collect();
        let tag = event_type.clone();

        self.register(event_type, move |payload| {
            let object = payload
                .as_object()
                .ok_or_else(|| ValidationError::invalid(tag.as_str(), "payload must be an object"))?;

            if let Some(missing) = required.iter().find(|f| !object.contains_key(f.as_str())) {
                return Err(ValidationError::invalid(
                    tag.as_str(),
                    format!("missing field `{missing}`"),
                ));
            }

            Ok(ToolEvent::Custom {
                event_type: tag.clone(),
                payload: payload.clone(),
            })
        });
    }

    pub fn has_schema(&self, event_type: &str) -> bool {
        self.rules.read().contains_key(event_type)
    }

    /// Event types with a strict schema, sorted.
    pub fn known_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.rules.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Validate a message and produce its typed payload.
    pub fn validate(&self, message: &Message) -> Result<ToolEvent, ValidationError> {
        check_envelope(message)?;

        let rule = self.rules.read().get(message.event_type.as_str()).cloned();
        match rule {
            Some(rule) => rule(&message.payload),
            None => {
                self.log.warn(
                    format!(
                        "No strict schema for event type {}; accepted with envelope check only",
                        message.event_type
                    ),
                    Some(json!({
                        "messageId": message.id,
                        "type": message.event_type,
                        "sourceToolId": message.source_tool_id,
                    })),
                );
                Ok(ToolEvent::Unrecognized {
                    event_type: message.event_type.clone(),
                    payload: message.payload.clone(),
                })
            }
        }
    }

    fn install_builtin(&self) {
        self.register(types::DATA_LOAD, |payload| {
            let load: DataLoad = parse(types::DATA_LOAD, payload)?;
            non_empty(types::DATA_LOAD, "datasetId", &load.dataset_id)?;
            Ok(ToolEvent::DataLoad(load))
        });

        self.register(types::DATA_SELECTED, |payload| {
            let selected: DataSelected = parse(types::DATA_SELECTED, payload)?;
            non_empty(types::DATA_SELECTED, "datasetId", &selected.dataset_id)?;
            Ok(ToolEvent::DataSelected(selected))
        });

        self.register(types::NOTEBOOK_EXECUTE, |payload| {
            let exec: NotebookExecute = parse(types::NOTEBOOK_EXECUTE, payload)?;
            non_empty(types::NOTEBOOK_EXECUTE, "notebookId", &exec.notebook_id)?;
            Ok(ToolEvent::NotebookExecute(exec))
        });

        self.register(types::NOTEBOOK_OUTPUT, |payload| {
            let output: NotebookOutput = parse(types::NOTEBOOK_OUTPUT, payload)?;
            non_empty(types::NOTEBOOK_OUTPUT, "notebookId", &output.notebook_id)?;
            non_empty(types::NOTEBOOK_OUTPUT, "cellId", &output.cell_id)?;
            Ok(ToolEvent::NotebookOutput(output))
        });

        self.register(types::LABEL_CREATED, |payload| {
            let label: LabelCreated = parse(types::LABEL_CREATED, payload)?;
            non_empty(types::LABEL_CREATED, "datasetId", &label.dataset_id)?;
            non_empty(types::LABEL_CREATED, "itemId", &label.item_id)?;
            non_empty(types::LABEL_CREATED, "label", &label.label)?;
            unit_interval(types::LABEL_CREATED, "confidence", label.confidence)?;
            Ok(ToolEvent::LabelCreated(label))
        });

        self.register(types::MODEL_EXPORT, |payload| {
            let export: ModelExport = parse(types::MODEL_EXPORT, payload)?;
            non_empty(types::MODEL_EXPORT, "modelId", &export.model_id)?;
            unit_interval(types::MODEL_EXPORT, "accuracy", export.accuracy)?;
            Ok(ToolEvent::ModelExport(export))
        });

        self.register(types::DEPLOYMENT_STATUS, |payload| {
            let status: DeploymentStatus = parse(types::DEPLOYMENT_STATUS, payload)?;
            non_empty(types::DEPLOYMENT_STATUS, "deploymentId", &status.deployment_id)?;
            Ok(ToolEvent::DeploymentStatus(status))
        });

        self.register(types::EXPERIMENT_METRIC, |payload| {
            let metric: ExperimentMetric = parse(types::EXPERIMENT_METRIC, payload)?;
            non_empty(types::EXPERIMENT_METRIC, "experimentId", &metric.experiment_id)?;
            non_empty(types::EXPERIMENT_METRIC, "name", &metric.name)?;
            if !metric.value.is_finite() {
                return Err(ValidationError::invalid(
                    types::EXPERIMENT_METRIC,
                    "value must be finite",
                ));
            }
            Ok(ToolEvent::ExperimentMetric(metric))
        });

        self.register(types::SETTINGS_CHANGED, |payload| {
            let settings: SettingsChanged = parse(types::SETTINGS_CHANGED, payload)?;
            non_empty(types::SETTINGS_CHANGED, "section", &settings.section)?;
            Ok(ToolEvent::SettingsChanged(settings))
        });

        self.register(types::SHARED_STATE_UPDATE, |payload| {
            // Any key the store accepts must be announceable.
            let update: SharedStateUpdate = parse(types::SHARED_STATE_UPDATE, payload)?;
            Ok(ToolEvent::SharedStateUpdate(update))
        });
    }
}

/// The generic shape every message must have, known type or not.
fn check_envelope(message: &Message) -> Result<(), ValidationError> {
    if message.id.is_nil() {
        return Err(ValidationError::NilId);
    }
    if message.source_tool_id.is_empty() {
        return Err(ValidationError::MissingSource);
    }
    if message.event_type.is_empty() {
        return Err(ValidationError::MissingType);
    }
    if message.event_type.is_wildcard() {
        return Err(ValidationError::WildcardType);
    }
    if message.target_tool_id.as_ref().is_some_and(|t| t.is_empty()) {
        return Err(ValidationError::EmptyTarget);
    }
    if message.payload.is_null() {
        return Err(ValidationError::MissingPayload);
    }
    Ok(())
}

fn parse<T: DeserializeOwned>(event_type: &str, payload: &Value) -> Result<T, ValidationError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| ValidationError::invalid(event_type, e.to_string()))
}

fn non_empty(event_type: &str, field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::invalid(
            event_type,
            format!("`{field}` must not be empty"),
        ));
    }
    Ok(())
}

fn unit_interval(event_type: &str, field: &str, value: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange {
            event_type: event_type.to_string(),
            field: field.to_string(),
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}
