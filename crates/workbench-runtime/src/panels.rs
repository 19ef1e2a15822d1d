//! # Tool Panels
//!
//! Headless stand-ins for the workbench panels. Each panel declares its
//! descriptor for the tool catalog and, once mounted, reacts to bus traffic
//! through its own [`ToolSession`].
//!
//! ## Flow
//!
//! ```text
//! data-browser ──DATA_LOAD──→ notebook (sets activeDataset)
//!                        └──→ labeling ──LABEL_CREATED──→ data-browser
//!
//! NOTEBOOK_EXECUTE ──→ notebook ──NOTEBOOK_OUTPUT──→ experiments
//!                                                     │
//!                                          EXPERIMENT_METRIC
//!                                                     │ (async)
//!                                                     ↓
//!                       deployment ←──MODEL_EXPORT (targeted)
//!                           │
//!                           └──DEPLOYMENT_STATUS──→ (broadcast)
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use workbench_bus::{ToolDescriptor, ToolSession, WeakToolBus};
use workbench_telemetry::log_tool_event;
use workbench_types::event_types as types;
use workbench_types::{CellStatus, Delivery, HandlerError, ToolEvent, ToolId};

pub const DATA_BROWSER: &str = "data-browser";
pub const NOTEBOOK: &str = "notebook";
pub const LABELING: &str = "labeling";
pub const EXPERIMENTS: &str = "experiments";
pub const DEPLOYMENT: &str = "deployment";
pub const SETTINGS: &str = "settings";

/// Shared key the notebook writes when a dataset is loaded.
pub const ACTIVE_DATASET_KEY: &str = "activeDataset";

/// Accuracy at which experiments promote a model to deployment.
pub const PROMOTION_THRESHOLD: f64 = 0.9;

/// A panel that can be mounted on the bus.
pub trait ToolPanel: Send + Sync {
    /// Static description used to build the tool catalog.
    fn descriptor(&self) -> ToolDescriptor;

    /// Register the panel's handlers on its session.
    fn mount(&self, session: &mut ToolSession);
}

/// One thing a panel noticed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    pub tool: ToolId,
    pub note: String,
}

/// Record of panel reactions, shared by every panel.
#[derive(Clone, Default)]
pub struct PanelJournal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl PanelJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tool: &str, note: impl Into<String>) {
        let note = note.into();
        log_tool_event!(info, tool, "Panel reaction", note = %note);
        self.entries.lock().push(JournalEntry {
            tool: tool.into(),
            note,
        });
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    pub fn notes_for(&self, tool: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.tool == tool)
            .map(|e| e.note.clone())
            .collect()
    }
}

/// Every built-in panel.
pub fn default_panels(journal: &PanelJournal) -> Vec<Box<dyn ToolPanel>> {
    vec![
        Box::new(DataBrowserPanel::new(journal.clone())),
        Box::new(NotebookPanel::new(journal.clone())),
        Box::new(LabelingPanel::new(journal.clone())),
        Box::new(ExperimentsPanel::new(journal.clone())),
        Box::new(DeploymentPanel::new(journal.clone())),
        Box::new(SettingsPanel::new(journal.clone())),
    ]
}

fn upgrade(bus: &WeakToolBus) -> Result<workbench_bus::ToolBus, HandlerError> {
    bus.upgrade()
        .ok_or_else(|| HandlerError::msg("tool bus has shut down"))
}

fn unexpected(tool: &str, delivery: &Delivery) -> HandlerError {
    HandlerError::msg(format!(
        "{tool} cannot handle {} payload",
        delivery.event.event_type()
    ))
}

// =============================================================================
// DATA BROWSER
// =============================================================================

pub struct DataBrowserPanel {
    journal: PanelJournal,
}

impl DataBrowserPanel {
    pub fn new(journal: PanelJournal) -> Self {
        Self { journal }
    }
}

impl ToolPanel for DataBrowserPanel {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(DATA_BROWSER, "Data Browser").handles([types::LABEL_CREATED])
    }

    fn mount(&self, session: &mut ToolSession) {
        let journal = self.journal.clone();
        session.subscribe(types::LABEL_CREATED, move |delivery| {
            let ToolEvent::LabelCreated(label) = &delivery.event else {
                return Err(unexpected(DATA_BROWSER, delivery));
            };
            journal.record(
                DATA_BROWSER,
                format!("{} labelled {} in {}", label.item_id, label.label, label.dataset_id),
            );
            Ok(())
        });
    }
}

// =============================================================================
// NOTEBOOK
// =============================================================================

pub struct NotebookPanel {
    journal: PanelJournal,
}

impl NotebookPanel {
    pub fn new(journal: PanelJournal) -> Self {
        Self { journal }
    }
}

impl ToolPanel for NotebookPanel {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(NOTEBOOK, "Notebook").handles([
            types::DATA_LOAD,
            types::NOTEBOOK_EXECUTE,
            types::SETTINGS_CHANGED,
        ])
    }

    fn mount(&self, session: &mut ToolSession) {
        let bus = session.bus().downgrade();
        let journal = self.journal.clone();
        session.subscribe(types::DATA_LOAD, move |delivery| {
            let ToolEvent::DataLoad(load) = &delivery.event else {
                return Err(unexpected(NOTEBOOK, delivery));
            };
            upgrade(&bus)?.set_shared_data(ACTIVE_DATASET_KEY, json!(load.dataset_id));
            journal.record(NOTEBOOK, format!("loaded dataset {}", load.dataset_id));
            Ok(())
        });

        let bus = session.bus().downgrade();
        let journal = self.journal.clone();
        session.subscribe(types::NOTEBOOK_EXECUTE, move |delivery| {
            let ToolEvent::NotebookExecute(exec) = &delivery.event else {
                return Err(unexpected(NOTEBOOK, delivery));
            };
            let bus = upgrade(&bus)?;
            let cell_id = exec.cell_id.clone().unwrap_or_else(|| "cell-1".to_string());
            let dataset = bus.get_shared_data(ACTIVE_DATASET_KEY).unwrap_or(Value::Null);

            journal.record(NOTEBOOK, format!("executed {}/{cell_id}", exec.notebook_id));
            bus.broadcast(
                types::NOTEBOOK_OUTPUT,
                json!({
                    "notebookId": exec.notebook_id,
                    "cellId": cell_id,
                    "status": CellStatus::Success,
                    "output": {"dataset": dataset, "accuracy": 0.93},
                }),
                NOTEBOOK,
            );
            Ok(())
        });

        let journal = self.journal.clone();
        session.subscribe(types::SETTINGS_CHANGED, move |delivery| {
            let ToolEvent::SettingsChanged(settings) = &delivery.event else {
                return Err(unexpected(NOTEBOOK, delivery));
            };
            journal.record(NOTEBOOK, format!("applied {} settings", settings.section));
            Ok(())
        });
    }
}

// =============================================================================
// LABELING
// =============================================================================

pub struct LabelingPanel {
    journal: PanelJournal,
}

impl LabelingPanel {
    pub fn new(journal: PanelJournal) -> Self {
        Self { journal }
    }
}

impl ToolPanel for LabelingPanel {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(LABELING, "Labeling").handles([types::DATA_LOAD])
    }

    fn mount(&self, session: &mut ToolSession) {
        let bus = session.bus().downgrade();
        let journal = self.journal.clone();
        session.subscribe(types::DATA_LOAD, move |delivery| {
            let ToolEvent::DataLoad(load) = &delivery.event else {
                return Err(unexpected(LABELING, delivery));
            };
            journal.record(LABELING, format!("queued {} for labelling", load.dataset_id));
            upgrade(&bus)?.broadcast(
                types::LABEL_CREATED,
                json!({
                    "datasetId": load.dataset_id,
                    "itemId": "item-0",
                    "label": "setosa",
                    "confidence": 0.8,
                }),
                LABELING,
            );
            Ok(())
        });
    }
}

// =============================================================================
// EXPERIMENTS
// =============================================================================

pub struct ExperimentsPanel {
    journal: PanelJournal,
}

impl ExperimentsPanel {
    pub fn new(journal: PanelJournal) -> Self {
        Self { journal }
    }
}

impl ToolPanel for ExperimentsPanel {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(EXPERIMENTS, "Experiments")
            .handles([types::NOTEBOOK_OUTPUT, types::EXPERIMENT_METRIC])
    }

    fn mount(&self, session: &mut ToolSession) {
        let bus = session.bus().downgrade();
        session.subscribe(types::NOTEBOOK_OUTPUT, move |delivery| {
            let ToolEvent::NotebookOutput(output) = &delivery.event else {
                return Err(unexpected(EXPERIMENTS, delivery));
            };
            let accuracy = output
                .output
                .as_ref()
                .and_then(|o| o.get("accuracy"))
                .and_then(Value::as_f64);

            if let (CellStatus::Success, Some(accuracy)) = (output.status, accuracy) {
                upgrade(&bus)?.broadcast(
                    types::EXPERIMENT_METRIC,
                    json!({
                        "experimentId": output.notebook_id,
                        "name": "accuracy",
                        "value": accuracy,
                        "step": 1,
                    }),
                    EXPERIMENTS,
                );
            }
            Ok(())
        });

        // Promotion runs off the delivery path.
        let bus = session.bus().downgrade();
        let journal = self.journal.clone();
        session.subscribe_async(types::EXPERIMENT_METRIC, move |delivery| {
            let bus = bus.clone();
            let journal = journal.clone();
            let metric = match &delivery.event {
                ToolEvent::ExperimentMetric(metric) => Some(metric.clone()),
                _ => None,
            };
            async move {
                let Some(metric) = metric else {
                    return Err(HandlerError::msg("experiments expected EXPERIMENT_METRIC"));
                };
                journal.record(
                    EXPERIMENTS,
                    format!("{} {} = {}", metric.experiment_id, metric.name, metric.value),
                );
                if metric.name != "accuracy" || metric.value < PROMOTION_THRESHOLD {
                    return Ok(());
                }

                tokio::task::yield_now().await;
                upgrade(&bus)?.send_to_tool(
                    DEPLOYMENT,
                    types::MODEL_EXPORT,
                    json!({
                        "modelId": format!("{}-model", metric.experiment_id),
                        "format": "onnx",
                        "accuracy": metric.value,
                    }),
                    EXPERIMENTS,
                );
                Ok(())
            }
        });
    }
}

// =============================================================================
// DEPLOYMENT
// =============================================================================

pub struct DeploymentPanel {
    journal: PanelJournal,
}

impl DeploymentPanel {
    pub fn new(journal: PanelJournal) -> Self {
        Self { journal }
    }
}

impl ToolPanel for DeploymentPanel {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(DEPLOYMENT, "Deployment")
            .allow_sources([EXPERIMENTS])
            .handles([types::MODEL_EXPORT])
    }

    fn mount(&self, session: &mut ToolSession) {
        let bus = session.bus().downgrade();
        let journal = self.journal.clone();
        session.subscribe(types::MODEL_EXPORT, move |delivery| {
            let ToolEvent::ModelExport(export) = &delivery.event else {
                return Err(unexpected(DEPLOYMENT, delivery));
            };
            // Broadcast exports are announcements; only targeted ones deploy.
            if delivery.target().is_none() {
                return Ok(());
            }

            journal.record(DEPLOYMENT, format!("deploying {}", export.model_id));
            upgrade(&bus)?.broadcast(
                types::DEPLOYMENT_STATUS,
                json!({
                    "deploymentId": format!("dep-{}", export.model_id),
                    "status": "running",
                    "endpoint": format!("/models/{}", export.model_id),
                }),
                DEPLOYMENT,
            );
            Ok(())
        });
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

pub struct SettingsPanel {
    journal: PanelJournal,
}

impl SettingsPanel {
    pub fn new(journal: PanelJournal) -> Self {
        Self { journal }
    }
}

impl ToolPanel for SettingsPanel {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(SETTINGS, "Settings").handles([types::SHARED_STATE_UPDATE])
    }

    fn mount(&self, session: &mut ToolSession) {
        let journal = self.journal.clone();
        session.subscribe(types::SHARED_STATE_UPDATE, move |delivery| {
            let ToolEvent::SharedStateUpdate(update) = &delivery.event else {
                return Err(unexpected(SETTINGS, delivery));
            };
            journal.record(SETTINGS, format!("{} = {}", update.key, update.value));
            Ok(())
        });
    }
}
