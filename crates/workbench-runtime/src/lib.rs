//! # Workbench Runtime Library
//!
//! Composition root of the workbench. Exposes the runtime pieces for testing;
//! the entry point is the `main.rs` binary.
//!
//! ## Startup Sequence
//!
//! 1. Build the tool catalog (built-in panel descriptors, or `WB_TOOL_CATALOG`)
//! 2. Create the [`ToolBus`]
//! 3. Attach the diagnostics monitor
//! 4. Publish the project id to shared state
//! 5. Mount every panel through its own [`ToolSession`]

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod monitor;
pub mod panels;
pub mod scenario;

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use workbench_bus::{BusError, ToolBus, ToolCatalog, ToolSession};

pub use config::{RuntimeConfig, RuntimeConfigError};
pub use monitor::{DiagnosticsMonitor, DiagnosticsSnapshot};
pub use panels::{default_panels, PanelJournal, ToolPanel};

/// Shared key holding the open project.
pub const PROJECT_KEY: &str = "projectId";

/// Errors building the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] RuntimeConfigError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("failed to read tool catalog {path:?}: {source}")]
    CatalogRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse tool catalog {path:?}: {source}")]
    CatalogParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// The running workbench: bus, mounted panels and diagnostics.
pub struct WorkbenchRuntime {
    bus: ToolBus,
    sessions: Vec<ToolSession>,
    monitor: DiagnosticsMonitor,
    journal: PanelJournal,
}

impl WorkbenchRuntime {
    /// Build the bus and mount the built-in panels.
    pub fn new(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let journal = PanelJournal::new();
        let panels = default_panels(&journal);
        let catalog = load_catalog(config, &panels)?;
        info!(tools = catalog.len(), "Tool catalog ready");

        let bus = ToolBus::new(config.bus.clone(), Arc::new(catalog))?;
        let monitor = DiagnosticsMonitor::attach(&bus);
        bus.set_shared_data(PROJECT_KEY, json!(config.project_id));

        let sessions = panels
            .iter()
            .map(|panel| {
                let mut session = bus.open_session(panel.descriptor().id);
                panel.mount(&mut session);
                info!(
                    tool = %session.tool_id(),
                    subscriptions = session.subscription_count(),
                    "Panel mounted"
                );
                session
            })
            .collect();

        Ok(Self {
            bus,
            sessions,
            monitor,
            journal,
        })
    }

    pub fn bus(&self) -> &ToolBus {
        &self.bus
    }

    pub fn journal(&self) -> &PanelJournal {
        &self.journal
    }

    pub fn monitor(&self) -> &DiagnosticsMonitor {
        &self.monitor
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.monitor.snapshot(&self.bus)
    }

    /// Unmount every panel, then tear the bus down.
    pub fn shutdown(self) {
        info!("Initiating workbench shutdown...");
        for session in self.sessions {
            session.close();
        }
        self.bus.shutdown();
    }
}

fn load_catalog(
    config: &RuntimeConfig,
    panels: &[Box<dyn ToolPanel>],
) -> Result<ToolCatalog, RuntimeError> {
    let Some(path) = &config.catalog_path else {
        return Ok(panels
            .iter()
            .fold(ToolCatalog::new(), |catalog, panel| catalog.with(panel.descriptor())));
    };

    let json = std::fs::read_to_string(path).map_err(|source| RuntimeError::CatalogRead {
        path: path.clone(),
        source,
    })?;
    ToolCatalog::from_json(&json).map_err(|source| RuntimeError::CatalogParse {
        path: path.clone(),
        source,
    })
}
