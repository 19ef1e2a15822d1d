//! # Access Control
//!
//! Decides whether a message may be delivered.
//!
//! ## Rules
//!
//! - Broadcasts (no target) are always allowed.
//! - Targeted messages are checked against the target's declared
//!   `allowed_sources`. A target without a list, or unknown to the directory,
//!   accepts any source.
//! - The `"system"` source is exempt from every list.
//!
//! Allow-lists are static properties of each tool's descriptor and come from
//! outside the bus through the [`ToolDirectory`] trait.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use workbench_types::{EventType, Message, ToolId};

/// A targeted message from a source the target does not accept.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unauthorized: tool {source_tool} is not allowed to message tool {target_tool}")]
pub struct AclDenied {
    pub source_tool: ToolId,
    pub target_tool: ToolId,
}

/// Static description of a tool panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub id: ToolId,
    pub name: String,
    /// Sources permitted to send this tool targeted messages. `None` allows all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_sources: Option<Vec<ToolId>>,
    /// Event types the tool intends to handle. Documentation only.
    #[serde(default)]
    pub handles: Vec<EventType>,
}

impl ToolDescriptor {
    pub fn new(id: impl Into<ToolId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            allowed_sources: None,
            handles: Vec::new(),
        }
    }

    /// Restrict targeted messages to the given sources.
    pub fn allow_sources<I, T>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ToolId>,
    {
        self.allowed_sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn handles<I, T>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        self.handles = event_types.into_iter().map(Into::into).collect();
        self
    }
}

/// Source of per-tool allow-lists.
///
/// Implementations might:
/// - Hold a static catalog built at startup
/// - Load descriptors from a plugin manifest
pub trait ToolDirectory: Send + Sync {
    /// The allow-list declared by `target`.
    ///
    /// # Returns
    ///
    /// - `Some(list)` if the tool restricts its senders
    /// - `None` if the tool is unknown or accepts any source
    fn allowed_sources(&self, target: &ToolId) -> Option<Vec<ToolId>>;
}

/// In-memory directory of tool descriptors.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: HashMap<ToolId, ToolDescriptor>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a descriptor.
    pub fn insert(&mut self, descriptor: ToolDescriptor) {
        self.tools.insert(descriptor.id.clone(), descriptor);
    }

    pub fn with(mut self, descriptor: ToolDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    /// Parse a JSON array of descriptors.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let descriptors: Vec<ToolDescriptor> = serde_json::from_str(json)?;
        Ok(descriptors.into_iter().fold(Self::new(), Self::with))
    }

    pub fn get(&self, id: &ToolId) -> Option<&ToolDescriptor> {
        self.tools.get(id)
    }

    /// Descriptors sorted by id.
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        let mut all: Vec<&ToolDescriptor> = self.tools.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolDirectory for ToolCatalog {
    fn allowed_sources(&self, target: &ToolId) -> Option<Vec<ToolId>> {
        self.tools.get(target).and_then(|d| d.allowed_sources.clone())
    }
}

/// Evaluates the allow-list rules against a [`ToolDirectory`].
#[derive(Clone)]
pub struct AccessControl {
    directory: Arc<dyn ToolDirectory>,
}

impl AccessControl {
    pub fn new(directory: Arc<dyn ToolDirectory>) -> Self {
        Self { directory }
    }

    pub fn is_allowed(&self, message: &Message) -> bool {
        self.check(message).is_ok()
    }

    /// Check a message, naming both tools on denial.
    pub fn check(&self, message: &Message) -> Result<(), AclDenied> {
        let Some(target) = &message.target_tool_id else {
            return Ok(());
        };

        if message.source_tool_id.is_system() {
            return Ok(());
        }

        match self.directory.allowed_sources(target) {
            Some(allowed) if !allowed.contains(&message.source_tool_id) => Err(AclDenied {
                source_tool: message.source_tool_id.clone(),
                target_tool: target.clone(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn acl() -> AccessControl {
        let catalog = ToolCatalog::new()
            .with(ToolDescriptor::new("deployment", "Deployment").allow_sources(["experiments"]))
            .with(ToolDescriptor::new("notebook", "Notebook"));
        AccessControl::new(Arc::new(catalog))
    }

    #[test]
    fn test_broadcast_always_allowed() {
        let msg = Message::broadcast("MODEL_EXPORT", json!({}), "labeling");
        assert!(acl().is_allowed(&msg));
    }

    #[test]
    fn test_allow_list_permits_listed_source() {
        let msg = Message::targeted("deployment", "MODEL_EXPORT", json!({}), "experiments");
        assert!(acl().is_allowed(&msg));
    }

    #[test]
    fn test_allow_list_denies_other_source() {
        let msg = Message::targeted("deployment", "MODEL_EXPORT", json!({}), "labeling");
        assert_eq!(
            acl().check(&msg),
            Err(AclDenied {
                source_tool: "labeling".into(),
                target_tool: "deployment".into(),
            })
        );
    }

    #[test]
    fn test_system_is_exempt() {
        let msg = Message::targeted("deployment", "SHARED_STATE_UPDATE", json!({}), "system");
        assert!(acl().is_allowed(&msg));
    }

    #[test]
    fn test_open_and_unknown_targets() {
        let open = Message::targeted("notebook", "NOTEBOOK_EXECUTE", json!({}), "labeling");
        assert!(acl().is_allowed(&open));

        let unknown = Message::targeted("mystery", "NOTEBOOK_EXECUTE", json!({}), "labeling");
        assert!(acl().is_allowed(&unknown));
    }

    #[test]
    fn test_empty_allow_list_denies_everyone_but_system() {
        let catalog = ToolCatalog::new()
            .with(ToolDescriptor::new("vault", "Vault").allow_sources(Vec::<ToolId>::new()));
        let acl = AccessControl::new(Arc::new(catalog));

        let msg = Message::targeted("vault", "SETTINGS_CHANGED", json!({}), "settings");
        assert!(!acl.is_allowed(&msg));

        let sys = Message::targeted("vault", "SETTINGS_CHANGED", json!({}), "system");
        assert!(acl.is_allowed(&sys));
    }

    #[test]
    fn test_catalog_from_json() {
        let catalog = ToolCatalog::from_json(
            r#"[
                {"id": "deployment", "name": "Deployment", "allowedSources": ["experiments"]},
                {"id": "notebook", "name": "Notebook", "handles": ["DATA_LOAD"]}
            ]"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.allowed_sources(&"deployment".into()),
            Some(vec![ToolId::from("experiments")])
        );
        assert_eq!(catalog.allowed_sources(&"notebook".into()), None);
        assert_eq!(
            catalog.get(&"notebook".into()).unwrap().handles,
            vec![EventType::from("DATA_LOAD")]
        );
    }
}
