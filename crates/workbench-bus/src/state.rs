//! Shared key/value store visible to every tool.
//!
//! Writes overwrite unconditionally; the dispatcher announces each write with
//! a `SHARED_STATE_UPDATE` broadcast after the value is stored.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Default)]
pub struct SharedState {
    values: RwLock<HashMap<String, Value>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.write().insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.values.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_overwrites() {
        let state = SharedState::new();
        assert_eq!(state.set("k", json!(1)), None);
        assert_eq!(state.set("k", json!({"a": 2})), Some(json!(1)));
        assert_eq!(state.get("k"), Some(json!({"a": 2})));
    }

    #[test]
    fn test_missing_key() {
        let state = SharedState::new();
        assert_eq!(state.get("absent"), None);
    }

    #[test]
    fn test_keys_sorted() {
        let state = SharedState::new();
        state.set("b", json!(null));
        state.set("a", json!(true));
        assert_eq!(state.keys(), vec!["a".to_string(), "b".to_string()]);

        state.clear();
        assert!(state.is_empty());
    }
}
