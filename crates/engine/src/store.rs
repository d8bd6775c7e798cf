//! The output store and read-only views over it.
//!
//! Keys are `"<node>.<key>"`.  Only the driver writes; node bodies, the
//! resolver and logic predicates see a [`StoreView`].

use std::collections::HashMap;

use nodes::Outputs;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::reference::Reference;

/// Flat, namespaced mapping of every output produced in one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputStore {
    entries: HashMap<String, Value>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Typed read.  `None` when the key was never written or the value does
    /// not deserialize into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.entries
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn lookup(&self, reference: &Reference) -> Option<&Value> {
        self.entries.get(&reference.store_key())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Entries as a JSON object (sorted by key).
    pub fn to_json(&self) -> Value {
        let mut entries: Vec<(&String, &Value)> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Publish a node's outputs under `"<node>.<key>"`.  Later writes win.
    pub(crate) fn publish(&mut self, node: &str, outputs: Outputs) {
        for (key, value) in outputs {
            self.entries.insert(format!("{node}.{key}"), value);
        }
    }

    pub(crate) fn insert(&mut self, key: String, value: Value) {
        self.entries.insert(key, value);
    }

    /// Fold another store's entries into this one.  Later writes win.
    pub(crate) fn merge(&mut self, other: OutputStore) {
        self.entries.extend(other.entries);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Read-only, layered view: writes made in the current scope shadow the
/// enclosing scope's store.
#[derive(Debug, Clone, Copy)]
pub struct StoreView<'a> {
    local: &'a OutputStore,
    parent: Option<&'a StoreView<'a>>,
}

impl<'a> StoreView<'a> {
    pub fn new(store: &'a OutputStore) -> Self {
        Self {
            local: store,
            parent: None,
        }
    }

    pub(crate) fn layered(local: &'a OutputStore, parent: Option<&'a StoreView<'a>>) -> Self {
        Self { local, parent }
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        match self.local.get(key) {
            Some(v) => Some(v),
            None => self.parent.and_then(|p| p.get(key)),
        }
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn lookup(&self, reference: &Reference) -> Option<&'a Value> {
        self.get(&reference.store_key())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}
