//! Resolved inputs handed to a node, and the outputs it hands back.
//!
//! Values are `serde_json::Value` throughout.  Typed access goes through
//! `serde_json::from_value`, so a value of the wrong shape reads as absent
//! instead of panicking.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::NodeError;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// The concrete input mapping a node sees at execution time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    values: BTreeMap<String, Value>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed read.  `None` when the key is absent or the value does not
    /// deserialize into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Two-tier lookup: the resolved binding first, `fallback` second.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        self.get_as(key).unwrap_or(fallback)
    }

    /// Typed read that reports a [`NodeError::MissingInput`] when absent.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, NodeError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| NodeError::missing_input(key, "no value bound or resolved"))?;
        serde_json::from_value(value.clone())
            .map_err(|e| NodeError::missing_input(key, format!("unexpected type: {e}")))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// The inputs as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone().into_iter().collect())
    }
}

impl FromIterator<(String, Value)> for Inputs {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Keys a node produced.  The engine publishes each one as `"<node>.<key>"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs {
    values: BTreeMap<String, Value>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object literal.  Non-object values yield a single
    /// `"value"` key.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self {
                values: map.into_iter().collect(),
            },
            Value::Null => Self::default(),
            other => {
                let mut out = Self::default();
                out.insert("value", other);
                out
            }
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

impl IntoIterator for Outputs {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl From<Inputs> for Outputs {
    fn from(inputs: Inputs) -> Self {
        Self {
            values: inputs.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs() -> Inputs {
        [
            ("count".to_string(), json!(3)),
            ("label".to_string(), json!("hello")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn typed_read_falls_back_on_wrong_type() {
        let inputs = inputs();
        assert_eq!(inputs.get_as::<i64>("count"), Some(3));
        assert_eq!(inputs.get_as::<i64>("label"), None);
        assert_eq!(inputs.get_or("label", 7i64), 7);
        assert_eq!(inputs.get_or("missing", "dflt".to_string()), "dflt");
    }

    #[test]
    fn require_reports_missing_key() {
        let err = inputs().require::<String>("prompt").unwrap_err();
        assert!(matches!(err, NodeError::MissingInput { ref key, .. } if key == "prompt"));
    }

    #[test]
    fn outputs_from_non_object_use_value_key() {
        let out = Outputs::from_json(json!(42));
        assert_eq!(out.get("value"), Some(&json!(42)));
        assert!(Outputs::from_json(Value::Null).is_empty());
    }
}
