//! Declarative workflow definitions.
//!
//! These types are what a workflow looks like on disk (JSON).  A definition
//! is turned into a runnable [`Workflow`] with [`WorkflowDefinition::build`],
//! which looks every `node_type` up in a [`NodeRegistry`].

use std::collections::BTreeMap;
use std::time::Duration;

use nodes::{NodeRegistry, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::{ExecutionMode, Group, Logic, Node, Subflow, Unit};
use crate::reference::{Binding, Reference};
use crate::{EngineError, Workflow};

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<NodeDefinition>,
}

impl WorkflowDefinition {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Build a runnable workflow, resolving node types through `registry`.
    ///
    /// # Errors
    /// - [`EngineError::UnknownNodeType`] for an unregistered `node_type`.
    /// - [`EngineError::InvalidConfig`] when a factory rejects its config.
    /// - [`EngineError::InvalidReference`] for a malformed `ref`.
    pub fn build(&self, registry: &NodeRegistry) -> Result<Workflow, EngineError> {
        let nodes = self
            .nodes
            .iter()
            .map(|n| n.build(registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Workflow::new(&self.name, nodes).with_description(&self.description))
    }
}

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single node of the definition tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDefinition {
    Unit {
        name: String,
        #[serde(default)]
        description: String,
        /// Maps to a registered node factory.
        node_type: String,
        /// Passed to the factory when the node is built.
        #[serde(default)]
        config: Value,
        #[serde(default)]
        inputs: BTreeMap<String, BindingDefinition>,
        #[serde(default)]
        retry: Option<RetryDefinition>,
    },
    Group {
        name: String,
        #[serde(default)]
        description: String,
        mode: ExecutionMode,
        nodes: Vec<NodeDefinition>,
    },
    Subflow {
        name: String,
        #[serde(default)]
        description: String,
        workflow: WorkflowDefinition,
    },
    Branch {
        name: String,
        #[serde(default)]
        description: String,
        condition: ConditionDefinition,
        then: Box<NodeDefinition>,
        #[serde(rename = "else", default)]
        otherwise: Option<Box<NodeDefinition>>,
    },
}

impl NodeDefinition {
    pub fn name(&self) -> &str {
        match self {
            NodeDefinition::Unit { name, .. }
            | NodeDefinition::Group { name, .. }
            | NodeDefinition::Subflow { name, .. }
            | NodeDefinition::Branch { name, .. } => name,
        }
    }

    pub fn build(&self, registry: &NodeRegistry) -> Result<Node, EngineError> {
        match self {
            NodeDefinition::Unit {
                name,
                description,
                node_type,
                config,
                inputs,
                retry,
            } => {
                let task = registry
                    .build(node_type, config)
                    .ok_or_else(|| EngineError::UnknownNodeType {
                        node: name.clone(),
                        node_type: node_type.clone(),
                    })?
                    .map_err(|e| EngineError::InvalidConfig {
                        node: name.clone(),
                        message: e.to_string(),
                    })?;

                let mut unit = Unit::from_arc(name, task).describe(description);
                for (key, binding) in inputs {
                    unit = unit.input(key, binding.to_binding()?);
                }
                if let Some(retry) = retry {
                    unit = unit.with_retry(retry.to_policy(name)?);
                }
                Ok(unit.into())
            }
            NodeDefinition::Group {
                name,
                description,
                mode,
                nodes,
            } => {
                let children = nodes
                    .iter()
                    .map(|n| n.build(registry))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Group::new(name, *mode, children).describe(description).into())
            }
            NodeDefinition::Subflow {
                name,
                description,
                workflow,
            } => {
                let nested = workflow.build(registry)?;
                let mut subflow = Subflow::new(name, nested);
                if !description.is_empty() {
                    subflow = subflow.describe(description);
                }
                Ok(subflow.into())
            }
            NodeDefinition::Branch {
                name,
                description,
                condition,
                then,
                otherwise,
            } => {
                let reference = Reference::parse(&condition.reference)?;
                let equals = condition.equals.clone();
                let then = then.build(registry)?;
                let otherwise = otherwise
                    .as_ref()
                    .map(|n| n.build(registry))
                    .transpose()?;

                let logic = Logic::branch(
                    name,
                    move |view| {
                        let value = view.lookup(&reference);
                        Ok(match &equals {
                            Some(expected) => value == Some(expected),
                            None => value.is_some_and(is_truthy),
                        })
                    },
                    then,
                    otherwise,
                );
                Ok(logic.describe(description).into())
            }
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Bindings, conditions, retry
// ---------------------------------------------------------------------------

/// `{"ref": "node.key"}`: exactly one field, nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceDefinition {
    #[serde(rename = "ref")]
    pub reference: String,
}

/// An input binding on disk: a `{"ref": ...}` object, or any literal JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindingDefinition {
    Reference(ReferenceDefinition),
    Literal(Value),
}

impl BindingDefinition {
    pub fn to_binding(&self) -> Result<Binding, EngineError> {
        match self {
            BindingDefinition::Reference(r) => Binding::reference(&r.reference),
            BindingDefinition::Literal(v) => Ok(Binding::Literal(v.clone())),
        }
    }
}

/// Branch condition: the referenced value equals `equals`, or (without
/// `equals`) exists and is truthy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionDefinition {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub equals: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryDefinition {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl RetryDefinition {
    /// Check the settings and turn them into a [`RetryPolicy`] for `node`.
    ///
    /// # Errors
    /// [`EngineError::InvalidConfig`] when `max_attempts` is zero or
    /// `multiplier` is negative or not finite.
    pub fn to_policy(&self, node: &str) -> Result<RetryPolicy, EngineError> {
        let invalid = |message: String| EngineError::InvalidConfig {
            node: node.to_owned(),
            message,
        };
        if self.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1".into()));
        }
        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return Err(invalid(format!(
                "retry.multiplier must be a finite, non-negative number, got {}",
                self.multiplier
            )));
        }
        Ok(RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.multiplier,
        )
        .with_max_delay(Duration::from_millis(self.max_delay_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunState;
    use serde_json::json;

    const PIPELINE: &str = r#"{
        "name": "pipeline",
        "nodes": [
            { "kind": "unit", "name": "A", "node_type": "constant", "config": { "x": 1 } },
            { "kind": "unit", "name": "B", "node_type": "sum",
              "inputs": { "x": { "ref": "A.x" }, "one": 1 } },
            { "kind": "group", "name": "fan", "mode": "parallel", "nodes": [
                { "kind": "unit", "name": "ok", "node_type": "constant", "config": { "v": "yes" } },
                { "kind": "unit", "name": "bad", "node_type": "fail" }
            ] },
            { "kind": "branch", "name": "route",
              "condition": { "ref": "B.sum", "equals": 2 },
              "then": { "kind": "unit", "name": "big", "node_type": "constant", "config": { "hit": true } },
              "else": { "kind": "unit", "name": "small", "node_type": "constant", "config": { "hit": false } } }
        ]
    }"#;

    #[tokio::test]
    async fn definition_builds_and_runs() {
        let def = WorkflowDefinition::from_json(PIPELINE).expect("valid json");
        let mut wf = def.build(&NodeRegistry::with_builtins()).expect("builds");
        assert!(wf.validate().is_ok());

        assert_eq!(wf.start().await, RunState::Completed);
        assert_eq!(wf.output::<i64>("B.sum"), Some(2));
        assert_eq!(wf.output::<String>("ok.v").as_deref(), Some("yes"));
        assert_eq!(wf.output::<bool>("big.hit"), Some(true));
        assert_eq!(wf.output::<String>("route.branch").as_deref(), Some("then"));
        assert!(!wf.outputs().contains("small.hit"));
        assert_eq!(wf.absorbed_failures().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn demo_pipeline_runs() {
        let def = WorkflowDefinition::from_json(include_str!("../../../demos/pipeline.json"))
            .expect("demo parses");
        let mut wf = def.build(&NodeRegistry::with_builtins()).expect("demo builds");
        assert!(wf.validate().is_ok());

        assert_eq!(wf.start().await, RunState::Completed);
        assert_eq!(wf.output::<i64>("total.sum"), Some(3));
        assert_eq!(wf.output::<bool>("expected.ok"), Some(true));
        assert_eq!(wf.absorbed_failures().len(), 1);
        assert_eq!(wf.absorbed_failures()[0].node, "flaky");
    }

    #[test]
    fn ref_objects_with_extra_fields_are_literals() {
        let b: BindingDefinition = serde_json::from_value(json!({ "ref": "A.x" })).unwrap();
        assert!(matches!(b.to_binding().unwrap(), Binding::Reference(_)));

        let b: BindingDefinition =
            serde_json::from_value(json!({ "ref": "A.x", "note": "literal" })).unwrap();
        assert!(matches!(b.to_binding().unwrap(), Binding::Literal(_)));
    }

    #[test]
    fn unknown_node_type_is_reported() {
        let def = WorkflowDefinition::from_json(
            r#"{ "name": "x", "nodes": [ { "kind": "unit", "name": "q", "node_type": "llm" } ] }"#,
        )
        .unwrap();
        assert!(matches!(
            def.build(&NodeRegistry::with_builtins()),
            Err(EngineError::UnknownNodeType { node, node_type }) if node == "q" && node_type == "llm"
        ));
    }

    #[test]
    fn malformed_reference_is_reported() {
        let def = WorkflowDefinition::from_json(
            r#"{ "name": "x", "nodes": [
                { "kind": "unit", "name": "q", "node_type": "passthrough", "inputs": { "a": { "ref": "nodot" } } }
            ] }"#,
        )
        .unwrap();
        assert!(matches!(
            def.build(&NodeRegistry::with_builtins()),
            Err(EngineError::InvalidReference(r)) if r == "nodot"
        ));
    }

    #[test]
    fn retry_defaults() {
        let retry: RetryDefinition = serde_json::from_value(json!({})).unwrap();
        assert_eq!(retry.to_policy("q").unwrap(), RetryPolicy::default());
    }

    fn failing_with_retry(retry: Value) -> String {
        json!({
            "name": "retrying",
            "nodes": [
                { "kind": "unit", "name": "f", "node_type": "fail",
                  "config": { "message": "flaky", "kind": "retryable" },
                  "retry": retry }
            ]
        })
        .to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn huge_retry_multiplier_fails_the_run_cleanly() {
        let json = failing_with_retry(json!({ "max_attempts": 3, "base_delay_ms": 100, "multiplier": 1e300 }));
        let mut wf = WorkflowDefinition::from_json(&json)
            .unwrap()
            .build(&NodeRegistry::with_builtins())
            .expect("large but finite multiplier is accepted");

        assert_eq!(wf.start().await, RunState::Failed);
        assert_eq!(wf.failure().map(|f| f.node.as_str()), Some("f"));
    }

    #[test]
    fn invalid_retry_settings_are_rejected() {
        for retry in [json!({ "max_attempts": 0 }), json!({ "multiplier": -1.5 })] {
            let def = WorkflowDefinition::from_json(&failing_with_retry(retry)).unwrap();
            assert!(matches!(
                def.build(&NodeRegistry::with_builtins()),
                Err(EngineError::InvalidConfig { node, .. }) if node == "f"
            ));
        }
    }
}
