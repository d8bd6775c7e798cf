//! Built-in node types and the registry that maps `node_type` strings to them.
//!
//! Declarative workflows name a `node_type` plus a JSON `config`; the
//! registry turns that pair into a ready-to-run [`ExecutableNode`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{ExecutableNode, ExecutionContext, Inputs, NodeError, Outputs};

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Builds a node from its JSON configuration.
pub type NodeFactory =
    dyn Fn(&Value) -> Result<Arc<dyn ExecutableNode>, NodeError> + Send + Sync;

/// Maps `node_type` strings to node factories.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: HashMap<String, Arc<NodeFactory>>,
}

impl NodeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with every built-in node type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("constant", |config| Ok(Arc::new(Constant::from_config(config)?)));
        registry.register("passthrough", |_| Ok(Arc::new(Passthrough)));
        registry.register("delay", |config| Ok(Arc::new(Delay::from_config(config)?)));
        registry.register("fail", |config| Ok(Arc::new(Fail::from_config(config)?)));
        registry.register("sum", |_| Ok(Arc::new(Sum)));
        registry
    }

    pub fn register<F>(&mut self, node_type: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Arc<dyn ExecutableNode>, NodeError> + Send + Sync + 'static,
    {
        self.factories.insert(node_type.into(), Arc::new(factory));
    }

    /// Register an already-built node that ignores its config.
    pub fn register_instance(&mut self, node_type: impl Into<String>, node: Arc<dyn ExecutableNode>) {
        self.register(node_type, move |_| Ok(node.clone()));
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Build a node of the given type.  `None` when the type is unknown.
    pub fn build(
        &self,
        node_type: &str,
        config: &Value,
    ) -> Option<Result<Arc<dyn ExecutableNode>, NodeError>> {
        self.factories.get(node_type).map(|factory| factory(config))
    }

    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

fn parse_config<T: for<'de> Deserialize<'de>>(node_type: &str, config: &Value) -> Result<T, NodeError> {
    serde_json::from_value(config.clone())
        .map_err(|e| NodeError::Fatal(format!("invalid '{node_type}' config: {e}")))
}

// ---------------------------------------------------------------------------
// constant
// ---------------------------------------------------------------------------

/// Publishes its configuration object as outputs.
pub struct Constant {
    outputs: Outputs,
}

impl Constant {
    fn from_config(config: &Value) -> Result<Self, NodeError> {
        match config {
            Value::Object(_) | Value::Null => Ok(Self {
                outputs: Outputs::from_json(config.clone()),
            }),
            other => Err(NodeError::Fatal(format!(
                "invalid 'constant' config: expected an object, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl ExecutableNode for Constant {
    async fn execute(&self, _inputs: Inputs, _ctx: &ExecutionContext) -> Result<Outputs, NodeError> {
        Ok(self.outputs.clone())
    }
}

// ---------------------------------------------------------------------------
// passthrough
// ---------------------------------------------------------------------------

/// Publishes its resolved inputs unchanged.
pub struct Passthrough;

#[async_trait]
impl ExecutableNode for Passthrough {
    async fn execute(&self, inputs: Inputs, _ctx: &ExecutionContext) -> Result<Outputs, NodeError> {
        Ok(Outputs::from(inputs))
    }
}

// ---------------------------------------------------------------------------
// delay
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct DelayConfig {
    ms: u64,
}

/// Sleeps, then publishes its inputs.
pub struct Delay {
    duration: Duration,
}

impl Delay {
    fn from_config(config: &Value) -> Result<Self, NodeError> {
        let cfg: DelayConfig = parse_config("delay", config)?;
        Ok(Self {
            duration: Duration::from_millis(cfg.ms),
        })
    }
}

#[async_trait]
impl ExecutableNode for Delay {
    async fn execute(&self, inputs: Inputs, _ctx: &ExecutionContext) -> Result<Outputs, NodeError> {
        tokio::time::sleep(self.duration).await;
        Ok(Outputs::from(inputs))
    }
}

// ---------------------------------------------------------------------------
// fail
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum FailKind {
    #[default]
    Fatal,
    Retryable,
    Paused,
    Canceled,
}

#[derive(Deserialize)]
struct FailConfig {
    #[serde(default = "default_fail_message")]
    message: String,
    #[serde(default)]
    kind: FailKind,
}

fn default_fail_message() -> String {
    "failed on purpose".into()
}

/// Always fails.  Handy for exercising failure policies from a definition file.
pub struct Fail {
    error: NodeError,
}

impl Fail {
    fn from_config(config: &Value) -> Result<Self, NodeError> {
        let cfg: FailConfig = if config.is_null() {
            FailConfig {
                message: default_fail_message(),
                kind: FailKind::default(),
            }
        } else {
            parse_config("fail", config)?
        };
        let error = match cfg.kind {
            FailKind::Fatal => NodeError::Fatal(cfg.message),
            FailKind::Retryable => NodeError::Retryable(cfg.message),
            FailKind::Paused => NodeError::Paused(cfg.message),
            FailKind::Canceled => NodeError::Canceled(cfg.message),
        };
        Ok(Self { error })
    }
}

#[async_trait]
impl ExecutableNode for Fail {
    async fn execute(&self, _inputs: Inputs, _ctx: &ExecutionContext) -> Result<Outputs, NodeError> {
        Err(self.error.clone())
    }
}

// ---------------------------------------------------------------------------
// sum
// ---------------------------------------------------------------------------

/// Adds every numeric input and publishes the total under `sum`.
///
/// Integer inputs (signed or unsigned) are summed exactly; the result stays
/// an integer while it fits in `i64` or `u64`.  As soon as any input is a
/// float the total is an `f64`, so integers beyond 2^53 lose precision there.
pub struct Sum;

#[async_trait]
impl ExecutableNode for Sum {
    async fn execute(&self, inputs: Inputs, _ctx: &ExecutionContext) -> Result<Outputs, NodeError> {
        let mut int_total: i128 = 0;
        let mut float_total: f64 = 0.0;
        let mut saw_float = false;

        for (key, value) in inputs.iter() {
            if let Some(n) = value.as_i64() {
                int_total = int_total.saturating_add(i128::from(n));
            } else if let Some(n) = value.as_u64() {
                int_total = int_total.saturating_add(i128::from(n));
            } else if let Some(f) = value.as_f64() {
                float_total += f;
                saw_float = true;
            } else {
                return Err(NodeError::missing_input(key.as_str(), format!("expected a number, got {value}")));
            }
        }

        let sum = if saw_float {
            json!(int_total as f64 + float_total)
        } else if let Ok(n) = i64::try_from(int_total) {
            json!(n)
        } else if let Ok(n) = u64::try_from(int_total) {
            json!(n)
        } else {
            json!(int_total as f64)
        };
        Ok(Outputs::new().with("sum", sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext::detached("builtin")
    }

    #[tokio::test]
    async fn constant_publishes_config() {
        let registry = NodeRegistry::with_builtins();
        let node = registry
            .build("constant", &json!({ "greeting": "hi" }))
            .expect("registered")
            .expect("valid config");
        let out = node.execute(Inputs::new(), &ctx()).await.unwrap();
        assert_eq!(out.get("greeting"), Some(&json!("hi")));
    }

    #[tokio::test]
    async fn sum_adds_integers_and_floats() {
        let node = Sum;
        let inputs: Inputs = [("a".to_string(), json!(2)), ("b".to_string(), json!(3))]
            .into_iter()
            .collect();
        let out = node.execute(inputs, &ctx()).await.unwrap();
        assert_eq!(out.get("sum"), Some(&json!(5)));

        let inputs: Inputs = [("a".to_string(), json!(1)), ("b".to_string(), json!(0.5))]
            .into_iter()
            .collect();
        let out = node.execute(inputs, &ctx()).await.unwrap();
        assert_eq!(out.get("sum"), Some(&json!(1.5)));
    }

    #[tokio::test]
    async fn sum_keeps_large_integers_exact() {
        let inputs: Inputs = [("a".to_string(), json!(i64::MAX)), ("b".to_string(), json!(1))]
            .into_iter()
            .collect();
        let out = Sum.execute(inputs, &ctx()).await.unwrap();
        assert_eq!(out.get("sum"), Some(&json!(9_223_372_036_854_775_808u64)));

        let inputs: Inputs = [("a".to_string(), json!(u64::MAX)), ("b".to_string(), json!(-1))]
            .into_iter()
            .collect();
        let out = Sum.execute(inputs, &ctx()).await.unwrap();
        assert_eq!(out.get("sum"), Some(&json!(u64::MAX - 1)));
    }

    #[tokio::test]
    async fn fail_kind_is_configurable() {
        let registry = NodeRegistry::with_builtins();
        let node = registry
            .build("fail", &json!({ "message": "later", "kind": "paused" }))
            .unwrap()
            .unwrap();
        let err = node.execute(Inputs::new(), &ctx()).await.unwrap_err();
        assert_eq!(err, NodeError::Paused("later".into()));
    }

    #[test]
    fn unknown_type_and_bad_config() {
        let registry = NodeRegistry::with_builtins();
        assert!(registry.build("llm", &Value::Null).is_none());
        assert!(matches!(registry.build("delay", &json!({})), Some(Err(NodeError::Fatal(_)))));
        assert!(registry.node_types().contains(&"passthrough"));
    }
}
