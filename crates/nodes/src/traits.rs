//! The `ExecutableNode` trait: the contract every unit computation must fulfil.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::{Inputs, NodeError, Outputs};

/// Shared context passed to every node during execution.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Name of the workflow instance driving this run.
    pub workflow: String,
    /// ID of the current execution run.
    pub run_id: uuid::Uuid,
    /// Slash-separated path of the node being executed, e.g. `fanout/search`.
    pub node_path: String,
}

impl ExecutionContext {
    /// A throwaway context for calling a node outside of a workflow.
    pub fn detached(node_path: impl Into<String>) -> Self {
        Self {
            workflow: "detached".into(),
            run_id: uuid::Uuid::new_v4(),
            node_path: node_path.into(),
        }
    }
}

/// The core node trait.
///
/// Language-model calls, on-device inference and storage access all live
/// behind this seam; the engine never looks inside.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Execute the node against its resolved inputs and return the outputs
    /// it wants published.
    async fn execute(&self, inputs: Inputs, ctx: &ExecutionContext) -> Result<Outputs, NodeError>;
}

#[async_trait]
impl<N: ExecutableNode + ?Sized> ExecutableNode for Arc<N> {
    async fn execute(&self, inputs: Inputs, ctx: &ExecutionContext) -> Result<Outputs, NodeError> {
        (**self).execute(inputs, ctx).await
    }
}

type BoxedFn = dyn Fn(Inputs) -> BoxFuture<'static, Result<Outputs, NodeError>> + Send + Sync;

/// Adapts an async closure into an [`ExecutableNode`].
pub struct FnNode {
    func: Box<BoxedFn>,
}

impl FnNode {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Inputs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outputs, NodeError>> + Send + 'static,
    {
        Self {
            func: Box::new(move |inputs| -> BoxFuture<'static, Result<Outputs, NodeError>> {
                Box::pin(func(inputs))
            }),
        }
    }
}

#[async_trait]
impl ExecutableNode for FnNode {
    async fn execute(&self, inputs: Inputs, _ctx: &ExecutionContext) -> Result<Outputs, NodeError> {
        (self.func)(inputs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fn_node_sees_inputs() {
        let node = FnNode::new(|inputs: Inputs| async move {
            let x: i64 = inputs.require("x")?;
            Ok(Outputs::new().with("y", json!(x * 2)))
        });

        let mut inputs = Inputs::new();
        inputs.insert("x", json!(21));
        let out = node
            .execute(inputs, &ExecutionContext::detached("double"))
            .await
            .expect("should succeed");
        assert_eq!(out.get("y"), Some(&json!(42)));
    }
}
