//! `MockNode`: a test double for `ExecutableNode`.
//!
//! Useful in unit and integration tests where a real node implementation is
//! either unavailable or irrelevant.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{traits::ExecutionContext, ExecutableNode, Inputs, NodeError, Outputs};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Return the given JSON object as outputs.
    ReturnValue(Value),
    /// Echo the resolved inputs back as outputs.
    Echo,
    /// Fail with the given error.
    Fail(NodeError),
}

/// A mock node that records every call it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    /// What the node will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All inputs seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<Inputs>>>,
    delay: Option<Duration>,
    fail_first: AtomicU32,
    transient: Option<NodeError>,
    finished: AtomicUsize,
}

impl MockNode {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
            fail_first: AtomicU32::new(0),
            transient: None,
            finished: AtomicUsize::new(0),
        }
    }

    /// Create a mock that always succeeds with the given outputs.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that publishes exactly what it was given.
    pub fn echo(name: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Echo)
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(NodeError::Fatal(msg.into())))
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(NodeError::Retryable(msg.into())))
    }

    /// Create a mock that always fails with the given error.
    pub fn failing(name: impl Into<String>, err: NodeError) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(err))
    }

    /// Sleep for `delay` before producing a result.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the first `times` calls with `err`, then behave normally.
    pub fn fail_first(mut self, times: u32, err: NodeError) -> Self {
        self.fail_first = AtomicU32::new(times);
        self.transient = Some(err);
        self
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of calls that ran to the end (success or failure).
    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Inputs of the most recent call.
    pub fn last_inputs(&self) -> Option<Inputs> {
        self.calls.lock().unwrap().last().cloned()
    }

    fn take_transient(&self) -> Option<NodeError> {
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining == 0 {
            return None;
        }
        self.fail_first.store(remaining - 1, Ordering::SeqCst);
        self.transient.clone()
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    async fn execute(&self, inputs: Inputs, _ctx: &ExecutionContext) -> Result<Outputs, NodeError> {
        self.calls.lock().unwrap().push(inputs.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match (self.take_transient(), &self.behaviour) {
            (Some(err), _) => Err(err),
            (None, MockBehaviour::ReturnValue(v)) => Ok(Outputs::from_json(v.clone())),
            (None, MockBehaviour::Echo) => Ok(Outputs::from(inputs)),
            (None, MockBehaviour::Fail(err)) => Err(err.clone()),
        };

        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}
