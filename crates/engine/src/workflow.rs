//! The engine instance: a named root sequence of nodes plus everything one
//! run produces (state, output store, failure details, history).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver;
use crate::node::{Node, NodeKind};
use crate::store::OutputStore;
use crate::{EngineError, FailureDetails};

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// Lifecycle of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Canceled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::NotStarted => "not_started",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Execution history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Succeeded,
    Failed,
}

/// One node that began executing during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    /// Slash-separated path from the root, e.g. `fanout/search`.
    pub path: String,
    pub kind: NodeKind,
    pub status: NodeStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A single-invocation execution graph.
///
/// Build it from a root sequence of nodes, call [`Workflow::start`], then
/// inspect [`Workflow::state`], [`Workflow::failure`] and
/// [`Workflow::outputs`].  The output store is only written during `start`.
pub struct Workflow {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) state: RunState,
    pub(crate) store: OutputStore,
    pub(crate) nodes: Vec<Node>,
    pub(crate) failure: Option<FailureDetails>,
    pub(crate) absorbed: Vec<FailureDetails>,
    pub(crate) history: Vec<NodeExecution>,
    pub(crate) run_id: Option<Uuid>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            state: RunState::NotStarted,
            store: OutputStore::new(),
            nodes,
            failure: None,
            absorbed: Vec::new(),
            history: Vec::new(),
            run_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Everything published so far.
    pub fn outputs(&self) -> &OutputStore {
        &self.store
    }

    /// Typed read of one namespaced key; `None` when absent or mistyped.
    pub fn output<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.store.get_as(key)
    }

    /// The first failure that aborted a sequential scope, if any.
    pub fn failure(&self) -> Option<&FailureDetails> {
        self.failure.as_ref()
    }

    /// Failures inside parallel groups that did not stop the run.
    pub fn absorbed_failures(&self) -> &[FailureDetails] {
        &self.absorbed
    }

    pub fn history(&self) -> &[NodeExecution] {
        &self.history
    }

    /// Paths of every node that began executing, in completion order.
    pub fn executed_paths(&self) -> Vec<&str> {
        self.history.iter().map(|e| e.path.as_str()).collect()
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    /// Run every node to a terminal state.
    ///
    /// Never returns an error: failures are captured in [`Workflow::failure`].
    /// On an instance that is not `NotStarted` this does nothing and returns
    /// the current state; call [`Workflow::reset`] first to run again.
    pub async fn start(&mut self) -> RunState {
        driver::run_workflow(self).await
    }

    /// Start (if needed) and return the full output store.
    pub async fn start_and_collect(&mut self) -> &OutputStore {
        self.start().await;
        &self.store
    }

    /// Start (if needed) and return one typed output.
    pub async fn start_and_get<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        self.start().await;
        self.output(key)
    }

    /// Like [`Workflow::start`], but surfaces a non-completed run as an error.
    pub async fn run(&mut self) -> Result<&OutputStore, EngineError> {
        if self.state != RunState::NotStarted {
            return Err(EngineError::InvalidState {
                target: self.name.clone(),
                expected: RunState::NotStarted,
                actual: self.state,
            });
        }
        match self.start().await {
            RunState::Completed => Ok(&self.store),
            actual => Err(self
                .failure
                .as_ref()
                .map(|f| f.error.clone())
                .unwrap_or(EngineError::InvalidState {
                    target: self.name.clone(),
                    expected: RunState::Completed,
                    actual,
                })),
        }
    }

    /// Discard the results of a previous run so the instance can start again.
    pub fn reset(&mut self) {
        self.state = RunState::NotStarted;
        self.store.clear();
        self.failure = None;
        self.absorbed.clear();
        self.history.clear();
        self.run_id = None;
        self.nodes.iter_mut().for_each(Node::reset);
    }

    /// Check name uniqueness and reference targets.  See [`crate::validate`].
    pub fn validate(&self) -> Result<(), EngineError> {
        crate::validate::validate(&self.nodes)
    }

    /// Indented, human-readable tree of the workflow.
    pub fn outline(&self) -> String {
        let mut out = format!("{}\n", self.name);
        for node in &self.nodes {
            node.write_outline(1, &mut out);
        }
        out
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("nodes", &self.nodes)
            .field("outputs", &self.store.len())
            .field("failure", &self.failure)
            .finish()
    }
}
