//! Engine-level error types.

use std::collections::BTreeMap;

use nodes::NodeError;
use thiserror::Error;

use crate::workflow::RunState;

/// Errors produced by the workflow engine (construction, validation and execution).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    // ------ Construction / validation errors ------

    /// A reference string is not of the form `<node>.<key>`.
    #[error("invalid reference '{0}': expected '<node>.<key>'")]
    InvalidReference(String),

    /// Two nodes in the same scope share a name.
    #[error("duplicate node name '{name}' in scope '{scope}'")]
    DuplicateNodeName { scope: String, name: String },

    /// A unit binds an input to a node that does not exist in its workflow.
    #[error("node '{node}' references unknown node in '{reference}'")]
    UnknownReference { node: String, reference: String },

    /// A parallel child reads the output of one of its siblings.
    #[error("node '{node}' references parallel sibling output '{reference}'")]
    ParallelSiblingReference { node: String, reference: String },

    /// A definition names a `node_type` the registry does not know.
    #[error("node '{node}' uses unknown node type '{node_type}'")]
    UnknownNodeType { node: String, node_type: String },

    /// A registered factory rejected the node's configuration.
    #[error("node '{node}' has invalid configuration: {message}")]
    InvalidConfig { node: String, message: String },

    // ------ Execution errors ------

    /// A unit's computation failed.
    #[error("unit '{node}' failed: {source}")]
    UnitFailed {
        node: String,
        #[source]
        source: NodeError,
    },

    /// A unit could not obtain a required input.
    #[error("input resolution failed for '{node}', key '{key}': {reason}")]
    InputResolution {
        node: String,
        key: String,
        reason: String,
    },

    /// A logic node's predicate or effect failed.
    #[error("logic node '{node}' failed: {message}")]
    Logic { node: String, message: String },

    /// An operation was attempted against an instance in the wrong state.
    #[error("'{target}' is {actual}, expected {expected}")]
    InvalidState {
        target: String,
        expected: RunState,
        actual: RunState,
    },

    /// A node paused itself; the remaining work may be resumed by the caller.
    #[error("node '{node}' paused: {reason}")]
    Paused { node: String, reason: String },

    /// A node was canceled.
    #[error("node '{node}' canceled: {reason}")]
    Canceled { node: String, reason: String },

    /// Free-form failure with diagnostic context.
    #[error("node '{node}' failed: {message}")]
    Custom {
        node: String,
        message: String,
        context: BTreeMap<String, String>,
    },

    /// A nested workflow failed; `inner` carries its own failure details.
    #[error("subflow '{node}' failed at '{}': {}", .inner.node, .inner.error)]
    Subflow {
        node: String,
        inner: Box<FailureDetails>,
    },
}

impl EngineError {
    /// Attribute a unit's [`NodeError`] to the unit that raised it.
    pub fn from_unit(node: &str, err: NodeError) -> Self {
        let node = node.to_owned();
        match err {
            NodeError::MissingInput { key, reason } => Self::InputResolution { node, key, reason },
            NodeError::Paused(reason) => Self::Paused { node, reason },
            NodeError::Canceled(reason) => Self::Canceled { node, reason },
            NodeError::Custom { message, context } => Self::Custom { node, message, context },
            source @ (NodeError::Retryable(_) | NodeError::Fatal(_)) => Self::UnitFailed { node, source },
        }
    }

    /// Attribute a logic node's [`NodeError`] to the logic node.
    pub fn from_logic(node: &str, err: NodeError) -> Self {
        let node = node.to_owned();
        match err {
            NodeError::Paused(reason) => Self::Paused { node, reason },
            NodeError::Canceled(reason) => Self::Canceled { node, reason },
            NodeError::Custom { message, context } => Self::Custom { node, message, context },
            other => Self::Logic {
                node,
                message: other.to_string(),
            },
        }
    }

    /// Whether resuming or retrying the failed work could succeed.
    ///
    /// Paused is recoverable, canceled never is.  A subflow inherits the
    /// classification of the failure inside it.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Paused { .. } => true,
            Self::UnitFailed { source, .. } => source.is_recoverable(),
            Self::Subflow { inner, .. } => inner.error.is_recoverable(),
            _ => false,
        }
    }

    /// Whether this failure should end the run as `Canceled` rather than `Failed`.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Canceled { .. } => true,
            Self::Subflow { inner, .. } => inner.error.is_cancellation(),
            _ => false,
        }
    }
}

/// The first fatal error of a run, attributed to the node that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureDetails {
    /// Name of the failing node within its own workflow.
    pub node: String,
    pub error: EngineError,
}

impl FailureDetails {
    pub fn new(node: impl Into<String>, error: EngineError) -> Self {
        Self {
            node: node.into(),
            error,
        }
    }

    /// Follow subflow nesting down to the node that actually failed.
    pub fn root_cause(&self) -> &FailureDetails {
        match &self.error {
            EngineError::Subflow { inner, .. } => inner.root_cause(),
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_errors_are_classified() {
        assert!(matches!(
            EngineError::from_unit("fetch", NodeError::missing_input("url", "unbound")),
            EngineError::InputResolution { ref node, ref key, .. } if node == "fetch" && key == "url"
        ));
        assert!(matches!(
            EngineError::from_unit("fetch", NodeError::Fatal("boom".into())),
            EngineError::UnitFailed { .. }
        ));
        assert!(matches!(
            EngineError::from_logic("route", NodeError::Fatal("bad predicate".into())),
            EngineError::Logic { .. }
        ));
    }

    #[test]
    fn recoverability_follows_classification() {
        let paused = EngineError::from_unit("a", NodeError::Paused("await approval".into()));
        let canceled = EngineError::from_unit("a", NodeError::Canceled("user quit".into()));
        let transient = EngineError::from_unit("a", NodeError::Retryable("429".into()));
        assert!(paused.is_recoverable());
        assert!(!canceled.is_recoverable());
        assert!(canceled.is_cancellation());
        assert!(transient.is_recoverable());

        let nested = EngineError::Subflow {
            node: "s".into(),
            inner: Box::new(FailureDetails::new("a", paused)),
        };
        assert!(nested.is_recoverable());
    }

    #[test]
    fn root_cause_walks_nested_subflows() {
        let inner = FailureDetails::new("x", EngineError::from_unit("x", NodeError::Fatal("no".into())));
        let middle = FailureDetails::new(
            "inner",
            EngineError::Subflow {
                node: "inner".into(),
                inner: Box::new(inner.clone()),
            },
        );
        let outer = FailureDetails::new(
            "outer",
            EngineError::Subflow {
                node: "outer".into(),
                inner: Box::new(middle),
            },
        );
        assert_eq!(outer.root_cause(), &inner);
    }
}
