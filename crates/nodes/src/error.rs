//! Node-level error type.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors returned by a node's `execute` method.
///
/// The engine uses the variant to attribute the failure:
/// - `Retryable`:    transient; a [`Retrying`](crate::retry::Retrying) wrapper may try again.
/// - `Fatal`:        permanent; no retry should be attempted.
/// - `MissingInput`: a required input was neither bound nor given a fallback.
/// - `Paused` / `Canceled`: the computation chose to stop; paused is recoverable.
/// - `Custom`:       free-form message plus a diagnostic context bag.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeError {
    /// Transient failure; the computation may succeed if tried again.
    #[error("retryable node error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal node error: {0}")]
    Fatal(String),

    /// A required input could not be resolved.
    #[error("missing input '{key}': {reason}")]
    MissingInput { key: String, reason: String },

    /// The computation paused itself; the caller may resume the remaining work.
    #[error("paused: {0}")]
    Paused(String),

    /// The computation was canceled and must not be resumed.
    #[error("canceled: {0}")]
    Canceled(String),

    /// Anything else, with string-keyed context for diagnostics.
    #[error("{message}")]
    Custom {
        message: String,
        context: BTreeMap<String, String>,
    },
}

impl NodeError {
    /// Shorthand for a [`NodeError::MissingInput`].
    pub fn missing_input(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingInput {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`NodeError::Custom`] without context.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context entry. No-op on variants other than `Custom`.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Custom { context, .. } = &mut self {
            context.insert(key.into(), value.into());
        }
        self
    }

    /// Whether trying again (or resuming later) could plausibly succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Retryable(_) | Self::Paused(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverability_by_kind() {
        assert!(NodeError::Retryable("429".into()).is_recoverable());
        assert!(NodeError::Paused("waiting on user".into()).is_recoverable());
        assert!(!NodeError::Fatal("bad request".into()).is_recoverable());
        assert!(!NodeError::Canceled("stop".into()).is_recoverable());
        assert!(!NodeError::missing_input("x", "unbound").is_recoverable());
    }

    #[test]
    fn context_only_attaches_to_custom() {
        let err = NodeError::custom("vendor refused").with_context("status", "403");
        match err {
            NodeError::Custom { context, .. } => assert_eq!(context["status"], "403"),
            other => panic!("unexpected {other:?}"),
        }

        let fatal = NodeError::Fatal("x".into()).with_context("ignored", "yes");
        assert_eq!(fatal, NodeError::Fatal("x".into()));
    }
}
