//! Retry wrapper around any [`ExecutableNode`].
//!
//! Attempts are capped, the delay grows exponentially between attempts, and a
//! caller-supplied predicate decides whether a failure is worth retrying.  The
//! last error is returned once attempts run out or the predicate says no.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ExecutableNode, ExecutionContext, Inputs, NodeError, Outputs};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Tuning knobs for a [`Retrying`] wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Factor applied to the delay after every further attempt.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    #[serde(default = "default_max_delay")]
    pub max_delay: Duration,
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: default_max_delay(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
            max_delay: default_max_delay(),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to wait after the given (1-based) failed attempt, saturating at
    /// `max_delay` when the exponential factor overflows.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.max(0.0).powi(exponent);
        if !secs.is_finite() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

// ---------------------------------------------------------------------------
// Wrapper
// ---------------------------------------------------------------------------

type RecoverablePredicate = dyn Fn(&NodeError) -> bool + Send + Sync;

/// Wraps a node so recoverable failures are retried with exponential back-off.
pub struct Retrying<N> {
    inner: N,
    policy: RetryPolicy,
    is_recoverable: Arc<RecoverablePredicate>,
}

impl<N: ExecutableNode> Retrying<N> {
    /// Retry [`NodeError::Retryable`] failures only.  A paused node is left
    /// for the caller to resume, not tried again.
    pub fn new(inner: N, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            is_recoverable: Arc::new(|err: &NodeError| matches!(err, NodeError::Retryable(_))),
        }
    }

    /// Replace the recoverability predicate.
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&NodeError) -> bool + Send + Sync + 'static,
    {
        self.is_recoverable = Arc::new(predicate);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<N: ExecutableNode> ExecutableNode for Retrying<N> {
    async fn execute(&self, inputs: Inputs, ctx: &ExecutionContext) -> Result<Outputs, NodeError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match self.inner.execute(inputs.clone(), ctx).await {
                Ok(outputs) => return Ok(outputs),
                Err(err) => {
                    if attempt >= max_attempts || !(self.is_recoverable)(&err) {
                        return Err(err);
                    }

                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        node = %ctx.node_path,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying node"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
