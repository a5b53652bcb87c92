//! Retry-on-error policy.
//!
//! Invoked only from the on-error phase. When a failure occurred while
//! producing the backend response, re-invokes the backend capability up
//! to a bounded number of attempts with a fixed backoff between them.
//!
//! Attempt bookkeeping lives in the [`RequestContext`], so budgets are
//! per-request and a repeated listing of this policy in the on-error
//! chain continues where the previous listing left off.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{Phase, RequestContext};
use crate::error::{GatewayError, Result};
use crate::policy::Policy;
use crate::request::{GatewayRequest, GatewayResponse};

/// Configuration for the retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum backend attempts, counting the original attempt.
    pub max_attempts: u32,
    /// Fixed wait between attempts, in seconds.
    pub backoff_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_seconds: 1.0,
        }
    }
}

impl RetryConfig {
    /// The backoff as a `Duration`.
    pub fn backoff(&self) -> Duration {
        Duration::from_secs_f64(self.backoff_seconds.max(0.0))
    }
}

/// Bounded retry with fixed backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The configured attempt budget and backoff.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[async_trait]
impl Policy for RetryPolicy {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::OnError]
    }

    async fn on_error(
        &self,
        request: &GatewayRequest,
        _error: &GatewayError,
        ctx: &mut RequestContext,
    ) -> Result<Option<GatewayResponse>> {
        // Only failures attributable to the backend call are retried.
        if !matches!(ctx.phase(), Some(Phase::Backend) | Some(Phase::Outbound)) {
            return Ok(None);
        }

        let Some(invoker) = ctx.backend_invoker() else {
            return Ok(None);
        };

        let attempt_count = ctx.attempt_count();
        if attempt_count >= self.config.max_attempts {
            tracing::debug!(attempt_count, "retry budget exhausted");
            return Ok(None);
        }

        tokio::time::sleep(self.config.backoff()).await;

        ctx.set_attempt_count(attempt_count + 1);

        match invoker.invoke(request).await {
            Ok(response) => Ok(Some(response)),
            Err(retry_error) => {
                // A later on-error policy, or a repeated listing of this
                // one, may still recover the request.
                tracing::debug!(
                    attempt = attempt_count + 1,
                    error = %retry_error,
                    "retry attempt failed"
                );
                Ok(None)
            }
        }
    }
}
