//! Policy trait and built-in policies.
//!
//! A policy is a configured unit of behavior attached to one or more
//! phases. It exposes up to four optional async hooks; each hook returns
//! `Ok(None)` to pass the request along, `Ok(Some(response))` to
//! short-circuit its chain, or `Err(..)` to route the request to the
//! on-error chain.
//!
//! Rather than probing for hook methods at runtime, every policy declares
//! the phases it participates in via [`Policy::phases`]; the Gateway
//! checks that declaration when building its chains, so a policy listed
//! under a phase it does not implement is rejected at construction.
//!
//! # Built-in policies
//!
//! - [`RateLimitPolicy`]: multi-level fixed-window rate limiter (inbound)
//! - [`RetryPolicy`]: bounded retry with fixed backoff (on-error)

mod rate_limit;
mod retry;

pub use rate_limit::{LimitDimension, RateLimitConfig, RateLimitPolicy};
pub use retry::{RetryConfig, RetryPolicy};

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{Phase, RequestContext};
use crate::error::{GatewayError, Result};
use crate::request::{GatewayRequest, GatewayResponse};

/// A policy instance shared across all concurrent requests.
pub type SharedPolicy = Arc<dyn Policy>;

/// A configured unit of behavior attached to one or more phases.
///
/// Constructed once at Gateway initialization and shared by every
/// concurrent request, so any mutable state a policy holds must be
/// concurrency-safe. Per-request coordination goes through the
/// [`RequestContext`] instead.
#[async_trait]
pub trait Policy: std::fmt::Debug + Send + Sync + 'static {
    /// Get the policy name for logging.
    fn name(&self) -> &'static str;

    /// The phases this policy implements.
    ///
    /// The Gateway only accepts a chain entry when the constructed policy
    /// declares that chain's phase here.
    fn phases(&self) -> &'static [Phase];

    /// Inbound hook, run before the backend is consulted.
    ///
    /// The first inbound hook returning a response becomes the final
    /// result of the request; nothing after it runs.
    async fn inbound(
        &self,
        _request: &GatewayRequest,
        _ctx: &mut RequestContext,
    ) -> Result<Option<GatewayResponse>> {
        Ok(None)
    }

    /// Backend hook, which may satisfy the request in place of the real
    /// backend (e.g. a cache).
    async fn backend(
        &self,
        _request: &GatewayRequest,
        _ctx: &mut RequestContext,
    ) -> Result<Option<GatewayResponse>> {
        Ok(None)
    }

    /// Outbound hook, run with the backend response available.
    async fn outbound(
        &self,
        _request: &GatewayRequest,
        _response: &GatewayResponse,
        _ctx: &mut RequestContext,
    ) -> Result<Option<GatewayResponse>> {
        Ok(None)
    }

    /// Error-recovery hook. Returning a response terminates the on-error
    /// chain with that response; returning `None` declines and offers the
    /// failure to the next recovery policy.
    async fn on_error(
        &self,
        _request: &GatewayRequest,
        _error: &GatewayError,
        _ctx: &mut RequestContext,
    ) -> Result<Option<GatewayResponse>> {
        Ok(None)
    }
}
