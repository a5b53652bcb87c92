//! Per-request pipeline execution.
//!
//! A [`RequestPipeline`] walks the gateway's four chains for one request:
//!
//! 1. inbound hooks, in order — the first response short-circuits the
//!    whole pipeline;
//! 2. backend hooks, in order, under the same rule — a backend-phase
//!    policy may satisfy the request without the real backend;
//! 3. the backend invocation capability;
//! 4. a single linear outbound pass over the backend response;
//! 5. on any failure, the on-error chain — the first recovery response
//!    wins, otherwise the original error is returned to the host.
//!
//! Every request has exactly one terminal outcome: a response or a
//! propagated error, never both, never neither. Within one request the
//! chains run strictly in construction order with no internal
//! parallelism; concurrency exists only across requests, which share the
//! policy instances but never the [`RequestContext`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::BackendInvoker;
use crate::context::{Phase, RequestContext};
use crate::error::{GatewayError, Result};
use crate::gateway::Chain;
use crate::request::{GatewayRequest, GatewayResponse};

/// The per-request execution unit.
///
/// Created by [`Gateway::begin`](crate::gateway::Gateway::begin); holds
/// cheap shared references to the gateway's chains plus the bound backend
/// invocation capability.
pub struct RequestPipeline {
    inbound: Chain,
    backend: Chain,
    outbound: Chain,
    on_error: Chain,
    invoker: Arc<dyn BackendInvoker>,
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("inbound", &self.inbound.len())
            .field("backend", &self.backend.len())
            .field("outbound", &self.outbound.len())
            .field("on_error", &self.on_error.len())
            .finish()
    }
}

impl RequestPipeline {
    pub(crate) fn new(
        inbound: Chain,
        backend: Chain,
        outbound: Chain,
        on_error: Chain,
        invoker: Arc<dyn BackendInvoker>,
    ) -> Self {
        Self {
            inbound,
            backend,
            outbound,
            on_error,
            invoker,
        }
    }

    /// Run the pipeline for one request.
    ///
    /// Failures in any phase are first offered to the on-error chain;
    /// only when every recovery policy declines does the original error
    /// reach the caller.
    pub async fn run(&self, request: GatewayRequest) -> Result<GatewayResponse> {
        let mut ctx = RequestContext::new();
        ctx.set_backend_invoker(self.invoker.clone());

        match self.dispatch(&request, &mut ctx).await {
            Ok(response) => Ok(response),
            Err(error) => self.recover(&request, error, &mut ctx).await,
        }
    }

    /// Walk inbound, backend, and outbound for the request.
    async fn dispatch(
        &self,
        request: &GatewayRequest,
        ctx: &mut RequestContext,
    ) -> Result<GatewayResponse> {
        ctx.set_phase(Phase::Inbound);
        for policy in self.inbound.iter() {
            if let Some(response) = policy.inbound(request, ctx).await? {
                debug!(policy = policy.name(), "inbound short-circuit");
                return Ok(response);
            }
        }

        ctx.set_phase(Phase::Backend);
        for policy in self.backend.iter() {
            if let Some(response) = policy.backend(request, ctx).await? {
                debug!(policy = policy.name(), "backend chain short-circuit");
                return Ok(response);
            }
        }

        let backend_response = self.invoker.invoke(request).await?;

        ctx.set_phase(Phase::Outbound);
        // A single linear pass: the first hook decides. A response
        // replaces the backend response; an empty result ends outbound
        // processing and the backend response passes through unmodified.
        for policy in self.outbound.iter() {
            match policy.outbound(request, &backend_response, ctx).await? {
                Some(response) => {
                    debug!(policy = policy.name(), "outbound replaced response");
                    return Ok(response);
                }
                None => break,
            }
        }

        Ok(backend_response)
    }

    /// Offer a failure to the on-error chain.
    ///
    /// The context already records the phase in which the failure
    /// occurred and carries the backend capability for retry policies. A
    /// recovery hook that itself fails is treated as declining so the
    /// original error, not the recovery error, reaches the host.
    async fn recover(
        &self,
        request: &GatewayRequest,
        error: GatewayError,
        ctx: &mut RequestContext,
    ) -> Result<GatewayResponse> {
        let failed_phase = ctx.phase();
        debug!(phase = ?failed_phase, error = %error, "entering on-error chain");

        for policy in self.on_error.iter() {
            match policy.on_error(request, &error, ctx).await {
                Ok(Some(response)) => {
                    debug!(policy = policy.name(), "on-error chain produced a response");
                    return Ok(response);
                }
                Ok(None) => {}
                Err(recovery_error) => {
                    warn!(
                        policy = policy.name(),
                        error = %recovery_error,
                        "on-error policy failed; continuing with the original error"
                    );
                }
            }
        }

        Err(error)
    }
}
