//! The backend invocation capability.
//!
//! The host framework supplies the function that performs the actual
//! downstream call being gated. The engine never talks to a backend
//! directly; it only ever goes through a [`BackendInvoker`] handed to
//! [`Gateway::begin`](crate::gateway::Gateway::begin). The same capability
//! is stored in the request context so the retry policy can re-invoke it.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{GatewayRequest, GatewayResponse};

/// Capability for invoking the real backend.
///
/// Implementations must be thread-safe; a single invoker is shared by
/// every pipeline the gateway starts.
#[async_trait]
pub trait BackendInvoker: Send + Sync {
    /// Perform the backend call for the given request.
    async fn invoke(&self, request: &GatewayRequest) -> Result<GatewayResponse>;
}

#[async_trait]
impl<B: BackendInvoker + ?Sized> BackendInvoker for Arc<B> {
    async fn invoke(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
        (**self).invoke(request).await
    }
}

/// A backend invoker built from an async closure.
///
/// The closure receives an owned clone of the request so its future does
/// not borrow from the caller.
///
/// # Example
///
/// ```ignore
/// use gatekit::{FnBackend, GatewayResponse};
///
/// let backend = FnBackend::new(|request| async move {
///     Ok(GatewayResponse::ok(format!("handled {}", request.path())))
/// });
/// ```
pub struct FnBackend<F> {
    invoke_fn: F,
}

impl<F> std::fmt::Debug for FnBackend<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnBackend").finish()
    }
}

impl<F> FnBackend<F> {
    /// Create a new closure-backed invoker.
    pub fn new(invoke_fn: F) -> Self {
        Self { invoke_fn }
    }
}

#[async_trait]
impl<F, Fut> BackendInvoker for FnBackend<F>
where
    F: Fn(GatewayRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<GatewayResponse>> + Send + 'static,
{
    async fn invoke(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
        (self.invoke_fn)(request.clone()).await
    }
}
