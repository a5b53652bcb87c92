//! Composable policy-chain gateway engine.
//!
//! `gatekit` applies an ordered, configurable chain of policies to every
//! inbound request before, during, and after it reaches a backend
//! handler, and runs a separate error-recovery chain when any phase
//! fails:
//!
//! - **Four phases**: inbound, backend, outbound, and on-error, each an
//!   ordered chain with short-circuit semantics
//! - **Multi-level rate limiting**: global, per-IP, per-user, and
//!   per-user-per-IP fixed windows with per-key locking
//! - **Bounded retry**: re-invoke the backend on failure with fixed
//!   backoff, budgeted per request
//! - **Transport-agnostic**: the host framework owns HTTP; the engine
//!   sees plain request/response values and a backend capability
//!
//! # Quick Start
//!
//! ```ignore
//! use gatekit::{default_registry, FnBackend, Gateway, GatewayConfig, GatewayRequest, GatewayResponse};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> gatekit::Result<()> {
//!     // The host's config loader hands the engine resolved chain config.
//!     let config: GatewayConfig = serde_json::from_str(r#"{
//!         "globalPolicies": {
//!             "inbound": [{"rate_limit": {"requests_per_minute_per_ip": 120}}],
//!             "onError": [{"retry": {"max_attempts": 3, "backoff_seconds": 0.5}}]
//!         }
//!     }"#).expect("valid config");
//!
//!     let gateway = Gateway::from_config(&config, &default_registry())?;
//!
//!     // The capability that performs the actual downstream call.
//!     let backend = Arc::new(FnBackend::new(|request: GatewayRequest| async move {
//!         Ok(GatewayResponse::ok(format!("handled {}", request.path())))
//!     }));
//!
//!     let request = GatewayRequest::new("GET", "/api/orders")
//!         .with_client_ip("203.0.113.9".parse().unwrap());
//!     let response = gateway.begin(backend).run(request).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`gateway`] - chain construction and the host-facing entry point
//! - [`pipeline`] - the per-request state machine
//! - [`policy`] - the `Policy` trait and built-in policies
//! - [`registry`] - policy id to constructor mapping
//! - [`config`] - the resolved configuration shape
//! - [`request`] - engine-boundary request/response types
//! - [`context`] - per-request context shared between phases
//! - [`backend`] - the backend invocation capability
//! - [`error`] - error taxonomy

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod request;

// Re-export main types
pub use backend::{BackendInvoker, FnBackend};
pub use config::{GatewayConfig, PhasePolicies, PolicyEntry};
pub use context::{Phase, RequestContext};
pub use error::{BackendError, ConfigError, GatewayError, Result};
pub use gateway::Gateway;
pub use pipeline::RequestPipeline;
pub use registry::{default_registry, PolicyConstructor, PolicyRegistry};
pub use request::{GatewayRequest, GatewayResponse};

// Re-export policy types
pub use policy::{
    LimitDimension, Policy, RateLimitConfig, RateLimitPolicy, RetryConfig, RetryPolicy,
    SharedPolicy,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::backend::{BackendInvoker, FnBackend};
    pub use crate::config::{GatewayConfig, PhasePolicies, PolicyEntry};
    pub use crate::context::{Phase, RequestContext};
    pub use crate::error::{GatewayError, Result};
    pub use crate::gateway::Gateway;
    pub use crate::policy::{Policy, RateLimitConfig, RateLimitPolicy, RetryConfig, RetryPolicy};
    pub use crate::registry::{default_registry, PolicyRegistry};
    pub use crate::request::{GatewayRequest, GatewayResponse};
}
