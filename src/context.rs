//! Per-request context shared between phases.
//!
//! A [`RequestContext`] is created fresh for each request, passed by
//! mutable reference through every policy hook in that request, and
//! discarded when the request completes. It is never shared across
//! requests, so its fields need no synchronization.
//!
//! Built-in policies use the typed fields: the pipeline records the
//! current [`Phase`] as it advances (so on-error policies can see where a
//! failure occurred) and seeds the backend invocation capability; the
//! retry policy keeps its attempt count here. Host code and custom
//! policies may stash arbitrary values in the extension map.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::BackendInvoker;

/// A named point in request processing where policies may act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before the backend is consulted.
    Inbound,
    /// Producing the backend response (chain or real invocation).
    Backend,
    /// After the backend response is available.
    Outbound,
    /// Error recovery.
    OnError,
}

impl Phase {
    /// Stable lowercase name, used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Backend => "backend",
            Self::Outbound => "outbound",
            Self::OnError => "on_error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable per-request state bag.
pub struct RequestContext {
    phase: Option<Phase>,
    attempt_count: Option<u32>,
    backend: Option<Arc<dyn BackendInvoker>>,
    values: HashMap<String, serde_json::Value>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("phase", &self.phase)
            .field("attempt_count", &self.attempt_count)
            .field("has_backend", &self.backend.is_some())
            .field("values", &self.values.len())
            .finish()
    }
}

impl RequestContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            phase: None,
            attempt_count: None,
            backend: None,
            values: HashMap::new(),
        }
    }

    /// The phase currently executing, or the phase in which a failure
    /// occurred when read from an on-error hook.
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    /// Record the current phase.
    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = Some(phase);
    }

    /// Number of backend attempts made so far for this request,
    /// counting the original attempt. Defaults to 1 when unset.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.unwrap_or(1)
    }

    /// Store the attempt count.
    pub fn set_attempt_count(&mut self, count: u32) {
        self.attempt_count = Some(count);
    }

    /// The backend invocation capability, if one was seeded.
    pub fn backend_invoker(&self) -> Option<Arc<dyn BackendInvoker>> {
        self.backend.clone()
    }

    /// Seed the backend invocation capability.
    pub fn set_backend_invoker(&mut self, invoker: Arc<dyn BackendInvoker>) {
        self.backend = Some(invoker);
    }

    /// Stash an arbitrary value under a key.
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    /// Read a stashed value.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
