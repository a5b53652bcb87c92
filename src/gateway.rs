//! Gateway construction: resolving configuration into policy chains.
//!
//! A [`Gateway`] owns exactly four ordered policy chains, built once from
//! a resolved [`GatewayConfig`] and a [`PolicyRegistry`]. Construction is
//! all-or-nothing: an unknown policy id, an invalid policy configuration,
//! or a policy listed under a phase it does not implement aborts with an
//! error and no partially-initialized Gateway exists.
//!
//! After construction the chains are immutable; reading them concurrently
//! needs no synchronization. [`Gateway::begin`] starts a
//! [`RequestPipeline`](crate::pipeline::RequestPipeline) bound to the
//! chains and a host-supplied backend invocation capability.
//!
//! # Example
//!
//! ```ignore
//! use gatekit::{default_registry, FnBackend, Gateway, GatewayConfig, GatewayResponse};
//! use std::sync::Arc;
//!
//! let config: GatewayConfig = serde_json::from_str(r#"{
//!     "globalPolicies": {
//!         "inbound": [{"rate_limit": {"requests_per_minute": 600}}],
//!         "onError": [{"retry": {"max_attempts": 3}}]
//!     }
//! }"#)?;
//!
//! let gateway = Gateway::from_config(&config, &default_registry())?;
//! let backend = Arc::new(FnBackend::new(|_req| async {
//!     Ok(GatewayResponse::ok("hello"))
//! }));
//!
//! let response = gateway.begin(backend).run(request).await?;
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::BackendInvoker;
use crate::config::{GatewayConfig, PolicyEntry};
use crate::context::Phase;
use crate::error::{ConfigError, Result};
use crate::pipeline::RequestPipeline;
use crate::policy::SharedPolicy;
use crate::registry::PolicyRegistry;

/// An ordered, immutable policy chain for one phase.
pub(crate) type Chain = Arc<Vec<SharedPolicy>>;

/// The gateway execution engine: four ordered policy chains.
pub struct Gateway {
    inbound: Chain,
    backend: Chain,
    outbound: Chain,
    on_error: Chain,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("inbound", &self.inbound.len())
            .field("backend", &self.backend.len())
            .field("outbound", &self.outbound.len())
            .field("on_error", &self.on_error.len())
            .finish()
    }
}

impl Gateway {
    /// Build a gateway from a resolved configuration and a registry.
    ///
    /// For each phase, in declaration order: the policy id is resolved
    /// (failing with [`ConfigError::UnknownPolicy`]), the entry's
    /// configuration is parsed by the policy's constructor (failing with
    /// [`ConfigError::InvalidPolicyConfig`]), and the constructed policy
    /// must declare the phase among its capabilities.
    pub fn from_config(config: &GatewayConfig, registry: &PolicyRegistry) -> Result<Self> {
        info!("initializing gateway");

        let policies = &config.global_policies;
        let gateway = Self {
            inbound: build_chain(Phase::Inbound, &policies.inbound, registry)?,
            backend: build_chain(Phase::Backend, &policies.backend, registry)?,
            outbound: build_chain(Phase::Outbound, &policies.outbound, registry)?,
            on_error: build_chain(Phase::OnError, &policies.on_error, registry)?,
        };

        debug!(
            inbound = gateway.inbound.len(),
            backend = gateway.backend.len(),
            outbound = gateway.outbound.len(),
            on_error = gateway.on_error.len(),
            "gateway chains built"
        );
        Ok(gateway)
    }

    /// Start a pipeline for one request, bound to this gateway's chains
    /// and the given backend invocation capability.
    pub fn begin(&self, invoker: Arc<dyn BackendInvoker>) -> RequestPipeline {
        RequestPipeline::new(
            self.inbound.clone(),
            self.backend.clone(),
            self.outbound.clone(),
            self.on_error.clone(),
            invoker,
        )
    }

    /// Number of policies in the chain for the given phase.
    pub fn chain_len(&self, phase: Phase) -> usize {
        match phase {
            Phase::Inbound => self.inbound.len(),
            Phase::Backend => self.backend.len(),
            Phase::Outbound => self.outbound.len(),
            Phase::OnError => self.on_error.len(),
        }
    }
}

/// Resolve and construct one phase's chain, in declaration order.
fn build_chain(
    phase: Phase,
    entries: &[PolicyEntry],
    registry: &PolicyRegistry,
) -> Result<Chain> {
    let mut chain = Vec::with_capacity(entries.len());
    for entry in entries {
        debug!(phase = %phase, policy = %entry.id, "registering policy");
        let policy = registry.construct(&entry.id, entry.config.clone())?;
        if !policy.phases().contains(&phase) {
            return Err(ConfigError::invalid_policy_config(
                entry.id.clone(),
                format!("policy does not implement the {phase} hook"),
            )
            .into());
        }
        chain.push(policy);
    }
    Ok(Arc::new(chain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhasePolicies;
    use crate::error::GatewayError;
    use crate::registry::default_registry;

    fn config_with(policies: PhasePolicies) -> GatewayConfig {
        GatewayConfig {
            global_policies: policies,
        }
    }

    #[test]
    fn test_empty_config_builds_empty_chains() {
        let gateway =
            Gateway::from_config(&GatewayConfig::default(), &default_registry()).unwrap();
        assert_eq!(gateway.chain_len(Phase::Inbound), 0);
        assert_eq!(gateway.chain_len(Phase::OnError), 0);
    }

    #[test]
    fn test_builds_configured_chains_in_order() {
        let config = config_with(PhasePolicies {
            inbound: vec![PolicyEntry::new(
                "rate_limit",
                serde_json::json!({"requests_per_minute": 10}),
            )],
            on_error: vec![
                PolicyEntry::new("retry", serde_json::json!({})),
                PolicyEntry::new("retry", serde_json::json!({"max_attempts": 5})),
            ],
            ..Default::default()
        });

        let gateway = Gateway::from_config(&config, &default_registry()).unwrap();
        assert_eq!(gateway.chain_len(Phase::Inbound), 1);
        assert_eq!(gateway.chain_len(Phase::OnError), 2);
    }

    #[test]
    fn test_unknown_policy_aborts_construction() {
        let config = config_with(PhasePolicies {
            inbound: vec![PolicyEntry::new("cache", serde_json::json!({}))],
            ..Default::default()
        });

        let err = Gateway::from_config(&config, &default_registry()).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Config(ConfigError::UnknownPolicy(id)) if id == "cache"
        ));
    }

    #[test]
    fn test_invalid_policy_config_aborts_construction() {
        let config = config_with(PhasePolicies {
            on_error: vec![PolicyEntry::new(
                "retry",
                serde_json::json!({"max_attempts": "many"}),
            )],
            ..Default::default()
        });

        let err = Gateway::from_config(&config, &default_registry()).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Config(ConfigError::InvalidPolicyConfig { policy, .. }) if policy == "retry"
        ));
    }

    #[test]
    fn test_policy_in_wrong_phase_aborts_construction() {
        // The retry policy only implements the on-error hook.
        let config = config_with(PhasePolicies {
            inbound: vec![PolicyEntry::new("retry", serde_json::json!({}))],
            ..Default::default()
        });

        let err = Gateway::from_config(&config, &default_registry()).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Config(ConfigError::InvalidPolicyConfig { policy, .. }) if policy == "retry"
        ));
    }
}
