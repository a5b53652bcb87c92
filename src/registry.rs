//! Policy registry mapping policy ids to constructors.
//!
//! The registry is built once at startup and consulted during Gateway
//! construction to resolve the policy ids a configuration declares into
//! concrete policy instances.
//!
//! # Example
//!
//! ```ignore
//! use gatekit::{default_registry, PolicyRegistry, RetryConfig, RetryPolicy};
//!
//! // The built-in policies, pre-registered.
//! let registry = default_registry();
//!
//! // Or register your own.
//! let mut registry = PolicyRegistry::new();
//! registry.register_config("retry", RetryPolicy::new);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::{ConfigError, Result};
use crate::policy::{Policy, RateLimitPolicy, RetryPolicy, SharedPolicy};

/// Constructor resolving a raw configuration object into a policy instance.
pub type PolicyConstructor =
    Box<dyn Fn(serde_json::Value) -> Result<SharedPolicy> + Send + Sync>;

/// Mapping from policy identifier to policy constructor.
///
/// Not request-scoped; built once at startup. Re-registration overwrites
/// silently (last write wins).
#[derive(Default)]
pub struct PolicyRegistry {
    constructors: HashMap<String, PolicyConstructor>,
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.constructors.keys().collect();
        ids.sort();
        f.debug_struct("PolicyRegistry").field("ids", &ids).finish()
    }
}

impl PolicyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Associate an identifier with a policy constructor.
    pub fn register<F>(&mut self, id: impl Into<String>, constructor: F)
    where
        F: Fn(serde_json::Value) -> Result<SharedPolicy> + Send + Sync + 'static,
    {
        self.constructors.insert(id.into(), Box::new(constructor));
    }

    /// Register a policy whose configuration deserializes into `C`.
    ///
    /// Wraps `build` with the config parsing step; a configuration object
    /// that does not match `C` surfaces as
    /// [`ConfigError::InvalidPolicyConfig`] at Gateway construction.
    pub fn register_config<C, P, F>(&mut self, id: impl Into<String>, build: F)
    where
        C: DeserializeOwned + 'static,
        P: Policy,
        F: Fn(C) -> P + Send + Sync + 'static,
    {
        let id = id.into();
        let policy_id = id.clone();
        self.register(id, move |raw| {
            let config: C = serde_json::from_value(raw).map_err(|e| {
                ConfigError::invalid_policy_config(policy_id.clone(), e.to_string())
            })?;
            Ok(Arc::new(build(config)) as SharedPolicy)
        });
    }

    /// Resolve a policy id to its constructor.
    pub fn resolve(&self, id: &str) -> Result<&PolicyConstructor> {
        self.constructors
            .get(id)
            .ok_or_else(|| ConfigError::UnknownPolicy(id.to_string()).into())
    }

    /// Resolve a policy id and construct an instance from the given
    /// configuration object.
    pub fn construct(&self, id: &str, config: serde_json::Value) -> Result<SharedPolicy> {
        let constructor = self.resolve(id)?;
        constructor(config)
    }

    /// Check whether an id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    /// Number of registered policies.
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

/// Registry pre-populated with the built-in policies.
///
/// Registers `rate_limit` ([`RateLimitPolicy`]) and `retry`
/// ([`RetryPolicy`]).
pub fn default_registry() -> PolicyRegistry {
    let mut registry = PolicyRegistry::new();
    registry.register_config("rate_limit", RateLimitPolicy::new);
    registry.register_config("retry", RetryPolicy::new);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;

    #[test]
    fn test_default_registry_builtins() {
        let registry = default_registry();
        assert!(registry.contains("rate_limit"));
        assert!(registry.contains("retry"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_resolve_unknown_policy() {
        let registry = PolicyRegistry::new();
        let err = registry.resolve("cache").err().unwrap();
        assert!(matches!(
            err,
            GatewayError::Config(ConfigError::UnknownPolicy(id)) if id == "cache"
        ));
    }

    #[test]
    fn test_construct_builtin() {
        let registry = default_registry();
        let policy = registry
            .construct("retry", serde_json::json!({"max_attempts": 5}))
            .unwrap();
        assert_eq!(policy.name(), "retry");
    }

    #[test]
    fn test_construct_invalid_config() {
        let registry = default_registry();
        let err = registry
            .construct("retry", serde_json::json!({"max_attempts": "many"}))
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Config(ConfigError::InvalidPolicyConfig { policy, .. }) if policy == "retry"
        ));
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut registry = default_registry();
        registry.register("retry", |_raw| {
            Err(GatewayError::Internal("replaced".into()))
        });
        let err = registry
            .construct("retry", serde_json::Value::Null)
            .unwrap_err();
        assert!(matches!(err, GatewayError::Internal(_)));
    }
}
