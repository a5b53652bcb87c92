//! Resolved policy-chain configuration consumed by Gateway construction.
//!
//! The engine is format-agnostic at this boundary: an external loader
//! deserializes whatever format it likes (YAML, JSON, ...) into a
//! [`GatewayConfig`] and hands it to
//! [`Gateway::from_config`](crate::gateway::Gateway::from_config).
//!
//! The wire shape is four ordered lists of single-key mappings, one per
//! phase:
//!
//! ```yaml
//! globalPolicies:
//!   inbound:
//!     - rate_limit:
//!         requests_per_minute: 600
//!   onError:
//!     - retry:
//!         max_attempts: 3
//!         backoff_seconds: 0.5
//! ```

use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// One chain entry: a policy id paired with its raw configuration object.
///
/// On the wire this is a single-key mapping `{ policyId: configObject }`;
/// a mapping with zero or multiple keys is rejected at deserialization.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyEntry {
    /// Registry id of the policy.
    pub id: String,
    /// Raw configuration object, parsed by the policy's constructor.
    pub config: serde_json::Value,
}

impl PolicyEntry {
    /// Create an entry programmatically (e.g. in tests or host wiring).
    pub fn new(id: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            config,
        }
    }
}

impl<'de> Deserialize<'de> for PolicyEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut entries = map.into_iter();
        let (id, config) = entries
            .next()
            .ok_or_else(|| de::Error::custom("policy entry must not be empty"))?;
        if entries.next().is_some() {
            return Err(de::Error::custom(
                "policy entry must be a single-key mapping of policy id to config",
            ));
        }
        Ok(Self { id, config })
    }
}

impl Serialize for PolicyEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = BTreeMap::new();
        map.insert(&self.id, &self.config);
        map.serialize(serializer)
    }
}

/// Ordered policy lists for the four phases.
///
/// Declaration order is chain order. All lists default to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhasePolicies {
    /// Policies consulted before the backend.
    pub inbound: Vec<PolicyEntry>,
    /// Policies that may produce the backend response themselves.
    pub backend: Vec<PolicyEntry>,
    /// Policies consulted after the backend response is available.
    pub outbound: Vec<PolicyEntry>,
    /// Error-recovery policies.
    pub on_error: Vec<PolicyEntry>,
}

/// Top-level configuration consumed by Gateway construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// Policy chains applied to every request.
    pub global_policies: PhasePolicies,
}
