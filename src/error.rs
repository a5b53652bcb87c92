//! Error types for gateway operations.
//!
//! This module provides the error hierarchy for the gateway engine:
//! construction-time configuration errors, backend invocation failures,
//! and policy hook failures.

use std::time::Duration;
use thiserror::Error;

use crate::context::Phase;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error. Fatal at Gateway construction.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Backend invocation error.
    #[error("Backend invocation failed: {0}")]
    Backend(#[from] BackendError),

    /// A policy hook failed while processing a request.
    #[error("Policy '{policy}' failed in {phase} phase: {message}")]
    Policy {
        /// Registry id of the failing policy.
        policy: String,
        /// Phase in which the hook failed.
        phase: Phase,
        /// Error message.
        message: String,
    },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create a new policy hook error.
    pub fn policy(policy: impl Into<String>, phase: Phase, message: impl Into<String>) -> Self {
        Self::Policy {
            policy: policy.into(),
            phase,
            message: message.into(),
        }
    }
}

/// Configuration-related errors.
///
/// All variants abort Gateway construction; no partially-built Gateway
/// is ever returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A chain entry references a policy id that was never registered.
    #[error("Unknown policy id: {0}")]
    UnknownPolicy(String),

    /// A policy's configuration object failed validation.
    #[error("Invalid configuration for policy '{policy}': {message}")]
    InvalidPolicyConfig {
        /// Registry id of the policy.
        policy: String,
        /// What was wrong with the configuration.
        message: String,
    },

    /// Missing required configuration.
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

impl ConfigError {
    /// Create a new invalid-policy-config error.
    pub fn invalid_policy_config(policy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPolicyConfig {
            policy: policy.into(),
            message: message.into(),
        }
    }
}

/// Backend invocation errors.
///
/// Raised while obtaining the backend response, or by backend/outbound
/// hooks standing in for the backend. Routed to the on-error chain.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Generic backend operation failed.
    #[error("{message}")]
    OperationFailed {
        /// Error message.
        message: String,
        /// Whether the invocation can be retried.
        retryable: bool,
    },

    /// Backend did not answer in time.
    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),

    /// Backend unreachable.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Create a new operation failed error.
    pub fn operation_failed(message: impl Into<String>, retryable: bool) -> Self {
        Self::OperationFailed {
            message: message.into(),
            retryable,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OperationFailed { retryable, .. } => *retryable,
            Self::Timeout(_) => true,
            Self::Unavailable(_) => true,
        }
    }
}
