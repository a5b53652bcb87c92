//! Multi-level fixed-window rate limiting policy.
//!
//! Enforces up to four independent quota levels, each over a fixed
//! 60-second window:
//!
//! - global requests per minute
//! - requests per minute per client IP
//! - requests per minute per user (the request principal)
//! - requests per minute per user per client IP
//!
//! Levels are checked in that order and evaluation stops at the first
//! breach; a request increments every level it passes and nothing after
//! the breaching one. Each key's counter is guarded by a dedicated lock,
//! created lazily with atomic get-or-create semantics so concurrent first
//! access never produces two locks for one key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::context::{Phase, RequestContext};
use crate::error::Result;
use crate::policy::Policy;
use crate::request::{GatewayRequest, GatewayResponse};

/// Fixed window length.
const WINDOW_MS: u64 = 60_000;

/// Sweep stale windows every this many checks.
const EVICT_EVERY: u64 = 10_000;

/// Windows idle longer than this are evicted by the sweep.
const MAX_IDLE_MS: u64 = 5 * WINDOW_MS;

/// Sentinel client identifier when the IP cannot be determined.
const UNKNOWN_CLIENT: &str = "unknown";

/// Quota configuration for the rate limiting policy.
///
/// Any omitted quota is not enforced; a quota of zero disables that
/// level as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Global requests per minute across all clients.
    pub requests_per_minute: Option<u64>,
    /// Requests per minute per client IP.
    pub requests_per_minute_per_ip: Option<u64>,
    /// Requests per minute per user, when a principal is present.
    pub requests_per_minute_per_user: Option<u64>,
    /// Requests per minute per user per client IP.
    pub requests_per_minute_per_user_per_ip: Option<u64>,
}

impl RateLimitConfig {
    fn enforced(limit: Option<u64>) -> Option<u64> {
        limit.filter(|l| *l > 0)
    }

    /// The global quota, if enforced.
    pub fn global_limit(&self) -> Option<u64> {
        Self::enforced(self.requests_per_minute)
    }

    /// The per-IP quota, if enforced.
    pub fn per_ip_limit(&self) -> Option<u64> {
        Self::enforced(self.requests_per_minute_per_ip)
    }

    /// The per-user quota, if enforced.
    pub fn per_user_limit(&self) -> Option<u64> {
        Self::enforced(self.requests_per_minute_per_user)
    }

    /// The per-user-per-IP quota, if enforced.
    pub fn per_user_per_ip_limit(&self) -> Option<u64> {
        Self::enforced(self.requests_per_minute_per_user_per_ip)
    }
}

/// The quota level a request breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDimension {
    /// The global quota.
    Global,
    /// The per-client-IP quota.
    PerIp,
    /// The per-user quota.
    PerUser,
    /// The per-user-per-IP quota.
    PerUserPerIp,
}

/// Counter state for one key's current window.
#[derive(Debug)]
struct Window {
    start_ms: u64,
    count: u64,
}

/// Outcome of a single window check.
enum WindowCheck {
    Allowed,
    Exceeded { retry_after: Duration },
}

/// Multi-level fixed-window rate limiter.
///
/// Shared across all concurrent requests; counter and lock tables are
/// concurrent maps keyed by quota dimension and identifying value.
pub struct RateLimitPolicy {
    config: RateLimitConfig,
    windows: DashMap<String, Arc<Mutex<Window>>>,
    check_count: AtomicU64,
    evict_lock: Mutex<()>,
}

impl std::fmt::Debug for RateLimitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitPolicy")
            .field("config", &self.config)
            .field("tracked_keys", &self.windows.len())
            .finish()
    }
}

impl RateLimitPolicy {
    /// Create a new rate limiter with the given quotas.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            check_count: AtomicU64::new(0),
            evict_lock: Mutex::new(()),
        }
    }

    /// The configured quotas.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Get or create the counter slot for a key.
    ///
    /// The map's shard lock serializes the create-if-absent check, so
    /// exactly one slot (and thus one lock) exists per key even under
    /// concurrent first access.
    fn window_slot(&self, key: &str, now_ms: u64) -> Arc<Mutex<Window>> {
        self.windows
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Window {
                    start_ms: now_ms,
                    count: 0,
                }))
            })
            .value()
            .clone()
    }

    /// Update the counter for a key and report whether the quota was hit.
    ///
    /// The window resets once more than 60 seconds have elapsed since its
    /// recorded start. A check whose post-increment count would exceed
    /// the quota reports `Exceeded` without incrementing.
    fn check_and_count(&self, key: &str, limit: u64, now_ms: u64) -> WindowCheck {
        self.maybe_evict(now_ms);

        let slot = self.window_slot(key, now_ms);
        let mut window = slot.lock();

        if now_ms.saturating_sub(window.start_ms) > WINDOW_MS {
            window.start_ms = now_ms;
            window.count = 0;
        }
        if window.count >= limit {
            let retry_after_ms = (window.start_ms + WINDOW_MS).saturating_sub(now_ms);
            return WindowCheck::Exceeded {
                retry_after: Duration::from_millis(retry_after_ms),
            };
        }
        window.count += 1;
        WindowCheck::Allowed
    }

    /// Sweep stale windows on a request-count trigger.
    ///
    /// Only one task sweeps at a time; entries whose lock is currently
    /// held are kept.
    fn maybe_evict(&self, now_ms: u64) {
        let checks = self.check_count.fetch_add(1, Ordering::Relaxed) + 1;
        if checks % EVICT_EVERY != 0 {
            return;
        }
        if let Some(_guard) = self.evict_lock.try_lock() {
            self.evict_stale(now_ms);
        }
    }

    fn evict_stale(&self, now_ms: u64) {
        self.windows.retain(|_, slot| match slot.try_lock() {
            Some(window) => now_ms.saturating_sub(window.start_ms) <= MAX_IDLE_MS,
            None => true,
        });
    }

    fn exceeded_response(
        &self,
        dimension: LimitDimension,
        client: &str,
        user: Option<&str>,
        retry_after: Duration,
    ) -> GatewayResponse {
        let message = match dimension {
            LimitDimension::Global => "Global rate limit exceeded".to_string(),
            LimitDimension::PerIp => format!("Rate limit exceeded for IP {client}"),
            LimitDimension::PerUser => {
                format!("Rate limit exceeded for user {}", user.unwrap_or_default())
            }
            LimitDimension::PerUserPerIp => format!(
                "Rate limit exceeded for user {} from IP {client}",
                user.unwrap_or_default()
            ),
        };
        tracing::debug!(?dimension, %message, "request rate limited");

        let retry_after_secs = (retry_after.as_millis() as u64).div_ceil(1000);
        GatewayResponse::new(429)
            .with_header("retry-after", retry_after_secs.to_string())
            .with_body(message)
    }
}

#[async_trait]
impl Policy for RateLimitPolicy {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Inbound]
    }

    async fn inbound(
        &self,
        request: &GatewayRequest,
        _ctx: &mut RequestContext,
    ) -> Result<Option<GatewayResponse>> {
        let now_ms = current_timestamp_ms();

        if let Some(limit) = self.config.global_limit() {
            if let WindowCheck::Exceeded { retry_after } =
                self.check_and_count("global", limit, now_ms)
            {
                return Ok(Some(self.exceeded_response(
                    LimitDimension::Global,
                    UNKNOWN_CLIENT,
                    None,
                    retry_after,
                )));
            }
        }

        let client = request
            .client_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

        if let Some(limit) = self.config.per_ip_limit() {
            let key = format!("ip:{client}");
            if let WindowCheck::Exceeded { retry_after } =
                self.check_and_count(&key, limit, now_ms)
            {
                return Ok(Some(self.exceeded_response(
                    LimitDimension::PerIp,
                    &client,
                    None,
                    retry_after,
                )));
            }
        }

        let Some(user) = request.principal().map(str::to_string) else {
            return Ok(None);
        };

        if let Some(limit) = self.config.per_user_limit() {
            let key = format!("user:{user}");
            if let WindowCheck::Exceeded { retry_after } =
                self.check_and_count(&key, limit, now_ms)
            {
                return Ok(Some(self.exceeded_response(
                    LimitDimension::PerUser,
                    &client,
                    Some(&user),
                    retry_after,
                )));
            }
        }

        if let Some(limit) = self.config.per_user_per_ip_limit() {
            let key = format!("user_ip:{user}:{client}");
            if let WindowCheck::Exceeded { retry_after } =
                self.check_and_count(&key, limit, now_ms)
            {
                return Ok(Some(self.exceeded_response(
                    LimitDimension::PerUserPerIp,
                    &client,
                    Some(&user),
                    retry_after,
                )));
            }
        }

        Ok(None)
    }
}

/// Current timestamp in milliseconds since Unix epoch.
fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(config: RateLimitConfig) -> RateLimitPolicy {
        RateLimitPolicy::new(config)
    }

    fn key_count(policy: &RateLimitPolicy, key: &str) -> Option<u64> {
        policy.windows.get(key).map(|slot| slot.lock().count)
    }

    #[test]
    fn test_window_allows_up_to_limit() {
        let policy = limiter(RateLimitConfig::default());
        let now = 1_000_000;

        for _ in 0..5 {
            assert!(matches!(
                policy.check_and_count("global", 5, now),
                WindowCheck::Allowed
            ));
        }
        assert!(matches!(
            policy.check_and_count("global", 5, now),
            WindowCheck::Exceeded { .. }
        ));
        // Denied check must not increment.
        assert_eq!(key_count(&policy, "global"), Some(5));
    }

    #[test]
    fn test_window_resets_after_60s() {
        let policy = limiter(RateLimitConfig::default());
        let now = 1_000_000;

        assert!(matches!(
            policy.check_and_count("global", 1, now),
            WindowCheck::Allowed
        ));
        assert!(matches!(
            policy.check_and_count("global", 1, now + 1),
            WindowCheck::Exceeded { .. }
        ));

        // Exactly 60s elapsed keeps the window (reset requires strictly more).
        assert!(matches!(
            policy.check_and_count("global", 1, now + WINDOW_MS),
            WindowCheck::Exceeded { .. }
        ));

        // Past 60s the window starts fresh.
        assert!(matches!(
            policy.check_and_count("global", 1, now + WINDOW_MS + 1),
            WindowCheck::Allowed
        ));
        assert_eq!(key_count(&policy, "global"), Some(1));
    }

    #[test]
    fn test_retry_after_reflects_window_remainder() {
        let policy = limiter(RateLimitConfig::default());
        let now = 1_000_000;

        policy.check_and_count("global", 1, now);
        match policy.check_and_count("global", 1, now + 10_000) {
            WindowCheck::Exceeded { retry_after } => {
                assert_eq!(retry_after, Duration::from_millis(50_000));
            }
            WindowCheck::Allowed => panic!("should be exceeded"),
        }
    }

    #[tokio::test]
    async fn test_inbound_dimension_precedence() {
        // Both per-IP and per-user would breach on the second request;
        // per-IP is checked first and the user counter must stay untouched.
        let policy = limiter(RateLimitConfig {
            requests_per_minute_per_ip: Some(1),
            requests_per_minute_per_user: Some(1),
            ..Default::default()
        });
        let request = GatewayRequest::new("GET", "/")
            .with_client_ip("10.0.0.1".parse().unwrap())
            .with_header("x-user", "alice");
        let mut ctx = RequestContext::new();

        assert!(policy.inbound(&request, &mut ctx).await.unwrap().is_none());

        let response = policy
            .inbound(&request, &mut ctx)
            .await
            .unwrap()
            .expect("second request breaches");
        assert_eq!(response.status(), 429);
        assert!(response.body().contains("IP 10.0.0.1"));
        assert!(response.header("retry-after").is_some());

        assert_eq!(key_count(&policy, "ip:10.0.0.1"), Some(1));
        // The breach stopped evaluation before the user dimension.
        assert_eq!(key_count(&policy, "user:alice"), Some(1));
    }

    #[tokio::test]
    async fn test_inbound_global_precedes_ip() {
        let policy = limiter(RateLimitConfig {
            requests_per_minute: Some(1),
            requests_per_minute_per_ip: Some(1),
            ..Default::default()
        });
        let request = GatewayRequest::new("GET", "/").with_client_ip("10.0.0.1".parse().unwrap());
        let mut ctx = RequestContext::new();

        assert!(policy.inbound(&request, &mut ctx).await.unwrap().is_none());

        let response = policy.inbound(&request, &mut ctx).await.unwrap().unwrap();
        assert_eq!(response.body(), "Global rate limit exceeded");
        // The per-IP counter was not incremented by the rejected request.
        assert_eq!(key_count(&policy, "ip:10.0.0.1"), Some(1));
    }

    #[tokio::test]
    async fn test_inbound_unknown_client_sentinel() {
        let policy = limiter(RateLimitConfig {
            requests_per_minute_per_ip: Some(1),
            ..Default::default()
        });
        let request = GatewayRequest::new("GET", "/");
        let mut ctx = RequestContext::new();

        assert!(policy.inbound(&request, &mut ctx).await.unwrap().is_none());
        let response = policy.inbound(&request, &mut ctx).await.unwrap().unwrap();
        assert!(response.body().contains("IP unknown"));
        assert_eq!(key_count(&policy, "ip:unknown"), Some(1));
    }

    #[tokio::test]
    async fn test_inbound_user_dimensions_need_principal() {
        let policy = limiter(RateLimitConfig {
            requests_per_minute_per_user: Some(1),
            requests_per_minute_per_user_per_ip: Some(1),
            ..Default::default()
        });
        let anonymous = GatewayRequest::new("GET", "/");
        let mut ctx = RequestContext::new();

        // Anonymous requests never touch the user dimensions.
        for _ in 0..3 {
            assert!(policy.inbound(&anonymous, &mut ctx).await.unwrap().is_none());
        }
        assert_eq!(policy.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_inbound_user_per_ip_breach() {
        let policy = limiter(RateLimitConfig {
            requests_per_minute_per_user_per_ip: Some(1),
            ..Default::default()
        });
        let request = GatewayRequest::new("GET", "/")
            .with_client_ip("10.0.0.2".parse().unwrap())
            .with_principal("bob");
        let mut ctx = RequestContext::new();

        assert!(policy.inbound(&request, &mut ctx).await.unwrap().is_none());
        let response = policy.inbound(&request, &mut ctx).await.unwrap().unwrap();
        assert!(response.body().contains("user bob from IP 10.0.0.2"));
        assert_eq!(key_count(&policy, "user_ip:bob:10.0.0.2"), Some(1));
    }

    #[tokio::test]
    async fn test_zero_quota_not_enforced() {
        let policy = limiter(RateLimitConfig {
            requests_per_minute: Some(0),
            ..Default::default()
        });
        let request = GatewayRequest::new("GET", "/");
        let mut ctx = RequestContext::new();

        for _ in 0..10 {
            assert!(policy.inbound(&request, &mut ctx).await.unwrap().is_none());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_slot_creation_yields_one_lock() {
        let policy = Arc::new(limiter(RateLimitConfig::default()));
        let now = 1_000_000;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let policy = policy.clone();
            handles.push(tokio::spawn(async move {
                policy.window_slot("ip:10.0.0.9", now)
            }));
        }

        let mut slots = Vec::new();
        for handle in handles {
            slots.push(handle.await.unwrap());
        }
        for slot in &slots[1..] {
            assert!(Arc::ptr_eq(&slots[0], slot));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_counting_loses_no_updates() {
        let policy = Arc::new(limiter(RateLimitConfig::default()));
        let now = 1_000_000;
        let tasks = 64;

        let mut handles = Vec::new();
        for _ in 0..tasks {
            let policy = policy.clone();
            handles.push(tokio::spawn(async move {
                matches!(
                    policy.check_and_count("global", 1_000, now),
                    WindowCheck::Allowed
                )
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        assert_eq!(key_count(&policy, "global"), Some(tasks));
    }

    #[test]
    fn test_evict_stale_windows() {
        let policy = limiter(RateLimitConfig::default());
        let now = 10_000_000;

        policy.check_and_count("ip:old", 10, now);
        policy.check_and_count("ip:fresh", 10, now + MAX_IDLE_MS);

        policy.evict_stale(now + MAX_IDLE_MS + 1);

        assert!(policy.windows.get("ip:old").is_none());
        assert!(policy.windows.get("ip:fresh").is_some());
    }

    #[test]
    fn test_config_enforcement_gates() {
        let config = RateLimitConfig {
            requests_per_minute: Some(0),
            requests_per_minute_per_ip: Some(10),
            ..Default::default()
        };
        assert_eq!(config.global_limit(), None);
        assert_eq!(config.per_ip_limit(), Some(10));
        assert_eq!(config.per_user_limit(), None);
    }

    #[test]
    fn test_config_deserialization() {
        let config: RateLimitConfig = serde_json::from_str(
            r#"{"requests_per_minute": 600, "requests_per_minute_per_user": 60}"#,
        )
        .unwrap();
        assert_eq!(config.global_limit(), Some(600));
        assert_eq!(config.per_user_limit(), Some(60));
        assert_eq!(config.per_ip_limit(), None);
    }
}
