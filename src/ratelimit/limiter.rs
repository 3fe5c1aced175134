//! Tiered rate limiting with lockout.
//!
//! Per identifier the limiter runs, in order: lockout check, global token
//! bucket, optional per-operation bucket, then sliding-window ceilings that
//! differ by caller tier. Repeated rejections lock the identifier out
//! entirely for a configured duration.
//!
//! Each check runs under the identifier's map guard, so two concurrent
//! checks for one identifier cannot both consume the last bucket token.
//! Checks for unrelated identifiers proceed in parallel.

use dashmap::DashMap;
use std::collections::HashMap;

use crate::config::{RateLimitConfig, WindowCeilings};
use crate::error::{GatewayError, LimitReason, Result};
use crate::observability::metrics;
use crate::ratelimit::bucket::TokenBucket;
use crate::ratelimit::window::SlidingWindow;
use crate::util::now_ms;

/// Tier a caller is throttled under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerTier {
    /// No resolved identity; lower ceilings apply.
    Anonymous,
    /// Identity resolved by the surrounding session layer.
    Authenticated,
}

/// Per-identifier throttling state, created lazily on first request.
struct IdentifierState {
    global: TokenBucket,
    operations: HashMap<String, TokenBucket>,
    window: SlidingWindow,
    violation_count: u32,
    locked_until_ms: Option<u64>,
    last_seen_ms: u64,
}

/// Read-only view of one identifier's state.
#[derive(Debug, Clone, Copy)]
pub struct IdentifierStats {
    pub minute: u64,
    pub hour: u64,
    pub day: u64,
    pub violation_count: u32,
    pub locked_until_ms: Option<u64>,
    pub tokens_available: f64,
}

/// Per-identifier, per-operation request throttling.
pub struct RateLimiter {
    config: RateLimitConfig,
    states: DashMap<String, IdentifierState>,
}

impl RateLimiter {
    /// Create a limiter with its own state table.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// Check whether a request from `identifier` may proceed.
    pub fn check(
        &self,
        identifier: &str,
        operation: Option<&str>,
        tier: CallerTier,
    ) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = now_ms();
        let mut state = self
            .states
            .entry(identifier.to_string())
            .or_insert_with(|| IdentifierState {
                global: TokenBucket::new(self.config.global.capacity),
                operations: HashMap::new(),
                window: SlidingWindow::new(),
                violation_count: 0,
                locked_until_ms: None,
                last_seen_ms: now,
            });
        let state = state.value_mut();

        // 1. Active lockout fails fast; bucket and window stay untouched.
        if let Some(until) = state.locked_until_ms {
            if now < until {
                let retry_after = (until - now).div_ceil(1000);
                self.register_violation(identifier, state, now);
                metrics::record_ratelimit_rejection("locked");
                return Err(GatewayError::RateLimit {
                    reason: LimitReason::Locked,
                    retry_after_seconds: Some(retry_after),
                });
            }
            state.locked_until_ms = None;
        }

        // 2. Global bucket, then the operation bucket when one is configured.
        if !state
            .global
            .try_acquire(self.config.global.capacity, self.config.global.refill_per_sec)
        {
            return Err(self.reject(identifier, state, now, LimitReason::GlobalLimit));
        }
        if let Some(op) = operation {
            if let Some(settings) = self.config.operations.get(op) {
                let bucket = state
                    .operations
                    .entry(op.to_string())
                    .or_insert_with(|| TokenBucket::new(settings.capacity));
                if !bucket.try_acquire(settings.capacity, settings.refill_per_sec) {
                    return Err(self.reject(identifier, state, now, LimitReason::OperationLimit));
                }
            }
        }

        // 3. Sliding-window ceilings for the caller's tier.
        state.window.record(now);
        let counts = state.window.counts(now);
        let ceilings = self.ceilings(tier);
        if counts.minute > ceilings.per_minute
            || counts.hour > ceilings.per_hour
            || counts.day > ceilings.per_day
        {
            return Err(self.reject(identifier, state, now, LimitReason::WindowLimit));
        }

        // 4. Accepted.
        state.violation_count = 0;
        state.last_seen_ms = now;
        Ok(())
    }

    /// Read-only view of one identifier, for observability and tests.
    pub fn stats(&self, identifier: &str) -> Option<IdentifierStats> {
        let now = now_ms();
        self.states.get(identifier).map(|state| {
            let counts = state.window.counts(now);
            IdentifierStats {
                minute: counts.minute,
                hour: counts.hour,
                day: counts.day,
                violation_count: state.violation_count,
                locked_until_ms: state.locked_until_ms,
                tokens_available: state
                    .global
                    .available(self.config.global.capacity, self.config.global.refill_per_sec),
            }
        })
    }

    /// Administrative override: clear violations and any active lock.
    pub fn reset(&self, identifier: &str) {
        if let Some(mut state) = self.states.get_mut(identifier) {
            state.violation_count = 0;
            state.locked_until_ms = None;
            tracing::info!(identifier = %identifier, "rate limit state reset");
        }
    }

    /// Drop identifiers idle past the retention window with no active lock.
    ///
    /// Keys are snapshotted first; each entry is then removed individually
    /// so the scan never blocks concurrent checks.
    pub fn sweep_idle(&self) -> usize {
        let now = now_ms();
        let cutoff = now.saturating_sub(self.config.idle_retention_secs * 1000);
        let idle = |state: &IdentifierState| {
            state.last_seen_ms <= cutoff
                && !state.locked_until_ms.is_some_and(|until| now < until)
        };

        let candidates: Vec<String> = self
            .states
            .iter()
            .filter(|entry| idle(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in candidates {
            if self.states.remove_if(&key, |_, state| idle(state)).is_some() {
                removed += 1;
            }
        }
        metrics::record_identifier_count(self.states.len());
        if removed > 0 {
            tracing::debug!(removed, "idle rate limit identifiers swept");
        }
        removed
    }

    /// Number of identifiers currently tracked.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when no identifiers are tracked.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn ceilings(&self, tier: CallerTier) -> &WindowCeilings {
        match tier {
            CallerTier::Anonymous => &self.config.anonymous,
            CallerTier::Authenticated => &self.config.authenticated,
        }
    }

    fn reject(
        &self,
        identifier: &str,
        state: &mut IdentifierState,
        now: u64,
        reason: LimitReason,
    ) -> GatewayError {
        self.register_violation(identifier, state, now);
        metrics::record_ratelimit_rejection(reason.as_str());
        tracing::warn!(identifier = %identifier, reason = %reason, "request rate limited");
        GatewayError::RateLimit {
            reason,
            retry_after_seconds: None,
        }
    }

    fn register_violation(&self, identifier: &str, state: &mut IdentifierState, now: u64) {
        state.violation_count += 1;
        state.last_seen_ms = now;
        if state.violation_count >= self.config.max_violations {
            state.locked_until_ms = Some(now + self.config.lockout_secs * 1000);
            state.violation_count = 0;
            metrics::record_lockout();
            tracing::warn!(
                identifier = %identifier,
                lockout_secs = self.config.lockout_secs,
                "identifier locked out"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BucketSettings;
    use std::time::Duration;

    fn config(capacity: f64, refill: f64) -> RateLimitConfig {
        RateLimitConfig {
            global: BucketSettings {
                capacity,
                refill_per_sec: refill,
            },
            // High enough not to interfere with bucket tests.
            max_violations: 100,
            ..RateLimitConfig::default()
        }
    }

    fn reason(result: Result<()>) -> LimitReason {
        match result {
            Err(GatewayError::RateLimit { reason, .. }) => reason,
            other => panic!("expected rate limit rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_bucket_conservation() {
        let limiter = RateLimiter::new(config(3.0, 5.0));

        for _ in 0..3 {
            assert!(limiter.check("ip:1.2.3.4", None, CallerTier::Anonymous).is_ok());
        }
        assert_eq!(
            reason(limiter.check("ip:1.2.3.4", None, CallerTier::Anonymous)),
            LimitReason::GlobalLimit
        );

        // One refill period restores exactly one token.
        std::thread::sleep(Duration::from_millis(220));
        assert!(limiter.check("ip:1.2.3.4", None, CallerTier::Anonymous).is_ok());
        assert_eq!(
            reason(limiter.check("ip:1.2.3.4", None, CallerTier::Anonymous)),
            LimitReason::GlobalLimit
        );
    }

    #[test]
    fn test_identifiers_are_independent() {
        let limiter = RateLimiter::new(config(1.0, 0.001));

        assert!(limiter.check("ip:1.1.1.1", None, CallerTier::Anonymous).is_ok());
        assert!(limiter.check("ip:2.2.2.2", None, CallerTier::Anonymous).is_ok());
        assert!(limiter.check("ip:1.1.1.1", None, CallerTier::Anonymous).is_err());
        assert!(limiter.check("ip:2.2.2.2", None, CallerTier::Anonymous).is_err());
    }

    #[test]
    fn test_operation_bucket() {
        let mut config = config(100.0, 100.0);
        config.operations.insert(
            "execute".to_string(),
            BucketSettings {
                capacity: 1.0,
                refill_per_sec: 0.001,
            },
        );
        let limiter = RateLimiter::new(config);

        assert!(limiter
            .check("ip:1.2.3.4", Some("execute"), CallerTier::Anonymous)
            .is_ok());
        assert_eq!(
            reason(limiter.check("ip:1.2.3.4", Some("execute"), CallerTier::Anonymous)),
            LimitReason::OperationLimit
        );
        // Operations without a configured bucket only hit the global one.
        assert!(limiter
            .check("ip:1.2.3.4", Some("lookup"), CallerTier::Anonymous)
            .is_ok());
    }

    #[test]
    fn test_window_ceiling_by_tier() {
        let mut config = config(100.0, 100.0);
        config.anonymous.per_minute = 2;
        config.authenticated.per_minute = 5;
        let limiter = RateLimiter::new(config);

        assert!(limiter.check("anon", None, CallerTier::Anonymous).is_ok());
        assert!(limiter.check("anon", None, CallerTier::Anonymous).is_ok());
        assert_eq!(
            reason(limiter.check("anon", None, CallerTier::Anonymous)),
            LimitReason::WindowLimit
        );

        for _ in 0..5 {
            assert!(limiter.check("user", None, CallerTier::Authenticated).is_ok());
        }
        assert_eq!(
            reason(limiter.check("user", None, CallerTier::Authenticated)),
            LimitReason::WindowLimit
        );
    }

    #[test]
    fn test_lockout_trigger_and_release() {
        let mut config = config(1.0, 1.0);
        config.max_violations = 1;
        config.lockout_secs = 1;
        let limiter = RateLimiter::new(config);

        assert!(limiter.check("abuser", None, CallerTier::Anonymous).is_ok());
        // First rejection reaches max_violations and locks immediately.
        assert_eq!(
            reason(limiter.check("abuser", None, CallerTier::Anonymous)),
            LimitReason::GlobalLimit
        );

        let rejection = limiter.check("abuser", None, CallerTier::Anonymous);
        match rejection {
            Err(GatewayError::RateLimit {
                reason: LimitReason::Locked,
                retry_after_seconds: Some(retry),
            }) => assert!(retry >= 1),
            other => panic!("expected locked rejection, got {other:?}"),
        }

        // After the lockout elapses, evaluation resumes normally and the
        // refilled bucket admits the request.
        std::thread::sleep(Duration::from_millis(1300));
        assert!(limiter.check("abuser", None, CallerTier::Anonymous).is_ok());
    }

    #[test]
    fn test_locked_rejections_leave_bucket_untouched() {
        // Lock via the window ceiling so the bucket keeps spare tokens.
        let mut config = config(2.0, 0.001);
        config.anonymous.per_minute = 1;
        config.max_violations = 1;
        config.lockout_secs = 60;
        let limiter = RateLimiter::new(config);

        assert!(limiter.check("x", None, CallerTier::Anonymous).is_ok());
        assert_eq!(
            reason(limiter.check("x", None, CallerTier::Anonymous)),
            LimitReason::WindowLimit
        );

        let tokens_before = limiter.stats("x").unwrap().tokens_available;
        for _ in 0..5 {
            assert_eq!(
                reason(limiter.check("x", None, CallerTier::Anonymous)),
                LimitReason::Locked
            );
        }
        let tokens_after = limiter.stats("x").unwrap().tokens_available;
        // Nothing was consumed while locked.
        assert!(tokens_after >= tokens_before);
    }

    #[test]
    fn test_stats_and_reset() {
        let mut config = config(1.0, 0.001);
        config.max_violations = 10;
        let limiter = RateLimiter::new(config);

        assert!(limiter.check("ip:9.9.9.9", None, CallerTier::Anonymous).is_ok());
        assert!(limiter.check("ip:9.9.9.9", None, CallerTier::Anonymous).is_err());

        let stats = limiter.stats("ip:9.9.9.9").unwrap();
        assert_eq!(stats.minute, 1);
        assert_eq!(stats.violation_count, 1);
        assert!(stats.locked_until_ms.is_none());
        assert!(stats.tokens_available < 1.0);

        limiter.reset("ip:9.9.9.9");
        assert_eq!(limiter.stats("ip:9.9.9.9").unwrap().violation_count, 0);
    }

    #[test]
    fn test_sweep_drops_idle_but_not_locked() {
        let mut config = config(1.0, 0.001);
        config.idle_retention_secs = 0;
        config.max_violations = 1;
        config.lockout_secs = 60;
        let limiter = RateLimiter::new(config);

        assert!(limiter.check("idle", None, CallerTier::Anonymous).is_ok());

        assert!(limiter.check("locked", None, CallerTier::Anonymous).is_ok());
        assert!(limiter.check("locked", None, CallerTier::Anonymous).is_err());

        std::thread::sleep(Duration::from_millis(10));
        let removed = limiter.sweep_idle();
        assert_eq!(removed, 1);
        assert!(limiter.stats("idle").is_none());
        assert!(limiter.stats("locked").is_some());
    }

    #[test]
    fn test_disabled_limiter_allows_everything() {
        let mut config = config(1.0, 0.001);
        config.enabled = false;
        let limiter = RateLimiter::new(config);

        for _ in 0..100 {
            assert!(limiter.check("ip:1.2.3.4", None, CallerTier::Anonymous).is_ok());
        }
        assert!(limiter.is_empty());
    }
}
