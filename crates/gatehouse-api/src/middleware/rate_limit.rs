// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Fixed-window rate limiting.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower::{Layer, Service};

use super::client_ip;
use crate::auth::IdentityContext;
use crate::error::ApiError;

// =============================================================================
// RateLimitRule
// =============================================================================

/// Longest accepted window or idle delay.
pub const MAX_WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// What a bucket is keyed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// One bucket for every caller.
    Global,
    /// One bucket per client IP.
    #[default]
    Ip,
    /// One bucket per authenticated user.
    User,
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeyStrategy::Global => "global",
            KeyStrategy::Ip => "ip",
            KeyStrategy::User => "user",
        };
        f.write_str(s)
    }
}

/// A call budget: at most `limit` calls per `window`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Calls allowed per window.
    pub limit: u32,
    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Key strategy.
    #[serde(default)]
    pub strategy: KeyStrategy,
    /// Message returned with a rejection.
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_message() -> String {
    "Too many requests, please try again later".to_string()
}

impl RateLimitRule {
    /// Creates a rule keyed on `strategy`.
    pub fn new(limit: u32, window: Duration, strategy: KeyStrategy) -> Self {
        Self {
            limit,
            window,
            strategy,
            message: default_message(),
        }
    }

    /// Creates a per-IP rule.
    pub fn per_ip(limit: u32, window: Duration) -> Self {
        Self::new(limit, window, KeyStrategy::Ip)
    }

    /// Creates a per-user rule.
    pub fn per_user(limit: u32, window: Duration) -> Self {
        Self::new(limit, window, KeyStrategy::User)
    }

    /// Creates a global rule.
    pub fn global(limit: u32, window: Duration) -> Self {
        Self::new(limit, window, KeyStrategy::Global)
    }

    /// Sets the rejection message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Checks the rule is usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.limit == 0 {
            return Err("rate limit must be at least 1".to_string());
        }
        if self.window.is_zero() {
            return Err("rate limit window must be positive".to_string());
        }
        if self.window > MAX_WINDOW {
            return Err("rate limit window must not exceed 30 days".to_string());
        }
        Ok(())
    }

    /// Resolves the bucket subject for a request.
    ///
    /// Per-user rules fall back to the client IP, then to `anonymous`.
    pub fn subject<B>(&self, req: &Request<B>) -> String {
        match self.strategy {
            KeyStrategy::Global => "*".to_string(),
            KeyStrategy::Ip => client_ip(req)
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            KeyStrategy::User => req
                .extensions()
                .get::<IdentityContext>()
                .map(|ctx| ctx.user_id.to_string())
                .or_else(|| client_ip(req).map(|ip| ip.to_string()))
                .unwrap_or_else(|| "anonymous".to_string()),
        }
    }
}

// =============================================================================
// RateLimitConfig
// =============================================================================

/// Configuration for rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled.
    pub enabled: bool,
    /// Rule applied to every inbound call before authentication.
    pub inbound: RateLimitRule,
    /// Interval of the maintenance sweep.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// How long a bucket may stay past its window before it is evicted.
    #[serde(with = "humantime_serde")]
    pub idle_ttl: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inbound: RateLimitRule::per_ip(100, Duration::from_secs(1)),
            sweep_interval: Duration::from_secs(60),
            idle_ttl: Duration::from_secs(300),
        }
    }
}

impl RateLimitConfig {
    /// Creates a disabled configuration.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Checks the inbound rule and the eviction delay.
    pub fn validate(&self) -> Result<(), String> {
        self.inbound
            .validate()
            .map_err(|e| format!("inbound rate limit: {e}"))?;
        if self.idle_ttl > MAX_WINDOW {
            return Err("rate_limit.idle_ttl must not exceed 30 days".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// RateLimiter
// =============================================================================

/// Identity of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// Key strategy.
    pub strategy: KeyStrategy,
    /// IP, user id or `*`.
    pub subject: String,
    /// Operation the budget belongs to.
    pub operation: String,
}

#[derive(Debug)]
struct Bucket {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl Bucket {
    /// `None` when the end is past what `Instant` can represent.
    fn window_end(&self) -> Option<Instant> {
        self.window_start.checked_add(self.window)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The call fits the budget.
    Allowed {
        /// Calls left in the current window.
        remaining: u32,
    },
    /// The budget is spent.
    Limited {
        /// Time until the window resets.
        retry_after: Duration,
    },
}

impl RateLimitDecision {
    /// Returns `true` if the call may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Fixed-window counters shared by every rate limit layer.
///
/// The read-reset-increment-compare sequence runs under the map's entry lock,
/// so two calls on one key never both take the last slot.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<BucketKey, Bucket>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a call against `rule` for `subject` and `operation`.
    pub fn check(&self, rule: &RateLimitRule, subject: &str, operation: &str) -> RateLimitDecision {
        self.check_at(rule, subject, operation, Instant::now())
    }

    /// Same as [`check`](Self::check) at `now`.
    pub fn check_at(
        &self,
        rule: &RateLimitRule,
        subject: &str,
        operation: &str,
        now: Instant,
    ) -> RateLimitDecision {
        let key = BucketKey {
            strategy: rule.strategy,
            subject: subject.to_string(),
            operation: operation.to_string(),
        };

        let mut bucket = self.buckets.entry(key).or_insert_with(|| Bucket {
            count: 0,
            window_start: now,
            window: rule.window,
        });

        if bucket.window_end().is_some_and(|end| now >= end) {
            bucket.count = 0;
            bucket.window_start = now;
        }
        bucket.window = rule.window;
        bucket.count = bucket.count.saturating_add(1);

        if bucket.count > rule.limit {
            RateLimitDecision::Limited {
                retry_after: bucket
                    .window_end()
                    .map_or(bucket.window, |end| end.saturating_duration_since(now)),
            }
        } else {
            RateLimitDecision::Allowed {
                remaining: rule.limit - bucket.count,
            }
        }
    }

    /// Removes buckets whose window ended more than `idle` ago.
    pub fn sweep(&self, idle: Duration) -> usize {
        self.sweep_at(idle, Instant::now())
    }

    /// Same as [`sweep`](Self::sweep) at `now`.
    pub fn sweep_at(&self, idle: Duration, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            bucket
                .window_end()
                .and_then(|end| end.checked_add(idle))
                .map_or(true, |expiry| expiry > now)
        });
        before.saturating_sub(self.buckets.len())
    }

    /// Returns the number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if there are no buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

// =============================================================================
// RateLimitLayer
// =============================================================================

/// Layer applying one rule on behalf of one operation.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
    rule: Arc<RateLimitRule>,
    operation: Arc<str>,
    enabled: bool,
}

impl RateLimitLayer {
    /// Creates a new rate limit layer.
    pub fn new(limiter: Arc<RateLimiter>, rule: RateLimitRule, operation: impl Into<String>) -> Self {
        Self {
            limiter,
            rule: Arc::new(rule),
            operation: Arc::from(operation.into()),
            enabled: true,
        }
    }

    /// Turns the layer into a pass-through when `enabled` is false.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the rule.
    pub fn rule(&self) -> &RateLimitRule {
        &self.rule
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
            rule: self.rule.clone(),
            operation: self.operation.clone(),
            enabled: self.enabled,
        }
    }
}

// =============================================================================
// RateLimitMiddleware
// =============================================================================

/// Middleware for rate limiting.
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
    rule: Arc<RateLimitRule>,
    operation: Arc<str>,
    enabled: bool,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        if !self.enabled {
            let mut inner = self.inner.clone();
            return Box::pin(async move { inner.call(req).await });
        }

        let subject = self.rule.subject(&req);
        let decision = self.limiter.check(&self.rule, &subject, &self.operation);
        let rule = self.rule.clone();
        let operation = self.operation.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match decision {
                RateLimitDecision::Allowed { .. } => inner.call(req).await,
                RateLimitDecision::Limited { retry_after } => {
                    let seconds = retry_secs(retry_after);
                    tracing::debug!(
                        operation = %operation,
                        strategy = %rule.strategy,
                        subject = %subject,
                        retry_after = seconds,
                        "Rate limit exceeded"
                    );
                    Ok(ApiError::rate_limited(rule.message.clone(), Some(seconds)).into_response())
                }
            }
        })
    }
}

/// Rounds up to whole seconds, at least one.
fn retry_secs(remaining: Duration) -> u64 {
    let secs = remaining
        .as_secs()
        .saturating_add(u64::from(remaining.subsec_nanos() > 0));
    secs.max(1)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> RateLimitRule {
        RateLimitRule::per_ip(5, Duration::from_secs(60))
    }

    #[test]
    fn test_sixth_call_is_rejected() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.check_at(&rule(), "10.0.0.1", "op", now).is_allowed());
        }
        assert_eq!(
            limiter.check_at(&rule(), "10.0.0.1", "op", now),
            RateLimitDecision::Limited {
                retry_after: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn test_window_reset() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for _ in 0..6 {
            limiter.check_at(&rule(), "10.0.0.1", "op", start);
        }
        let later = start + Duration::from_secs(60);
        assert_eq!(
            limiter.check_at(&rule(), "10.0.0.1", "op", later),
            RateLimitDecision::Allowed { remaining: 4 }
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        let one = RateLimitRule::per_ip(1, Duration::from_secs(60));

        assert!(limiter.check_at(&one, "a", "op", now).is_allowed());
        assert!(!limiter.check_at(&one, "a", "op", now).is_allowed());
        assert!(limiter.check_at(&one, "b", "op", now).is_allowed());
        assert!(limiter.check_at(&one, "a", "other", now).is_allowed());
        assert_eq!(limiter.len(), 3);
    }

    #[test]
    fn test_rejections_are_not_refunded() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        let one = RateLimitRule::per_ip(1, Duration::from_secs(10));

        limiter.check_at(&one, "a", "op", now);
        for _ in 0..3 {
            assert!(!limiter.check_at(&one, "a", "op", now).is_allowed());
        }
        let mid = now + Duration::from_secs(4);
        assert_eq!(
            limiter.check_at(&one, "a", "op", mid),
            RateLimitDecision::Limited {
                retry_after: Duration::from_secs(6)
            }
        );
    }

    #[test]
    fn test_sweep_removes_idle_buckets() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        limiter.check_at(&rule(), "a", "op", now);
        limiter.check_at(&rule(), "b", "op", now + Duration::from_secs(100));

        let removed = limiter.sweep_at(Duration::from_secs(30), now + Duration::from_secs(120));
        assert_eq!(removed, 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_user_subject_falls_back() {
        let rule = RateLimitRule::per_user(1, Duration::from_secs(1));
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(rule.subject(&req), "anonymous");

        let global = RateLimitRule::global(1, Duration::from_secs(1));
        assert_eq!(global.subject(&req), "*");
    }

    #[test]
    fn test_retry_secs_rounds_up() {
        assert_eq!(retry_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_secs(Duration::ZERO), 1);
        assert_eq!(retry_secs(Duration::from_secs(7)), 7);
        assert_eq!(retry_secs(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        let rule: RateLimitRule =
            serde_json::from_str(r#"{"limit":5,"window":"500000years"}"#).unwrap();
        assert!(rule.validate().unwrap_err().contains("30 days"));

        let config = RateLimitConfig {
            idle_ttl: MAX_WINDOW + Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("idle_ttl"));
        assert!(RateLimitConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unbounded_window_does_not_overflow() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        let huge = RateLimitRule::per_ip(1, Duration::MAX);

        assert!(limiter.check_at(&huge, "a", "op", now).is_allowed());
        assert_eq!(
            limiter.check_at(&huge, "a", "op", now),
            RateLimitDecision::Limited {
                retry_after: Duration::MAX
            }
        );
        assert_eq!(limiter.sweep_at(Duration::MAX, now), 0);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_rule_deserialize() {
        let rule: RateLimitRule =
            serde_json::from_str(r#"{"limit":5,"window":"1m","strategy":"user"}"#).unwrap();
        assert_eq!(rule.window, Duration::from_secs(60));
        assert_eq!(rule.strategy, KeyStrategy::User);
        assert!(rule.validate().is_ok());
    }
}
