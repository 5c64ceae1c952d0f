// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Rate Limit Integration Tests
//!
//! Time is paused so windows can be stepped through with `advance`.
//!
//! - `test_inbound_*`: the per-IP limit in front of authentication
//! - `test_operation_*`: per-operation limits attached to routes
//! - `test_limiter_*`: the shared counters directly

use gatehouse_tests::prelude::*;
use tokio::time::{advance, Instant};

const ME: &str = "/api/v1/auth/me";

fn inbound(limit: u32, window: Duration) -> ApiConfig {
    let rate_limit = RateLimitConfig {
        inbound: RateLimitRule::per_ip(limit, window),
        ..RateLimitConfig::default()
    };
    ConfigFixtures::api_config().with_rate_limit(rate_limit)
}

async fn health_from(app: &TestApp, peer: &str) -> TestResponse {
    app.send(RequestBuilder::new(Method::GET, "/health").peer(peer).build())
        .await
}

// =============================================================================
// Inbound
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_inbound_limit_per_ip() {
    let app = TestApp::builder()
        .config(inbound(3, Duration::from_secs(10)))
        .build();

    for _ in 0..3 {
        assert_eq!(health_from(&app, "10.0.0.1:1000").await.status, StatusCode::OK);
    }

    let limited = health_from(&app, "10.0.0.1:1001").await;
    limited.assert_rejected(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED");
    assert_eq!(limited.retry_after(), Some(10));
    assert_eq!(limited.error().retry_after, Some(10));

    // Another address has its own budget.
    assert_eq!(health_from(&app, "10.0.0.2:1000").await.status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_window_resets() {
    let app = TestApp::builder()
        .config(inbound(2, Duration::from_secs(10)))
        .build();
    let peer = "10.0.0.7:5000";

    health_from(&app, peer).await;
    health_from(&app, peer).await;

    advance(Duration::from_millis(9_500)).await;
    let limited = health_from(&app, peer).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    // Rounded up, never zero.
    assert_eq!(limited.retry_after(), Some(1));

    advance(Duration::from_millis(500)).await;
    assert_eq!(health_from(&app, peer).await.status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_runs_before_authentication() {
    let app = TestApp::builder()
        .config(inbound(1, Duration::from_secs(60)))
        .build();

    app.get(ME, None)
        .await
        .assert_rejected(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED");
    app.get(ME, None)
        .await
        .assert_rejected(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED");
}

#[tokio::test(start_paused = true)]
async fn test_inbound_disabled() {
    let rate_limit = RateLimitConfig {
        enabled: false,
        inbound: RateLimitRule::per_ip(1, Duration::from_secs(60)),
        ..RateLimitConfig::default()
    };
    let app = TestApp::builder()
        .config(ConfigFixtures::api_config().with_rate_limit(rate_limit))
        .build();
    let token = app.token_for(&UserFixtures::bob());

    for _ in 0..5 {
        assert_eq!(app.get(ME, Some(&token)).await.status, StatusCode::OK);
    }
    assert!(app.state().limiter.is_empty());
}

// =============================================================================
// Operation
// =============================================================================

fn me_limited(limit: u32, window: Duration) -> ApiConfig {
    let operations = OperationTable::default().with(
        "auth.me",
        OperationPolicy::default().with_rate_limit(
            RateLimitRule::per_user(limit, window).with_message("Slow down"),
        ),
    );
    ConfigFixtures::api_config().with_operations(operations)
}

#[tokio::test(start_paused = true)]
async fn test_operation_limit_per_user() {
    let app = TestApp::builder()
        .config(me_limited(2, Duration::from_secs(30)))
        .build();
    let bob = app.token_for(&UserFixtures::bob());
    let alice = app.token_for(&UserFixtures::alice());

    assert_eq!(app.get(ME, Some(&bob)).await.status, StatusCode::OK);
    advance(Duration::from_secs(5)).await;
    assert_eq!(app.get(ME, Some(&bob)).await.status, StatusCode::OK);

    let limited = app.get(ME, Some(&bob)).await;
    limited.assert_rejected(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED");
    assert_eq!(limited.error().message, "Slow down");
    assert_eq!(limited.retry_after(), Some(25));

    // Budgets are per user, even from the same address.
    assert_eq!(app.get(ME, Some(&alice)).await.status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_operation_limit_after_permission_gate() {
    // A caller rejected by the gates in front does not spend the budget.
    let app = TestApp::builder()
        .config(me_limited(1, Duration::from_secs(30)))
        .build();
    let carol = app.token_for(&UserFixtures::carol());
    let bob = app.token_for(&UserFixtures::bob());

    for _ in 0..3 {
        assert_eq!(app.get(ME, Some(&carol)).await.status, StatusCode::FORBIDDEN);
    }
    assert_eq!(app.get(ME, Some(&bob)).await.status, StatusCode::OK);
    assert_eq!(
        app.get(ME, Some(&bob)).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test(start_paused = true)]
async fn test_operation_refresh_limited_per_ip() {
    let operations = OperationTable::default().with(
        "auth.refresh",
        OperationPolicy::default().with_rate_limit(RateLimitRule::per_ip(1, Duration::from_secs(60))),
    );
    let app = TestApp::builder()
        .config(ConfigFixtures::api_config().with_operations(operations))
        .build();
    let body = serde_json::json!({ "refresh_token": "bogus" });

    app.post_json("/api/v1/auth/refresh", None, &body)
        .await
        .assert_rejected(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED");
    app.post_json("/api/v1/auth/refresh", None, &body)
        .await
        .assert_rejected(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED");
}

// =============================================================================
// Limiter
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_limiter_operations_do_not_share_buckets() {
    let limiter = RateLimiter::new();
    let rule = RateLimitRule::per_user(1, Duration::from_secs(60));

    assert!(limiter.check(&rule, "7", "reports.export").is_allowed());
    assert!(limiter.check(&rule, "7", "reports.list").is_allowed());
    assert!(!limiter.check(&rule, "7", "reports.export").is_allowed());
    assert_eq!(limiter.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_limiter_sweep_drops_idle_buckets() {
    let limiter = RateLimiter::new();
    let rule = RateLimitRule::per_ip(5, Duration::from_secs(10));
    let start = Instant::now();

    limiter.check_at(&rule, "10.0.0.1", "inbound", start);
    limiter.check_at(&rule, "10.0.0.2", "inbound", start + Duration::from_secs(30));

    let idle = Duration::from_secs(15);
    assert_eq!(limiter.sweep_at(idle, start + Duration::from_secs(26)), 1);
    assert_eq!(limiter.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_limiter_reports_remaining() {
    let limiter = RateLimiter::new();
    let rule = RateLimitRule::global(3, Duration::from_secs(1));

    assert_eq!(
        limiter.check(&rule, "*", "inbound"),
        RateLimitDecision::Allowed { remaining: 2 }
    );
    limiter.check(&rule, "*", "inbound");
    limiter.check(&rule, "*", "inbound");
    assert!(matches!(
        limiter.check(&rule, "*", "inbound"),
        RateLimitDecision::Limited { .. }
    ));
}
