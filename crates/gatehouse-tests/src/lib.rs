// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # gatehouse-tests
//!
//! Shared utilities for the gatehouse integration tests.
//!
//! ## Modules
//!
//! - [`common::fixtures`]: seeded users, roles and configuration
//! - [`common::mocks`]: an instrumented [`Directory`](gatehouse_api::auth::Directory)
//! - [`common::harness`]: an in-process router driven with `oneshot`
//!
//! ## Example
//!
//! ```rust,ignore
//! use gatehouse_tests::prelude::*;
//!
//! #[tokio::test]
//! async fn test_me() {
//!     let app = TestApp::new();
//!     let token = app.token_for(&UserFixtures::alice());
//!     let response = app.get("/api/v1/auth/me", Some(&token)).await;
//!     assert_eq!(response.status, StatusCode::OK);
//! }
//! ```

pub mod common;

/// Re-exports for test files.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
    pub use crate::common::init_test_logging;

    pub use axum::http::{Method, StatusCode};
    pub use gatehouse_api::auth::*;
    pub use gatehouse_api::middleware::{
        KeyStrategy, OperationPolicy, OperationTable, RateLimitConfig, RateLimitDecision,
        RateLimitRule, RateLimiter, TOKEN_EXPIRING_HEADER,
    };
    pub use gatehouse_api::{ApiConfig, ApiServer, ApiServerBuilder, AppState};
    pub use std::sync::Arc;
    pub use std::time::Duration;
}
