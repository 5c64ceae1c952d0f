// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # gatehouse-api
//!
//! Request authorization pipeline for HTTP services.
//!
//! Every inbound call passes through a fixed chain of gates:
//!
//! ```text
//! RateLimit(ip) -> Authentication -> Permission(path) -> handler
//!                                                         |
//!                                   Role(operation) <-----+
//!                                        |
//!                                   RateLimit(user) -> business logic
//! ```
//!
//! - [`auth::TokenService`] issues and validates bearer tokens.
//! - [`auth::IdentityContext`] is the per-request caller, carried in request
//!   extensions.
//! - [`auth::RbacCache`] memoizes directory lookups with a TTL and a per-user
//!   single-flight guard.
//! - [`middleware`] holds the gates as tower layers, plus the declarative
//!   [`middleware::OperationGuard`] that attaches per-operation rules to routes.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod server;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerBuilder};
pub use state::AppState;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
