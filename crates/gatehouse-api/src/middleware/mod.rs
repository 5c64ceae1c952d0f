// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The authorization gates as tower layers.
//!
//! - [`RateLimitLayer`]: fixed-window call budgets, per IP, per user or global
//! - [`AuthLayer`]: token verification, attaches the [`IdentityContext`]
//! - [`PermissionLayer`]: path-level check against the caller's permissions
//! - [`RoleLayer`]: operation-level role rule
//! - [`OperationGuard`]: attaches the role and rate limit layers of an
//!   operation to a route
//!
//! [`IdentityContext`]: crate::auth::IdentityContext

mod auth;
mod operation;
mod permission;
mod rate_limit;
mod role;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::Request;

pub use auth::{authenticate, AuthLayer, AuthMiddleware, Authenticated, TOKEN_EXPIRING_HEADER};
pub use operation::{OperationGuard, OperationPolicy, OperationTable};
pub use permission::{PermissionGate, PermissionLayer, PermissionMiddleware};
pub use rate_limit::{
    BucketKey, KeyStrategy, RateLimitConfig, RateLimitDecision, RateLimitLayer,
    RateLimitMiddleware, RateLimitRule, RateLimiter,
};
pub use role::{RoleGate, RoleLayer, RoleMiddleware};

// =============================================================================
// ExcludePaths
// =============================================================================

/// Path prefixes that skip authentication and the permission gate.
///
/// A trailing `*` on an entry is ignored; every entry is a prefix.
#[derive(Debug, Clone, Default)]
pub struct ExcludePaths {
    prefixes: Arc<[String]>,
}

impl ExcludePaths {
    /// Creates the list from configured entries.
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let prefixes: Vec<String> = entries
            .into_iter()
            .map(Into::into)
            .map(|p| p.trim_end_matches('*').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            prefixes: prefixes.into(),
        }
    }

    /// Returns `true` if `path` starts with an excluded prefix.
    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// Returns the peer address recorded by the server, if any.
pub(crate) fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
}
