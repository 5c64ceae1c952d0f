// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Request and response bodies.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{RbacStats, UserId};

// =============================================================================
// Auth
// =============================================================================

/// Body of `POST {base}/auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    /// A refresh token.
    pub refresh_token: String,
}

/// A freshly issued token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

impl AuthResponse {
    /// Creates a bearer token pair.
    pub fn bearer(access_token: String, refresh_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Body of `GET {base}/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    /// User id.
    pub user_id: UserId,
    /// Username.
    pub username: String,
    /// Primary role.
    pub role: Option<String>,
    /// Permission codes resolved by the permission gate.
    pub permissions: BTreeSet<String>,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
    /// Seconds until the token expires.
    pub remaining_secs: u64,
    /// Whether the caller should refresh now.
    pub expiring_soon: bool,
}

// =============================================================================
// Admin
// =============================================================================

/// Body of `POST {base}/admin/rbac/{user_id}/invalidate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateResponse {
    /// The user whose entry was dropped.
    pub user_id: UserId,
    /// Whether an entry existed.
    pub invalidated: bool,
}

/// Body of `GET {base}/admin/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// RBAC cache counters.
    pub rbac: RbacStats,
    /// Live rate limit buckets.
    pub rate_limit_buckets: usize,
    /// Seconds since the server state was built.
    pub uptime_secs: u64,
}

// =============================================================================
// Health
// =============================================================================

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests.
    pub status: String,
    /// Crate version.
    pub version: String,
}

impl HealthResponse {
    /// Creates a healthy response.
    pub fn healthy() -> Self {
        Self {
            status: "ok".to_string(),
            version: crate::VERSION.to_string(),
        }
    }
}
