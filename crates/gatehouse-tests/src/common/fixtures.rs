// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! A small organisation used across the integration tests:
//!
//! | id | user  | roles         | can reach                             |
//! |----|-------|---------------|---------------------------------------|
//! | 1  | root  | `super_admin` | everything, through the bypass        |
//! | 2  | alice | `admin`       | `/api/v1/admin/*`, `GET /auth/me`     |
//! | 3  | bob   | `viewer`      | `GET /auth/me`                        |
//! | 4  | carol | none          | nothing                               |
//! | 5  | dave  | `auditor`     | `/api/v1/admin/*`, without the role   |

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use gatehouse_api::auth::{
    DirectorySeed, Permission, TokenConfig, TokenKind, TokenService, UserRecord, ROLE_CLAIM,
};
use gatehouse_api::middleware::RateLimitConfig;
use gatehouse_api::ApiConfig;
use serde_json::{Map, Value};

/// Signing secret shared by every fixture configuration.
pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

// =============================================================================
// User Fixtures
// =============================================================================

/// The seeded users.
pub struct UserFixtures;

impl UserFixtures {
    /// Super admin.
    pub fn root() -> UserRecord {
        user(1, "root", &["super_admin"])
    }

    /// Administrator.
    pub fn alice() -> UserRecord {
        user(2, "alice", &["admin"])
    }

    /// Read-only user.
    pub fn bob() -> UserRecord {
        user(3, "bob", &["viewer"])
    }

    /// User without roles.
    pub fn carol() -> UserRecord {
        user(4, "carol", &[])
    }

    /// Holds admin paths through the `auditor` role but not the `admin` role.
    pub fn dave() -> UserRecord {
        user(5, "dave", &["auditor"])
    }

    /// Every seeded user.
    pub fn all() -> Vec<UserRecord> {
        vec![
            Self::root(),
            Self::alice(),
            Self::bob(),
            Self::carol(),
            Self::dave(),
        ]
    }
}

fn user(id: i64, username: &str, roles: &[&str]) -> UserRecord {
    UserRecord {
        id,
        username: username.to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
    }
}

// =============================================================================
// Directory Fixtures
// =============================================================================

/// Role grants for the seeded users.
pub struct DirectoryFixtures;

impl DirectoryFixtures {
    /// The full seed.
    pub fn seed() -> DirectorySeed {
        let me = Permission::new("profile:read", "/api/v1/auth/me", "GET");
        let admin = Permission::any_method("admin:all", "/api/v1/admin/*");

        DirectorySeed {
            users: UserFixtures::all(),
            roles: HashMap::from([
                ("admin".to_string(), vec![admin.clone(), me.clone()]),
                (
                    "viewer".to_string(),
                    vec![me, Permission::new("report:read", "/api/v1/reports", "GET")],
                ),
                ("auditor".to_string(), vec![admin]),
            ]),
        }
    }
}

// =============================================================================
// Config Fixtures
// =============================================================================

/// API configurations.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// Default configuration with the test secret.
    pub fn api_config() -> ApiConfig {
        ApiConfig::default().with_token(Self::token_config())
    }

    /// Same as [`api_config`](Self::api_config) with rate limiting off.
    pub fn unlimited() -> ApiConfig {
        Self::api_config().with_rate_limit(RateLimitConfig::disabled())
    }

    /// Token configuration with the test secret.
    pub fn token_config() -> TokenConfig {
        TokenConfig::new(TEST_SECRET)
    }

    /// A token service over [`token_config`](Self::token_config).
    pub fn token_service() -> TokenService {
        TokenService::new(Self::token_config()).expect("fixture token config is valid")
    }
}

// =============================================================================
// Token Fixtures
// =============================================================================

/// Extra claims carrying the user's primary role.
pub fn role_claims(user: &UserRecord) -> Map<String, Value> {
    let mut extra = Map::new();
    if let Some(role) = user.primary_role() {
        extra.insert(ROLE_CLAIM.to_string(), Value::from(role));
    }
    extra
}

/// Issues a token of `kind` for `user` at `now`.
pub fn issue_for(
    tokens: &TokenService,
    user: &UserRecord,
    kind: TokenKind,
    now: DateTime<Utc>,
) -> String {
    tokens
        .issue_at(kind, user.id, &user.username, role_claims(user), now)
        .expect("fixture token issues")
}
