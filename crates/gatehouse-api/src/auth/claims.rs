// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Token claim set.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::UserId;

/// Claim names owned by the token format. Extra claims may not reuse them.
pub const RESERVED_CLAIMS: &[&str] = &["sub", "uid", "type", "iat", "exp", "iss", "jti"];

/// Extra claim carrying the caller's primary role.
pub const ROLE_CLAIM: &str = "role";

// =============================================================================
// TokenKind
// =============================================================================

/// Kind of a token. Fixed at issue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived token presented on every call.
    Access,
    /// Long-lived token exchanged for a new access token.
    Refresh,
}

impl TokenKind {
    /// Returns the wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    /// Parses a kind from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "access" => Some(TokenKind::Access),
            "refresh" => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TokenClaims
// =============================================================================

/// Decoded claim set of a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the username.
    pub sub: String,
    /// Numeric user id.
    pub uid: UserId,
    /// Token kind.
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expires at (unix seconds).
    pub exp: i64,
    /// Issuer.
    #[serde(default)]
    pub iss: String,
    /// Unique token id.
    #[serde(default)]
    pub jti: String,
    /// Open map of extra claims, e.g. `role`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    /// Returns the username.
    pub fn username(&self) -> &str {
        &self.sub
    }

    /// Returns the user id.
    pub fn user_id(&self) -> UserId {
        self.uid
    }

    /// Returns the `role` claim if present and a string.
    pub fn role(&self) -> Option<&str> {
        self.extra.get(ROLE_CLAIM).and_then(Value::as_str)
    }

    /// Returns an extra claim by name.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// Returns the issue instant.
    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns the expiry instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns `true` once `now` has reached the expiry instant plus `leeway`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        let leeway = chrono::Duration::from_std(leeway).unwrap_or_else(|_| chrono::Duration::zero());
        now >= self.expires_at() + leeway
    }

    /// Time left until expiry at `now`, clamped to zero.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at() - now).to_std().unwrap_or(Duration::ZERO)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn claims(iat: i64, exp: i64) -> TokenClaims {
        let mut extra = Map::new();
        extra.insert(ROLE_CLAIM.to_string(), Value::from("admin"));
        TokenClaims {
            sub: "alice".to_string(),
            uid: 7,
            kind: TokenKind::Access,
            iat,
            exp,
            iss: "gatehouse".to_string(),
            jti: "id".to_string(),
            extra,
        }
    }

    #[test]
    fn test_kind_round_trip_names() {
        assert_eq!(TokenKind::parse("ACCESS"), Some(TokenKind::Access));
        assert_eq!(TokenKind::parse("refresh"), Some(TokenKind::Refresh));
        assert_eq!(TokenKind::parse("id"), None);
        assert_eq!(TokenKind::Refresh.to_string(), "refresh");
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(claims(100, 200)).unwrap();
        assert_eq!(value["type"], "access");
        assert_eq!(value["uid"], 7);
        assert_eq!(value["role"], "admin");
        assert!(value.get("extra").is_none());
    }

    #[test]
    fn test_expiry_boundary() {
        let c = claims(1_000, 2_000);
        let at = |secs| Utc.timestamp_opt(secs, 0).unwrap();

        assert!(!c.is_expired_at(at(1_999), Duration::ZERO));
        assert!(c.is_expired_at(at(2_000), Duration::ZERO));
        assert!(!c.is_expired_at(at(2_000), Duration::from_secs(5)));

        assert_eq!(c.remaining_at(at(1_990)), Duration::from_secs(10));
        assert_eq!(c.remaining_at(at(2_000)), Duration::ZERO);
        assert_eq!(c.remaining_at(at(3_000)), Duration::ZERO);
    }

    #[test]
    fn test_role_claim() {
        assert_eq!(claims(0, 1).role(), Some("admin"));
    }
}
