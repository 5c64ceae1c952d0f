// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-request caller identity.

use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{TokenClaims, UserId};

// =============================================================================
// IdentityContext
// =============================================================================

/// The caller of one request.
///
/// Built by the authentication gate and stored in the request's extensions.
/// It lives exactly as long as the request, so nothing outlives the call
/// that resolved it.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    /// User id from the token.
    pub user_id: UserId,
    /// Username from the token.
    pub username: String,
    /// Primary role from the token, if the token carries one.
    pub role: Option<String>,
    /// Permission codes, attached once the permission gate resolved them.
    pub permissions: Option<Arc<BTreeSet<String>>>,
    /// Request identifier.
    pub request_id: Uuid,
    /// Client IP address, when known.
    pub client_ip: Option<IpAddr>,
    /// Expiry of the presented token.
    pub expires_at: DateTime<Utc>,
}

impl IdentityContext {
    /// Creates a context from validated claims.
    pub fn from_claims(claims: &TokenClaims) -> Self {
        Self {
            user_id: claims.user_id(),
            username: claims.username().to_string(),
            role: claims
                .role()
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            permissions: None,
            request_id: Uuid::now_v7(),
            client_ip: None,
            expires_at: claims.expires_at(),
        }
    }

    /// Sets the client IP.
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Sets the request ID.
    pub fn with_request_id(mut self, id: Uuid) -> Self {
        self.request_id = id;
        self
    }

    /// Attaches resolved permission codes.
    pub fn with_permissions<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.permissions = Some(Arc::new(codes.into_iter().collect()));
        self
    }

    /// The roles held for rule evaluation: the single primary role, if any.
    pub fn held_roles(&self) -> HashSet<String> {
        self.role.iter().cloned().collect()
    }

    /// Returns `true` if the primary role equals `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    /// Returns `true` if the permission code was attached.
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions
            .as_ref()
            .is_some_and(|codes| codes.contains(code))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenKind;
    use serde_json::{Map, Value};

    fn claims(role: Option<&str>) -> TokenClaims {
        let mut extra = Map::new();
        if let Some(role) = role {
            extra.insert("role".to_string(), Value::from(role));
        }
        TokenClaims {
            sub: "alice".to_string(),
            uid: 3,
            kind: TokenKind::Access,
            iat: 0,
            exp: 60,
            iss: "gatehouse".to_string(),
            jti: String::new(),
            extra,
        }
    }

    #[test]
    fn test_from_claims() {
        let ctx = IdentityContext::from_claims(&claims(Some("ops")));
        assert_eq!(ctx.user_id, 3);
        assert_eq!(ctx.username, "alice");
        assert!(ctx.has_role("ops"));
        assert_eq!(ctx.held_roles(), HashSet::from(["ops".to_string()]));
        assert!(ctx.permissions.is_none());
    }

    #[test]
    fn test_missing_role_holds_nothing() {
        let ctx = IdentityContext::from_claims(&claims(None));
        assert!(ctx.held_roles().is_empty());

        let ctx = IdentityContext::from_claims(&claims(Some("")));
        assert!(ctx.role.is_none());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = IdentityContext::from_claims(&claims(None));
        let b = IdentityContext::from_claims(&claims(None));
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_attached_permissions() {
        let ctx = IdentityContext::from_claims(&claims(None))
            .with_permissions(vec!["user:read".to_string()]);
        assert!(ctx.has_permission("user:read"));
        assert!(!ctx.has_permission("user:write"));
    }
}
