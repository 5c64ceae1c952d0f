// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Operation-level role gate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use tower::{Layer, Service};

use crate::auth::{IdentityContext, RbacCache, RoleRequirement, SUPER_ADMIN};
use crate::error::ApiError;

// =============================================================================
// RoleGate
// =============================================================================

/// Evaluates one operation's [`RoleRequirement`].
#[derive(Clone)]
pub struct RoleGate {
    requirement: Arc<RoleRequirement>,
    rbac: Arc<RbacCache>,
    super_admin: Arc<str>,
    operation: Arc<str>,
}

impl RoleGate {
    /// Creates a gate for `operation`.
    pub fn new(
        requirement: RoleRequirement,
        rbac: Arc<RbacCache>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            requirement: Arc::new(requirement),
            rbac,
            super_admin: Arc::from(SUPER_ADMIN),
            operation: Arc::from(operation.into()),
        }
    }

    /// Sets the role code that bypasses the rule.
    pub fn with_super_admin_role(mut self, role: impl Into<String>) -> Self {
        self.super_admin = Arc::from(role.into());
        self
    }

    /// Returns the rule.
    pub fn requirement(&self) -> &RoleRequirement {
        &self.requirement
    }

    /// Evaluates the rule for a caller.
    pub async fn check(&self, identity: Option<&IdentityContext>) -> Result<(), ApiError> {
        let Some(identity) = identity else {
            tracing::error!(
                operation = %self.operation,
                "Role gate reached without an identity; authentication did not run"
            );
            return Err(ApiError::unauthenticated("no identity at role gate"));
        };

        let required = &self.requirement.roles;
        if self.requirement.is_empty() || self.requirement.is_satisfied_by(&identity.held_roles()) {
            tracing::debug!(
                operation = %self.operation,
                user_id = %identity.user_id,
                "Role rule satisfied"
            );
            return Ok(());
        }

        if self.requirement.allow_super_admin && self.is_super_admin(identity).await {
            tracing::debug!(
                operation = %self.operation,
                user_id = %identity.user_id,
                "Super admin bypass"
            );
            return Ok(());
        }

        tracing::info!(
            operation = %self.operation,
            user_id = %identity.user_id,
            role = ?identity.role,
            required_roles = ?required,
            mode = ?self.requirement.mode,
            "Role rule not satisfied"
        );
        Err(ApiError::forbidden_role(required.iter().cloned()))
    }

    async fn is_super_admin(&self, identity: &IdentityContext) -> bool {
        match self.rbac.has_role(identity.user_id, &self.super_admin).await {
            Ok(held) => held,
            Err(e) => {
                tracing::warn!(user_id = %identity.user_id, error = %e, "Super admin lookup failed");
                false
            }
        }
    }
}

// =============================================================================
// RoleLayer
// =============================================================================

/// Layer running a [`RoleGate`] in front of a route.
#[derive(Clone)]
pub struct RoleLayer {
    gate: RoleGate,
}

impl RoleLayer {
    /// Creates a new role layer.
    pub fn new(gate: RoleGate) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for RoleLayer {
    type Service = RoleMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RoleMiddleware {
            inner,
            gate: self.gate.clone(),
        }
    }
}

// =============================================================================
// RoleMiddleware
// =============================================================================

/// Middleware for the role gate.
#[derive(Clone)]
pub struct RoleMiddleware<S> {
    inner: S,
    gate: RoleGate,
}

impl<S> Service<Request<Body>> for RoleMiddleware<S>
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
        let gate = self.gate.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let identity = req.extensions().get::<IdentityContext>().cloned();
            match gate.check(identity.as_ref()).await {
                Ok(()) => inner.call(req).await,
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        DirectorySeed, RbacCacheConfig, StaticDirectory, TokenClaims, TokenKind, UserRecord,
    };
    use serde_json::{Map, Value};

    fn rbac() -> Arc<RbacCache> {
        let seed = DirectorySeed {
            users: vec![UserRecord {
                id: 1,
                username: "root".to_string(),
                roles: vec![SUPER_ADMIN.to_string()],
            }],
            ..Default::default()
        };
        Arc::new(RbacCache::new(
            Arc::new(StaticDirectory::from_seed(seed)),
            RbacCacheConfig::default(),
        ))
    }

    fn caller(user_id: i64, role: &str) -> IdentityContext {
        let mut extra = Map::new();
        extra.insert("role".to_string(), Value::from(role));
        IdentityContext::from_claims(&TokenClaims {
            sub: "u".to_string(),
            uid: user_id,
            kind: TokenKind::Access,
            iat: 0,
            exp: 60,
            iss: "gatehouse".to_string(),
            jti: String::new(),
            extra,
        })
    }

    #[tokio::test]
    async fn test_and_rule_denies_single_role_caller() {
        let gate = RoleGate::new(RoleRequirement::all_of(["admin", "ops"]), rbac(), "op");
        let err = gate.check(Some(&caller(5, "admin"))).await.unwrap_err();
        assert!(matches!(err, ApiError::ForbiddenRole { ref required } if required.len() == 2));
    }

    #[tokio::test]
    async fn test_or_rule_allows() {
        let gate = RoleGate::new(RoleRequirement::any_of(["admin", "ops"]), rbac(), "op");
        assert!(gate.check(Some(&caller(5, "admin"))).await.is_ok());
    }

    #[tokio::test]
    async fn test_super_admin_bypass_toggle() {
        let rule = RoleRequirement::all_of(["admin"]);
        let gate = RoleGate::new(rule.clone(), rbac(), "op");
        assert!(gate.check(Some(&caller(1, "viewer"))).await.is_ok());

        let strict = RoleGate::new(rule.without_super_admin_bypass(), rbac(), "op");
        assert!(strict.check(Some(&caller(1, "viewer"))).await.is_err());
    }

    #[tokio::test]
    async fn test_no_identity_is_unauthenticated() {
        let gate = RoleGate::new(RoleRequirement::all_of(["admin"]), rbac(), "op");
        assert!(matches!(
            gate.check(None).await,
            Err(ApiError::Unauthenticated { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_rule_allows() {
        let gate = RoleGate::new(RoleRequirement::all_of(Vec::<String>::new()), rbac(), "op");
        assert!(gate.check(Some(&caller(5, "viewer"))).await.is_ok());
    }
}
