// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Path-level permission gate.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{Method, Request},
    response::{IntoResponse, Response},
};
use tower::{Layer, Service};

use super::ExcludePaths;
use crate::auth::{IdentityContext, RbacCache, SUPER_ADMIN};
use crate::error::ApiError;

// =============================================================================
// PermissionGate
// =============================================================================

/// Decides whether a caller may reach a (path, method) pair.
#[derive(Clone)]
pub struct PermissionGate {
    rbac: Arc<RbacCache>,
    exclude: ExcludePaths,
    super_admin: Arc<str>,
}

impl PermissionGate {
    /// Creates a gate backed by the RBAC cache.
    pub fn new(rbac: Arc<RbacCache>) -> Self {
        Self {
            rbac,
            exclude: ExcludePaths::default(),
            super_admin: Arc::from(SUPER_ADMIN),
        }
    }

    /// Sets the paths that skip the gate.
    pub fn with_exclude(mut self, exclude: ExcludePaths) -> Self {
        self.exclude = exclude;
        self
    }

    /// Sets the role code that bypasses the gate.
    pub fn with_super_admin_role(mut self, role: impl Into<String>) -> Self {
        self.super_admin = Arc::from(role.into());
        self
    }

    /// Evaluates the gate.
    ///
    /// Returns the caller's permission codes when they could be resolved, or
    /// `None` for excluded paths. Directory failures deny.
    pub async fn check(
        &self,
        path: &str,
        method: &Method,
        identity: Option<&IdentityContext>,
    ) -> Result<Option<BTreeSet<String>>, ApiError> {
        if self.exclude.matches(path) {
            return Ok(None);
        }

        let Some(identity) = identity else {
            return Err(ApiError::unauthenticated("no identity for a protected path"));
        };
        let user_id = identity.user_id;

        match self.rbac.has_role(user_id, &self.super_admin).await {
            Ok(true) => {
                tracing::debug!(user_id = %user_id, path, "Super admin bypass");
                return Ok(Some(self.codes_of(identity).await));
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Super admin lookup failed, treating as not super admin");
            }
        }

        // Serve from the cached permission set when it already covers the call.
        if let Ok(permissions) = self.rbac.permissions_of(user_id).await {
            if permissions.covers(path, method) {
                return Ok(Some(permissions.codes()));
            }
        }

        match self.rbac.has_path_permission(user_id, path, method).await {
            Ok(true) => Ok(Some(self.codes_of(identity).await)),
            Ok(false) => {
                tracing::info!(
                    user_id = %user_id,
                    method = %method,
                    path,
                    "Path permission denied"
                );
                Err(ApiError::forbidden_permission(path, method.as_str()))
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, path, "Path permission lookup failed, denying");
                Err(ApiError::from(e))
            }
        }
    }

    async fn codes_of(&self, identity: &IdentityContext) -> BTreeSet<String> {
        self.rbac
            .permissions_of(identity.user_id)
            .await
            .map(|p| p.codes())
            .unwrap_or_default()
    }
}

// =============================================================================
// PermissionLayer
// =============================================================================

/// Layer running the [`PermissionGate`] before dispatch.
#[derive(Clone)]
pub struct PermissionLayer {
    gate: PermissionGate,
}

impl PermissionLayer {
    /// Creates a new permission layer.
    pub fn new(gate: PermissionGate) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for PermissionLayer {
    type Service = PermissionMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PermissionMiddleware {
            inner,
            gate: self.gate.clone(),
        }
    }
}

// =============================================================================
// PermissionMiddleware
// =============================================================================

/// Middleware for the path permission gate.
#[derive(Clone)]
pub struct PermissionMiddleware<S> {
    inner: S,
    gate: PermissionGate,
}

impl<S> Service<Request<Body>> for PermissionMiddleware<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let gate = self.gate.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let path = req.uri().path().to_string();
            let method = req.method().clone();
            let identity = req.extensions().get::<IdentityContext>().cloned();

            match gate.check(&path, &method, identity.as_ref()).await {
                Ok(Some(codes)) => {
                    if let Some(identity) = identity {
                        req.extensions_mut().insert(identity.with_permissions(codes));
                    }
                    inner.call(req).await
                }
                Ok(None) => inner.call(req).await,
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
        Directory, DirectoryError, Permission, PermissionSet, RbacCacheConfig, TokenClaims,
        TokenKind, UserId,
    };
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// User 1 is a super admin, user 2 may read `/docs`, user 3 breaks the directory.
    #[derive(Default)]
    struct FixedDirectory {
        path_calls: AtomicU64,
    }

    #[async_trait]
    impl Directory for FixedDirectory {
        async fn get_roles(&self, user_id: UserId) -> Result<HashSet<String>, DirectoryError> {
            match user_id {
                1 => Ok(HashSet::from([SUPER_ADMIN.to_string()])),
                3 => Err(DirectoryError::Unavailable("down".to_string())),
                _ => Ok(HashSet::from(["reader".to_string()])),
            }
        }

        async fn get_permissions(&self, user_id: UserId) -> Result<PermissionSet, DirectoryError> {
            match user_id {
                2 => Ok(PermissionSet::from_permissions([Permission::new(
                    "doc:read", "/docs", "GET",
                )])),
                3 => Err(DirectoryError::Unavailable("down".to_string())),
                _ => Ok(PermissionSet::new()),
            }
        }

        async fn has_path_permission(
            &self,
            user_id: UserId,
            _path: &str,
            _method: &Method,
        ) -> Result<bool, DirectoryError> {
            self.path_calls.fetch_add(1, Ordering::SeqCst);
            match user_id {
                3 => Err(DirectoryError::Unavailable("down".to_string())),
                4 => Ok(true),
                _ => Ok(false),
            }
        }
    }

    fn identity(user_id: UserId) -> IdentityContext {
        IdentityContext::from_claims(&TokenClaims {
            sub: format!("user{user_id}"),
            uid: user_id,
            kind: TokenKind::Access,
            iat: 0,
            exp: 60,
            iss: "gatehouse".to_string(),
            jti: String::new(),
            extra: Default::default(),
        })
    }

    fn gate(dir: Arc<FixedDirectory>) -> PermissionGate {
        PermissionGate::new(Arc::new(RbacCache::new(dir, RbacCacheConfig::default())))
            .with_exclude(ExcludePaths::new(["/public"]))
    }

    #[tokio::test]
    async fn test_excluded_path_needs_no_identity() {
        let gate = gate(Arc::new(FixedDirectory::default()));
        assert_eq!(gate.check("/public/x", &Method::GET, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthenticated() {
        let gate = gate(Arc::new(FixedDirectory::default()));
        let err = gate.check("/docs", &Method::GET, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated { .. }));
    }

    #[tokio::test]
    async fn test_super_admin_bypasses_directory_no() {
        let dir = Arc::new(FixedDirectory::default());
        let gate = gate(dir.clone());
        assert!(gate.check("/secret", &Method::DELETE, Some(&identity(1))).await.is_ok());
        assert_eq!(dir.path_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cached_permissions_skip_directory() {
        let dir = Arc::new(FixedDirectory::default());
        let gate = gate(dir.clone());

        let codes = gate.check("/docs/1", &Method::GET, Some(&identity(2))).await.unwrap();
        assert_eq!(codes, Some(BTreeSet::from(["doc:read".to_string()])));
        assert_eq!(dir.path_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_directory_decides_uncached_paths() {
        let dir = Arc::new(FixedDirectory::default());
        let gate = gate(dir.clone());

        let err = gate.check("/docs", &Method::POST, Some(&identity(2))).await.unwrap_err();
        assert!(matches!(err, ApiError::ForbiddenPermission { .. }));
        assert!(gate.check("/docs", &Method::POST, Some(&identity(4))).await.is_ok());
        assert_eq!(dir.path_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_directory_failure_denies() {
        let gate = gate(Arc::new(FixedDirectory::default()));
        let err = gate.check("/docs", &Method::GET, Some(&identity(3))).await.unwrap_err();
        assert!(matches!(err, ApiError::DirectoryUnavailable { .. }));
    }
}
