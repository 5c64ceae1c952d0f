// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application state shared across handlers and layers.

use std::sync::Arc;

use tokio::time::Instant;

use crate::auth::{Directory, DirectorySeed, RbacCache, StaticDirectory, TokenService};
use crate::config::ApiConfig;
use crate::error::ApiResult;
use crate::middleware::{OperationGuard, RateLimiter};

// =============================================================================
// AppState
// =============================================================================

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: Arc<ApiConfig>,
    /// Token issuing and validation.
    pub tokens: Arc<TokenService>,
    /// RBAC cache in front of the directory.
    pub rbac: Arc<RbacCache>,
    /// Counters shared by every rate limit layer.
    pub limiter: Arc<RateLimiter>,
    /// When the state was built.
    pub started_at: Instant,
}

impl AppState {
    /// Creates a new app state builder.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Returns the token service.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Returns the RBAC cache.
    pub fn rbac(&self) -> &RbacCache {
        &self.rbac
    }

    /// Returns a guard attaching operation rules from the configuration.
    pub fn operation_guard(&self) -> OperationGuard {
        OperationGuard::new(
            Arc::new(self.config.operations.clone()),
            self.rbac.clone(),
            self.limiter.clone(),
        )
        .with_super_admin_role(self.config.auth.super_admin_role.clone())
        .with_rate_limit(self.config.rate_limit.enabled)
    }
}

// =============================================================================
// AppStateBuilder
// =============================================================================

/// Builder for constructing AppState.
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<ApiConfig>,
    tokens: Option<Arc<TokenService>>,
    directory: Option<Arc<dyn Directory>>,
    limiter: Option<Arc<RateLimiter>>,
}

impl AppStateBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    pub fn config(mut self, config: ApiConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the token service.
    pub fn tokens(mut self, tokens: Arc<TokenService>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Sets the directory.
    pub fn directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Uses a [`StaticDirectory`] built from `seed`.
    pub fn seed(self, seed: DirectorySeed) -> Self {
        self.directory(Arc::new(StaticDirectory::from_seed(seed)))
    }

    /// Sets the rate limiter.
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Builds the AppState.
    ///
    /// Without a directory, an empty [`StaticDirectory`] is used, which
    /// grants nothing.
    pub fn build(self) -> ApiResult<AppState> {
        let config = self.config.unwrap_or_default();

        let tokens = match self.tokens {
            Some(tokens) => tokens,
            None => Arc::new(TokenService::new(config.token.clone())?),
        };

        let directory = self.directory.unwrap_or_else(|| {
            tracing::warn!("No directory configured; every protected path will be denied");
            Arc::new(StaticDirectory::default())
        });
        let rbac = Arc::new(RbacCache::new(directory, config.rbac.clone()));

        Ok(AppState {
            config: Arc::new(config),
            tokens,
            rbac,
            limiter: self.limiter.unwrap_or_default(),
            started_at: Instant::now(),
        })
    }
}

// =============================================================================
// FromRef implementations for extracting parts of state
// =============================================================================

impl axum::extract::FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<RbacCache> {
    fn from_ref(state: &AppState) -> Self {
        state.rbac.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<ApiConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenConfig;

    #[test]
    fn test_build_requires_secret() {
        assert!(AppState::builder().build().is_err());

        let config = ApiConfig::default()
            .with_token(TokenConfig::new("test-secret-key-that-is-long-enough"));
        let state = AppState::builder().config(config).build().unwrap();
        assert!(state.rbac().is_empty());
        assert!(state.limiter.is_empty());
    }
}
