// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::{Directory, DirectorySeed, TokenService};
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::handlers;
use crate::middleware::{
    AuthLayer, ExcludePaths, PermissionGate, PermissionLayer, RateLimitLayer, RateLimiter,
};
use crate::state::{AppState, AppStateBuilder};

/// Operation id of the inbound, pre-authentication rate limit.
pub const INBOUND_OPERATION: &str = "inbound";

// =============================================================================
// ApiServer
// =============================================================================

/// The API server.
pub struct ApiServer {
    state: AppState,
    config: Arc<ApiConfig>,
}

impl ApiServer {
    /// Creates a new API server with the given state.
    pub fn new(state: AppState) -> Self {
        let config = state.config.clone();
        Self { state, config }
    }

    /// Returns the shared state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Creates the router with all routes and the gate chain.
    pub fn router(&self) -> Router {
        let config = &self.config;
        let exclude = ExcludePaths::new(config.resolved_exclude_paths());

        let inbound = RateLimitLayer::new(
            self.state.limiter.clone(),
            config.rate_limit.inbound.clone(),
            INBOUND_OPERATION,
        )
        .with_enabled(config.rate_limit.enabled);
        let auth = AuthLayer::new(self.state.tokens.clone())
            .with_exclude(exclude.clone())
            .with_cookie_name(config.auth.cookie_name.clone());
        let permission = PermissionLayer::new(
            PermissionGate::new(self.state.rbac.clone())
                .with_exclude(exclude)
                .with_super_admin_role(config.auth.super_admin_role.clone()),
        );

        // Outermost first: the request meets the IP limit, then authentication,
        // then the path check.
        let middleware_stack = ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                config.request_timeout,
            ))
            .layer(create_cors_layer(config))
            .layer(inbound)
            .layer(auth)
            .layer(permission);

        let base = config.normalized_base_path();
        let guard = self.state.operation_guard();

        Router::new()
            .route("/health", get(handlers::health))
            .route(
                &format!("{base}/auth/refresh"),
                guard.guard("auth.refresh", post(handlers::refresh)),
            )
            .route(
                &format!("{base}/auth/me"),
                guard.guard("auth.me", get(handlers::me)),
            )
            .route(
                &format!("{base}/admin/rbac/{{user_id}}/invalidate"),
                guard.guard("rbac.invalidate", post(handlers::invalidate_rbac)),
            )
            .route(
                &format!("{base}/admin/stats"),
                guard.guard("admin.stats", get(handlers::stats)),
            )
            .layer(DefaultBodyLimit::max(config.max_body_size))
            .layer(middleware_stack)
            .with_state(self.state.clone())
    }

    /// Spawns the task that sweeps idle buckets and stale cache entries.
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        let rbac = self.state.rbac.clone();
        let limiter = self.state.limiter.clone();
        let period = self.config.rate_limit.sweep_interval.max(Duration::from_secs(1));
        let idle = self.config.rate_limit.idle_ttl;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let buckets = limiter.sweep(idle);
                let entries = rbac.purge_expired();
                if buckets > 0 || entries > 0 {
                    tracing::debug!(buckets, entries, "Maintenance sweep");
                }
            }
        })
    }

    /// Runs the server until the process is stopped.
    pub async fn run(self) -> ApiResult<()> {
        self.run_with_shutdown(std::future::pending()).await
    }

    /// Runs the server with graceful shutdown.
    pub async fn run_with_shutdown(
        self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> ApiResult<()> {
        let addr = self.config.socket_addr();
        let router = self.router();

        info!("Starting API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to bind {}: {}", addr, e)))?;

        let maintenance = self.spawn_maintenance();

        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ApiError::internal(format!("Server error: {}", e)));

        maintenance.abort();
        served?;

        info!("API server shutdown complete");
        Ok(())
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.config.socket_addr()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Creates the CORS layer from configuration.
fn create_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = &config.cors;

    let mut layer = CorsLayer::new()
        .max_age(Duration::from_secs(cors.max_age))
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    let methods: Vec<Method> = cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    layer = layer.allow_methods(methods);

    let wildcard = cors.allowed_origins.iter().any(|o| o == "*");
    if wildcard {
        layer = layer.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = cors
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        layer = layer.allow_origin(origins);
    }

    // Credentials cannot be combined with a wildcard origin.
    if cors.allow_credentials && !wildcard {
        layer = layer.allow_credentials(true);
    }

    layer
}

// =============================================================================
// Server Builder
// =============================================================================

/// Builder for creating the API server.
#[derive(Default)]
pub struct ApiServerBuilder {
    state_builder: AppStateBuilder,
}

impl ApiServerBuilder {
    /// Creates a new server builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    pub fn config(mut self, config: ApiConfig) -> Self {
        self.state_builder = self.state_builder.config(config);
        self
    }

    /// Sets the token service.
    pub fn tokens(mut self, tokens: Arc<TokenService>) -> Self {
        self.state_builder = self.state_builder.tokens(tokens);
        self
    }

    /// Sets the directory.
    pub fn directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.state_builder = self.state_builder.directory(directory);
        self
    }

    /// Uses an in-memory directory built from `seed`.
    pub fn seed(mut self, seed: DirectorySeed) -> Self {
        self.state_builder = self.state_builder.seed(seed);
        self
    }

    /// Sets the rate limiter.
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.state_builder = self.state_builder.limiter(limiter);
        self
    }

    /// Builds the server.
    pub fn build(self) -> ApiResult<ApiServer> {
        let state = self.state_builder.build()?;
        Ok(ApiServer::new(state))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_config() -> ApiConfig {
        ApiConfig::default().with_token(TokenConfig::new("test-secret-key-that-is-long-enough"))
    }

    #[test]
    fn test_server_builder() {
        let server = ApiServerBuilder::new().config(test_config()).build().unwrap();
        assert_eq!(server.addr().port(), 8080);
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let server = ApiServerBuilder::new().config(test_config()).build().unwrap();
        let response = server
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let server = ApiServerBuilder::new().config(test_config()).build().unwrap();
        let response = server
            .router()
            .oneshot(Request::get("/api/v1/auth/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_root_base_path() {
        let mut config = test_config();
        config.base_path = "/".to_string();
        let server = ApiServerBuilder::new().config(config).build().unwrap();
        let response = server
            .router()
            .oneshot(Request::get("/auth/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_cors_layer_with_explicit_origins() {
        let mut config = test_config();
        config.cors.allowed_origins = vec!["https://app.example.com".to_string()];
        config.cors.allow_credentials = true;
        let _layer = create_cors_layer(&config);
    }
}
