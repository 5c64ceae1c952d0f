// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! Builds the full router in-process and drives it with `oneshot`, so every
//! request crosses the same gate chain as in production.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use gatehouse_api::auth::{TokenKind, UserRecord};
use gatehouse_api::error::ErrorResponseBody;
use gatehouse_api::{ApiConfig, ApiServerBuilder, AppState};
use serde_json::Value;
use tower::ServiceExt;

use super::fixtures::{issue_for, ConfigFixtures};
use super::init_test_logging;
use super::mocks::MockDirectory;

/// Peer address used when a test does not pick one.
pub const DEFAULT_PEER: &str = "10.0.0.1:40000";

// =============================================================================
// TestApp
// =============================================================================

/// The router plus handles on its state and directory.
pub struct TestApp {
    router: Router,
    state: AppState,
    directory: Arc<MockDirectory>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    /// Fixture configuration over the fixture directory.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder.
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }

    /// Returns the shared state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Returns the mock directory behind the RBAC cache.
    pub fn directory(&self) -> &Arc<MockDirectory> {
        &self.directory
    }

    /// Issues an access token for `user`, carrying its primary role.
    pub fn token_for(&self, user: &UserRecord) -> String {
        issue_for(self.state.tokens(), user, TokenKind::Access, Utc::now())
    }

    /// Issues a refresh token for `user`.
    pub fn refresh_token_for(&self, user: &UserRecord) -> String {
        issue_for(self.state.tokens(), user, TokenKind::Refresh, Utc::now())
    }

    /// Sends a request through the router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body collects")
            .to_vec();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// `GET path` with an optional bearer token.
    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.send(RequestBuilder::new(Method::GET, path).bearer(token).build())
            .await
    }

    /// `POST path` with a JSON body and an optional bearer token.
    pub async fn post_json(&self, path: &str, token: Option<&str>, body: &Value) -> TestResponse {
        self.send(
            RequestBuilder::new(Method::POST, path)
                .bearer(token)
                .json(body)
                .build(),
        )
        .await
    }
}

/// Builder for [`TestApp`].
#[derive(Default)]
pub struct TestAppBuilder {
    config: Option<ApiConfig>,
    directory: Option<Arc<MockDirectory>>,
}

impl TestAppBuilder {
    /// Uses `config` instead of the fixture configuration.
    pub fn config(mut self, config: ApiConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses `directory` instead of a fresh fixture mock.
    pub fn directory(mut self, directory: Arc<MockDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Builds the app.
    pub fn build(self) -> TestApp {
        init_test_logging();

        let directory = self.directory.unwrap_or_else(MockDirectory::shared);
        let server = ApiServerBuilder::new()
            .config(self.config.unwrap_or_else(ConfigFixtures::api_config))
            .directory(directory.clone())
            .build()
            .expect("test server builds");

        TestApp {
            router: server.router(),
            state: server.state().clone(),
            directory,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Request builder that always records a peer address.
pub struct RequestBuilder {
    method: Method,
    path: String,
    peer: SocketAddr,
    headers: Vec<(header::HeaderName, String)>,
    body: Body,
}

impl RequestBuilder {
    /// Starts a request from [`DEFAULT_PEER`].
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            peer: DEFAULT_PEER.parse().expect("valid peer"),
            headers: Vec::new(),
            body: Body::empty(),
        }
    }

    /// Sets the peer address seen by the IP rate limit.
    pub fn peer(mut self, peer: &str) -> Self {
        self.peer = peer.parse().expect("valid peer");
        self
    }

    /// Adds `Authorization: Bearer` when `token` is set.
    pub fn bearer(mut self, token: Option<&str>) -> Self {
        if let Some(token) = token {
            self.headers
                .push((header::AUTHORIZATION, format!("Bearer {}", token)));
        }
        self
    }

    /// Adds a header.
    pub fn header(mut self, name: header::HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Sets a JSON body.
    pub fn json(mut self, body: &Value) -> Self {
        self.headers
            .push((header::CONTENT_TYPE, "application/json".to_string()));
        self.body = Body::from(body.to_string());
        self
    }

    /// Sets a raw body.
    pub fn raw(mut self, content_type: &str, body: impl Into<String>) -> Self {
        self.headers
            .push((header::CONTENT_TYPE, content_type.to_string()));
        self.body = Body::from(body.into());
        self
    }

    /// Builds the request.
    pub fn build(self) -> Request<Body> {
        let mut builder = Request::builder()
            .method(self.method)
            .uri(self.path)
            .extension(ConnectInfo(self.peer));
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        builder.body(self.body).expect("valid request")
    }
}

// =============================================================================
// Responses
// =============================================================================

/// A collected response.
#[derive(Debug)]
pub struct TestResponse {
    /// Status code.
    pub status: StatusCode,
    /// Headers.
    pub headers: HeaderMap,
    /// Raw body.
    pub body: Vec<u8>,
}

impl TestResponse {
    /// Parses the body as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    /// Parses the body as a rejection.
    pub fn error(&self) -> ErrorResponseBody {
        serde_json::from_slice(&self.body).expect("response body is an error")
    }

    /// The machine-readable error code of a rejection.
    pub fn error_code(&self) -> String {
        self.error().error
    }

    /// The `Retry-After` header in seconds.
    pub fn retry_after(&self) -> Option<u64> {
        self.headers
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Asserts the status and, for rejections, the error code.
    pub fn assert_rejected(&self, status: StatusCode, code: &str) {
        assert_eq!(self.status, status, "unexpected status, body: {}", self.text());
        assert_eq!(self.error_code(), code);
    }

    /// The body as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
