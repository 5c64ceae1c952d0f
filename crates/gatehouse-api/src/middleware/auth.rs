// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Authentication gate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use tower::{Layer, Service};
use uuid::Uuid;

use super::{client_ip, ExcludePaths};
use crate::auth::{IdentityContext, TokenKind, TokenService};
use crate::error::ApiError;

/// Response header set when the presented token is close to expiry.
pub const TOKEN_EXPIRING_HEADER: HeaderName = HeaderName::from_static("x-token-expiring");

const REQUEST_ID_HEADER: &str = "x-request-id";

// =============================================================================
// authenticate
// =============================================================================

/// Outcome of a successful authentication.
#[derive(Debug, Clone)]
pub struct Authenticated {
    /// The resolved caller.
    pub identity: IdentityContext,
    /// Whether the token expires within the refresh threshold.
    pub expiring_soon: bool,
}

/// Runs the authentication steps on a raw token.
///
/// Missing, invalid and refresh tokens all yield
/// [`ApiError::Unauthenticated`]; the sub-reason is only logged.
pub fn authenticate(
    tokens: &TokenService,
    raw: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Authenticated, ApiError> {
    let Some(raw) = raw else {
        tracing::debug!("No token presented");
        return Err(ApiError::unauthenticated("no token presented"));
    };

    let claims = tokens.validate_at(raw, now).map_err(|e| {
        tracing::debug!(reason = e.reason(), error = %e, "Token rejected");
        ApiError::from(e)
    })?;

    if claims.kind != TokenKind::Access {
        tracing::debug!(user_id = %claims.uid, kind = %claims.kind, "Non-access token presented");
        return Err(ApiError::unauthenticated(format!(
            "{} token cannot authenticate a request",
            claims.kind
        )));
    }

    Ok(Authenticated {
        expiring_soon: tokens.is_expiring_soon_at(&claims, now),
        identity: IdentityContext::from_claims(&claims),
    })
}

// =============================================================================
// AuthLayer
// =============================================================================

/// Layer for token authentication.
///
/// The token is read from `Authorization: Bearer`, then from a cookie.
#[derive(Clone)]
pub struct AuthLayer {
    tokens: Arc<TokenService>,
    exclude: ExcludePaths,
    cookie_name: Arc<str>,
}

impl AuthLayer {
    /// Creates a new auth layer.
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self {
            tokens,
            exclude: ExcludePaths::default(),
            cookie_name: Arc::from("access_token"),
        }
    }

    /// Sets the paths that skip authentication.
    pub fn with_exclude(mut self, exclude: ExcludePaths) -> Self {
        self.exclude = exclude;
        self
    }

    /// Sets the cookie consulted when no header is present.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Arc::from(name.into());
        self
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            tokens: self.tokens.clone(),
            exclude: self.exclude.clone(),
            cookie_name: self.cookie_name.clone(),
        }
    }
}

// =============================================================================
// AuthMiddleware
// =============================================================================

/// Middleware for token authentication.
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    tokens: Arc<TokenService>,
    exclude: ExcludePaths,
    cookie_name: Arc<str>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
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
        let excluded = self.exclude.matches(req.uri().path());
        let token = if excluded {
            None
        } else {
            extract_bearer_token(&req).or_else(|| extract_cookie(&req, &self.cookie_name))
        };
        let tokens = self.tokens.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if excluded {
                return inner.call(req).await;
            }

            let Authenticated {
                identity,
                expiring_soon,
            } = match authenticate(&tokens, token.as_deref(), Utc::now()) {
                Ok(outcome) => outcome,
                Err(err) => return Ok(err.into_response()),
            };

            let mut identity = identity.with_request_id(request_id(&req));
            if let Some(ip) = client_ip(&req) {
                identity = identity.with_client_ip(ip);
            }

            tracing::debug!(
                user_id = %identity.user_id,
                request_id = %identity.request_id,
                "Caller authenticated"
            );
            req.extensions_mut().insert(identity);

            let mut response = inner.call(req).await?;
            if expiring_soon {
                response
                    .headers_mut()
                    .insert(TOKEN_EXPIRING_HEADER, HeaderValue::from_static("true"));
            }
            Ok(response)
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Extracts a named cookie value.
fn extract_cookie<B>(req: &Request<B>, name: &str) -> Option<String> {
    req.headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Reuses a client-supplied request id when it is a UUID.
fn request_id<B>(req: &Request<B>) -> Uuid {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .unwrap_or_else(Uuid::now_v7)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenConfig;
    use serde_json::{Map, Value};

    fn tokens() -> TokenService {
        TokenService::new(TokenConfig::new("test-secret-key-that-is-long-enough")).unwrap()
    }

    fn role_claim(role: &str) -> Map<String, Value> {
        let mut extra = Map::new();
        extra.insert("role".to_string(), Value::from(role));
        extra
    }

    #[test]
    fn test_extract_bearer_token() {
        let req = Request::builder()
            .header(header::AUTHORIZATION, "Basic abc")
            .body(Body::empty())
            .unwrap();
        assert!(extract_bearer_token(&req).is_none());

        let req = Request::builder()
            .header(header::AUTHORIZATION, "Bearer mytoken123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req), Some("mytoken123".to_string()));
    }

    #[test]
    fn test_extract_cookie() {
        let req = Request::builder()
            .header(header::COOKIE, "theme=dark; access_token=abc.def; other=1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_cookie(&req, "access_token"), Some("abc.def".to_string()));
        assert!(extract_cookie(&req, "missing").is_none());
    }

    #[test]
    fn test_authenticate_access_token() {
        let tokens = tokens();
        let now = Utc::now();
        let token = tokens
            .issue_at(TokenKind::Access, 9, "carol", role_claim("ops"), now)
            .unwrap();

        let outcome = authenticate(&tokens, Some(&token), now).unwrap();
        assert_eq!(outcome.identity.user_id, 9);
        assert_eq!(outcome.identity.username, "carol");
        assert!(outcome.identity.has_role("ops"));
        assert!(!outcome.expiring_soon);
    }

    #[test]
    fn test_authenticate_rejects_refresh_and_missing() {
        let tokens = tokens();
        let now = Utc::now();
        let refresh = tokens
            .issue_at(TokenKind::Refresh, 9, "carol", Map::new(), now)
            .unwrap();

        assert!(matches!(
            authenticate(&tokens, Some(&refresh), now),
            Err(ApiError::Unauthenticated { .. })
        ));
        assert!(matches!(
            authenticate(&tokens, None, now),
            Err(ApiError::Unauthenticated { .. })
        ));
        assert!(matches!(
            authenticate(&tokens, Some("garbage"), now),
            Err(ApiError::Unauthenticated { .. })
        ));
    }

    #[test]
    fn test_expiring_soon_flag() {
        let tokens = tokens();
        let issued = Utc::now();
        let token = tokens
            .issue_at(TokenKind::Access, 1, "dave", Map::new(), issued)
            .unwrap();

        let late = issued + chrono::Duration::seconds(2 * 3600 - 60);
        assert!(authenticate(&tokens, Some(&token), late).unwrap().expiring_soon);
    }
}
