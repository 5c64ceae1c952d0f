// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API error types and handling.
//!
//! Every rejection the authorization chain can produce is a variant of
//! [`ApiError`]. The enum maps onto HTTP status codes and renders as a
//! `{code, message, error}` JSON body.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::{DirectoryError, TokenError};

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// ApiError
// =============================================================================

/// API error type with HTTP status code mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No token, an invalid token, or a token of the wrong kind (401).
    #[error("Unauthenticated: {message}")]
    Unauthenticated {
        /// Internal reason, kept for logs.
        message: String,
    },

    /// The caller's roles do not satisfy an operation's role rule (403).
    #[error("Forbidden: requires roles {required:?}")]
    ForbiddenRole {
        /// The roles the operation requires.
        required: Vec<String>,
    },

    /// The caller's permissions do not cover the requested path (403).
    #[error("Forbidden: {method} {path} not permitted")]
    ForbiddenPermission {
        /// Request path.
        path: String,
        /// Request method.
        method: String,
    },

    /// A directory lookup failed during a safety-sensitive check (403).
    #[error("Directory unavailable: {message}")]
    DirectoryUnavailable {
        /// Underlying failure.
        message: String,
    },

    /// Call budget exceeded (429).
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        /// User-facing message configured on the rule.
        message: String,
        /// Seconds until the window resets.
        retry_after: Option<u64>,
    },

    /// Bad request (400).
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message.
        message: String,
    },

    /// Resource not found (404).
    #[error("Resource not found: {resource}")]
    NotFound {
        /// The resource that was not found.
        resource: String,
    },

    /// Internal server error (500).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message (for logging, not user-facing).
        message: String,
    },
}

impl ApiError {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates an unauthenticated error.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Creates a role rejection listing the required roles.
    pub fn forbidden_role<I, R>(required: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self::ForbiddenRole {
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a path permission rejection.
    pub fn forbidden_permission(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self::ForbiddenPermission {
            path: path.into(),
            method: method.into(),
        }
    }

    /// Creates a directory failure rejection.
    pub fn directory_unavailable(message: impl Into<String>) -> Self {
        Self::DirectoryUnavailable {
            message: message.into(),
        }
    }

    /// Creates a rate limit rejection.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            ApiError::ForbiddenRole { .. }
            | ApiError::ForbiddenPermission { .. }
            | ApiError::DirectoryUnavailable { .. } => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for categorization.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated { .. } => "UNAUTHENTICATED",
            ApiError::ForbiddenRole { .. } => "FORBIDDEN_ROLE",
            ApiError::ForbiddenPermission { .. } => "FORBIDDEN_PERMISSION",
            ApiError::DirectoryUnavailable { .. } => "DIRECTORY_UNAVAILABLE",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::BadRequest { .. } => "BAD_REQUEST",
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns a message that is safe to show to the caller.
    ///
    /// Token failure details stay in the logs; the caller only learns that it
    /// must authenticate.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthenticated { .. } => "Authentication required".to_string(),
            ApiError::ForbiddenRole { required } => {
                format!("Access denied: requires role(s) [{}]", required.join(", "))
            }
            ApiError::ForbiddenPermission { path, method } => {
                format!("Access denied: no permission for {} {}", method, path)
            }
            ApiError::DirectoryUnavailable { .. } => {
                "Access denied: permissions could not be verified".to_string()
            }
            ApiError::RateLimited { message, .. } => message.clone(),
            ApiError::BadRequest { message } => message.clone(),
            ApiError::NotFound { resource } => format!("{} not found", resource),
            ApiError::Internal { .. } => "Internal server error".to_string(),
        }
    }

    /// Returns `true` if this error should be logged at error level.
    pub fn is_server_error(&self) -> bool {
        matches!(self, ApiError::Internal { .. })
    }

    /// Returns `true` for rejections produced by the authorization chain.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthenticated { .. }
                | ApiError::ForbiddenRole { .. }
                | ApiError::ForbiddenPermission { .. }
                | ApiError::DirectoryUnavailable { .. }
                | ApiError::RateLimited { .. }
        )
    }
}

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        if self.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = error_code,
                status = %status,
                "Server error occurred"
            );
        } else if self.is_denial() {
            tracing::debug!(
                error = %self,
                error_code = error_code,
                status = %status,
                "Request denied"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = error_code,
                status = %status,
                "Request rejected"
            );
        }

        let retry_after = match &self {
            ApiError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        };

        let body = ErrorResponseBody {
            code: status.as_u16(),
            message: self.user_message(),
            error: error_code.to_string(),
            retry_after,
        };

        let mut response = (status, Json(body)).into_response();

        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }

        response
    }
}

// =============================================================================
// Error Response Body
// =============================================================================

/// JSON body of every rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponseBody {
    /// HTTP status code.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable error code.
    pub error: String,
    /// Seconds until a rate-limited caller may retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

// =============================================================================
// From Implementations
// =============================================================================

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidInput(message) => ApiError::bad_request(message),
            TokenError::Encoding(message) => ApiError::internal(message),
            other => ApiError::unauthenticated(other.to_string()),
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        ApiError::directory_unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(format!("Invalid JSON: {}", err))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::internal(format!("IO error: {}", err))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ApiError::unauthenticated("no token").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::forbidden_role(["admin"]).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::forbidden_permission("/x", "GET").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::directory_unavailable("down").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::rate_limited("slow down", Some(3)).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::internal("crash").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::unauthenticated("x").error_code(), "UNAUTHENTICATED");
        assert_eq!(ApiError::forbidden_role(["a"]).error_code(), "FORBIDDEN_ROLE");
        assert_eq!(
            ApiError::forbidden_permission("/", "GET").error_code(),
            "FORBIDDEN_PERMISSION"
        );
    }

    #[test]
    fn test_user_message_hides_token_details() {
        let err = ApiError::from(TokenError::SignatureMismatch);
        assert_eq!(err.user_message(), "Authentication required");
        assert!(err.to_string().contains("signature"));
    }

    #[test]
    fn test_role_message_lists_required_roles() {
        let err = ApiError::forbidden_role(["admin", "ops"]);
        assert_eq!(err.user_message(), "Access denied: requires role(s) [admin, ops]");
    }

    #[test]
    fn test_directory_error_becomes_denial() {
        let err = ApiError::from(DirectoryError::Timeout(Duration::from_millis(50)));
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(err.is_denial());
        assert!(!ApiError::bad_request("x").is_denial());
    }

    #[tokio::test]
    async fn test_rate_limited_response_body() {
        let response = ApiError::rate_limited("Too many login attempts", Some(42)).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponseBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, 429);
        assert_eq!(body.message, "Too many login attempts");
        assert_eq!(body.error, "RATE_LIMITED");
    }
}
