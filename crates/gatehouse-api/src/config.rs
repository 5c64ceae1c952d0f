// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::{RbacCacheConfig, TokenConfig, SUPER_ADMIN};
use crate::middleware::{OperationTable, RateLimitConfig};

// =============================================================================
// ApiConfig
// =============================================================================

/// Configuration for the API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host address.
    pub host: IpAddr,
    /// Server port.
    pub port: u16,
    /// Base path for API endpoints.
    pub base_path: String,
    /// CORS configuration.
    pub cors: CorsConfig,
    /// Token configuration.
    pub token: TokenConfig,
    /// Authentication gate configuration.
    pub auth: AuthConfig,
    /// RBAC cache configuration.
    pub rbac: RbacCacheConfig,
    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,
    /// Per-operation role and rate limit rules.
    pub operations: OperationTable,
    /// Request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            base_path: "/api/v1".to_string(),
            cors: CorsConfig::default(),
            token: TokenConfig::default(),
            auth: AuthConfig::default(),
            rbac: RbacCacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            operations: OperationTable::default(),
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl ApiConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the socket address to bind to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns the base path without a trailing slash; empty for the root.
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        }
    }

    /// Returns the exclude prefixes with `{base}` replaced by the base path.
    pub fn resolved_exclude_paths(&self) -> Vec<String> {
        let base = self.normalized_base_path();
        self.auth
            .exclude_paths
            .iter()
            .map(|path| match path.strip_prefix(BASE_PLACEHOLDER) {
                Some(rest) => format!("{base}{rest}"),
                None => path.clone(),
            })
            .collect()
    }

    /// Sets the host address.
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the token configuration.
    pub fn with_token(mut self, token: TokenConfig) -> Self {
        self.token = token;
        self
    }

    /// Sets the authentication gate configuration.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the RBAC cache configuration.
    pub fn with_rbac(mut self, rbac: RbacCacheConfig) -> Self {
        self.rbac = rbac;
        self
    }

    /// Sets the rate limit configuration.
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Sets the operation table.
    pub fn with_operations(mut self, operations: OperationTable) -> Self {
        self.operations = operations;
        self
    }

    /// Checks the configuration is usable.
    pub fn validate(&self) -> Result<(), String> {
        self.token.validate().map_err(|e| e.to_string())?;
        if self.rate_limit.enabled {
            self.rate_limit.validate()?;
        }
        if self.rbac.ttl.is_zero() {
            return Err("rbac.ttl must be positive".to_string());
        }
        if self.rbac.lookup_timeout.is_zero() {
            return Err("rbac.lookup_timeout must be positive".to_string());
        }
        if self.auth.super_admin_role.trim().is_empty() {
            return Err("auth.super_admin_role must not be empty".to_string());
        }
        self.operations.validate()
    }
}

// =============================================================================
// AuthConfig
// =============================================================================

/// Placeholder for the base path in exclude prefixes.
pub const BASE_PLACEHOLDER: &str = "{base}";

/// Authentication and bypass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Cookie read when no `Authorization` header is present.
    pub cookie_name: String,
    /// Path prefixes that skip authentication and the permission gate.
    ///
    /// A leading `{base}` stands for the configured base path.
    pub exclude_paths: Vec<String>,
    /// Role code granting the bypass.
    pub super_admin_role: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "access_token".to_string(),
            exclude_paths: vec![
                "/health".to_string(),
                format!("{BASE_PLACEHOLDER}/auth/login"),
                format!("{BASE_PLACEHOLDER}/auth/register"),
                format!("{BASE_PLACEHOLDER}/auth/refresh"),
            ],
            super_admin_role: SUPER_ADMIN.to_string(),
        }
    }
}

// =============================================================================
// CorsConfig
// =============================================================================

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins.
    pub allowed_origins: Vec<String>,
    /// Allowed methods.
    pub allowed_methods: Vec<String>,
    /// Whether to allow credentials.
    pub allow_credentials: bool,
    /// Max age for preflight cache (seconds).
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            allow_credentials: false,
            max_age: 3600,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ApiConfig {
        ApiConfig::default().with_token(TokenConfig::new("test-secret-key-that-is-long-enough"))
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.base_path, "/api/v1");
        assert_eq!(config.auth.cookie_name, "access_token");
        assert_eq!(config.operations.len(), 4);
    }

    #[test]
    fn test_socket_addr() {
        let config = ApiConfig::default().with_port(9000);
        assert_eq!(config.socket_addr().port(), 9000);
    }

    #[test]
    fn test_normalized_base_path() {
        let mut config = ApiConfig::default();
        assert_eq!(config.normalized_base_path(), "/api/v1");
        config.base_path = "api/v2/".to_string();
        assert_eq!(config.normalized_base_path(), "/api/v2");
        config.base_path = "/".to_string();
        assert_eq!(config.normalized_base_path(), "");
    }

    #[test]
    fn test_exclude_paths_follow_base_path() {
        let mut config = ApiConfig::default();
        assert!(config
            .resolved_exclude_paths()
            .contains(&"/api/v1/auth/refresh".to_string()));

        config.base_path = "/api/v2".to_string();
        config.auth.exclude_paths.push("/docs".to_string());
        let resolved = config.resolved_exclude_paths();
        assert!(resolved.contains(&"/health".to_string()));
        assert!(resolved.contains(&"/api/v2/auth/refresh".to_string()));
        assert!(resolved.contains(&"/docs".to_string()));
        assert!(!resolved.iter().any(|p| p.contains("/api/v1")));
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());
        assert!(ApiConfig::default().validate().is_err());

        let mut config = valid();
        config.rbac.ttl = Duration::ZERO;
        assert!(config.validate().unwrap_err().contains("rbac.ttl"));
    }

    #[test]
    fn test_durations_deserialize_humanized() {
        let config: ApiConfig = serde_json::from_str(
            r#"{"request_timeout":"5s","rbac":{"ttl":"2m","lookup_timeout":"250ms"}}"#,
        )
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.rbac.ttl, Duration::from_secs(120));
        assert_eq!(config.rbac.lookup_timeout, Duration::from_millis(250));
    }
}
