// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Top-level configuration schema.
//!
//! ```yaml
//! api:
//!   port: 8080
//!   token:
//!     secret: ${GATEHOUSE_TOKEN_SECRET}
//!   operations:
//!     rbac.invalidate:
//!       roles: { roles: [admin], mode: OR }
//! directory:
//!   users:
//!     - id: 7
//!       username: alice
//!       roles: [admin]
//!   roles:
//!     admin:
//!       - { code: "user:read", path: "/api/v1/users", method: GET }
//! logging:
//!   level: info
//!   format: json
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use gatehouse_api::auth::DirectorySeed;
use gatehouse_api::ApiConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Shortest token secret accepted without a warning.
pub const RECOMMENDED_SECRET_LEN: usize = 32;

// =============================================================================
// GatehouseConfig
// =============================================================================

/// Everything the `gatehouse` process reads at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatehouseConfig {
    /// HTTP surface and gate settings.
    pub api: ApiConfig,
    /// Seed for the in-memory directory.
    pub directory: DirectorySeed,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl GatehouseConfig {
    /// Checks that the configuration can start a server.
    pub fn validate(&self) -> ConfigResult<()> {
        self.api
            .validate()
            .map_err(|message| ConfigError::validation("api", message))?;

        let mut seen_ids = HashSet::new();
        let mut seen_names = HashSet::new();
        for user in &self.directory.users {
            if user.username.trim().is_empty() {
                return Err(ConfigError::validation(
                    "directory.users",
                    format!("user {} has an empty username", user.id),
                ));
            }
            if !seen_ids.insert(user.id) {
                return Err(ConfigError::validation(
                    "directory.users",
                    format!("duplicate user id {}", user.id),
                ));
            }
            if !seen_names.insert(user.username.as_str()) {
                return Err(ConfigError::validation(
                    "directory.users",
                    format!("duplicate username '{}'", user.username),
                ));
            }
        }

        for (role, permissions) in &self.directory.roles {
            if let Some(p) = permissions.iter().find(|p| !p.path.starts_with('/')) {
                return Err(ConfigError::validation(
                    format!("directory.roles.{role}"),
                    format!("permission '{}' has a relative path '{}'", p.code, p.path),
                ));
            }
        }

        Ok(())
    }

    /// Returns findings that do not stop the server but usually indicate a
    /// mistake. `validate --strict` treats them as errors.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.api.token.secret.len() < RECOMMENDED_SECRET_LEN {
            warnings.push(format!(
                "api.token.secret is shorter than {RECOMMENDED_SECRET_LEN} bytes"
            ));
        }

        let cors = &self.api.cors;
        if cors.allow_credentials && cors.allowed_origins.iter().any(|o| o == "*") {
            warnings.push(
                "api.cors.allow_credentials is ignored with a wildcard origin".to_string(),
            );
        }

        if !self.api.rate_limit.enabled {
            warnings.push("api.rate_limit is disabled".to_string());
        }

        let super_admin = &self.api.auth.super_admin_role;
        let mut unknown: Vec<_> = self
            .directory
            .users
            .iter()
            .flat_map(|u| u.roles.iter())
            .filter(|r| *r != super_admin && !self.directory.roles.contains_key(*r))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        unknown.sort();
        for role in unknown {
            warnings.push(format!("role '{role}' is assigned but grants no permissions"));
        }

        warnings
    }
}

// =============================================================================
// LoggingConfig
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: LogLevel,
    /// Log format.
    pub format: LogFormat,
    /// Include span targets in logs.
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            with_target: true,
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
    /// Single-line abbreviated output.
    Compact,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Compact => "compact",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_api::auth::{Permission, TokenConfig, UserRecord};

    fn valid() -> GatehouseConfig {
        GatehouseConfig {
            api: ApiConfig::default()
                .with_token(TokenConfig::new("test-secret-key-that-is-long-enough")),
            ..Default::default()
        }
    }

    fn user(id: i64, name: &str, roles: &[&str]) -> UserRecord {
        UserRecord {
            id,
            username: name.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_default_requires_secret() {
        let err = GatehouseConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "api"));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_duplicate_users_rejected() {
        let mut config = valid();
        config.directory.users = vec![user(1, "alice", &[]), user(1, "bob", &[])];
        assert!(config.validate().is_err());

        config.directory.users = vec![user(1, "alice", &[]), user(2, "alice", &[])];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_permission_path_rejected() {
        let mut config = valid();
        config.directory.roles.insert(
            "viewer".to_string(),
            vec![Permission::new("user:read", "api/v1/users", "GET")],
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_warnings() {
        let mut config = valid();
        assert!(config.warnings().is_empty());

        config.directory.users = vec![user(1, "alice", &["ghost", "super_admin"])];
        config.api.rate_limit.enabled = false;
        let warnings = config.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("'ghost'")));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
