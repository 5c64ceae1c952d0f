// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Declarative per-operation rules.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::MethodRouter;
use serde::{Deserialize, Serialize};

use super::{RateLimitLayer, RateLimitRule, RateLimiter, RoleGate, RoleLayer};
use crate::auth::{RbacCache, RoleRequirement};

// =============================================================================
// OperationTable
// =============================================================================

/// Rules attached to one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationPolicy {
    /// Role rule, if the operation is role-restricted.
    pub roles: Option<RoleRequirement>,
    /// Rate limit rule, if the operation is throttled.
    pub rate_limit: Option<RateLimitRule>,
}

impl OperationPolicy {
    /// Creates a policy with a role rule.
    pub fn with_roles(mut self, roles: RoleRequirement) -> Self {
        self.roles = Some(roles);
        self
    }

    /// Creates a policy with a rate limit.
    pub fn with_rate_limit(mut self, rule: RateLimitRule) -> Self {
        self.rate_limit = Some(rule);
        self
    }
}

/// Maps operation ids to their rules.
///
/// Deserializing merges the given entries over the built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, OperationPolicy>", into = "BTreeMap<String, OperationPolicy>")]
pub struct OperationTable {
    policies: HashMap<String, OperationPolicy>,
}

impl Default for OperationTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert(
            "auth.refresh",
            OperationPolicy::default().with_rate_limit(
                RateLimitRule::per_ip(10, Duration::from_secs(60))
                    .with_message("Too many refresh attempts, please try again later"),
            ),
        );
        table.insert(
            "auth.me",
            OperationPolicy::default()
                .with_rate_limit(RateLimitRule::per_user(60, Duration::from_secs(60))),
        );
        table.insert(
            "rbac.invalidate",
            OperationPolicy::default().with_roles(RoleRequirement::any_of(["admin"])),
        );
        table.insert(
            "admin.stats",
            OperationPolicy::default().with_roles(RoleRequirement::all_of(["admin"])),
        );
        table
    }
}

impl From<BTreeMap<String, OperationPolicy>> for OperationTable {
    fn from(overrides: BTreeMap<String, OperationPolicy>) -> Self {
        let mut table = Self::default();
        for (operation, policy) in overrides {
            table.insert(operation, policy);
        }
        table
    }
}

impl From<OperationTable> for BTreeMap<String, OperationPolicy> {
    fn from(table: OperationTable) -> Self {
        table.policies.into_iter().collect()
    }
}

impl OperationTable {
    /// Creates a table with no entries.
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// Sets the policy of an operation.
    pub fn insert(&mut self, operation: impl Into<String>, policy: OperationPolicy) {
        self.policies.insert(operation.into(), policy);
    }

    /// Sets the policy of an operation, builder style.
    pub fn with(mut self, operation: impl Into<String>, policy: OperationPolicy) -> Self {
        self.insert(operation, policy);
        self
    }

    /// Returns the policy of an operation.
    pub fn get(&self, operation: &str) -> Option<&OperationPolicy> {
        self.policies.get(operation)
    }

    /// Returns the operation ids, sorted.
    pub fn operations(&self) -> Vec<&str> {
        let mut ops: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        ops.sort_unstable();
        ops
    }

    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns `true` if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Checks every rule is well-formed.
    pub fn validate(&self) -> Result<(), String> {
        for operation in self.operations() {
            let Some(policy) = self.policies.get(operation) else {
                continue;
            };
            if let Some(roles) = &policy.roles {
                if roles.roles.iter().any(|r| r.trim().is_empty()) {
                    return Err(format!("operation `{operation}`: empty role code"));
                }
            }
            if let Some(rule) = &policy.rate_limit {
                rule.validate()
                    .map_err(|e| format!("operation `{operation}`: {e}"))?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// OperationGuard
// =============================================================================

/// Attaches an operation's role and rate limit layers to a route.
#[derive(Clone)]
pub struct OperationGuard {
    table: Arc<OperationTable>,
    rbac: Arc<RbacCache>,
    limiter: Arc<RateLimiter>,
    super_admin: Arc<str>,
    rate_limit_enabled: bool,
}

impl OperationGuard {
    /// Creates a guard over `table`.
    pub fn new(table: Arc<OperationTable>, rbac: Arc<RbacCache>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            table,
            rbac,
            limiter,
            super_admin: Arc::from(crate::auth::SUPER_ADMIN),
            rate_limit_enabled: true,
        }
    }

    /// Sets the role code that bypasses role rules.
    pub fn with_super_admin_role(mut self, role: impl Into<String>) -> Self {
        self.super_admin = Arc::from(role.into());
        self
    }

    /// Enables or disables the per-operation rate limits.
    pub fn with_rate_limit(mut self, enabled: bool) -> Self {
        self.rate_limit_enabled = enabled;
        self
    }

    /// Wraps `route` with the rules of `operation`.
    ///
    /// The role gate runs first, then the rate limit. Unknown operations are
    /// left unguarded.
    pub fn guard<S>(&self, operation: &str, route: MethodRouter<S>) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let Some(policy) = self.table.get(operation) else {
            tracing::warn!(operation, "No policy declared for operation");
            return route;
        };

        let mut route = route;
        if let Some(rule) = policy.rate_limit.clone().filter(|_| self.rate_limit_enabled) {
            route = route.layer(RateLimitLayer::new(self.limiter.clone(), rule, operation));
        }
        if let Some(roles) = policy.roles.clone() {
            let gate = RoleGate::new(roles, self.rbac.clone(), operation)
                .with_super_admin_role(self.super_admin.to_string());
            route = route.layer(RoleLayer::new(gate));
        }
        route
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RoleMode;

    #[test]
    fn test_defaults() {
        let table = OperationTable::default();
        assert_eq!(
            table.operations(),
            vec!["admin.stats", "auth.me", "auth.refresh", "rbac.invalidate"]
        );
        assert_eq!(
            table.get("rbac.invalidate").and_then(|p| p.roles.as_ref()).map(|r| r.mode),
            Some(RoleMode::Or)
        );
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_deserialize_merges_over_defaults() {
        let table: OperationTable = serde_json::from_str(
            r#"{
                "auth.me": {"rate_limit": {"limit": 3, "window": "10s", "strategy": "user"}},
                "reports.export": {"roles": {"roles": ["analyst"]}}
            }"#,
        )
        .unwrap();

        assert_eq!(table.len(), 5);
        let me = table.get("auth.me").and_then(|p| p.rate_limit.as_ref()).unwrap();
        assert_eq!(me.limit, 3);
        assert!(table.get("reports.export").and_then(|p| p.roles.as_ref()).is_some());
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let table = OperationTable::empty().with(
            "x",
            OperationPolicy::default()
                .with_rate_limit(RateLimitRule::per_ip(0, Duration::from_secs(1))),
        );
        assert!(table.validate().unwrap_err().contains("`x`"));
    }
}
