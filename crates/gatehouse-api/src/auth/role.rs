// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Role rules attached to operations.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Role code that bypasses role and path checks.
pub const SUPER_ADMIN: &str = "super_admin";

// =============================================================================
// RoleMode
// =============================================================================

/// How a list of required roles combines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoleMode {
    /// The caller must hold every listed role.
    #[default]
    And,
    /// The caller must hold at least one listed role.
    Or,
}

// =============================================================================
// RoleRequirement
// =============================================================================

/// Role rule of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequirement {
    /// Required role codes.
    pub roles: Vec<String>,
    /// How the roles combine.
    #[serde(default)]
    pub mode: RoleMode,
    /// Whether a super admin passes regardless of `roles`.
    #[serde(default = "default_true")]
    pub allow_super_admin: bool,
}

fn default_true() -> bool {
    true
}

impl RoleRequirement {
    /// Requires every role in `roles`.
    pub fn all_of<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            mode: RoleMode::And,
            allow_super_admin: true,
        }
    }

    /// Requires at least one role in `roles`.
    pub fn any_of<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            mode: RoleMode::Or,
            ..Self::all_of(roles)
        }
    }

    /// Disables the super admin bypass.
    pub fn without_super_admin_bypass(mut self) -> Self {
        self.allow_super_admin = false;
        self
    }

    /// Returns `true` if no role is required.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Evaluates the rule against the roles a caller holds.
    ///
    /// Callers hold a single primary role, so `And` over two or more distinct
    /// roles never passes.
    pub fn is_satisfied_by(&self, held: &HashSet<String>) -> bool {
        if self.roles.is_empty() {
            return true;
        }
        match self.mode {
            RoleMode::And => self.roles.iter().all(|r| held.contains(r)),
            RoleMode::Or => self.roles.iter().any(|r| held.contains(r)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn held(role: &str) -> HashSet<String> {
        HashSet::from([role.to_string()])
    }

    #[test]
    fn test_and_over_two_roles_fails_for_single_role() {
        let rule = RoleRequirement::all_of(["admin", "ops"]);
        assert!(!rule.is_satisfied_by(&held("admin")));
        assert!(!rule.is_satisfied_by(&held("ops")));
    }

    #[test]
    fn test_or_accepts_any_listed_role() {
        let rule = RoleRequirement::any_of(["admin", "ops"]);
        assert!(rule.is_satisfied_by(&held("admin")));
        assert!(rule.is_satisfied_by(&held("ops")));
        assert!(!rule.is_satisfied_by(&held("viewer")));
    }

    #[test]
    fn test_single_role_and() {
        let rule = RoleRequirement::all_of(["admin"]);
        assert!(rule.is_satisfied_by(&held("admin")));
        assert!(!rule.is_satisfied_by(&HashSet::new()));
    }

    #[test]
    fn test_empty_rule_always_passes() {
        let rule = RoleRequirement::all_of(Vec::<String>::new());
        assert!(rule.is_empty());
        assert!(rule.is_satisfied_by(&HashSet::new()));
    }

    #[test]
    fn test_deserialize_defaults() {
        let rule: RoleRequirement = serde_json::from_str(r#"{"roles":["admin"]}"#).unwrap();
        assert_eq!(rule.mode, RoleMode::And);
        assert!(rule.allow_super_admin);

        let rule: RoleRequirement =
            serde_json::from_str(r#"{"roles":["a","b"],"mode":"OR","allow_super_admin":false}"#)
                .unwrap();
        assert_eq!(rule.mode, RoleMode::Or);
        assert!(!rule.allow_super_admin);
    }
}
