// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Permission patterns.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use axum::http::Method;
use serde::{Deserialize, Serialize};

/// Wildcard accepted for the method of a permission.
pub const ANY_METHOD: &str = "*";

// =============================================================================
// Permission
// =============================================================================

/// A permission code bound to a (path, method) pattern.
///
/// A path ending in `*` is a prefix pattern. Any other path covers itself and
/// everything below it, so `/api/v1/users` covers `/api/v1/users/7` but not
/// `/api/v1/users-export`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// Permission code, e.g. `user:read`.
    pub code: String,
    /// Path pattern.
    pub path: String,
    /// HTTP method, or `*` for any.
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    ANY_METHOD.to_string()
}

impl Permission {
    /// Creates a permission for one method.
    pub fn new(code: impl Into<String>, path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            path: path.into(),
            method: method.into(),
        }
    }

    /// Creates a permission for every method on a path.
    pub fn any_method(code: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(code, path, ANY_METHOD)
    }

    /// Returns `true` if the pattern covers the request.
    pub fn covers(&self, path: &str, method: &Method) -> bool {
        self.matches_method(method) && self.matches_path(path)
    }

    fn matches_method(&self, method: &Method) -> bool {
        self.method == ANY_METHOD || self.method.eq_ignore_ascii_case(method.as_str())
    }

    fn matches_path(&self, path: &str) -> bool {
        if let Some(prefix) = self.path.strip_suffix('*') {
            return path.starts_with(prefix);
        }

        let base = self.path.trim_end_matches('/');
        if base.is_empty() {
            return true;
        }
        path == base
            || path
                .strip_prefix(base)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.code, self.method, self.path)
    }
}

// =============================================================================
// PermissionSet
// =============================================================================

/// A set of permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    permissions: HashSet<Permission>,
}

impl PermissionSet {
    /// Creates an empty permission set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a permission set from permissions.
    pub fn from_permissions(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            permissions: permissions.into_iter().collect(),
        }
    }

    /// Adds a permission to the set.
    pub fn add(&mut self, permission: Permission) {
        self.permissions.insert(permission);
    }

    /// Returns `true` if any permission covers the request.
    pub fn covers(&self, path: &str, method: &Method) -> bool {
        self.permissions.iter().any(|p| p.covers(path, method))
    }

    /// Returns the distinct permission codes.
    pub fn codes(&self) -> BTreeSet<String> {
        self.permissions.iter().map(|p| p.code.clone()).collect()
    }

    /// Returns the number of permissions in the set.
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Returns an iterator over the permissions.
    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    /// Merges another permission set into this one.
    pub fn merge(&mut self, other: &PermissionSet) {
        self.permissions.extend(other.permissions.iter().cloned());
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self::from_permissions(iter)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_nested_paths() {
        let p = Permission::new("user:read", "/api/v1/users", "GET");

        assert!(p.covers("/api/v1/users", &Method::GET));
        assert!(p.covers("/api/v1/users/7", &Method::GET));
        assert!(!p.covers("/api/v1/users-export", &Method::GET));
        assert!(!p.covers("/api/v1/users", &Method::POST));
    }

    #[test]
    fn test_prefix_pattern() {
        let p = Permission::any_method("report:any", "/api/v1/reports*");

        assert!(p.covers("/api/v1/reports", &Method::DELETE));
        assert!(p.covers("/api/v1/reports-2024", &Method::GET));
        assert!(!p.covers("/api/v1/report", &Method::GET));
    }

    #[test]
    fn test_method_is_case_insensitive() {
        let p = Permission::new("user:write", "/api/v1/users", "post");
        assert!(p.covers("/api/v1/users", &Method::POST));
    }

    #[test]
    fn test_root_covers_everything() {
        let p = Permission::any_method("all", "/");
        assert!(p.covers("/anything/at/all", &Method::PUT));
    }

    #[test]
    fn test_permission_set() {
        let mut set = PermissionSet::new();
        set.add(Permission::new("user:read", "/api/v1/users", "GET"));
        set.add(Permission::new("user:write", "/api/v1/users", "POST"));
        set.add(Permission::new("user:write", "/api/v1/users", "PUT"));

        assert!(set.covers("/api/v1/users/1", &Method::PUT));
        assert!(!set.covers("/api/v1/users/1", &Method::DELETE));
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.codes().into_iter().collect::<Vec<_>>(),
            vec!["user:read".to_string(), "user:write".to_string()]
        );
    }

    #[test]
    fn test_method_defaults_to_any() {
        let p: Permission =
            serde_json::from_str(r#"{"code":"x","path":"/x"}"#).unwrap();
        assert_eq!(p.method, ANY_METHOD);
    }
}
