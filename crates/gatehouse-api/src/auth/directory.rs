// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Directory interface: the source of truth for roles and permissions.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Permission, PermissionSet, UserId};

// =============================================================================
// DirectoryError
// =============================================================================

/// Failure of a directory lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The lookup did not finish in time.
    #[error("directory lookup timed out after {0:?}")]
    Timeout(Duration),

    /// The directory could not be reached or answered with an error.
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Directory
// =============================================================================

/// Lookup interface implemented by the user/role store.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Returns the role codes of a user. Unknown users have no roles.
    async fn get_roles(&self, user_id: UserId) -> Result<HashSet<String>, DirectoryError>;

    /// Returns the permissions of a user through all of their roles.
    async fn get_permissions(&self, user_id: UserId) -> Result<PermissionSet, DirectoryError>;

    /// Returns `true` if the user may call `method` on `path`.
    async fn has_path_permission(
        &self,
        user_id: UserId,
        path: &str,
        method: &Method,
    ) -> Result<bool, DirectoryError>;
}

// =============================================================================
// DirectorySeed
// =============================================================================

/// A user known to the static directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// User id.
    pub id: UserId,
    /// Username.
    pub username: String,
    /// Role codes. The first one is the primary role.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserRecord {
    /// Returns the primary role.
    pub fn primary_role(&self) -> Option<&str> {
        self.roles.first().map(String::as_str)
    }
}

/// Seed data for [`StaticDirectory`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySeed {
    /// Known users.
    pub users: Vec<UserRecord>,
    /// Permissions granted per role code.
    pub roles: HashMap<String, Vec<Permission>>,
}

// =============================================================================
// StaticDirectory
// =============================================================================

/// Directory backed by in-memory seed data.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: HashMap<UserId, UserRecord>,
    grants: HashMap<String, PermissionSet>,
}

impl StaticDirectory {
    /// Builds a directory from seed data.
    pub fn from_seed(seed: DirectorySeed) -> Self {
        let users = seed.users.into_iter().map(|u| (u.id, u)).collect();
        let grants = seed
            .roles
            .into_iter()
            .map(|(role, permissions)| (role, permissions.into_iter().collect()))
            .collect();
        Self { users, grants }
    }

    /// Returns a user by id.
    pub fn user(&self, user_id: UserId) -> Option<&UserRecord> {
        self.users.get(&user_id)
    }

    /// Returns a user by username.
    pub fn find_user(&self, username: &str) -> Option<&UserRecord> {
        self.users.values().find(|u| u.username == username)
    }

    /// Returns the number of known users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    fn permissions_for(&self, user_id: UserId) -> PermissionSet {
        let mut set = PermissionSet::new();
        if let Some(user) = self.users.get(&user_id) {
            for role in &user.roles {
                if let Some(granted) = self.grants.get(role) {
                    set.merge(granted);
                }
            }
        }
        set
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn get_roles(&self, user_id: UserId) -> Result<HashSet<String>, DirectoryError> {
        Ok(self
            .users
            .get(&user_id)
            .map(|u| u.roles.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_permissions(&self, user_id: UserId) -> Result<PermissionSet, DirectoryError> {
        Ok(self.permissions_for(user_id))
    }

    async fn has_path_permission(
        &self,
        user_id: UserId,
        path: &str,
        method: &Method,
    ) -> Result<bool, DirectoryError> {
        Ok(self.permissions_for(user_id).covers(path, method))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> DirectorySeed {
        DirectorySeed {
            users: vec![
                UserRecord {
                    id: 1,
                    username: "root".to_string(),
                    roles: vec!["super_admin".to_string()],
                },
                UserRecord {
                    id: 2,
                    username: "alice".to_string(),
                    roles: vec!["editor".to_string(), "viewer".to_string()],
                },
            ],
            roles: HashMap::from([
                (
                    "editor".to_string(),
                    vec![Permission::new("doc:write", "/api/v1/docs", "POST")],
                ),
                (
                    "viewer".to_string(),
                    vec![Permission::new("doc:read", "/api/v1/docs", "GET")],
                ),
            ]),
        }
    }

    #[tokio::test]
    async fn test_roles_and_permissions() {
        let dir = StaticDirectory::from_seed(seed());

        let roles = dir.get_roles(2).await.unwrap();
        assert!(roles.contains("editor") && roles.contains("viewer"));

        let perms = dir.get_permissions(2).await.unwrap();
        assert_eq!(perms.len(), 2);

        assert!(dir.get_roles(99).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_permission_unions_roles() {
        let dir = StaticDirectory::from_seed(seed());

        assert!(dir.has_path_permission(2, "/api/v1/docs/4", &Method::GET).await.unwrap());
        assert!(dir.has_path_permission(2, "/api/v1/docs", &Method::POST).await.unwrap());
        assert!(!dir.has_path_permission(2, "/api/v1/docs", &Method::DELETE).await.unwrap());
        // Roles without grants cover nothing; bypass is the gate's business.
        assert!(!dir.has_path_permission(1, "/api/v1/docs", &Method::GET).await.unwrap());
    }

    #[test]
    fn test_find_user() {
        let dir = StaticDirectory::from_seed(seed());
        assert_eq!(dir.find_user("alice").map(|u| u.id), Some(2));
        assert_eq!(dir.user(2).and_then(|u| u.primary_role()), Some("editor"));
        assert_eq!(dir.user_count(), 2);
    }
}
