// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Authentication and authorization primitives.
//!
//! This module provides:
//! - Token issuing and validation
//! - The per-request identity context
//! - The directory interface and an in-memory implementation
//! - The RBAC cache in front of the directory
//! - Role rules and permission patterns

mod claims;
mod context;
mod directory;
pub mod permission;
mod rbac;
mod role;
mod token;

pub use claims::{TokenClaims, TokenKind, RESERVED_CLAIMS, ROLE_CLAIM};
pub use context::IdentityContext;
pub use directory::{Directory, DirectoryError, DirectorySeed, StaticDirectory, UserRecord};
pub use permission::{Permission, PermissionSet};
pub use rbac::{RbacCache, RbacCacheConfig, RbacEntry, RbacStats};
pub use role::{RoleMode, RoleRequirement, SUPER_ADMIN};
pub use token::{TokenConfig, TokenError, TokenService};

/// Numeric user identifier as issued by the directory.
pub type UserId = i64;
