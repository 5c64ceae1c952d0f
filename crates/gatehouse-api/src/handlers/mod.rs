// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API handlers.
//!
//! - [`health`]: liveness
//! - [`refresh`], [`me`]: token endpoints
//! - [`invalidate_rbac`], [`stats`]: administration

mod admin;
mod auth;
mod health;

pub use admin::*;
pub use auth::*;
pub use health::*;
