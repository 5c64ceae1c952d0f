// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Directory
//!
//! A [`Directory`] over a [`StaticDirectory`] that counts calls and can be
//! made slow or unavailable at runtime.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::Method;
use gatehouse_api::auth::{
    Directory, DirectoryError, DirectorySeed, PermissionSet, StaticDirectory, UserId,
};
use tokio::sync::RwLock;

use super::fixtures::DirectoryFixtures;

/// Call counters of a [`MockDirectory`].
#[derive(Debug, Default)]
pub struct DirectoryCalls {
    /// `get_roles` calls.
    pub roles: AtomicU64,
    /// `get_permissions` calls.
    pub permissions: AtomicU64,
    /// `has_path_permission` calls.
    pub path: AtomicU64,
}

impl DirectoryCalls {
    /// Total calls of every kind.
    pub fn total(&self) -> u64 {
        self.roles() + self.permissions() + self.path()
    }

    /// `get_roles` calls.
    pub fn roles(&self) -> u64 {
        self.roles.load(Ordering::SeqCst)
    }

    /// `get_permissions` calls.
    pub fn permissions(&self) -> u64 {
        self.permissions.load(Ordering::SeqCst)
    }

    /// `has_path_permission` calls.
    pub fn path(&self) -> u64 {
        self.path.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.roles.store(0, Ordering::SeqCst);
        self.permissions.store(0, Ordering::SeqCst);
        self.path.store(0, Ordering::SeqCst);
    }
}

/// Instrumented directory.
pub struct MockDirectory {
    inner: RwLock<StaticDirectory>,
    calls: DirectoryCalls,
    latency_ms: AtomicU64,
    failing: AtomicBool,
}

impl Default for MockDirectory {
    fn default() -> Self {
        Self::new(DirectoryFixtures::seed())
    }
}

impl MockDirectory {
    /// Creates a mock serving `seed`.
    pub fn new(seed: DirectorySeed) -> Self {
        Self {
            inner: RwLock::new(StaticDirectory::from_seed(seed)),
            calls: DirectoryCalls::default(),
            latency_ms: AtomicU64::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Creates a shared mock over the fixture seed.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the call counters.
    pub fn calls(&self) -> &DirectoryCalls {
        &self.calls
    }

    /// Zeroes the call counters.
    pub fn reset_calls(&self) {
        self.calls.reset();
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Makes every call fail with [`DirectoryError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Replaces the served data, as an administrator editing grants would.
    pub async fn set_seed(&self, seed: DirectorySeed) {
        *self.inner.write().await = StaticDirectory::from_seed(seed);
    }

    async fn enter(&self, counter: &AtomicU64) -> Result<(), DirectoryError> {
        counter.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("mock failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for MockDirectory {
    async fn get_roles(&self, user_id: UserId) -> Result<HashSet<String>, DirectoryError> {
        self.enter(&self.calls.roles).await?;
        self.inner.read().await.get_roles(user_id).await
    }

    async fn get_permissions(&self, user_id: UserId) -> Result<PermissionSet, DirectoryError> {
        self.enter(&self.calls.permissions).await?;
        self.inner.read().await.get_permissions(user_id).await
    }

    async fn has_path_permission(
        &self,
        user_id: UserId,
        path: &str,
        method: &Method,
    ) -> Result<bool, DirectoryError> {
        self.enter(&self.calls.path).await?;
        self.inner
            .read()
            .await
            .has_path_permission(user_id, path, method)
            .await
    }
}
