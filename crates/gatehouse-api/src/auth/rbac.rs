// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-user cache of roles and permissions.
//!
//! Each user id owns one slot guarded by an async mutex. The first caller to
//! find a slot empty or stale fetches from the [`Directory`] while holding the
//! lock, so concurrent lookups for the same user collapse into one fetch.
//! Callers queued behind a failed fetch receive its error instead of fetching
//! again; the failure itself is never kept for later callers.
//! Slots of different users never contend.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{Directory, DirectoryError, PermissionSet, UserId};

// =============================================================================
// RbacCacheConfig
// =============================================================================

/// Configuration for the RBAC cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RbacCacheConfig {
    /// How long an entry stays fresh.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Upper bound for a single directory lookup.
    #[serde(with = "humantime_serde")]
    pub lookup_timeout: Duration,
}

impl Default for RbacCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            lookup_timeout: Duration::from_secs(2),
        }
    }
}

impl RbacCacheConfig {
    /// Sets the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the lookup timeout.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }
}

// =============================================================================
// RbacEntry
// =============================================================================

/// Cached roles and permissions of one user.
#[derive(Debug, Clone)]
pub struct RbacEntry {
    /// Role codes.
    pub roles: Arc<HashSet<String>>,
    /// Permissions through all roles.
    pub permissions: Arc<PermissionSet>,
    /// When the entry was fetched.
    pub fetched_at: Instant,
}

impl RbacEntry {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

#[derive(Debug, Default)]
struct SlotState {
    entry: Option<RbacEntry>,
    /// Error of the last failed fetch and the generation it completed at.
    failure: Option<(u64, DirectoryError)>,
}

/// One user's cache slot.
///
/// `generation` counts completed fetches. A caller samples it before waiting
/// on the lock; a failure recorded at a later generation finished while the
/// caller was queued, so it is shared rather than retried.
#[derive(Debug, Default)]
struct SlotCell {
    generation: AtomicU64,
    state: Mutex<SlotState>,
}

type Slot = Arc<SlotCell>;

// =============================================================================
// RbacStats
// =============================================================================

/// Counters exposed by the stats endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RbacStats {
    /// Slots currently held.
    pub entries: usize,
    /// Lookups answered from a fresh entry.
    pub hits: u64,
    /// Lookups that went to the directory.
    pub fetches: u64,
    /// Directory lookups that failed or timed out.
    pub failures: u64,
}

// =============================================================================
// RbacCache
// =============================================================================

/// TTL cache in front of a [`Directory`].
pub struct RbacCache {
    directory: Arc<dyn Directory>,
    slots: DashMap<UserId, Slot>,
    config: RbacCacheConfig,
    hits: AtomicU64,
    fetches: AtomicU64,
    failures: AtomicU64,
}

impl RbacCache {
    /// Creates an empty cache.
    pub fn new(directory: Arc<dyn Directory>, config: RbacCacheConfig) -> Self {
        Self {
            directory,
            slots: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RbacCacheConfig {
        &self.config
    }

    /// Returns the role codes of a user.
    pub async fn roles_of(&self, user_id: UserId) -> Result<Arc<HashSet<String>>, DirectoryError> {
        Ok(self.entry(user_id).await?.roles)
    }

    /// Returns the permissions of a user.
    pub async fn permissions_of(&self, user_id: UserId) -> Result<Arc<PermissionSet>, DirectoryError> {
        Ok(self.entry(user_id).await?.permissions)
    }

    /// Returns `true` if the user holds `role`.
    pub async fn has_role(&self, user_id: UserId, role: &str) -> Result<bool, DirectoryError> {
        Ok(self.roles_of(user_id).await?.contains(role))
    }

    /// Asks the directory whether the user may call `method` on `path`.
    ///
    /// Not cached. Bounded by the lookup timeout.
    pub async fn has_path_permission(
        &self,
        user_id: UserId,
        path: &str,
        method: &Method,
    ) -> Result<bool, DirectoryError> {
        let timeout = self.config.lookup_timeout;
        match tokio::time::timeout(
            timeout,
            self.directory.has_path_permission(user_id, path, method),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DirectoryError::Timeout(timeout)),
        }
    }

    /// Drops the entry of a user. The next lookup fetches.
    pub fn invalidate(&self, user_id: UserId) -> bool {
        let removed = self.slots.remove(&user_id).is_some();
        tracing::debug!(user_id = %user_id, removed, "RBAC entry invalidated");
        removed
    }

    /// Drops stale and empty slots no caller currently holds.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            // A second reference means a lookup is between cloning the slot
            // and locking it.
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.state.try_lock() {
                Ok(state) => state.entry.as_ref().is_some_and(|e| e.is_fresh(ttl, now)),
                Err(_) => true,
            }
        });
        before.saturating_sub(self.slots.len())
    }

    /// Returns the number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no slot is held.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> RbacStats {
        RbacStats {
            entries: self.slots.len(),
            hits: self.hits.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    async fn entry(&self, user_id: UserId) -> Result<RbacEntry, DirectoryError> {
        // Clone the slot out so the shard lock is released before awaiting.
        let slot: Slot = self.slots.entry(user_id).or_default().clone();
        let seen = slot.generation.load(Ordering::Acquire);
        let mut state = slot.state.lock().await;

        if let Some(entry) = state.entry.as_ref() {
            if entry.is_fresh(self.config.ttl, Instant::now()) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.clone());
            }
        }

        if let Some((generation, error)) = state.failure.as_ref() {
            if *generation > seen {
                return Err(error.clone());
            }
        }

        let result = self.fetch(user_id).await;
        let generation = slot.generation.fetch_add(1, Ordering::AcqRel) + 1;
        match result {
            Ok(entry) => {
                state.entry = Some(entry.clone());
                state.failure = None;
                Ok(entry)
            }
            Err(error) => {
                state.failure = Some((generation, error.clone()));
                Err(error)
            }
        }
    }

    async fn fetch(&self, user_id: UserId) -> Result<RbacEntry, DirectoryError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let timeout = self.config.lookup_timeout;
        let lookup = async {
            tokio::try_join!(
                self.directory.get_roles(user_id),
                self.directory.get_permissions(user_id)
            )
        };

        let result = match tokio::time::timeout(timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(DirectoryError::Timeout(timeout)),
        };

        match result {
            Ok((roles, permissions)) => {
                tracing::debug!(
                    user_id = %user_id,
                    roles = roles.len(),
                    permissions = permissions.len(),
                    "RBAC entry fetched"
                );
                Ok(RbacEntry {
                    roles: Arc::new(roles),
                    permissions: Arc::new(permissions),
                    fetched_at: Instant::now(),
                })
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(user_id = %user_id, error = %e, "Directory lookup failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for RbacCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RbacCache")
            .field("entries", &self.slots.len())
            .field("config", &self.config)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
