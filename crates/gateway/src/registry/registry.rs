// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::container::{ContainerEntry, Hook, HookEffect, Params, Status};
use crate::error::GatewayError;

struct Buckets {
    active_by_id: HashMap<String, Arc<ContainerEntry>>,
    active_by_seed: HashMap<String, Arc<ContainerEntry>>,
    stopping: HashMap<String, Arc<ContainerEntry>>,
    failed: HashMap<String, Arc<ContainerEntry>>,
}

/// Entry counts per bucket, for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    pub active: usize,
    pub stopping: usize,
    pub failed: usize,
}

impl Buckets {
    fn new() -> Self {
        Self {
            active_by_id: HashMap::new(),
            active_by_seed: HashMap::new(),
            stopping: HashMap::new(),
            failed: HashMap::new(),
        }
    }
}

/// Coalescing registry of container entries.
///
/// Bucket membership (this struct's maps) is guarded by `inner`; entry
/// fields are guarded by each entry's own lock. Locking order is always
/// registry before entry, never the reverse — hooks run under the entry
/// lock must not reach back into the registry.
pub struct Registry {
    inner: RwLock<Buckets>,
    subscription_capacity: usize,
}

impl Registry {
    pub fn new(subscription_capacity: usize) -> Self {
        Self { inner: RwLock::new(Buckets::new()), subscription_capacity }
    }

    /// Insert a freshly-constructed entry that already has both an ID and a
    /// seed; fails if either index slot is occupied. Used by tests and by
    /// any caller that bypasses `existing_or_new_by_params`.
    pub async fn register(&self, id: String, seed: String, entry: Arc<ContainerEntry>) -> Result<(), GatewayError> {
        let mut buckets = self.inner.write().await;
        if buckets.active_by_id.contains_key(&id) || buckets.active_by_seed.contains_key(&seed) {
            return Err(GatewayError::AlreadyExists);
        }
        buckets.active_by_id.insert(id, entry.clone());
        buckets.active_by_seed.insert(seed, entry);
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Arc<ContainerEntry>, GatewayError> {
        let buckets = self.inner.read().await;
        let entry = buckets.active_by_id.get(id).cloned().ok_or(GatewayError::NotFound)?;
        entry.touch().await;
        Ok(entry)
    }

    pub async fn get_by_seed(&self, seed: &str) -> Result<Arc<ContainerEntry>, GatewayError> {
        let buckets = self.inner.read().await;
        let entry = buckets.active_by_seed.get(seed).cloned().ok_or(GatewayError::NotFound)?;
        entry.touch().await;
        Ok(entry)
    }

    /// Fast path: an active entry for `params.seed` already exists, bump
    /// `lastUsed` and return it. Otherwise insert a fresh placeholder entry
    /// into the seed index under the write lock and return it.
    ///
    /// This is the single-phase redesign: the placeholder is published
    /// directly into `active_by_seed` the instant it is created, under the
    /// same write-lock acquisition that checked for an existing entry. Two
    /// concurrent callers for the same seed therefore always observe the
    /// same `Arc<ContainerEntry>` — the second one to reach the write lock
    /// finds the first one's placeholder already indexed. There is no
    /// separate ID-index publication step; `register_id` below folds that
    /// into the `ensure_created` wrapper once the runtime assigns an ID.
    pub async fn existing_or_new_by_params(&self, params: Params) -> (bool, Arc<ContainerEntry>) {
        let mut buckets = self.inner.write().await;
        if let Some(existing) = buckets.active_by_seed.get(&params.seed).cloned() {
            drop(buckets);
            existing.touch().await;
            return (true, existing);
        }
        let entry = Arc::new(ContainerEntry::new(params.clone(), self.subscription_capacity));
        buckets.active_by_seed.insert(params.seed.clone(), entry.clone());
        (false, entry)
    }

    /// Registry-side wrapper around the `New -> Created` transition: holds
    /// the write lock for the whole transition (including hooks) and, on
    /// success, indexes the entry by its now-known runtime ID.
    pub async fn ensure_created(&self, entry: &Arc<ContainerEntry>, hooks: Vec<Hook>) -> Result<(), GatewayError> {
        let mut buckets = self.inner.write().await;
        let result = entry.transition(Status::Created, hooks).await;
        if result.is_ok() {
            let id = entry.id().await;
            if !id.is_empty() {
                buckets.active_by_id.insert(id, entry.clone());
            }
        }
        result
    }

    /// Registry-side wrapper around a transition to `Stopped`: moves the
    /// entry from the active buckets into `stopping` on success.
    pub async fn ensure_stopped(&self, entry: &Arc<ContainerEntry>, hooks: Vec<Hook>) -> Result<(), GatewayError> {
        let mut buckets = self.inner.write().await;
        let result = entry.transition(Status::Stopped, hooks).await;
        move_to_stopping_on_success(&mut buckets, entry, &result).await;
        result
    }

    /// As `ensure_stopped`, but re-checks `last_used` against `recheck`
    /// under the entry's own lock before running `hooks`, aborting the
    /// transition if it returns `false`. Used by the idle reaper.
    pub async fn ensure_stopped_checked(
        &self,
        entry: &Arc<ContainerEntry>,
        recheck: impl FnOnce(Instant) -> bool + Send + 'static,
        hooks: Vec<Hook>,
    ) -> Result<(), GatewayError> {
        let mut buckets = self.inner.write().await;
        let result = entry.transition_with_recheck(Status::Stopped, recheck, hooks).await;
        move_to_stopping_on_success(&mut buckets, entry, &result).await;
        result
    }

    /// Registry-side wrapper around a transition to `Failed`.
    ///
    /// The entry is *not* removed from the active buckets: scenario S6
    /// requires that a subsequent `existing_or_new_by_params` for the same
    /// seed still observes the terminal `Failed` entry so the dispatcher
    /// can reject fast instead of silently spinning up a replacement. It is
    /// additionally indexed in `failed` for terminal-entry introspection.
    pub async fn mark_failed(&self, entry: &Arc<ContainerEntry>, hooks: Vec<Hook>) -> Result<(), GatewayError> {
        let mut buckets = self.inner.write().await;
        let result = entry.transition(Status::Failed, hooks).await;
        if result.is_ok() {
            let id = entry.id().await;
            let params = entry.params().await;
            buckets.failed.insert(if id.is_empty() { params.seed } else { id }, entry.clone());
        }
        result
    }

    pub async fn active_containers(&self) -> Vec<Arc<ContainerEntry>> {
        self.inner.read().await.active_by_id.values().cloned().collect()
    }

    /// Active entries whose `lastUsed` predates `before`.
    pub async fn old_containers(&self, before: Instant) -> Vec<Arc<ContainerEntry>> {
        let buckets = self.inner.read().await;
        let mut out = Vec::new();
        for entry in buckets.active_by_id.values() {
            if entry.last_used().await < before {
                out.push(entry.clone());
            }
        }
        out
    }

    /// Entry counts per bucket, for the health endpoint's registry summary.
    pub async fn bucket_counts(&self) -> BucketCounts {
        let buckets = self.inner.read().await;
        BucketCounts {
            active: buckets.active_by_id.len(),
            stopping: buckets.stopping.len(),
            failed: buckets.failed.len(),
        }
    }

    pub async fn delete(&self, id: &str) {
        let mut buckets = self.inner.write().await;
        if let Some(entry) = buckets.active_by_id.remove(id) {
            let params = entry.params().await;
            buckets.active_by_seed.remove(&params.seed);
        }
        buckets.stopping.remove(id);
        buckets.failed.remove(id);
    }
}

async fn move_to_stopping_on_success(buckets: &mut Buckets, entry: &Arc<ContainerEntry>, result: &Result<(), GatewayError>) {
    if result.is_ok() {
        let id = entry.id().await;
        let params = entry.params().await;
        buckets.active_by_id.remove(&id);
        buckets.active_by_seed.remove(&params.seed);
        if !id.is_empty() {
            buckets.stopping.insert(id, entry.clone());
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
