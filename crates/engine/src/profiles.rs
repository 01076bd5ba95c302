// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dynamic profile store: the keyed hot-tier state with per-key TTL.
//!
//! Every mutation rewrites the primary with a fresh TTL, fans out to the
//! secondary indices, and broadcasts a `ProfileUpdated` event. The
//! {serialize, primary write, fan-out, counter} sequence runs on a spawned
//! task, so a caller that drops its future mid-operation cannot leave a
//! primary write without its index fan-out. Concurrent writers to one key
//! race last-writer-wins on the primary; each index write is idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::broadcast;
use tracing::warn;

use crate::config::EngineSettings;
use crate::device::DeviceClass;
use crate::error::{EngineError, Result};
use crate::events::ProfileUpdated;
use crate::index::IndexMaintainer;
use crate::profile::{self, DynamicProfile};
use crate::store::{epoch_ms, Keys, Store};

pub struct ProfileStore {
    store: Arc<dyn Store>,
    keys: Keys,
    indices: Arc<IndexMaintainer>,
    settings: EngineSettings,
    updates_tx: broadcast::Sender<ProfileUpdated>,
}

fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(EngineError::invalid("user id must not be empty"));
    }
    Ok(())
}

impl ProfileStore {
    pub fn new(store: Arc<dyn Store>, keys: Keys, settings: EngineSettings) -> Self {
        let indices =
            Arc::new(IndexMaintainer::new(Arc::clone(&store), keys.clone(), settings.clone()));
        let (updates_tx, _) = broadcast::channel(256);
        Self { store, keys, indices, settings, updates_tx }
    }

    pub fn indices(&self) -> Arc<IndexMaintainer> {
        Arc::clone(&self.indices)
    }

    /// Subscribe to update events emitted after successful mutations.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<ProfileUpdated> {
        self.updates_tx.subscribe()
    }

    // -- Reads -----------------------------------------------------------------

    pub async fn get(&self, user_id: &str) -> Result<Option<DynamicProfile>> {
        validate_user_id(user_id)?;
        let key = self.keys.profile(user_id);
        let bytes = match self.store.fetch(&key).await {
            Err(e) if e.is_retriable() => {
                warn!(user_id = %user_id, "transient store failure on read, retrying: {e}");
                self.store.fetch(&key).await
            }
            other => other,
        }?;
        match bytes {
            Some(bytes) => Ok(Some(profile::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Batched read. The result preserves the order of the requested ids and
    /// omits absent ones.
    pub async fn get_many(&self, user_ids: &[String]) -> Result<IndexMap<String, DynamicProfile>> {
        let mut out = IndexMap::with_capacity(user_ids.len());
        for user_id in user_ids {
            if out.contains_key(user_id.as_str()) {
                continue;
            }
            if let Some(profile) = self.get(user_id).await? {
                out.insert(user_id.clone(), profile);
            }
        }
        Ok(out)
    }

    pub async fn exists(&self, user_id: &str) -> Result<bool> {
        validate_user_id(user_id)?;
        self.store.exists(&self.keys.profile(user_id)).await
    }

    /// Store-side live-user counter (exact after reaper reconciliation).
    pub async fn user_count(&self) -> Result<i64> {
        self.store.counter_get(&self.keys.user_counter()).await
    }

    // -- Mutations -------------------------------------------------------------

    /// Write a profile as a creation. Missing fields take their defaults;
    /// an existing key is overwritten (last writer wins) without touching
    /// the counter.
    pub async fn create(&self, mut profile: DynamicProfile) -> Result<DynamicProfile> {
        validate_user_id(&profile.user_id)?;
        let now = epoch_ms();
        if profile.last_active_at == 0 {
            profile.last_active_at = now;
        }
        if profile.version == 0 {
            profile.version = 1;
        }
        if let Some(main) = profile.main_device {
            profile.recent_devices.insert(main);
        }
        profile.updated_at = now.max(profile.last_active_at);

        let newly_created = !self.store.exists(&self.keys.profile(&profile.user_id)).await?;
        self.commit(profile, newly_created, true).await
    }

    /// Re-rank an existing profile: version bump, `updated_at` refresh,
    /// last-active floor at now, fresh TTL.
    pub async fn update(&self, profile: DynamicProfile) -> Result<DynamicProfile> {
        validate_user_id(&profile.user_id)?;
        self.apply_update(profile, false).await
    }

    /// Get-or-create, add `count` page views, update.
    pub async fn record_page_views(&self, user_id: &str, count: u64) -> Result<DynamicProfile> {
        validate_user_id(user_id)?;
        if count == 0 {
            return Err(EngineError::invalid("page view count must be positive"));
        }
        match self.get(user_id).await? {
            Some(mut profile) => {
                profile.page_view_count = profile.page_view_count.saturating_add(count);
                self.apply_update(profile, false).await
            }
            None => {
                let mut profile = DynamicProfile::new(user_id, epoch_ms());
                profile.page_view_count = count;
                self.create(profile).await
            }
        }
    }

    /// Get-or-create, floor `last_active_at` at `at_ms` (default now), update.
    pub async fn update_last_active(
        &self,
        user_id: &str,
        at_ms: Option<u64>,
    ) -> Result<DynamicProfile> {
        validate_user_id(user_id)?;
        let at = at_ms.unwrap_or_else(epoch_ms);
        match self.get(user_id).await? {
            Some(mut profile) => {
                if profile.last_active_at < at {
                    profile.last_active_at = at;
                }
                self.apply_update(profile, false).await
            }
            None => {
                // First signal for this user: the signal's own instant is
                // the initial activity timestamp.
                let mut profile = DynamicProfile::new(user_id, epoch_ms());
                profile.last_active_at = at;
                self.create(profile).await
            }
        }
    }

    /// Get-or-create, record a device observation, update (with device
    /// fan-out).
    pub async fn update_device(
        &self,
        user_id: &str,
        class: DeviceClass,
    ) -> Result<DynamicProfile> {
        validate_user_id(user_id)?;
        match self.get(user_id).await? {
            Some(mut profile) => {
                profile.observe_device(class);
                self.apply_update(profile, true).await
            }
            None => {
                let mut profile = DynamicProfile::new(user_id, epoch_ms());
                profile.observe_device(class);
                self.create(profile).await
            }
        }
    }

    /// Apply page-view deltas for many users. Semantics match sequential
    /// `record_page_views` calls, with index writes coalesced per batch.
    /// Validation happens before any state changes. Returns the number of
    /// profiles written.
    pub async fn batch_update_page_views(&self, deltas: &HashMap<String, u64>) -> Result<usize> {
        for (user_id, delta) in deltas {
            validate_user_id(user_id)?;
            if *delta == 0 {
                return Err(EngineError::invalid(format!(
                    "page view count must be positive (user {user_id})"
                )));
            }
        }
        if deltas.is_empty() {
            return Ok(0);
        }

        let store = Arc::clone(&self.store);
        let indices = Arc::clone(&self.indices);
        let keys = self.keys.clone();
        let ttl = self.settings.default_ttl;
        let counter = self.keys.user_counter();
        let updates_tx = self.updates_tx.clone();
        let deltas = deltas.clone();

        let handle = tokio::spawn(async move {
            let now = epoch_ms();
            let expires_at = now + ttl.as_millis() as u64;
            let mut batch: Vec<(DynamicProfile, u64)> = Vec::with_capacity(deltas.len());
            let mut created: i64 = 0;

            for (user_id, delta) in deltas {
                let key = keys.profile(&user_id);
                let mut profile = match store.fetch(&key).await? {
                    Some(bytes) => {
                        let mut profile = profile::decode(&bytes)?;
                        profile.page_view_count = profile.page_view_count.saturating_add(delta);
                        profile.touch(now);
                        profile
                    }
                    None => {
                        created += 1;
                        let mut profile = DynamicProfile::new(&user_id, now);
                        profile.page_view_count = delta;
                        profile
                    }
                };
                profile.updated_at = profile.updated_at.max(now);
                store.put(&key, &profile::encode(&profile)?, Some(ttl)).await?;
                batch.push((profile, expires_at));
            }

            indices.on_write_many(&batch).await?;
            if created > 0 {
                store.counter_add(&counter, created).await?;
            }
            for (profile, _) in &batch {
                let _ = updates_tx.send(ProfileUpdated::from_profile(profile));
            }
            Ok(batch.len())
        });
        handle.await.map_err(|e| EngineError::fatal(format!("batch commit task: {e}")))?
    }

    /// Delete the primary and remove the user from every index it
    /// participates in; the counter is decremented, floored at zero.
    pub async fn delete(&self, user_id: &str) -> Result<bool> {
        validate_user_id(user_id)?;
        let Some(existing) = self.get(user_id).await? else {
            return Ok(false);
        };

        let store = Arc::clone(&self.store);
        let indices = Arc::clone(&self.indices);
        let key = self.keys.profile(user_id);
        let counter = self.keys.user_counter();

        let handle = tokio::spawn(async move {
            let removed = store.remove(&key).await?;
            if removed {
                indices.on_delete(&existing).await?;
                let left = store.counter_add(&counter, -1).await?;
                if left < 0 {
                    store.counter_set(&counter, 0).await?;
                }
            }
            Ok(removed)
        });
        handle.await.map_err(|e| EngineError::fatal(format!("delete task: {e}")))?
    }

    // -- Internals -------------------------------------------------------------

    async fn apply_update(
        &self,
        mut profile: DynamicProfile,
        touch_device: bool,
    ) -> Result<DynamicProfile> {
        let newly_created = !self.store.exists(&self.keys.profile(&profile.user_id)).await?;
        profile.touch(epoch_ms());
        self.commit(profile, newly_created, touch_device).await
    }

    /// Commit with a single internal retry on transient store failures.
    async fn commit(
        &self,
        profile: DynamicProfile,
        newly_created: bool,
        touch_device: bool,
    ) -> Result<DynamicProfile> {
        match self.commit_once(profile.clone(), newly_created, touch_device).await {
            Err(e) if e.is_retriable() => {
                warn!(user_id = %profile.user_id, "transient store failure on write, retrying: {e}");
                self.commit_once(profile, newly_created, touch_device).await
            }
            other => other,
        }
    }

    /// One commit attempt, run to completion on its own task.
    async fn commit_once(
        &self,
        profile: DynamicProfile,
        newly_created: bool,
        touch_device: bool,
    ) -> Result<DynamicProfile> {
        let store = Arc::clone(&self.store);
        let indices = Arc::clone(&self.indices);
        let key = self.keys.profile(&profile.user_id);
        let counter = self.keys.user_counter();
        let ttl = self.settings.default_ttl;
        let updates_tx = self.updates_tx.clone();

        let handle = tokio::spawn(async move {
            let bytes = profile::encode(&profile)?;
            let expires_at = epoch_ms() + ttl.as_millis() as u64;
            store.put(&key, &bytes, Some(ttl)).await?;
            indices.on_write(&profile, expires_at).await?;
            if touch_device {
                indices.on_device(&profile).await?;
            }
            if newly_created {
                store.counter_add(&counter, 1).await?;
            }
            let _ = updates_tx.send(ProfileUpdated::from_profile(&profile));
            Ok(profile)
        });
        handle.await.map_err(|e| EngineError::fatal(format!("commit task: {e}")))?
    }
}

#[cfg(test)]
#[path = "profiles_tests.rs"]
mod tests;
