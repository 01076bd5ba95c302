// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secondary index maintainer.
//!
//! Keeps the derived indices coherent with the primary profile store on
//! every mutation: the active-users and page-view ranks (ordered by score),
//! the expiry index (the reaper's work queue), one membership set per device
//! variant, and the store-side total-user counter. Index writes for a single
//! primary write are issued in the fixed order {active, page-view, expiry,
//! device}; readers must treat cross-index membership as eventual.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::config::EngineSettings;
use crate::device::DeviceClass;
use crate::error::{EngineError, Result};
use crate::profile::{self, DynamicProfile};
use crate::store::{epoch_ms, Keys, Store};

/// One row of a page-view rank query, re-verified against the primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedUser {
    pub user_id: String,
    pub page_view_count: u64,
}

pub struct IndexMaintainer {
    store: Arc<dyn Store>,
    keys: Keys,
    settings: EngineSettings,
}

impl IndexMaintainer {
    pub fn new(store: Arc<dyn Store>, keys: Keys, settings: EngineSettings) -> Self {
        Self { store, keys, settings }
    }

    /// Extend an index key's own expiration so it outlives the slowest
    /// participating profile. Best-effort: a failed extension only shortens
    /// the index's life, it never loses writes.
    async fn extend(&self, key: &str) {
        if let Err(e) = self.store.extend_ttl(key, self.settings.index_ttl()).await {
            warn!(key = %key, "index ttl extension failed: {e}");
        }
    }

    /// Fan-out for a primary write: active, page-view, and expiry ranks.
    pub async fn on_write(&self, profile: &DynamicProfile, expires_at_ms: u64) -> Result<()> {
        let active = self.keys.idx_active();
        self.store.zadd(&active, &profile.user_id, profile.last_active_at as f64).await?;
        self.extend(&active).await;

        let pageviews = self.keys.idx_pageviews();
        self.store.zadd(&pageviews, &profile.user_id, profile.page_view_count as f64).await?;
        self.extend(&pageviews).await;

        let expiry = self.keys.idx_expiry();
        self.store.zadd(&expiry, &profile.user_id, expires_at_ms as f64).await?;
        self.extend(&expiry).await;
        Ok(())
    }

    /// Device fan-out: membership for the main and recent variants. Never
    /// removes memberships — recent-device history survives a main change.
    pub async fn on_device(&self, profile: &DynamicProfile) -> Result<()> {
        for class in &profile.recent_devices {
            let key = self.keys.idx_device(*class);
            self.store.sadd(&key, &profile.user_id).await?;
            self.extend(&key).await;
        }
        Ok(())
    }

    /// Coalesced fan-out for a batch of primary writes: all members per
    /// index, one TTL extension per index.
    pub async fn on_write_many(&self, batch: &[(DynamicProfile, u64)]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let active = self.keys.idx_active();
        for (profile, _) in batch {
            self.store.zadd(&active, &profile.user_id, profile.last_active_at as f64).await?;
        }
        self.extend(&active).await;

        let pageviews = self.keys.idx_pageviews();
        for (profile, _) in batch {
            self.store.zadd(&pageviews, &profile.user_id, profile.page_view_count as f64).await?;
        }
        self.extend(&pageviews).await;

        let expiry = self.keys.idx_expiry();
        for (profile, expires_at_ms) in batch {
            self.store.zadd(&expiry, &profile.user_id, *expires_at_ms as f64).await?;
        }
        self.extend(&expiry).await;
        Ok(())
    }

    /// Remove a deleted profile from every index it participates in.
    pub async fn on_delete(&self, profile: &DynamicProfile) -> Result<()> {
        let member = vec![profile.user_id.clone()];
        self.store.zrem(&self.keys.idx_active(), &member).await?;
        self.store.zrem(&self.keys.idx_pageviews(), &member).await?;
        self.store.zrem(&self.keys.idx_expiry(), &member).await?;
        for class in &profile.recent_devices {
            self.store.srem(&self.keys.idx_device(*class), &profile.user_id).await?;
        }
        Ok(())
    }

    /// Remove reconciled members from the non-expiry indices. The primaries
    /// are already gone, so device membership is unknowable and every
    /// variant set is swept.
    pub async fn purge_members(&self, members: &[String]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        self.store.zrem(&self.keys.idx_active(), members).await?;
        self.store.zrem(&self.keys.idx_pageviews(), members).await?;
        for class in DeviceClass::ALL {
            let key = self.keys.idx_device(class);
            for member in members {
                self.store.srem(&key, member).await?;
            }
        }
        Ok(())
    }

    // -- Queries ---------------------------------------------------------------

    /// Users active within the configured default recency window.
    pub async fn recently_active(&self) -> Result<Vec<String>> {
        self.active_since(self.settings.active_users_ttl.as_secs()).await
    }

    /// Users active within the last `window_secs`, most recent first.
    /// A zero window is empty by definition and touches no index.
    pub async fn active_since(&self, window_secs: u64) -> Result<Vec<String>> {
        if window_secs == 0 {
            return Ok(Vec::new());
        }
        let now = epoch_ms();
        let min = now.saturating_sub(window_secs.saturating_mul(1_000)) as f64;
        self.store.zrevrange_by_score(&self.keys.idx_active(), f64::INFINITY, min, 0, None).await
    }

    /// Top users by page views with `count ≥ min_views`, strict descending,
    /// paginated. The index score is re-verified against the primary at
    /// assembly time so races with concurrent updates cannot surface rows
    /// below the floor; users whose primary vanished are dropped.
    pub async fn top_by_pageviews(
        &self,
        min_views: u64,
        page: usize,
        size: usize,
    ) -> Result<Vec<RankedUser>> {
        if size == 0 {
            return Err(EngineError::invalid("page size must be positive"));
        }
        let members = self
            .store
            .zrevrange_by_score(
                &self.keys.idx_pageviews(),
                f64::INFINITY,
                min_views as f64,
                page.saturating_mul(size),
                Some(size),
            )
            .await?;

        let mut ranked = Vec::with_capacity(members.len());
        for user_id in members {
            let Some(bytes) = self.store.fetch(&self.keys.profile(&user_id)).await? else {
                continue;
            };
            let profile = profile::decode(&bytes)?;
            if profile.page_view_count >= min_views {
                ranked.push(RankedUser { user_id, page_view_count: profile.page_view_count });
            }
        }
        Ok(ranked)
    }

    /// Descending page-view ranking with index scores, keyed in rank order.
    pub async fn top_by_pageviews_with_score(
        &self,
        min_views: u64,
    ) -> Result<IndexMap<String, u64>> {
        let entries = self
            .store
            .zrevrange_with_scores(&self.keys.idx_pageviews(), f64::INFINITY, min_views as f64)
            .await?;
        Ok(entries.into_iter().map(|(member, score)| (member, score as u64)).collect())
    }

    /// Members of one device variant set.
    pub async fn by_device(&self, class: DeviceClass) -> Result<Vec<String>> {
        self.store.smembers(&self.keys.idx_device(class)).await
    }

    /// Membership size per device variant.
    pub async fn device_distribution(&self) -> Result<BTreeMap<DeviceClass, u64>> {
        let mut out = BTreeMap::new();
        for class in DeviceClass::ALL {
            out.insert(class, self.store.scard(&self.keys.idx_device(class)).await?);
        }
        Ok(out)
    }

    /// Expiry-index entries due at or before `now_ms`.
    pub async fn overdue_count(&self, now_ms: u64) -> Result<u64> {
        self.store.zcount(&self.keys.idx_expiry(), f64::NEG_INFINITY, now_ms as f64).await
    }

    /// Store-side total-user counter.
    pub async fn user_count(&self) -> Result<i64> {
        self.store.counter_get(&self.keys.user_counter()).await
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
