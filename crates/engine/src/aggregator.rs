// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Profile aggregator: composes the dynamic and static sides into an
//! immutable [`Snapshot`] for external readers.
//!
//! Aggregation is partial-failure tolerant: a failed side degrades the
//! snapshot (that side absent, a warning marker attached) and never raises.
//! Two scenario caches sit in front of composition — a short-epoch CRM cache
//! invalidated on profile updates, and a long-epoch analytics cache where
//! stale reads are tolerated.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::archive::ArchiveStore;
use crate::error::Result;
use crate::events::ProfileUpdated;
use crate::profile::DynamicProfile;
use crate::profiles::ProfileStore;
use crate::statics::{StaticProfile, StaticProfileStore};
use crate::store::epoch_ms;

/// Freshness-first cache epoch for CRM reads.
const CRM_CACHE_TTL: Duration = Duration::from_secs(30);
/// Throughput-first cache epoch for analytics reads.
const ANALYTICS_CACHE_TTL: Duration = Duration::from_secs(600);
const CACHE_CAPACITY: u64 = 100_000;

/// High-value gate on the composed score.
const HIGH_VALUE_THRESHOLD: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityLevel {
    VeryActive,
    Active,
    Dormant,
    Unknown,
}

impl ActivityLevel {
    /// Derive from the last behavioral signal: very active within 1 hour,
    /// active within 24 hours, dormant within 30 days.
    pub fn from_last_active(last_active_ms: u64, now_ms: u64) -> Self {
        let idle_ms = now_ms.saturating_sub(last_active_ms);
        if idle_ms < 3_600_000 {
            Self::VeryActive
        } else if idle_ms < 86_400_000 {
            Self::Active
        } else if idle_ms < 2_592_000_000 {
            Self::Dormant
        } else {
            Self::Unknown
        }
    }
}

/// Marker attached to a snapshot when a side failed and was degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotWarning {
    DynamicUnavailable,
    StaticUnavailable,
}

/// Immutable composed read of one user. Materialized per read, never
/// persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub user_id: String,
    pub static_profile: Option<StaticProfile>,
    pub dynamic_profile: Option<DynamicProfile>,
    pub activity_level: ActivityLevel,
    pub value_score: u8,
    pub is_high_value_user: bool,
    pub composed_at: u64,
    pub warnings: Vec<SnapshotWarning>,
}

/// Engagement component of the value score: one point per ten page views,
/// saturating at 100.
pub fn engagement_score(page_view_count: u64) -> u8 {
    (page_view_count / 10).min(100) as u8
}

/// Deterministic value score 0–100: completeness weighted 40, engagement 60.
pub fn value_score(completeness: u8, engagement: u8) -> u8 {
    ((40 * completeness as u32 + 60 * engagement as u32) / 100) as u8
}

/// Both user-count semantics, side by side. Neither is canonical: the hot
/// count tracks live dynamic profiles, the static count tracks registrations.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AggregateStats {
    pub hot_users: i64,
    pub static_users: u64,
}

pub struct Aggregator {
    profiles: Arc<ProfileStore>,
    statics: Arc<dyn StaticProfileStore>,
    crm_cache: Cache<String, Arc<Snapshot>>,
    analytics_cache: Cache<String, Arc<Snapshot>>,
}

impl Aggregator {
    pub fn new(profiles: Arc<ProfileStore>, statics: Arc<dyn StaticProfileStore>) -> Self {
        Self {
            profiles,
            statics,
            crm_cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(CRM_CACHE_TTL)
                .build(),
            analytics_cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(ANALYTICS_CACHE_TTL)
                .build(),
        }
    }

    /// Compose a fresh snapshot. Absent on both sides means absent overall.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Arc<Snapshot>>> {
        self.compose(user_id).await
    }

    /// Freshness-first read path. At most one cache epoch stale, and the
    /// epoch is cut short by update invalidation (see [`watch_updates`]).
    ///
    /// [`watch_updates`]: Self::watch_updates
    pub async fn get_for_crm(&self, user_id: &str) -> Result<Option<Arc<Snapshot>>> {
        if let Some(snapshot) = self.crm_cache.get(user_id).await {
            return Ok(Some(snapshot));
        }
        match self.compose(user_id).await? {
            Some(snapshot) => {
                self.crm_cache.insert(user_id.to_owned(), Arc::clone(&snapshot)).await;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Throughput-first read path; stale reads tolerated for a long epoch.
    pub async fn get_for_analytics(&self, user_id: &str) -> Result<Option<Arc<Snapshot>>> {
        if let Some(snapshot) = self.analytics_cache.get(user_id).await {
            return Ok(Some(snapshot));
        }
        match self.compose(user_id).await? {
            Some(snapshot) => {
                self.analytics_cache.insert(user_id.to_owned(), Arc::clone(&snapshot)).await;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Drop cached CRM snapshots as their dynamic side changes, so the CRM
    /// path never serves a snapshot older than the last observed mutation.
    pub fn watch_updates(
        self: &Arc<Self>,
        mut updates_rx: broadcast::Receiver<ProfileUpdated>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let aggregator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = updates_rx.recv() => {
                        match event {
                            Ok(event) => {
                                aggregator.crm_cache.invalidate(&event.user_id).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => {
                                // Missed invalidations: clear rather than serve stale.
                                aggregator.crm_cache.invalidate_all();
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }

    /// Both user-count semantics.
    pub async fn stats(&self) -> Result<AggregateStats> {
        let hot_users = self.profiles.user_count().await?;
        let static_users = self.statics.count_registered_since(0).await?;
        Ok(AggregateStats { hot_users, static_users })
    }

    /// Materialize a snapshot into the cold-tier document store. Returns
    /// whether the user existed on either side.
    pub async fn materialize(&self, user_id: &str, archive: &dyn ArchiveStore) -> Result<bool> {
        match self.compose(user_id).await? {
            Some(snapshot) => {
                archive.upsert_document(&snapshot).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn compose(&self, user_id: &str) -> Result<Option<Arc<Snapshot>>> {
        let mut warnings = Vec::new();

        let dynamic = match self.profiles.get(user_id).await {
            Ok(dynamic) => dynamic,
            Err(e) if e.kind == crate::error::ErrorKind::InvalidArgument => return Err(e),
            Err(e) => {
                warn!(user_id = %user_id, "dynamic side unavailable, degrading snapshot: {e}");
                warnings.push(SnapshotWarning::DynamicUnavailable);
                None
            }
        };

        let static_profile = match self.statics.get_by_id(user_id).await {
            Ok(profile) => profile.filter(|p| !p.is_deleted),
            Err(e) => {
                warn!(user_id = %user_id, "static side unavailable, degrading snapshot: {e}");
                warnings.push(SnapshotWarning::StaticUnavailable);
                None
            }
        };

        if dynamic.is_none() && static_profile.is_none() && warnings.is_empty() {
            return Ok(None);
        }

        let now = epoch_ms();
        let activity_level = dynamic
            .as_ref()
            .map(|d| ActivityLevel::from_last_active(d.last_active_at, now))
            .unwrap_or(ActivityLevel::Unknown);
        let completeness =
            static_profile.as_ref().map(|s| s.completeness_score()).unwrap_or(0);
        let engagement =
            dynamic.as_ref().map(|d| engagement_score(d.page_view_count)).unwrap_or(0);
        let score = value_score(completeness, engagement);
        let is_high_value_user = score >= HIGH_VALUE_THRESHOLD
            && matches!(activity_level, ActivityLevel::VeryActive | ActivityLevel::Active);

        Ok(Some(Arc::new(Snapshot {
            user_id: user_id.to_owned(),
            static_profile,
            dynamic_profile: dynamic,
            activity_level,
            value_score: score,
            is_high_value_user,
            composed_at: now,
            warnings,
        })))
    }
}

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod tests;
