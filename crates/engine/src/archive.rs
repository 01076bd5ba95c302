// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cold-tier document collaborator contract.
//!
//! The durable, schemaless per-user document aggregating the dynamic and
//! static sides. Strictly downstream of the engine: documents are written by
//! aggregator-driven materialization and never read back by the core.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::aggregator::{ActivityLevel, Snapshot};
use crate::device::DeviceClass;
use crate::error::Result;
use crate::profile::DynamicProfile;
use crate::statics::StaticProfile;
use crate::store::epoch_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Active,
    Archived,
    Deleted,
}

/// Durable per-user document. `extended_properties`, `social_media`, and
/// `computed_metrics` carry ad-hoc fields keyed by string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub user_id: String,
    /// Bumped on every upsert.
    pub data_version: u64,
    pub status: DocumentStatus,
    pub static_profile: Option<StaticProfile>,
    pub dynamic_profile: Option<DynamicProfile>,
    pub activity_level: ActivityLevel,
    pub value_score: u8,
    pub is_high_value_user: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub extended_properties: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub social_media: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub computed_metrics: BTreeMap<String, serde_json::Value>,
    pub updated_at: u64,
}

impl ProfileDocument {
    /// First document revision for a snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            user_id: snapshot.user_id.clone(),
            data_version: 1,
            status: DocumentStatus::Active,
            static_profile: snapshot.static_profile.clone(),
            dynamic_profile: snapshot.dynamic_profile.clone(),
            activity_level: snapshot.activity_level,
            value_score: snapshot.value_score,
            is_high_value_user: snapshot.is_high_value_user,
            tags: BTreeSet::new(),
            extended_properties: BTreeMap::new(),
            social_media: BTreeMap::new(),
            computed_metrics: BTreeMap::new(),
            updated_at: epoch_ms(),
        }
    }

    /// Fold a newer snapshot into an existing document, preserving ad-hoc
    /// fields and tags and bumping `data_version`.
    pub fn absorb(&mut self, snapshot: &Snapshot) {
        self.static_profile = snapshot.static_profile.clone();
        self.dynamic_profile = snapshot.dynamic_profile.clone();
        self.activity_level = snapshot.activity_level;
        self.value_score = snapshot.value_score;
        self.is_high_value_user = snapshot.is_high_value_user;
        self.data_version += 1;
        self.status = DocumentStatus::Active;
        self.updated_at = epoch_ms();
    }
}

/// Contract consumed by aggregator-driven materialization.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Idempotent upsert; bumps `data_version` and reactivates the document.
    async fn upsert_document(&self, snapshot: &Snapshot) -> Result<ProfileDocument>;
    async fn get_active(&self, user_id: &str) -> Result<Option<ProfileDocument>>;
    async fn mark_deleted(&self, user_id: &str) -> Result<bool>;
    async fn find_by_city(&self, city: &str) -> Result<Vec<ProfileDocument>>;
    async fn find_by_device_class(&self, class: DeviceClass) -> Result<Vec<ProfileDocument>>;
    /// Match against the `interests` array in `extended_properties`.
    async fn find_by_interest(&self, interest: &str) -> Result<Vec<ProfileDocument>>;
    /// Match against the `industry` field in `extended_properties`.
    async fn find_by_industry(&self, industry: &str) -> Result<Vec<ProfileDocument>>;
    async fn find_high_value_active(
        &self,
        min_score: u8,
        since_ms: u64,
    ) -> Result<Vec<ProfileDocument>>;
    async fn count_active(&self) -> Result<u64>;
    async fn count_active_since(&self, since_ms: u64) -> Result<u64>;
    async fn add_tag(&self, user_id: &str, tag: &str) -> Result<bool>;
    async fn find_by_tag(&self, tag: &str) -> Result<Vec<ProfileDocument>>;
}
