// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static-profile collaborator contract.
//!
//! The persistent demographic store is external to this engine; the
//! aggregator consumes it through [`StaticProfileStore`]. Email and phone
//! are unique among non-deleted rows; `version` is a monotonic
//! optimistic-concurrency counter.

use serde::{Deserialize, Serialize};

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgeGroup {
    Child,
    Teen,
    YoungAdult,
    Adult,
    Senior,
}

/// Persistent demographic record, keyed by `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticProfile {
    pub user_id: String,
    /// Epoch ms of registration.
    pub registration_date: u64,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub age_group: Option<AgeGroup>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub source_channel: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    pub version: u64,
}

impl StaticProfile {
    pub fn new(user_id: impl Into<String>, registration_date: u64) -> Self {
        Self {
            user_id: user_id.into(),
            registration_date,
            gender: None,
            age_group: None,
            real_name: None,
            email: None,
            phone_number: None,
            city: None,
            source_channel: None,
            is_deleted: false,
            version: 1,
        }
    }

    /// Profile-completeness score 0–100: fixed weights over filled optional
    /// fields. Deterministic and monotone as more fields are filled.
    pub fn completeness_score(&self) -> u8 {
        let mut score = 0u8;
        if self.real_name.is_some() {
            score += 20;
        }
        if self.email.is_some() {
            score += 20;
        }
        if self.phone_number.is_some() {
            score += 20;
        }
        if self.gender.is_some() {
            score += 10;
        }
        if self.age_group.is_some() {
            score += 10;
        }
        if self.city.is_some() {
            score += 10;
        }
        if self.source_channel.is_some() {
            score += 10;
        }
        score
    }
}

/// Field-wise patch for partial updates; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct StaticProfilePatch {
    pub gender: Option<Gender>,
    pub age_group: Option<AgeGroup>,
    pub real_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub city: Option<String>,
    pub source_channel: Option<String>,
}

/// Contract consumed from the external demographic store.
#[async_trait]
pub trait StaticProfileStore: Send + Sync {
    async fn get_by_id(&self, user_id: &str) -> Result<Option<StaticProfile>>;
    async fn get_by_email(&self, email: &str) -> Result<Option<StaticProfile>>;
    async fn get_by_phone(&self, phone: &str) -> Result<Option<StaticProfile>>;
    async fn exists_email(&self, email: &str) -> Result<bool>;
    async fn exists_phone(&self, phone: &str) -> Result<bool>;
    async fn create(&self, profile: StaticProfile) -> Result<StaticProfile>;
    /// Full update with an optimistic version check; a stale `version`
    /// fails with `Conflict`.
    async fn update(&self, profile: StaticProfile) -> Result<StaticProfile>;
    async fn partial_update(
        &self,
        user_id: &str,
        patch: StaticProfilePatch,
    ) -> Result<StaticProfile>;
    async fn soft_delete(&self, user_id: &str) -> Result<bool>;
    async fn restore(&self, user_id: &str) -> Result<bool>;
    async fn list_by_source_channel(&self, channel: &str) -> Result<Vec<StaticProfile>>;
    async fn list_by_city(&self, city: &str) -> Result<Vec<StaticProfile>>;
    async fn list_by_gender(&self, gender: Gender) -> Result<Vec<StaticProfile>>;
    /// Non-deleted profiles registered within the last `days`.
    async fn list_new_users(&self, days: u64) -> Result<Vec<StaticProfile>>;
    /// Non-deleted profiles with a completeness score of 100.
    async fn list_complete_profiles(&self) -> Result<Vec<StaticProfile>>;
    async fn count_registered_since(&self, since_ms: u64) -> Result<u64>;
}

#[cfg(test)]
#[path = "statics_tests.rs"]
mod tests;
