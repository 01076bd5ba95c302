// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test fixtures: in-memory collaborator implementations and a
//! fault-injecting store wrapper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::archive::{ArchiveStore, DocumentStatus, ProfileDocument};
use crate::aggregator::Snapshot;
use crate::config::EngineSettings;
use crate::device::DeviceClass;
use crate::error::{EngineError, Result};
use crate::profiles::ProfileStore;
use crate::statics::{Gender, StaticProfile, StaticProfilePatch, StaticProfileStore};
use crate::store::{epoch_ms, Keys, MemoryStore, ReapBatch, ReapRequest, Store};

/// Default settings under the `test` namespace.
pub fn test_settings() -> EngineSettings {
    EngineSettings { namespace: "test".to_owned(), ..EngineSettings::default() }
}

/// A profile store over a fresh in-memory backing store.
pub fn memory_profiles(settings: EngineSettings) -> (Arc<MemoryStore>, Arc<ProfileStore>) {
    let store = Arc::new(MemoryStore::new());
    let keys = Keys::new(&settings.namespace);
    let profiles =
        Arc::new(ProfileStore::new(Arc::clone(&store) as Arc<dyn Store>, keys, settings));
    (store, profiles)
}

// -- Fault-injecting store -----------------------------------------------------

/// Store wrapper that fails reads or writes with transient errors on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn read_gate(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(EngineError::transient("injected read failure: connection reset"));
        }
        Ok(())
    }

    fn write_gate(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::transient("injected write failure: connection reset"));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.write_gate()?;
        self.inner.put(key, value, ttl).await
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read_gate()?;
        self.inner.fetch(key).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.write_gate()?;
        self.inner.remove(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.read_gate()?;
        self.inner.exists(key).await
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        self.read_gate()?;
        self.inner.ttl_remaining(key).await
    }

    async fn extend_ttl(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.write_gate()?;
        self.inner.extend_ttl(key, ttl).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.write_gate()?;
        self.inner.zadd(key, member, score).await
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<u64> {
        self.write_gate()?;
        self.inner.zrem(key, members).await
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.read_gate()?;
        self.inner.zscore(key, member).await
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        self.read_gate()?;
        self.inner.zrange_by_score(key, min, max).await
    }

    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: f64,
        min: f64,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<String>> {
        self.read_gate()?;
        self.inner.zrevrange_by_score(key, max, min, offset, limit).await
    }

    async fn zrevrange_with_scores(
        &self,
        key: &str,
        max: f64,
        min: f64,
    ) -> Result<Vec<(String, f64)>> {
        self.read_gate()?;
        self.inner.zrevrange_with_scores(key, max, min).await
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        self.read_gate()?;
        self.inner.zcount(key, min, max).await
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        self.write_gate()?;
        self.inner.zrem_range_by_score(key, min, max).await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.write_gate()?;
        self.inner.sadd(key, member).await
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        self.write_gate()?;
        self.inner.srem(key, member).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.read_gate()?;
        self.inner.smembers(key).await
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        self.read_gate()?;
        self.inner.scard(key).await
    }

    async fn sclear(&self, key: &str) -> Result<()> {
        self.write_gate()?;
        self.inner.sclear(key).await
    }

    async fn counter_add(&self, key: &str, delta: i64) -> Result<i64> {
        self.write_gate()?;
        self.inner.counter_add(key, delta).await
    }

    async fn counter_get(&self, key: &str) -> Result<i64> {
        self.read_gate()?;
        self.inner.counter_get(key).await
    }

    async fn counter_set(&self, key: &str, value: i64) -> Result<()> {
        self.write_gate()?;
        self.inner.counter_set(key, value).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.read_gate()?;
        self.inner.scan_prefix(prefix).await
    }

    async fn lease_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.write_gate()?;
        self.inner.lease_acquire(key, token, ttl).await
    }

    async fn lease_release(&self, key: &str, token: &str) -> Result<bool> {
        self.inner.lease_release(key, token).await
    }

    async fn reap_batch(&self, req: ReapRequest) -> Result<ReapBatch> {
        self.write_gate()?;
        self.inner.reap_batch(req).await
    }
}

// -- In-memory static profile collaborator -------------------------------------

/// In-memory [`StaticProfileStore`] with a failure toggle.
#[derive(Default)]
pub struct MemoryStatics {
    rows: RwLock<HashMap<String, StaticProfile>>,
    failing: AtomicBool,
}

impl MemoryStatics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(profile: StaticProfile) -> Self {
        let statics = Self::default();
        statics.rows.write().insert(profile.user_id.clone(), profile);
        statics
    }

    /// Make every operation fail with a transient error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn gate(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::transient("injected static-store failure: timeout"));
        }
        Ok(())
    }

    fn live_by<F>(&self, pred: F) -> Vec<StaticProfile>
    where
        F: Fn(&StaticProfile) -> bool,
    {
        let mut out: Vec<StaticProfile> =
            self.rows.read().values().filter(|p| !p.is_deleted && pred(p)).cloned().collect();
        out.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        out
    }

    fn uniqueness_check(&self, profile: &StaticProfile) -> Result<()> {
        let rows = self.rows.read();
        for other in rows.values() {
            if other.user_id == profile.user_id || other.is_deleted {
                continue;
            }
            if profile.email.is_some() && other.email == profile.email {
                return Err(EngineError::conflict("email already registered"));
            }
            if profile.phone_number.is_some() && other.phone_number == profile.phone_number {
                return Err(EngineError::conflict("phone number already registered"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StaticProfileStore for MemoryStatics {
    async fn get_by_id(&self, user_id: &str) -> Result<Option<StaticProfile>> {
        self.gate()?;
        Ok(self.rows.read().get(user_id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<StaticProfile>> {
        self.gate()?;
        Ok(self.live_by(|p| p.email.as_deref() == Some(email)).into_iter().next())
    }

    async fn get_by_phone(&self, phone: &str) -> Result<Option<StaticProfile>> {
        self.gate()?;
        Ok(self.live_by(|p| p.phone_number.as_deref() == Some(phone)).into_iter().next())
    }

    async fn exists_email(&self, email: &str) -> Result<bool> {
        Ok(self.get_by_email(email).await?.is_some())
    }

    async fn exists_phone(&self, phone: &str) -> Result<bool> {
        Ok(self.get_by_phone(phone).await?.is_some())
    }

    async fn create(&self, profile: StaticProfile) -> Result<StaticProfile> {
        self.gate()?;
        if profile.user_id.is_empty() {
            return Err(EngineError::invalid("user id must not be empty"));
        }
        self.uniqueness_check(&profile)?;
        self.rows.write().insert(profile.user_id.clone(), profile.clone());
        Ok(profile)
    }

    async fn update(&self, mut profile: StaticProfile) -> Result<StaticProfile> {
        self.gate()?;
        self.uniqueness_check(&profile)?;
        let mut rows = self.rows.write();
        let Some(existing) = rows.get(&profile.user_id) else {
            return Err(EngineError::not_found("no such static profile"));
        };
        if existing.version != profile.version {
            return Err(EngineError::conflict(format!(
                "version mismatch: expected {}, found {}",
                profile.version, existing.version
            )));
        }
        profile.version += 1;
        rows.insert(profile.user_id.clone(), profile.clone());
        Ok(profile)
    }

    async fn partial_update(
        &self,
        user_id: &str,
        patch: StaticProfilePatch,
    ) -> Result<StaticProfile> {
        self.gate()?;
        let mut rows = self.rows.write();
        let Some(profile) = rows.get_mut(user_id) else {
            return Err(EngineError::not_found("no such static profile"));
        };
        if patch.gender.is_some() {
            profile.gender = patch.gender;
        }
        if patch.age_group.is_some() {
            profile.age_group = patch.age_group;
        }
        if patch.real_name.is_some() {
            profile.real_name = patch.real_name;
        }
        if patch.email.is_some() {
            profile.email = patch.email;
        }
        if patch.phone_number.is_some() {
            profile.phone_number = patch.phone_number;
        }
        if patch.city.is_some() {
            profile.city = patch.city;
        }
        if patch.source_channel.is_some() {
            profile.source_channel = patch.source_channel;
        }
        profile.version += 1;
        Ok(profile.clone())
    }

    async fn soft_delete(&self, user_id: &str) -> Result<bool> {
        self.gate()?;
        let mut rows = self.rows.write();
        match rows.get_mut(user_id) {
            Some(profile) if !profile.is_deleted => {
                profile.is_deleted = true;
                profile.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restore(&self, user_id: &str) -> Result<bool> {
        self.gate()?;
        let mut rows = self.rows.write();
        match rows.get_mut(user_id) {
            Some(profile) if profile.is_deleted => {
                profile.is_deleted = false;
                profile.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_source_channel(&self, channel: &str) -> Result<Vec<StaticProfile>> {
        self.gate()?;
        Ok(self.live_by(|p| p.source_channel.as_deref() == Some(channel)))
    }

    async fn list_by_city(&self, city: &str) -> Result<Vec<StaticProfile>> {
        self.gate()?;
        Ok(self.live_by(|p| p.city.as_deref() == Some(city)))
    }

    async fn list_by_gender(&self, gender: Gender) -> Result<Vec<StaticProfile>> {
        self.gate()?;
        Ok(self.live_by(|p| p.gender == Some(gender)))
    }

    async fn list_new_users(&self, days: u64) -> Result<Vec<StaticProfile>> {
        self.gate()?;
        let cutoff = epoch_ms().saturating_sub(days.saturating_mul(86_400_000));
        Ok(self.live_by(|p| p.registration_date >= cutoff))
    }

    async fn list_complete_profiles(&self) -> Result<Vec<StaticProfile>> {
        self.gate()?;
        Ok(self.live_by(|p| p.completeness_score() == 100))
    }

    async fn count_registered_since(&self, since_ms: u64) -> Result<u64> {
        self.gate()?;
        Ok(self.live_by(|p| p.registration_date >= since_ms).len() as u64)
    }
}

// -- In-memory cold-tier archive -----------------------------------------------

/// In-memory [`ArchiveStore`].
#[derive(Default)]
pub struct MemoryArchive {
    docs: RwLock<HashMap<String, ProfileDocument>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    fn active_by<F>(&self, pred: F) -> Vec<ProfileDocument>
    where
        F: Fn(&ProfileDocument) -> bool,
    {
        let mut out: Vec<ProfileDocument> = self
            .docs
            .read()
            .values()
            .filter(|d| d.status == DocumentStatus::Active && pred(d))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        out
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchive {
    async fn upsert_document(&self, snapshot: &Snapshot) -> Result<ProfileDocument> {
        let mut docs = self.docs.write();
        let doc = match docs.get_mut(&snapshot.user_id) {
            Some(doc) => {
                doc.absorb(snapshot);
                doc.clone()
            }
            None => {
                let doc = ProfileDocument::from_snapshot(snapshot);
                docs.insert(snapshot.user_id.clone(), doc.clone());
                doc
            }
        };
        Ok(doc)
    }

    async fn get_active(&self, user_id: &str) -> Result<Option<ProfileDocument>> {
        Ok(self
            .docs
            .read()
            .get(user_id)
            .filter(|d| d.status == DocumentStatus::Active)
            .cloned())
    }

    async fn mark_deleted(&self, user_id: &str) -> Result<bool> {
        let mut docs = self.docs.write();
        match docs.get_mut(user_id) {
            Some(doc) => {
                doc.status = DocumentStatus::Deleted;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_city(&self, city: &str) -> Result<Vec<ProfileDocument>> {
        Ok(self.active_by(|d| {
            d.static_profile.as_ref().and_then(|s| s.city.as_deref()) == Some(city)
        }))
    }

    async fn find_by_device_class(&self, class: DeviceClass) -> Result<Vec<ProfileDocument>> {
        Ok(self.active_by(|d| {
            d.dynamic_profile
                .as_ref()
                .map(|p| p.recent_devices.contains(&class) || p.main_device == Some(class))
                .unwrap_or(false)
        }))
    }

    async fn find_by_interest(&self, interest: &str) -> Result<Vec<ProfileDocument>> {
        Ok(self.active_by(|d| {
            d.extended_properties
                .get("interests")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().any(|v| v.as_str() == Some(interest)))
                .unwrap_or(false)
        }))
    }

    async fn find_by_industry(&self, industry: &str) -> Result<Vec<ProfileDocument>> {
        Ok(self.active_by(|d| {
            d.extended_properties.get("industry").and_then(|v| v.as_str()) == Some(industry)
        }))
    }

    async fn find_high_value_active(
        &self,
        min_score: u8,
        since_ms: u64,
    ) -> Result<Vec<ProfileDocument>> {
        Ok(self.active_by(|d| {
            d.value_score >= min_score
                && d.dynamic_profile
                    .as_ref()
                    .map(|p| p.last_active_at >= since_ms)
                    .unwrap_or(false)
        }))
    }

    async fn count_active(&self) -> Result<u64> {
        Ok(self.active_by(|_| true).len() as u64)
    }

    async fn count_active_since(&self, since_ms: u64) -> Result<u64> {
        Ok(self.active_by(|d| d.updated_at >= since_ms).len() as u64)
    }

    async fn add_tag(&self, user_id: &str, tag: &str) -> Result<bool> {
        let mut docs = self.docs.write();
        match docs.get_mut(user_id) {
            Some(doc) => Ok(doc.tags.insert(tag.to_owned())),
            None => Ok(false),
        }
    }

    async fn find_by_tag(&self, tag: &str) -> Result<Vec<ProfileDocument>> {
        Ok(self.active_by(|d| d.tags.contains(tag)))
    }
}
