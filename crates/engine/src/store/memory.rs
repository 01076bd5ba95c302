// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process [`Store`] implementation.
//!
//! Backs tests and `memory:` store URLs. One mutex guards all structures, so
//! every operation — including the reap batch — is trivially atomic. Key
//! expirations are evaluated lazily against the wall clock on each access,
//! mirroring a store that physically evicts at or before the expiry instant.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;

use super::{epoch_ms, ReapBatch, ReapRequest, Store};

#[derive(Default)]
struct Inner {
    payloads: HashMap<String, Vec<u8>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    sets: HashMap<String, HashSet<String>>,
    counters: HashMap<String, i64>,
    /// Absolute expiry ms per key, across all structures.
    expirations: HashMap<String, u64>,
}

impl Inner {
    fn purge(&mut self, now_ms: u64) {
        let dead: Vec<String> = self
            .expirations
            .iter()
            .filter(|(_, &at)| at <= now_ms)
            .map(|(k, _)| k.clone())
            .collect();
        for key in dead {
            self.expirations.remove(&key);
            self.payloads.remove(&key);
            self.zsets.remove(&key);
            self.sets.remove(&key);
            self.counters.remove(&key);
        }
    }

    fn set_ttl(&mut self, key: &str, ttl: Option<Duration>, now_ms: u64) {
        match ttl {
            Some(ttl) => {
                self.expirations.insert(key.to_owned(), now_ms + ttl.as_millis() as u64);
            }
            None => {
                self.expirations.remove(key);
            }
        }
    }
}

/// Single-mutex in-process store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> (parking_lot::MutexGuard<'_, Inner>, u64) {
        let now = epoch_ms();
        let mut inner = self.inner.lock();
        inner.purge(now);
        (inner, now)
    }
}

/// Descending by score, ties broken by member descending (store convention).
fn sort_desc(entries: &mut [(String, f64)]) {
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| b.0.cmp(&a.0))
    });
}

/// Ascending by score, ties broken by member ascending.
fn sort_asc(entries: &mut [(String, f64)]) {
    entries.sort_by(|a, b| {
        a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0))
    });
}

fn in_range(score: f64, min: f64, max: f64) -> bool {
    score >= min && score <= max
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let (mut inner, now) = self.locked();
        inner.payloads.insert(key.to_owned(), value.to_vec());
        inner.set_ttl(key, ttl, now);
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let (inner, _) = self.locked();
        Ok(inner.payloads.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let (mut inner, _) = self.locked();
        inner.expirations.remove(key);
        Ok(inner.payloads.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let (inner, _) = self.locked();
        Ok(inner.payloads.contains_key(key))
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        let (inner, now) = self.locked();
        let present = inner.payloads.contains_key(key)
            || inner.zsets.contains_key(key)
            || inner.sets.contains_key(key)
            || inner.counters.contains_key(key);
        if !present {
            return Ok(None);
        }
        Ok(inner.expirations.get(key).map(|&at| Duration::from_millis(at.saturating_sub(now))))
    }

    async fn extend_ttl(&self, key: &str, ttl: Duration) -> Result<bool> {
        let (mut inner, now) = self.locked();
        let present = inner.payloads.contains_key(key)
            || inner.zsets.contains_key(key)
            || inner.sets.contains_key(key)
            || inner.counters.contains_key(key);
        if present {
            inner.set_ttl(key, Some(ttl), now);
        }
        Ok(present)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let (mut inner, _) = self.locked();
        inner.zsets.entry(key.to_owned()).or_default().insert(member.to_owned(), score);
        Ok(())
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<u64> {
        let (mut inner, _) = self.locked();
        let Some(zset) = inner.zsets.get_mut(key) else {
            return Ok(0);
        };
        Ok(members.iter().filter(|m| zset.remove(m.as_str()).is_some()).count() as u64)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let (inner, _) = self.locked();
        Ok(inner.zsets.get(key).and_then(|z| z.get(member).copied()))
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let (inner, _) = self.locked();
        let mut entries: Vec<(String, f64)> = inner
            .zsets
            .get(key)
            .map(|z| {
                z.iter()
                    .filter(|(_, &s)| in_range(s, min, max))
                    .map(|(m, &s)| (m.clone(), s))
                    .collect()
            })
            .unwrap_or_default();
        sort_asc(&mut entries);
        Ok(entries.into_iter().map(|(m, _)| m).collect())
    }

    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: f64,
        min: f64,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<String>> {
        let entries = self.zrevrange_with_scores(key, max, min).await?;
        let limit = limit.unwrap_or(usize::MAX);
        Ok(entries.into_iter().skip(offset).take(limit).map(|(m, _)| m).collect())
    }

    async fn zrevrange_with_scores(
        &self,
        key: &str,
        max: f64,
        min: f64,
    ) -> Result<Vec<(String, f64)>> {
        let (inner, _) = self.locked();
        let mut entries: Vec<(String, f64)> = inner
            .zsets
            .get(key)
            .map(|z| {
                z.iter()
                    .filter(|(_, &s)| in_range(s, min, max))
                    .map(|(m, &s)| (m.clone(), s))
                    .collect()
            })
            .unwrap_or_default();
        sort_desc(&mut entries);
        Ok(entries)
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        let (inner, _) = self.locked();
        Ok(inner
            .zsets
            .get(key)
            .map(|z| z.values().filter(|&&s| in_range(s, min, max)).count() as u64)
            .unwrap_or(0))
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        let (mut inner, _) = self.locked();
        let Some(zset) = inner.zsets.get_mut(key) else {
            return Ok(0);
        };
        let before = zset.len();
        zset.retain(|_, &mut s| !in_range(s, min, max));
        Ok((before - zset.len()) as u64)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let (mut inner, _) = self.locked();
        Ok(inner.sets.entry(key.to_owned()).or_default().insert(member.to_owned()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let (mut inner, _) = self.locked();
        Ok(inner.sets.get_mut(key).map(|s| s.remove(member)).unwrap_or(false))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let (inner, _) = self.locked();
        Ok(inner.sets.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        let (inner, _) = self.locked();
        Ok(inner.sets.get(key).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn sclear(&self, key: &str) -> Result<()> {
        let (mut inner, _) = self.locked();
        inner.sets.remove(key);
        inner.expirations.remove(key);
        Ok(())
    }

    async fn counter_add(&self, key: &str, delta: i64) -> Result<i64> {
        let (mut inner, _) = self.locked();
        let value = inner.counters.entry(key.to_owned()).or_insert(0);
        *value += delta;
        Ok(*value)
    }

    async fn counter_get(&self, key: &str) -> Result<i64> {
        let (inner, _) = self.locked();
        Ok(inner.counters.get(key).copied().unwrap_or(0))
    }

    async fn counter_set(&self, key: &str, value: i64) -> Result<()> {
        let (mut inner, _) = self.locked();
        inner.counters.insert(key.to_owned(), value);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let (inner, _) = self.locked();
        Ok(inner.payloads.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    async fn lease_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let (mut inner, now) = self.locked();
        if inner.payloads.contains_key(key) {
            return Ok(false);
        }
        inner.payloads.insert(key.to_owned(), token.as_bytes().to_vec());
        inner.set_ttl(key, Some(ttl), now);
        Ok(true)
    }

    async fn lease_release(&self, key: &str, token: &str) -> Result<bool> {
        let (mut inner, _) = self.locked();
        let held = inner.payloads.get(key).map(|v| v == token.as_bytes()).unwrap_or(false);
        if held {
            inner.payloads.remove(key);
            inner.expirations.remove(key);
        }
        Ok(held)
    }

    async fn reap_batch(&self, req: ReapRequest) -> Result<ReapBatch> {
        let (mut inner, _) = self.locked();

        let mut candidates: Vec<(String, f64)> = inner
            .zsets
            .get(&req.expiry_index)
            .map(|z| {
                z.iter()
                    .filter(|(_, &s)| s <= req.now_ms as f64)
                    .map(|(m, &s)| (m.clone(), s))
                    .collect()
            })
            .unwrap_or_default();
        sort_asc(&mut candidates);
        candidates.truncate(req.batch_size);

        if candidates.is_empty() {
            return Ok(ReapBatch::default());
        }

        let expired_members: Vec<String> = candidates
            .iter()
            .filter(|(m, _)| !inner.payloads.contains_key(&format!("{}{m}", req.primary_prefix)))
            .map(|(m, _)| m.clone())
            .collect();

        if !expired_members.is_empty() {
            let value = inner.counters.entry(req.counter.clone()).or_insert(0);
            *value -= expired_members.len() as i64;
            if *value < 0 {
                *value = 0;
            }
        }

        if let Some(zset) = inner.zsets.get_mut(&req.expiry_index) {
            for (member, _) in &candidates {
                zset.remove(member);
            }
        }

        let remaining = inner
            .zsets
            .get(&req.expiry_index)
            .map(|z| z.values().filter(|&&s| s <= req.now_ms as f64).count() as u64)
            .unwrap_or(0);

        Ok(ReapBatch { expired_members, candidates: candidates.len() as u64, remaining })
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
