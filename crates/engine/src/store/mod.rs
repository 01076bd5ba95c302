// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hot-tier store abstraction.
//!
//! The engine, the index maintainer, and the reaper are written against the
//! semantic operations of the backing store — TTL'd payloads, ordered-by-score
//! sets, plain sets, an atomic integer, a lease, and one atomic reap step —
//! never against a concrete client. Two implementations ship: [`RedisStore`]
//! for production and [`MemoryStore`] for tests and `memory:` URLs.

pub mod keys;
pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use keys::Keys;
pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Inputs for one atomic reap batch.
#[derive(Debug, Clone)]
pub struct ReapRequest {
    /// Key of the expiry index (ordered set scored by absolute expiry ms).
    pub expiry_index: String,
    /// Key of the total-user counter.
    pub counter: String,
    /// Prefix prepended to a member to form its primary key.
    pub primary_prefix: String,
    /// Candidates are members with score ≤ this instant.
    pub now_ms: u64,
    /// Maximum candidates fetched per batch.
    pub batch_size: usize,
}

/// Result of one atomic reap batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReapBatch {
    /// Members whose primary record was gone; the counter was decremented by
    /// this many and they were removed from the expiry index.
    pub expired_members: Vec<String>,
    /// Members fetched with score ≤ now (all removed from the expiry index).
    pub candidates: u64,
    /// Members still scoring ≤ now after the batch. Drives iteration.
    pub remaining: u64,
}

/// Semantic operations required of the backing store.
///
/// Implementations must make each operation individually atomic; callers get
/// no cross-operation transactions except [`Store::reap_batch`].
#[async_trait]
pub trait Store: Send + Sync {
    // -- Keyed payloads with per-key TTL --------------------------------------

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Returns whether the key existed.
    async fn remove(&self, key: &str) -> Result<bool>;
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Remaining TTL, `None` when the key is absent or has no expiry.
    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>>;
    /// Returns whether the key existed and its expiry was updated.
    async fn extend_ttl(&self, key: &str, ttl: Duration) -> Result<bool>;

    // -- Ordered-by-score sets ------------------------------------------------

    /// Add or re-score a member. Idempotent: a later add overwrites the score.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;
    async fn zrem(&self, key: &str, members: &[String]) -> Result<u64>;
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>>;
    /// Members with `min ≤ score ≤ max`, ascending.
    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>>;
    /// Members with `min ≤ score ≤ max`, descending, with offset/limit
    /// relative to that ordering. `limit = None` means unbounded.
    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: f64,
        min: f64,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<String>>;
    /// Descending members paired with their scores.
    async fn zrevrange_with_scores(&self, key: &str, max: f64, min: f64)
        -> Result<Vec<(String, f64)>>;
    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<u64>;
    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64>;

    // -- Plain sets -----------------------------------------------------------

    /// Returns whether the member was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;
    /// Returns whether the member was present.
    async fn srem(&self, key: &str, member: &str) -> Result<bool>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;
    async fn scard(&self, key: &str) -> Result<u64>;
    async fn sclear(&self, key: &str) -> Result<()>;

    // -- Atomic integer -------------------------------------------------------

    /// Add `delta` (may be negative) and return the new value.
    async fn counter_add(&self, key: &str, delta: i64) -> Result<i64>;
    async fn counter_get(&self, key: &str) -> Result<i64>;
    async fn counter_set(&self, key: &str, value: i64) -> Result<()>;

    // -- Cursor scan ----------------------------------------------------------

    /// All payload keys under `prefix`, via a non-blocking cursor scan.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    // -- Lease ----------------------------------------------------------------

    /// Non-blocking set-if-absent with TTL. True when the lease was taken.
    async fn lease_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;
    /// Token-checked delete. True when this token held the lease.
    async fn lease_release(&self, key: &str, token: &str) -> Result<bool>;

    // -- Atomic reap step -----------------------------------------------------

    /// One server-side atomic reconciliation batch: fetch candidates from the
    /// expiry index with score ≤ now, detect members whose primary is gone,
    /// decrement the counter by that many (floored at zero), and drop every
    /// fetched candidate from the expiry index. No observer may see the
    /// counter and the expiry index out of sync within the batch.
    async fn reap_batch(&self, req: ReapRequest) -> Result<ReapBatch>;
}
