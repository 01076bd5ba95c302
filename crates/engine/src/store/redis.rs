// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production [`Store`] over a pooled Redis connection.
//!
//! Every operation maps to one command (or one script invocation) and is
//! bounded by the per-operation deadline. The reap batch runs as a Lua
//! script so the counter and the expiry index move in a single atomic step.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{cmd, RedisError};
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};

use crate::error::{EngineError, Result};

use super::{ReapBatch, ReapRequest, Store};

/// Atomic reconciliation step (normative script contract).
///
/// KEYS: expiry index, counter. ARGV: now-ms, batch-size, primary prefix.
/// Fetches up to batch-size members with score ≤ now, collects those whose
/// primary key is gone, decrements the counter by that many (floored at
/// zero), removes every fetched candidate from the index, and returns
/// `{expired_members, candidate_count, remaining_le_now}`.
const REAP_SCRIPT: &str = r#"
local candidates = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
if #candidates == 0 then
  return {{}, 0, 0}
end
local expired = {}
for i = 1, #candidates do
  if redis.call('EXISTS', ARGV[3] .. candidates[i]) == 0 then
    expired[#expired + 1] = candidates[i]
  end
end
if #expired > 0 then
  local left = redis.call('DECRBY', KEYS[2], #expired)
  if left < 0 then
    redis.call('SET', KEYS[2], 0)
  end
end
redis.call('ZREM', KEYS[1], unpack(candidates))
local remaining = redis.call('ZCOUNT', KEYS[1], '-inf', ARGV[1])
return {expired, #candidates, remaining}
"#;

/// Token-checked lease release. KEYS: lease. ARGV: token.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Pooled Redis store.
pub struct RedisStore {
    pool: Pool,
    op_timeout: Duration,
}

impl RedisStore {
    /// Build a pool from a `redis://` URL. The pool connects lazily; the
    /// first operation surfaces connectivity errors.
    pub fn connect(url: &str, op_timeout: Duration) -> Result<Self> {
        let pool = PoolConfig::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| EngineError::fatal(format!("store pool init: {e}")))?;
        Ok(Self { pool, op_timeout })
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| EngineError::from_store_message(format!("store pool: {e}")))
    }

    /// Bound one logical operation by the per-op deadline.
    async fn bounded<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::transient("store operation timed out")),
        }
    }
}

/// Map a client error onto the engine's transient/fatal split.
fn classify(err: RedisError) -> EngineError {
    use deadpool_redis::redis::ErrorKind as RedisKind;

    let retriable = err.is_io_error()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || matches!(
            err.kind(),
            RedisKind::BusyLoadingError
                | RedisKind::TryAgain
                | RedisKind::ClusterDown
                | RedisKind::MasterDown
        );

    if retriable {
        EngineError::transient(format!("store: {err}"))
    } else {
        EngineError::fatal(format!("store: {err}"))
    }
}

/// Format a score bound the way range commands expect it.
fn fmt_score(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_owned()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_owned()
    } else {
        score.to_string()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let mut command = cmd("SET");
            command.arg(key).arg(value);
            if let Some(ttl) = ttl {
                command.arg("PX").arg(ttl.as_millis() as u64);
            }
            command.query_async::<()>(&mut conn).await.map_err(classify)
        })
        .await
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("GET").arg(key).query_async(&mut conn).await.map_err(classify)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let removed: i64 = cmd("DEL").arg(key).query_async(&mut conn).await.map_err(classify)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("EXISTS").arg(key).query_async(&mut conn).await.map_err(classify)
        })
        .await
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let ms: i64 = cmd("PTTL").arg(key).query_async(&mut conn).await.map_err(classify)?;
            if ms >= 0 {
                Ok(Some(Duration::from_millis(ms as u64)))
            } else {
                Ok(None)
            }
        })
        .await
    }

    async fn extend_ttl(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("PEXPIRE")
                .arg(key)
                .arg(ttl.as_millis() as u64)
                .query_async(&mut conn)
                .await
                .map_err(classify)
        })
        .await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("ZADD")
                .arg(key)
                .arg(score)
                .arg(member)
                .query_async::<()>(&mut conn)
                .await
                .map_err(classify)
        })
        .await
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("ZREM").arg(key).arg(members).query_async(&mut conn).await.map_err(classify)
        })
        .await
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("ZSCORE").arg(key).arg(member).query_async(&mut conn).await.map_err(classify)
        })
        .await
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("ZRANGEBYSCORE")
                .arg(key)
                .arg(fmt_score(min))
                .arg(fmt_score(max))
                .query_async(&mut conn)
                .await
                .map_err(classify)
        })
        .await
    }

    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: f64,
        min: f64,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<String>> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let count: i64 = limit.map(|l| l as i64).unwrap_or(-1);
            cmd("ZREVRANGEBYSCORE")
                .arg(key)
                .arg(fmt_score(max))
                .arg(fmt_score(min))
                .arg("LIMIT")
                .arg(offset as i64)
                .arg(count)
                .query_async(&mut conn)
                .await
                .map_err(classify)
        })
        .await
    }

    async fn zrevrange_with_scores(
        &self,
        key: &str,
        max: f64,
        min: f64,
    ) -> Result<Vec<(String, f64)>> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("ZREVRANGEBYSCORE")
                .arg(key)
                .arg(fmt_score(max))
                .arg(fmt_score(min))
                .arg("WITHSCORES")
                .query_async(&mut conn)
                .await
                .map_err(classify)
        })
        .await
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("ZCOUNT")
                .arg(key)
                .arg(fmt_score(min))
                .arg(fmt_score(max))
                .query_async(&mut conn)
                .await
                .map_err(classify)
        })
        .await
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("ZREMRANGEBYSCORE")
                .arg(key)
                .arg(fmt_score(min))
                .arg(fmt_score(max))
                .query_async(&mut conn)
                .await
                .map_err(classify)
        })
        .await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let added: i64 =
                cmd("SADD").arg(key).arg(member).query_async(&mut conn).await.map_err(classify)?;
            Ok(added > 0)
        })
        .await
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let removed: i64 =
                cmd("SREM").arg(key).arg(member).query_async(&mut conn).await.map_err(classify)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("SMEMBERS").arg(key).query_async(&mut conn).await.map_err(classify)
        })
        .await
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("SCARD").arg(key).query_async(&mut conn).await.map_err(classify)
        })
        .await
    }

    async fn sclear(&self, key: &str) -> Result<()> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("DEL").arg(key).query_async::<()>(&mut conn).await.map_err(classify)
        })
        .await
    }

    async fn counter_add(&self, key: &str, delta: i64) -> Result<i64> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("INCRBY").arg(key).arg(delta).query_async(&mut conn).await.map_err(classify)
        })
        .await
    }

    async fn counter_get(&self, key: &str) -> Result<i64> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let value: Option<i64> =
                cmd("GET").arg(key).query_async(&mut conn).await.map_err(classify)?;
            Ok(value.unwrap_or(0))
        })
        .await
    }

    async fn counter_set(&self, key: &str, value: i64) -> Result<()> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            cmd("SET").arg(key).arg(value).query_async::<()>(&mut conn).await.map_err(classify)
        })
        .await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        // Cursor scan; bounded as one logical operation.
        self.bounded(async {
            let mut conn = self.conn().await?;
            let pattern = format!("{prefix}*");
            let mut cursor: u64 = 0;
            let mut keys = Vec::new();
            loop {
                let (next, chunk): (u64, Vec<String>) = cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(512)
                    .query_async(&mut conn)
                    .await
                    .map_err(classify)?;
                keys.extend(chunk);
                cursor = next;
                if cursor == 0 {
                    break;
                }
            }
            Ok(keys)
        })
        .await
    }

    async fn lease_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let set: Option<String> = cmd("SET")
                .arg(key)
                .arg(token)
                .arg("PX")
                .arg(ttl.as_millis() as u64)
                .arg("NX")
                .query_async(&mut conn)
                .await
                .map_err(classify)?;
            Ok(set.is_some())
        })
        .await
    }

    async fn lease_release(&self, key: &str, token: &str) -> Result<bool> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let released: i64 = cmd("EVAL")
                .arg(RELEASE_SCRIPT)
                .arg(1)
                .arg(key)
                .arg(token)
                .query_async(&mut conn)
                .await
                .map_err(classify)?;
            Ok(released > 0)
        })
        .await
    }

    async fn reap_batch(&self, req: ReapRequest) -> Result<ReapBatch> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let (expired_members, candidates, remaining): (Vec<String>, u64, u64) = cmd("EVAL")
                .arg(REAP_SCRIPT)
                .arg(2)
                .arg(&req.expiry_index)
                .arg(&req.counter)
                .arg(req.now_ms)
                .arg(req.batch_size)
                .arg(&req.primary_prefix)
                .query_async(&mut conn)
                .await
                .map_err(classify)?;
            Ok(ReapBatch { expired_members, candidates, remaining })
        })
        .await
    }
}

#[cfg(test)]
#[path = "redis_tests.rs"]
mod tests;
