// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::store::{ReapRequest, Store};

use super::MemoryStore;

#[tokio::test]
async fn payload_expires_after_ttl() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.put("k", b"v", Some(Duration::from_millis(40))).await?;
    assert!(store.exists("k").await?);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!store.exists("k").await?);
    assert_eq!(store.fetch("k").await?, None);
    Ok(())
}

#[tokio::test]
async fn put_without_ttl_clears_previous_expiry() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.put("k", b"v1", Some(Duration::from_millis(40))).await?;
    store.put("k", b"v2", None).await?;

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(store.fetch("k").await?, Some(b"v2".to_vec()));
    Ok(())
}

#[tokio::test]
async fn zrevrange_orders_and_paginates() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    for (member, score) in [("a", 1.0), ("b", 5.0), ("c", 3.0), ("d", 4.0)] {
        store.zadd("z", member, score).await?;
    }

    let all = store.zrevrange_by_score("z", f64::INFINITY, 2.0, 0, None).await?;
    assert_eq!(all, vec!["b", "d", "c"]);

    let page = store.zrevrange_by_score("z", f64::INFINITY, 2.0, 1, Some(1)).await?;
    assert_eq!(page, vec!["d"]);

    let asc = store.zrange_by_score("z", 2.0, 4.0).await?;
    assert_eq!(asc, vec!["c", "d"]);

    assert_eq!(store.zcount("z", f64::NEG_INFINITY, 3.0).await?, 2);
    Ok(())
}

#[tokio::test]
async fn zadd_rescore_overwrites() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.zadd("z", "a", 1.0).await?;
    store.zadd("z", "a", 9.0).await?;
    assert_eq!(store.zscore("z", "a").await?, Some(9.0));
    Ok(())
}

#[tokio::test]
async fn set_and_counter_basics() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    assert!(store.sadd("s", "m").await?);
    assert!(!store.sadd("s", "m").await?);
    assert_eq!(store.scard("s").await?, 1);
    assert!(store.srem("s", "m").await?);
    assert!(!store.srem("s", "m").await?);

    assert_eq!(store.counter_add("c", 3).await?, 3);
    assert_eq!(store.counter_add("c", -1).await?, 2);
    assert_eq!(store.counter_get("c").await?, 2);
    store.counter_set("c", 0).await?;
    assert_eq!(store.counter_get("c").await?, 0);
    Ok(())
}

#[tokio::test]
async fn lease_is_exclusive_and_token_checked() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    assert!(store.lease_acquire("lease", "t1", Duration::from_secs(5)).await?);
    assert!(!store.lease_acquire("lease", "t2", Duration::from_secs(5)).await?);

    // Wrong token cannot release.
    assert!(!store.lease_release("lease", "t2").await?);
    assert!(store.lease_release("lease", "t1").await?);
    assert!(store.lease_acquire("lease", "t2", Duration::from_secs(5)).await?);
    Ok(())
}

#[tokio::test]
async fn lease_expires() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    assert!(store.lease_acquire("lease", "t1", Duration::from_millis(40)).await?);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(store.lease_acquire("lease", "t2", Duration::from_secs(5)).await?);
    Ok(())
}

fn reap_request(now_ms: u64, batch_size: usize) -> ReapRequest {
    ReapRequest {
        expiry_index: "idx:expiry".into(),
        counter: "count".into(),
        primary_prefix: "profile:".into(),
        now_ms,
        batch_size,
    }
}

#[tokio::test]
async fn reap_batch_on_empty_index_is_noop() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let batch = store.reap_batch(reap_request(1_000, 10)).await?;
    assert!(batch.expired_members.is_empty());
    assert_eq!(batch.candidates, 0);
    assert_eq!(batch.remaining, 0);
    Ok(())
}

#[tokio::test]
async fn reap_batch_reconciles_counter_and_index() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.counter_set("count", 3).await?;
    // U1 and U2 expired (no primary); U3's primary is still live with a
    // stale index score.
    store.zadd("idx:expiry", "U1", 100.0).await?;
    store.zadd("idx:expiry", "U2", 200.0).await?;
    store.zadd("idx:expiry", "U3", 300.0).await?;
    store.put("profile:U3", b"{}", None).await?;

    let batch = store.reap_batch(reap_request(1_000, 10)).await?;
    let mut expired = batch.expired_members.clone();
    expired.sort();
    assert_eq!(expired, vec!["U1", "U2"]);
    assert_eq!(batch.candidates, 3);
    assert_eq!(batch.remaining, 0);

    assert_eq!(store.counter_get("count").await?, 1);
    // Every fetched candidate left the index, including the live U3.
    assert_eq!(store.zcount("idx:expiry", f64::NEG_INFINITY, f64::INFINITY).await?, 0);
    Ok(())
}

#[tokio::test]
async fn reap_batch_respects_batch_size_and_reports_remaining() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.counter_set("count", 4).await?;
    for (member, score) in [("U1", 10.0), ("U2", 20.0), ("U3", 30.0), ("U4", 40.0)] {
        store.zadd("idx:expiry", member, score).await?;
    }

    let batch = store.reap_batch(reap_request(1_000, 2)).await?;
    assert_eq!(batch.candidates, 2);
    assert_eq!(batch.expired_members.len(), 2);
    assert_eq!(batch.remaining, 2);
    assert_eq!(store.counter_get("count").await?, 2);

    let batch = store.reap_batch(reap_request(1_000, 2)).await?;
    assert_eq!(batch.remaining, 0);
    assert_eq!(store.counter_get("count").await?, 0);
    Ok(())
}

#[tokio::test]
async fn reap_batch_floors_counter_at_zero() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.counter_set("count", 1).await?;
    store.zadd("idx:expiry", "U1", 10.0).await?;
    store.zadd("idx:expiry", "U2", 20.0).await?;

    let batch = store.reap_batch(reap_request(1_000, 10)).await?;
    assert_eq!(batch.expired_members.len(), 2);
    assert_eq!(store.counter_get("count").await?, 0);
    Ok(())
}

#[tokio::test]
async fn scan_prefix_filters_keys() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.put("profile:U1", b"a", None).await?;
    store.put("profile:U2", b"b", None).await?;
    store.put("other:U3", b"c", None).await?;

    let mut keys = store.scan_prefix("profile:").await?;
    keys.sort();
    assert_eq!(keys, vec!["profile:U1", "profile:U2"]);
    Ok(())
}
