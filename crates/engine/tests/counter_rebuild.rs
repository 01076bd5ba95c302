// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator counter reset: rebuild the counter and the expiry index from a
//! primary-store scan.

use std::sync::Arc;

use pulsehub::command::counter::run_reset;
use pulsehub::config::EngineSettings;
use pulsehub::profile::DynamicProfile;
use pulsehub::run::Engine;
use pulsehub::store::{epoch_ms, MemoryStore, Store};

#[tokio::test]
async fn reset_rebuilds_counter_and_expiry_index() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let settings = EngineSettings { namespace: "test".to_owned(), ..EngineSettings::default() };
    let engine = Engine::build(Arc::clone(&store) as Arc<dyn Store>, settings);

    for user in ["U1", "U2", "U3"] {
        engine.profiles.create(DynamicProfile::new(user, epoch_ms())).await?;
    }

    // Simulate drift: a wrong counter and a lost expiry index.
    store.counter_set("test:count:users", 40).await?;
    store.zrem_range_by_score(
        "test:idx:expiry",
        f64::NEG_INFINITY,
        f64::INFINITY,
    )
    .await?;
    assert_eq!(engine.indices.overdue_count(u64::MAX).await?, 0);

    let report = run_reset(&engine).await?;
    assert_eq!(report.profiles, 3);
    assert_eq!(report.rebuilt_expiry_entries, 3);

    assert_eq!(engine.profiles.user_count().await?, 3);
    // Every rebuilt entry carries a future expiry derived from its TTL.
    let now = epoch_ms();
    assert_eq!(engine.indices.overdue_count(now).await?, 0);
    assert_eq!(engine.indices.overdue_count(u64::MAX).await?, 3);
    Ok(())
}
