// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::time::Duration;

use crate::config::EngineSettings;
use crate::device::DeviceClass;
use crate::error::ErrorKind;
use crate::profile::DynamicProfile;
use crate::store::{epoch_ms, Store};
use crate::test_support::{memory_profiles, test_settings};

#[tokio::test]
async fn create_then_increment() -> anyhow::Result<()> {
    let (store, profiles) = memory_profiles(test_settings());

    let mut seed = DynamicProfile::new("U1", epoch_ms());
    seed.page_view_count = 10;
    seed.main_device = Some(DeviceClass::Mobile);
    profiles.create(seed).await?;

    profiles.record_page_views("U1", 5).await?;

    let Some(p) = profiles.get("U1").await? else {
        anyhow::bail!("profile missing after create");
    };
    assert_eq!(p.page_view_count, 15);
    assert_eq!(p.version, 2);
    assert!(p.last_active_at > 0);
    assert_eq!(store.zscore("test:idx:pageviews", "U1").await?, Some(15.0));
    Ok(())
}

#[tokio::test]
async fn create_rejects_empty_user_id() {
    let (_, profiles) = memory_profiles(test_settings());
    let err = profiles.create(DynamicProfile::new("", 0)).await.err();
    assert!(matches!(err, Some(e) if e.kind == ErrorKind::InvalidArgument));
}

#[tokio::test]
async fn record_zero_page_views_is_invalid() {
    let (_, profiles) = memory_profiles(test_settings());
    let err = profiles.record_page_views("U1", 0).await.err();
    assert!(matches!(err, Some(e) if e.kind == ErrorKind::InvalidArgument));
}

#[tokio::test]
async fn record_page_views_creates_lazily() -> anyhow::Result<()> {
    let (_, profiles) = memory_profiles(test_settings());
    let p = profiles.record_page_views("unknown", 7).await?;
    assert_eq!(p.page_view_count, 7);
    assert_eq!(p.version, 1);
    assert_eq!(profiles.user_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn version_strictly_increases_per_update() -> anyhow::Result<()> {
    let (_, profiles) = memory_profiles(test_settings());
    let created = profiles.create(DynamicProfile::new("U1", epoch_ms())).await?;
    let v0 = created.version;

    let first = profiles.update(created).await?;
    let second = profiles.update(first.clone()).await?;
    assert_eq!(first.version, v0 + 1);
    assert_eq!(second.version, v0 + 2);

    let Some(stored) = profiles.get("U1").await? else {
        anyhow::bail!("profile missing");
    };
    assert_eq!(stored.version, v0 + 2);
    Ok(())
}

#[tokio::test]
async fn update_last_active_never_rewinds() -> anyhow::Result<()> {
    let (_, profiles) = memory_profiles(test_settings());
    let now = epoch_ms();
    profiles.update_last_active("U1", Some(now)).await?;
    let p = profiles.update_last_active("U1", Some(now - 60_000)).await?;
    assert!(p.last_active_at >= now);
    assert!(p.last_active_at <= p.updated_at);
    Ok(())
}

#[tokio::test]
async fn update_device_sets_main_and_accumulates_recent() -> anyhow::Result<()> {
    let (_, profiles) = memory_profiles(test_settings());
    profiles.update_device("U1", DeviceClass::Mobile).await?;
    let p = profiles.update_device("U1", DeviceClass::Desktop).await?;

    assert_eq!(p.main_device, Some(DeviceClass::Desktop));
    assert!(p.recent_devices.contains(&DeviceClass::Mobile));
    assert!(p.recent_devices.contains(&DeviceClass::Desktop));
    Ok(())
}

#[tokio::test]
async fn get_many_preserves_requested_order() -> anyhow::Result<()> {
    let (_, profiles) = memory_profiles(test_settings());
    for user in ["U1", "U2", "U3"] {
        profiles.record_page_views(user, 1).await?;
    }

    let ids = vec!["U3".to_owned(), "absent".to_owned(), "U1".to_owned()];
    let found = profiles.get_many(&ids).await?;
    let order: Vec<&str> = found.keys().map(String::as_str).collect();
    assert_eq!(order, vec!["U3", "U1"]);
    Ok(())
}

#[tokio::test]
async fn delete_removes_all_index_membership() -> anyhow::Result<()> {
    let (store, profiles) = memory_profiles(test_settings());
    profiles.record_page_views("U1", 3).await?;
    profiles.update_device("U1", DeviceClass::Tablet).await?;
    assert_eq!(profiles.user_count().await?, 1);

    assert!(profiles.delete("U1").await?);
    assert!(profiles.get("U1").await?.is_none());
    assert!(store.zscore("test:idx:active", "U1").await?.is_none());
    assert!(store.zscore("test:idx:pageviews", "U1").await?.is_none());
    assert!(store.zscore("test:idx:expiry", "U1").await?.is_none());
    assert!(profiles.indices().by_device(DeviceClass::Tablet).await?.is_empty());
    assert_eq!(profiles.user_count().await?, 0);

    // Deleting again reports absence, and the counter never goes negative.
    assert!(!profiles.delete("U1").await?);
    assert_eq!(profiles.user_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn create_overwrite_keeps_counter_stable() -> anyhow::Result<()> {
    let (_, profiles) = memory_profiles(test_settings());
    profiles.create(DynamicProfile::new("U1", epoch_ms())).await?;
    profiles.create(DynamicProfile::new("U1", epoch_ms())).await?;
    assert_eq!(profiles.user_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn mutation_resets_primary_ttl() -> anyhow::Result<()> {
    let settings = EngineSettings {
        default_ttl: Duration::from_millis(120),
        ..test_settings()
    };
    let (store, profiles) = memory_profiles(settings);
    profiles.record_page_views("U1", 1).await?;

    // A mutation inside the window extends the entry's life.
    tokio::time::sleep(Duration::from_millis(70)).await;
    profiles.record_page_views("U1", 1).await?;
    tokio::time::sleep(Duration::from_millis(70)).await;
    assert!(profiles.exists("U1").await?);

    // Without mutations the entry is physically evicted.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(!profiles.exists("U1").await?);
    assert!(store.fetch("test:profile:U1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn batch_update_applies_all_deltas() -> anyhow::Result<()> {
    let (store, profiles) = memory_profiles(test_settings());
    profiles.record_page_views("existing", 5).await?;

    let mut deltas = HashMap::new();
    deltas.insert("existing".to_owned(), 10u64);
    deltas.insert("brand-new".to_owned(), 3u64);
    assert_eq!(profiles.batch_update_page_views(&deltas).await?, 2);

    let Some(existing) = profiles.get("existing").await? else {
        anyhow::bail!("existing profile missing");
    };
    assert_eq!(existing.page_view_count, 15);
    assert_eq!(existing.version, 2);

    let Some(fresh) = profiles.get("brand-new").await? else {
        anyhow::bail!("new profile missing");
    };
    assert_eq!(fresh.page_view_count, 3);
    assert_eq!(fresh.version, 1);

    assert_eq!(store.zscore("test:idx:pageviews", "existing").await?, Some(15.0));
    assert_eq!(store.zscore("test:idx:pageviews", "brand-new").await?, Some(3.0));
    assert_eq!(profiles.user_count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn batch_update_validates_before_any_state_change() -> anyhow::Result<()> {
    let (_, profiles) = memory_profiles(test_settings());

    let mut deltas = HashMap::new();
    deltas.insert("ok".to_owned(), 5u64);
    deltas.insert("bad".to_owned(), 0u64);
    let err = profiles.batch_update_page_views(&deltas).await.err();
    assert!(matches!(err, Some(e) if e.kind == ErrorKind::InvalidArgument));

    // Nothing was written.
    assert!(profiles.get("ok").await?.is_none());
    assert_eq!(profiles.user_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn successful_mutations_broadcast_updates() -> anyhow::Result<()> {
    let (_, profiles) = memory_profiles(test_settings());
    let mut updates = profiles.subscribe_updates();

    profiles.record_page_views("U1", 2).await?;
    let event = updates.recv().await?;
    assert_eq!(event.user_id, "U1");
    assert_eq!(event.version, 1);
    assert_eq!(event.source, "profile-core");

    profiles.record_page_views("U1", 2).await?;
    let event = updates.recv().await?;
    assert_eq!(event.version, 2);
    Ok(())
}
