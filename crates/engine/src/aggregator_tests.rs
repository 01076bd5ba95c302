// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::aggregator::{
    engagement_score, value_score, ActivityLevel, Aggregator, SnapshotWarning,
};
use crate::archive::ArchiveStore;
use crate::error::ErrorKind;
use crate::profiles::ProfileStore;
use crate::statics::{StaticProfile, StaticProfileStore};
use crate::store::{epoch_ms, Keys, Store};
use crate::test_support::{memory_profiles, test_settings, FlakyStore, MemoryArchive, MemoryStatics};

fn full_static(user_id: &str) -> StaticProfile {
    StaticProfile {
        real_name: Some("Pat Doe".to_owned()),
        email: Some("pat@example.com".to_owned()),
        phone_number: Some("+15550100".to_owned()),
        gender: Some(crate::statics::Gender::Other),
        age_group: Some(crate::statics::AgeGroup::Adult),
        city: Some("Lisbon".to_owned()),
        source_channel: Some("organic".to_owned()),
        ..StaticProfile::new(user_id, epoch_ms())
    }
}

#[test]
fn activity_level_thresholds() {
    let now = 10_000_000_000;
    assert_eq!(ActivityLevel::from_last_active(now - 1, now), ActivityLevel::VeryActive);
    assert_eq!(
        ActivityLevel::from_last_active(now - 3_599_999, now),
        ActivityLevel::VeryActive
    );
    assert_eq!(ActivityLevel::from_last_active(now - 3_600_000, now), ActivityLevel::Active);
    assert_eq!(ActivityLevel::from_last_active(now - 86_400_000, now), ActivityLevel::Dormant);
    assert_eq!(
        ActivityLevel::from_last_active(now - 2_592_000_000, now),
        ActivityLevel::Unknown
    );
}

#[test]
fn scores_are_deterministic_and_bounded() {
    assert_eq!(engagement_score(0), 0);
    assert_eq!(engagement_score(999), 99);
    assert_eq!(engagement_score(1_000), 100);
    assert_eq!(engagement_score(u64::MAX), 100);

    assert_eq!(value_score(0, 0), 0);
    assert_eq!(value_score(100, 100), 100);
    assert_eq!(value_score(100, 0), 40);
    assert_eq!(value_score(0, 100), 60);

    // Monotone in both inputs.
    assert!(value_score(50, 80) <= value_score(60, 80));
    assert!(value_score(50, 80) <= value_score(50, 90));
}

async fn seeded(
    statics: Arc<MemoryStatics>,
) -> anyhow::Result<(Arc<ProfileStore>, Arc<Aggregator>)> {
    let (_, profiles) = memory_profiles(test_settings());
    profiles.record_page_views("U1", 1_000).await?;
    let aggregator = Arc::new(Aggregator::new(Arc::clone(&profiles), statics));
    Ok((profiles, aggregator))
}

#[tokio::test]
async fn composes_both_sides_and_flags_high_value() -> anyhow::Result<()> {
    let statics = Arc::new(MemoryStatics::with_profile(full_static("U1")));
    let (_, aggregator) = seeded(statics).await?;

    let Some(snapshot) = aggregator.get_profile("U1").await? else {
        anyhow::bail!("snapshot missing");
    };
    assert!(snapshot.static_profile.is_some());
    assert!(snapshot.dynamic_profile.is_some());
    assert_eq!(snapshot.activity_level, ActivityLevel::VeryActive);
    assert_eq!(snapshot.value_score, 100);
    assert!(snapshot.is_high_value_user);
    assert!(snapshot.warnings.is_empty());
    Ok(())
}

#[tokio::test]
async fn absent_on_both_sides_is_absent() -> anyhow::Result<()> {
    let statics = Arc::new(MemoryStatics::new());
    let (_, aggregator) = seeded(statics).await?;
    assert!(aggregator.get_profile("nobody").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn static_failure_degrades_to_dynamic_only() -> anyhow::Result<()> {
    let statics = Arc::new(MemoryStatics::with_profile(full_static("U1")));
    let (_, aggregator) = seeded(Arc::clone(&statics)).await?;

    statics.set_failing(true);
    let Some(snapshot) = aggregator.get_profile("U1").await? else {
        anyhow::bail!("snapshot missing");
    };
    assert!(snapshot.static_profile.is_none());
    assert!(snapshot.dynamic_profile.is_some());
    assert_eq!(snapshot.warnings, vec![SnapshotWarning::StaticUnavailable]);
    // Completeness unknown: engagement alone cannot clear the bar.
    assert_eq!(snapshot.value_score, 60);
    assert!(!snapshot.is_high_value_user);
    assert_eq!(snapshot.activity_level, ActivityLevel::VeryActive);
    Ok(())
}

#[tokio::test]
async fn dynamic_failure_degrades_to_static_only() -> anyhow::Result<()> {
    let settings = test_settings();
    let store = Arc::new(FlakyStore::new());
    let keys = Keys::new(&settings.namespace);
    let profiles = Arc::new(ProfileStore::new(
        Arc::clone(&store) as Arc<dyn Store>,
        keys,
        settings,
    ));
    let statics = Arc::new(MemoryStatics::with_profile(full_static("U1")));
    let aggregator = Arc::new(Aggregator::new(Arc::clone(&profiles), statics));

    store.fail_reads(true);
    let Some(snapshot) = aggregator.get_profile("U1").await? else {
        anyhow::bail!("snapshot missing");
    };
    assert!(snapshot.dynamic_profile.is_none());
    assert_eq!(snapshot.activity_level, ActivityLevel::Unknown);
    assert_eq!(snapshot.warnings, vec![SnapshotWarning::DynamicUnavailable]);
    assert!(!snapshot.is_high_value_user);
    Ok(())
}

#[tokio::test]
async fn invalid_user_id_is_not_a_degrade() {
    let statics = Arc::new(MemoryStatics::new());
    let (_, profiles) = memory_profiles(test_settings());
    let aggregator = Aggregator::new(profiles, statics);
    let err = aggregator.get_profile("").await.err();
    assert!(matches!(err, Some(e) if e.kind == ErrorKind::InvalidArgument));
}

#[tokio::test]
async fn crm_cache_invalidates_on_profile_updates() -> anyhow::Result<()> {
    let statics = Arc::new(MemoryStatics::new());
    let (profiles, aggregator) = seeded(statics).await?;
    let shutdown = CancellationToken::new();
    let watcher = aggregator.watch_updates(profiles.subscribe_updates(), shutdown.clone());

    let Some(first) = aggregator.get_for_crm("U1").await? else {
        anyhow::bail!("snapshot missing");
    };
    profiles.record_page_views("U1", 10).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let Some(second) = aggregator.get_for_crm("U1").await? else {
        anyhow::bail!("snapshot missing");
    };
    let (Some(d1), Some(d2)) = (&first.dynamic_profile, &second.dynamic_profile) else {
        anyhow::bail!("dynamic side missing");
    };
    assert!(d2.version > d1.version);

    shutdown.cancel();
    let _ = watcher.await;
    Ok(())
}

#[tokio::test]
async fn analytics_cache_tolerates_staleness() -> anyhow::Result<()> {
    let statics = Arc::new(MemoryStatics::new());
    let (profiles, aggregator) = seeded(statics).await?;

    let Some(first) = aggregator.get_for_analytics("U1").await? else {
        anyhow::bail!("snapshot missing");
    };
    profiles.record_page_views("U1", 10).await?;

    let Some(second) = aggregator.get_for_analytics("U1").await? else {
        anyhow::bail!("snapshot missing");
    };
    assert_eq!(first.composed_at, second.composed_at);
    Ok(())
}

#[tokio::test]
async fn stats_expose_both_count_semantics() -> anyhow::Result<()> {
    let statics = Arc::new(MemoryStatics::with_profile(full_static("S1")));
    let (_, aggregator) = seeded(statics).await?;

    let stats = aggregator.stats().await?;
    assert_eq!(stats.hot_users, 1);
    assert_eq!(stats.static_users, 1);
    Ok(())
}

#[tokio::test]
async fn materialize_upserts_and_bumps_data_version() -> anyhow::Result<()> {
    let statics = Arc::new(MemoryStatics::with_profile(full_static("U1")));
    let (_, aggregator) = seeded(statics).await?;
    let archive = MemoryArchive::new();

    assert!(aggregator.materialize("U1", &archive).await?);
    assert!(aggregator.materialize("U1", &archive).await?);
    assert!(!aggregator.materialize("nobody", &archive).await?);

    let Some(doc) = archive.get_active("U1").await? else {
        anyhow::bail!("document missing");
    };
    assert_eq!(doc.data_version, 2);
    assert_eq!(archive.count_active().await?, 1);
    Ok(())
}
