// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::device::DeviceClass;

use super::Keys;

#[test]
fn keys_partition_by_kind() {
    let keys = Keys::new("pulsehub");
    assert_eq!(keys.profile("U1"), "pulsehub:profile:U1");
    assert_eq!(keys.profile_prefix(), "pulsehub:profile:");
    assert_eq!(keys.idx_active(), "pulsehub:idx:active");
    assert_eq!(keys.idx_pageviews(), "pulsehub:idx:pageviews");
    assert_eq!(keys.idx_expiry(), "pulsehub:idx:expiry");
    assert_eq!(keys.idx_device(DeviceClass::SmartTv), "pulsehub:idx:device:SMART_TV");
    assert_eq!(keys.user_counter(), "pulsehub:count:users");
    assert_eq!(keys.unknown_devices(), "pulsehub:device:unknown");
}

#[test]
fn lease_keys_are_distinct() {
    let keys = Keys::new("pulsehub");
    assert_ne!(keys.reaper_lease(), keys.reaper_manual_lease());
}

#[test]
fn trailing_colon_in_namespace_is_dropped() {
    let keys = Keys::new("ns:");
    assert_eq!(keys.profile("U1"), "ns:profile:U1");
}
