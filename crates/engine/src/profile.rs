// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dynamic profile entity and its stored wire form.
//!
//! Profiles are persisted as self-describing JSON with a schema tag. Decoding
//! tolerates unknown fields and fills absent ones with defaults, so payloads
//! written by older schema versions keep loading; a payload from a *newer*
//! schema than this build supports is refused.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::device::DeviceClass;
use crate::error::{EngineError, Result};

/// Stored-payload schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Cap on the recent-device set carried per profile.
pub const RECENT_DEVICES_CAP: usize = 8;

/// Hot-tier behavioral state for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicProfile {
    pub user_id: String,
    /// Epoch ms of the last behavioral signal. Never decreases.
    pub last_active_at: u64,
    pub page_view_count: u64,
    pub main_device: Option<DeviceClass>,
    pub recent_devices: BTreeSet<DeviceClass>,
    /// Bumped on every successful mutation. Starts at 1.
    pub version: u64,
    pub updated_at: u64,
}

impl DynamicProfile {
    /// Fresh profile for a first behavioral signal at `now`.
    pub fn new(user_id: impl Into<String>, now_ms: u64) -> Self {
        Self {
            user_id: user_id.into(),
            last_active_at: now_ms,
            page_view_count: 0,
            main_device: None,
            recent_devices: BTreeSet::new(),
            version: 1,
            updated_at: now_ms,
        }
    }

    /// Record a device observation: set the main classification and add it
    /// to the recent set (bounded).
    pub fn observe_device(&mut self, device: DeviceClass) {
        self.main_device = Some(device);
        if self.recent_devices.len() < RECENT_DEVICES_CAP
            || self.recent_devices.contains(&device)
        {
            self.recent_devices.insert(device);
        }
    }

    /// Shared mutation bookkeeping: version bump, `updated_at` refresh,
    /// last-active floor. Keeps `last_active_at ≤ updated_at`.
    pub fn touch(&mut self, now_ms: u64) {
        self.version = self.version.saturating_add(1);
        if self.last_active_at < now_ms {
            self.last_active_at = now_ms;
        }
        self.updated_at = now_ms.max(self.last_active_at);
    }

    /// Restore the invariants the wire form cannot express: a set main
    /// device is always a member of the recent set, and `updated_at` never
    /// trails `last_active_at`.
    fn normalize(mut self) -> Self {
        if let Some(main) = self.main_device {
            self.recent_devices.insert(main);
        }
        if self.updated_at < self.last_active_at {
            self.updated_at = self.last_active_at;
        }
        self
    }
}

/// Wire form. Field defaults cover payloads written before the field existed.
#[derive(Debug, Serialize, Deserialize)]
struct StoredProfile {
    #[serde(default)]
    schema: u32,
    user_id: String,
    #[serde(default)]
    last_active_at: u64,
    #[serde(default)]
    page_view_count: u64,
    #[serde(default)]
    main_device: Option<DeviceClass>,
    #[serde(default)]
    recent_devices: BTreeSet<DeviceClass>,
    #[serde(default = "initial_version")]
    version: u64,
    #[serde(default)]
    updated_at: u64,
}

fn initial_version() -> u64 {
    1
}

/// Serialize a profile into its stored payload.
pub fn encode(profile: &DynamicProfile) -> Result<Vec<u8>> {
    let stored = StoredProfile {
        schema: SCHEMA_VERSION,
        user_id: profile.user_id.clone(),
        last_active_at: profile.last_active_at,
        page_view_count: profile.page_view_count,
        main_device: profile.main_device,
        recent_devices: profile.recent_devices.clone(),
        version: profile.version,
        updated_at: profile.updated_at,
    };
    serde_json::to_vec(&stored)
        .map_err(|e| EngineError::fatal(format!("profile encode: {e}")))
}

/// Deserialize a stored payload, tolerating unknown fields and legacy gaps.
pub fn decode(bytes: &[u8]) -> Result<DynamicProfile> {
    let stored: StoredProfile = serde_json::from_slice(bytes)
        .map_err(|e| EngineError::fatal(format!("profile decode: {e}")))?;
    if stored.schema > SCHEMA_VERSION {
        return Err(EngineError::fatal(format!(
            "profile schema {} is newer than supported {}",
            stored.schema, SCHEMA_VERSION
        )));
    }
    if stored.user_id.is_empty() {
        return Err(EngineError::fatal("stored profile has an empty user id"));
    }
    Ok(DynamicProfile {
        user_id: stored.user_id,
        last_active_at: stored.last_active_at,
        page_view_count: stored.page_view_count,
        main_device: stored.main_device,
        recent_devices: stored.recent_devices,
        version: stored.version,
        updated_at: stored.updated_at,
    }
    .normalize())
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
