// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key namespace layout. Every persisted key lives under one process-owned
//! prefix, partitioned by kind: profile primaries, one key per secondary
//! index, the user counter, the unknown-device review set, and the leases.

use crate::device::DeviceClass;

/// Namespaced key builder shared by the store consumers.
#[derive(Debug, Clone)]
pub struct Keys {
    ns: String,
}

impl Keys {
    pub fn new(namespace: &str) -> Self {
        Self { ns: namespace.trim_end_matches(':').to_owned() }
    }

    /// Primary record for one user's dynamic profile.
    pub fn profile(&self, user_id: &str) -> String {
        format!("{}:profile:{user_id}", self.ns)
    }

    /// Prefix shared by all profile primaries (scan and script input).
    pub fn profile_prefix(&self) -> String {
        format!("{}:profile:", self.ns)
    }

    /// Ordered set scored by `last_active_at` ms.
    pub fn idx_active(&self) -> String {
        format!("{}:idx:active", self.ns)
    }

    /// Ordered set scored by `page_view_count`.
    pub fn idx_pageviews(&self) -> String {
        format!("{}:idx:pageviews", self.ns)
    }

    /// Ordered set scored by absolute expiry ms; the reaper's work queue.
    pub fn idx_expiry(&self) -> String {
        format!("{}:idx:expiry", self.ns)
    }

    /// Plain membership set for one device variant.
    pub fn idx_device(&self, class: DeviceClass) -> String {
        format!("{}:idx:device:{}", self.ns, class.as_str())
    }

    /// Store-side total-user counter.
    pub fn user_counter(&self) -> String {
        format!("{}:count:users", self.ns)
    }

    /// Review set of raw device tokens awaiting a mapping.
    pub fn unknown_devices(&self) -> String {
        format!("{}:device:unknown", self.ns)
    }

    /// Lease key for the scheduled reaper.
    pub fn reaper_lease(&self) -> String {
        format!("{}:lease:reaper", self.ns)
    }

    /// Lease key for operator-triggered reaper runs. Distinct from the
    /// scheduled key so a manual run cannot collide with the scheduler.
    pub fn reaper_manual_lease(&self) -> String {
        format!("{}:lease:reaper:manual", self.ns)
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
