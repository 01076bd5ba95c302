// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event boundary: inbound activity events and outbound profile updates.
//!
//! Inbound activity arrives on `{prefix}.activity` and is routed to the
//! profile store; outbound `ProfileUpdated` and reaper events are consumed
//! from the engine's broadcast channels and published to NATS subjects.
//! Publishing is best-effort — a publish failure logs and continues.

use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::DeviceClassifier;
use crate::profile::DynamicProfile;
use crate::profiles::ProfileStore;
use crate::reaper::ReaperEvent;

/// Source tag carried by outbound profile-update events.
pub const EVENT_SOURCE: &str = "profile-core";

/// Inbound activity event types. Unrecognized types deserialize to
/// `Unknown` and are skipped, so new producers never break ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    PageView,
    SessionStart,
    DeviceObserved,
    #[serde(other)]
    Unknown,
}

/// Inbound user-activity event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub user_id: String,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_raw_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// Outbound event published after any successful profile mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdated {
    pub user_id: String,
    pub version: u64,
    pub updated_at: u64,
    pub source: String,
}

impl ProfileUpdated {
    pub fn from_profile(profile: &DynamicProfile) -> Self {
        Self {
            user_id: profile.user_id.clone(),
            version: profile.version,
            updated_at: profile.updated_at,
            source: EVENT_SOURCE.to_owned(),
        }
    }
}

// -- Routing -------------------------------------------------------------------

/// Routes inbound activity events onto profile-store operations.
pub struct EventRouter {
    profiles: Arc<ProfileStore>,
    classifier: Arc<DeviceClassifier>,
}

impl EventRouter {
    pub fn new(profiles: Arc<ProfileStore>, classifier: Arc<DeviceClassifier>) -> Self {
        Self { profiles, classifier }
    }

    /// Dispatch one event. Returns the mutated profile, or `None` for event
    /// types this engine does not consume.
    pub async fn route(
        &self,
        event: ActivityEvent,
    ) -> crate::error::Result<Option<DynamicProfile>> {
        match event.event_type {
            EventType::PageView => self
                .profiles
                .record_page_views(&event.user_id, event.count.unwrap_or(1))
                .await
                .map(Some),
            EventType::SessionStart => self
                .profiles
                .update_last_active(&event.user_id, event.timestamp)
                .await
                .map(Some),
            EventType::DeviceObserved => {
                let class = self.classifier.classify(event.device_raw_token.as_deref()).await;
                self.profiles.update_device(&event.user_id, class).await.map(Some)
            }
            EventType::Unknown => {
                debug!(user_id = %event.user_id, "ignoring unrecognized activity event type");
                Ok(None)
            }
        }
    }
}

// -- NATS bridge ---------------------------------------------------------------

/// Configuration for the NATS event boundary.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URL (e.g. "nats://127.0.0.1:4222").
    pub url: String,
    /// Subject prefix (default: "pulsehub.events").
    pub prefix: String,
}

/// Bridges the engine's broadcast channels to NATS subjects:
///
/// - `{prefix}.activity` — inbound activity events (consumed)
/// - `{prefix}.profile.updated` — outbound profile updates
/// - `{prefix}.reaper` — outbound reaper terminal events
#[derive(Clone)]
pub struct NatsBridge {
    client: async_nats::Client,
    prefix: String,
}

impl NatsBridge {
    /// Connect to the NATS server.
    pub async fn connect(config: &NatsConfig) -> anyhow::Result<Self> {
        let opts = async_nats::ConnectOptions::new().retry_on_initial_connect();
        info!(url = %config.url, prefix = %config.prefix, "connecting NATS bridge");
        let client = opts.connect(&config.url).await?;
        info!("NATS bridge connected");
        Ok(Self { client, prefix: config.prefix.clone() })
    }

    /// Consume inbound activity events until shutdown. Malformed payloads
    /// and routing failures log and continue.
    pub async fn run_ingest(
        &self,
        router: Arc<EventRouter>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let subject = format!("{}.activity", self.prefix);
        let mut subscriber = self.client.subscribe(subject.clone()).await?;
        info!(subject = %subject, "activity ingest subscribed");

        loop {
            tokio::select! {
                message = subscriber.next() => {
                    let Some(message) = message else { break };
                    let event: ActivityEvent = match serde_json::from_slice(&message.payload) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("dropping malformed activity event: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = router.route(event).await {
                        warn!("activity event routing failed: {e}");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        debug!("activity ingest shutting down");
        Ok(())
    }

    /// Publish outbound events until shutdown, consuming the profile-update
    /// and reaper broadcast channels.
    pub async fn run_publisher(
        self,
        mut updates_rx: broadcast::Receiver<ProfileUpdated>,
        mut reaper_rx: broadcast::Receiver<ReaperEvent>,
        shutdown: CancellationToken,
    ) {
        let update_subject = format!("{}.profile.updated", self.prefix);
        let reaper_subject = format!("{}.reaper", self.prefix);

        loop {
            tokio::select! {
                event = updates_rx.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_vec(&event) {
                                if let Err(e) = self.client.publish(
                                    update_subject.clone(), json.into()
                                ).await {
                                    warn!("NATS publish profile update failed: {e}");
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!("NATS publisher lagged {n} profile updates");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                event = reaper_rx.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_vec(&event) {
                                if let Err(e) = self.client.publish(
                                    reaper_subject.clone(), json.into()
                                ).await {
                                    warn!("NATS publish reaper event failed: {e}");
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!("NATS publisher lagged {n} reaper events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        debug!("NATS publisher shutting down");
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
