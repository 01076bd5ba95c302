// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine assembly and service lifecycle — shared by `main`, the operator
//! subcommands, and integration tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, EngineSettings};
use crate::device::DeviceClassifier;
use crate::error::Result;
use crate::events::{EventRouter, NatsBridge, NatsConfig};
use crate::index::IndexMaintainer;
use crate::profiles::ProfileStore;
use crate::reaper::Reaper;
use crate::store::{Keys, MemoryStore, RedisStore, Store};

/// The wired engine components.
pub struct Engine {
    pub store: Arc<dyn Store>,
    pub keys: Keys,
    pub settings: EngineSettings,
    pub classifier: Arc<DeviceClassifier>,
    pub profiles: Arc<ProfileStore>,
    pub indices: Arc<IndexMaintainer>,
    pub reaper: Arc<Reaper>,
}

impl Engine {
    /// Wire components over an already-open store.
    pub fn build(store: Arc<dyn Store>, settings: EngineSettings) -> Self {
        let keys = Keys::new(&settings.namespace);
        let classifier = Arc::new(DeviceClassifier::new(Arc::clone(&store), &keys));
        let profiles =
            Arc::new(ProfileStore::new(Arc::clone(&store), keys.clone(), settings.clone()));
        let indices = profiles.indices();
        let reaper = Arc::new(Reaper::new(
            Arc::clone(&store),
            keys.clone(),
            Arc::clone(&indices),
            settings.clone(),
        ));
        Self { store, keys, settings, classifier, profiles, indices, reaper }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = config.settings();
        let store = open_store(config)?;
        Ok(Self::build(store, settings))
    }
}

/// Open the configured backing store.
pub fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    if config.store_url.starts_with("memory:") {
        Ok(Arc::new(MemoryStore::new()))
    } else {
        let store =
            RedisStore::connect(&config.store_url, Duration::from_secs(config.op_timeout_secs))?;
        Ok(Arc::new(store))
    }
}

/// Initialize the global tracing subscriber from config. Call once.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Run the engine service until SIGTERM/SIGINT: the reaper schedule plus,
/// when configured, the NATS event boundary.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let engine = Engine::from_config(config)?;
    let shutdown = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("signal handler install failed: {e}");
                        return;
                    }
                };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    {
        let reaper = Arc::clone(&engine.reaper);
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            reaper.run_scheduled(shutdown).await;
        }));
    }

    if let Some(ref url) = config.nats_url {
        let nats_config = NatsConfig { url: url.clone(), prefix: config.nats_prefix.clone() };
        let bridge = NatsBridge::connect(&nats_config).await?;
        let router = Arc::new(EventRouter::new(
            Arc::clone(&engine.profiles),
            Arc::clone(&engine.classifier),
        ));
        let updates_rx = engine.profiles.subscribe_updates();
        let reaper_rx = engine.reaper.subscribe_events();

        {
            let bridge = bridge.clone();
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = bridge.run_ingest(router, shutdown).await {
                    error!("activity ingest failed: {e:#}");
                }
            }));
        }
        {
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(bridge.run_publisher(updates_rx, reaper_rx, shutdown)));
        }
    }

    info!(
        store = %config.store_url,
        namespace = %config.namespace,
        "pulsehub engine running"
    );
    shutdown.cancelled().await;

    for task in tasks {
        let _ = task.await;
    }
    info!("pulsehub engine stopped");
    Ok(())
}
