// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TTL-aware expiry reaper.
//!
//! Reconciles the total-user counter and the indices with actual primary
//! membership as entries expire. Runs on a wall-clock schedule aligned to
//! UTC; exactly one process-wide reaper executes per tick, enforced by a
//! non-blocking store lease. The scheduler loop never runs a tick inline —
//! each tick is spawned, so a slow tick cannot starve the schedule; the next
//! tick's lease attempt fails instead, which is the desired back-pressure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::EngineSettings;
use crate::error::{EngineError, Result};
use crate::index::IndexMaintainer;
use crate::store::{epoch_ms, Keys, ReapRequest, Store};

/// Retry attempts per tick.
const MAX_ATTEMPTS: u32 = 3;
/// Initial retry backoff; doubles per attempt.
const BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Pause between reconciliation batches.
const BATCH_PAUSE: Duration = Duration::from_millis(10);

/// Which lease a tick runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
}

/// Terminal event emitted once per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReaperEvent {
    CleanupCompleted {
        task_id: String,
        total_expired: u64,
        total_candidates: u64,
        iterations: u32,
        duration_ms: u64,
    },
    CleanupFailed {
        task_id: String,
        error: String,
        timestamp_ms: u64,
    },
}

/// Accumulated result of one tick's reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapSummary {
    pub total_expired: u64,
    pub total_candidates: u64,
    pub iterations: u32,
}

/// Outcome of one tick attempt.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    Completed(ReapSummary),
    /// The lease was held elsewhere; nothing ran.
    Skipped,
    Failed(EngineError),
}

/// Point-in-time reaper status.
#[derive(Debug, Clone, Serialize)]
pub struct ReaperStatus {
    pub running: bool,
    pub overdue_candidates: u64,
    pub current_user_count: i64,
    pub next_scheduled_at_ms: u64,
}

pub struct Reaper {
    store: Arc<dyn Store>,
    keys: Keys,
    indices: Arc<IndexMaintainer>,
    settings: EngineSettings,
    running: AtomicBool,
    events_tx: broadcast::Sender<ReaperEvent>,
}

impl Reaper {
    pub fn new(
        store: Arc<dyn Store>,
        keys: Keys,
        indices: Arc<IndexMaintainer>,
        settings: EngineSettings,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self { store, keys, indices, settings, running: AtomicBool::new(false), events_tx }
    }

    /// Subscribe to terminal tick events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ReaperEvent> {
        self.events_tx.subscribe()
    }

    /// Next tick instant: the period boundary after `now_ms`, aligned to
    /// the UTC wall clock.
    pub fn next_scheduled_at(&self, now_ms: u64) -> u64 {
        let period = self.settings.reaper_period.as_millis() as u64;
        (now_ms / period + 1) * period
    }

    /// Drive the schedule until shutdown. Ticks are spawned, never awaited
    /// inline.
    pub async fn run_scheduled(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            let now = epoch_ms();
            let delay = Duration::from_millis(self.next_scheduled_at(now).saturating_sub(now));
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let reaper = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _ = reaper.tick(Trigger::Scheduled).await;
                    });
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    /// Operator-triggered tick under the manual lease key.
    pub async fn run_manual(&self) -> TickOutcome {
        self.tick(Trigger::Manual).await
    }

    /// One tick: acquire the lease, reconcile under the outer deadline,
    /// release the lease on every path, emit exactly one terminal event.
    pub async fn tick(&self, trigger: Trigger) -> TickOutcome {
        let task_id = uuid::Uuid::new_v4().to_string();
        let token = uuid::Uuid::new_v4().to_string();
        let lease_key = match trigger {
            Trigger::Scheduled => self.keys.reaper_lease(),
            Trigger::Manual => self.keys.reaper_manual_lease(),
        };

        match self.store.lease_acquire(&lease_key, &token, self.settings.lock_expire).await {
            Ok(true) => {}
            Ok(false) => {
                info!(task_id = %task_id, "reaper lease held elsewhere, skipping tick");
                return TickOutcome::Skipped;
            }
            Err(e) => {
                error!(task_id = %task_id, "reaper lease acquisition failed: {e}");
                self.emit_failed(&task_id, &e);
                return TickOutcome::Failed(e);
            }
        }

        self.running.store(true, Ordering::SeqCst);
        let started = std::time::Instant::now();
        let result =
            tokio::time::timeout(self.settings.max_execution, self.reconcile_with_retry()).await;
        self.running.store(false, Ordering::SeqCst);

        match self.store.lease_release(&lease_key, &token).await {
            Ok(true) => {}
            Ok(false) => warn!(task_id = %task_id, "reaper lease expired before release"),
            Err(e) => warn!(task_id = %task_id, "reaper lease release failed: {e}"),
        }

        match result {
            Ok(Ok(summary)) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    task_id = %task_id,
                    total_expired = summary.total_expired,
                    total_candidates = summary.total_candidates,
                    iterations = summary.iterations,
                    duration_ms,
                    "reaper tick completed"
                );
                let _ = self.events_tx.send(ReaperEvent::CleanupCompleted {
                    task_id,
                    total_expired: summary.total_expired,
                    total_candidates: summary.total_candidates,
                    iterations: summary.iterations,
                    duration_ms,
                });
                TickOutcome::Completed(summary)
            }
            Ok(Err(e)) => {
                error!(task_id = %task_id, "reaper tick failed: {e}");
                self.emit_failed(&task_id, &e);
                TickOutcome::Failed(e)
            }
            Err(_) => {
                let e = EngineError::transient("reaper tick exceeded the execution deadline");
                error!(task_id = %task_id, "{e}");
                self.emit_failed(&task_id, &e);
                TickOutcome::Failed(e)
            }
        }
    }

    /// Point-in-time status; safe to call while a tick runs.
    pub async fn status(&self) -> Result<ReaperStatus> {
        let now = epoch_ms();
        Ok(ReaperStatus {
            running: self.running.load(Ordering::SeqCst),
            overdue_candidates: self.indices.overdue_count(now).await?,
            current_user_count: self.indices.user_count().await?,
            next_scheduled_at_ms: self.next_scheduled_at(now),
        })
    }

    fn emit_failed(&self, task_id: &str, error: &EngineError) {
        let _ = self.events_tx.send(ReaperEvent::CleanupFailed {
            task_id: task_id.to_owned(),
            error: error.to_string(),
            timestamp_ms: epoch_ms(),
        });
    }

    /// Reconciliation with up to three attempts; only transient failures
    /// are retried, with backoff doubling from one second. Exhausted
    /// retries leave unprocessed candidates untouched.
    async fn reconcile_with_retry(&self) -> Result<ReapSummary> {
        let mut backoff = BACKOFF_BASE;
        let mut attempt = 1;
        loop {
            match self.reconcile().await {
                Ok(summary) => return Ok(summary),
                Err(e) if e.is_retriable() && attempt < MAX_ATTEMPTS => {
                    warn!(attempt, "reaper reconciliation failed, backing off {backoff:?}: {e}");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Bounded-batch reconciliation against the tick-start instant. Each
    /// batch is one atomic store step (counter + expiry index); the expired
    /// members are then swept from the remaining indices best-effort.
    async fn reconcile(&self) -> Result<ReapSummary> {
        let now = epoch_ms();
        let mut summary = ReapSummary::default();

        loop {
            let batch = self
                .store
                .reap_batch(ReapRequest {
                    expiry_index: self.keys.idx_expiry(),
                    counter: self.keys.user_counter(),
                    primary_prefix: self.keys.profile_prefix(),
                    now_ms: now,
                    batch_size: self.settings.batch_size,
                })
                .await?;

            summary.total_candidates += batch.candidates;
            summary.total_expired += batch.expired_members.len() as u64;
            if batch.candidates > 0 {
                summary.iterations += 1;
            }

            if !batch.expired_members.is_empty() {
                if let Err(e) = self.indices.purge_members(&batch.expired_members).await {
                    warn!("index sweep after reap batch failed: {e}");
                }
            }

            if batch.remaining == 0 || summary.iterations >= self.settings.max_iterations {
                break;
            }
            tokio::time::sleep(BATCH_PAUSE).await;
        }

        Ok(summary)
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
