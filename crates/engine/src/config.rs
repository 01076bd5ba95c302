// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

/// Dynamic profile engine for the PulseHub platform.
#[derive(Debug, Clone, Parser)]
#[command(name = "pulsehub", version, about)]
pub struct Config {
    /// Hot-tier store URL (`redis://...` or `memory:` for in-process).
    #[arg(long, env = "PULSEHUB_STORE_URL", default_value = "redis://127.0.0.1:6379")]
    pub store_url: String,

    /// Key namespace prefix for all persisted state.
    #[arg(long, env = "PULSEHUB_NAMESPACE", default_value = "pulsehub")]
    pub namespace: String,

    /// NATS server URL for the event boundary (omit to disable).
    #[arg(long, env = "PULSEHUB_NATS_URL")]
    pub nats_url: Option<String>,

    /// Subject prefix for inbound/outbound events.
    #[arg(long, env = "PULSEHUB_NATS_PREFIX", default_value = "pulsehub.events")]
    pub nats_prefix: String,

    /// Profile TTL in seconds; reset on every mutation.
    #[arg(long, env = "PULSEHUB_DEFAULT_TTL_SECS", default_value = "604800")]
    pub default_ttl_secs: u64,

    /// Default recency window for active-user reporting, in seconds.
    #[arg(long, env = "PULSEHUB_ACTIVE_USERS_TTL_SECS", default_value = "86400")]
    pub active_users_ttl_secs: u64,

    /// Candidates fetched per reaper batch.
    #[arg(long, env = "PULSEHUB_BATCH_SIZE", default_value = "1000")]
    pub batch_size: usize,

    /// Hard cap on reaper batches per tick.
    #[arg(long, env = "PULSEHUB_MAX_ITERATIONS", default_value = "100")]
    pub max_iterations: u32,

    /// Reaper lease TTL in seconds. Must exceed the execution deadline.
    #[arg(long, env = "PULSEHUB_LOCK_EXPIRE_SECS", default_value = "3000")]
    pub lock_expire_secs: u64,

    /// Outer deadline for one reaper tick, in seconds.
    #[arg(long, env = "PULSEHUB_MAX_EXECUTION_SECS", default_value = "2700")]
    pub max_execution_secs: u64,

    /// Reaper period in seconds, aligned to the UTC wall clock.
    #[arg(long, env = "PULSEHUB_REAPER_PERIOD_SECS", default_value = "3600")]
    pub reaper_period_secs: u64,

    /// Per-operation store deadline in seconds.
    #[arg(long, env = "PULSEHUB_OP_TIMEOUT_SECS", default_value = "3")]
    pub op_timeout_secs: u64,

    /// Log format (json or text).
    #[arg(long, env = "PULSEHUB_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "PULSEHUB_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// TTL bounds for `--default-ttl-secs`.
const TTL_MIN_SECS: u64 = 3_600;
const TTL_MAX_SECS: u64 = 2_592_000;

impl Config {
    /// Validate option bounds after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.namespace.trim().is_empty() {
            anyhow::bail!("--namespace must not be empty");
        }
        let is_redis = self.store_url.starts_with("redis://")
            || self.store_url.starts_with("rediss://");
        if !is_redis && !self.store_url.starts_with("memory:") {
            anyhow::bail!("--store-url must be a redis:// URL or memory:");
        }
        if !(TTL_MIN_SECS..=TTL_MAX_SECS).contains(&self.default_ttl_secs) {
            anyhow::bail!(
                "--default-ttl-secs must be between {TTL_MIN_SECS} (1 hour) and {TTL_MAX_SECS} (30 days)"
            );
        }
        if !(1..=10_000).contains(&self.batch_size) {
            anyhow::bail!("--batch-size must be between 1 and 10000");
        }
        if self.max_iterations == 0 {
            anyhow::bail!("--max-iterations must be at least 1");
        }
        if self.lock_expire_secs <= self.max_execution_secs {
            anyhow::bail!(
                "--lock-expire-secs must exceed --max-execution-secs so a straggler tick cannot collide with the next one"
            );
        }
        if self.reaper_period_secs < 60 {
            anyhow::bail!("--reaper-period-secs must be at least 60");
        }
        if self.op_timeout_secs == 0 {
            anyhow::bail!("--op-timeout-secs must be at least 1");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    /// Resolve the runtime settings handed to engine components.
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            namespace: self.namespace.clone(),
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            active_users_ttl: Duration::from_secs(self.active_users_ttl_secs),
            batch_size: self.batch_size,
            max_iterations: self.max_iterations,
            lock_expire: Duration::from_secs(self.lock_expire_secs),
            max_execution: Duration::from_secs(self.max_execution_secs),
            reaper_period: Duration::from_secs(self.reaper_period_secs),
            op_timeout: Duration::from_secs(self.op_timeout_secs),
        }
    }
}

/// Runtime settings consumed by engine components.
///
/// Separate from the CLI surface so tests can build arbitrary values
/// (short TTLs, tiny batches) without going through argument parsing.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub namespace: String,
    pub default_ttl: Duration,
    pub active_users_ttl: Duration,
    pub batch_size: usize,
    pub max_iterations: u32,
    pub lock_expire: Duration,
    pub max_execution: Duration,
    pub reaper_period: Duration,
    pub op_timeout: Duration,
}

impl EngineSettings {
    /// Index keys outlive the slowest participating profile by one day.
    pub fn index_ttl(&self) -> Duration {
        self.default_ttl + Duration::from_secs(86_400)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            namespace: "pulsehub".to_owned(),
            default_ttl: Duration::from_secs(604_800),
            active_users_ttl: Duration::from_secs(86_400),
            batch_size: 1_000,
            max_iterations: 100,
            lock_expire: Duration::from_secs(3_000),
            max_execution: Duration::from_secs(2_700),
            reaper_period: Duration::from_secs(3_600),
            op_timeout: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
