// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pulsehub counter reset` — re-scan the profile primaries with a
//! non-blocking cursor, set the counter to the observed count, and rebuild
//! the expiry index from per-key TTLs.

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::run::Engine;
use crate::store::epoch_ms;

use super::{exit_code_for, EXIT_FAILURE, EXIT_OK};

#[derive(Debug, Serialize)]
pub struct ResetReport {
    pub profiles: u64,
    pub rebuilt_expiry_entries: u64,
}

pub async fn reset(config: &Config) -> i32 {
    let engine = match Engine::from_config(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e}");
            return exit_code_for(&e);
        }
    };
    match run_reset(&engine).await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{json}");
                EXIT_OK
            }
            Err(e) => {
                eprintln!("error: {e}");
                EXIT_FAILURE
            }
        },
        Err(e) => {
            eprintln!("error: {e}");
            exit_code_for(&e)
        }
    }
}

pub async fn run_reset(engine: &Engine) -> Result<ResetReport> {
    let prefix = engine.keys.profile_prefix();
    let keys = engine.store.scan_prefix(&prefix).await?;
    let expiry_index = engine.keys.idx_expiry();
    let now = epoch_ms();

    let mut rebuilt = 0u64;
    for key in &keys {
        let Some(user_id) = key.strip_prefix(prefix.as_str()) else {
            continue;
        };
        // A primary without a TTL is not profile data; skip it.
        let Some(ttl) = engine.store.ttl_remaining(key).await? else {
            continue;
        };
        let expires_at = now + ttl.as_millis() as u64;
        engine.store.zadd(&expiry_index, user_id, expires_at as f64).await?;
        rebuilt += 1;
    }

    engine.store.counter_set(&engine.keys.user_counter(), keys.len() as i64).await?;
    Ok(ResetReport { profiles: keys.len() as u64, rebuilt_expiry_entries: rebuilt })
}
