// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pulsehub reaper` — status query and operator-triggered runs.

use crate::config::Config;
use crate::reaper::TickOutcome;
use crate::run::Engine;

use super::{exit_code_for, EXIT_CANCELLED, EXIT_FAILURE, EXIT_LEASE_HELD, EXIT_OK};

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            EXIT_OK
        }
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_FAILURE
        }
    }
}

/// Print the reaper status as JSON.
pub async fn status(config: &Config) -> i32 {
    let engine = match Engine::from_config(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e}");
            return exit_code_for(&e);
        }
    };
    match engine.reaper.status().await {
        Ok(status) => print_json(&status),
        Err(e) => {
            eprintln!("error: {e}");
            exit_code_for(&e)
        }
    }
}

/// Trigger one reconciliation tick under the manual lease key.
pub async fn run_manual(config: &Config) -> i32 {
    let engine = match Engine::from_config(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e}");
            return exit_code_for(&e);
        }
    };
    tokio::select! {
        outcome = engine.reaper.run_manual() => match outcome {
            TickOutcome::Completed(summary) => print_json(&summary),
            TickOutcome::Skipped => {
                eprintln!("reaper lease is held elsewhere; nothing ran");
                EXIT_LEASE_HELD
            }
            TickOutcome::Failed(e) => {
                eprintln!("error: {e}");
                exit_code_for(&e)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("cancelled");
            EXIT_CANCELLED
        }
    }
}
