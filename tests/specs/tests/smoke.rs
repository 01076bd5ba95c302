// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `pulsehub` binary and check
//! the operator CLI surface: output shape and exit codes.

use pulsehub::command::{EXIT_OK, EXIT_STORE_UNAVAILABLE};
use pulsehub_specs::{exit_code, run_pulsehub};

#[test]
fn help_lists_subcommands() -> anyhow::Result<()> {
    let output = run_pulsehub(&["--help"])?;
    assert_eq!(exit_code(&output), 0);
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("reaper"));
    assert!(stdout.contains("counter"));
    Ok(())
}

#[test]
fn reaper_status_on_memory_store() -> anyhow::Result<()> {
    let output = run_pulsehub(&["--store-url", "memory:", "reaper", "status"])?;
    assert_eq!(exit_code(&output), EXIT_OK);

    let status: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(status["running"], false);
    assert_eq!(status["overdue_candidates"], 0);
    assert_eq!(status["current_user_count"], 0);
    assert!(status["next_scheduled_at_ms"].is_number());
    Ok(())
}

#[test]
fn reaper_run_on_memory_store_reports_noop() -> anyhow::Result<()> {
    let output = run_pulsehub(&["--store-url", "memory:", "reaper", "run"])?;
    assert_eq!(exit_code(&output), EXIT_OK);

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(summary["total_expired"], 0);
    assert_eq!(summary["total_candidates"], 0);
    assert_eq!(summary["iterations"], 0);
    Ok(())
}

#[test]
fn counter_reset_on_memory_store() -> anyhow::Result<()> {
    let output = run_pulsehub(&["--store-url", "memory:", "counter", "reset"])?;
    assert_eq!(exit_code(&output), EXIT_OK);

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["profiles"], 0);
    assert_eq!(report["rebuilt_expiry_entries"], 0);
    Ok(())
}

#[test]
fn unreachable_store_exits_with_store_code() -> anyhow::Result<()> {
    // Port 1 refuses connections on any sane host.
    let output =
        run_pulsehub(&["--store-url", "redis://127.0.0.1:1", "reaper", "status"])?;
    assert_eq!(exit_code(&output), EXIT_STORE_UNAVAILABLE);
    Ok(())
}

#[test]
fn invalid_config_fails_fast() -> anyhow::Result<()> {
    let output = run_pulsehub(&["--default-ttl-secs", "10", "reaper", "status"])?;
    assert_eq!(exit_code(&output), 1);
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("default-ttl-secs"));
    Ok(())
}
