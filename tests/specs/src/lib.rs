// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Runs the real `pulsehub` binary as a subprocess and checks the operator
//! CLI surface: output shape and exit codes, against an in-process store or
//! an unreachable one.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Resolve the path to the compiled `pulsehub` binary.
pub fn pulsehub_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("pulsehub")
}

/// Run the binary with the given arguments and capture its output.
pub fn run_pulsehub(args: &[&str]) -> anyhow::Result<Output> {
    let binary = pulsehub_binary();
    anyhow::ensure!(binary.exists(), "pulsehub binary not found at {}", binary.display());

    // Top-level config flags must precede the subcommand tokens.
    let output = Command::new(&binary)
        .args(["--log-format", "text", "--log-level", "warn"])
        .args(args)
        .env_remove("PULSEHUB_STORE_URL")
        .env_remove("PULSEHUB_NATS_URL")
        .output()?;
    Ok(output)
}

/// Exit code of a finished process, `-1` when killed by a signal.
pub fn exit_code(output: &Output) -> i32 {
    output.status.code().unwrap_or(-1)
}
