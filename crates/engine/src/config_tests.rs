// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use super::Config;

fn parse(args: &[&str]) -> anyhow::Result<Config> {
    let mut full = vec!["pulsehub"];
    full.extend(args);
    Ok(Config::try_parse_from(full)?)
}

#[test]
fn defaults_validate() -> anyhow::Result<()> {
    let config = parse(&[])?;
    config.validate()?;
    assert_eq!(config.default_ttl_secs, 604_800);
    assert_eq!(config.batch_size, 1_000);
    assert_eq!(config.max_iterations, 100);
    Ok(())
}

#[test]
fn ttl_bounds_are_enforced() -> anyhow::Result<()> {
    let config = parse(&["--default-ttl-secs", "59"])?;
    assert!(config.validate().is_err());

    let config = parse(&["--default-ttl-secs", "5184000"])?;
    assert!(config.validate().is_err());

    let config = parse(&["--default-ttl-secs", "3600"])?;
    config.validate()?;
    Ok(())
}

#[test]
fn batch_size_bounds_are_enforced() -> anyhow::Result<()> {
    assert!(parse(&["--batch-size", "0"])?.validate().is_err());
    assert!(parse(&["--batch-size", "10001"])?.validate().is_err());
    parse(&["--batch-size", "10000"])?.validate()?;
    Ok(())
}

#[test]
fn lease_must_outlive_execution_deadline() -> anyhow::Result<()> {
    let config = parse(&["--lock-expire-secs", "100", "--max-execution-secs", "100"])?;
    assert!(config.validate().is_err());

    let config = parse(&["--lock-expire-secs", "101", "--max-execution-secs", "100"])?;
    config.validate()?;
    Ok(())
}

#[test]
fn store_url_scheme_is_checked() -> anyhow::Result<()> {
    assert!(parse(&["--store-url", "http://nope"])?.validate().is_err());
    parse(&["--store-url", "memory:"])?.validate()?;
    parse(&["--store-url", "redis://10.0.0.1:6379/2"])?.validate()?;
    Ok(())
}

#[test]
fn log_format_is_checked() -> anyhow::Result<()> {
    assert!(parse(&["--log-format", "yaml"])?.validate().is_err());
    parse(&["--log-format", "text"])?.validate()?;
    Ok(())
}

#[test]
fn settings_resolve_durations() -> anyhow::Result<()> {
    let settings = parse(&["--default-ttl-secs", "7200", "--op-timeout-secs", "5"])?.settings();
    assert_eq!(settings.default_ttl, Duration::from_secs(7_200));
    assert_eq!(settings.op_timeout, Duration::from_secs(5));
    assert_eq!(settings.index_ttl(), Duration::from_secs(7_200 + 86_400));
    Ok(())
}
