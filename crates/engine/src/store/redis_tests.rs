// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use deadpool_redis::redis::{ErrorKind as RedisKind, RedisError};

use crate::error::ErrorKind;

use super::{classify, fmt_score};

#[test]
fn busy_and_loading_signals_are_transient() {
    let err = RedisError::from((RedisKind::BusyLoadingError, "loading dataset"));
    assert_eq!(classify(err).kind, ErrorKind::Transient);

    let err = RedisError::from((RedisKind::TryAgain, "try again"));
    assert_eq!(classify(err).kind, ErrorKind::Transient);
}

#[test]
fn io_errors_are_transient() {
    let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
    let err = RedisError::from(io);
    assert_eq!(classify(err).kind, ErrorKind::Transient);
}

#[test]
fn protocol_errors_are_fatal() {
    let err = RedisError::from((RedisKind::TypeError, "wrong type"));
    assert_eq!(classify(err).kind, ErrorKind::Fatal);

    let err = RedisError::from((RedisKind::ResponseError, "wrongtype"));
    assert_eq!(classify(err).kind, ErrorKind::Fatal);
}

#[test]
fn score_bounds_format_like_range_args() {
    assert_eq!(fmt_score(f64::INFINITY), "+inf");
    assert_eq!(fmt_score(f64::NEG_INFINITY), "-inf");
    assert_eq!(fmt_score(1500.0), "1500");
}
