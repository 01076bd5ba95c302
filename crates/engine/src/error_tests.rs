// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{is_transient_message, EngineError, ErrorKind};

#[test]
fn kind_strings_are_stable() {
    assert_eq!(ErrorKind::InvalidArgument.as_str(), "INVALID_ARGUMENT");
    assert_eq!(ErrorKind::NotFound.as_str(), "NOT_FOUND");
    assert_eq!(ErrorKind::Conflict.as_str(), "CONFLICT");
    assert_eq!(ErrorKind::Transient.as_str(), "TRANSIENT");
    assert_eq!(ErrorKind::Fatal.as_str(), "FATAL");
}

#[test]
fn only_transient_is_retriable() {
    assert!(ErrorKind::Transient.is_retriable());
    assert!(!ErrorKind::InvalidArgument.is_retriable());
    assert!(!ErrorKind::NotFound.is_retriable());
    assert!(!ErrorKind::Conflict.is_retriable());
    assert!(!ErrorKind::Fatal.is_retriable());
}

#[test]
fn display_includes_kind_and_message() {
    let err = EngineError::invalid("user id must not be empty");
    assert_eq!(err.to_string(), "INVALID_ARGUMENT: user id must not be empty");
}

#[test]
fn store_message_classification() {
    assert_eq!(
        EngineError::from_store_message("Connection refused (os error 111)").kind,
        ErrorKind::Transient
    );
    assert_eq!(EngineError::from_store_message("read timed out").kind, ErrorKind::Transient);
    assert_eq!(
        EngineError::from_store_message("BUSY Redis is busy running a script").kind,
        ErrorKind::Transient
    );
    assert_eq!(
        EngineError::from_store_message("LOADING Redis is loading the dataset").kind,
        ErrorKind::Transient
    );
    assert_eq!(
        EngineError::from_store_message("WRONGTYPE Operation against a key").kind,
        ErrorKind::Fatal
    );
}

#[test]
fn transient_markers_are_case_insensitive() {
    assert!(is_transient_message("TIMEOUT waiting for response"));
    assert!(is_transient_message("server Overloaded"));
    assert!(!is_transient_message("no such script"));
}

#[test]
fn kind_serializes_screaming_snake() -> anyhow::Result<()> {
    assert_eq!(serde_json::to_string(&ErrorKind::InvalidArgument)?, "\"INVALID_ARGUMENT\"");
    let kind: ErrorKind = serde_json::from_str("\"TRANSIENT\"")?;
    assert_eq!(kind, ErrorKind::Transient);
    Ok(())
}
