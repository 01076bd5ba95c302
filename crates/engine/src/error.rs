// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error kinds shared by engine operations and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input: empty user id, non-positive count, bad mapping target.
    InvalidArgument,
    /// A key was required to exist and did not.
    NotFound,
    /// Optimistic-version mismatch or a uniqueness violation.
    Conflict,
    /// Store connection/timeout/load signal. Safe to retry with backoff.
    Transient,
    /// Corruption, unsupported schema, or a missing store primitive. Never retried.
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Transient => "TRANSIENT",
            Self::Fatal => "FATAL",
        }
    }

    /// Whether an operation failing with this kind may be retried.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine error: a kind plus a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Classify a raw store-client message into `Transient` or `Fatal`.
    ///
    /// Used for error sources that expose no typed kind. Connection, timeout,
    /// and load-shedding signals are retriable; everything else is not.
    pub fn from_store_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_transient_message(&message) {
            Self::transient(message)
        } else {
            Self::fatal(message)
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for EngineError {}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Substrings that mark a store failure as retriable.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection",
    "timeout",
    "timed out",
    "socket",
    "busy",
    "loading",
    "overload",
    "unavailable",
    "broken pipe",
];

/// Whether a raw error message looks like a transient transport/load failure.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
