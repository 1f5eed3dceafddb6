// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Error taxonomy for the aggregation engine.
//!
//! Consensus with the rest of the crate: errors during ingest are
//! fatal and must abort before any parallel work begins; errors during
//! per-cube aggregation are reported and do not stop sibling cubes;
//! `PTableLookupMiss` is explicitly not an error path (it resolves to
//! `ck = 0`, see [`crate::ptable::PTable::lookup`]).

use std::fmt;

/// Everything that can go wrong in the aggregation engine.
#[derive(Debug)]
pub enum Error {
    /// The configuration file was missing, unreadable or failed to
    /// deserialize into the expected shape.
    ConfigMissingOrMalformed(String),

    /// A microdata line could not be read (I/O failure, not a parse
    /// failure).
    MicroReadError(std::io::Error),

    /// A P-table record could not be parsed from its source stream.
    PTableReadError(String),

    /// A record's field count or field type did not match the schema.
    SchemaMismatch {
        /// What was expected.
        expected: String,
        /// What was found.
        actual: String,
    },

    /// A legitimate observed value collided with its type's total-code,
    /// violating the precondition in spec.md §3.
    TotalCodeCollision {
        /// The column index (1-based, excluding the record id).
        column: usize,
        /// The colliding value, rendered for diagnostics.
        value: String,
    },

    /// Writing a cube or traversing file failed.
    OutputWriteError(std::io::Error),

    /// A distribution worker could not be reached.
    WorkerUnreachable {
        /// The hostname that failed to respond.
        host: String,
        /// The underlying transport failure.
        reason: String,
    },

    /// An on-disk cube file could not be parsed during read-back.
    CubeReadError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigMissingOrMalformed(msg) => {
                write!(f, "config missing or malformed: {msg}")
            }
            Self::MicroReadError(e) => write!(f, "microdata read error: {e}"),
            Self::PTableReadError(msg) => write!(f, "p-table read error: {msg}"),
            Self::SchemaMismatch { expected, actual } => {
                write!(f, "schema mismatch: expected {expected}, got {actual}")
            }
            Self::TotalCodeCollision { column, value } => write!(
                f,
                "total-code collision at column {column}: value {value} equals its type's total-code"
            ),
            Self::OutputWriteError(e) => write!(f, "output write error: {e}"),
            Self::WorkerUnreachable { host, reason } => {
                write!(f, "worker {host} unreachable: {reason}")
            }
            Self::CubeReadError(msg) => write!(f, "cube read error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MicroReadError(e) | Self::OutputWriteError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::OutputWriteError(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::ConfigMissingOrMalformed(value.to_string())
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
