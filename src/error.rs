// src/error.rs

//! Crate-wide error type for package assembly
//!
//! Validation problems are collected and reported together so a caller
//! can fix a package spec in one round-trip. I/O failures always name
//! the failing path and operation. Invariant violations (declared vs
//! written member size) are a distinct variant because they indicate an
//! internal bug rather than bad user input.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while assembling a package
#[derive(Error, Debug)]
pub enum Error {
    /// Package metadata failed validation. Carries every violation
    /// found, not just the first.
    #[error("invalid package metadata: {}", issues.join("; "))]
    Validation { issues: Vec<String> },

    /// I/O failure, with the failing operation and path named
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    /// A path was requested that no overlay binding provides
    #[error("no overlay binding provides {path}")]
    PathNotFound { path: String },

    /// An auto path must be a directory
    #[error("auto path is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    /// Glob pattern failed to compile
    #[error("invalid glob pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    /// Bytes copied into the outer container do not match the declared
    /// member size. This is an internal invariant violation, not a
    /// user input problem.
    #[error("container member {member}: declared {declared} bytes but wrote {written}")]
    MemberSizeMismatch {
        member: String,
        declared: u64,
        written: u64,
    },
}

impl Error {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
