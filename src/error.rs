//! Error types for codeloop plumbing.
//!
//! Run-level failures live in [`crate::agent::RunError`] and sandbox failures in
//! [`crate::sandbox::ExecutionError`]; this type covers configuration, IO and
//! worker transport problems surfaced to the binary.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::ModelError;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file has an extension we cannot parse.
    #[error("unsupported configuration format: {0}")]
    UnsupportedConfigFormat(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Model service failure outside of a run.
    #[error("model service error: {0}")]
    Model(#[from] ModelError),

    /// The sandbox worker could not be started or stopped responding.
    #[error("sandbox worker error: {0}")]
    Worker(String),

    /// A worker message could not be encoded or decoded.
    #[error("worker protocol error: {0}")]
    Protocol(String),

    /// The run request was rejected before starting.
    #[error("invalid run request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for codeloop operations.
pub type Result<T> = std::result::Result<T, Error>;
