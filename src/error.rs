//! Typed errors for the component seams.
//!
//! Command handlers work in `anyhow::Result`; the components below return
//! these enums so the driver can tell a per-file failure from a run-level one.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn one raw source file into a unified table. Fatal for that
/// file only.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Reading {path:?}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("{path:?} has no header row at line {line}")]
    MissingHeader { path: PathBuf, line: usize },
    #[error("{path:?}: required column '{column}' (raw column {index}) not found; header has {width} column(s)")]
    MissingColumn {
        path: PathBuf,
        column: String,
        index: usize,
        width: usize,
    },
}

#[derive(Debug, Error)]
pub enum DedupeError {
    #[error("Column '{0}' not found")]
    MissingColumn(String),
}

/// Structural failure while building the consolidated table. Fatal for the run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{stage}: column '{column}' not found")]
    MissingColumn { stage: String, column: String },
    #[error("{stage}: row {row} has no meter id")]
    MissingKey { stage: String, row: usize },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Encoding cache entry: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}
