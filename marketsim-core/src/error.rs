use std::path::PathBuf;
use thiserror::Error;

/// Failure loading economy defines.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read defines from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed defines: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Structural problem found by `WorldState::validate`.
#[derive(Error, Debug, PartialEq)]
pub enum WorldError {
    #[error("{table} row {row} references missing {target} {id}")]
    DanglingKey {
        table: &'static str,
        row: usize,
        target: &'static str,
        id: u32,
    },
    #[error("{table} column has {actual} entries, expected {expected}")]
    LengthMismatch {
        table: &'static str,
        expected: usize,
        actual: usize,
    },
}
