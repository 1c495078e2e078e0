//! Error types for cproject-graph

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the preprocessing (classify + copy) pipeline.
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// Bad pairing rule or exclude pattern. Raised before any I/O.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("source directory does not exist or is not a directory: {}", .0.display())]
    InvalidSource(PathBuf),

    /// Aborts the whole run.
    #[error("disk full: {0}")]
    DiskFull(String),

    /// Recovered locally: recorded in the stats and the run continues.
    #[error("cannot access {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker task failed: {0}")]
    Join(String),
}

impl PreprocessError {
    /// Map an I/O failure on `path` to the taxonomy: ENOSPC is fatal,
    /// everything else is a per-file access error.
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::StorageFull {
            PreprocessError::DiskFull(format!("no space left while writing {}", path.display()))
        } else {
            PreprocessError::FileAccess {
                path: path.to_path_buf(),
                source: err,
            }
        }
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PreprocessError::FileAccess { .. })
    }
}

/// Errors raised by the relation store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("relation store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Errors raised by the relation analyzer.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("project root does not exist or is not a directory: {}", .0.display())]
    InvalidRoot(PathBuf),

    #[error("invalid scanner pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
