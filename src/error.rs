use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No snapshot, process, or history entry matched the request.
    #[error("{0} not found")]
    NotFound(String),

    #[error("need at least {required} snapshots, found {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("snapshot store I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted snapshot exists but could not be decoded.
    #[error("corrupt snapshot {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("a capture is already in progress")]
    CaptureInProgress,

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the storage failures a scheduled capture retries on its next tick.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, Error::Io { .. } | Error::Corrupt { .. })
    }
}
