use std::path::PathBuf;

use thiserror::Error;

use crate::measurements::TransferStatistics;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot open source {}: {source}", .path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transfer aborted after {} bytes: {source}", .partial.total_bytes)]
    Transfer {
        partial: TransferStatistics,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Counters for the bytes already moved, if the error happened mid-pass.
    pub fn partial_statistics(&self) -> Option<TransferStatistics> {
        match self {
            Error::Transfer { partial, .. } => Some(*partial),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
