use thiserror::Error;

use crate::types::TrackId;

/// Errors returned by the fingerprint index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("track {track_id} is already indexed")]
    DuplicateTrack { track_id: TrackId },
    #[error("track {track_id} has no postings")]
    EmptyPostings { track_id: TrackId },
    #[error("index {field} mismatch: expected {expected:#x}, found {found:#x}")]
    VersionMismatch {
        field: &'static str,
        expected: u64,
        found: u64,
    },
    #[error("corrupt index: {0}")]
    Corrupt(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Io(e.to_string())
    }
}

impl IndexError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}
