use std::error::Error;
use std::fmt;

use features::FeatureError;
use fingerprint::FingerprintError;
use index::{IndexError, TrackId};
use matcher::MatchError;
use preprocess::PreprocessError;

use crate::streaming::StreamError;

/// Errors that can occur while fingerprinting, ingesting or recognizing audio.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    Preprocess(PreprocessError),
    Features(FeatureError),
    Fingerprint(FingerprintError),
    Index(IndexError),
    Match(MatchError),
    Stream(StreamError),
    /// The track produced landmarks but no landmark pairs, so there is
    /// nothing to index.
    NoHashes { track_id: TrackId },
}

impl PipelineError {
    /// The audio was too short, silent or otherwise too sparse to fingerprint.
    pub fn is_insufficient_signal(&self) -> bool {
        matches!(
            self,
            PipelineError::Features(FeatureError::InsufficientSignal(_))
                | PipelineError::NoHashes { .. }
        )
    }

    pub fn is_duplicate_track(&self) -> bool {
        matches!(self, PipelineError::Index(IndexError::DuplicateTrack { .. }))
    }

    pub fn is_version_mismatch(&self) -> bool {
        matches!(
            self,
            PipelineError::Index(IndexError::VersionMismatch { .. })
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Preprocess(err) => write!(f, "preprocessing failed: {err}"),
            PipelineError::Features(err) => write!(f, "feature extraction failed: {err}"),
            PipelineError::Fingerprint(err) => write!(f, "fingerprinting failed: {err}"),
            PipelineError::Index(err) => write!(f, "index operation failed: {err}"),
            PipelineError::Match(err) => write!(f, "matching failed: {err}"),
            PipelineError::Stream(err) => write!(f, "streaming failed: {err}"),
            PipelineError::NoHashes { track_id } => {
                write!(f, "track {track_id} produced no fingerprint hashes")
            }
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Preprocess(err) => Some(err),
            PipelineError::Features(err) => Some(err),
            PipelineError::Fingerprint(err) => Some(err),
            PipelineError::Index(err) => Some(err),
            PipelineError::Match(err) => Some(err),
            PipelineError::Stream(err) => Some(err),
            PipelineError::NoHashes { .. } => None,
        }
    }
}

impl From<PreprocessError> for PipelineError {
    fn from(value: PreprocessError) -> Self {
        PipelineError::Preprocess(value)
    }
}

impl From<FeatureError> for PipelineError {
    fn from(value: FeatureError) -> Self {
        PipelineError::Features(value)
    }
}

impl From<FingerprintError> for PipelineError {
    fn from(value: FingerprintError) -> Self {
        PipelineError::Fingerprint(value)
    }
}

impl From<IndexError> for PipelineError {
    fn from(value: IndexError) -> Self {
        PipelineError::Index(value)
    }
}

impl From<MatchError> for PipelineError {
    fn from(value: MatchError) -> Self {
        PipelineError::Match(value)
    }
}

impl From<StreamError> for PipelineError {
    fn from(value: StreamError) -> Self {
        PipelineError::Stream(value)
    }
}
