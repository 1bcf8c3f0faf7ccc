use thiserror::Error;

/// Errors that can occur while preparing audio for analysis.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PreprocessError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("sample rate must be non-zero (got {0})")]
    InvalidSampleRate(u32),
    #[error("channel count must be non-zero (got {0})")]
    InvalidChannelCount(u16),
    #[error("{samples} samples do not divide into {channels} channels")]
    MisalignedFrames { samples: usize, channels: u16 },
    #[error("non-finite sample at index {index}")]
    NonFiniteSample { index: usize },
    #[error("resampling failed: {0}")]
    Resample(String),
}
