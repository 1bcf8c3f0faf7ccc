//! Configuration and error types for landmark-pair hashing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::MAX_DELTA_FRAMES;

/// Errors returned by the fingerprint generator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Target-zone and fan-out parameters.
///
/// The hash layout itself is fixed (see [`crate::HASH_SCHEME_VERSION`]);
/// these fields only decide which landmark pairs get hashed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Configuration schema version.
    pub version: u32,
    /// Maximum targets paired with each anchor.
    pub fan_out: usize,
    /// Earliest target, in frames after the anchor.
    pub min_delta_frames: u32,
    /// Latest target, in frames after the anchor.
    pub max_delta_frames: u32,
    /// Smallest allowed frequency-bin distance. `1` excludes same-bin pairs.
    pub min_delta_bins: u16,
    /// Largest allowed frequency-bin distance.
    pub max_delta_bins: u16,
    /// Pair anchors on the rayon pool. Output is identical either way.
    pub use_parallel: bool,
}

impl FingerprintConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fan-out. Typical values: 2-8.
    /// Larger fan-out = more hashes per landmark, higher recall, larger index.
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Set the target zone's time extent in frames.
    pub fn with_delta_frames(mut self, min: u32, max: u32) -> Self {
        self.min_delta_frames = min;
        self.max_delta_frames = max;
        self
    }

    /// Set the target zone's frequency extent in bins.
    pub fn with_delta_bins(mut self, min: u16, max: u16) -> Self {
        self.min_delta_bins = min;
        self.max_delta_bins = max;
        self
    }

    pub fn with_parallel(mut self, use_parallel: bool) -> Self {
        self.use_parallel = use_parallel;
        self
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), FingerprintError> {
        if self.version < 1 {
            return Err(FingerprintError::InvalidConfig(format!(
                "version must be >= 1 (got {})",
                self.version
            )));
        }
        if !(1..=16).contains(&self.fan_out) {
            return Err(FingerprintError::InvalidConfig(format!(
                "fan_out must be in 1..=16 (got {})",
                self.fan_out
            )));
        }
        if self.min_delta_frames == 0 {
            return Err(FingerprintError::InvalidConfig(
                "min_delta_frames must be >= 1".into(),
            ));
        }
        if self.max_delta_frames < self.min_delta_frames || self.max_delta_frames > MAX_DELTA_FRAMES
        {
            return Err(FingerprintError::InvalidConfig(format!(
                "max_delta_frames must be in {}..={} (got {})",
                self.min_delta_frames, MAX_DELTA_FRAMES, self.max_delta_frames
            )));
        }
        if self.max_delta_bins < self.min_delta_bins {
            return Err(FingerprintError::InvalidConfig(format!(
                "max_delta_bins {} is below min_delta_bins {}",
                self.max_delta_bins, self.min_delta_bins
            )));
        }
        Ok(())
    }
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            version: 1,
            fan_out: 3,
            min_delta_frames: 1,
            max_delta_frames: 40,
            min_delta_bins: 1,
            max_delta_bins: 128,
            use_parallel: false,
        }
    }
}
