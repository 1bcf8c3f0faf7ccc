//! Configuration for the preprocessing stage.

use serde::{Deserialize, Serialize};

use crate::denoise::SpectralGate;
use crate::error::PreprocessError;

/// Interpolation used when the input rate differs from the analysis rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResampleQuality {
    /// Cubic polynomial interpolation. Cheap, but aliases when downsampling.
    Fast,
    /// Band-limited sinc interpolation.
    #[default]
    Balanced,
}

/// Preprocessing parameters.
///
/// Changing `target_sample_rate` changes every landmark time and frequency
/// bin, so an index must be built and queried with the same value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Analysis sample rate in Hz.
    pub target_sample_rate: u32,
    /// Subtract the signal mean before any other processing.
    pub remove_dc: bool,
    /// Scale the output so its absolute peak is 1.0.
    pub normalize_peak: bool,
    pub resample_quality: ResampleQuality,
    /// Frames handed to the resampler per call.
    pub resample_chunk: usize,
    /// Spectral gating applied after resampling. Off by default.
    pub spectral_gate: Option<SpectralGate>,
}

impl PreprocessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_sample_rate(mut self, rate: u32) -> Self {
        self.target_sample_rate = rate;
        self
    }

    pub fn with_remove_dc(mut self, remove_dc: bool) -> Self {
        self.remove_dc = remove_dc;
        self
    }

    pub fn with_normalize_peak(mut self, normalize_peak: bool) -> Self {
        self.normalize_peak = normalize_peak;
        self
    }

    pub fn with_resample_quality(mut self, quality: ResampleQuality) -> Self {
        self.resample_quality = quality;
        self
    }

    pub fn with_resample_chunk(mut self, chunk: usize) -> Self {
        self.resample_chunk = chunk;
        self
    }

    pub fn with_spectral_gate(mut self, gate: SpectralGate) -> Self {
        self.spectral_gate = Some(gate);
        self
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), PreprocessError> {
        if self.target_sample_rate < 1_000 {
            return Err(PreprocessError::InvalidConfig(format!(
                "target_sample_rate must be >= 1000 Hz (got {})",
                self.target_sample_rate
            )));
        }
        if !(64..=65_536).contains(&self.resample_chunk) {
            return Err(PreprocessError::InvalidConfig(format!(
                "resample_chunk must be in 64..=65536 (got {})",
                self.resample_chunk
            )));
        }
        if let Some(gate) = &self.spectral_gate {
            gate.validate()?;
        }
        Ok(())
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 8_000,
            remove_dc: true,
            normalize_peak: true,
            resample_quality: ResampleQuality::Balanced,
            resample_chunk: 1024,
            spectral_gate: None,
        }
    }
}
