//! YAML configuration for the whole recognition pipeline.
//!
//! Every stage reads its section into the stage's own config type, so a YAML
//! file can set any field those types expose. Missing sections and missing
//! fields fall back to the stage defaults.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "radio-monitor"
//!
//! preprocess:
//!   target_sample_rate: 8000
//!   resample_quality: balanced
//!
//! features:
//!   window_size: 1024
//!   hop_size: 400
//!   freq_quantization: 2
//!   strategy:
//!     type: spectral_peak
//!
//! fingerprint:
//!   fan_out: 3
//!   max_delta_frames: 40
//!
//! index:
//!   max_segments: 8
//!
//! matcher:
//!   delta_bucket_ms: 100
//!   min_matched_hashes: 10
//!   min_margin_ratio: 1.5
//!
//! streaming:
//!   min_analysis_ms: 4000
//!   max_listen_ms: 30000
//!   input_sample_rate: 44100
//!   input_channels: 2
//! ```

use std::fs;
use std::path::Path;

use features::{ExtractionStrategy, FeatureConfig, FEATURE_VERSION};
use fingerprint::{FingerprintConfig, HASH_SCHEME_VERSION};
use index::IndexConfig;
use matcher::MatchConfig;
use preprocess::PreprocessConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

use crate::streaming::StreamConfig;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration for every pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TunefpConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub preprocess: PreprocessConfig,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub matcher: MatchConfig,

    #[serde(default)]
    pub streaming: StreamConfig,
}

impl TunefpConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: TunefpConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigLoadError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the version, every stage section and the cross-stage
    /// invariants.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        let section = |name: &str, err: &dyn std::fmt::Display| {
            ConfigLoadError::Validation(format!("{name}: {err}"))
        };
        self.preprocess
            .validate()
            .map_err(|e| section("preprocess", &e))?;
        self.features
            .validate()
            .map_err(|e| section("features", &e))?;
        self.fingerprint
            .validate()
            .map_err(|e| section("fingerprint", &e))?;
        self.index.validate().map_err(|e| section("index", &e))?;
        self.matcher.validate().map_err(|e| section("matcher", &e))?;
        self.streaming
            .validate()
            .map_err(|e| section("streaming", &e))?;

        // Landmarks are computed at the preprocessor's output rate.
        self.features
            .validate_for_rate(self.preprocess.target_sample_rate)
            .map_err(|e| section("features", &e))?;
        Ok(())
    }
}

impl TunefpConfig {
    /// Digest of every setting that changes what a stored hash means.
    ///
    /// Covers the analysis rate, framing, frequency range and quantization,
    /// the landmark strategy and its band layout, the target zone and the
    /// hash layout version. Peak-picking thresholds, fan-out and everything
    /// outside extraction and pairing only change which hashes exist, so
    /// they are left out: an index stays usable while those are retuned.
    pub fn hash_profile(&self) -> u64 {
        let features = &self.features;
        let pairing = &self.fingerprint;
        let mut buf = Vec::with_capacity(96);
        buf.extend_from_slice(&HASH_SCHEME_VERSION.to_le_bytes());
        buf.extend_from_slice(&FEATURE_VERSION.to_le_bytes());
        buf.extend_from_slice(&features.version.to_le_bytes());
        buf.extend_from_slice(&pairing.version.to_le_bytes());
        buf.extend_from_slice(&self.preprocess.target_sample_rate.to_le_bytes());
        for value in [features.window_size, features.hop_size, features.freq_quantization] {
            buf.extend_from_slice(&(value as u64).to_le_bytes());
        }
        buf.extend_from_slice(&features.min_frequency_hz.to_bits().to_le_bytes());
        buf.extend_from_slice(&features.max_frequency_hz.to_bits().to_le_bytes());
        match &features.strategy {
            ExtractionStrategy::SpectralPeak => buf.push(0),
            ExtractionStrategy::Cepstral(cep) => {
                buf.push(1);
                buf.extend_from_slice(&(cep.mel_bands as u64).to_le_bytes());
                buf.extend_from_slice(&(cep.coefficients as u64).to_le_bytes());
            }
            ExtractionStrategy::Chroma(chroma) => {
                buf.push(2);
                buf.extend_from_slice(&(chroma.bins_per_octave as u64).to_le_bytes());
                buf.extend_from_slice(&chroma.reference_hz.to_bits().to_le_bytes());
            }
        }
        buf.extend_from_slice(&pairing.min_delta_frames.to_le_bytes());
        buf.extend_from_slice(&pairing.max_delta_frames.to_le_bytes());
        buf.extend_from_slice(&pairing.min_delta_bins.to_le_bytes());
        buf.extend_from_slice(&pairing.max_delta_bins.to_le_bytes());
        xxh3_64(&buf)
    }
}

impl Default for TunefpConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            preprocess: PreprocessConfig::default(),
            features: FeatureConfig::default(),
            fingerprint: FingerprintConfig::default(),
            index: IndexConfig::default(),
            matcher: MatchConfig::default(),
            streaming: StreamConfig::default(),
        }
    }
}
