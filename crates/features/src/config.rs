//! Configuration and error types for landmark extraction.
//!
//! The extractor is a pure function of `(samples, sample_rate, config)`. Any
//! change to a field here changes which landmarks are produced, so indexes
//! must be built and queried with identical configs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest quantized frequency bin that fits the 10-bit hash field.
pub const MAX_FREQUENCY_BIN: usize = 1023;

/// Why a signal was rejected as unusable for extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InsufficientReason {
    /// Fewer samples than one analysis window.
    TooShort { samples: usize, window: usize },
    /// Overall RMS below the silence threshold.
    Silent { rms: f32 },
}

/// Errors returned by the feature extractor.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeatureError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("sample rate must be non-zero")]
    InvalidSampleRate,
    #[error("insufficient signal: {0:?}")]
    InsufficientSignal(InsufficientReason),
}

/// Parameters of the cepstral envelope strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CepstralConfig {
    /// Number of triangular mel filters between the frequency limits.
    pub mel_bands: usize,
    /// Cepstral coefficients kept by the lifter (c0 is always dropped).
    pub coefficients: usize,
    /// Rise above the adaptive floor required for an envelope peak, in dB.
    pub floor_margin_db: f32,
}

impl Default for CepstralConfig {
    fn default() -> Self {
        Self {
            mel_bands: 48,
            coefficients: 16,
            floor_margin_db: 6.0,
        }
    }
}

/// Parameters of the chroma strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChromaConfig {
    /// Pitch classes per octave. `12` gives one class per semitone.
    pub bins_per_octave: usize,
    /// Tuning reference. Pitch class 0 is centred on this frequency.
    pub reference_hz: f32,
    /// Rise above the adaptive floor required for a chroma peak, in dB.
    pub floor_margin_db: f32,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            bins_per_octave: 12,
            reference_hz: 440.0,
            floor_margin_db: 6.0,
        }
    }
}

/// Landmark selection strategy, fixed when the extractor is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Local maxima of the FFT magnitude spectrum.
    #[default]
    SpectralPeak,
    /// Local maxima of a liftered mel-cepstrum spectral envelope.
    Cepstral(CepstralConfig),
    /// Local maxima of the spectrum folded into pitch classes. A note and
    /// its octaves share one landmark bin.
    Chroma(ChromaConfig),
}

/// Analysis parameters shared by every strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureConfig {
    /// Configuration schema version.
    pub version: u32,
    /// FFT length in samples.
    pub window_size: usize,
    /// Distance between consecutive frame starts in samples.
    pub hop_size: usize,
    /// FFT bins merged into one landmark frequency bin.
    ///
    /// Coarser quantization trades frequency precision for tolerance to
    /// noise and small pitch drift.
    pub freq_quantization: usize,
    /// Lowest frequency considered for peaks, in Hz.
    pub min_frequency_hz: f32,
    /// Highest frequency considered for peaks, in Hz.
    pub max_frequency_hz: f32,
    /// A peak must dominate this many bins on each side.
    pub peak_neighborhood: usize,
    /// Per-frame weight kept by the adaptive floor (`0.0` = no memory).
    pub floor_decay: f32,
    /// Rise above the adaptive floor required for a spectral peak, in dB.
    pub floor_margin_db: f32,
    /// Absolute level gate in dBFS.
    pub min_level_db: f32,
    pub max_peaks_per_frame: usize,
    /// Whole-signal RMS below which the input is considered silent.
    pub silence_rms: f32,
    pub strategy: ExtractionStrategy,
}

impl FeatureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, window_size: usize, hop_size: usize) -> Self {
        self.window_size = window_size;
        self.hop_size = hop_size;
        self
    }

    pub fn with_freq_quantization(mut self, q: usize) -> Self {
        self.freq_quantization = q;
        self
    }

    pub fn with_frequency_range(mut self, min_hz: f32, max_hz: f32) -> Self {
        self.min_frequency_hz = min_hz;
        self.max_frequency_hz = max_hz;
        self
    }

    pub fn with_floor(mut self, decay: f32, margin_db: f32) -> Self {
        self.floor_decay = decay;
        self.floor_margin_db = margin_db;
        self
    }

    pub fn with_max_peaks_per_frame(mut self, max: usize) -> Self {
        self.max_peaks_per_frame = max;
        self
    }

    pub fn with_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Frame duration in milliseconds at `sample_rate`.
    pub fn hop_ms(&self, sample_rate: u32) -> f64 {
        self.hop_size as f64 * 1000.0 / sample_rate.max(1) as f64
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), FeatureError> {
        let invalid = |msg: String| Err(FeatureError::InvalidConfig(msg));

        if self.version < 1 {
            return invalid(format!("version must be >= 1 (got {})", self.version));
        }
        if self.window_size < 64 {
            return invalid(format!(
                "window_size must be >= 64 (got {})",
                self.window_size
            ));
        }
        if self.hop_size == 0 || self.hop_size > self.window_size {
            return invalid(format!(
                "hop_size must be in 1..=window_size (got {})",
                self.hop_size
            ));
        }
        if self.freq_quantization == 0 {
            return invalid("freq_quantization must be >= 1".into());
        }
        if (self.window_size / 2) / self.freq_quantization > MAX_FREQUENCY_BIN {
            return invalid(format!(
                "window_size {} with freq_quantization {} exceeds {} frequency bins",
                self.window_size, self.freq_quantization, MAX_FREQUENCY_BIN
            ));
        }
        if !(self.min_frequency_hz >= 0.0 && self.max_frequency_hz > self.min_frequency_hz) {
            return invalid(format!(
                "frequency range {}..{} Hz is empty",
                self.min_frequency_hz, self.max_frequency_hz
            ));
        }
        if self.peak_neighborhood == 0 {
            return invalid("peak_neighborhood must be >= 1".into());
        }
        if !(0.0..1.0).contains(&self.floor_decay) {
            return invalid(format!(
                "floor_decay must be in [0, 1) (got {})",
                self.floor_decay
            ));
        }
        if !(self.floor_margin_db >= 0.0) {
            return invalid("floor_margin_db must be >= 0".into());
        }
        if self.max_peaks_per_frame == 0 {
            return invalid("max_peaks_per_frame must be >= 1".into());
        }
        if !(self.silence_rms >= 0.0) {
            return invalid("silence_rms must be >= 0".into());
        }

        if let ExtractionStrategy::Cepstral(cep) = &self.strategy {
            if !(8..=MAX_FREQUENCY_BIN).contains(&cep.mel_bands) {
                return invalid(format!(
                    "mel_bands must be in 8..={} (got {})",
                    MAX_FREQUENCY_BIN, cep.mel_bands
                ));
            }
            if cep.coefficients == 0 || cep.coefficients >= cep.mel_bands {
                return invalid(format!(
                    "coefficients must be in 1..{} (got {})",
                    cep.mel_bands, cep.coefficients
                ));
            }
            if !(cep.floor_margin_db >= 0.0) {
                return invalid("cepstral floor_margin_db must be >= 0".into());
            }
        }

        if let ExtractionStrategy::Chroma(chroma) = &self.strategy {
            if !(12..=96).contains(&chroma.bins_per_octave) {
                return invalid(format!(
                    "bins_per_octave must be in 12..=96 (got {})",
                    chroma.bins_per_octave
                ));
            }
            if !(chroma.reference_hz.is_finite() && chroma.reference_hz > 0.0) {
                return invalid(format!(
                    "reference_hz must be positive (got {})",
                    chroma.reference_hz
                ));
            }
            if !(chroma.floor_margin_db >= 0.0) {
                return invalid("chroma floor_margin_db must be >= 0".into());
            }
        }

        Ok(())
    }

    /// Check the parts of the config that depend on the input rate.
    pub fn validate_for_rate(&self, sample_rate: u32) -> Result<(), FeatureError> {
        if sample_rate == 0 {
            return Err(FeatureError::InvalidSampleRate);
        }
        let nyquist = sample_rate as f32 / 2.0;
        if self.min_frequency_hz >= nyquist {
            return Err(FeatureError::InvalidConfig(format!(
                "min_frequency_hz {} is above the Nyquist frequency {} Hz",
                self.min_frequency_hz, nyquist
            )));
        }
        Ok(())
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            version: 1,
            window_size: 1024,
            hop_size: 400,
            freq_quantization: 2,
            min_frequency_hz: 100.0,
            max_frequency_hz: 3_800.0,
            peak_neighborhood: 3,
            floor_decay: 0.6,
            floor_margin_db: 10.0,
            min_level_db: -70.0,
            max_peaks_per_frame: 5,
            silence_rms: 1e-4,
            strategy: ExtractionStrategy::SpectralPeak,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(FeatureConfig::default().validate().is_ok());
        let cep = FeatureConfig::default()
            .with_strategy(ExtractionStrategy::Cepstral(CepstralConfig::default()));
        assert!(cep.validate().is_ok());
    }

    #[test]
    fn rejects_hop_larger_than_window() {
        let cfg = FeatureConfig::new().with_window(512, 1024);
        assert!(matches!(
            cfg.validate(),
            Err(FeatureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_bins_beyond_hash_width() {
        let cfg = FeatureConfig::new()
            .with_window(8192, 1024)
            .with_freq_quantization(1);
        assert!(cfg.validate().is_err());
        assert!(cfg.with_freq_quantization(4).validate().is_ok());
    }

    #[test]
    fn rejects_bad_floor() {
        assert!(FeatureConfig::new().with_floor(1.0, 10.0).validate().is_err());
        assert!(FeatureConfig::new().with_floor(0.5, -1.0).validate().is_err());
    }

    #[test]
    fn rejects_lifter_wider_than_filterbank() {
        let cfg = FeatureConfig::new().with_strategy(ExtractionStrategy::Cepstral(CepstralConfig {
            mel_bands: 16,
            coefficients: 16,
            floor_margin_db: 6.0,
        }));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_chroma_layout() {
        let chroma = |bins_per_octave, reference_hz| {
            FeatureConfig::new().with_strategy(ExtractionStrategy::Chroma(ChromaConfig {
                bins_per_octave,
                reference_hz,
                ..ChromaConfig::default()
            }))
        };
        assert!(chroma(12, 440.0).validate().is_ok());
        assert!(chroma(36, 432.0).validate().is_ok());
        assert!(chroma(6, 440.0).validate().is_err());
        assert!(chroma(12, 0.0).validate().is_err());
        assert!(chroma(12, f32::NAN).validate().is_err());
    }

    #[test]
    fn chroma_strategy_reads_from_yaml_shape() {
        let json = serde_json::json!({ "strategy": { "type": "chroma", "bins_per_octave": 24 } });
        let cfg: FeatureConfig = serde_json::from_value(json).unwrap();
        assert_eq!(
            cfg.strategy,
            ExtractionStrategy::Chroma(ChromaConfig {
                bins_per_octave: 24,
                ..ChromaConfig::default()
            })
        );
    }

    #[test]
    fn strategy_serializes_with_tag() {
        let cfg = FeatureConfig::new()
            .with_strategy(ExtractionStrategy::Cepstral(CepstralConfig::default()));
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["strategy"]["type"], "cepstral");
        assert_eq!(json["strategy"]["mel_bands"], 48);
        let back: FeatureConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn hop_ms_at_analysis_rate() {
        assert_eq!(FeatureConfig::default().hop_ms(8_000), 50.0);
    }
}
