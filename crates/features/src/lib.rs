//! # tunefp Feature Extraction
//!
//! Converts a preprocessed mono signal into a sparse, time-ordered stream of
//! [`Landmark`]s: the spectral points that stand out from their surroundings
//! and survive noise, gain changes and lossy encoding.
//!
//! ## Contract
//!
//! - Input is the output of the preprocessing stage: mono `f32` samples at
//!   a known sample rate.
//! - Output is lazy. [`FeatureExtractor::extract`] validates the signal and
//!   returns a [`LandmarkStream`]; spectra are computed one frame at a time as
//!   the stream is iterated, and [`LandmarkStream::rewind`] restarts it.
//! - Extraction is deterministic: the same samples, rate and
//!   [`FeatureConfig`] always yield bit-identical landmarks.
//!
//! ## Strategies
//!
//! The strategy is a closed set chosen at configuration time
//! ([`ExtractionStrategy`]):
//!
//! 1.  **SpectralPeak**: Hann-windowed FFT magnitudes in dB. A bin becomes a
//!     landmark when it is a local maximum over `peak_neighborhood` bins and
//!     rises `floor_margin_db` above a per-bin adaptive floor. Bins are then
//!     quantized by `freq_quantization`.
//! 2.  **Cepstral**: the same frames folded through a mel filterbank, with a
//!     liftered cepstrum used to recover a smooth spectral envelope. Envelope
//!     maxima become landmarks, indexed by mel band.
//! 3.  **Chroma**: FFT power folded into `bins_per_octave` pitch classes
//!     around a tuning reference. Class maxima, compared around the octave
//!     circle, become landmarks indexed by pitch class.
//!
//! ## Example Usage
//!
//! ```
//! use features::{FeatureConfig, FeatureExtractor};
//!
//! let rate = 8_000;
//! let samples: Vec<f32> = (0..rate * 2)
//!     .map(|i| (2.0 * std::f32::consts::PI * 1_000.0 * i as f32 / rate as f32).sin())
//!     .collect();
//!
//! let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
//! let landmarks: Vec<_> = extractor.extract(&samples, rate as u32).unwrap().collect();
//!
//! assert!(!landmarks.is_empty());
//! assert!(landmarks.iter().all(|l| l.frequency_bin == 64));
//! ```

mod cepstral;
mod chroma;
pub mod config;
mod extractor;
pub mod landmark;
mod peaks;
mod spectrum;
mod stream;

pub use crate::config::{
    CepstralConfig, ChromaConfig, ExtractionStrategy, FeatureConfig, FeatureError,
    InsufficientReason, MAX_FREQUENCY_BIN,
};
pub use crate::extractor::FeatureExtractor;
pub use crate::landmark::Landmark;
pub use crate::stream::LandmarkStream;

/// Current landmark extraction algorithm version.
pub const FEATURE_VERSION: u16 = 1;
