//! # tunefp Preprocessing
//!
//! Turns decoded PCM at an arbitrary sample rate and channel layout into the
//! canonical signal every later stage consumes: mono, DC-free, resampled to
//! the analysis rate and peak-normalized. An opt-in [`SpectralGate`] strips
//! stationary noise before normalization.
//!
//! ## Contract
//!
//! - Input is already decoded. Container demuxing and codecs live outside
//!   this crate.
//! - [`preprocess`] is a pure function of `(audio, config)`. No I/O, no
//!   global state; the same input and config always yield the same samples.
//! - Time zero is preserved: sample `i` of the output corresponds to
//!   `i / target_sample_rate` seconds of the input.
//!
//! ## Example Usage
//!
//! ```
//! use preprocess::{preprocess, PcmAudio, PreprocessConfig};
//!
//! // 100 ms of interleaved stereo at 16 kHz
//! let stereo: Vec<f32> = (0..3200).map(|i| ((i / 2) as f32 * 0.05).sin() * 0.5).collect();
//! let audio = PcmAudio::new(&stereo, 16_000, 2);
//!
//! let cfg = PreprocessConfig::default().with_target_sample_rate(8_000);
//! let mono = preprocess(audio, &cfg).unwrap();
//!
//! assert_eq!(mono.len(), 800);
//! ```

pub mod audio;
pub mod config;
mod denoise;
mod error;
mod pipeline;
mod resample;

pub use crate::audio::PcmAudio;
pub use crate::config::{PreprocessConfig, ResampleQuality};
pub use crate::denoise::{spectral_gate, SpectralGate};
pub use crate::error::PreprocessError;
pub use crate::pipeline::{downmix, normalize_peak, preprocess, remove_dc};
pub use crate::resample::resample;
