//! Acoustic fingerprinting and recognition.
//!
//! This crate wires the stage crates into one [`Recognizer`]:
//!
//! ```text
//! PCM ─► preprocess ─► features ─► fingerprint ─► index ─► matcher ─► MatchOutcome
//! ```
//!
//! - [`preprocess`] downmixes, removes DC, resamples, optionally gates
//!   stationary noise and peak-normalizes.
//! - [`features`] turns the signal into spectral [`Landmark`]s.
//! - [`fingerprint`] pairs landmarks into 32-bit [`FingerprintHash`]es.
//! - [`index`] stores `(track, anchor time)` postings per hash.
//! - [`matcher`] votes on time deltas and decides which track matched.
//!
//! Complete excerpts go through [`Recognizer::recognize`]. Audio arriving in
//! chunks goes through a [`StreamingSession`], or through
//! [`Recognizer::recognize_stream`] with the `streaming` feature.
//!
//! ## Example
//!
//! ```
//! use tunefp::{PcmAudio, Recognizer, TrackId, TunefpConfig};
//!
//! let rate = 8_000;
//! // 20 seconds of quarter-second tones at scattered pitches.
//! let track: Vec<f32> = (0..rate * 20)
//!     .map(|i| {
//!         let note = (i / 2_000) as u64;
//!         let freq = 300.0 + ((note.wrapping_mul(2_654_435_761) >> 5) % 2_400) as f32;
//!         0.6 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin()
//!     })
//!     .collect();
//!
//! let recognizer = Recognizer::in_memory(&TunefpConfig::default()).unwrap();
//! recognizer
//!     .ingest(TrackId(7), PcmAudio::mono(&track, rate as u32), false)
//!     .unwrap();
//!
//! let excerpt = &track[rate * 5..rate * 15];
//! let outcome = recognizer.recognize(PcmAudio::mono(excerpt, rate as u32)).unwrap();
//! let result = outcome.result().unwrap();
//! assert_eq!(result.track_id, TrackId(7));
//! assert!(result.time_offset_ms.abs_diff(5_000) <= 100);
//! ```

mod cancel;
pub mod config;
mod error;
pub mod metrics;
mod pipeline;
pub mod streaming;

pub use features::{
    CepstralConfig, ChromaConfig, ExtractionStrategy, FeatureConfig, FeatureError,
    FeatureExtractor, InsufficientReason, Landmark,
};
pub use fingerprint::{
    FingerprintConfig, FingerprintError, FingerprintGenerator, FingerprintHash, HashedLandmark,
    QueryFingerprintSet,
};
pub use index::{
    CompactionReport, FingerprintIndex, IndexConfig, IndexError, IndexStats, InsertReport,
    TrackId, PROFILE_FIELD,
};
pub use matcher::{
    AmbiguousMatch, Candidate, MatchConfig, MatchError, MatchOutcome, MatchScorer,
    RecognitionResult, ScoreReport,
};
pub use preprocess::{PcmAudio, PreprocessConfig, PreprocessError, ResampleQuality, SpectralGate};

pub use crate::cancel::CancelToken;
pub use crate::config::{ConfigLoadError, TunefpConfig};
pub use crate::error::PipelineError;
pub use crate::metrics::RecognitionMetrics;
pub use crate::pipeline::{BatchIngestReport, IngestJob, Recognizer, RecognizerStats};
pub use crate::streaming::{
    StreamConfig, StreamError, StreamOutcome, StreamState, StreamingSession,
};
