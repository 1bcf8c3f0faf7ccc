//! # tunefp Fingerprint Generation
//!
//! Combinatorial hashing of landmark pairs. Each landmark acts as an anchor
//! and is paired with up to `fan_out` later landmarks from its target zone;
//! every pair becomes one [`FingerprintHash`] tagged with the anchor's time.
//!
//! A single landmark says little, but a pair of frequencies with a fixed time
//! gap between them is specific enough to look up, and survives noise as
//! long as both of its landmarks do.
//!
//! ## Contract
//!
//! - Input is a time-ordered landmark sequence from the feature extractor.
//!   Unordered input is sorted first.
//! - Output is deterministic: identical landmarks and [`FingerprintConfig`]
//!   produce identical hashes in identical order, whether or not pairing runs
//!   in parallel.
//! - The hash derivation ([`hash_pair`]) is fixed per
//!   [`HASH_SCHEME_VERSION`] and is not tunable per call.
//!
//! ## Example Usage
//!
//! ```
//! use features::Landmark;
//! use fingerprint::{FingerprintConfig, FingerprintGenerator, hash_pair};
//!
//! let landmarks = vec![
//!     Landmark { time_ms: 0, frame: 0, frequency_bin: 40, magnitude: -12.0 },
//!     Landmark { time_ms: 100, frame: 2, frequency_bin: 55, magnitude: -9.0 },
//! ];
//!
//! let generator = FingerprintGenerator::new(FingerprintConfig::default()).unwrap();
//! let hashes = generator.generate(landmarks);
//!
//! assert_eq!(hashes.len(), 1);
//! assert_eq!(hashes[0].hash, hash_pair(40, 55, 2));
//! assert_eq!(hashes[0].anchor_time_ms, 0);
//! ```

pub mod config;
mod generator;
pub mod hash;

pub use crate::config::{FingerprintConfig, FingerprintError};
pub use crate::generator::{FingerprintGenerator, HashedLandmark, QueryFingerprintSet};
pub use crate::hash::{hash_pair, FingerprintHash, MAX_DELTA_FRAMES};

/// Version of the hash derivation. Persisted indexes record it.
pub const HASH_SCHEME_VERSION: u16 = 1;

/// Width of a [`FingerprintHash`] in bits.
pub const HASH_BITS: u16 = 32;

/// Human-readable algorithm identifier.
pub const HASH_ALGORITHM: &str = "landmark_pair_a10t10d12_v1";
