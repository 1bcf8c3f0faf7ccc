//! # tunefp Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` turns the postings retrieved for a query into a decision: which
//! track the query came from, how confident that is, and where in the track
//! the query starts. It never touches the index itself; the caller performs
//! one bulk [`index::FingerprintIndex::lookup`] and hands the resulting
//! [`index::PostingMap`] over.
//!
//! ## Algorithm
//!
//! Every `(query hash, posting)` pair votes for the signed delta
//! `posting.anchor_time_ms - query.anchor_time_ms`. Votes are binned per track
//! into buckets of [`MatchConfig::delta_bucket_ms`]. A genuine match stacks
//! many votes into one bucket; chance collisions spread out.
//!
//! - Each track is summarized by its largest bucket ([`Candidate`]).
//! - Candidates are ranked by largest bucket, then total votes, then track id.
//! - The leader is accepted when its bucket reaches
//!   [`MatchConfig::min_matched_hashes`] and beats the runner-up by
//!   [`MatchConfig::min_margin_ratio`].
//!
//! ## Example Usage
//!
//! ```
//! use fingerprint::{hash_pair, HashedLandmark, QueryFingerprintSet};
//! use index::{FingerprintIndex, IndexConfig, TrackId};
//! use matcher::{MatchConfig, MatchOutcome, MatchScorer};
//!
//! let stored: Vec<HashedLandmark> = (0..20u16)
//!     .map(|i| HashedLandmark {
//!         hash: hash_pair(i, i + 3, 2),
//!         anchor_time_ms: 30_000 + u32::from(i) * 50,
//!     })
//!     .collect();
//! let index = FingerprintIndex::new(IndexConfig::default()).unwrap();
//! index.insert(TrackId(42), &stored, false).unwrap();
//!
//! // The same hashes heard 30 s into the track.
//! let query = QueryFingerprintSet::new(
//!     stored
//!         .iter()
//!         .map(|h| HashedLandmark { anchor_time_ms: h.anchor_time_ms - 30_000, ..*h })
//!         .collect(),
//!     1_000,
//! );
//!
//! let scorer = MatchScorer::new(MatchConfig::default()).unwrap();
//! let postings = index.lookup(&query.unique_hashes());
//! match scorer.score(&query, &postings) {
//!     MatchOutcome::Matched(result) => {
//!         assert_eq!(result.track_id, TrackId(42));
//!         assert_eq!(result.time_offset_ms, 30_000);
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

mod engine;
pub mod metrics;
mod types;

pub use crate::engine::MatchScorer;
pub use crate::metrics::MatchMetrics;
pub use crate::types::{
    AmbiguousMatch, Candidate, MatchConfig, MatchError, MatchOutcome, RecognitionResult,
    ScoreReport,
};
