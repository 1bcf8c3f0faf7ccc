use index::TrackId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the match scorer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Acceptance policy for the time-offset histogram.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchConfig {
    /// Width of one histogram bucket in milliseconds of time delta.
    pub delta_bucket_ms: u32,
    /// Minimum hashes in the winning bucket for a match.
    pub min_matched_hashes: u32,
    /// The winner's bucket must be at least this many times the runner-up's.
    pub min_margin_ratio: f32,
    /// Report [`MatchOutcome::Ambiguous`] instead of `NoMatch` when only the
    /// margin check fails.
    pub report_ambiguous: bool,
    /// Length of the ranked candidate list returned for diagnostics.
    pub max_candidates: usize,
}

impl MatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delta_bucket_ms(mut self, delta_bucket_ms: u32) -> Self {
        self.delta_bucket_ms = delta_bucket_ms;
        self
    }

    pub fn with_min_matched_hashes(mut self, min_matched_hashes: u32) -> Self {
        self.min_matched_hashes = min_matched_hashes;
        self
    }

    pub fn with_min_margin_ratio(mut self, min_margin_ratio: f32) -> Self {
        self.min_margin_ratio = min_margin_ratio;
        self
    }

    pub fn with_report_ambiguous(mut self, report_ambiguous: bool) -> Self {
        self.report_ambiguous = report_ambiguous;
        self
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.delta_bucket_ms == 0 {
            return Err(MatchError::InvalidConfig(
                "delta_bucket_ms must be greater than zero".into(),
            ));
        }
        if self.min_matched_hashes == 0 {
            return Err(MatchError::InvalidConfig(
                "min_matched_hashes must be greater than zero".into(),
            ));
        }
        if !self.min_margin_ratio.is_finite() || self.min_margin_ratio < 1.0 {
            return Err(MatchError::InvalidConfig(format!(
                "min_margin_ratio must be a finite value >= 1.0 (got {})",
                self.min_margin_ratio
            )));
        }
        if self.max_candidates == 0 {
            return Err(MatchError::InvalidConfig(
                "max_candidates must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            delta_bucket_ms: 100,
            min_matched_hashes: 10,
            min_margin_ratio: 1.5,
            report_ambiguous: false,
            max_candidates: 5,
        }
    }
}

/// A recognized track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub track_id: TrackId,
    /// Share of the query's hashes that landed in the winning bucket, in `[0, 1]`.
    pub confidence: f32,
    /// Position in the track where the query audio starts.
    pub time_offset_ms: u32,
    pub matched_hash_count: u32,
}

/// One track's histogram summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub track_id: TrackId,
    /// Query hashes in the track's largest bucket. Never exceeds the
    /// query's hash count.
    pub best_bucket_count: u32,
    /// Postings for the track across all buckets.
    pub total_count: u32,
    /// Mean `track - query` anchor delta in the largest bucket. May be negative.
    pub mean_delta_ms: i64,
}

/// The two leading candidates when neither dominates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousMatch {
    pub best: Candidate,
    pub runner_up: Candidate,
}

/// Decision for one query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched(RecognitionResult),
    Ambiguous(AmbiguousMatch),
    NoMatch,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }

    pub fn result(&self) -> Option<&RecognitionResult> {
        match self {
            MatchOutcome::Matched(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_result(self) -> Option<RecognitionResult> {
        match self {
            MatchOutcome::Matched(result) => Some(result),
            _ => None,
        }
    }
}

/// Decision plus the ranked candidates behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub outcome: MatchOutcome,
    /// Best candidates first, at most [`MatchConfig::max_candidates`].
    pub candidates: Vec<Candidate>,
    pub query_hashes: usize,
    /// Votes tallied into the histogram. Each query hash votes at most once
    /// per `(track, bucket)`.
    pub votes: usize,
}
