// Metrics hooks for the `matcher` crate.
//
// A `MatchMetrics` implementation is handed to `MatchScorer::with_metrics`;
// the scorer then reports latency and histogram size for every score call.
// No metrics backend is assumed.
use std::time::Duration;

use crate::types::MatchOutcome;

/// Metrics observer for scoring calls.
pub trait MatchMetrics: Send + Sync {
    /// Record one scoring pass.
    ///
    /// `query_hashes` is the size of the query set, `candidates` the number of
    /// distinct tracks that received at least one vote and `outcome` the
    /// decision returned to the caller.
    fn record_score(
        &self,
        latency: Duration,
        query_hashes: usize,
        candidates: usize,
        outcome: &MatchOutcome,
    );
}
