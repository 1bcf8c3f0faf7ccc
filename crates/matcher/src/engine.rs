use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use fingerprint::QueryFingerprintSet;
use hashbrown::{HashMap, HashSet};
use index::{PostingMap, TrackId};
use tracing::debug;

use crate::metrics::MatchMetrics;
use crate::types::{
    AmbiguousMatch, Candidate, MatchConfig, MatchError, MatchOutcome, RecognitionResult,
    ScoreReport,
};


#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    count: u32,
    delta_sum: i64,
}

/// Per-track tally while reducing buckets to candidates.
#[derive(Debug, Clone, Copy)]
struct TrackTally {
    best_bucket: i64,
    best: Bucket,
    total: u32,
}

/// Time-offset histogram scorer.
///
/// A true match lines up many hashes at one constant `track - query` anchor
/// delta. Coincidental hash collisions scatter across deltas instead.
#[derive(Clone)]
pub struct MatchScorer {
    config: MatchConfig,
    metrics: Option<Arc<dyn MatchMetrics>>,
}

impl MatchScorer {
    pub fn new(config: MatchConfig) -> Result<Self, MatchError> {
        config.validate()?;
        Ok(Self {
            config,
            metrics: None,
        })
    }

    /// Report every scoring pass to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn MatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Decide which track, if any, `query` was taken from.
    pub fn score(&self, query: &QueryFingerprintSet, postings: &PostingMap) -> MatchOutcome {
        self.score_detailed(query, postings).outcome
    }

    /// [`MatchScorer::score`] plus the ranked candidate list.
    pub fn score_detailed(
        &self,
        query: &QueryFingerprintSet,
        postings: &PostingMap,
    ) -> ScoreReport {
        let start = Instant::now();
        let bucket_ms = i64::from(self.config.delta_bucket_ms);

        let mut histogram: HashMap<(TrackId, i64), Bucket> = HashMap::new();
        let mut voted: HashSet<(TrackId, i64)> = HashSet::new();
        let mut votes = 0usize;
        for q in &query.hashes {
            let Some(hits) = postings.get(&q.hash) else {
                continue;
            };
            // One vote per query hash and bucket, however many postings of
            // a sustained note repeat the hash inside it.
            voted.clear();
            for p in hits {
                let delta = i64::from(p.anchor_time_ms) - i64::from(q.anchor_time_ms);
                let key = (p.track_id, delta.div_euclid(bucket_ms));
                if !voted.insert(key) {
                    continue;
                }
                let bucket = histogram.entry(key).or_default();
                bucket.count += 1;
                bucket.delta_sum += delta;
                votes += 1;
            }
        }

        let mut ranked = rank(&histogram);
        let outcome = self.decide(&ranked, query.len());
        ranked.truncate(self.config.max_candidates);

        let latency = start.elapsed();
        debug!(
            query_hashes = query.len(),
            votes,
            tracks = histogram.len(),
            matched = outcome.is_match(),
            elapsed_micros = latency.as_micros(),
            "match_scored"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_score(latency, query.len(), ranked.len(), &outcome);
        }

        ScoreReport {
            outcome,
            candidates: ranked,
            query_hashes: query.len(),
            votes,
        }
    }

    fn decide(&self, ranked: &[Candidate], query_hashes: usize) -> MatchOutcome {
        let Some(best) = ranked.first() else {
            return MatchOutcome::NoMatch;
        };
        if best.best_bucket_count < self.config.min_matched_hashes || query_hashes == 0 {
            return MatchOutcome::NoMatch;
        }

        if let Some(runner_up) = ranked.get(1) {
            let required = self.config.min_margin_ratio * runner_up.best_bucket_count as f32;
            if (best.best_bucket_count as f32) < required {
                return if self.config.report_ambiguous {
                    MatchOutcome::Ambiguous(AmbiguousMatch {
                        best: *best,
                        runner_up: *runner_up,
                    })
                } else {
                    MatchOutcome::NoMatch
                };
            }
        }

        let confidence = best.best_bucket_count as f32 / query_hashes as f32;
        let time_offset_ms = best.mean_delta_ms.clamp(0, i64::from(u32::MAX)) as u32;
        MatchOutcome::Matched(RecognitionResult {
            track_id: best.track_id,
            confidence,
            time_offset_ms,
            matched_hash_count: best.best_bucket_count,
        })
    }
}

/// Reduce the histogram to one candidate per track, best first.
fn rank(histogram: &HashMap<(TrackId, i64), Bucket>) -> Vec<Candidate> {
    let mut tracks: HashMap<TrackId, TrackTally> = HashMap::new();
    for (&(track_id, bucket_id), &bucket) in histogram {
        tracks
            .entry(track_id)
            .and_modify(|t| {
                t.total += bucket.count;
                let better = match bucket.count.cmp(&t.best.count) {
                    Ordering::Greater => true,
                    Ordering::Equal => bucket_id < t.best_bucket,
                    Ordering::Less => false,
                };
                if better {
                    t.best_bucket = bucket_id;
                    t.best = bucket;
                }
            })
            .or_insert(TrackTally {
                best_bucket: bucket_id,
                best: bucket,
                total: bucket.count,
            });
    }

    let mut ranked: Vec<Candidate> = tracks
        .into_iter()
        .map(|(track_id, t)| Candidate {
            track_id,
            best_bucket_count: t.best.count,
            total_count: t.total,
            mean_delta_ms: (t.best.delta_sum as f64 / f64::from(t.best.count)).round() as i64,
        })
        .collect();
    ranked.sort_unstable_by(|a, b| {
        b.best_bucket_count
            .cmp(&a.best_bucket_count)
            .then(b.total_count.cmp(&a.total_count))
            .then(a.track_id.cmp(&b.track_id))
    });
    ranked
}

impl std::fmt::Debug for MatchScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchScorer")
            .field("config", &self.config)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}
