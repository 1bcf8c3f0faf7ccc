use features::Landmark;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{FingerprintConfig, FingerprintError};
use crate::hash::{hash_pair, FingerprintHash};

// Below this many landmarks the rayon fork/join costs more than it saves.
const PARALLEL_MIN_LANDMARKS: usize = 2_048;

/// One generator output: a pair hash and the time of its anchor landmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashedLandmark {
    pub hash: FingerprintHash,
    pub anchor_time_ms: u32,
}

/// Hashes of one query excerpt. Lives for a single recognition call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFingerprintSet {
    pub hashes: Vec<HashedLandmark>,
    /// Duration of the audio the hashes were computed from.
    pub duration_ms: u32,
}

impl QueryFingerprintSet {
    pub fn new(hashes: Vec<HashedLandmark>, duration_ms: u32) -> Self {
        Self {
            hashes,
            duration_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Distinct hash values in ascending order, for one bulk index lookup.
    pub fn unique_hashes(&self) -> Vec<FingerprintHash> {
        let mut out: Vec<FingerprintHash> = self.hashes.iter().map(|h| h.hash).collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Pairs landmarks inside each anchor's target zone and hashes the pairs.
#[derive(Debug, Clone)]
pub struct FingerprintGenerator {
    config: FingerprintConfig,
}

impl FingerprintGenerator {
    /// Validate `config` and build a generator.
    pub fn new(config: FingerprintConfig) -> Result<Self, FingerprintError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Hash every anchor with up to `fan_out` targets from its zone.
    ///
    /// Output is ordered by anchor (time, then bin) and, per anchor, by the
    /// target selection order: closest in time, then loudest, then lowest
    /// bin. Landmarks need not arrive sorted.
    pub fn generate<I>(&self, landmarks: I) -> Vec<HashedLandmark>
    where
        I: IntoIterator<Item = Landmark>,
    {
        let mut landmarks: Vec<Landmark> = landmarks.into_iter().collect();
        if !is_time_ordered(&landmarks) {
            landmarks.sort_by_key(|l| (l.frame, l.frequency_bin));
        }

        if self.config.use_parallel && landmarks.len() >= PARALLEL_MIN_LANDMARKS {
            let per_anchor: Vec<Vec<HashedLandmark>> = (0..landmarks.len())
                .into_par_iter()
                .map(|i| {
                    let mut out = Vec::with_capacity(self.config.fan_out);
                    self.pair_anchor(&landmarks, i, &mut Vec::new(), &mut out);
                    out
                })
                .collect();
            return per_anchor.into_iter().flatten().collect();
        }

        let mut out = Vec::with_capacity(landmarks.len() * self.config.fan_out);
        let mut candidates = Vec::new();
        for i in 0..landmarks.len() {
            self.pair_anchor(&landmarks, i, &mut candidates, &mut out);
        }
        out
    }

    /// Generate a query set for an excerpt lasting `duration_ms`.
    pub fn fingerprint_query<I>(&self, landmarks: I, duration_ms: u32) -> QueryFingerprintSet
    where
        I: IntoIterator<Item = Landmark>,
    {
        QueryFingerprintSet::new(self.generate(landmarks), duration_ms)
    }

    fn pair_anchor(
        &self,
        landmarks: &[Landmark],
        anchor_idx: usize,
        candidates: &mut Vec<(u32, Landmark)>,
        out: &mut Vec<HashedLandmark>,
    ) {
        let cfg = &self.config;
        let anchor = landmarks[anchor_idx];
        candidates.clear();

        for target in &landmarks[anchor_idx + 1..] {
            let dt = target.frame - anchor.frame;
            if dt > cfg.max_delta_frames {
                break;
            }
            if dt < cfg.min_delta_frames {
                continue;
            }
            let df = target.frequency_bin.abs_diff(anchor.frequency_bin);
            if df < cfg.min_delta_bins || df > cfg.max_delta_bins {
                continue;
            }
            candidates.push((dt, *target));
        }

        candidates.sort_by(|(dt_a, a), (dt_b, b)| {
            dt_a.cmp(dt_b)
                .then(b.magnitude.total_cmp(&a.magnitude))
                .then(a.frequency_bin.cmp(&b.frequency_bin))
        });
        candidates.truncate(cfg.fan_out);

        out.extend(candidates.iter().map(|(dt, target)| HashedLandmark {
            hash: hash_pair(anchor.frequency_bin, target.frequency_bin, *dt),
            anchor_time_ms: anchor.time_ms,
        }));
    }
}

fn is_time_ordered(landmarks: &[Landmark]) -> bool {
    landmarks
        .windows(2)
        .all(|w| (w[0].frame, w[0].frequency_bin) <= (w[1].frame, w[1].frequency_bin))
}
