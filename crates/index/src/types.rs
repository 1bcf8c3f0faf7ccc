use std::fmt;

use fingerprint::{FingerprintHash, HashedLandmark};
use serde::{Deserialize, Serialize};

/// Opaque identifier of an ingested track. Metadata lives outside the index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TrackId {
    fn from(value: u32) -> Self {
        TrackId(value)
    }
}

/// One stored `(hash, track, anchor time)` record.
///
/// Field order defines the sort order inside segments and on disk.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Posting {
    pub hash: FingerprintHash,
    pub track_id: TrackId,
    pub anchor_time_ms: u32,
}

impl Posting {
    pub fn from_hashed(track_id: TrackId, hashed: &HashedLandmark) -> Self {
        Self {
            hash: hashed.hash,
            track_id,
            anchor_time_ms: hashed.anchor_time_ms,
        }
    }
}

/// Live postings grouped by hash, as returned by a bulk lookup.
pub type PostingMap = hashbrown::HashMap<FingerprintHash, Vec<Posting>>;

/// Hashes of one track, queued for a batch insert.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPostings {
    pub track_id: TrackId,
    pub hashes: Vec<HashedLandmark>,
}

impl TrackPostings {
    pub fn new(track_id: TrackId, hashes: Vec<HashedLandmark>) -> Self {
        Self { track_id, hashes }
    }
}

/// Outcome of a successful insert for one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertReport {
    pub track_id: TrackId,
    /// Distinct postings stored for the track.
    pub postings: usize,
    /// An earlier version of the track was tombstoned by this insert.
    pub replaced: bool,
    /// Snapshot generation in which the postings became visible.
    pub generation: u64,
}

/// Outcome of a batch insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchInsertReport {
    pub inserted: Vec<InsertReport>,
    pub rejected: Vec<(TrackId, crate::IndexError)>,
    /// Generation that made the inserted tracks visible, if any were.
    pub generation: Option<u64>,
}

/// Outcome of a compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionReport {
    pub segments_before: usize,
    pub segments_after: usize,
    pub postings_before: usize,
    pub postings_after: usize,
}

impl CompactionReport {
    /// Postings physically deleted.
    pub fn purged(&self) -> usize {
        self.postings_before - self.postings_after
    }
}

/// Point-in-time index statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub generation: u64,
    pub live_tracks: usize,
    pub live_postings: usize,
    /// Postings still stored but no longer visible (removed or replaced).
    pub dead_postings: usize,
    pub segments: usize,
}
