//! Immutable sorted posting runs.

use fingerprint::FingerprintHash;
use hashbrown::HashMap;

use crate::types::{Posting, TrackId};

/// A sorted, immutable batch of postings.
///
/// Segments are never modified after construction. Removing or replacing a
/// track only tombstones it in the snapshot's view of the segment; the old
/// postings stay here until compaction rewrites the segment.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Segment {
    id: u64,
    postings: Vec<Posting>,
    /// Postings stored per track.
    tracks: HashMap<TrackId, usize>,
}

impl Segment {
    /// Build a segment, sorting and de-duplicating `postings`.
    pub(crate) fn new(id: u64, mut postings: Vec<Posting>) -> Self {
        postings.sort_unstable();
        postings.dedup();
        Self::from_sorted(id, postings)
    }

    /// Wrap postings already in sorted, de-duplicated order.
    pub(crate) fn from_sorted(id: u64, postings: Vec<Posting>) -> Self {
        debug_assert!(postings.windows(2).all(|w| w[0] < w[1]));
        let mut tracks: HashMap<TrackId, usize> = HashMap::new();
        for p in &postings {
            *tracks.entry(p.track_id).or_default() += 1;
        }
        Self {
            id,
            postings,
            tracks,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn len(&self) -> usize {
        self.postings.len()
    }

    pub(crate) fn postings(&self) -> &[Posting] {
        &self.postings
    }

    /// Per-track posting counts, live or not.
    pub(crate) fn tracks(&self) -> &HashMap<TrackId, usize> {
        &self.tracks
    }

    /// All postings with `hash`, live or not.
    pub(crate) fn postings_for(&self, hash: FingerprintHash) -> &[Posting] {
        let start = self.postings.partition_point(|p| p.hash < hash);
        let len = self.postings[start..].partition_point(|p| p.hash == hash);
        &self.postings[start..start + len]
    }
}
