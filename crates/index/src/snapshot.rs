//! Immutable index versions handed to readers.

use std::collections::BTreeMap;
use std::sync::Arc;

use fingerprint::FingerprintHash;
use hashbrown::HashSet;

use crate::segment::Segment;
use crate::types::{IndexStats, Posting, PostingMap, TrackId};

/// A shared segment plus the tracks tombstoned in it.
///
/// Both halves are reference counted, so cloning a view copies two pointers.
/// A write that tombstones a track copies only that segment's tombstone set,
/// and only when an older snapshot still shares it.
#[derive(Debug, Clone)]
pub(crate) struct SegmentView {
    pub segment: Arc<Segment>,
    dead: Arc<HashSet<TrackId>>,
}

impl SegmentView {
    fn new(segment: Segment) -> Self {
        Self {
            segment: Arc::new(segment),
            dead: Arc::default(),
        }
    }

    /// `track_id` has postings here that are still visible.
    fn holds(&self, track_id: TrackId) -> bool {
        self.segment.tracks().contains_key(&track_id) && !self.dead.contains(&track_id)
    }

    fn is_live(&self, posting: &Posting) -> bool {
        !self.dead.contains(&posting.track_id)
    }

    fn live_postings(&self) -> impl Iterator<Item = &Posting> + '_ {
        self.segment.postings().iter().filter(|p| self.is_live(p))
    }

    fn live_tracks(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.segment
            .tracks()
            .keys()
            .copied()
            .filter(|t| !self.dead.contains(t))
    }
}

/// One consistent version of the index.
///
/// A reader holds an `Arc<IndexSnapshot>` for the whole of its query and
/// never observes writes made after it was taken. Every track is live in at
/// most one segment; removal and replacement tombstone it there, which keeps
/// them metadata changes until compaction rewrites the dead postings away.
///
/// Cloning a snapshot costs one pointer copy per segment, independent of the
/// number of tracks.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    pub(crate) generation: u64,
    pub(crate) next_segment_id: u64,
    pub(crate) segments: Vec<SegmentView>,
    live_tracks: usize,
    live_postings: usize,
}

impl IndexSnapshot {
    /// Monotonic version number, bumped by every committed write.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.locate(track_id).is_some()
    }

    /// Live track ids in ascending order.
    pub fn track_ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self.segments.iter().flat_map(|v| v.live_tracks()).collect();
        ids.sort_unstable();
        ids
    }

    /// Position of the segment holding `track_id`'s live postings.
    fn locate(&self, track_id: TrackId) -> Option<usize> {
        self.segments.iter().rposition(|v| v.holds(track_id))
    }

    /// Live postings for every distinct hash in `hashes`.
    ///
    /// Hashes without live postings are absent from the map. An empty input
    /// yields an empty map.
    pub fn lookup(&self, hashes: &[FingerprintHash]) -> PostingMap {
        let mut unique = hashes.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let mut out = PostingMap::with_capacity(unique.len());
        for hash in unique {
            let mut found = Vec::new();
            for view in &self.segments {
                found.extend(
                    view.segment
                        .postings_for(hash)
                        .iter()
                        .filter(|p| view.is_live(p)),
                );
            }
            if !found.is_empty() {
                out.insert(hash, found);
            }
        }
        out
    }

    /// Every live posting, sorted by `(hash, track, anchor time)`.
    pub fn live_postings(&self) -> Vec<Posting> {
        let mut out = Vec::with_capacity(self.live_postings);
        for view in &self.segments {
            out.extend(view.live_postings());
        }
        out.sort_unstable();
        out
    }

    pub fn stats(&self) -> IndexStats {
        let total: usize = self.segments.iter().map(|v| v.segment.len()).sum();
        IndexStats {
            generation: self.generation,
            live_tracks: self.live_tracks,
            live_postings: self.live_postings,
            dead_postings: total - self.live_postings,
            segments: self.segments.len(),
        }
    }

    pub(crate) fn allocate_segment_id(&mut self) -> u64 {
        let id = self.next_segment_id;
        self.next_segment_id += 1;
        id
    }

    /// Publish `segment`. Its tracks must not be live anywhere else.
    pub(crate) fn push_segment(&mut self, segment: Segment) {
        self.live_tracks += segment.tracks().len();
        self.live_postings += segment.len();
        self.segments.push(SegmentView::new(segment));
    }

    /// Hide every posting of `track_id`. Returns `false` if it was not live.
    pub(crate) fn tombstone(&mut self, track_id: TrackId) -> bool {
        let Some(at) = self.locate(track_id) else {
            return false;
        };
        let view = &mut self.segments[at];
        let postings = view.segment.tracks().get(&track_id).copied().unwrap_or(0);
        Arc::make_mut(&mut view.dead).insert(track_id);
        self.live_tracks -= 1;
        self.live_postings -= postings;
        true
    }

    /// Ids of the segments to merge next: every segment of the most crowded
    /// size tier (a tier spans a factor of four in length), or the two
    /// smallest segments when no tier holds more than one.
    pub(crate) fn merge_candidates(&self) -> Vec<u64> {
        let tier = |len: usize| (usize::BITS - len.max(1).leading_zeros()) / 2;
        let mut tiers: BTreeMap<u32, Vec<u64>> = BTreeMap::new();
        for view in &self.segments {
            tiers
                .entry(tier(view.segment.len()))
                .or_default()
                .push(view.segment.id());
        }
        // Most segments first, lowest tier on ties.
        let crowded = tiers
            .into_values()
            .rev()
            .max_by_key(|ids| ids.len())
            .unwrap_or_default();
        if crowded.len() >= 2 {
            return crowded;
        }
        let mut by_size: Vec<(usize, u64)> = self
            .segments
            .iter()
            .map(|v| (v.segment.len(), v.segment.id()))
            .collect();
        by_size.sort_unstable();
        by_size.into_iter().take(2).map(|(_, id)| id).collect()
    }

    /// Rewrite the segments selected by `merge` into a single segment that
    /// holds only their live postings. Untouched segments keep their ids.
    pub(crate) fn merge_segments(&mut self, merge: impl Fn(&Segment) -> bool) {
        let (merged, kept): (Vec<SegmentView>, Vec<SegmentView>) =
            self.segments.drain(..).partition(|v| merge(v.segment.as_ref()));
        self.segments = kept;

        let mut postings = Vec::new();
        for view in &merged {
            postings.extend(view.live_postings());
        }
        if postings.is_empty() {
            return;
        }
        let id = self.allocate_segment_id();
        self.segments.push(SegmentView::new(Segment::new(id, postings)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(hash: u32, track: u32, t: u32) -> Posting {
        Posting {
            hash: FingerprintHash(hash),
            track_id: TrackId(track),
            anchor_time_ms: t,
        }
    }

    fn snapshot_with(segments: Vec<(u64, Vec<Posting>)>) -> IndexSnapshot {
        let mut snap = IndexSnapshot::default();
        for (id, postings) in segments {
            snap.push_segment(Segment::new(id, postings));
            snap.next_segment_id = snap.next_segment_id.max(id + 1);
        }
        snap
    }

    #[test]
    fn lookup_hides_superseded_postings() {
        // Track 1 was re-ingested: its old postings in segment 0 are dead.
        let mut snap = snapshot_with(vec![(0, vec![posting(7, 1, 100), posting(7, 2, 50)])]);
        assert!(snap.tombstone(TrackId(1)));
        snap.push_segment(Segment::new(1, vec![posting(7, 1, 300)]));

        let found = snap.lookup(&[FingerprintHash(7)]);
        let mut postings = found[&FingerprintHash(7)].clone();
        postings.sort();
        assert_eq!(postings, vec![posting(7, 1, 300), posting(7, 2, 50)]);
        assert_eq!(snap.locate(TrackId(1)), Some(1));
        assert_eq!(snap.locate(TrackId(2)), Some(0));
    }

    #[test]
    fn lookup_skips_missing_and_dedups_input() {
        let snap = snapshot_with(vec![(0, vec![posting(3, 1, 0)])]);
        let found = snap.lookup(&[FingerprintHash(3), FingerprintHash(3), FingerprintHash(4)]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[&FingerprintHash(3)].len(), 1);
        assert!(snap.lookup(&[]).is_empty());
    }

    #[test]
    fn stats_count_dead_postings() {
        let mut snap = snapshot_with(vec![(
            0,
            vec![posting(1, 1, 0), posting(2, 1, 0), posting(3, 2, 0)],
        )]);
        assert!(snap.tombstone(TrackId(1)));
        assert!(!snap.tombstone(TrackId(1)));
        let stats = snap.stats();
        assert_eq!(stats.live_tracks, 1);
        assert_eq!(stats.live_postings, 1);
        assert_eq!(stats.dead_postings, 2);
    }

    #[test]
    fn tombstone_leaves_older_snapshots_untouched() {
        let before = snapshot_with(vec![
            (0, vec![posting(1, 1, 0), posting(2, 2, 0)]),
            (1, vec![posting(3, 3, 0)]),
        ]);
        let mut after = before.clone();
        assert!(after.tombstone(TrackId(2)));

        assert!(before.contains(TrackId(2)));
        assert!(!after.contains(TrackId(2)));
        assert_eq!(before.stats().live_tracks, 3);
        assert_eq!(after.stats().live_tracks, 2);
        // Untouched segments are shared, not copied.
        assert!(Arc::ptr_eq(&before.segments[1].dead, &after.segments[1].dead));
        assert!(Arc::ptr_eq(&before.segments[0].segment, &after.segments[0].segment));
    }

    #[test]
    fn merge_candidates_pick_the_crowded_tier() {
        let small = |id: u64, n: u32| -> (u64, Vec<Posting>) {
            (id, (0..n).map(|i| posting(i, id as u32, 0)).collect())
        };
        // Lengths 2, 3 and 5 share a tier; 40 and 300 sit alone in theirs.
        let snap = snapshot_with(vec![
            small(0, 300),
            small(1, 2),
            small(2, 40),
            small(3, 3),
            small(4, 5),
        ]);
        let mut ids = snap.merge_candidates();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3, 4]);

        let spread = snapshot_with(vec![small(0, 300), small(1, 40), small(2, 2)]);
        let mut ids = spread.merge_candidates();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn merge_keeps_only_live_postings() {
        let mut snap = snapshot_with(vec![
            (0, vec![posting(1, 1, 0), posting(2, 2, 0)]),
            (1, vec![posting(5, 3, 0)]),
        ]);
        assert!(snap.tombstone(TrackId(1)));
        snap.push_segment(Segment::new(2, vec![posting(1, 1, 10)]));
        snap.next_segment_id = 3;

        snap.merge_segments(|s| s.id() != 1);
        assert_eq!(snap.segments.len(), 2);
        assert_eq!(snap.segments[1].segment.id(), 3);
        assert_eq!(snap.locate(TrackId(1)), Some(1));
        assert_eq!(snap.locate(TrackId(2)), Some(1));
        assert_eq!(snap.locate(TrackId(3)), Some(0));
        assert_eq!(
            snap.live_postings(),
            vec![posting(1, 1, 10), posting(2, 2, 0), posting(5, 3, 0)]
        );
        assert_eq!(snap.stats().dead_postings, 0);
        assert_eq!(snap.stats().live_tracks, 3);
    }
}
