//! # tunefp Index
//!
//! Inverted index from [`FingerprintHash`] to the postings
//! `(track, anchor time)` that produced it, built for many concurrent
//! readers and a single writer.
//!
//! ## Storage
//!
//! Postings live in immutable, sorted *segments* searched by binary search.
//! Each [`IndexSnapshot`] pairs the segments with per-segment tombstone
//! sets, and every track is live in exactly one segment:
//!
//! - **Insert** writes one new segment per batch.
//! - **Remove** tombstones a track in the segment that holds it. Its
//!   postings stay in place but are invisible to lookups.
//! - **Re-ingest with replace** is an insert that also tombstones the
//!   track's previous segment; the old postings become dead the same way.
//! - **Compact** rewrites segments keeping only live postings. Writes that
//!   push the segment count past [`IndexConfig::max_segments`] merge
//!   segments of similar size automatically, so each posting is rewritten a
//!   logarithmic number of times as the index grows.
//!
//! Segments and tombstone sets are shared between snapshots, so a write
//! costs time proportional to its batch and the segment count, not to the
//! number of tracks already indexed.
//!
//! ## Concurrency
//!
//! Readers clone the current `Arc<IndexSnapshot>` and work against it for
//! the whole call, so they never see a half-written posting list. Writers
//! serialize on a mutex, build the complete next snapshot off to the side,
//! then swap the pointer under a short write lock.
//!
//! ## Persistence
//!
//! [`FingerprintIndex::save`] writes the live postings in a versioned,
//! little-endian format (see [`INDEX_MAGIC`]), stamped with the index's hash
//! profile. Loading an index written under another format version, hash
//! scheme, hash width or (when one is expected) hash profile fails with
//! [`IndexError::VersionMismatch`] before any posting is read.
//!
//! ## Example Usage
//!
//! ```
//! use fingerprint::{hash_pair, HashedLandmark};
//! use index::{FingerprintIndex, IndexConfig, TrackId};
//!
//! let index = FingerprintIndex::new(IndexConfig::default()).unwrap();
//! let hashes = vec![
//!     HashedLandmark { hash: hash_pair(10, 20, 3), anchor_time_ms: 0 },
//!     HashedLandmark { hash: hash_pair(20, 12, 1), anchor_time_ms: 50 },
//! ];
//! index.insert(TrackId(1), &hashes, false).unwrap();
//!
//! let found = index.lookup(&[hash_pair(10, 20, 3)]);
//! assert_eq!(found[&hash_pair(10, 20, 3)][0].track_id, TrackId(1));
//!
//! assert!(index.remove(TrackId(1)).unwrap());
//! assert!(index.lookup(&[hash_pair(10, 20, 3)]).is_empty());
//! ```

mod config;
mod error;
mod persist;
mod segment;
mod snapshot;
mod types;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};
use std::time::Instant;

use fingerprint::{FingerprintHash, HashedLandmark};
use hashbrown::HashSet;
use tracing::{debug, info, warn};

pub use crate::config::IndexConfig;
pub use crate::error::IndexError;
pub use crate::persist::{INDEX_FORMAT_VERSION, INDEX_MAGIC, PROFILE_FIELD};
pub use crate::snapshot::IndexSnapshot;
pub use crate::types::{
    BatchInsertReport, CompactionReport, IndexStats, InsertReport, Posting, PostingMap, TrackId,
    TrackPostings,
};

use crate::segment::Segment;

/// Segmented posting index with snapshot readers.
pub struct FingerprintIndex {
    cfg: IndexConfig,
    /// Digest of the settings the postings were hashed under. Set once.
    profile: OnceLock<u64>,
    current: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<()>,
}

impl FingerprintIndex {
    /// Create an empty index, not yet bound to a hash profile.
    pub fn new(cfg: IndexConfig) -> Result<Self, IndexError> {
        cfg.validate()?;
        Ok(Self::from_snapshot(cfg, None, IndexSnapshot::default()))
    }

    /// Create an empty index bound to `profile`.
    pub fn with_profile(cfg: IndexConfig, profile: u64) -> Result<Self, IndexError> {
        cfg.validate()?;
        Ok(Self::from_snapshot(cfg, Some(profile), IndexSnapshot::default()))
    }

    fn from_snapshot(cfg: IndexConfig, profile: Option<u64>, snapshot: IndexSnapshot) -> Self {
        Self {
            cfg,
            profile: profile.map_or_else(OnceLock::new, OnceLock::from),
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.cfg
    }

    /// The hash profile this index is bound to, if any.
    ///
    /// A profile is an opaque digest of every setting that changes what a
    /// hash means (analysis rate, framing, frequency quantization, landmark
    /// strategy, target zone). Postings computed under one profile are
    /// meaningless under another.
    pub fn profile(&self) -> Option<u64> {
        self.profile.get().copied()
    }

    /// Bind an unbound index to `profile`, or check that a bound index
    /// already carries it.
    ///
    /// Fails with [`IndexError::VersionMismatch`] on [`PROFILE_FIELD`] when
    /// the index was built under a different profile.
    pub fn bind_profile(&self, profile: u64) -> Result<(), IndexError> {
        let bound = *self.profile.get_or_init(|| profile);
        if let Err(err) = persist::check_version(PROFILE_FIELD, profile, bound) {
            warn!(expected = profile, found = bound, "index_profile_rejected");
            return Err(err);
        }
        Ok(())
    }

    /// The current version. Stays valid and unchanged while writers proceed.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        // The guarded value is only ever replaced whole, so a poisoned lock
        // still holds a complete snapshot.
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Bulk lookup of live postings against the current snapshot.
    pub fn lookup(&self, hashes: &[FingerprintHash]) -> PostingMap {
        self.snapshot().lookup(hashes)
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.snapshot().contains(track_id)
    }

    pub fn stats(&self) -> IndexStats {
        self.snapshot().stats()
    }

    /// Insert all postings of one track.
    ///
    /// Fails with [`IndexError::DuplicateTrack`] if the track is live and
    /// `replace` is false. With `replace`, the previous postings are
    /// tombstoned in the same atomic step that publishes the new ones.
    pub fn insert(
        &self,
        track_id: TrackId,
        hashes: &[HashedLandmark],
        replace: bool,
    ) -> Result<InsertReport, IndexError> {
        let mut report =
            self.insert_batch(vec![TrackPostings::new(track_id, hashes.to_vec())], replace)?;
        if let Some((_, err)) = report.rejected.pop() {
            return Err(err);
        }
        report
            .inserted
            .pop()
            .ok_or_else(|| IndexError::backend("insert produced no report"))
    }

    /// Insert many tracks as one segment, visible together in one generation.
    ///
    /// Tracks that fail validation are reported in
    /// [`BatchInsertReport::rejected`] without affecting the others. A track
    /// id repeated within the batch keeps its first occurrence; later ones are
    /// rejected as duplicates.
    pub fn insert_batch(
        &self,
        batch: Vec<TrackPostings>,
        replace: bool,
    ) -> Result<BatchInsertReport, IndexError> {
        let start = Instant::now();
        let _writer = self.lock_writer()?;
        let current = self.snapshot();

        let mut report = BatchInsertReport::default();
        let mut accepted: Vec<(TrackId, usize, bool)> = Vec::with_capacity(batch.len());
        let mut postings = Vec::new();
        let mut seen = HashSet::with_capacity(batch.len());

        for TrackPostings { track_id, hashes } in batch {
            let live = current.contains(track_id);
            if !seen.insert(track_id) || (live && !replace) {
                report
                    .rejected
                    .push((track_id, IndexError::DuplicateTrack { track_id }));
                continue;
            }
            if hashes.is_empty() {
                report
                    .rejected
                    .push((track_id, IndexError::EmptyPostings { track_id }));
                continue;
            }
            let mut track_postings: Vec<Posting> = hashes
                .iter()
                .map(|h| Posting::from_hashed(track_id, h))
                .collect();
            track_postings.sort_unstable();
            track_postings.dedup();
            accepted.push((track_id, track_postings.len(), live));
            postings.extend(track_postings);
        }

        if accepted.is_empty() {
            return Ok(report);
        }

        let mut next = IndexSnapshot::clone(&current);
        for &(track_id, _, replaced) in &accepted {
            if replaced {
                next.tombstone(track_id);
            }
        }
        let segment_id = next.allocate_segment_id();
        next.push_segment(Segment::new(segment_id, postings));

        let committed = self.commit(next)?;
        report.generation = Some(committed.generation);
        report.inserted = accepted
            .into_iter()
            .map(|(track_id, postings, replaced)| InsertReport {
                track_id,
                postings,
                replaced,
                generation: committed.generation,
            })
            .collect();

        info!(
            tracks = report.inserted.len(),
            rejected = report.rejected.len(),
            postings = report.inserted.iter().map(|r| r.postings).sum::<usize>(),
            generation = committed.generation,
            elapsed_micros = start.elapsed().as_micros(),
            "index_insert"
        );
        Ok(report)
    }

    /// Tombstone every posting of `track_id`.
    ///
    /// Returns `false` if the track was not live. Postings are physically
    /// deleted only by compaction.
    pub fn remove(&self, track_id: TrackId) -> Result<bool, IndexError> {
        let _writer = self.lock_writer()?;
        let current = self.snapshot();
        if !current.contains(track_id) {
            return Ok(false);
        }
        let mut next = IndexSnapshot::clone(&current);
        next.tombstone(track_id);
        let committed = self.commit(next)?;
        info!(
            track_id = track_id.0,
            generation = committed.generation,
            "index_remove"
        );
        Ok(true)
    }

    /// Rewrite every segment into one holding only live postings.
    pub fn compact(&self) -> Result<CompactionReport, IndexError> {
        let start = Instant::now();
        let _writer = self.lock_writer()?;
        let current = self.snapshot();
        let before = current.stats();

        let mut next = IndexSnapshot::clone(&current);
        next.merge_segments(|_| true);
        let committed = self.commit(next)?;
        let after = committed.stats();

        let report = CompactionReport {
            segments_before: before.segments,
            segments_after: after.segments,
            postings_before: before.live_postings + before.dead_postings,
            postings_after: after.live_postings + after.dead_postings,
        };
        info!(
            segments_before = report.segments_before,
            segments_after = report.segments_after,
            purged = report.purged(),
            generation = committed.generation,
            elapsed_micros = start.elapsed().as_micros(),
            "index_compacted"
        );
        Ok(report)
    }

    /// Serialize the live postings of the current snapshot.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize, IndexError> {
        let postings = self.snapshot().live_postings();
        let buf = persist::encode(&postings, self.profile());
        writer.write_all(&buf)?;
        writer.flush()?;
        Ok(postings.len())
    }

    /// Build an index from bytes produced by [`FingerprintIndex::write_to`].
    ///
    /// The loaded index keeps the hash profile it was saved with.
    pub fn read_from<R: Read>(reader: R, cfg: IndexConfig) -> Result<Self, IndexError> {
        Self::read_image(reader, cfg, None)
    }

    /// [`FingerprintIndex::read_from`], failing with
    /// [`IndexError::VersionMismatch`] before any posting is decoded when the
    /// image was saved under a profile other than `profile`. An unbound
    /// image is accepted and bound to `profile`.
    pub fn read_from_with_profile<R: Read>(
        reader: R,
        cfg: IndexConfig,
        profile: u64,
    ) -> Result<Self, IndexError> {
        Self::read_image(reader, cfg, Some(profile))
    }

    fn read_image<R: Read>(
        mut reader: R,
        cfg: IndexConfig,
        expected_profile: Option<u64>,
    ) -> Result<Self, IndexError> {
        cfg.validate()?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let decoded = match persist::decode(&data, expected_profile) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(error = %err, bytes = data.len(), "index_load_rejected");
                return Err(err);
            }
        };
        let profile = decoded.profile.or(expected_profile);
        let postings = decoded.postings;

        let mut snapshot = IndexSnapshot::default();
        if !postings.is_empty() {
            let segment_id = snapshot.allocate_segment_id();
            snapshot.push_segment(Segment::from_sorted(segment_id, postings));
            snapshot.generation = 1;
        }
        let stats = snapshot.stats();
        debug!(
            tracks = stats.live_tracks,
            postings = stats.live_postings,
            profile = ?profile,
            "index_loaded"
        );
        Ok(Self::from_snapshot(cfg, profile, snapshot))
    }

    /// Write the index to `path`, replacing any existing file atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<usize, IndexError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .ok_or_else(|| IndexError::Io(format!("{} is not a file path", path.display())))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        let written = self.write_to(&mut writer)?;
        let file = writer
            .into_inner()
            .map_err(|e| IndexError::Io(e.error().to_string()))?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;

        info!(path = %path.display(), postings = written, "index_saved");
        Ok(written)
    }

    /// Load an index saved with [`FingerprintIndex::save`].
    pub fn load<P: AsRef<Path>>(path: P, cfg: IndexConfig) -> Result<Self, IndexError> {
        let file = File::open(path.as_ref())?;
        Self::read_from(BufReader::new(file), cfg)
    }

    /// Load an index saved with [`FingerprintIndex::save`], checking its
    /// hash profile as [`FingerprintIndex::read_from_with_profile`] does.
    pub fn load_with_profile<P: AsRef<Path>>(
        path: P,
        cfg: IndexConfig,
        profile: u64,
    ) -> Result<Self, IndexError> {
        let file = File::open(path.as_ref())?;
        Self::read_from_with_profile(BufReader::new(file), cfg, profile)
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, ()>, IndexError> {
        self.writer
            .lock()
            .map_err(|_| IndexError::backend("poisoned writer lock"))
    }

    /// Publish `next` as the new current snapshot. Caller holds the writer lock.
    fn commit(&self, mut next: IndexSnapshot) -> Result<Arc<IndexSnapshot>, IndexError> {
        next.generation += 1;
        while next.segments.len() > self.cfg.max_segments {
            let ids = next.merge_candidates();
            next.merge_segments(|s| ids.contains(&s.id()));
            debug!(
                merged = ids.len(),
                segments = next.segments.len(),
                "index_auto_merge"
            );
        }

        let next = Arc::new(next);
        let mut guard = self
            .current
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        *guard = Arc::clone(&next);
        Ok(next)
    }
}

impl std::fmt::Debug for FingerprintIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintIndex")
            .field("cfg", &self.cfg)
            .field("profile", &self.profile())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests;
