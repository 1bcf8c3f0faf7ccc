use super::*;
use std::thread;

use fingerprint::hash_pair;

fn hashed(pairs: &[(u16, u16, u32, u32)]) -> Vec<HashedLandmark> {
    pairs
        .iter()
        .map(|&(a, t, dt, time)| HashedLandmark {
            hash: hash_pair(a, t, dt),
            anchor_time_ms: time,
        })
        .collect()
}

/// Deterministic pseudo-track: `n` hashes spread over the hash space.
fn track_hashes(seed: u32, n: u32) -> Vec<HashedLandmark> {
    (0..n)
        .map(|i| HashedLandmark {
            hash: FingerprintHash(seed.wrapping_mul(2_654_435_761).wrapping_add(i * 40_503)),
            anchor_time_ms: i * 50,
        })
        .collect()
}

fn index() -> FingerprintIndex {
    FingerprintIndex::new(IndexConfig::default()).unwrap()
}

#[test]
fn insert_then_lookup() {
    let idx = index();
    let report = idx
        .insert(TrackId(7), &hashed(&[(1, 2, 3, 0), (4, 5, 6, 100)]), false)
        .unwrap();
    assert_eq!(report.postings, 2);
    assert!(!report.replaced);
    assert_eq!(report.generation, 1);

    let found = idx.lookup(&[hash_pair(4, 5, 6), hash_pair(9, 9, 9)]);
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[&hash_pair(4, 5, 6)],
        vec![Posting {
            hash: hash_pair(4, 5, 6),
            track_id: TrackId(7),
            anchor_time_ms: 100,
        }]
    );
}

#[test]
fn empty_lookup_is_empty() {
    let idx = index();
    idx.insert(TrackId(1), &track_hashes(1, 10), false).unwrap();
    assert!(idx.lookup(&[]).is_empty());
}

#[test]
fn duplicate_track_is_rejected_without_replace() {
    let idx = index();
    idx.insert(TrackId(1), &track_hashes(1, 10), false).unwrap();
    let err = idx
        .insert(TrackId(1), &track_hashes(2, 10), false)
        .unwrap_err();
    assert_eq!(err, IndexError::DuplicateTrack { track_id: TrackId(1) });
    // Nothing from the rejected insert is visible.
    assert!(idx.lookup(&[track_hashes(2, 1)[0].hash]).is_empty());
    assert_eq!(idx.stats().generation, 1);
}

#[test]
fn empty_postings_are_rejected() {
    let idx = index();
    assert_eq!(
        idx.insert(TrackId(3), &[], false).unwrap_err(),
        IndexError::EmptyPostings { track_id: TrackId(3) }
    );
}

#[test]
fn replace_swaps_postings_atomically() {
    let idx = index();
    let old = track_hashes(1, 20);
    let new = track_hashes(2, 20);
    idx.insert(TrackId(1), &old, false).unwrap();
    let before = idx.snapshot();

    let report = idx.insert(TrackId(1), &new, true).unwrap();
    assert!(report.replaced);

    let old_hashes: Vec<FingerprintHash> = old.iter().map(|h| h.hash).collect();
    let new_hashes: Vec<FingerprintHash> = new.iter().map(|h| h.hash).collect();
    assert!(idx.lookup(&old_hashes).is_empty());
    assert_eq!(idx.lookup(&new_hashes).len(), 20);
    // The snapshot taken before the write still sees the old version.
    assert_eq!(before.lookup(&old_hashes).len(), 20);
    assert!(before.lookup(&new_hashes).is_empty());

    let stats = idx.stats();
    assert_eq!(stats.live_tracks, 1);
    assert_eq!(stats.live_postings, 20);
    assert_eq!(stats.dead_postings, 20);
}

#[test]
fn reingesting_identical_postings_is_idempotent() {
    let idx = index();
    let hashes = track_hashes(5, 30);
    let all: Vec<FingerprintHash> = hashes.iter().map(|h| h.hash).collect();
    idx.insert(TrackId(5), &hashes, false).unwrap();
    let first = idx.lookup(&all);
    idx.insert(TrackId(5), &hashes, true).unwrap();
    assert_eq!(idx.lookup(&all), first);
}

#[test]
fn remove_tombstones_until_compaction() {
    let idx = index();
    let hashes = track_hashes(3, 15);
    let all: Vec<FingerprintHash> = hashes.iter().map(|h| h.hash).collect();
    idx.insert(TrackId(3), &hashes, false).unwrap();
    idx.insert(TrackId(4), &track_hashes(4, 5), false).unwrap();

    assert!(idx.remove(TrackId(3)).unwrap());
    assert!(!idx.remove(TrackId(3)).unwrap());
    assert!(!idx.contains(TrackId(3)));
    assert!(idx.lookup(&all).is_empty());

    let stats = idx.stats();
    assert_eq!(stats.dead_postings, 15, "postings still physically present");

    let report = idx.compact().unwrap();
    assert_eq!(report.purged(), 15);
    assert_eq!(report.segments_after, 1);
    assert_eq!(idx.stats().dead_postings, 0);
    assert!(idx.lookup(&all).is_empty());
    assert_eq!(idx.stats().live_postings, 5);
}

#[test]
fn removed_track_can_be_ingested_again() {
    let idx = index();
    idx.insert(TrackId(9), &track_hashes(9, 5), false).unwrap();
    idx.remove(TrackId(9)).unwrap();
    let report = idx.insert(TrackId(9), &track_hashes(9, 5), false).unwrap();
    assert!(!report.replaced);
    assert_eq!(idx.stats().live_postings, 5);
}

#[test]
fn batch_is_visible_in_one_generation() {
    let idx = index();
    idx.insert(TrackId(1), &track_hashes(1, 5), false).unwrap();
    let report = idx
        .insert_batch(
            vec![
                TrackPostings::new(TrackId(1), track_hashes(11, 5)),
                TrackPostings::new(TrackId(2), track_hashes(2, 5)),
                TrackPostings::new(TrackId(3), Vec::new()),
                TrackPostings::new(TrackId(2), track_hashes(22, 5)),
                TrackPostings::new(TrackId(4), track_hashes(4, 5)),
            ],
            false,
        )
        .unwrap();

    assert_eq!(report.generation, Some(2));
    let inserted: Vec<TrackId> = report.inserted.iter().map(|r| r.track_id).collect();
    assert_eq!(inserted, vec![TrackId(2), TrackId(4)]);
    assert_eq!(
        report.rejected,
        vec![
            (TrackId(1), IndexError::DuplicateTrack { track_id: TrackId(1) }),
            (TrackId(3), IndexError::EmptyPostings { track_id: TrackId(3) }),
            (TrackId(2), IndexError::DuplicateTrack { track_id: TrackId(2) }),
        ]
    );
    assert_eq!(idx.snapshot().track_ids(), vec![TrackId(1), TrackId(2), TrackId(4)]);
    assert_eq!(idx.stats().segments, 2);
}

#[test]
fn fully_rejected_batch_does_not_bump_generation() {
    let idx = index();
    let report = idx
        .insert_batch(vec![TrackPostings::new(TrackId(1), Vec::new())], false)
        .unwrap();
    assert!(report.inserted.is_empty());
    assert_eq!(report.generation, None);
    assert_eq!(idx.stats().generation, 0);
}

#[test]
fn auto_merge_bounds_segment_count() {
    let idx = FingerprintIndex::new(IndexConfig::new().with_max_segments(4)).unwrap();
    for t in 0..20u32 {
        idx.insert(TrackId(t), &track_hashes(t, 8), false).unwrap();
        assert!(idx.stats().segments <= 4);
    }
    idx.remove(TrackId(3)).unwrap();
    for t in 0..20u32 {
        let hashes: Vec<FingerprintHash> = track_hashes(t, 8).iter().map(|h| h.hash).collect();
        let found = idx.lookup(&hashes);
        if t == 3 {
            assert!(found.is_empty());
        } else {
            let total = found
                .values()
                .flatten()
                .filter(|p| p.track_id == TrackId(t))
                .count();
            assert_eq!(total, 8, "track {t}");
        }
    }
}

#[test]
fn single_writes_leave_existing_segments_shared() {
    let idx = FingerprintIndex::new(IndexConfig::new().with_max_segments(64)).unwrap();
    for t in 0..40u32 {
        idx.insert(TrackId(t), &track_hashes(t, 10), false).unwrap();
    }
    let before = idx.snapshot();
    idx.insert(TrackId(100), &track_hashes(100, 10), false).unwrap();
    idx.remove(TrackId(7)).unwrap();
    let after = idx.snapshot();

    assert_eq!(after.segments.len(), before.segments.len() + 1);
    let shared = before
        .segments
        .iter()
        .zip(&after.segments)
        .filter(|(a, b)| Arc::ptr_eq(&a.segment, &b.segment))
        .count();
    assert_eq!(shared, before.segments.len());
    assert!(before.contains(TrackId(7)));
    assert!(!after.contains(TrackId(7)));
    assert!(!before.contains(TrackId(100)));
    assert_eq!(after.stats().live_tracks, 40);
}

#[test]
fn many_single_track_inserts_stay_bounded() {
    let idx = index();
    for t in 0..5_000u32 {
        idx.insert(TrackId(t), &track_hashes(t, 1), false).unwrap();
    }
    let stats = idx.stats();
    assert_eq!(stats.live_tracks, 5_000);
    assert_eq!(stats.live_postings, 5_000);
    assert_eq!(stats.dead_postings, 0);
    assert!(stats.segments <= IndexConfig::default().max_segments);
    assert!(idx.contains(TrackId(0)) && idx.contains(TrackId(4_999)));
}

#[test]
fn invalid_config_is_rejected() {
    assert!(FingerprintIndex::new(IndexConfig::new().with_max_segments(0)).is_err());
}

#[test]
fn persistence_round_trip_preserves_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tracks.tfpx");

    let idx = index();
    for t in 0..5u32 {
        idx.insert(TrackId(t), &track_hashes(t, 25), false).unwrap();
    }
    idx.insert(TrackId(2), &track_hashes(200, 25), true).unwrap();
    idx.remove(TrackId(4)).unwrap();
    let written = idx.save(&path).unwrap();
    assert_eq!(written, 4 * 25);

    let loaded = FingerprintIndex::load(&path, IndexConfig::default()).unwrap();
    assert_eq!(loaded.snapshot().track_ids(), idx.snapshot().track_ids());
    for seed in [0u32, 1, 2, 3, 4, 200] {
        let hashes: Vec<FingerprintHash> = track_hashes(seed, 25).iter().map(|h| h.hash).collect();
        assert_eq!(loaded.lookup(&hashes), idx.lookup(&hashes), "seed {seed}");
    }
    assert_eq!(loaded.stats().dead_postings, 0);
}

#[test]
fn loading_other_hash_scheme_fails_fast() {
    let idx = index();
    idx.insert(TrackId(1), &track_hashes(1, 4), false).unwrap();
    let mut bytes = Vec::new();
    idx.write_to(&mut bytes).unwrap();
    bytes[6] = bytes[6].wrapping_add(1);

    let err = FingerprintIndex::read_from(bytes.as_slice(), IndexConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        IndexError::VersionMismatch {
            field: "hash scheme version",
            ..
        }
    ));
}

#[test]
fn profile_binds_once() {
    let idx = index();
    assert_eq!(idx.profile(), None);
    idx.bind_profile(0xfeed).unwrap();
    idx.bind_profile(0xfeed).unwrap();
    assert_eq!(
        idx.bind_profile(0xbeef).unwrap_err(),
        IndexError::VersionMismatch {
            field: PROFILE_FIELD,
            expected: 0xbeef,
            found: 0xfeed,
        }
    );
    assert_eq!(idx.profile(), Some(0xfeed));
}

#[test]
fn saved_profile_survives_reload_and_is_checked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profiled.tfpx");
    let idx = FingerprintIndex::with_profile(IndexConfig::default(), 0x1234_5678_9abc).unwrap();
    idx.insert(TrackId(1), &track_hashes(1, 10), false).unwrap();
    idx.save(&path).unwrap();

    let loaded = FingerprintIndex::load(&path, IndexConfig::default()).unwrap();
    assert_eq!(loaded.profile(), Some(0x1234_5678_9abc));
    assert!(loaded.bind_profile(0x1234_5678_9abd).is_err());

    let checked =
        FingerprintIndex::load_with_profile(&path, IndexConfig::default(), 0x1234_5678_9abc)
            .unwrap();
    assert!(checked.contains(TrackId(1)));

    let err = FingerprintIndex::load_with_profile(&path, IndexConfig::default(), 7).unwrap_err();
    assert!(matches!(
        err,
        IndexError::VersionMismatch {
            field: PROFILE_FIELD,
            expected: 7,
            ..
        }
    ));
}

#[test]
fn unbound_image_takes_the_expected_profile() {
    let idx = index();
    idx.insert(TrackId(3), &track_hashes(3, 10), false).unwrap();
    let mut bytes = Vec::new();
    idx.write_to(&mut bytes).unwrap();

    let loaded =
        FingerprintIndex::read_from_with_profile(bytes.as_slice(), IndexConfig::default(), 99)
            .unwrap();
    assert_eq!(loaded.profile(), Some(99));
    let plain = FingerprintIndex::read_from(bytes.as_slice(), IndexConfig::default()).unwrap();
    assert_eq!(plain.profile(), None);
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = FingerprintIndex::load(dir.path().join("absent.tfpx"), IndexConfig::default())
        .unwrap_err();
    assert!(matches!(err, IndexError::Io(_)));
}

#[test]
fn empty_index_round_trips() {
    let idx = index();
    let mut bytes = Vec::new();
    assert_eq!(idx.write_to(&mut bytes).unwrap(), 0);
    let loaded = FingerprintIndex::read_from(bytes.as_slice(), IndexConfig::default()).unwrap();
    assert_eq!(loaded.stats(), IndexStats::default());
}

#[test]
fn readers_see_complete_tracks_during_writes() {
    let idx = Arc::new(index());
    let per_track = 40u32;

    let writer = {
        let idx = Arc::clone(&idx);
        thread::spawn(move || {
            for t in 0..50u32 {
                idx.insert(TrackId(t), &track_hashes(t, per_track), false)
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let idx = Arc::clone(&idx);
            thread::spawn(move || {
                for _ in 0..200 {
                    let snap = idx.snapshot();
                    for track in snap.track_ids() {
                        let hashes: Vec<FingerprintHash> = track_hashes(track.0, per_track)
                            .iter()
                            .map(|h| h.hash)
                            .collect();
                        let total: usize = snap
                            .lookup(&hashes)
                            .values()
                            .flatten()
                            .filter(|p| p.track_id == track)
                            .count();
                        assert_eq!(total, per_track as usize);
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(idx.stats().live_tracks, 50);
}
