use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use fingerprint::{FingerprintHash, HashedLandmark};
use index::{FingerprintIndex, IndexConfig, TrackId, TrackPostings};

fn track(seed: u32, n: u32) -> Vec<HashedLandmark> {
    (0..n)
        .map(|i| HashedLandmark {
            hash: FingerprintHash(seed.wrapping_mul(2_654_435_761).wrapping_add(i * 40_503)),
            anchor_time_ms: i * 50,
        })
        .collect()
}

fn populated(tracks: u32, per_track: u32) -> FingerprintIndex {
    let index = FingerprintIndex::new(IndexConfig::default()).expect("index");
    let batch = (0..tracks)
        .map(|t| TrackPostings::new(TrackId(t), track(t, per_track)))
        .collect();
    index.insert_batch(batch, false).expect("batch");
    index
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");

    for size in [10u32, 100, 1000] {
        let batch: Vec<TrackPostings> = (0..size)
            .map(|t| TrackPostings::new(TrackId(t), track(t, 3_600)))
            .collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("insert_batch_{size}"), |b| {
            b.iter_batched(
                || batch.clone(),
                |batch| {
                    let index = FingerprintIndex::new(IndexConfig::default()).expect("index");
                    index.insert_batch(batch, false).expect("batch")
                },
                BatchSize::LargeInput,
            )
        });
    }

    let index = populated(1_000, 3_600);
    let query: Vec<FingerprintHash> = track(500, 3_600)[1_000..1_600]
        .iter()
        .map(|h| h.hash)
        .collect();
    group.throughput(Throughput::Elements(query.len() as u64));
    group.bench_function("lookup_600_hashes", |b| {
        b.iter(|| index.lookup(black_box(&query)))
    });

    group.finish();
}

criterion_group!(benches, bench_index);
criterion_main!(benches);
