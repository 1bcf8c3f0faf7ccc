//! The recognizer: every stage wired to one caller-owned index.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use features::FeatureExtractor;
use fingerprint::{FingerprintGenerator, HashedLandmark, QueryFingerprintSet};
use index::{
    CompactionReport, FingerprintIndex, IndexStats, InsertReport, PostingMap, TrackId,
    TrackPostings,
};
use matcher::{MatchOutcome, MatchScorer, ScoreReport};
use preprocess::{preprocess, PcmAudio, PreprocessConfig};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{info, warn, Level};

use crate::cancel::CancelToken;
use crate::config::TunefpConfig;
use crate::error::PipelineError;
use crate::metrics::{MetricsSpan, RecognitionMetrics};
use crate::streaming::{StreamConfig, StreamOutcome, StreamingSession};

/// One track queued for [`Recognizer::ingest_batch`].
#[derive(Debug, Clone, Copy)]
pub struct IngestJob<'a> {
    pub track_id: TrackId,
    pub audio: PcmAudio<'a>,
}

impl<'a> IngestJob<'a> {
    pub fn new(track_id: TrackId, audio: PcmAudio<'a>) -> Self {
        Self { track_id, audio }
    }
}

/// Outcome of a batch ingest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchIngestReport {
    /// Tracks whose postings are now visible, in job order.
    pub inserted: Vec<InsertReport>,
    /// Tracks rejected by fingerprinting or by the index.
    pub failed: Vec<(TrackId, PipelineError)>,
    /// Tracks not started because the batch was cancelled.
    pub skipped: Vec<TrackId>,
    pub cancelled: bool,
    /// Generation that made the inserted tracks visible, if any were.
    pub generation: Option<u64>,
}

/// Counters since the recognizer was built, plus the current index state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RecognizerStats {
    pub recognitions: u64,
    pub matches: u64,
    pub failures: u64,
    pub total_latency_micros: u64,
    pub streams: u64,
    pub stream_matches: u64,
    pub index: IndexStats,
}

impl RecognizerStats {
    /// Mean latency of successful recognitions.
    pub fn average_latency_micros(&self) -> f64 {
        if self.recognitions == 0 {
            return 0.0;
        }
        self.total_latency_micros as f64 / self.recognitions as f64
    }

    pub fn match_rate(&self) -> f64 {
        if self.recognitions == 0 {
            return 0.0;
        }
        self.matches as f64 / self.recognitions as f64
    }
}

#[derive(Debug, Default)]
struct Counters {
    recognitions: AtomicU64,
    matches: AtomicU64,
    failures: AtomicU64,
    latency_micros: AtomicU64,
    streams: AtomicU64,
    stream_matches: AtomicU64,
}

enum JobResult {
    Skipped(TrackId),
    Done(TrackId, Result<Vec<HashedLandmark>, PipelineError>),
}

/// Fingerprints, ingests and recognizes audio against one index.
///
/// The index is shared: several recognizers, or other threads holding the
/// same `Arc`, can read and write it concurrently. Queries always run
/// against a consistent snapshot.
pub struct Recognizer {
    preprocess: PreprocessConfig,
    extractor: FeatureExtractor,
    generator: FingerprintGenerator,
    scorer: MatchScorer,
    streaming: StreamConfig,
    profile: u64,
    index: Arc<FingerprintIndex>,
    metrics: Option<Arc<dyn RecognitionMetrics>>,
    counters: Counters,
}

impl Recognizer {
    /// Build every stage from `config` around an existing index.
    ///
    /// An unbound index is bound to `config`'s hash profile. An index built
    /// under another profile is refused with
    /// [`IndexError::VersionMismatch`](index::IndexError::VersionMismatch),
    /// since its postings would be compared against hashes that mean
    /// something else. `config.index` is not used; the index keeps the
    /// configuration it was created with.
    pub fn new(config: &TunefpConfig, index: Arc<FingerprintIndex>) -> Result<Self, PipelineError> {
        config.preprocess.validate()?;
        config
            .features
            .validate_for_rate(config.preprocess.target_sample_rate)?;
        config.streaming.validate()?;
        let profile = config.hash_profile();
        let recognizer = Self {
            preprocess: config.preprocess.clone(),
            extractor: FeatureExtractor::new(config.features.clone())?,
            generator: FingerprintGenerator::new(config.fingerprint.clone())?,
            scorer: MatchScorer::new(config.matcher.clone())?,
            streaming: config.streaming.clone(),
            profile,
            index,
            metrics: None,
            counters: Counters::default(),
        };
        recognizer.index.bind_profile(profile)?;
        Ok(recognizer)
    }

    /// Build a recognizer over a fresh, empty index.
    pub fn in_memory(config: &TunefpConfig) -> Result<Self, PipelineError> {
        let index = FingerprintIndex::with_profile(config.index.clone(), config.hash_profile())?;
        Self::new(config, Arc::new(index))
    }

    /// Build a recognizer over an index saved with [`FingerprintIndex::save`].
    ///
    /// The file's hash profile is checked against `config` before any
    /// posting is decoded.
    pub fn open<P: AsRef<Path>>(config: &TunefpConfig, path: P) -> Result<Self, PipelineError> {
        let index =
            FingerprintIndex::load_with_profile(path, config.index.clone(), config.hash_profile())?;
        Self::new(config, Arc::new(index))
    }

    /// Report ingests, recognitions and streams to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn RecognitionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn index(&self) -> &Arc<FingerprintIndex> {
        &self.index
    }

    pub fn stream_config(&self) -> &StreamConfig {
        &self.streaming
    }

    /// Digest of the settings this recognizer hashes under. See
    /// [`TunefpConfig::hash_profile`].
    pub fn hash_profile(&self) -> u64 {
        self.profile
    }

    /// Preprocess, extract and hash `audio`.
    pub fn fingerprint(&self, audio: PcmAudio<'_>) -> Result<QueryFingerprintSet, PipelineError> {
        let samples = preprocess(audio, &self.preprocess)?;
        let landmarks = self
            .extractor
            .extract(&samples, self.preprocess.target_sample_rate)?;
        let duration_ms = landmarks.duration_ms();
        Ok(self.generator.fingerprint_query(landmarks, duration_ms))
    }

    fn fingerprint_track(
        &self,
        track_id: TrackId,
        audio: PcmAudio<'_>,
    ) -> Result<Vec<HashedLandmark>, PipelineError> {
        let set = self.fingerprint(audio)?;
        if set.is_empty() {
            return Err(PipelineError::NoHashes { track_id });
        }
        Ok(set.hashes)
    }

    /// Fingerprint one track and add it to the index.
    ///
    /// Either every posting of the track becomes visible or none does. A
    /// live track is only overwritten when `replace` is set.
    pub fn ingest(
        &self,
        track_id: TrackId,
        audio: PcmAudio<'_>,
        replace: bool,
    ) -> Result<InsertReport, PipelineError> {
        let start = Instant::now();
        let metrics = MetricsSpan::start(self.metrics.as_ref());
        let span = tracing::span!(Level::INFO, "tunefp.ingest", track_id = track_id.0, replace);
        let _guard = span.enter();

        let result = self
            .fingerprint_track(track_id, audio)
            .and_then(|hashes| Ok(self.index.insert(track_id, &hashes, replace)?));

        let elapsed_micros = start.elapsed().as_micros();
        match &result {
            Ok(report) => info!(
                track_id = track_id.0,
                postings = report.postings,
                replaced = report.replaced,
                generation = report.generation,
                elapsed_micros,
                "ingest_success"
            ),
            Err(err) => warn!(track_id = track_id.0, error = %err, elapsed_micros, "ingest_failure"),
        }
        if let Some(span) = metrics {
            span.record_ingest(track_id, result.as_ref().map(|_| ()).map_err(Clone::clone));
        }
        result
    }

    /// Fingerprint many tracks in parallel and insert the successful ones as
    /// one index batch.
    ///
    /// `cancel` is checked before each track starts. Tracks fingerprinted
    /// before cancellation are still inserted; the rest are reported as
    /// skipped.
    pub fn ingest_batch(
        &self,
        jobs: &[IngestJob<'_>],
        replace: bool,
        cancel: &CancelToken,
    ) -> BatchIngestReport {
        let start = Instant::now();
        let span = tracing::span!(Level::INFO, "tunefp.ingest_batch", jobs = jobs.len(), replace);
        let _guard = span.enter();

        let run = |job: &IngestJob<'_>| {
            if cancel.is_cancelled() {
                return JobResult::Skipped(job.track_id);
            }
            JobResult::Done(job.track_id, self.fingerprint_track(job.track_id, job.audio))
        };
        #[cfg(feature = "parallel")]
        let results: Vec<JobResult> = jobs.par_iter().map(run).collect();
        #[cfg(not(feature = "parallel"))]
        let results: Vec<JobResult> = jobs.iter().map(run).collect();

        let mut report = BatchIngestReport::default();
        let mut batch = Vec::new();
        for result in results {
            match result {
                JobResult::Skipped(track_id) => report.skipped.push(track_id),
                JobResult::Done(track_id, Ok(hashes)) => {
                    batch.push(TrackPostings::new(track_id, hashes))
                }
                JobResult::Done(track_id, Err(err)) => report.failed.push((track_id, err)),
            }
        }
        report.cancelled = !report.skipped.is_empty();

        if !batch.is_empty() {
            let ids: Vec<TrackId> = batch.iter().map(|t| t.track_id).collect();
            match self.index.insert_batch(batch, replace) {
                Ok(inserted) => {
                    report.inserted = inserted.inserted;
                    report.generation = inserted.generation;
                    report.failed.extend(
                        inserted
                            .rejected
                            .into_iter()
                            .map(|(track_id, err)| (track_id, PipelineError::from(err))),
                    );
                }
                Err(err) => {
                    report
                        .failed
                        .extend(ids.into_iter().map(|id| (id, PipelineError::from(err.clone()))));
                }
            }
        }

        let elapsed = start.elapsed();
        if let Some(metrics) = &self.metrics {
            for inserted in &report.inserted {
                metrics.record_ingest(inserted.track_id, elapsed, Ok(()));
            }
            for (track_id, err) in &report.failed {
                metrics.record_ingest(*track_id, elapsed, Err(err.clone()));
            }
        }
        for (track_id, err) in &report.failed {
            warn!(track_id = track_id.0, error = %err, "ingest_failure");
        }
        info!(
            inserted = report.inserted.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            generation = ?report.generation,
            elapsed_micros = elapsed.as_micros(),
            "ingest_batch_complete"
        );
        report
    }

    /// Identify the track `audio` was taken from.
    pub fn recognize(&self, audio: PcmAudio<'_>) -> Result<MatchOutcome, PipelineError> {
        self.recognize_detailed(audio).map(|report| report.outcome)
    }

    /// [`Recognizer::recognize`] plus the ranked candidates behind the decision.
    pub fn recognize_detailed(&self, audio: PcmAudio<'_>) -> Result<ScoreReport, PipelineError> {
        let start = Instant::now();
        let metrics = MetricsSpan::start(self.metrics.as_ref());
        let span = tracing::span!(
            Level::INFO,
            "tunefp.recognize",
            duration_ms = audio.duration_ms(),
            channels = audio.channels
        );
        let _guard = span.enter();

        let result = self
            .lookup(audio)
            .map(|(query, postings)| self.scorer.score_detailed(&query, &postings));

        let elapsed = start.elapsed();
        let elapsed_micros = elapsed.as_micros();
        match &result {
            Ok(report) => {
                self.count_recognition(&report.outcome, elapsed);
                match report.outcome {
                    MatchOutcome::Matched(r) => info!(
                        track_id = r.track_id.0,
                        confidence = r.confidence,
                        time_offset_ms = r.time_offset_ms,
                        matched_hash_count = r.matched_hash_count,
                        query_hashes = report.query_hashes,
                        elapsed_micros,
                        "recognize_match"
                    ),
                    _ => info!(
                        query_hashes = report.query_hashes,
                        candidates = report.candidates.len(),
                        ambiguous = matches!(report.outcome, MatchOutcome::Ambiguous(_)),
                        elapsed_micros,
                        "recognize_no_match"
                    ),
                }
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, elapsed_micros, "recognize_failure");
            }
        }
        if let Some(span) = metrics {
            span.record_recognize(
                result
                    .as_ref()
                    .map(|report| report.outcome)
                    .map_err(Clone::clone),
            );
        }
        result
    }

    /// Recognize several excerpts, in parallel when the `parallel` feature
    /// is on. Results are in input order.
    pub fn recognize_batch(
        &self,
        queries: &[PcmAudio<'_>],
    ) -> Vec<Result<MatchOutcome, PipelineError>> {
        #[cfg(feature = "parallel")]
        let results = queries.par_iter().map(|q| self.recognize(*q)).collect();
        #[cfg(not(feature = "parallel"))]
        let results = queries.iter().map(|q| self.recognize(*q)).collect();
        results
    }

    /// Tombstone a track. Returns `false` if it was not indexed.
    pub fn remove(&self, track_id: TrackId) -> Result<bool, PipelineError> {
        Ok(self.index.remove(track_id)?)
    }

    /// Physically drop tombstoned postings.
    pub fn compact(&self) -> Result<CompactionReport, PipelineError> {
        Ok(self.index.compact()?)
    }

    pub fn stats(&self) -> RecognizerStats {
        let c = &self.counters;
        RecognizerStats {
            recognitions: c.recognitions.load(Ordering::Relaxed),
            matches: c.matches.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            total_latency_micros: c.latency_micros.load(Ordering::Relaxed),
            streams: c.streams.load(Ordering::Relaxed),
            stream_matches: c.stream_matches.load(Ordering::Relaxed),
            index: self.index.stats(),
        }
    }

    /// Start a streaming session with the configured [`StreamConfig`].
    pub fn session(&self, cancel: &CancelToken) -> StreamingSession<'_> {
        StreamingSession::new(self, self.streaming.clone(), cancel.clone())
    }

    /// Start a streaming session with its own input layout and timing.
    pub fn session_with(
        &self,
        config: StreamConfig,
        cancel: &CancelToken,
    ) -> Result<StreamingSession<'_>, PipelineError> {
        config.validate()?;
        Ok(StreamingSession::new(self, config, cancel.clone()))
    }

    /// Fingerprint `audio` and fetch the postings of its hashes from the
    /// current snapshot.
    pub(crate) fn lookup(
        &self,
        audio: PcmAudio<'_>,
    ) -> Result<(QueryFingerprintSet, PostingMap), PipelineError> {
        let query = self.fingerprint(audio)?;
        let postings = self.index.lookup(&query.unique_hashes());
        Ok((query, postings))
    }

    pub(crate) fn scorer(&self) -> &MatchScorer {
        &self.scorer
    }

    fn count_recognition(&self, outcome: &MatchOutcome, latency: Duration) {
        let c = &self.counters;
        c.recognitions.fetch_add(1, Ordering::Relaxed);
        if outcome.is_match() {
            c.matches.fetch_add(1, Ordering::Relaxed);
        }
        c.latency_micros.fetch_add(
            u64::try_from(latency.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    pub(crate) fn record_stream(&self, listened: Duration, outcome: &StreamOutcome) {
        self.counters.streams.fetch_add(1, Ordering::Relaxed);
        if matches!(outcome, StreamOutcome::Matched(_)) {
            self.counters.stream_matches.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_stream(listened, outcome);
        }
    }
}

impl std::fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recognizer")
            .field("preprocess", &self.preprocess)
            .field("extractor", &self.extractor)
            .field("generator", &self.generator)
            .field("scorer", &self.scorer)
            .field("streaming", &self.streaming)
            .field("profile", &self.profile)
            .field("index", &self.index)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}
