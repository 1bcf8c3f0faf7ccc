// Metrics hooks for the recognition pipeline.
//
// A `RecognitionMetrics` implementation is attached to a `Recognizer` with
// `Recognizer::with_metrics`. Every ingest, recognition and finished stream is
// reported to it; nothing is recorded when no observer is attached.
use std::sync::Arc;
use std::time::{Duration, Instant};

use index::TrackId;
use matcher::MatchOutcome;

use crate::error::PipelineError;
use crate::streaming::StreamOutcome;

/// Metrics observer for pipeline operations.
pub trait RecognitionMetrics: Send + Sync {
    /// One track ingest, successful or not.
    fn record_ingest(&self, track_id: TrackId, latency: Duration, result: Result<(), PipelineError>);

    /// One recognition of a complete excerpt.
    fn record_recognize(&self, latency: Duration, result: Result<MatchOutcome, PipelineError>);

    /// One finished streaming session. `listened` is audio time, not wall time.
    fn record_stream(&self, listened: Duration, outcome: &StreamOutcome);
}

pub(crate) struct MetricsSpan {
    recorder: Arc<dyn RecognitionMetrics>,
    start: Instant,
}

impl MetricsSpan {
    pub(crate) fn start(recorder: Option<&Arc<dyn RecognitionMetrics>>) -> Option<Self> {
        recorder.map(|recorder| Self {
            recorder: Arc::clone(recorder),
            start: Instant::now(),
        })
    }

    pub(crate) fn record_ingest(self, track_id: TrackId, result: Result<(), PipelineError>) {
        self.recorder
            .record_ingest(track_id, self.start.elapsed(), result);
    }

    pub(crate) fn record_recognize(self, result: Result<MatchOutcome, PipelineError>) {
        self.recorder.record_recognize(self.start.elapsed(), result);
    }
}
