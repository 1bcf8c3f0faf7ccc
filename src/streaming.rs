//! Incremental recognition over audio that arrives in chunks.
//!
//! A [`StreamingSession`] is an explicit state machine:
//!
//! ```text
//!  push ──► Buffering ──ready──► Extracting ──► Scoring ──confident──► Matched
//!              ▲                                   │
//!              └─────── not confident, budget left ┤
//!                                                  └─ budget spent ──► TimedOut
//!
//!  any non-terminal state ──cancel──► Cancelled
//!  finish() with nothing left to try ──► Ended
//! ```
//!
//! [`StreamingSession::step`] performs exactly one transition. Cancellation
//! is checked before every transition and never interrupts an extraction in
//! progress. The listening budget is measured in audio received, not wall
//! time, so sessions behave identically in tests and in production.

use std::time::Duration;

use fingerprint::QueryFingerprintSet;
use index::PostingMap;
use matcher::{MatchOutcome, RecognitionResult, ScoreReport};
use preprocess::PcmAudio;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::PipelineError;
use crate::pipeline::Recognizer;

/// Errors raised by streaming sessions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("chunk of {samples} samples does not divide into {channels} channels")]
    MisalignedChunk { samples: usize, channels: u16 },
}

/// Timing and input layout of a streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Audio needed before the first analysis.
    pub min_analysis_ms: u32,
    /// New audio needed between two analyses.
    pub analysis_interval_ms: u32,
    /// Audio kept after an unsuccessful analysis, so landmark pairs that
    /// straddle two windows are not lost.
    pub retain_ms: u32,
    /// Longest window ever analysed. Older audio is dropped.
    pub max_window_ms: u32,
    /// Listening budget. The session times out once this much audio has been
    /// received without a confident match.
    pub max_listen_ms: u32,
    pub input_sample_rate: u32,
    pub input_channels: u16,
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_analysis(mut self, min_analysis_ms: u32, analysis_interval_ms: u32) -> Self {
        self.min_analysis_ms = min_analysis_ms;
        self.analysis_interval_ms = analysis_interval_ms;
        self
    }

    pub fn with_window(mut self, retain_ms: u32, max_window_ms: u32) -> Self {
        self.retain_ms = retain_ms;
        self.max_window_ms = max_window_ms;
        self
    }

    pub fn with_max_listen_ms(mut self, max_listen_ms: u32) -> Self {
        self.max_listen_ms = max_listen_ms;
        self
    }

    pub fn with_input(mut self, sample_rate: u32, channels: u16) -> Self {
        self.input_sample_rate = sample_rate;
        self.input_channels = channels;
        self
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        let invalid = |msg: String| Err(StreamError::InvalidConfig(msg));
        if self.input_sample_rate == 0 {
            return invalid("input_sample_rate must be non-zero".into());
        }
        if self.input_channels == 0 {
            return invalid("input_channels must be non-zero".into());
        }
        if self.min_analysis_ms == 0 || self.analysis_interval_ms == 0 {
            return invalid("min_analysis_ms and analysis_interval_ms must be non-zero".into());
        }
        if self.min_analysis_ms > self.max_window_ms {
            return invalid(format!(
                "min_analysis_ms {} exceeds max_window_ms {}",
                self.min_analysis_ms, self.max_window_ms
            ));
        }
        if self.retain_ms > self.max_window_ms {
            return invalid(format!(
                "retain_ms {} exceeds max_window_ms {}",
                self.retain_ms, self.max_window_ms
            ));
        }
        if self.max_listen_ms < self.min_analysis_ms {
            return invalid(format!(
                "max_listen_ms {} is shorter than min_analysis_ms {}",
                self.max_listen_ms, self.min_analysis_ms
            ));
        }
        Ok(())
    }

    fn frames(&self, ms: u32) -> u64 {
        u64::from(ms) * u64::from(self.input_sample_rate) / 1000
    }

    fn millis(&self, frames: u64) -> u64 {
        frames * 1000 / u64::from(self.input_sample_rate)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            min_analysis_ms: 4_000,
            analysis_interval_ms: 2_000,
            retain_ms: 6_000,
            max_window_ms: 12_000,
            max_listen_ms: 30_000,
            input_sample_rate: 8_000,
            input_channels: 1,
        }
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamState {
    Buffering,
    Extracting,
    Scoring,
    /// Terminal. The offset is relative to the session's first sample.
    Matched(RecognitionResult),
    /// Terminal. The listening budget ran out.
    TimedOut,
    /// Terminal. Cancelled through the token or [`StreamingSession::cancel`].
    Cancelled,
    /// Terminal. Input ended before a match or timeout.
    Ended,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Matched(_)
                | StreamState::TimedOut
                | StreamState::Cancelled
                | StreamState::Ended
        )
    }
}

/// Final result of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StreamOutcome {
    Matched(RecognitionResult),
    NoMatch,
    TimedOut,
    Cancelled,
}

impl StreamOutcome {
    pub fn result(&self) -> Option<&RecognitionResult> {
        match self {
            StreamOutcome::Matched(result) => Some(result),
            _ => None,
        }
    }
}

/// An analysed window waiting to be scored.
struct PendingWindow {
    /// Session frame of the window's first sample.
    start_frame: u64,
    /// `None` when the window held too little signal to fingerprint.
    query: Option<(QueryFingerprintSet, PostingMap)>,
}

/// Incremental recognizer over pushed audio chunks.
///
/// Create one with [`Recognizer::session`]. Feed audio with
/// [`StreamingSession::push`], drive it with [`StreamingSession::step`] or
/// [`StreamingSession::advance`], and call [`StreamingSession::finish`] when
/// the input ends.
pub struct StreamingSession<'r> {
    recognizer: &'r Recognizer,
    cfg: StreamConfig,
    cancel: CancelToken,
    state: StreamState,
    /// Interleaved samples of the current window.
    buffer: Vec<f32>,
    /// Session frame of `buffer[0]`.
    buffer_start: u64,
    /// Frames received since the session started.
    received: u64,
    /// `received` when the last analysis started.
    analyzed_until: Option<u64>,
    pending: Option<PendingWindow>,
    analyses: u32,
    last_report: Option<ScoreReport>,
}

impl<'r> StreamingSession<'r> {
    pub(crate) fn new(recognizer: &'r Recognizer, cfg: StreamConfig, cancel: CancelToken) -> Self {
        Self {
            recognizer,
            cfg,
            cancel,
            state: StreamState::Buffering,
            buffer: Vec::new(),
            buffer_start: 0,
            received: 0,
            analyzed_until: None,
            pending: None,
            analyses: 0,
            last_report: None,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn config(&self) -> &StreamConfig {
        &self.cfg
    }

    /// Audio received so far, in milliseconds.
    pub fn listened_ms(&self) -> u64 {
        self.cfg.millis(self.received)
    }

    /// Audio currently buffered for the next analysis, in milliseconds.
    pub fn buffered_ms(&self) -> u64 {
        self.cfg.millis(self.buffered_frames())
    }

    /// Windows analysed so far.
    pub fn analyses(&self) -> u32 {
        self.analyses
    }

    /// Scoring details of the most recent analysed window.
    pub fn last_report(&self) -> Option<&ScoreReport> {
        self.last_report.as_ref()
    }

    /// The outcome once the session reached a terminal state.
    pub fn outcome(&self) -> Option<StreamOutcome> {
        match self.state {
            StreamState::Matched(result) => Some(StreamOutcome::Matched(result)),
            StreamState::TimedOut => Some(StreamOutcome::TimedOut),
            StreamState::Cancelled => Some(StreamOutcome::Cancelled),
            StreamState::Ended => Some(StreamOutcome::NoMatch),
            StreamState::Buffering | StreamState::Extracting | StreamState::Scoring => None,
        }
    }

    /// Append interleaved samples in the session's input layout.
    ///
    /// Ignored once the session is terminal. The buffer never grows past
    /// `max_window_ms`; the oldest audio is dropped first.
    pub fn push(&mut self, chunk: &[f32]) -> Result<(), PipelineError> {
        if self.state.is_terminal() {
            return Ok(());
        }
        let channels = usize::from(self.cfg.input_channels);
        if chunk.len() % channels != 0 {
            return Err(StreamError::MisalignedChunk {
                samples: chunk.len(),
                channels: self.cfg.input_channels,
            }
            .into());
        }
        self.buffer.extend_from_slice(chunk);
        self.received += (chunk.len() / channels) as u64;

        let max_frames = self.cfg.frames(self.cfg.max_window_ms);
        let buffered = self.buffered_frames();
        if buffered > max_frames {
            self.drop_oldest(buffered - max_frames);
        }
        Ok(())
    }

    /// Perform at most one state transition and return the new state.
    ///
    /// An extraction error other than insufficient signal is returned after
    /// the session has gone back to buffering; the failed window counts as
    /// analysed.
    pub fn step(&mut self) -> Result<&StreamState, PipelineError> {
        if self.state.is_terminal() {
            return Ok(&self.state);
        }
        if self.cancel.is_cancelled() {
            self.terminate(StreamState::Cancelled);
            return Ok(&self.state);
        }
        match self.state {
            StreamState::Buffering => {
                if self.ready() {
                    self.state = StreamState::Extracting;
                }
            }
            StreamState::Extracting => {
                if let Err(err) = self.extract() {
                    self.state = StreamState::Buffering;
                    return Err(err);
                }
                self.state = StreamState::Scoring;
            }
            StreamState::Scoring => self.score(),
            _ => {}
        }
        Ok(&self.state)
    }

    /// Step until the session needs more audio or is terminal.
    pub fn advance(&mut self) -> Result<&StreamState, PipelineError> {
        loop {
            let before = self.state;
            self.step()?;
            let idle = before == StreamState::Buffering && self.state == StreamState::Buffering;
            if idle || self.state.is_terminal() {
                return Ok(&self.state);
            }
        }
    }

    /// End of input: analyse any audio not yet analysed, then stop.
    pub fn finish(&mut self) -> Result<StreamOutcome, PipelineError> {
        self.advance()?;
        if !self.state.is_terminal() && self.has_unanalysed_audio() {
            self.state = StreamState::Extracting;
            self.advance()?;
        }
        if !self.state.is_terminal() {
            self.terminate(StreamState::Ended);
        }
        Ok(self.outcome().unwrap_or(StreamOutcome::NoMatch))
    }

    /// Cancel the session and release its buffers. No result is emitted.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.terminate(StreamState::Cancelled);
        }
    }

    fn buffered_frames(&self) -> u64 {
        (self.buffer.len() / usize::from(self.cfg.input_channels)) as u64
    }

    fn has_unanalysed_audio(&self) -> bool {
        self.received > self.analyzed_until.unwrap_or(0) && !self.buffer.is_empty()
    }

    fn ready(&self) -> bool {
        if self.buffered_frames() < self.cfg.frames(self.cfg.min_analysis_ms) {
            return false;
        }
        match self.analyzed_until {
            None => true,
            Some(at) => {
                self.received - at >= self.cfg.frames(self.cfg.analysis_interval_ms)
            }
        }
    }

    fn extract(&mut self) -> Result<(), PipelineError> {
        self.analyzed_until = Some(self.received);
        let audio = PcmAudio::new(
            &self.buffer,
            self.cfg.input_sample_rate,
            self.cfg.input_channels,
        );
        let query = match self.recognizer.lookup(audio) {
            Ok(found) => Some(found),
            Err(err) if err.is_insufficient_signal() => {
                debug!(
                    window_ms = self.buffered_ms(),
                    error = %err,
                    "stream_window_insufficient"
                );
                None
            }
            Err(err) => return Err(err),
        };
        self.pending = Some(PendingWindow {
            start_frame: self.buffer_start,
            query,
        });
        Ok(())
    }

    fn score(&mut self) {
        let Some(window) = self.pending.take() else {
            self.state = StreamState::Buffering;
            return;
        };
        self.analyses += 1;
        let report = window
            .query
            .map(|(query, postings)| self.recognizer.scorer().score_detailed(&query, &postings));
        let outcome = report
            .as_ref()
            .map_or(MatchOutcome::NoMatch, |report| report.outcome);
        debug!(
            analysis = self.analyses,
            window_start_ms = self.cfg.millis(window.start_frame),
            listened_ms = self.listened_ms(),
            matched = outcome.is_match(),
            "stream_window_scored"
        );
        self.last_report = report;

        if let MatchOutcome::Matched(mut result) = outcome {
            let window_start_ms = u32::try_from(self.cfg.millis(window.start_frame))
                .unwrap_or(u32::MAX);
            result.time_offset_ms = result.time_offset_ms.saturating_sub(window_start_ms);
            self.terminate(StreamState::Matched(result));
        } else if self.listened_ms() >= u64::from(self.cfg.max_listen_ms) {
            self.terminate(StreamState::TimedOut);
        } else {
            let keep = self.cfg.frames(self.cfg.retain_ms);
            let buffered = self.buffered_frames();
            if buffered > keep {
                self.drop_oldest(buffered - keep);
            }
            self.state = StreamState::Buffering;
        }
    }

    fn drop_oldest(&mut self, frames: u64) {
        let samples = frames as usize * usize::from(self.cfg.input_channels);
        self.buffer.drain(..samples.min(self.buffer.len()));
        self.buffer_start += frames;
    }

    fn terminate(&mut self, state: StreamState) {
        self.state = state;
        self.buffer = Vec::new();
        self.pending = None;

        let listened_ms = self.listened_ms();
        let outcome = self.outcome().unwrap_or(StreamOutcome::NoMatch);
        match outcome {
            StreamOutcome::Matched(result) => info!(
                track_id = result.track_id.0,
                confidence = result.confidence,
                time_offset_ms = result.time_offset_ms,
                listened_ms,
                analyses = self.analyses,
                "stream_matched"
            ),
            StreamOutcome::TimedOut => info!(listened_ms, analyses = self.analyses, "stream_timed_out"),
            StreamOutcome::Cancelled => info!(listened_ms, analyses = self.analyses, "stream_cancelled"),
            StreamOutcome::NoMatch => info!(listened_ms, analyses = self.analyses, "stream_ended"),
        }
        self.recognizer
            .record_stream(Duration::from_millis(listened_ms), &outcome);
    }
}

impl std::fmt::Debug for StreamingSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("cfg", &self.cfg)
            .field("state", &self.state)
            .field("received", &self.received)
            .field("buffered_frames", &self.buffered_frames())
            .field("analyses", &self.analyses)
            .finish()
    }
}

#[cfg(feature = "streaming")]
mod stream {
    use futures::{Stream, StreamExt};
    use tracing::{Instrument, Level};

    use super::StreamOutcome;
    use crate::cancel::CancelToken;
    use crate::error::PipelineError;
    use crate::pipeline::Recognizer;

    impl Recognizer {
        /// Run a streaming session over `chunks` until it matches, times out,
        /// is cancelled or the stream ends.
        ///
        /// Each item is a chunk of interleaved samples in the configured
        /// input layout. The future only suspends while waiting for the next
        /// chunk; all analysis runs synchronously on the polling task.
        pub async fn recognize_stream<S>(
            &self,
            chunks: S,
            cancel: &CancelToken,
        ) -> Result<StreamOutcome, PipelineError>
        where
            S: Stream<Item = Vec<f32>>,
        {
            let cfg = self.stream_config();
            let span = tracing::span!(
                Level::INFO,
                "tunefp.stream",
                sample_rate = cfg.input_sample_rate,
                channels = cfg.input_channels
            );
            async move {
                let mut chunks = std::pin::pin!(chunks);
                let mut session = self.session(cancel);
                while let Some(chunk) = chunks.next().await {
                    session.push(&chunk)?;
                    if session.advance()?.is_terminal() {
                        break;
                    }
                }
                session.finish()
            }
            .instrument(span)
            .await
        }
    }
}
