//! Lazy, restartable landmark iteration.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::cepstral::MelBank;
use crate::chroma::ChromaMap;
use crate::config::FeatureConfig;
use crate::landmark::Landmark;
use crate::peaks::{pick_peaks, AdaptiveFloor, Peak, PeakRule};
use crate::spectrum::{amplitude_db, FramePlan, FrameTransform};

/// Per-strategy frame analysis state.
#[derive(Clone)]
pub(crate) enum FrameAnalyzer {
    SpectralPeak {
        /// FFT bins eligible for peaks.
        range: Range<usize>,
        levels: Vec<f32>,
    },
    Cepstral {
        bank: Arc<MelBank>,
        margin_db: f32,
        band_levels: Vec<f32>,
        cepstrum: Vec<f32>,
        envelope: Vec<f32>,
    },
    Chroma {
        map: Arc<ChromaMap>,
        margin_db: f32,
        /// Classes per semitone, the peak neighbourhood.
        neighborhood: usize,
        energy: Vec<f32>,
        levels: Vec<f32>,
    },
}

impl FrameAnalyzer {
    pub(crate) fn spectral(cfg: &FeatureConfig, sample_rate: u32, bins: usize) -> Self {
        let bin_hz = sample_rate as f32 / cfg.window_size as f32;
        let start = (cfg.min_frequency_hz / bin_hz).ceil() as usize;
        let end = ((cfg.max_frequency_hz / bin_hz).floor() as usize + 1).min(bins);
        FrameAnalyzer::SpectralPeak {
            range: start.min(end)..end,
            levels: vec![0.0; bins],
        }
    }

    pub(crate) fn cepstral(bank: Arc<MelBank>, margin_db: f32) -> Self {
        let bands = bank.bands();
        FrameAnalyzer::Cepstral {
            bank,
            margin_db,
            band_levels: vec![0.0; bands],
            cepstrum: vec![0.0; bands],
            envelope: vec![0.0; bands],
        }
    }

    pub(crate) fn chroma(map: Arc<ChromaMap>, margin_db: f32) -> Self {
        let classes = map.classes();
        FrameAnalyzer::Chroma {
            map,
            margin_db,
            neighborhood: (classes / 12).max(1),
            energy: vec![0.0; classes],
            levels: vec![0.0; classes],
        }
    }

    /// Width of the level vector the adaptive floor tracks.
    pub(crate) fn floor_len(&self) -> usize {
        match self {
            FrameAnalyzer::SpectralPeak { levels, .. } => levels.len(),
            FrameAnalyzer::Cepstral { envelope, .. } => envelope.len(),
            FrameAnalyzer::Chroma { levels, .. } => levels.len(),
        }
    }

    /// Starting floor level. The envelope is mean-removed, so it starts at 0 dB.
    pub(crate) fn floor_start_db(&self, cfg: &FeatureConfig) -> f32 {
        match self {
            FrameAnalyzer::SpectralPeak { .. } | FrameAnalyzer::Chroma { .. } => {
                cfg.min_level_db
            }
            FrameAnalyzer::Cepstral { .. } => 0.0,
        }
    }

    /// Analyse one frame's magnitudes, push peaks into `peaks` and fold the
    /// frame into `floor`.
    fn analyze(
        &mut self,
        magnitudes: &[f32],
        cfg: &FeatureConfig,
        floor: &mut AdaptiveFloor,
        peaks: &mut Vec<Peak>,
    ) {
        let mut rule = PeakRule {
            neighborhood: cfg.peak_neighborhood,
            margin_db: cfg.floor_margin_db,
            min_level_db: cfg.min_level_db,
            max_peaks: cfg.max_peaks_per_frame,
            circular: false,
        };
        match self {
            FrameAnalyzer::SpectralPeak { range, levels } => {
                for (level, &m) in levels.iter_mut().zip(magnitudes) {
                    *level = amplitude_db(m);
                }
                pick_peaks(levels, levels, range.clone(), floor, rule, peaks);
                floor.update(levels);
            }
            FrameAnalyzer::Cepstral {
                bank,
                margin_db,
                band_levels,
                cepstrum,
                envelope,
            } => {
                bank.band_levels(magnitudes, band_levels);
                bank.envelope(band_levels, cepstrum, envelope);
                rule.margin_db = *margin_db;
                let bands = envelope.len();
                pick_peaks(envelope, band_levels, 0..bands, floor, rule, peaks);
                floor.update(envelope);
            }
            FrameAnalyzer::Chroma {
                map,
                margin_db,
                neighborhood,
                energy,
                levels,
            } => {
                map.fold(magnitudes, energy, levels);
                rule.margin_db = *margin_db;
                rule.neighborhood = *neighborhood;
                rule.circular = true;
                let classes = levels.len();
                pick_peaks(levels, levels, 0..classes, floor, rule, peaks);
                floor.update(levels);
            }
        }
    }

    fn frequency_bin(&self, bin: usize, cfg: &FeatureConfig) -> u16 {
        match self {
            FrameAnalyzer::SpectralPeak { .. } => (bin / cfg.freq_quantization) as u16,
            FrameAnalyzer::Cepstral { .. } | FrameAnalyzer::Chroma { .. } => bin as u16,
        }
    }
}

/// Landmarks of one signal, computed one analysis frame at a time.
///
/// The stream is finite (one pass over the full windows of the input),
/// yields landmarks in time order and then ascending frequency bin, and can
/// be restarted with [`LandmarkStream::rewind`]. Cloning a stream clones its
/// position, so a clone continues independently from the same point.
#[derive(Clone)]
pub struct LandmarkStream<'a> {
    samples: &'a [f32],
    sample_rate: u32,
    config: Arc<FeatureConfig>,
    transform: FrameTransform,
    analyzer: FrameAnalyzer,
    floor: AdaptiveFloor,
    frame_count: usize,
    next_frame: usize,
    peaks: Vec<Peak>,
    pending: Vec<Landmark>,
    cursor: usize,
}

impl<'a> LandmarkStream<'a> {
    pub(crate) fn new(
        samples: &'a [f32],
        sample_rate: u32,
        config: Arc<FeatureConfig>,
        plan: FramePlan,
        analyzer: FrameAnalyzer,
    ) -> Self {
        let frame_count = frame_count(samples.len(), config.window_size, config.hop_size);
        let floor = AdaptiveFloor::new(
            analyzer.floor_len(),
            analyzer.floor_start_db(&config),
            config.floor_decay,
        );
        Self {
            samples,
            sample_rate,
            transform: FrameTransform::new(plan),
            analyzer,
            floor,
            frame_count,
            next_frame: 0,
            peaks: Vec::with_capacity(config.max_peaks_per_frame * 2),
            pending: Vec::with_capacity(config.max_peaks_per_frame),
            cursor: 0,
            config,
        }
    }

    /// Restart from the first frame with a fresh adaptive floor.
    pub fn rewind(&mut self) {
        self.floor.reset();
        self.next_frame = 0;
        self.pending.clear();
        self.cursor = 0;
    }

    /// Total number of analysis frames in the signal.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Frames already analysed.
    pub fn frames_processed(&self) -> usize {
        self.next_frame
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Signal duration in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        (self.samples.len() as u64 * 1000 / self.sample_rate as u64) as u32
    }

    /// Start time of `frame` in milliseconds.
    pub fn frame_time_ms(&self, frame: usize) -> u32 {
        (frame as u64 * self.config.hop_size as u64 * 1000 / self.sample_rate as u64) as u32
    }

    fn analyze_next_frame(&mut self) {
        let frame = self.next_frame;
        let samples = self.samples;
        let start = frame * self.config.hop_size;
        let window = &samples[start..start + self.config.window_size];
        let magnitudes = self.transform.magnitudes(window);
        self.analyzer
            .analyze(magnitudes, &self.config, &mut self.floor, &mut self.peaks);

        let time_ms = self.frame_time_ms(frame);
        self.pending.clear();
        self.cursor = 0;
        for peak in &self.peaks {
            self.pending.push(Landmark {
                time_ms,
                frame: frame as u32,
                frequency_bin: self.analyzer.frequency_bin(peak.bin, &self.config),
                magnitude: peak.level,
            });
        }
        self.next_frame += 1;
    }
}

impl Iterator for LandmarkStream<'_> {
    type Item = Landmark;

    fn next(&mut self) -> Option<Landmark> {
        loop {
            if let Some(landmark) = self.pending.get(self.cursor) {
                self.cursor += 1;
                return Some(*landmark);
            }
            if self.next_frame >= self.frame_count {
                return None;
            }
            self.analyze_next_frame();
        }
    }
}

impl fmt::Debug for LandmarkStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LandmarkStream")
            .field("samples", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("frame_count", &self.frame_count)
            .field("next_frame", &self.next_frame)
            .finish()
    }
}

/// Number of full analysis windows in `len` samples.
pub(crate) fn frame_count(len: usize, window: usize, hop: usize) -> usize {
    if len < window {
        0
    } else {
        (len - window) / hop + 1
    }
}
