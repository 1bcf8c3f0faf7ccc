use std::sync::Arc;

use crate::cepstral::MelBank;
use crate::chroma::ChromaMap;
use crate::config::{ExtractionStrategy, FeatureConfig, FeatureError, InsufficientReason};
use crate::spectrum::FramePlan;
use crate::stream::{FrameAnalyzer, LandmarkStream};

/// Landmark extractor for one validated [`FeatureConfig`].
///
/// Building the extractor plans the FFT once; every call to
/// [`FeatureExtractor::extract`] shares that plan. The extractor is cheap to
/// clone and safe to share between threads.
#[derive(Clone)]
pub struct FeatureExtractor {
    config: Arc<FeatureConfig>,
    plan: FramePlan,
}

impl FeatureExtractor {
    /// Validate `config` and plan the FFT.
    pub fn new(config: FeatureConfig) -> Result<Self, FeatureError> {
        config.validate()?;
        let plan = FramePlan::new(config.window_size);
        Ok(Self {
            config: Arc::new(config),
            plan,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn strategy(&self) -> &ExtractionStrategy {
        &self.config.strategy
    }

    /// Start a lazy landmark stream over `samples`.
    ///
    /// Returns [`FeatureError::InsufficientSignal`] when the input is shorter
    /// than one analysis window or its RMS is below `silence_rms`. No FFT is
    /// computed until the stream is iterated.
    pub fn extract<'a>(
        &self,
        samples: &'a [f32],
        sample_rate: u32,
    ) -> Result<LandmarkStream<'a>, FeatureError> {
        self.config.validate_for_rate(sample_rate)?;

        let window = self.config.window_size;
        if samples.len() < window {
            return Err(FeatureError::InsufficientSignal(
                InsufficientReason::TooShort {
                    samples: samples.len(),
                    window,
                },
            ));
        }
        let rms = rms(samples);
        if rms < self.config.silence_rms {
            return Err(FeatureError::InsufficientSignal(
                InsufficientReason::Silent { rms },
            ));
        }

        let analyzer = match &self.config.strategy {
            ExtractionStrategy::SpectralPeak => {
                FrameAnalyzer::spectral(&self.config, sample_rate, window / 2 + 1)
            }
            ExtractionStrategy::Cepstral(cep) => {
                let bank = MelBank::new(
                    cep.mel_bands,
                    cep.coefficients,
                    window,
                    sample_rate,
                    self.config.min_frequency_hz,
                    self.config.max_frequency_hz,
                );
                FrameAnalyzer::cepstral(Arc::new(bank), cep.floor_margin_db)
            }
            ExtractionStrategy::Chroma(chroma) => {
                let map = ChromaMap::new(
                    chroma.bins_per_octave,
                    chroma.reference_hz,
                    window,
                    sample_rate,
                    self.config.min_frequency_hz,
                    self.config.max_frequency_hz,
                );
                FrameAnalyzer::chroma(Arc::new(map), chroma.floor_margin_db)
            }
        };

        Ok(LandmarkStream::new(
            samples,
            sample_rate,
            Arc::clone(&self.config),
            self.plan.clone(),
            analyzer,
        ))
    }
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("config", &self.config)
            .finish()
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}
