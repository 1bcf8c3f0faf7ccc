use tracing::debug;

use crate::audio::PcmAudio;
use crate::config::PreprocessConfig;
use crate::denoise::spectral_gate;
use crate::error::PreprocessError;
use crate::resample::resample;

// Peaks below this are treated as silence and left unscaled.
const SILENT_PEAK: f32 = 1e-6;

/// Main entry point. Validates the audio, then downmixes, removes DC,
/// resamples, optionally gates and peak-normalizes according to `cfg`.
///
/// An empty input is valid and yields an empty output; deciding whether a
/// signal is long enough to analyse belongs to the feature extractor.
pub fn preprocess(audio: PcmAudio<'_>, cfg: &PreprocessConfig) -> Result<Vec<f32>, PreprocessError> {
    cfg.validate()?;
    audio.validate()?;

    let mut mono = downmix(audio.samples, audio.channels);
    if cfg.remove_dc {
        remove_dc(&mut mono);
    }

    let mut out = resample(
        &mono,
        audio.sample_rate,
        cfg.target_sample_rate,
        cfg.resample_quality,
        cfg.resample_chunk,
    )?;

    if let Some(gate) = &cfg.spectral_gate {
        spectral_gate(&mut out, gate);
    }
    if cfg.normalize_peak {
        normalize_peak(&mut out);
    }

    debug!(
        input_frames = audio.frames(),
        input_rate = audio.sample_rate,
        channels = audio.channels,
        output_samples = out.len(),
        target_rate = cfg.target_sample_rate,
        "preprocessed"
    );
    Ok(out)
}

/// Average interleaved channels into a mono signal.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Subtract the mean so the signal is centred on zero.
pub fn remove_dc(samples: &mut [f32]) {
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64;
    let mean = mean as f32;
    for s in samples.iter_mut() {
        *s -= mean;
    }
}

/// Scale so the largest absolute sample is 1.0. Silent buffers are untouched.
pub fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak < SILENT_PEAK {
        return;
    }
    let gain = 1.0 / peak;
    for s in samples.iter_mut() {
        *s *= gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResampleQuality;
    use crate::denoise::SpectralGate;

    #[test]
    fn downmix_averages_frames() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix(&stereo, 2), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn downmix_mono_is_copy() {
        let mono = [0.1, 0.2, 0.3];
        assert_eq!(downmix(&mono, 1), mono.to_vec());
    }

    #[test]
    fn remove_dc_centres_signal() {
        let mut samples = vec![1.5, 0.5, 1.5, 0.5];
        remove_dc(&mut samples);
        assert_eq!(samples, vec![0.5, -0.5, 0.5, -0.5]);
    }

    #[test]
    fn normalize_peak_scales_to_unity() {
        let mut samples = vec![0.25, -0.5, 0.1];
        normalize_peak(&mut samples);
        assert_eq!(samples, vec![0.5, -1.0, 0.2]);
    }

    #[test]
    fn normalize_peak_leaves_silence_alone() {
        let mut samples = vec![0.0; 16];
        normalize_peak(&mut samples);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn preprocess_is_gain_invariant() {
        let loud: Vec<f32> = (0..8_000).map(|i| (i as f32 * 0.07).sin() * 0.9).collect();
        let quiet: Vec<f32> = loud.iter().map(|s| s * 0.1).collect();
        let cfg = PreprocessConfig::default();
        let a = preprocess(PcmAudio::mono(&loud, 8_000), &cfg).unwrap();
        let b = preprocess(PcmAudio::mono(&quiet, 8_000), &cfg).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-4);
        }
    }

    #[test]
    fn preprocess_resamples_and_downmixes() {
        let stereo: Vec<f32> = (0..44_100 * 2).map(|i| ((i / 2) as f32 * 0.01).sin()).collect();
        let cfg = PreprocessConfig::default().with_resample_quality(ResampleQuality::Fast);
        let out = preprocess(PcmAudio::new(&stereo, 44_100, 2), &cfg).unwrap();
        assert_eq!(out.len(), 8_000);
    }

    #[test]
    fn preprocess_gates_only_when_asked() {
        // A steady 250 Hz hum with a 1 kHz burst in its middle second.
        let samples: Vec<f32> = (0..24_000)
            .map(|i| {
                let t = i as f32 / 8_000.0;
                let hum = 0.2 * (2.0 * std::f32::consts::PI * 250.0 * t).sin();
                let burst = if (1.0..2.0).contains(&t) {
                    0.5 * (2.0 * std::f32::consts::PI * 1_000.0 * t).sin()
                } else {
                    0.0
                };
                hum + burst
            })
            .collect();
        let plain = PreprocessConfig::default().with_normalize_peak(false);
        let gated = plain.clone().with_spectral_gate(SpectralGate::default());

        let a = preprocess(PcmAudio::mono(&samples, 8_000), &plain).unwrap();
        let b = preprocess(PcmAudio::mono(&samples, 8_000), &gated).unwrap();
        assert_eq!(a.len(), b.len());
        let energy = |s: &[f32]| s.iter().map(|x| x * x).sum::<f32>();
        assert!(energy(&b[..4_000]) < energy(&a[..4_000]) * 0.01);
        assert!(energy(&b[10_000..14_000]) > energy(&a[10_000..14_000]) * 0.5);
    }

    #[test]
    fn preprocess_rejects_invalid_audio() {
        let samples = [0.0f32; 3];
        let err = preprocess(PcmAudio::new(&samples, 8_000, 2), &PreprocessConfig::default())
            .unwrap_err();
        assert!(matches!(err, PreprocessError::MisalignedFrames { .. }));
    }

    #[test]
    fn preprocess_accepts_empty_input() {
        let out = preprocess(PcmAudio::mono(&[], 44_100), &PreprocessConfig::default()).unwrap();
        assert!(out.is_empty());
    }
}
