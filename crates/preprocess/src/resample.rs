//! Whole-buffer sample-rate conversion on top of rubato.

use rubato::{
    FastFixedIn, PolynomialDegree, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use tracing::debug;

use crate::config::ResampleQuality;
use crate::error::PreprocessError;

// Zero-input flushes allowed after the input runs out. The sinc delay is far
// below one chunk, so two flushes always suffice.
const MAX_FLUSHES: usize = 4;

enum MonoResampler {
    Fast(FastFixedIn<f32>),
    Sinc(SincFixedIn<f32>),
}

impl MonoResampler {
    fn new(ratio: f64, quality: ResampleQuality, chunk: usize) -> Result<Self, PreprocessError> {
        let resampler = match quality {
            ResampleQuality::Fast => {
                FastFixedIn::new(ratio, 1.0, PolynomialDegree::Cubic, chunk, 1)
                    .map(MonoResampler::Fast)
            }
            ResampleQuality::Balanced => {
                let params = SincInterpolationParameters {
                    sinc_len: 128,
                    f_cutoff: 0.95,
                    interpolation: SincInterpolationType::Cubic,
                    oversampling_factor: 256,
                    window: WindowFunction::BlackmanHarris2,
                };
                SincFixedIn::<f32>::new(ratio, 1.0, params, chunk, 1).map(MonoResampler::Sinc)
            }
        };
        resampler.map_err(|e| PreprocessError::Resample(format!("construction failed: {e}")))
    }

    fn input_frames_next(&self) -> usize {
        match self {
            MonoResampler::Fast(r) => r.input_frames_next(),
            MonoResampler::Sinc(r) => r.input_frames_next(),
        }
    }

    fn output_delay(&self) -> usize {
        match self {
            MonoResampler::Fast(r) => r.output_delay(),
            MonoResampler::Sinc(r) => r.output_delay(),
        }
    }

    fn process(&mut self, chunk: &[f32]) -> Result<Vec<f32>, PreprocessError> {
        let input = vec![chunk.to_vec()];
        let out = match self {
            MonoResampler::Fast(r) => r.process(&input, None),
            MonoResampler::Sinc(r) => r.process(&input, None),
        };
        first_channel(out.map_err(|e| PreprocessError::Resample(e.to_string()))?)
    }

    fn process_partial(&mut self, chunk: Option<&[f32]>) -> Result<Vec<f32>, PreprocessError> {
        let input = chunk.map(|c| vec![c.to_vec()]);
        let out = match self {
            MonoResampler::Fast(r) => r.process_partial(input.as_deref(), None),
            MonoResampler::Sinc(r) => r.process_partial(input.as_deref(), None),
        };
        first_channel(out.map_err(|e| PreprocessError::Resample(e.to_string()))?)
    }
}

fn first_channel(mut channels: Vec<Vec<f32>>) -> Result<Vec<f32>, PreprocessError> {
    if channels.is_empty() {
        return Err(PreprocessError::Resample("resampler returned no channels".into()));
    }
    Ok(channels.swap_remove(0))
}

/// Resample a mono buffer from `from_rate` to `to_rate`.
///
/// The result has exactly `round(len * to_rate / from_rate)` samples and the
/// resampler's group delay is trimmed, so sample timing is preserved. Equal
/// rates return the input unchanged.
pub fn resample(
    samples: &[f32],
    from_rate: u32,
    to_rate: u32,
    quality: ResampleQuality,
    chunk: usize,
) -> Result<Vec<f32>, PreprocessError> {
    if from_rate == 0 {
        return Err(PreprocessError::InvalidSampleRate(from_rate));
    }
    if to_rate == 0 {
        return Err(PreprocessError::InvalidSampleRate(to_rate));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;
    let mut resampler = MonoResampler::new(ratio, quality, chunk)?;
    let delay = resampler.output_delay();

    let mut out = Vec::with_capacity(expected + delay + chunk);
    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let next = resampler.input_frames_next();
        out.extend(resampler.process(&samples[pos..pos + next])?);
        pos += next;
    }
    if pos < samples.len() {
        out.extend(resampler.process_partial(Some(&samples[pos..]))?);
    }

    let mut flushes = 0;
    while out.len() < expected + delay && flushes < MAX_FLUSHES {
        out.extend(resampler.process_partial(None)?);
        flushes += 1;
    }

    out.drain(..delay.min(out.len()));
    out.resize(expected, 0.0);

    debug!(
        from_rate,
        to_rate,
        input = samples.len(),
        output = out.len(),
        delay,
        "resampled"
    );
    Ok(out)
}
