//! Spectral gating.
//!
//! Each STFT bin gets a noise floor: a low quantile of its magnitude over the
//! whole signal. Cells that do not clear `gate_ratio` times that floor are
//! zeroed and the signal is rebuilt by weighted overlap-add. Stationary hum
//! sits at its bin's floor and is removed, while notes, which occupy a bin
//! only part of the time, pass. Broadband hiss fluctuates around its floor
//! and needs a higher `gate_ratio` to be cut back.

use apodize::hanning_iter;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PreprocessError;

// Overlap-add weight below which a sample is considered uncovered.
const MIN_WINDOW_WEIGHT: f32 = 1e-6;

/// Parameters of [`spectral_gate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpectralGate {
    /// STFT window in samples. A power of two; the hop is a quarter of it.
    pub window_size: usize,
    /// Quantile of each bin's magnitudes taken as its noise floor.
    pub floor_quantile: f32,
    /// A cell passes when its magnitude exceeds `floor * gate_ratio`.
    pub gate_ratio: f32,
}

impl Default for SpectralGate {
    fn default() -> Self {
        Self {
            window_size: 512,
            floor_quantile: 0.1,
            gate_ratio: 2.0,
        }
    }
}

impl SpectralGate {
    pub fn validate(&self) -> Result<(), PreprocessError> {
        if !self.window_size.is_power_of_two() || !(64..=8_192).contains(&self.window_size) {
            return Err(PreprocessError::InvalidConfig(format!(
                "spectral gate window_size must be a power of two in 64..=8192 (got {})",
                self.window_size
            )));
        }
        if !(0.0..1.0).contains(&self.floor_quantile) {
            return Err(PreprocessError::InvalidConfig(format!(
                "floor_quantile must be in [0, 1) (got {})",
                self.floor_quantile
            )));
        }
        if !(self.gate_ratio.is_finite() && self.gate_ratio >= 1.0) {
            return Err(PreprocessError::InvalidConfig(format!(
                "gate_ratio must be a finite value >= 1.0 (got {})",
                self.gate_ratio
            )));
        }
        Ok(())
    }
}

/// Gate `samples` in place. Signals shorter than one window are untouched.
pub fn spectral_gate(samples: &mut [f32], gate: &SpectralGate) {
    let n = gate.window_size;
    if samples.len() < n {
        return;
    }
    let hop = n / 4;
    let pad = n / 2;
    let bins = n / 2 + 1;

    let mut padded = vec![0.0f32; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);
    let frames = (padded.len() - n) / hop + 1;

    let window: Vec<f32> = hanning_iter(n).map(|w| w as f32).collect();
    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);
    let scratch_len = forward
        .get_inplace_scratch_len()
        .max(inverse.get_inplace_scratch_len());
    let mut scratch = vec![Complex::new(0.0, 0.0); scratch_len];
    let mut buf = vec![Complex::new(0.0, 0.0); n];

    let load = |buf: &mut [Complex<f32>], start: usize| {
        for ((slot, &s), &w) in buf.iter_mut().zip(&padded[start..start + n]).zip(&window) {
            *slot = Complex::new(s * w, 0.0);
        }
    };

    // Bin-major, so each bin's history is contiguous.
    let mut magnitudes = vec![0.0f32; bins * frames];
    for frame in 0..frames {
        load(&mut buf, frame * hop);
        forward.process_with_scratch(&mut buf, &mut scratch);
        for (bin, c) in buf[..bins].iter().enumerate() {
            magnitudes[bin * frames + frame] = c.norm();
        }
    }
    let thresholds: Vec<f32> = magnitudes
        .chunks(frames)
        .map(|history| quantile(history, gate.floor_quantile) * gate.gate_ratio)
        .collect();

    let mut out = vec![0.0f32; padded.len()];
    let mut weight = vec![0.0f32; padded.len()];
    let scale = 1.0 / n as f32;
    let mut gated = 0usize;
    for frame in 0..frames {
        let start = frame * hop;
        load(&mut buf, start);
        forward.process_with_scratch(&mut buf, &mut scratch);
        for (bin, &threshold) in thresholds.iter().enumerate() {
            if magnitudes[bin * frames + frame] > threshold {
                continue;
            }
            gated += 1;
            buf[bin] = Complex::new(0.0, 0.0);
            // Keep the spectrum Hermitian so the inverse stays real.
            if bin != 0 && bin != n / 2 {
                buf[n - bin] = Complex::new(0.0, 0.0);
            }
        }
        inverse.process_with_scratch(&mut buf, &mut scratch);
        for (i, (c, &w)) in buf.iter().zip(&window).enumerate() {
            out[start + i] += c.re * scale * w;
            weight[start + i] += w * w;
        }
    }

    for (i, s) in samples.iter_mut().enumerate() {
        let w = weight[pad + i];
        *s = if w > MIN_WINDOW_WEIGHT { out[pad + i] / w } else { 0.0 };
    }

    debug!(
        frames,
        bins,
        gated_cells = gated,
        window_size = n,
        "spectral_gate_applied"
    );
}

/// Linearly interpolated `q` quantile of `values`.
fn quantile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f32::total_cmp);
    let pos = q * (sorted.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
