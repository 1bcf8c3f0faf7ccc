//! Windowed FFT of a single analysis frame.

use std::sync::Arc;

use apodize::hanning_iter;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

// Added before taking logarithms so digital silence stays finite.
const LEVEL_EPSILON: f32 = 1e-10;

/// Planned FFT plus the Hann window, shared between streams.
#[derive(Clone)]
pub(crate) struct FramePlan {
    fft: Arc<dyn Fft<f32>>,
    window: Arc<[f32]>,
    /// Scale mapping a full-scale sine to magnitude 1.0.
    gain: f32,
}

impl FramePlan {
    pub(crate) fn new(window_size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);
        let window: Arc<[f32]> = hanning_iter(window_size).map(|w| w as f32).collect();
        let sum: f32 = window.iter().sum();
        Self {
            fft,
            window,
            gain: if sum > 0.0 { 2.0 / sum } else { 1.0 },
        }
    }

    pub(crate) fn window_size(&self) -> usize {
        self.window.len()
    }
}

/// Per-stream FFT state. Reuses its buffers across frames.
#[derive(Clone)]
pub(crate) struct FrameTransform {
    plan: FramePlan,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl FrameTransform {
    pub(crate) fn new(plan: FramePlan) -> Self {
        let n = plan.window_size();
        let scratch_len = plan.fft.get_inplace_scratch_len();
        Self {
            plan,
            buffer: vec![Complex::new(0.0, 0.0); n],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; n / 2 + 1],
        }
    }

    /// Linear magnitudes of `frame`, which must hold exactly one window.
    pub(crate) fn magnitudes(&mut self, frame: &[f32]) -> &[f32] {
        for ((slot, &sample), &w) in self.buffer.iter_mut().zip(frame).zip(self.plan.window.iter()) {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.plan
            .fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        let gain = self.plan.gain;
        for (mag, c) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *mag = c.norm() * gain;
        }
        &self.magnitudes
    }
}

/// Amplitude to decibels relative to full scale.
pub(crate) fn amplitude_db(amplitude: f32) -> f32 {
    20.0 * (amplitude + LEVEL_EPSILON).log10()
}

/// Power to decibels relative to full scale.
pub(crate) fn power_db(power: f32) -> f32 {
    10.0 * (power + LEVEL_EPSILON * LEVEL_EPSILON).log10()
}
