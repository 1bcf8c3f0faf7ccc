//! Pitch-class folding of FFT magnitudes.
//!
//! Every FFT bin inside the analysed band is assigned to the pitch class
//! nearest its centre frequency, measured in `bins_per_octave` steps from the
//! tuning reference. Energies of all octaves of a class are summed, so a note
//! and its octave harmonics land on the same landmark bin.

use crate::spectrum::power_db;

/// Bin-to-class table for one window size and sample rate.
#[derive(Debug, Clone)]
pub(crate) struct ChromaMap {
    /// `(fft bin, pitch class)` for every bin inside the frequency range.
    bins: Vec<(usize, usize)>,
    classes: usize,
}

impl ChromaMap {
    pub(crate) fn new(
        bins_per_octave: usize,
        reference_hz: f32,
        window_size: usize,
        sample_rate: u32,
        min_hz: f32,
        max_hz: f32,
    ) -> Self {
        let bin_hz = sample_rate as f32 / window_size as f32;
        let first = ((min_hz / bin_hz).ceil() as usize).max(1);
        let last = ((max_hz / bin_hz).floor() as usize).min(window_size / 2);
        let steps = bins_per_octave as f32;
        let bins = (first..=last)
            .map(|k| {
                let pitch = steps * (k as f32 * bin_hz / reference_hz).log2();
                let class = (pitch.round() as i64).rem_euclid(bins_per_octave as i64) as usize;
                (k, class)
            })
            .collect();
        Self {
            bins,
            classes: bins_per_octave,
        }
    }

    pub(crate) fn classes(&self) -> usize {
        self.classes
    }

    /// Pitch-class levels in dB from linear FFT magnitudes. `energy` is
    /// scratch space of `classes()` entries.
    pub(crate) fn fold(&self, magnitudes: &[f32], energy: &mut [f32], out: &mut [f32]) {
        energy.fill(0.0);
        for &(k, class) in &self.bins {
            energy[class] += magnitudes[k] * magnitudes[k];
        }
        for (level, &e) in out.iter_mut().zip(energy.iter()) {
            *level = power_db(e);
        }
    }
}
