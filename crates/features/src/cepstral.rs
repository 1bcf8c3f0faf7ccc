//! Mel filterbank and liftered cepstral envelope.
//!
//! The envelope is the log mel spectrum with its fine structure and overall
//! level removed: DCT-II, zero c0 and every coefficient past the lifter,
//! then invert. Peaks of the envelope mark formant-like regions that survive
//! gain changes and moderate noise better than individual FFT bins.

use std::f32::consts::PI;

use crate::spectrum::power_db;

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

#[derive(Debug, Clone)]
struct Filter {
    first_bin: usize,
    weights: Vec<f32>,
}

/// Triangular mel filters plus the DCT basis used by the lifter.
#[derive(Debug, Clone)]
pub(crate) struct MelBank {
    filters: Vec<Filter>,
    /// `cos(pi / B * (b + 0.5) * n)`, row-major by `n`.
    basis: Vec<f32>,
    coefficients: usize,
}

impl MelBank {
    pub(crate) fn new(
        bands: usize,
        coefficients: usize,
        window_size: usize,
        sample_rate: u32,
        min_hz: f32,
        max_hz: f32,
    ) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        let max_hz = max_hz.min(nyquist);
        let bin_hz = sample_rate as f32 / window_size as f32;
        let bins = window_size / 2 + 1;

        let lo = hz_to_mel(min_hz);
        let hi = hz_to_mel(max_hz);
        let edges: Vec<f32> = (0..bands + 2)
            .map(|i| mel_to_hz(lo + (hi - lo) * i as f32 / (bands + 1) as f32))
            .collect();

        let filters = (0..bands)
            .map(|b| {
                let (left, centre, right) = (edges[b], edges[b + 1], edges[b + 2]);
                let first = ((left / bin_hz).ceil() as usize).min(bins - 1);
                let last = ((right / bin_hz).floor() as usize).min(bins - 1);
                let weights: Vec<f32> = (first..=last.max(first))
                    .map(|k| {
                        let f = k as f32 * bin_hz;
                        let w = if f <= centre {
                            (f - left) / (centre - left)
                        } else {
                            (right - f) / (right - centre)
                        };
                        w.max(0.0)
                    })
                    .collect();
                if weights.iter().any(|&w| w > 0.0) {
                    Filter {
                        first_bin: first,
                        weights,
                    }
                } else {
                    // Band narrower than one FFT bin: use the nearest bin.
                    Filter {
                        first_bin: ((centre / bin_hz).round() as usize).min(bins - 1),
                        weights: vec![1.0],
                    }
                }
            })
            .collect();

        let scale = PI / bands as f32;
        let basis = (0..bands)
            .flat_map(|n| (0..bands).map(move |b| (scale * (b as f32 + 0.5) * n as f32).cos()))
            .collect();

        Self {
            filters,
            basis,
            coefficients,
        }
    }

    pub(crate) fn bands(&self) -> usize {
        self.filters.len()
    }

    /// Band energies in dB from linear FFT magnitudes.
    pub(crate) fn band_levels(&self, magnitudes: &[f32], out: &mut [f32]) {
        for (level, filter) in out.iter_mut().zip(&self.filters) {
            let energy: f32 = filter
                .weights
                .iter()
                .zip(&magnitudes[filter.first_bin..])
                .map(|(w, m)| w * m * m)
                .sum();
            *level = power_db(energy);
        }
    }

    /// Liftered envelope of `levels` (dB per band, mean removed).
    pub(crate) fn envelope(&self, levels: &[f32], cepstrum: &mut [f32], out: &mut [f32]) {
        let bands = self.bands();
        for (n, c) in cepstrum.iter_mut().enumerate() {
            *c = if n == 0 || n > self.coefficients {
                0.0
            } else {
                let row = &self.basis[n * bands..(n + 1) * bands];
                row.iter().zip(levels).map(|(cos, l)| cos * l).sum()
            };
        }
        let norm = 2.0 / bands as f32;
        for (b, value) in out.iter_mut().enumerate() {
            *value = norm
                * (1..=self.coefficients.min(bands - 1))
                    .map(|n| cepstrum[n] * self.basis[n * bands + b])
                    .sum::<f32>();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mel_scale_round_trips() {
        for hz in [100.0f32, 1_000.0, 3_800.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 0.5);
        }
    }

    #[test]
    fn every_band_has_weight() {
        let bank = MelBank::new(48, 16, 1024, 8_000, 100.0, 3_800.0);
        assert_eq!(bank.bands(), 48);
        assert!(bank
            .filters
            .iter()
            .all(|f| f.weights.iter().any(|&w| w > 0.0)));
    }

    #[test]
    fn envelope_ignores_overall_level() {
        let bank = MelBank::new(32, 10, 1024, 8_000, 100.0, 3_800.0);
        let levels: Vec<f32> = (0..32).map(|b| (b as f32 * 0.4).sin() * 20.0 - 40.0).collect();
        let louder: Vec<f32> = levels.iter().map(|l| l + 12.0).collect();
        let mut cep = vec![0.0; 32];
        let mut a = vec![0.0; 32];
        let mut b = vec![0.0; 32];
        bank.envelope(&levels, &mut cep, &mut a);
        bank.envelope(&louder, &mut cep, &mut b);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-2);
        }
    }

    #[test]
    fn envelope_keeps_broad_shape() {
        // A single broad bump stays the envelope maximum after liftering.
        let bank = MelBank::new(32, 12, 1024, 8_000, 100.0, 3_800.0);
        let levels: Vec<f32> = (0..32)
            .map(|b| -60.0 + 40.0 * (-((b as f32 - 10.0) / 3.0).powi(2)).exp())
            .collect();
        let mut cep = vec![0.0; 32];
        let mut env = vec![0.0; 32];
        bank.envelope(&levels, &mut cep, &mut env);
        let argmax = env
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(argmax, Some(10));
    }
}
