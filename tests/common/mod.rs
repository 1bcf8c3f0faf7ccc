//! Synthetic audio shared by the integration tests.

#![allow(dead_code)]

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const RATE: u32 = 8_000;

/// One note of a synthetic track.
struct Note {
    start: f32,
    len: f32,
    freqs: [f32; 2],
    gain: f32,
}

fn score(seed: u64, seconds: f32) -> Vec<Note> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut notes = Vec::new();
    let mut t = 0.0f32;
    while t < seconds {
        let len = rng.gen_range(0.15..0.4);
        let root = rng.gen_range(200.0..1_800.0);
        notes.push(Note {
            start: t,
            len,
            freqs: [root, root * rng.gen_range(1.2..1.9)],
            gain: rng.gen_range(0.3..0.6),
        });
        t += len;
    }
    notes
}

/// `seconds` of seeded two-tone melody at `sample_rate`.
///
/// The same seed yields the same music at every sample rate, so a track can
/// be ingested at one rate and queried at another.
pub fn synth_track(seed: u64, seconds: f32, sample_rate: u32) -> Vec<f32> {
    let total = (seconds * sample_rate as f32) as usize;
    let mut out = vec![0.0f32; total];
    for note in score(seed, seconds) {
        let first = (note.start * sample_rate as f32) as usize;
        let last = (((note.start + note.len) * sample_rate as f32) as usize).min(total);
        for (k, sample) in out[first.min(total)..last].iter_mut().enumerate() {
            let t = k as f32 / sample_rate as f32;
            // Short attack and release so notes do not click.
            let env = (t / 0.01).min(1.0) * ((note.len - t) / 0.02).clamp(0.0, 1.0);
            let tone: f32 = note
                .freqs
                .iter()
                .map(|f| (2.0 * PI * f * t).sin())
                .sum();
            *sample = note.gain * env * tone * 0.5;
        }
    }
    out
}

/// Mono track at the default rate.
pub fn track(seed: u64, seconds: f32) -> Vec<f32> {
    synth_track(seed, seconds, RATE)
}

/// `samples[from_s..to_s]` of a mono signal at [`RATE`].
pub fn excerpt(samples: &[f32], from_s: f32, to_s: f32) -> Vec<f32> {
    let from = (from_s * RATE as f32) as usize;
    let to = ((to_s * RATE as f32) as usize).min(samples.len());
    samples[from..to].to_vec()
}

/// Add uniform white noise so that signal power over noise power is `snr_db`.
pub fn add_noise(samples: &[f32], snr_db: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let signal_power =
        samples.iter().map(|s| s * s).sum::<f32>() / samples.len().max(1) as f32;
    let noise_power = signal_power / 10f32.powf(snr_db / 10.0);
    // Uniform on [-a, a] has power a^2 / 3.
    let amplitude = (3.0 * noise_power).sqrt();
    samples
        .iter()
        .map(|s| s + rng.gen_range(-amplitude..=amplitude))
        .collect()
}

/// Duplicate a mono signal into interleaved stereo.
pub fn to_stereo(samples: &[f32]) -> Vec<f32> {
    samples.iter().flat_map(|&s| [s, s]).collect()
}
