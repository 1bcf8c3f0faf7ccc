//! Adaptive floor and local-maximum selection over one frame of levels.

use std::ops::Range;

/// Per-bin exponential moving average of level in dB.
///
/// Peaks are measured against the floor as it stood *before* the current
/// frame, then the frame is folded in. Sustained tones therefore raise their
/// own floor and stop producing landmarks, while onsets stand out.
#[derive(Debug, Clone)]
pub(crate) struct AdaptiveFloor {
    values: Vec<f32>,
    initial_db: f32,
    decay: f32,
}

impl AdaptiveFloor {
    pub(crate) fn new(bins: usize, initial_db: f32, decay: f32) -> Self {
        Self {
            values: vec![initial_db; bins],
            initial_db,
            decay,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.values.fill(self.initial_db);
    }

    pub(crate) fn get(&self, bin: usize) -> f32 {
        self.values[bin]
    }

    pub(crate) fn update(&mut self, levels: &[f32]) {
        let keep = self.decay;
        let take = 1.0 - keep;
        for (floor, &level) in self.values.iter_mut().zip(levels) {
            // Never let the floor sink below its starting point.
            *floor = (keep * *floor + take * level).max(self.initial_db);
        }
    }
}

/// Thresholds applied by [`pick_peaks`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct PeakRule {
    pub neighborhood: usize,
    pub margin_db: f32,
    pub min_level_db: f32,
    pub max_peaks: usize,
    /// Compare the last bin with the first, as for pitch classes.
    pub circular: bool,
}

/// A selected peak: bin index, level and rise above the floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Peak {
    pub bin: usize,
    pub level: f32,
    pub rise: f32,
}

/// Select local maxima of `levels` inside `range`.
///
/// A bin is a peak when it is strictly above the `neighborhood` bins to its
/// left, at least as high as those to its right, rises `margin_db` above the
/// floor and its `gate` level clears `min_level_db`. The strongest
/// `max_peaks` by rise are returned in ascending bin order.
pub(crate) fn pick_peaks(
    levels: &[f32],
    gate: &[f32],
    range: Range<usize>,
    floor: &AdaptiveFloor,
    rule: PeakRule,
    out: &mut Vec<Peak>,
) {
    out.clear();
    let len = levels.len();
    let end = range.end.min(len);
    for bin in range.start..end {
        let level = levels[bin];
        if gate[bin] < rule.min_level_db {
            continue;
        }
        let rise = level - floor.get(bin);
        if rise < rule.margin_db {
            continue;
        }
        let (left_ok, right_ok) = if rule.circular {
            let reach = rule.neighborhood.min(len / 2);
            (
                (1..=reach).all(|d| level > levels[(bin + len - d) % len]),
                (1..=reach).all(|d| level >= levels[(bin + d) % len]),
            )
        } else {
            let lo = bin.saturating_sub(rule.neighborhood);
            let hi = (bin + rule.neighborhood).min(len - 1);
            (
                levels[lo..bin].iter().all(|&v| level > v),
                levels[bin + 1..=hi].iter().all(|&v| level >= v),
            )
        };
        if left_ok && right_ok {
            out.push(Peak { bin, level, rise });
        }
    }

    if out.len() > rule.max_peaks {
        out.sort_by(|a, b| b.rise.total_cmp(&a.rise).then(a.bin.cmp(&b.bin)));
        out.truncate(rule.max_peaks);
        out.sort_by_key(|p| p.bin);
    }
}
