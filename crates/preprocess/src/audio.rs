//! Borrowed view over decoded PCM.

use crate::error::PreprocessError;

/// Decoded PCM samples with their sample rate and channel layout.
///
/// Multi-channel audio is interleaved (`L R L R ...`). Samples are expected
/// in `[-1.0, 1.0]` but any finite value is accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcmAudio<'a> {
    pub samples: &'a [f32],
    pub sample_rate: u32,
    pub channels: u16,
}

impl<'a> PcmAudio<'a> {
    pub fn new(samples: &'a [f32], sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Single-channel audio.
    pub fn mono(samples: &'a [f32], sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration in milliseconds, rounded down.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }

    /// Check the layout and sample values without touching the data.
    pub fn validate(&self) -> Result<(), PreprocessError> {
        if self.sample_rate == 0 {
            return Err(PreprocessError::InvalidSampleRate(self.sample_rate));
        }
        if self.channels == 0 {
            return Err(PreprocessError::InvalidChannelCount(self.channels));
        }
        if self.samples.len() % self.channels as usize != 0 {
            return Err(PreprocessError::MisalignedFrames {
                samples: self.samples.len(),
                channels: self.channels,
            });
        }
        if let Some(index) = self.samples.iter().position(|s| !s.is_finite()) {
            return Err(PreprocessError::NonFiniteSample { index });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_and_duration() {
        let samples = vec![0.0f32; 16_000];
        let audio = PcmAudio::new(&samples, 8_000, 2);
        assert_eq!(audio.frames(), 8_000);
        assert_eq!(audio.duration_ms(), 1_000);
    }

    #[test]
    fn validate_rejects_bad_layouts() {
        let samples = vec![0.0f32; 3];
        assert_eq!(
            PcmAudio::new(&samples, 0, 1).validate(),
            Err(PreprocessError::InvalidSampleRate(0))
        );
        assert_eq!(
            PcmAudio::new(&samples, 8_000, 0).validate(),
            Err(PreprocessError::InvalidChannelCount(0))
        );
        assert_eq!(
            PcmAudio::new(&samples, 8_000, 2).validate(),
            Err(PreprocessError::MisalignedFrames {
                samples: 3,
                channels: 2
            })
        );
    }

    #[test]
    fn validate_rejects_nan() {
        let samples = [0.0, 0.1, f32::NAN, 0.2];
        assert_eq!(
            PcmAudio::mono(&samples, 8_000).validate(),
            Err(PreprocessError::NonFiniteSample { index: 2 })
        );
    }
}
