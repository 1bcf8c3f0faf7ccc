use serde::{Deserialize, Serialize};

/// A salient spectral point: where a frame's energy stands out.
///
/// `frame` is the analysis frame index the landmark came from; pairing uses
/// it so time deltas stay exact integers regardless of millisecond rounding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Landmark {
    /// Start of the analysis window, in milliseconds from the signal start.
    pub time_ms: u32,
    pub frame: u32,
    /// Quantized frequency bin (FFT bin / quantization, or mel band).
    pub frequency_bin: u16,
    /// Level in dB.
    pub magnitude: f32,
}
