//! Fixed 32-bit hash layout for landmark pairs.
//!
//! ```text
//!  31          22 21          12 11           0
//! +--------------+--------------+--------------+
//! |  anchor bin  |  target bin  | delta frames |
//! +--------------+--------------+--------------+
//! ```
//!
//! Changing this layout requires bumping [`crate::HASH_SCHEME_VERSION`];
//! persisted indexes record the version and refuse to load under another.

use std::fmt;

use serde::{Deserialize, Serialize};

const BIN_BITS: u32 = 10;
const DELTA_BITS: u32 = 12;
const BIN_MASK: u32 = (1 << BIN_BITS) - 1;
const DELTA_MASK: u32 = (1 << DELTA_BITS) - 1;

/// Largest frame delta representable in a hash.
pub const MAX_DELTA_FRAMES: u32 = DELTA_MASK;

/// A fingerprint hash derived from one anchor/target landmark pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintHash(pub u32);

impl FingerprintHash {
    pub fn value(self) -> u32 {
        self.0
    }

    pub fn anchor_bin(self) -> u16 {
        ((self.0 >> (BIN_BITS + DELTA_BITS)) & BIN_MASK) as u16
    }

    pub fn target_bin(self) -> u16 {
        ((self.0 >> DELTA_BITS) & BIN_MASK) as u16
    }

    pub fn delta_frames(self) -> u32 {
        self.0 & DELTA_MASK
    }
}

impl fmt::Display for FingerprintHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl From<u32> for FingerprintHash {
    fn from(value: u32) -> Self {
        FingerprintHash(value)
    }
}

/// Pack a landmark pair into a hash. Out-of-range fields are masked.
pub fn hash_pair(anchor_bin: u16, target_bin: u16, delta_frames: u32) -> FingerprintHash {
    let a = anchor_bin as u32 & BIN_MASK;
    let t = target_bin as u32 & BIN_MASK;
    let d = delta_frames & DELTA_MASK;
    FingerprintHash((a << (BIN_BITS + DELTA_BITS)) | (t << DELTA_BITS) | d)
}
