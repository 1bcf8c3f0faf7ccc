use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Config for initializing the index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Segment count above which a write merges segments by size tier until
    /// the count is back within the limit.
    pub max_segments: usize,
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments;
        self
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.max_segments == 0 {
            return Err(IndexError::InvalidConfig(
                "max_segments must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { max_segments: 8 }
    }
}
