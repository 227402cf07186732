//! Musical loop length
//!
//! Loops are cut to a whole number of bars; their duration in seconds comes
//! from the tempo, the note value the tempo refers to, and the time
//! signature.

use serde::{Deserialize, Serialize};

use crate::error::{LoopLabError, Result};

/// Tempo and meter a set of loops was produced at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopTiming {
    /// Beats per minute
    pub tempo: f64,
    /// Note value the tempo counts (1/4 = quarter notes)
    pub tempo_ref: f64,
    /// Bar length as a fraction of a whole note (4/4 = 1.0, 3/4 = 0.75)
    pub time_signature: f64,
    /// Loop length in bars
    pub bars: f64,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            tempo: 60.0,
            tempo_ref: 0.25,
            time_signature: 1.0,
            bars: 2.0,
        }
    }
}

impl LoopTiming {
    pub fn new(tempo: f64, bars: f64) -> Self {
        Self {
            tempo,
            bars,
            ..Self::default()
        }
    }

    /// Loop duration in seconds
    pub fn duration(&self) -> f64 {
        self.bars * self.time_signature * 60.0 / (self.tempo * self.tempo_ref)
    }

    /// Duration of one bar in seconds
    pub fn bar_duration(&self) -> f64 {
        self.time_signature * 60.0 / (self.tempo * self.tempo_ref)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("tempo", self.tempo),
            ("tempo_ref", self.tempo_ref),
            ("time_signature", self.time_signature),
            ("bars", self.bars),
        ];
        for (name, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(LoopLabError::InvalidConfig {
                    reason: format!("timing.{} must be positive, got {}", name, value),
                });
            }
        }
        Ok(())
    }
}
