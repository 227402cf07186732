//! Demo configuration
//!
//! Every tunable of the demos in one serde structure. Missing fields take
//! the demo defaults, so a config file only needs the values it changes:
//!
//! ```json
//! { "drift": { "max_speed": 2.0 }, "timing": { "tempo": 120 } }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LoopLabError, Result};
use crate::loops::timing::LoopTiming;

/// Loop player settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopsConfig {
    /// Fade-in/out time in seconds
    pub fade_time: f64,
    /// Pan distance between neighbouring matrix columns
    pub pan_step: f32,
}

impl Default for LoopsConfig {
    fn default() -> Self {
        Self {
            fade_time: 0.05,
            pan_step: 0.4,
        }
    }
}

/// Video drift correction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Correction period in seconds
    pub period: f64,
    /// Fastest playback rate used to catch up (the slowest is its inverse)
    pub max_speed: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            period: 0.125,
            max_speed: 1.5,
        }
    }
}

/// Granular scrubber settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrainConfig {
    /// Time between grain onsets in seconds
    pub period: f64,
    /// Grain length in seconds
    pub duration: f64,
    /// Random read-offset spread in seconds
    pub offset_variation: f64,
    pub min_cutoff: f32,
    pub max_cutoff: f32,
    /// Lowpass resonance (linear Q)
    pub resonance: f32,
    /// Lookahead of the grain rendering loop in seconds
    pub render_period: f64,
    /// Padding at the end of the buffer excluded from the scrub range
    pub tail: f64,
}

impl Default for GrainConfig {
    fn default() -> Self {
        Self {
            period: 0.01,
            duration: 0.16,
            offset_variation: 0.01,
            min_cutoff: 200.0,
            max_cutoff: 12000.0,
            resonance: 1.0,
            render_period: 0.1,
            tail: 1.0,
        }
    }
}

/// Saw synth settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Fade-in/out time in seconds
    pub fade_time: f64,
    pub min_osc_freq: f32,
    pub max_osc_freq: f32,
    pub min_cutoff: f32,
    pub max_cutoff: f32,
    /// Filter resonance (linear Q, 6 dB)
    pub q: f32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            fade_time: 0.25,
            min_osc_freq: 20.0,
            max_osc_freq: 1000.0,
            min_cutoff: 20.0,
            max_cutoff: 4000.0,
            q: 2.0,
        }
    }
}

impl SynthConfig {
    /// Mouse variant: a slightly higher cutoff floor
    pub fn mouse() -> Self {
        Self {
            min_cutoff: 40.0,
            ..Self::default()
        }
    }
}

/// Fake radio settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Length of one noise burst in seconds
    pub burst_duration: f64,
    pub gain: f32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            burst_duration: 0.5,
            gain: 1.0,
        }
    }
}

/// Intensity meter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Analyser window in samples
    pub fft_size: usize,
    /// Opacity at silence
    pub floor: f32,
    /// Opacity per unit of RMS
    pub gain: f32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            floor: 0.25,
            gain: 10.0,
        }
    }
}

/// Complete demo configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub loops: LoopsConfig,
    pub drift: DriftConfig,
    pub grain: GrainConfig,
    pub synth: SynthConfig,
    pub radio: RadioConfig,
    pub meter: MeterConfig,
    pub timing: LoopTiming,
}

impl Config {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoopLabError::FileNotFound {
                path: path.display().to_string(),
                source: Some(e),
            },
            _ => LoopLabError::Io(e),
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON config
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check ranges the demos rely on
    pub fn validate(&self) -> Result<()> {
        positive("loops.fade_time", self.loops.fade_time)?;
        positive("drift.period", self.drift.period)?;
        if self.drift.max_speed.is_nan() || self.drift.max_speed <= 1.0 {
            return Err(invalid(format!(
                "drift.max_speed must be > 1, got {}",
                self.drift.max_speed
            )));
        }

        positive("grain.period", self.grain.period)?;
        positive("grain.duration", self.grain.duration)?;
        positive("grain.render_period", self.grain.render_period)?;
        positive("grain.resonance", self.grain.resonance as f64)?;
        non_negative("grain.offset_variation", self.grain.offset_variation)?;
        non_negative("grain.tail", self.grain.tail)?;
        range("grain cutoff", self.grain.min_cutoff, self.grain.max_cutoff)?;

        positive("synth.fade_time", self.synth.fade_time)?;
        positive("synth.q", self.synth.q as f64)?;
        range("synth oscillator", self.synth.min_osc_freq, self.synth.max_osc_freq)?;
        range("synth cutoff", self.synth.min_cutoff, self.synth.max_cutoff)?;

        positive("radio.burst_duration", self.radio.burst_duration)?;
        non_negative("radio.gain", self.radio.gain as f64)?;

        if !self.meter.fft_size.is_power_of_two() || self.meter.fft_size < 32 {
            return Err(invalid(format!(
                "meter.fft_size must be a power of two >= 32, got {}",
                self.meter.fft_size
            )));
        }

        self.timing.validate()
    }
}

fn invalid(reason: String) -> LoopLabError {
    LoopLabError::InvalidConfig { reason }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{} must be positive, got {}", name, value)))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{} must be >= 0, got {}", name, value)))
    }
}

fn range(name: &str, min: f32, max: f32) -> Result<()> {
    if min > 0.0 && min < max {
        Ok(())
    } else {
        Err(invalid(format!(
            "{} range must satisfy 0 < min < max, got {}..{}",
            name, min, max
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grain.period, 0.01);
        assert_eq!(config.drift.max_speed, 1.5);
        assert_eq!(SynthConfig::mouse().min_cutoff, 40.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{ "drift": { "max_speed": 2.0 } }"#).unwrap();
        assert_eq!(config.drift.max_speed, 2.0);
        assert_eq!(config.drift.period, 0.125);
        assert_eq!(config.loops, LoopsConfig::default());
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = Config::default();
        config.timing.tempo = 120.0;
        let json = config.to_json_pretty().unwrap();
        assert_eq!(Config::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = Config::from_json(r#"{ "grain": { "period": 0 } }"#).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");

        let err = Config::from_json(r#"{ "synth": { "min_cutoff": 5000 } }"#).unwrap_err();
        assert!(err.to_string().contains("synth cutoff"));

        let err = Config::from_json(r#"{ "meter": { "fft_size": 1000 } }"#).unwrap_err();
        assert!(err.to_string().contains("fft_size"));

        let err = Config::from_json(r#"{ "drift": { "max_speed": 0.5 } }"#).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_malformed_json() {
        let err = Config::from_json("{ not json").unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("looplab.json");
        std::fs::write(&path, r#"{ "timing": { "bars": 4 } }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.timing.duration(), 16.0);

        let err = Config::load(&dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }
}
