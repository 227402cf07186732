//! Audio Buffer Management
//!
//! Decoded PCM shared read-only between every loop and grain that plays it.
//! Channel data sits behind an `Arc`, so cloning an `AudioBuffer` never
//! copies samples.

use std::sync::Arc;

use crate::error::{LoopLabError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default sample rate for rendering (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// ln(10) / 20, so that `exp(DB_TO_LINEAR * db) == 10^(db / 20)`
const DB_TO_LINEAR: f32 = 0.115_129_255;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    (DB_TO_LINEAR * db).exp()
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Immutable decoded audio
///
/// Stores audio as non-interleaved 32-bit floating point samples.
///
/// # Example
/// ```
/// use looplab::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::mono(vec![0.0; 48000], 48000).unwrap();
/// assert_eq!(buffer.channels(), 1);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Arc<Vec<Vec<f32>>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer from per-channel sample data
    ///
    /// Fails if the channel count is not 1 or 2, the channels differ in
    /// length, or the sample rate is zero.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if ChannelLayout::from_count(samples.len()).is_none() {
            return Err(LoopLabError::UnsupportedFormat {
                format: format!(
                    "{}-channel audio (only mono/stereo supported)",
                    samples.len()
                ),
            });
        }

        if sample_rate == 0 {
            return Err(LoopLabError::InvalidAudio {
                reason: "sample rate is zero".to_string(),
                source: None,
            });
        }

        let len = samples[0].len();
        if samples.iter().any(|ch| ch.len() != len) {
            return Err(LoopLabError::InvalidAudio {
                reason: "channels have different lengths".to_string(),
                source: None,
            });
        }

        Ok(Self {
            samples: Arc::new(samples),
            sample_rate,
        })
    }

    /// Create a mono buffer
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::from_channels(vec![samples], sample_rate)
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(LoopLabError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Self::from_channels(samples, sample_rate)
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ... for stereo)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut interleaved = Vec::with_capacity(self.channels() * self.len());

        for sample_idx in 0..self.len() {
            for channel in self.samples.iter() {
                interleaved.push(channel[sample_idx]);
            }
        }

        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get the channel layout
    pub fn channel_layout(&self) -> ChannelLayout {
        if self.channels() == 1 {
            ChannelLayout::Mono
        } else {
            ChannelLayout::Stereo
        }
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Check whether two handles share the same decoded data
    pub fn shares_data_with(&self, other: &AudioBuffer) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }

    /// Read a stereo frame at a position in seconds
    ///
    /// Linear interpolation between neighbouring samples. Mono buffers
    /// return the same value on both sides; positions outside the buffer
    /// read as silence.
    pub fn frame_at(&self, position: f64) -> [f32; 2] {
        if position < 0.0 || self.is_empty() {
            return [0.0; 2];
        }

        let pos = position * self.sample_rate as f64;
        let idx = pos.floor() as usize;
        if idx >= self.len() {
            return [0.0; 2];
        }
        let frac = (pos - idx as f64) as f32;

        let read = |ch: &[f32]| {
            let a = ch[idx];
            let b = ch.get(idx + 1).copied().unwrap_or(0.0);
            a + (b - a) * frac
        };

        let left = read(&self.samples[0]);
        let right = self.samples.get(1).map(|ch| read(ch)).unwrap_or(left);
        [left, right]
    }

    /// Linear RMS across all channels
    pub fn rms(&self) -> f32 {
        let total = self.channels() * self.len();
        if total == 0 {
            return 0.0;
        }

        let sum_squares: f64 = self
            .samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();

        (sum_squares / total as f64).sqrt() as f32
    }

    /// Peak absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_db_to_linear() {
        assert_relative_eq!(db_to_linear(0.0), 1.0);
        assert_relative_eq!(db_to_linear(-6.0206), 0.5, epsilon = 1e-4);
        assert_relative_eq!(db_to_linear(20.0), 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_linear_to_db() {
        assert_relative_eq!(linear_to_db(1.0), 0.0);
        assert_eq!(linear_to_db(0.0), f32::NEG_INFINITY);
        assert_relative_eq!(linear_to_db(db_to_linear(-3.0)), -3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_buffer_duration() {
        let buffer = AudioBuffer::mono(vec![0.0; 24000], 48000).unwrap();
        assert_relative_eq!(buffer.duration_secs(), 0.5);
        assert_eq!(buffer.channel_layout(), ChannelLayout::Mono);
    }

    #[test]
    fn test_buffer_rejects_bad_layout() {
        let err = AudioBuffer::from_channels(vec![vec![0.0]; 3], 48000).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");

        let err = AudioBuffer::from_channels(vec![vec![0.0; 2], vec![0.0; 3]], 48000).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_AUDIO");

        assert!(AudioBuffer::mono(vec![0.0], 0).is_err());
    }

    #[test]
    fn test_buffer_from_interleaved_stereo() {
        let buffer =
            AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3, 0.4], ChannelLayout::Stereo, 48000)
                .unwrap();
        assert_eq!(buffer.channel(0), &[0.1, 0.3]);
        assert_eq!(buffer.channel(1), &[0.2, 0.4]);
        assert_eq!(buffer.to_interleaved(), vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_buffer_from_interleaved_invalid() {
        let result = AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3], ChannelLayout::Stereo, 48000);
        assert!(result.is_err());
    }

    #[test]
    fn test_clone_shares_samples() {
        let buffer = AudioBuffer::mono(vec![0.5; 16], 48000).unwrap();
        let copy = buffer.clone();
        assert!(copy.shares_data_with(&buffer));
    }

    #[test]
    fn test_frame_at_interpolates() {
        let buffer = AudioBuffer::mono(vec![0.0, 1.0, 0.0, -1.0], 4).unwrap();
        assert_relative_eq!(buffer.frame_at(0.25)[0], 1.0);
        assert_relative_eq!(buffer.frame_at(0.125)[0], 0.5);
        assert_relative_eq!(buffer.frame_at(0.125)[1], 0.5);
        assert_eq!(buffer.frame_at(2.0), [0.0, 0.0]);
        assert_eq!(buffer.frame_at(-0.1), [0.0, 0.0]);
    }

    #[test]
    fn test_rms_and_peak() {
        let buffer = AudioBuffer::mono(vec![1.0, -1.0, 1.0, -1.0], 48000).unwrap();
        assert_relative_eq!(buffer.rms(), 1.0);
        assert_relative_eq!(buffer.peak(), 1.0);

        let silent = AudioBuffer::mono(Vec::new(), 48000).unwrap();
        assert_eq!(silent.rms(), 0.0);
    }
}
