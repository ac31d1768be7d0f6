//! Audio Buffer Management
//!
//! Provides the immutable sample container held by every track. Samples are
//! stored frame-major (interleaved): frame `i`, channel `c` lives at
//! `i * channels + c`, which is the layout decoders hand back and output
//! devices consume.

use std::ops::Range;

use crate::error::{ReorchError, Result};

// ============================================================================
// Helper Functions
// ============================================================================

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

/// Calculate the peak level of an audio buffer in dBFS
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    let peak = buffer
        .samples
        .iter()
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max);

    linear_to_db(peak)
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Frame-major floating point audio
///
/// Shape is `(frames, channels)`. The constructors enforce
/// `channels >= 1`, `sample_rate > 0` and a sample count that is an exact
/// multiple of the channel count, so every buffer in the engine is
/// well-formed.
///
/// # Example
/// ```
/// use reorch::engine::AudioBuffer;
///
/// // Two frames of stereo audio
/// let buffer = AudioBuffer::from_interleaved(vec![0.1, 0.2, 0.3, 0.4], 2, 48000).unwrap();
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.frames(), 2);
/// assert_eq!(buffer.frame(1), &[0.3, 0.4]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer from interleaved sample data
    ///
    /// # Errors
    /// `InvalidBuffer` if the channel count or sample rate is zero, or the
    /// data length is not divisible by the channel count.
    pub fn from_interleaved(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(ReorchError::InvalidBuffer {
                reason: "channel count must be at least 1".to_string(),
            });
        }
        if sample_rate == 0 {
            return Err(ReorchError::InvalidBuffer {
                reason: "sample rate must be positive".to_string(),
            });
        }
        if samples.len() % channels != 0 {
            return Err(ReorchError::InvalidBuffer {
                reason: format!(
                    "interleaved data length {} is not divisible by channel count {}",
                    samples.len(),
                    channels
                ),
            });
        }

        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    /// Number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of frames
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Check if the buffer holds no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Interleaved view of all samples
    #[inline]
    pub fn as_interleaved(&self) -> &[f32] {
        &self.samples
    }

    /// Consume the buffer, returning the interleaved samples
    pub fn into_interleaved(self) -> Vec<f32> {
        self.samples
    }

    /// The samples of one frame, one per channel
    ///
    /// # Panics
    /// Panics if `index >= frames()`
    #[inline]
    pub fn frame(&self, index: usize) -> &[f32] {
        let start = index * self.channels;
        &self.samples[start..start + self.channels]
    }

    /// Interleaved samples for a frame range, truncated at the end of data
    ///
    /// A range starting past the end yields an empty slice.
    pub fn frames_slice(&self, range: Range<usize>) -> &[f32] {
        let frames = self.frames();
        let start = range.start.min(frames);
        let end = range.end.clamp(start, frames);
        &self.samples[start * self.channels..end * self.channels]
    }

    /// Copy a frame range into a new, independent buffer
    pub fn slice_frames(&self, range: Range<usize>) -> AudioBuffer {
        AudioBuffer {
            samples: self.frames_slice(range).to_vec(),
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }

    /// True when no sample is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }
}

// ============================================================================
// Tests
// ============================================================================
