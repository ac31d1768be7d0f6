//! Track
//!
//! An immutable audio buffer plus the two parameters a control surface may
//! change while the mixer is reading them: mute and gain. Both are stored as
//! atomics so the audio driver reads them without coordination.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::buffer::{calculate_peak, AudioBuffer};
use crate::error::{ReorchError, Result};

/// Default gain multiplier for new tracks
pub const DEFAULT_GAIN: f32 = 1.0;

/// One independent audio buffer with its own mute/gain state
#[derive(Debug)]
pub struct Track {
    id: Uuid,
    name: String,
    buffer: Arc<AudioBuffer>,
    mute: AtomicBool,
    /// `f32` gain stored as raw bits
    gain: AtomicU32,
}

impl Track {
    /// Create an unmuted track at unity gain
    pub fn new(name: impl Into<String>, buffer: AudioBuffer) -> Self {
        Self::from_shared(name, Arc::new(buffer))
    }

    /// Create a track over an already shared buffer
    pub fn from_shared(name: impl Into<String>, buffer: Arc<AudioBuffer>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            buffer,
            mute: AtomicBool::new(false),
            gain: AtomicU32::new(DEFAULT_GAIN.to_bits()),
        }
    }

    /// Stable identifier, unaffected by reordering or removal of other tracks
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Display label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The immutable sample buffer
    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    /// Shared handle to the sample buffer
    pub fn shared_buffer(&self) -> Arc<AudioBuffer> {
        Arc::clone(&self.buffer)
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.buffer.frames()
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.buffer.channels()
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    /// Duration in seconds (`frames / sample_rate`)
    pub fn duration(&self) -> f64 {
        self.buffer.duration_secs()
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.mute.load(Ordering::Relaxed)
    }

    pub fn set_mute(&self, mute: bool) {
        self.mute.store(mute, Ordering::Relaxed);
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    /// Set the gain multiplier
    ///
    /// Values above 1.0 amplify and may drive the mix into the hard clipper.
    ///
    /// # Errors
    /// `InvalidGain` for negative or non-finite values; the previous gain is
    /// kept.
    pub fn set_gain(&self, gain: f32) -> Result<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(ReorchError::InvalidGain { gain });
        }
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Serializable summary for track listings
    pub fn info(&self, index: usize) -> TrackInfo {
        TrackInfo {
            index,
            id: self.id,
            name: self.name.clone(),
            frames: self.frames(),
            channels: self.channels(),
            sample_rate: self.sample_rate(),
            duration_secs: self.duration(),
            mute: self.is_muted(),
            gain: self.gain(),
            peak_db: calculate_peak(&self.buffer),
        }
    }
}

/// Snapshot of a track for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub index: usize,
    pub id: Uuid,
    pub name: String,
    pub frames: usize,
    pub channels: usize,
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub mute: bool,
    pub gain: f32,
    pub peak_db: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(frames: usize, rate: u32) -> AudioBuffer {
        AudioBuffer::from_interleaved(vec![0.25; frames], 1, rate).unwrap()
    }

    #[test]
    fn test_defaults() {
        let track = Track::new("lead", mono(10, 1000));
        assert_eq!(track.name(), "lead");
        assert!(!track.is_muted());
        assert_eq!(track.gain(), 1.0);
    }

    #[test]
    fn test_duration() {
        let track = Track::new("t", mono(4000, 1000));
        assert!((track.duration() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_gain_accepts_amplification() {
        let track = Track::new("t", mono(10, 1000));
        track.set_gain(1.5).unwrap();
        assert_eq!(track.gain(), 1.5);
        track.set_gain(0.0).unwrap();
        assert_eq!(track.gain(), 0.0);
    }

    #[test]
    fn test_set_gain_rejects_negative_and_keeps_previous() {
        let track = Track::new("t", mono(10, 1000));
        track.set_gain(0.7).unwrap();

        assert!(matches!(
            track.set_gain(-0.1),
            Err(ReorchError::InvalidGain { .. })
        ));
        assert!(track.set_gain(f32::NAN).is_err());
        assert!(track.set_gain(f32::INFINITY).is_err());
        assert_eq!(track.gain(), 0.7);
    }

    #[test]
    fn test_mute_toggle() {
        let track = Track::new("t", mono(10, 1000));
        track.set_mute(true);
        assert!(track.is_muted());
        track.set_mute(false);
        assert!(!track.is_muted());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Track::new("same", mono(10, 1000));
        let b = Track::new("same", mono(10, 1000));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_info() {
        let track = Track::new("bass", mono(2000, 1000));
        track.set_mute(true);
        let info = track.info(3);
        assert_eq!(info.index, 3);
        assert_eq!(info.frames, 2000);
        assert!(info.mute);
        assert!((info.duration_secs - 2.0).abs() < 1e-9);
    }
}
