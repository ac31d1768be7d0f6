//! Transport State Machine
//!
//! Holds the playback cursor and the playing flag shared between the control
//! side and the audio driver. Both are atomics: the driver advances the cursor
//! once per block and the control side may seek at any time without locking.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::debug;

use super::output::PullStatus;

/// Transport states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// No stream is open (default state)
    #[default]
    Stopped,
    /// An output stream is pulling blocks
    Playing,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "Stopped"),
            PlaybackState::Playing => write!(f, "Playing"),
        }
    }
}

/// Playback cursor and state flag
///
/// The cursor is measured in frames. It is written by the driver through
/// [`Transport::advance`] and by the control side through
/// [`Transport::seek_frames`]; a seek that lands between a driver's read and
/// its write wins.
///
/// # Example
/// ```
/// use reorch::engine::{PlaybackState, Transport};
///
/// let transport = Transport::new();
/// assert_eq!(transport.state(), PlaybackState::Stopped);
/// transport.seek_frames(2500, 10_000);
/// assert_eq!(transport.position_frames(), 2500);
/// ```
#[derive(Debug, Default)]
pub struct Transport {
    position: AtomicU64,
    playing: AtomicBool,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Current cursor in frames
    #[inline]
    pub fn position_frames(&self) -> usize {
        self.position.load(Ordering::Acquire) as usize
    }

    /// Current cursor in seconds at the given sample rate
    pub fn position_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.position_frames() as f64 / sample_rate as f64
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PlaybackState {
        if self.is_playing() {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }

    /// Enter `Playing`
    ///
    /// Returns `false` if the transport was already playing.
    pub fn try_begin(&self) -> bool {
        self.playing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter `Stopped`, keeping the cursor
    ///
    /// Returns `true` if the transport was playing.
    pub fn stop(&self) -> bool {
        self.playing.swap(false, Ordering::AcqRel)
    }

    // ========================================================================
    // Cursor
    // ========================================================================

    /// Move the cursor to `target`, clamped to `[0, max_frames]`
    ///
    /// Returns the frame actually set.
    pub fn seek_frames(&self, target: usize, max_frames: usize) -> usize {
        let clamped = target.min(max_frames);
        self.position.store(clamped as u64, Ordering::Release);
        debug!(frame = clamped, "Seek");
        clamped
    }

    /// Move the cursor back to frame 0
    pub fn rewind(&self) {
        self.position.store(0, Ordering::Release);
    }

    /// Advance the cursor after a block of `frames` was rendered from `from`
    ///
    /// The cursor only moves if it still reads `from`; if a seek happened
    /// while the block was being mixed the seek target is kept. Once the
    /// cursor reaches `end_frame` the transport stops and `Finished` is
    /// returned.
    ///
    /// Runs on the driver thread, so it never logs.
    pub fn advance(&self, from: usize, frames: usize, end_frame: usize) -> PullStatus {
        let next = from.saturating_add(frames).min(end_frame);
        let moved = self
            .position
            .compare_exchange(from as u64, next as u64, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if moved && next >= end_frame {
            self.playing.store(false, Ordering::Release);
            PullStatus::Finished
        } else {
            PullStatus::Continue
        }
    }
}
