//! Selection & Extraction
//!
//! Maps a time range onto frame indices and copies the covered audio into a
//! new, independent track.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::track::Track;
use crate::error::{ReorchError, Result};

/// A time range on a track, in seconds
///
/// Always satisfies `0 <= start_secs <= end_secs`. The bounds the caller
/// asked for are kept alongside for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Selection {
    start_secs: f64,
    end_secs: f64,
    #[serde(skip)]
    requested: Option<(f64, f64)>,
}

impl Selection {
    /// Create a selection
    ///
    /// A negative start is raised to zero and an end before the start is
    /// pulled up to the start, matching how a pair of range sliders behaves.
    pub fn new(start_secs: f64, end_secs: f64) -> Self {
        let start = if start_secs.is_finite() {
            start_secs.max(0.0)
        } else {
            0.0
        };
        let end = if end_secs.is_finite() {
            end_secs.max(start)
        } else {
            start
        };
        Self {
            start_secs: start,
            end_secs: end,
            requested: Some((start_secs, end_secs)),
        }
    }

    pub fn start_secs(&self) -> f64 {
        self.start_secs
    }

    pub fn end_secs(&self) -> f64 {
        self.end_secs
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Bound the selection to `[0, duration_secs]`
    pub fn clamp_to(&self, duration_secs: f64) -> Self {
        let duration_secs = duration_secs.max(0.0);
        Self {
            requested: self.requested,
            ..Self::new(
                self.start_secs.min(duration_secs),
                self.end_secs.min(duration_secs),
            )
        }
    }

    /// Frame indices covered by the selection
    ///
    /// `start = floor(start_secs * rate)`, `end = floor(end_secs * rate)`.
    ///
    /// # Errors
    /// `EmptySelection` when `end <= start`.
    pub fn frame_range(&self, sample_rate: u32) -> Result<Range<usize>> {
        let rate = sample_rate as f64;
        let start = (self.start_secs * rate).floor() as usize;
        let end = (self.end_secs * rate).floor() as usize;

        if end <= start {
            return Err(self.empty_error());
        }
        Ok(start..end)
    }

    /// Display name for a track extracted from this selection
    pub fn label(&self) -> String {
        format!("Selection {:.2}-{:.2}s", self.start_secs, self.end_secs)
    }

    fn empty_error(&self) -> ReorchError {
        let (start_secs, end_secs) = self.requested.unwrap_or((self.start_secs, self.end_secs));
        ReorchError::EmptySelection {
            start_secs,
            end_secs,
        }
    }
}

/// Copy the selected part of `track` into a new track
///
/// The selection is first clamped to the track duration and the new track is
/// named after the clamped range. It owns a copy of the samples (not a
/// view), keeps the source sample rate and starts unmuted at unity gain.
///
/// # Errors
/// `EmptySelection` if no frame lies inside the clamped selection.
pub fn isolate(track: &Track, selection: Selection) -> Result<Track> {
    let clamped = selection.clamp_to(track.duration());
    let range = clamped.frame_range(track.sample_rate())?;

    let buffer = track.buffer().slice_frames(range);
    if buffer.is_empty() {
        return Err(clamped.empty_error());
    }

    Ok(Track::new(clamped.label(), buffer))
}
