//! Project Container
//!
//! The ordered set of tracks being mixed together. The track list is held as
//! an immutable snapshot behind an `ArcSwap`: control-side edits build a new
//! list and publish it atomically, while the mixer loads one snapshot per
//! block and never waits on a lock.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::buffer::AudioBuffer;
use super::mix::{self, MixBlock};
use super::selection::{self, Selection};
use super::track::{Track, TrackInfo};
use crate::error::{ReorchError, Result};

/// Sample rate reported by a project with no tracks
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

type TrackList = Vec<Arc<Track>>;

/// Project Container
///
/// Insertion order is mix and display order. Track names need not be unique;
/// use [`Track::id`] for stable identity.
///
/// All tracks share one sample rate: the first track establishes it and
/// [`Project::add_track`] rejects anything else.
#[derive(Debug)]
pub struct Project {
    tracks: ArcSwap<TrackList>,
    /// Serializes writers so concurrent edits never drop each other's changes
    edit_lock: Mutex<()>,
    default_sample_rate: u32,
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

impl Project {
    pub fn new() -> Self {
        Self::with_default_sample_rate(DEFAULT_SAMPLE_RATE)
    }

    /// Create an empty project that reports `rate` until a track is added
    pub fn with_default_sample_rate(rate: u32) -> Self {
        Self {
            tracks: ArcSwap::from_pointee(Vec::new()),
            edit_lock: Mutex::new(()),
            default_sample_rate: rate,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The current track list
    ///
    /// The returned list never changes; later edits publish a new one.
    pub fn snapshot(&self) -> Arc<TrackList> {
        self.tracks.load_full()
    }

    pub fn len(&self) -> usize {
        self.tracks.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.load().is_empty()
    }

    pub fn track(&self, index: usize) -> Option<Arc<Track>> {
        self.tracks.load().get(index).cloned()
    }

    /// Find a track and its current index by id
    pub fn find(&self, id: Uuid) -> Option<(usize, Arc<Track>)> {
        self.tracks
            .load()
            .iter()
            .enumerate()
            .find(|(_, t)| t.id() == id)
            .map(|(i, t)| (i, Arc::clone(t)))
    }

    /// Sample rate of the first track, or the default when empty
    pub fn sample_rate(&self) -> u32 {
        self.tracks
            .load()
            .first()
            .map(|t| t.sample_rate())
            .unwrap_or(self.default_sample_rate)
    }

    /// Longest track duration in seconds (0.0 when empty)
    pub fn max_duration(&self) -> f64 {
        self.tracks
            .load()
            .iter()
            .map(|t| t.duration())
            .fold(0.0, f64::max)
    }

    /// Length of the mixed timeline in frames
    ///
    /// Equal to `max_duration() * sample_rate()` under the single-rate
    /// policy, computed from frame counts so no rounding is involved.
    pub fn total_frames(&self) -> usize {
        self.tracks
            .load()
            .iter()
            .map(|t| t.frames())
            .max()
            .unwrap_or(0)
    }

    /// Widest channel count across all tracks (1 when empty)
    pub fn max_channels(&self) -> usize {
        mix::max_channels(&self.tracks.load())
    }

    /// Listing of all tracks in order
    pub fn track_infos(&self) -> Vec<TrackInfo> {
        self.tracks
            .load()
            .iter()
            .enumerate()
            .map(|(i, t)| t.info(i))
            .collect()
    }

    // ========================================================================
    // Edits
    // ========================================================================

    /// Append a track
    ///
    /// # Errors
    /// `SampleRateMismatch` if the project already has tracks at another
    /// rate. The project is left unchanged.
    pub fn add_track(&self, track: Track) -> Result<Arc<Track>> {
        let _guard = self.edit_lock.lock();
        let current = self.tracks.load_full();

        if let Some(first) = current.first() {
            if first.sample_rate() != track.sample_rate() {
                return Err(ReorchError::SampleRateMismatch {
                    track: track.name().to_string(),
                    project_rate: first.sample_rate(),
                    track_rate: track.sample_rate(),
                });
            }
        }

        let track = Arc::new(track);
        let mut next = TrackList::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Arc::clone(&track));
        self.tracks.store(Arc::new(next));

        info!(
            name = track.name(),
            frames = track.frames(),
            channels = track.channels(),
            "Track added"
        );
        Ok(track)
    }

    /// Append several tracks in one step
    ///
    /// Either every track is added or none is.
    ///
    /// # Errors
    /// `SampleRateMismatch` if any track disagrees with the project rate (or,
    /// for an empty project, with the first new track).
    pub fn add_tracks(&self, tracks: Vec<Track>) -> Result<Vec<Arc<Track>>> {
        let _guard = self.edit_lock.lock();
        let current = self.tracks.load_full();

        let expected = current
            .first()
            .map(|t| t.sample_rate())
            .or_else(|| tracks.first().map(|t| t.sample_rate()));
        if let Some(rate) = expected {
            if let Some(odd) = tracks.iter().find(|t| t.sample_rate() != rate) {
                return Err(ReorchError::SampleRateMismatch {
                    track: odd.name().to_string(),
                    project_rate: rate,
                    track_rate: odd.sample_rate(),
                });
            }
        }

        let added: TrackList = tracks.into_iter().map(Arc::new).collect();
        let mut next = TrackList::with_capacity(current.len() + added.len());
        next.extend(current.iter().cloned());
        next.extend(added.iter().cloned());
        self.tracks.store(Arc::new(next));

        info!(count = added.len(), "Tracks added");
        Ok(added)
    }

    /// Remove the track at `index`, returning it
    pub fn remove_track(&self, index: usize) -> Option<Arc<Track>> {
        let _guard = self.edit_lock.lock();
        let current = self.tracks.load_full();
        let removed = Arc::clone(current.get(index)?);

        let next: TrackList = current
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, t)| Arc::clone(t))
            .collect();
        self.tracks.store(Arc::new(next));

        info!(name = removed.name(), index, "Track removed");
        Some(removed)
    }

    /// Remove a track by id, returning it
    pub fn remove_by_id(&self, id: Uuid) -> Option<Arc<Track>> {
        let _guard = self.edit_lock.lock();
        let current = self.tracks.load_full();
        let index = current.iter().position(|t| t.id() == id)?;
        let removed = Arc::clone(&current[index]);

        let next: TrackList = current.iter().filter(|t| t.id() != id).cloned().collect();
        self.tracks.store(Arc::new(next));

        info!(name = removed.name(), index, "Track removed");
        Some(removed)
    }

    /// Remove every track
    pub fn clear(&self) {
        let _guard = self.edit_lock.lock();
        self.tracks.store(Arc::new(Vec::new()));
        debug!("Project cleared");
    }

    /// Replace the whole track list
    ///
    /// # Errors
    /// `SampleRateMismatch` if the new tracks disagree on sample rate. The
    /// previous list stays in place.
    pub fn replace_all(&self, tracks: Vec<Track>) -> Result<()> {
        if let Some(first) = tracks.first() {
            if let Some(odd) = tracks.iter().find(|t| t.sample_rate() != first.sample_rate()) {
                return Err(ReorchError::SampleRateMismatch {
                    track: odd.name().to_string(),
                    project_rate: first.sample_rate(),
                    track_rate: odd.sample_rate(),
                });
            }
        }

        let _guard = self.edit_lock.lock();
        let next: TrackList = tracks.into_iter().map(Arc::new).collect();
        info!(tracks = next.len(), "Project content replaced");
        self.tracks.store(Arc::new(next));
        Ok(())
    }

    /// Extract a time range of the track at `index` into a new track and
    /// append it
    ///
    /// # Errors
    /// `TrackNotFound` for a bad index, `EmptySelection` when the range
    /// holds no frames.
    pub fn isolate(&self, index: usize, start_secs: f64, end_secs: f64) -> Result<Arc<Track>> {
        let source = self.track(index).ok_or_else(|| ReorchError::TrackNotFound {
            index,
            len: self.len(),
        })?;

        let isolated = selection::isolate(&source, Selection::new(start_secs, end_secs))?;
        debug!(
            source = source.name(),
            frames = isolated.frames(),
            "Selection isolated"
        );
        self.add_track(isolated)
    }

    // ========================================================================
    // Mixing
    // ========================================================================

    /// Mix `frames` frames starting at `start_frame`
    ///
    /// The result always has exactly `frames` frames and `max_channels()`
    /// channels (one channel when the project is empty).
    pub fn mix_block(&self, start_frame: usize, frames: usize) -> MixBlock {
        let mut out = MixBlock::default();
        self.mix_block_into(start_frame, frames, &mut out);
        out
    }

    /// Mix into a caller-owned block, reusing its allocation
    ///
    /// Mixes against one snapshot of the track list for the whole block.
    /// Concurrent edits become visible on a later call.
    pub fn mix_block_into(&self, start_frame: usize, frames: usize, out: &mut MixBlock) {
        let snapshot = self.tracks.load();
        mix::mix_into(&snapshot, start_frame, frames, out);
    }

    /// Render the whole timeline into one buffer
    pub fn mixdown(&self, block_size: usize) -> Result<AudioBuffer> {
        let snapshot = self.snapshot();
        let total = snapshot.iter().map(|t| t.frames()).max().unwrap_or(0);
        let channels = mix::max_channels(&snapshot);
        let rate = snapshot
            .first()
            .map(|t| t.sample_rate())
            .unwrap_or(self.default_sample_rate);
        let block_size = block_size.max(1);

        let mut samples = Vec::with_capacity(total * channels);
        let mut block = MixBlock::new(block_size, channels);
        let mut position = 0;
        while position < total {
            let frames = block_size.min(total - position);
            mix::mix_into(&snapshot, position, frames, &mut block);
            samples.extend_from_slice(block.as_interleaved());
            position += frames;
        }

        AudioBuffer::from_interleaved(samples, channels, rate)
    }
}
