//! Block mixer
//!
//! Sums a snapshot of tracks into one interleaved block:
//! - tracks shorter than the block are zero-padded at the tail
//! - tracks with fewer channels than the widest track are zero-filled on the
//!   missing channels (no upmixing)
//! - muted tracks are skipped, every other track is scaled by its gain
//! - the sum is hard clipped to [-1.0, 1.0]

use std::sync::Arc;

use super::track::Track;

/// Output of one mixing step, shape `(frames, channels)`, frame-major
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixBlock {
    data: Vec<f32>,
    frames: usize,
    channels: usize,
}

impl MixBlock {
    /// A zeroed block
    pub fn new(frames: usize, channels: usize) -> Self {
        Self {
            data: vec![0.0; frames * channels],
            frames,
            channels,
        }
    }

    /// Reshape to `(frames, channels)` and zero every sample
    ///
    /// Reuses the existing allocation when it is large enough.
    pub fn reset(&mut self, frames: usize, channels: usize) {
        self.frames = frames;
        self.channels = channels;
        self.data.clear();
        self.data.resize(frames * channels, 0.0);
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn as_interleaved(&self) -> &[f32] {
        &self.data
    }

    pub fn into_interleaved(self) -> Vec<f32> {
        self.data
    }

    /// One frame, one sample per channel
    #[inline]
    pub fn frame(&self, index: usize) -> &[f32] {
        let start = index * self.channels;
        &self.data[start..start + self.channels]
    }

    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        self.data[frame * self.channels + channel]
    }
}

/// Widest channel count across tracks, muted ones included
pub fn max_channels(tracks: &[Arc<Track>]) -> usize {
    tracks.iter().map(|t| t.channels()).max().unwrap_or(1)
}

/// Mix `frames` frames starting at `start_frame` into `out`
///
/// With no tracks the result is a silent mono block. Allocation is bounded
/// by `frames * max_channels` and skipped entirely when `out` already has
/// that capacity.
pub fn mix_into(tracks: &[Arc<Track>], start_frame: usize, frames: usize, out: &mut MixBlock) {
    if tracks.is_empty() {
        out.reset(frames, 1);
        return;
    }

    let out_channels = max_channels(tracks);
    out.reset(frames, out_channels);

    for track in tracks {
        // Parameters are read once so the whole block sees one value
        if track.is_muted() {
            continue;
        }
        let gain = track.gain();
        let channels = track.channels();

        let available = track
            .buffer()
            .frames_slice(start_frame..start_frame.saturating_add(frames));
        for (dst, src) in out
            .data
            .chunks_exact_mut(out_channels)
            .zip(available.chunks_exact(channels))
        {
            for (d, s) in dst.iter_mut().zip(src) {
                *d += s * gain;
            }
        }
    }

    for sample in out.data.iter_mut() {
        *sample = sample.clamp(-1.0, 1.0);
    }
}
