//! Playback Driver
//!
//! Connects a [`Project`] to an [`OutputDevice`]. Each pulled block is mixed
//! at the transport cursor, copied into the device buffer and the cursor is
//! advanced; when the cursor reaches the end of the longest track the
//! transport stops by itself.
//!
//! Nothing on the pull path locks, allocates after the first block, or logs.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::mix::MixBlock;
use super::output::{OutputDevice, OutputStream, PullStatus, StreamConfig};
use super::project::Project;
use super::transport::{PlaybackState, Transport};
use crate::error::Result;

/// Default frames per pulled block
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Per-stream state of the pull callback
pub struct BlockPull {
    project: Arc<Project>,
    transport: Arc<Transport>,
    channels: usize,
    scratch: MixBlock,
}

impl BlockPull {
    /// `channels` is the stream width; blocks are adapted to it
    pub fn new(project: Arc<Project>, transport: Arc<Transport>, channels: usize) -> Self {
        Self {
            project,
            transport,
            channels: channels.max(1),
            scratch: MixBlock::default(),
        }
    }

    /// Fill one interleaved device block
    ///
    /// Extra device channels are zero-filled and surplus mix channels are
    /// dropped, so a track added mid-stream with more channels than the
    /// stream was opened with does not break the stream.
    pub fn fill(&mut self, out: &mut [f32]) -> PullStatus {
        if !self.transport.is_playing() {
            out.fill(0.0);
            return PullStatus::Finished;
        }

        let frames = out.len() / self.channels;
        let start = self.transport.position_frames();
        let end = self.project.total_frames();

        self.project
            .mix_block_into(start, frames, &mut self.scratch);

        let mix_channels = self.scratch.channels();
        let mixed = self.scratch.as_interleaved();
        if mix_channels == self.channels {
            out[..mixed.len()].copy_from_slice(mixed);
            out[mixed.len()..].fill(0.0);
        } else {
            let shared = mix_channels.min(self.channels);
            for (dst, src) in out
                .chunks_exact_mut(self.channels)
                .zip(mixed.chunks_exact(mix_channels))
            {
                dst[..shared].copy_from_slice(&src[..shared]);
                dst[shared..].fill(0.0);
            }
        }

        self.transport.advance(start, frames, end)
    }
}

/// Playback controller
///
/// Owns at most one open stream. The stream is opened by [`Player::play`] and
/// released by [`Player::pause`], by the next `play` after end of data, or
/// when the player is dropped.
pub struct Player {
    project: Arc<Project>,
    transport: Arc<Transport>,
    device: Box<dyn OutputDevice>,
    block_size: usize,
    stream: Mutex<Option<Box<dyn OutputStream>>>,
}

impl Player {
    pub fn new(project: Arc<Project>, device: Box<dyn OutputDevice>) -> Self {
        Self::with_block_size(project, device, DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(
        project: Arc<Project>,
        device: Box<dyn OutputDevice>,
        block_size: usize,
    ) -> Self {
        Self {
            project,
            transport: Arc::new(Transport::new()),
            device,
            block_size: block_size.max(1),
            stream: Mutex::new(None),
        }
    }

    pub fn project(&self) -> &Arc<Project> {
        &self.project
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// Start playback from the cursor
    ///
    /// Returns `Ok(false)` without doing anything when already playing or
    /// when the project is empty. A cursor sitting at the end of data is
    /// rewound to 0 first.
    ///
    /// # Errors
    /// `Device` if the stream cannot be opened; the player stays `Stopped`.
    pub fn play(&self) -> Result<bool> {
        let mut stream = self.stream.lock();

        if self.transport.is_playing() {
            debug!("Play requested while already playing");
            return Ok(false);
        }
        if self.project.is_empty() {
            debug!("Play requested on an empty project");
            return Ok(false);
        }

        // Release a stream left over from a run that reached end of data
        stream.take();

        let total = self.project.total_frames();
        if self.transport.position_frames() >= total {
            self.transport.rewind();
        }

        let config = StreamConfig::new(
            self.project.sample_rate(),
            self.project.max_channels(),
            self.block_size,
        );

        self.transport.try_begin();
        let mut pull = BlockPull::new(
            Arc::clone(&self.project),
            Arc::clone(&self.transport),
            config.channels,
        );

        match self
            .device
            .open(&config, Box::new(move |out: &mut [f32]| pull.fill(out)))
        {
            Ok(opened) => {
                *stream = Some(opened);
                info!(
                    device = self.device.name(),
                    position = self.transport.position_frames(),
                    channels = config.channels,
                    sample_rate = config.sample_rate,
                    "Playback started"
                );
                Ok(true)
            }
            Err(e) => {
                self.transport.stop();
                warn!(error = %e, "Failed to open output stream");
                Err(e)
            }
        }
    }

    /// Stop playback, keeping the cursor
    ///
    /// Idempotent. Returns once the device has released the stream, so no
    /// callback runs after this returns.
    pub fn pause(&self) {
        let mut stream = self.stream.lock();
        let was_playing = self.transport.stop();
        if stream.take().is_some() && was_playing {
            info!(position = self.transport.position_frames(), "Playback paused");
        }
    }

    /// Move the cursor to `secs`, clamped to `[0, max_duration]`
    ///
    /// Allowed in either state; a running stream picks it up on its next
    /// block.
    pub fn seek(&self, secs: f64) -> f64 {
        let rate = self.project.sample_rate();
        let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
        let target = (secs * rate as f64).floor() as usize;
        let frame = self.transport.seek_frames(target, self.project.total_frames());
        frame as f64 / rate as f64
    }

    pub fn position_frames(&self) -> usize {
        self.transport.position_frames()
    }

    pub fn position_secs(&self) -> f64 {
        self.transport.position_secs(self.project.sample_rate())
    }

    pub fn state(&self) -> PlaybackState {
        self.transport.state()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.pause();
    }
}
