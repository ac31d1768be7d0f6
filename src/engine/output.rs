//! Output Devices
//!
//! A pull-based seam between the engine and whatever consumes audio. The
//! device owns the timing: once a stream is open it repeatedly hands the
//! engine a block-sized interleaved buffer to fill. Dropping the stream
//! handle closes it, and the close completes only after any callback in
//! flight has returned.
//!
//! Implementations:
//! - [`TimedOutput`]: a thread that pulls blocks at the real-time rate (or as
//!   fast as possible) and discards them
//! - [`ManualOutput`]: pulls on demand, for driving the engine from tests
//! - `CpalOutput` (feature `cpal-output`): the default system device

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{ReorchError, Result};

/// Widest stream any device will open
pub const MAX_OUTPUT_CHANNELS: usize = 32;

/// What the engine tells the device after filling a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStatus {
    /// Keep pulling
    Continue,
    /// End of data: this block was the last one with content
    Finished,
}

/// Fills one interleaved block of `block_size * channels` samples
pub type PullCallback = Box<dyn FnMut(&mut [f32]) -> PullStatus + Send>;

/// Parameters for opening a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: usize,
    /// Frames per pulled block
    pub block_size: usize,
}

impl StreamConfig {
    pub fn new(sample_rate: u32, channels: usize, block_size: usize) -> Self {
        Self {
            sample_rate,
            channels,
            block_size,
        }
    }

    /// Samples in one interleaved block
    pub fn block_len(&self) -> usize {
        self.block_size * self.channels
    }

    /// Wall-clock length of one block
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }

    /// # Errors
    /// `Device` for a zero rate or block size, or an unsupported channel count
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ReorchError::Device {
                reason: "sample rate must be positive".to_string(),
            });
        }
        if self.block_size == 0 {
            return Err(ReorchError::Device {
                reason: "block size must be positive".to_string(),
            });
        }
        if self.channels == 0 || self.channels > MAX_OUTPUT_CHANNELS {
            return Err(ReorchError::Device {
                reason: format!(
                    "{} channels requested, supported range is 1..={}",
                    self.channels, MAX_OUTPUT_CHANNELS
                ),
            });
        }
        Ok(())
    }
}

/// Handle to an open stream. Dropping it closes the stream.
pub trait OutputStream: Send {
    /// Whether the device is still pulling blocks
    fn is_active(&self) -> bool;
}

/// Something that can open output streams
pub trait OutputDevice: Send + Sync {
    fn name(&self) -> &str;

    /// Open a stream that calls `callback` once per block until dropped
    ///
    /// # Errors
    /// `Device` if the stream cannot be opened
    fn open(&self, config: &StreamConfig, callback: PullCallback) -> Result<Box<dyn OutputStream>>;
}

// ============================================================================
// Timed output
// ============================================================================

/// Pulls blocks on a dedicated thread and discards them
///
/// Paced mode sleeps until each block's deadline, so the cursor moves at the
/// real-time rate. Unpaced mode pulls back to back, which lets tests play a
/// whole project in milliseconds.
#[derive(Debug, Clone)]
pub struct TimedOutput {
    paced: bool,
}

impl TimedOutput {
    /// Real-time pacing
    pub fn paced() -> Self {
        Self { paced: true }
    }

    /// No pacing
    pub fn unpaced() -> Self {
        Self { paced: false }
    }
}

impl Default for TimedOutput {
    fn default() -> Self {
        Self::paced()
    }
}

impl OutputDevice for TimedOutput {
    fn name(&self) -> &str {
        if self.paced {
            "timed"
        } else {
            "timed (unpaced)"
        }
    }

    fn open(&self, config: &StreamConfig, callback: PullCallback) -> Result<Box<dyn OutputStream>> {
        config.validate()?;

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let active = Arc::new(AtomicBool::new(true));
        let config = *config;
        let paced = self.paced;
        let thread_active = Arc::clone(&active);

        let handle = thread::Builder::new()
            .name("reorch-playback".to_string())
            .spawn(move || {
                run_timed(config, paced, callback, stop_rx);
                thread_active.store(false, Ordering::Release);
            })?;

        debug!(
            channels = config.channels,
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            paced,
            "Timed stream opened"
        );

        Ok(Box::new(TimedStream {
            stop_tx,
            handle: Some(handle),
            active,
        }))
    }
}

fn run_timed(config: StreamConfig, paced: bool, mut callback: PullCallback, stop_rx: Receiver<()>) {
    let mut block = vec![0.0f32; config.block_len()];
    let block_duration = config.block_duration();
    let mut deadline = Instant::now();

    loop {
        block.fill(0.0);
        if callback(&mut block) == PullStatus::Finished {
            return;
        }

        if paced {
            // Advance by exactly one block so scheduling jitter does not drift
            deadline += block_duration;
            match stop_rx.recv_deadline(deadline) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        } else {
            match stop_rx.try_recv() {
                Err(TryRecvError::Empty) => thread::yield_now(),
                Ok(()) | Err(TryRecvError::Disconnected) => return,
            }
        }
    }
}

struct TimedStream {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
    active: Arc<AtomicBool>,
}

impl OutputStream for TimedStream {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for TimedStream {
    fn drop(&mut self) {
        // The thread may already have exited after end of data
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Playback thread panicked");
            }
        }
    }
}

// ============================================================================
// Manual output
// ============================================================================

struct OpenCallback {
    generation: u64,
    config: StreamConfig,
    callback: PullCallback,
}

/// Device that only pulls when asked
///
/// Clones share the same slot, so a test can hand one clone to a player and
/// drive the stream through another.
#[derive(Clone)]
pub struct ManualOutput {
    slot: Arc<Mutex<Option<OpenCallback>>>,
    generation: Arc<AtomicU64>,
    available: bool,
}

impl Default for ManualOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualOutput {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            available: true,
        }
    }

    /// A device whose `open` always fails
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Whether a stream is currently open
    pub fn is_open(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Config of the open stream
    pub fn stream_config(&self) -> Option<StreamConfig> {
        self.slot.lock().as_ref().map(|open| open.config)
    }

    /// Pull one block from the open stream
    ///
    /// Returns `None` when no stream is open.
    pub fn pull(&self) -> Option<(Vec<f32>, PullStatus)> {
        let mut slot = self.slot.lock();
        let open = slot.as_mut()?;
        let mut block = vec![0.0f32; open.config.block_len()];
        let status = (open.callback)(&mut block);
        Some((block, status))
    }
}

impl OutputDevice for ManualOutput {
    fn name(&self) -> &str {
        "manual"
    }

    fn open(&self, config: &StreamConfig, callback: PullCallback) -> Result<Box<dyn OutputStream>> {
        if !self.available {
            return Err(ReorchError::Device {
                reason: "manual output marked unavailable".to_string(),
            });
        }
        config.validate()?;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.slot.lock() = Some(OpenCallback {
            generation,
            config: *config,
            callback,
        });

        Ok(Box::new(ManualStream {
            slot: Arc::clone(&self.slot),
            generation,
        }))
    }
}

struct ManualStream {
    slot: Arc<Mutex<Option<OpenCallback>>>,
    generation: u64,
}

impl OutputStream for ManualStream {
    fn is_active(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|open| open.generation == self.generation)
    }
}

impl Drop for ManualStream {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot
            .as_ref()
            .is_some_and(|open| open.generation == self.generation)
        {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_callback(counter: Arc<AtomicUsize>, finish_after: usize) -> PullCallback {
        Box::new(move |out: &mut [f32]| {
            out.fill(0.5);
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= finish_after {
                PullStatus::Finished
            } else {
                PullStatus::Continue
            }
        })
    }

    #[test]
    fn test_stream_config_validation() {
        assert!(StreamConfig::new(44100, 2, 1024).validate().is_ok());
        assert!(StreamConfig::new(0, 2, 1024).validate().is_err());
        assert!(StreamConfig::new(44100, 0, 1024).validate().is_err());
        assert!(StreamConfig::new(44100, 2, 0).validate().is_err());
        assert!(StreamConfig::new(44100, MAX_OUTPUT_CHANNELS + 1, 64)
            .validate()
            .is_err());
    }

    #[test]
    fn test_block_duration() {
        let config = StreamConfig::new(1000, 1, 250);
        assert_eq!(config.block_duration(), Duration::from_millis(250));
        assert_eq!(StreamConfig::new(1000, 2, 250).block_len(), 500);
    }

    #[test]
    fn test_unpaced_runs_until_finished() {
        let counter = Arc::new(AtomicUsize::new(0));
        let stream = TimedOutput::unpaced()
            .open(
                &StreamConfig::new(1000, 1, 100),
                counting_callback(Arc::clone(&counter), 5),
            )
            .unwrap();

        let start = Instant::now();
        while stream.is_active() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!stream.is_active());
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_drop_stops_paced_stream() {
        let counter = Arc::new(AtomicUsize::new(0));
        let stream = TimedOutput::paced()
            .open(
                &StreamConfig::new(1000, 2, 10),
                counting_callback(Arc::clone(&counter), usize::MAX),
            )
            .unwrap();
        thread::sleep(Duration::from_millis(30));
        drop(stream);

        let after_drop = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), after_drop);
        assert!(after_drop >= 1);
    }

    #[test]
    fn test_timed_rejects_bad_config() {
        let result = TimedOutput::unpaced().open(
            &StreamConfig::new(1000, 0, 10),
            Box::new(|_: &mut [f32]| PullStatus::Continue),
        );
        assert!(matches!(result, Err(ReorchError::Device { .. })));
    }

    #[test]
    fn test_manual_pull() {
        let device = ManualOutput::new();
        assert!(device.pull().is_none());

        let counter = Arc::new(AtomicUsize::new(0));
        let stream = device
            .open(
                &StreamConfig::new(1000, 2, 4),
                counting_callback(Arc::clone(&counter), 2),
            )
            .unwrap();
        assert!(stream.is_active());
        assert_eq!(device.stream_config().map(|c| c.channels), Some(2));

        let (block, status) = device.pull().unwrap();
        assert_eq!(block, vec![0.5; 8]);
        assert_eq!(status, PullStatus::Continue);
        assert_eq!(device.pull().unwrap().1, PullStatus::Finished);

        drop(stream);
        assert!(!device.is_open());
        assert!(device.pull().is_none());
    }

    #[test]
    fn test_stale_manual_stream_does_not_close_newer_one() {
        let device = ManualOutput::new();
        let config = StreamConfig::new(1000, 1, 4);
        let first = device
            .open(&config, Box::new(|_: &mut [f32]| PullStatus::Continue))
            .unwrap();
        let second = device
            .open(&config, Box::new(|_: &mut [f32]| PullStatus::Continue))
            .unwrap();

        assert!(!first.is_active());
        drop(first);
        assert!(second.is_active());
        assert!(device.is_open());
    }

    #[test]
    fn test_unavailable_manual_output() {
        let device = ManualOutput::unavailable();
        let result = device.open(
            &StreamConfig::new(1000, 1, 4),
            Box::new(|_: &mut [f32]| PullStatus::Continue),
        );
        assert!(matches!(result, Err(ReorchError::Device { .. })));
        assert!(!device.is_open());
    }
}
