//! System audio output through CPAL
//!
//! A CPAL `Stream` cannot leave the thread that built it, so each open
//! stream gets an owner thread that builds it, starts it and parks until the
//! handle is dropped. The device callback size is chosen by the driver and
//! rarely matches the engine block size; blocks are pulled into a staging
//! buffer and copied out as the driver asks for samples.

use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, warn};

use super::output::{OutputDevice, OutputStream, PullCallback, PullStatus, StreamConfig};
use crate::error::{ReorchError, Result};

/// The host's default output device
#[derive(Debug, Clone, Default)]
pub struct CpalOutput;

impl CpalOutput {
    pub fn new() -> Self {
        Self
    }
}

impl OutputDevice for CpalOutput {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&self, config: &StreamConfig, callback: PullCallback) -> Result<Box<dyn OutputStream>> {
        config.validate()?;

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let config = *config;

        let handle = thread::Builder::new()
            .name("reorch-cpal".to_string())
            .spawn(move || own_stream(config, callback, ready_tx, stop_rx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream {
                stop_tx,
                handle: Some(handle),
            })),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(ReorchError::Device {
                    reason: "audio thread exited before the stream opened".to_string(),
                })
            }
        }
    }
}

fn device_error(context: &str, e: impl std::fmt::Display) -> ReorchError {
    ReorchError::Device {
        reason: format!("{context}: {e}"),
    }
}

fn build_stream(config: StreamConfig, mut callback: PullCallback) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| ReorchError::Device {
        reason: "no default output device".to_string(),
    })?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!(device = %device_name, "Using audio device");

    let channels = u16::try_from(config.channels)
        .map_err(|e| device_error("channel count", e))?;
    let stream_config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut staging = vec![0.0f32; config.block_len()];
    let mut read_pos = staging.len();
    // Set once the staged block is the last one with content
    let mut last_block = false;

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut written = 0;
                while written < data.len() {
                    if read_pos == staging.len() {
                        if last_block {
                            // Silence until the stream is released
                            data[written..].fill(0.0);
                            return;
                        }
                        staging.fill(0.0);
                        last_block = callback(&mut staging) == PullStatus::Finished;
                        read_pos = 0;
                    }
                    let n = (staging.len() - read_pos).min(data.len() - written);
                    data[written..written + n]
                        .copy_from_slice(&staging[read_pos..read_pos + n]);
                    written += n;
                    read_pos += n;
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| device_error("failed to build output stream", e))?;

    stream
        .play()
        .map_err(|e| device_error("failed to start output stream", e))?;
    Ok(stream)
}

fn own_stream(
    config: StreamConfig,
    callback: PullCallback,
    ready_tx: Sender<Result<()>>,
    stop_rx: Receiver<()>,
) {
    let stream = match build_stream(config, callback) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    // Either a stop message or the handle being dropped ends the wait
    let _ = stop_rx.recv();
    if let Err(e) = stream.pause() {
        warn!("Failed to pause output stream: {}", e);
    }
    drop(stream);
}

struct CpalStream {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl OutputStream for CpalStream {
    fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Audio owner thread panicked");
            }
        }
    }
}
