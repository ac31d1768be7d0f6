//! Audio Engine Module
//!
//! Core mixing and playback engine including:
//! - Audio buffers, tracks and the project container
//! - Block mixing and selection extraction
//! - Transport cursor and playback driver
//! - Output device and file I/O boundaries

pub mod buffer;
#[cfg(feature = "decode-compressed")]
pub mod compressed;
#[cfg(feature = "cpal-output")]
pub mod cpal_output;
pub mod ffmpeg;
pub mod io;
pub mod mix;
pub mod output;
pub mod playback;
pub mod project;
pub mod selection;
pub mod track;
pub mod transport;

pub use buffer::{calculate_peak, linear_to_db, AudioBuffer};
#[cfg(feature = "decode-compressed")]
pub use compressed::SymphoniaDecoder;
#[cfg(feature = "cpal-output")]
pub use cpal_output::CpalOutput;
pub use ffmpeg::FfmpegEncoder;
pub use io::{AudioFormat, Codecs, Decoder, Encoder, WavCodec};
pub use mix::MixBlock;
pub use output::{
    ManualOutput, OutputDevice, OutputStream, PullCallback, PullStatus, StreamConfig, TimedOutput,
};
pub use playback::{BlockPull, Player, DEFAULT_BLOCK_SIZE};
pub use project::{Project, DEFAULT_SAMPLE_RATE};
pub use selection::{isolate, Selection};
pub use track::{Track, TrackInfo};
pub use transport::{PlaybackState, Transport};
