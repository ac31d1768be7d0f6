//! FFmpeg sidecar encoder
//!
//! Writes the buffer as an in-memory WAV and pipes it through
//! `ffmpeg -f wav -i pipe:0 -c:a <codec> <path>` for FLAC, OGG/Vorbis and MP3.

use std::io::{Cursor, ErrorKind, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use hound::WavWriter;
use tracing::debug;

use super::buffer::AudioBuffer;
use super::io::{wav_spec, write_samples, AudioFormat, Encoder, DEFAULT_WAV_BIT_DEPTH};
use crate::error::{ReorchError, Result};

/// Characters of stderr kept in error messages
const STDERR_EXCERPT: usize = 300;

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// FFmpeg audio encoder for `format`
    fn codec(format: AudioFormat) -> Option<&'static str> {
        match format {
            AudioFormat::Flac => Some("flac"),
            AudioFormat::Ogg => Some("libvorbis"),
            AudioFormat::Mp3 => Some("libmp3lame"),
            AudioFormat::Wav => None,
        }
    }

    fn args(codec: &str, path: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-f".to_string(),
            "wav".to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-c:a".to_string(),
            codec.to_string(),
            path.display().to_string(),
        ]
    }
}

impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn supports(&self, format: AudioFormat) -> bool {
        Self::codec(format).is_some()
    }

    fn encode(&self, buffer: &AudioBuffer, path: &Path, format: AudioFormat) -> Result<()> {
        let codec = Self::codec(format).ok_or_else(|| ReorchError::BackendUnavailable {
            operation: "encode",
            format: format!("{} via ffmpeg", format),
        })?;

        let mut wav = Cursor::new(Vec::new());
        let writer = WavWriter::new(&mut wav, wav_spec(buffer, DEFAULT_WAV_BIT_DEPTH)?)
            .map_err(|e| ReorchError::InvalidAudio {
                reason: format!("Failed to stage WAV for ffmpeg: {}", e),
                source: Some(Box::new(e)),
            })?;
        write_samples(writer, buffer, DEFAULT_WAV_BIT_DEPTH)?;
        let wav = wav.into_inner();

        let mut child = match Command::new(&self.program)
            .args(Self::args(codec, path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ReorchError::BackendUnavailable {
                    operation: "encode",
                    format: format!("{} ('{}' not found)", format, self.program),
                })
            }
            Err(e) => return Err(ReorchError::Io(e)),
        };

        let mut stdin = child.stdin.take().ok_or_else(|| ReorchError::InvalidAudio {
            reason: "Failed to open ffmpeg stdin".to_string(),
            source: None,
        })?;
        // Fed from its own thread so a full stderr pipe cannot stall the write
        let feeder = thread::spawn(move || stdin.write_all(&wav));

        let output = child.wait_with_output()?;
        match feeder.join() {
            Ok(Ok(())) => {}
            // ffmpeg closing its input early shows up in the exit status
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(ReorchError::Io(e)),
            Err(_) => {
                return Err(ReorchError::InvalidAudio {
                    reason: "ffmpeg input writer panicked".to_string(),
                    source: None,
                })
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.chars().take(STDERR_EXCERPT).collect();
            return Err(ReorchError::InvalidAudio {
                reason: format!(
                    "ffmpeg exited with {} writing {}: {}",
                    output.status,
                    path.display(),
                    excerpt.trim()
                ),
                source: None,
            });
        }

        debug!(codec, path = %path.display(), "ffmpeg finished");
        Ok(())
    }
}
