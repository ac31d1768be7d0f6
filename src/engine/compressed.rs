//! Compressed format decoding through Symphonia
//!
//! Decodes FLAC, OGG/Vorbis, MP3 and WAV files fully into memory. Registered
//! after the `hound` WAV codec, so for WAV it only runs when `hound` rejects
//! the file (e.g. WAVE_FORMAT_EXTENSIBLE variants `hound` does not read).

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::buffer::AudioBuffer;
use super::io::{AudioFormat, Decoder};
use crate::error::{ReorchError, Result};

/// Consecutive undecodable packets tolerated before giving up
const MAX_CONSECUTIVE_ERRORS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

fn invalid(reason: String) -> ReorchError {
    ReorchError::InvalidAudio {
        reason,
        source: None,
    }
}

impl Decoder for SymphoniaDecoder {
    fn name(&self) -> &str {
        "symphonia"
    }

    fn supports(&self, format: AudioFormat) -> bool {
        matches!(
            format,
            AudioFormat::Wav | AudioFormat::Flac | AudioFormat::Ogg | AudioFormat::Mp3
        )
    }

    fn decode(&self, path: &Path) -> Result<AudioBuffer> {
        let file = File::open(path)?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| invalid(format!("Failed to probe {}: {}", path.display(), e)))?;
        let mut reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| invalid(format!("No audio track in {}", path.display())))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate;
        let mut channels = track.codec_params.channels.map(|c| c.count());

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| ReorchError::BackendUnavailable {
                operation: "decode",
                format: format!("codec in {} ({})", path.display(), e),
            })?;

        let mut samples = Vec::new();
        let mut scratch: Option<SampleBuffer<f32>> = None;
        let mut consecutive_errors = 0;

        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(invalid(format!("Failed to read packet: {}", e))),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    consecutive_errors = 0;
                    let spec = *decoded.spec();
                    sample_rate.get_or_insert(spec.rate);
                    channels.get_or_insert(spec.channels.count());

                    let needed = decoded.capacity() * spec.channels.count();
                    if scratch.as_ref().map_or(true, |buf| buf.capacity() < needed) {
                        scratch = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                    }
                    if let Some(buf) = scratch.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        samples.extend_from_slice(buf.samples());
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    consecutive_errors += 1;
                    warn!("Skipping undecodable packet: {}", e);
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        return Err(invalid(format!(
                            "Too many corrupt packets in {}",
                            path.display()
                        )));
                    }
                }
                Err(e) => return Err(invalid(format!("Decoder error: {}", e))),
            }
        }

        let sample_rate = sample_rate
            .ok_or_else(|| invalid(format!("Missing sample rate in {}", path.display())))?;
        let channels = channels.unwrap_or(1);
        debug!(
            frames = samples.len() / channels.max(1),
            channels,
            sample_rate,
            "Symphonia decode complete"
        );

        AudioBuffer::from_interleaved(samples, channels, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::{Encoder, WavCodec};
    use tempfile::tempdir;

    #[test]
    fn test_decodes_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.wav");
        let buffer = AudioBuffer::from_interleaved(vec![0.25; 2000], 2, 16000).unwrap();
        WavCodec::with_bit_depth(16)
            .unwrap()
            .encode(&buffer, &path, AudioFormat::Wav)
            .unwrap();

        let decoded = SymphoniaDecoder::new().decode(&path).unwrap();
        assert_eq!(decoded.channels(), 2);
        assert_eq!(decoded.frames(), 1000);
        assert_eq!(decoded.sample_rate(), 16000);
        assert!((decoded.frame(10)[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("g.mp3");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        assert!(SymphoniaDecoder::new().decode(&path).is_err());
    }
}
