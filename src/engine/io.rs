//! Audio file I/O
//!
//! The decode and encode boundary. Codecs are plugged in behind the
//! [`Decoder`] and [`Encoder`] traits and collected in a [`Codecs`]
//! registry; the registry picks the format from the file extension and tries
//! every decoder that claims it, in registration order, until one succeeds.
//!
//! WAV is always available through `hound`. Compressed formats are decoded
//! by the `decode-compressed` feature and encoded by piping WAV through an
//! `ffmpeg` process, which reports `BackendUnavailable` when the binary is
//! not installed.

use std::fmt;
use std::io::{Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::{debug, info, warn};

use crate::engine::buffer::AudioBuffer;
use crate::engine::ffmpeg::FfmpegEncoder;
use crate::engine::track::Track;
use crate::error::{ReorchError, Result};

/// Default bit depth for WAV export
pub const DEFAULT_WAV_BIT_DEPTH: u16 = 24;

/// Container formats the engine knows by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Wav,
    Flac,
    Ogg,
    Mp3,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 4] = [
        AudioFormat::Wav,
        AudioFormat::Flac,
        AudioFormat::Ogg,
        AudioFormat::Mp3,
    ];

    /// Match a file extension, case-insensitively
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "ogg" | "oga" => Some(AudioFormat::Ogg),
            "mp3" => Some(AudioFormat::Mp3),
            _ => None,
        }
    }

    /// Format of a path, from its extension
    ///
    /// # Errors
    /// `UnsupportedFormat` for a missing or unknown extension
    pub fn from_path(path: &Path) -> Result<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| ReorchError::UnsupportedFormat {
                format: path
                    .extension()
                    .map(|ext| format!(".{}", ext.to_string_lossy()))
                    .unwrap_or_else(|| format!("'{}' (no extension)", path.display())),
            })
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension().to_ascii_uppercase())
    }
}

/// Reads a file into a frame-major buffer
pub trait Decoder: Send + Sync {
    fn name(&self) -> &str;
    fn supports(&self, format: AudioFormat) -> bool;
    fn decode(&self, path: &Path) -> Result<AudioBuffer>;
}

/// Writes a buffer to a file
pub trait Encoder: Send + Sync {
    fn name(&self) -> &str;
    fn supports(&self, format: AudioFormat) -> bool;
    fn encode(&self, buffer: &AudioBuffer, path: &Path, format: AudioFormat) -> Result<()>;
}

// ============================================================================
// WAV codec
// ============================================================================

/// WAV reader/writer backed by `hound`
///
/// Reads 8/16/24/32-bit integer and 32-bit float files. Writes integer PCM at
/// 16 or 24 bits, or 32-bit float.
#[derive(Debug, Clone)]
pub struct WavCodec {
    bit_depth: u16,
}

impl Default for WavCodec {
    fn default() -> Self {
        Self {
            bit_depth: DEFAULT_WAV_BIT_DEPTH,
        }
    }
}

impl WavCodec {
    /// # Errors
    /// `UnsupportedFormat` for a bit depth other than 16, 24 or 32
    pub fn with_bit_depth(bit_depth: u16) -> Result<Self> {
        match bit_depth {
            16 | 24 | 32 => Ok(Self { bit_depth }),
            _ => Err(ReorchError::UnsupportedFormat {
                format: format!("{}-bit WAV (only 16, 24, 32 supported)", bit_depth),
            }),
        }
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }
}

impl Decoder for WavCodec {
    fn name(&self) -> &str {
        "hound"
    }

    fn supports(&self, format: AudioFormat) -> bool {
        format == AudioFormat::Wav
    }

    fn decode(&self, path: &Path) -> Result<AudioBuffer> {
        let reader = WavReader::open(path).map_err(|e| ReorchError::InvalidAudio {
            reason: format!("Failed to open WAV file {}: {}", path.display(), e),
            source: Some(Box::new(e)),
        })?;

        let spec = reader.spec();
        let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
        AudioBuffer::from_interleaved(samples, spec.channels as usize, spec.sample_rate)
    }
}

impl Encoder for WavCodec {
    fn name(&self) -> &str {
        "hound"
    }

    fn supports(&self, format: AudioFormat) -> bool {
        format == AudioFormat::Wav
    }

    fn encode(&self, buffer: &AudioBuffer, path: &Path, _format: AudioFormat) -> Result<()> {
        let spec = wav_spec(buffer, self.bit_depth)?;
        let writer = WavWriter::create(path, spec).map_err(write_error)?;
        write_samples(writer, buffer, self.bit_depth)
    }
}

/// Header for writing `buffer` at `bit_depth`
pub(crate) fn wav_spec(buffer: &AudioBuffer, bit_depth: u16) -> Result<WavSpec> {
    let channels = u16::try_from(buffer.channels()).map_err(|_| ReorchError::UnsupportedFormat {
        format: format!("{}-channel WAV", buffer.channels()),
    })?;

    Ok(WavSpec {
        channels,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: bit_depth,
        sample_format: if bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    })
}

/// Write every sample of `buffer` and finalize the header
pub(crate) fn write_samples<W: Write + Seek>(
    mut writer: WavWriter<W>,
    buffer: &AudioBuffer,
    bit_depth: u16,
) -> Result<()> {
    let samples = buffer.as_interleaved().iter().copied();

    match bit_depth {
        16 => {
            for sample in samples {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(write_error)?;
            }
        }
        24 => {
            for sample in samples {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled).map_err(write_error)?;
            }
        }
        _ => {
            for sample in samples {
                writer.write_sample(sample).map_err(write_error)?;
            }
        }
    }

    writer.finalize().map_err(write_error)
}

fn write_error(e: hound::Error) -> ReorchError {
    match e {
        hound::Error::IoError(io) => ReorchError::Io(io),
        other => ReorchError::InvalidAudio {
            reason: format!("Failed to write WAV: {}", other),
            source: Some(Box::new(other)),
        },
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    fn read_error(bits: &str, e: hound::Error) -> ReorchError {
        ReorchError::InvalidAudio {
            reason: format!("Failed to read {} samples: {}", bits, e),
            source: Some(Box::new(e)),
        }
    }

    match (sample_format, bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| read_error("float", e)),
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| read_error("8-bit", e)),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| read_error("16-bit", e)),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| read_error("24-bit", e)),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| read_error("32-bit int", e)),
        (SampleFormat::Int, bits) => Err(ReorchError::UnsupportedFormat {
            format: format!("{}-bit integer audio", bits),
        }),
    }
}

// ============================================================================
// Codec registry
// ============================================================================

/// Ordered set of decoders and encoders
pub struct Codecs {
    decoders: Vec<Box<dyn Decoder>>,
    encoders: Vec<Box<dyn Encoder>>,
}

impl Default for Codecs {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Codecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decoders: Vec<&str> = self.decoders.iter().map(|d| d.name()).collect();
        let encoders: Vec<&str> = self.encoders.iter().map(|e| e.name()).collect();
        f.debug_struct("Codecs")
            .field("decoders", &decoders)
            .field("encoders", &encoders)
            .finish()
    }
}

impl Codecs {
    /// A registry with nothing registered
    pub fn empty() -> Self {
        Self {
            decoders: Vec::new(),
            encoders: Vec::new(),
        }
    }

    /// WAV at the default bit depth, FLAC/OGG/MP3 export through `ffmpeg`,
    /// plus whatever decoders the enabled features provide
    pub fn new() -> Self {
        Self::with_wav(WavCodec::default())
    }

    pub fn with_wav(wav: WavCodec) -> Self {
        let mut codecs = Self::empty();
        codecs.register_decoder(wav.clone());
        codecs.register_encoder(wav);
        codecs.register_encoder(FfmpegEncoder::default());
        #[cfg(feature = "decode-compressed")]
        codecs.register_decoder(super::compressed::SymphoniaDecoder::new());
        codecs
    }

    pub fn register_decoder(&mut self, decoder: impl Decoder + 'static) {
        self.decoders.push(Box::new(decoder));
    }

    pub fn register_encoder(&mut self, encoder: impl Encoder + 'static) {
        self.encoders.push(Box::new(encoder));
    }

    pub fn can_encode(&self, format: AudioFormat) -> bool {
        self.encoders.iter().any(|e| e.supports(format))
    }

    /// Decode a file
    ///
    /// # Errors
    /// - `UnsupportedFormat` for an unknown extension
    /// - `FileNotFound` if the path does not exist
    /// - `BackendUnavailable` if no decoder handles the format
    /// - `InvalidBuffer` if the decoded audio holds NaN or infinite samples
    /// - the last decoder's error if every candidate failed
    pub fn decode(&self, path: &Path) -> Result<AudioBuffer> {
        let format = AudioFormat::from_path(path)?;
        if !path.exists() {
            return Err(ReorchError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let mut last_error = None;
        for decoder in self.decoders.iter().filter(|d| d.supports(format)) {
            match decoder.decode(path) {
                Ok(buffer) if !buffer.is_finite() => {
                    return Err(ReorchError::InvalidBuffer {
                        reason: format!(
                            "{} decoded non-finite samples from {}",
                            decoder.name(),
                            path.display()
                        ),
                    });
                }
                Ok(buffer) => {
                    debug!(
                        decoder = decoder.name(),
                        path = %path.display(),
                        frames = buffer.frames(),
                        channels = buffer.channels(),
                        sample_rate = buffer.sample_rate(),
                        "Decoded"
                    );
                    return Ok(buffer);
                }
                Err(e) => {
                    warn!(decoder = decoder.name(), error = %e, "Decoder failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(ReorchError::BackendUnavailable {
            operation: "decode",
            format: format.to_string(),
        }))
    }

    /// Encode a buffer, picking the format from the path's extension
    ///
    /// # Errors
    /// `UnsupportedFormat` for an unknown extension, `BackendUnavailable` if
    /// no encoder handles the format.
    pub fn encode(&self, buffer: &AudioBuffer, path: &Path) -> Result<()> {
        let format = AudioFormat::from_path(path)?;
        let encoder = self
            .encoders
            .iter()
            .find(|e| e.supports(format))
            .ok_or_else(|| ReorchError::BackendUnavailable {
                operation: "encode",
                format: format.to_string(),
            })?;

        encoder.encode(buffer, path, format)?;
        debug!(encoder = encoder.name(), path = %path.display(), "Encoded");
        Ok(())
    }

    /// Decode a file into a new track named after the file
    pub fn import_track(&self, path: &Path) -> Result<Track> {
        let buffer = self.decode(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        info!(name = %name, duration_secs = buffer.duration_secs(), "Imported");
        Ok(Track::new(name, buffer))
    }

    /// Write a track's samples to `path`
    pub fn export_track(&self, track: &Track, path: &Path) -> Result<()> {
        self.encode(track.buffer(), path)?;
        info!(name = track.name(), path = %path.display(), "Exported");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use test_case::test_case;

    fn tone(frames: usize, channels: usize, rate: u32) -> AudioBuffer {
        let samples = (0..frames * channels)
            .map(|i| ((i / channels) as f32 * 0.05).sin() * 0.5)
            .collect();
        AudioBuffer::from_interleaved(samples, channels, rate).unwrap()
    }

    #[test_case("a.wav", Some(AudioFormat::Wav))]
    #[test_case("A.WAV", Some(AudioFormat::Wav))]
    #[test_case("b.flac", Some(AudioFormat::Flac))]
    #[test_case("c.ogg", Some(AudioFormat::Ogg))]
    #[test_case("d.mp3", Some(AudioFormat::Mp3))]
    #[test_case("e.aiff", None)]
    #[test_case("noext", None)]
    fn test_format_from_path(path: &str, expected: Option<AudioFormat>) {
        assert_eq!(AudioFormat::from_path(Path::new(path)).ok(), expected);
    }

    #[test]
    fn test_wav_bit_depth_validation() {
        assert!(WavCodec::with_bit_depth(16).is_ok());
        assert!(WavCodec::with_bit_depth(8).is_err());
    }

    #[test_case(16, 1e-3 ; "16 bit")]
    #[test_case(24, 1e-5 ; "24 bit")]
    #[test_case(32, 1e-7 ; "32 bit float")]
    fn test_wav_round_trip(bit_depth: u16, tolerance: f32) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rt.wav");
        let codecs = Codecs::with_wav(WavCodec::with_bit_depth(bit_depth).unwrap());

        let original = tone(500, 2, 22050);
        codecs.encode(&original, &path).unwrap();
        let loaded = codecs.decode(&path).unwrap();

        assert_eq!(loaded.channels(), 2);
        assert_eq!(loaded.frames(), 500);
        assert_eq!(loaded.sample_rate(), 22050);
        for (a, b) in original.as_interleaved().iter().zip(loaded.as_interleaved()) {
            assert!((a - b).abs() < tolerance, "{a} vs {b}");
        }
    }

    #[test]
    fn test_decode_missing_file() {
        let result = Codecs::new().decode(Path::new("/nonexistent/path.wav"));
        assert!(matches!(result, Err(ReorchError::FileNotFound { .. })));
    }

    #[test]
    fn test_decode_unknown_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();
        let result = Codecs::new().decode(&path);
        assert!(matches!(result, Err(ReorchError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_decode_without_backend() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.wav");
        Codecs::new().encode(&tone(10, 1, 8000), &path).unwrap();

        let result = Codecs::empty().decode(&path);
        assert!(matches!(
            result,
            Err(ReorchError::BackendUnavailable {
                operation: "decode",
                ..
            })
        ));
    }

    #[test]
    fn test_corrupt_wav_is_invalid_audio() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"RIFF....not really").unwrap();
        let result = Codecs::new().decode(&path);
        assert!(matches!(result, Err(ReorchError::InvalidAudio { .. })));
    }

    #[test]
    fn test_encode_compressed_without_encoder() {
        let dir = tempdir().unwrap();
        let mut codecs = Codecs::empty();
        codecs.register_encoder(WavCodec::default());

        assert!(codecs.can_encode(AudioFormat::Wav));
        assert!(!codecs.can_encode(AudioFormat::Mp3));
        let result = codecs.encode(&tone(10, 1, 8000), &dir.path().join("out.mp3"));
        assert!(matches!(
            result,
            Err(ReorchError::BackendUnavailable {
                operation: "encode",
                ..
            })
        ));
    }

    #[test]
    fn test_default_registry_encodes_every_format() {
        let codecs = Codecs::new();
        for format in AudioFormat::ALL {
            assert!(codecs.can_encode(format), "{format}");
        }
    }

    #[test]
    fn test_decode_rejects_non_finite_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nan.wav");
        let mut samples = vec![0.25; 64];
        samples[10] = f32::NAN;
        let poisoned = AudioBuffer::from_interleaved(samples, 1, 8000).unwrap();
        WavCodec::with_bit_depth(32)
            .unwrap()
            .encode(&poisoned, &path, AudioFormat::Wav)
            .unwrap();

        let result = Codecs::new().decode(&path);
        assert!(matches!(result, Err(ReorchError::InvalidBuffer { .. })));
    }

    struct FailingDecoder;

    impl Decoder for FailingDecoder {
        fn name(&self) -> &str {
            "failing"
        }

        fn supports(&self, format: AudioFormat) -> bool {
            format == AudioFormat::Wav
        }

        fn decode(&self, _path: &Path) -> Result<AudioBuffer> {
            Err(ReorchError::InvalidAudio {
                reason: "always fails".to_string(),
                source: None,
            })
        }
    }

    #[test]
    fn test_decode_falls_back_to_next_decoder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fb.wav");
        Codecs::new().encode(&tone(100, 1, 8000), &path).unwrap();

        let mut codecs = Codecs::empty();
        codecs.register_decoder(FailingDecoder);
        codecs.register_decoder(WavCodec::default());

        assert_eq!(codecs.decode(&path).unwrap().frames(), 100);
    }

    #[test]
    fn test_import_track_uses_file_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drums.wav");
        let codecs = Codecs::new();
        codecs.encode(&tone(100, 1, 8000), &path).unwrap();

        let track = codecs.import_track(&path).unwrap();
        assert_eq!(track.name(), "drums.wav");
        assert_eq!(track.frames(), 100);
    }
}
