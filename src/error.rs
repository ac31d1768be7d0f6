//! Error handling for Reorch
//!
//! Collaborator failures (decode, encode, device, separation) are surfaced as
//! values and never abort the process. Each error carries the operation and
//! the underlying cause so a missing dependency can be diagnosed.

use thiserror::Error;

/// Result type alias for Reorch operations
pub type Result<T> = std::result::Result<T, ReorchError>;

/// Main error type for Reorch operations
#[derive(Error, Debug)]
pub enum ReorchError {
    // Codec Errors
    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("No {operation} backend available for {format}")]
    BackendUnavailable {
        operation: &'static str,
        format: String,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Playback Errors
    #[error("Audio output error: {reason}")]
    Device { reason: String },

    // Editing Errors
    #[error("Empty selection: {start_secs:.3}s to {end_secs:.3}s contains no frames")]
    EmptySelection { start_secs: f64, end_secs: f64 },

    #[error("Sample rate mismatch: project runs at {project_rate} Hz but track '{track}' is {track_rate} Hz")]
    SampleRateMismatch {
        track: String,
        project_rate: u32,
        track_rate: u32,
    },

    #[error("Invalid gain {gain}: must be a finite, non-negative multiplier")]
    InvalidGain { gain: f32 },

    #[error("Track {index} not found (project has {len} tracks)")]
    TrackNotFound { index: usize, len: usize },

    // Separation Errors
    #[error("Stem separation failed: {reason}")]
    Separation { reason: String },

    // Invariant violations from misbehaving collaborators
    #[error("Malformed audio buffer: {reason}")]
    InvalidBuffer { reason: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReorchError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ReorchError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            ReorchError::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            ReorchError::FileNotFound { .. } => "FILE_NOT_FOUND",
            ReorchError::InvalidAudio { .. } => "INVALID_AUDIO",
            ReorchError::Device { .. } => "DEVICE_ERROR",
            ReorchError::EmptySelection { .. } => "EMPTY_SELECTION",
            ReorchError::SampleRateMismatch { .. } => "SAMPLE_RATE_MISMATCH",
            ReorchError::InvalidGain { .. } => "INVALID_GAIN",
            ReorchError::TrackNotFound { .. } => "TRACK_NOT_FOUND",
            ReorchError::Separation { .. } => "SEPARATION_ERROR",
            ReorchError::InvalidBuffer { .. } => "INVALID_BUFFER",
            ReorchError::Config { .. } => "CONFIG_ERROR",
            ReorchError::Io(_) => "IO_ERROR",
            ReorchError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Only a malformed buffer from a collaborator is treated as an
    /// unrecoverable invariant violation.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ReorchError::InvalidBuffer { .. })
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ReorchError::UnsupportedFormat { .. } => vec![
                "Supported extensions: .wav, .flac, .ogg, .mp3",
                "Convert the file to WAV first",
            ],
            ReorchError::BackendUnavailable { .. } => vec![
                "Rebuild with the `decode-compressed` feature for MP3/FLAC/OGG input",
                "Export to .wav, which is always available",
            ],
            ReorchError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            ReorchError::Device { .. } => vec![
                "Check that an output device is connected",
                "Try a different channel count or block size",
                "Use the paced software output instead of hardware output",
            ],
            ReorchError::EmptySelection { .. } => vec![
                "Set a selection whose end is after its start",
                "Make sure the selection lies within the track duration",
            ],
            ReorchError::SampleRateMismatch { .. } => vec![
                "Convert the file to the project sample rate before importing",
                "Start a new project for material at a different rate",
            ],
            ReorchError::Separation { .. } => vec![
                "Install spleeter (`pip install spleeter`) and ffmpeg",
                "Set REORCH_PYTHON_PATH to the interpreter that has spleeter",
                "Increase separation.timeout_secs for long tracks",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ReorchError::EmptySelection {
            start_secs: 2.0,
            end_secs: 1.0,
        };
        assert_eq!(err.error_code(), "EMPTY_SELECTION");

        let err = ReorchError::Device {
            reason: "no default output device".to_string(),
        };
        assert_eq!(err.error_code(), "DEVICE_ERROR");
    }

    #[test]
    fn test_messages_carry_context() {
        let err = ReorchError::BackendUnavailable {
            operation: "encode",
            format: "mp3".to_string(),
        };
        assert_eq!(err.to_string(), "No encode backend available for mp3");

        let err = ReorchError::SampleRateMismatch {
            track: "drums.wav".to_string(),
            project_rate: 44100,
            track_rate: 48000,
        };
        let msg = err.to_string();
        assert!(msg.contains("44100"));
        assert!(msg.contains("drums.wav"));
    }

    #[test]
    fn test_recoverability() {
        assert!(ReorchError::Separation {
            reason: "exit status 1".to_string()
        }
        .is_recoverable());
        assert!(!ReorchError::InvalidBuffer {
            reason: "ragged channels".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = ReorchError::Separation {
            reason: "spleeter not found".to_string(),
        };
        assert!(!err.recovery_suggestions().is_empty());

        let err = ReorchError::InvalidGain { gain: -1.0 };
        assert!(err.recovery_suggestions().is_empty());
    }
}
