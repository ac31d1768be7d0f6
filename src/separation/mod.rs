//! Stem Separation
//!
//! Splits one track into instrument stems with an external tool and loads the
//! results back into the project as new tracks.
//!
//! The tool is reached through the [`Separator`] trait so it can be swapped
//! out (the shipped implementation runs Spleeter as a subprocess). All work
//! happens inside a temporary directory that is removed on every exit path.

pub mod spleeter;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::io::{AudioFormat, Codecs, Encoder, WavCodec};
use crate::engine::project::Project;
use crate::engine::track::Track;
use crate::error::{ReorchError, Result};

pub use spleeter::SpleeterSeparator;

/// Prefix of track names created from stems
pub const STEM_TRACK_PREFIX: &str = "Stem: ";

/// Number of stems to split into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StemCount {
    Two,
    #[default]
    Four,
    Five,
}

impl StemCount {
    /// # Errors
    /// `Config` for anything other than 2, 4 or 5
    pub fn from_count(count: u8) -> Result<Self> {
        match count {
            2 => Ok(StemCount::Two),
            4 => Ok(StemCount::Four),
            5 => Ok(StemCount::Five),
            n => Err(ReorchError::Config {
                reason: format!("unsupported stem count {} (expected 2, 4 or 5)", n),
            }),
        }
    }

    pub fn count(&self) -> u8 {
        match self {
            StemCount::Two => 2,
            StemCount::Four => 4,
            StemCount::Five => 5,
        }
    }

    /// Stem names produced by the model, in output order
    pub fn stem_names(&self) -> &'static [&'static str] {
        match self {
            StemCount::Two => &["vocals", "accompaniment"],
            StemCount::Four => &["vocals", "drums", "bass", "other"],
            StemCount::Five => &["vocals", "drums", "bass", "piano", "other"],
        }
    }

    /// Pretrained model identifier, e.g. `spleeter:4stems`
    pub fn model_name(&self) -> String {
        format!("spleeter:{}stems", self.count())
    }
}

impl TryFrom<u8> for StemCount {
    type Error = ReorchError;

    fn try_from(count: u8) -> Result<Self> {
        Self::from_count(count)
    }
}

impl From<StemCount> for u8 {
    fn from(stems: StemCount) -> u8 {
        stems.count()
    }
}

impl FromStr for StemCount {
    type Err = ReorchError;

    fn from_str(s: &str) -> Result<Self> {
        let count = s.trim().parse::<u8>().map_err(|_| ReorchError::Config {
            reason: format!("stem count must be 2, 4 or 5, got '{}'", s),
        })?;
        Self::from_count(count)
    }
}

impl fmt::Display for StemCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stems", self.count())
    }
}

/// One stem file written by the separator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemFile {
    pub name: String,
    pub path: PathBuf,
}

/// External stem separation tool
#[async_trait]
pub trait Separator: Send + Sync {
    fn name(&self) -> &str;

    /// Split `input` (a WAV file) into stems under `output_dir`
    ///
    /// Returns the stems that were actually produced.
    ///
    /// # Errors
    /// `Separation` if the tool is missing, exits with failure, times out or
    /// produces no stem files.
    async fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        stems: StemCount,
    ) -> Result<Vec<StemFile>>;
}

/// Outcome of [`separate_track`]
#[derive(Debug, Default)]
pub struct SeparationReport {
    /// Tracks appended to the project, in stem order
    pub added: Vec<Arc<Track>>,
    /// Stems that could not be loaded, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Separate the track at `index` and append its stems to the project
///
/// The project is edited once, after every stem has been decoded. Stems that
/// fail to decode or do not match the project sample rate are skipped with a
/// warning.
///
/// # Errors
/// - `TrackNotFound` for a bad index
/// - `Separation` if the separator fails or no stem could be loaded, in which
///   case no track is added
pub async fn separate_track(
    project: &Project,
    index: usize,
    separator: &dyn Separator,
    codecs: &Arc<Codecs>,
    stems: StemCount,
) -> Result<SeparationReport> {
    let source = project.track(index).ok_or_else(|| ReorchError::TrackNotFound {
        index,
        len: project.len(),
    })?;

    let workdir = tempfile::Builder::new().prefix("reorch-stems-").tempdir()?;
    let input = workdir.path().join("input.wav");
    let output_dir = workdir.path().join("stems");
    tokio::fs::create_dir_all(&output_dir).await?;

    let buffer = source.shared_buffer();
    let input_path = input.clone();
    tokio::task::spawn_blocking(move || {
        WavCodec::default().encode(&buffer, &input_path, AudioFormat::Wav)
    })
    .await
    .map_err(|e| ReorchError::Separation {
        reason: format!("writing separation input failed: {}", e),
    })??;

    info!(
        source = source.name(),
        separator = separator.name(),
        stems = stems.count(),
        "Separating"
    );
    let files = separator.separate(&input, &output_dir, stems).await?;

    let expected_rate = if project.is_empty() {
        source.sample_rate()
    } else {
        project.sample_rate()
    };

    let decoded = {
        let codecs = Arc::clone(codecs);
        tokio::task::spawn_blocking(move || {
            files
                .into_iter()
                .map(|file| {
                    let result = codecs.decode(&file.path);
                    (file, result)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ReorchError::Separation {
            reason: format!("loading stems failed: {}", e),
        })?
    };

    let mut report = SeparationReport::default();
    let mut loaded = Vec::with_capacity(decoded.len());
    for (file, result) in decoded {
        match result {
            Ok(buffer) if buffer.sample_rate() != expected_rate => {
                let reason = format!(
                    "sample rate {} Hz does not match project rate {} Hz",
                    buffer.sample_rate(),
                    expected_rate
                );
                warn!(stem = %file.name, %reason, "Skipping stem");
                report.skipped.push((file.name, reason));
            }
            Ok(buffer) => {
                loaded.push(Track::new(format!("{}{}", STEM_TRACK_PREFIX, file.name), buffer));
            }
            Err(e) => {
                warn!(stem = %file.name, error = %e, "Skipping stem");
                report.skipped.push((file.name, e.to_string()));
            }
        }
    }

    if loaded.is_empty() {
        return Err(ReorchError::Separation {
            reason: format!(
                "no stem could be loaded ({} skipped); check the separation tool installation",
                report.skipped.len()
            ),
        });
    }

    report.added = project.add_tracks(loaded)?;
    info!(
        added = report.added.len(),
        skipped = report.skipped.len(),
        "Stems added"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(2, &["vocals", "accompaniment"])]
    #[test_case(4, &["vocals", "drums", "bass", "other"])]
    #[test_case(5, &["vocals", "drums", "bass", "piano", "other"])]
    fn test_stem_names(count: u8, names: &[&str]) {
        let stems = StemCount::from_count(count).unwrap();
        assert_eq!(stems.stem_names(), names);
        assert_eq!(stems.model_name(), format!("spleeter:{}stems", count));
    }

    #[test_case(0)]
    #[test_case(3)]
    #[test_case(6)]
    fn test_rejects_unsupported_count(count: u8) {
        assert!(matches!(
            StemCount::from_count(count),
            Err(ReorchError::Config { .. })
        ));
    }

    #[test]
    fn test_parse_and_serde() {
        assert_eq!("5".parse::<StemCount>().unwrap(), StemCount::Five);
        assert!("four".parse::<StemCount>().is_err());

        assert_eq!(serde_json::to_string(&StemCount::Two).unwrap(), "2");
        let parsed: StemCount = serde_json::from_str("4").unwrap();
        assert_eq!(parsed, StemCount::Four);
        assert!(serde_json::from_str::<StemCount>("3").is_err());
    }
}
