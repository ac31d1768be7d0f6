//! Engine configuration
//!
//! Loaded from a JSON file, then overridden from the environment:
//! - `REORCH_PYTHON_PATH`: interpreter used to run the separation tool
//! - `REORCH_SPLEETER`: fallback separation executable
//! - `REORCH_BLOCK_SIZE`: frames per playback block

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::io::DEFAULT_WAV_BIT_DEPTH;
use crate::engine::playback::DEFAULT_BLOCK_SIZE;
use crate::engine::project::DEFAULT_SAMPLE_RATE;
use crate::error::{ReorchError, Result};
use crate::separation::StemCount;

/// Largest accepted playback block
pub const MAX_BLOCK_SIZE: usize = 16384;

/// Which output device playback uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Software driver paced at the real-time rate, discards audio
    #[default]
    Paced,
    /// System default device (requires the `cpal-output` feature)
    Cpal,
}

/// Settings for the external stem separation tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    /// Python interpreter, invoked as `python -m spleeter ...`
    pub python: String,
    /// Standalone executable tried when the module invocation fails to start
    pub program: String,
    pub stems: StemCount,
    /// Upper bound on one separation run
    pub timeout_secs: u64,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            program: "spleeter".to_string(),
            stems: StemCount::Four,
            timeout_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub block_size: usize,
    /// Rate reported by a project with no tracks
    pub default_sample_rate: u32,
    /// 16, 24 or 32 (float)
    pub wav_bit_depth: u16,
    pub output: OutputKind,
    pub separation: SeparationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            default_sample_rate: DEFAULT_SAMPLE_RATE,
            wav_bit_depth: DEFAULT_WAV_BIT_DEPTH,
            output: OutputKind::default(),
            separation: SeparationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReorchError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "Loaded config");
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(python) = var("REORCH_PYTHON_PATH") {
            self.separation.python = python;
        }
        if let Some(program) = var("REORCH_SPLEETER") {
            self.separation.program = program;
        }
        if let Some(raw) = var("REORCH_BLOCK_SIZE") {
            self.block_size = raw.trim().parse().map_err(|_| ReorchError::Config {
                reason: format!("REORCH_BLOCK_SIZE must be an integer, got '{}'", raw),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// # Errors
    /// `Config` for any out-of-range value
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(ReorchError::Config {
                reason: format!(
                    "block_size {} outside 1..={}",
                    self.block_size, MAX_BLOCK_SIZE
                ),
            });
        }
        if self.default_sample_rate == 0 {
            return Err(ReorchError::Config {
                reason: "default_sample_rate must be positive".to_string(),
            });
        }
        if !matches!(self.wav_bit_depth, 16 | 24 | 32) {
            return Err(ReorchError::Config {
                reason: format!("wav_bit_depth {} (expected 16, 24 or 32)", self.wav_bit_depth),
            });
        }
        if self.separation.timeout_secs == 0 {
            return Err(ReorchError::Config {
                reason: "separation.timeout_secs must be positive".to_string(),
            });
        }
        Ok(())
    }
}
