//! Spleeter subprocess
//!
//! Runs `python -m spleeter separate -p spleeter:<n>stems -o <dir> <input>`,
//! falling back to a standalone `spleeter` executable when the interpreter
//! cannot be started. Spleeter writes `<dir>/<input stem>/<name>.wav`.

use std::io::ErrorKind;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Separator, StemCount, StemFile};
use crate::config::SeparationConfig;
use crate::error::{ReorchError, Result};

/// Characters of stderr kept in error messages
const STDERR_EXCERPT: usize = 300;

#[derive(Debug, Clone)]
pub struct SpleeterSeparator {
    python: String,
    program: String,
    timeout: Duration,
}

impl Default for SpleeterSeparator {
    fn default() -> Self {
        Self::from_config(&SeparationConfig::default())
    }
}

enum Attempt {
    /// The executable could not be found
    Missing,
    Finished(Output),
}

impl SpleeterSeparator {
    pub fn new(python: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            program: program.into(),
            timeout: Duration::from_secs(SeparationConfig::default().timeout_secs),
        }
    }

    pub fn from_config(config: &SeparationConfig) -> Self {
        Self {
            python: config.python.clone(),
            program: config.program.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn tool_args(input: &Path, output_dir: &Path, stems: StemCount) -> Vec<String> {
        vec![
            "separate".to_string(),
            "-p".to_string(),
            stems.model_name(),
            "-o".to_string(),
            output_dir.display().to_string(),
            input.display().to_string(),
        ]
    }

    async fn run(&self, mut command: Command, label: &str) -> Result<Attempt> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Attempt::Missing),
            Err(e) => {
                return Err(ReorchError::Separation {
                    reason: format!("failed to start {}: {}", label, e),
                })
            }
        };

        // Dropping the future on timeout kills the child
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(Attempt::Finished(output)),
            Ok(Err(e)) => Err(ReorchError::Separation {
                reason: format!("{} did not complete: {}", label, e),
            }),
            Err(_) => Err(ReorchError::Separation {
                reason: format!("{} timed out after {:?}", label, self.timeout),
            }),
        }
    }

    fn check_status(output: &Output, label: &str) -> Result<()> {
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt: String = stderr.chars().take(STDERR_EXCERPT).collect();
        Err(ReorchError::Separation {
            reason: format!("{} exited with {}: {}", label, output.status, excerpt.trim()),
        })
    }
}

#[async_trait]
impl Separator for SpleeterSeparator {
    fn name(&self) -> &str {
        "spleeter"
    }

    async fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        stems: StemCount,
    ) -> Result<Vec<StemFile>> {
        let args = Self::tool_args(input, output_dir, stems);

        let mut module = Command::new(&self.python);
        module.arg("-m").arg("spleeter").args(&args);
        let module_label = format!("{} -m spleeter", self.python);

        let output = match self.run(module, &module_label).await? {
            Attempt::Finished(output) => {
                Self::check_status(&output, &module_label)?;
                output
            }
            Attempt::Missing => {
                warn!(python = %self.python, "Interpreter not found, trying {}", self.program);
                let mut standalone = Command::new(&self.program);
                standalone.args(&args);
                match self.run(standalone, &self.program).await? {
                    Attempt::Finished(output) => {
                        Self::check_status(&output, &self.program)?;
                        output
                    }
                    Attempt::Missing => {
                        return Err(ReorchError::Separation {
                            reason: format!(
                                "neither '{}' nor '{}' could be found",
                                self.python, self.program
                            ),
                        })
                    }
                }
            }
        };
        debug!(
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            "Separation tool finished"
        );

        collect_stems(input, output_dir, stems)
    }
}

/// Find the stem files Spleeter wrote for `input`
///
/// # Errors
/// `Separation` if none of the expected files exist
pub fn collect_stems(input: &Path, output_dir: &Path, stems: StemCount) -> Result<Vec<StemFile>> {
    let base = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let track_dir = output_dir.join(base);

    let found: Vec<StemFile> = stems
        .stem_names()
        .iter()
        .filter_map(|name| {
            let path = track_dir.join(format!("{}.wav", name));
            if path.is_file() {
                Some(StemFile {
                    name: (*name).to_string(),
                    path,
                })
            } else {
                warn!(stem = name, path = %path.display(), "Expected stem file missing");
                None
            }
        })
        .collect();

    if found.is_empty() {
        return Err(ReorchError::Separation {
            reason: format!("no stem files found under {}", track_dir.display()),
        });
    }
    Ok(found)
}
