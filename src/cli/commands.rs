//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use super::{GainSetting, MixArgs};
use crate::config::{EngineConfig, OutputKind};
use crate::engine::{AudioFormat, Codecs, OutputDevice, Player, Project, TimedOutput, WavCodec};
use crate::error::{ReorchError, Result};
use crate::separation::{self, SpleeterSeparator, StemCount, STEM_TRACK_PREFIX};

/// How often `play` reports the cursor
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Codec registry honouring the configured WAV bit depth
pub fn codecs_for(config: &EngineConfig) -> Result<Codecs> {
    Ok(Codecs::with_wav(WavCodec::with_bit_depth(config.wav_bit_depth)?))
}

/// Output device selected by the configuration
pub fn output_device(config: &EngineConfig) -> Result<Box<dyn OutputDevice>> {
    match config.output {
        OutputKind::Paced => Ok(Box::new(TimedOutput::paced())),
        #[cfg(feature = "cpal-output")]
        OutputKind::Cpal => Ok(Box::new(crate::engine::CpalOutput::new())),
        #[cfg(not(feature = "cpal-output"))]
        OutputKind::Cpal => Err(ReorchError::BackendUnavailable {
            operation: "output",
            format: "cpal (build with --features cpal-output)".to_string(),
        }),
    }
}

/// Decode every input into a track of a new project
pub fn load_project(config: &EngineConfig, codecs: &Codecs, inputs: &[PathBuf]) -> Result<Project> {
    let project = Project::with_default_sample_rate(config.default_sample_rate);
    for path in inputs {
        project.add_track(codecs.import_track(path)?)?;
    }
    Ok(project)
}

/// Apply `--gain` and `--mute` settings (1-based track numbers)
pub fn apply_track_settings(
    project: &Project,
    gains: &[GainSetting],
    mutes: &[usize],
) -> Result<()> {
    let lookup = |number: usize| {
        number
            .checked_sub(1)
            .and_then(|index| project.track(index))
            .ok_or(ReorchError::TrackNotFound {
                index: number,
                len: project.len(),
            })
    };

    for setting in gains {
        lookup(setting.track)?.set_gain(setting.gain)?;
    }
    for &number in mutes {
        lookup(number)?.set_mute(true);
    }
    Ok(())
}

fn prepare_mix(config: &EngineConfig, codecs: &Codecs, args: &MixArgs) -> Result<Project> {
    let project = load_project(config, codecs, &args.inputs)?;
    apply_track_settings(&project, &args.gain, &args.mute)?;
    Ok(project)
}

/// Print the track listing for a set of files
pub fn info(config: &EngineConfig, inputs: &[PathBuf], json: bool) -> Result<()> {
    let codecs = codecs_for(config)?;
    let project = load_project(config, &codecs, inputs)?;
    let tracks = project.track_infos();

    if json {
        println!("{}", serde_json::to_string_pretty(&tracks)?);
        return Ok(());
    }

    println!(
        "{:>3}  {:<32} {:>9} {:>3} {:>7} {:>9}",
        "#", "Name", "Duration", "Ch", "Rate", "Peak"
    );
    println!("{:-<70}", "");
    for track in &tracks {
        println!(
            "{:>3}  {:<32} {:>8.2}s {:>3} {:>7} {:>6.1}dB",
            track.index + 1,
            track.name,
            track.duration_secs,
            track.channels,
            track.sample_rate,
            track.peak_db
        );
    }
    println!(
        "\n{} tracks, {:.2}s at {} Hz",
        project.len(),
        project.max_duration(),
        project.sample_rate()
    );
    Ok(())
}

/// Wall-clock limit for `play`
fn playback_limit(duration: Option<f64>) -> Result<Option<Duration>> {
    duration
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|e| ReorchError::Config {
                reason: format!("invalid playback duration {}: {}", secs, e),
            })
        })
        .transpose()
}

/// Fail before any work if nothing can write `output`
fn check_writable(codecs: &Codecs, output: &Path) -> Result<()> {
    let format = AudioFormat::from_path(output)?;
    if codecs.can_encode(format) {
        Ok(())
    } else {
        Err(ReorchError::BackendUnavailable {
            operation: "encode",
            format: format.to_string(),
        })
    }
}

/// Play the mix until it ends or `duration` seconds have elapsed
pub fn play(
    config: &EngineConfig,
    args: &MixArgs,
    start: f64,
    duration: Option<f64>,
) -> Result<()> {
    let limit = playback_limit(duration)?;
    let codecs = codecs_for(config)?;
    let project = Arc::new(prepare_mix(config, &codecs, args)?);
    let player = Player::with_block_size(project, output_device(config)?, config.block_size);

    let from = player.seek(start);
    info!(device = player.device_name(), from, "Starting playback");
    if !player.play()? {
        println!("Nothing to play.");
        return Ok(());
    }

    let started = Instant::now();
    while player.is_playing() {
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        thread::sleep(PROGRESS_INTERVAL);
        println!(
            "{:>8.2}s / {:.2}s",
            player.position_secs(),
            player.project().max_duration()
        );
    }
    player.pause();

    println!("Stopped at {:.2}s", player.position_secs());
    Ok(())
}

/// Render the mix into `output`
pub fn mix(config: &EngineConfig, args: &MixArgs, output: &Path) -> Result<()> {
    let codecs = codecs_for(config)?;
    check_writable(&codecs, output)?;
    let project = prepare_mix(config, &codecs, args)?;
    let rendered = project.mixdown(config.block_size)?;
    codecs.encode(&rendered, output)?;

    println!(
        "Mixed {} tracks ({:.2}s) into {}",
        project.len(),
        rendered.duration_secs(),
        output.display()
    );
    Ok(())
}

/// Extract `[start, end)` seconds of `input` into `output`
pub fn isolate(
    config: &EngineConfig,
    input: &Path,
    start: f64,
    end: f64,
    output: &Path,
) -> Result<()> {
    let codecs = codecs_for(config)?;
    check_writable(&codecs, output)?;
    let project = load_project(config, &codecs, &[input.to_path_buf()])?;
    let track = project.isolate(0, start, end)?;
    codecs.export_track(&track, output)?;

    println!(
        "{}: {:.2}s written to {}",
        track.name(),
        track.duration(),
        output.display()
    );
    Ok(())
}

/// Separate `input` into stems and write each one to `output_dir`
pub async fn separate(
    config: &EngineConfig,
    input: &Path,
    stems: Option<StemCount>,
    output_dir: &Path,
) -> Result<()> {
    let codecs = Arc::new(codecs_for(config)?);
    let project = load_project(config, &codecs, &[input.to_path_buf()])?;
    let separator = SpleeterSeparator::from_config(&config.separation);
    let stems = stems.unwrap_or(config.separation.stems);

    let report = separation::separate_track(&project, 0, &separator, &codecs, stems).await?;

    tokio::fs::create_dir_all(output_dir).await?;
    for track in &report.added {
        let stem = track.name().trim_start_matches(STEM_TRACK_PREFIX);
        let path = output_dir.join(format!("{}.wav", stem));
        codecs.export_track(track, &path)?;
        println!("{:<14} {}", stem, path.display());
    }
    for (stem, reason) in &report.skipped {
        println!("{:<14} skipped: {}", stem, reason);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AudioBuffer, Track};

    fn project_with_two_tracks() -> Project {
        let project = Project::new();
        for name in ["a", "b"] {
            let buffer = AudioBuffer::from_interleaved(vec![0.1; 10], 1, 1000).unwrap();
            project.add_track(Track::new(name, buffer)).unwrap();
        }
        project
    }

    #[test]
    fn test_apply_track_settings_uses_one_based_numbers() {
        let project = project_with_two_tracks();
        apply_track_settings(
            &project,
            &[GainSetting { track: 2, gain: 0.25 }],
            &[1],
        )
        .unwrap();

        assert!(project.track(0).unwrap().is_muted());
        assert_eq!(project.track(1).unwrap().gain(), 0.25);
    }

    #[test]
    fn test_apply_track_settings_rejects_bad_numbers() {
        let project = project_with_two_tracks();
        assert!(matches!(
            apply_track_settings(&project, &[], &[0]),
            Err(ReorchError::TrackNotFound { .. })
        ));
        let out_of_range = [GainSetting { track: 3, gain: 1.0 }];
        assert!(apply_track_settings(&project, &out_of_range, &[]).is_err());
        assert!(matches!(
            apply_track_settings(&project, &[GainSetting { track: 1, gain: -1.0 }], &[]),
            Err(ReorchError::InvalidGain { .. })
        ));
    }

    fn missing_inputs() -> MixArgs {
        MixArgs {
            inputs: vec![PathBuf::from("/nonexistent/a.wav")],
            gain: Vec::new(),
            mute: Vec::new(),
        }
    }

    #[test]
    fn test_play_rejects_invalid_duration_before_loading() {
        let config = EngineConfig::default();
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let result = play(&config, &missing_inputs(), 0.0, Some(bad));
            assert!(matches!(result, Err(ReorchError::Config { .. })), "{bad}");
        }
        // A valid limit gets as far as loading the inputs
        assert!(matches!(
            play(&config, &missing_inputs(), 0.0, Some(1.0)),
            Err(ReorchError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_mix_checks_output_format_first() {
        let config = EngineConfig::default();
        let result = mix(&config, &missing_inputs(), Path::new("out.xyz"));
        assert!(matches!(result, Err(ReorchError::UnsupportedFormat { .. })));
    }

    #[cfg(not(feature = "cpal-output"))]
    #[test]
    fn test_cpal_output_requires_feature() {
        let config = EngineConfig {
            output: OutputKind::Cpal,
            ..EngineConfig::default()
        };
        assert!(matches!(
            output_device(&config),
            Err(ReorchError::BackendUnavailable { .. })
        ));
    }
}
