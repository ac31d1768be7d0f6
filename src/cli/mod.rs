//! CLI Module
//!
//! Command-line interface for the Reorch mixing engine.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::separation::StemCount;

/// Reorch - multi-track mixing, extraction and stem separation
#[derive(Parser, Debug)]
#[command(name = "reorch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// A `TRACK=GAIN` pair, track numbers starting at 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainSetting {
    pub track: usize,
    pub gain: f32,
}

fn parse_gain_setting(s: &str) -> std::result::Result<GainSetting, String> {
    let (track, gain) = s
        .split_once('=')
        .ok_or_else(|| format!("expected TRACK=GAIN, got '{}'", s))?;
    let track = track
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid track number '{}'", track))?;
    let gain = gain
        .trim()
        .parse::<f32>()
        .map_err(|_| format!("invalid gain '{}'", gain))?;
    Ok(GainSetting { track, gain })
}

/// A finite, non-negative number of seconds
fn parse_seconds(s: &str) -> std::result::Result<f64, String> {
    let secs = s
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid number of seconds '{}'", s))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("seconds must be finite and >= 0, got '{}'", s));
    }
    Ok(secs)
}

/// Input files and per-track settings shared by the mixing commands
#[derive(Args, Debug, Clone)]
pub struct MixArgs {
    /// Audio files, one track each, in mix order
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Set a track gain, e.g. `--gain 2=0.5` (repeatable)
    #[arg(short, long, value_parser = parse_gain_setting)]
    pub gain: Vec<GainSetting>,

    /// Mute a track by number (repeatable)
    #[arg(short, long)]
    pub mute: Vec<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the tracks a set of files would produce
    #[command(name = "info")]
    Info {
        /// Audio files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Play files mixed together on the configured output
    #[command(name = "play")]
    Play {
        #[command(flatten)]
        mix: MixArgs,

        /// Start position in seconds
        #[arg(short, long, default_value_t = 0.0, value_parser = parse_seconds)]
        start: f64,

        /// Stop after this many seconds
        #[arg(short = 'd', long, value_parser = parse_seconds)]
        duration: Option<f64>,
    },

    /// Render files mixed together into one file
    #[command(name = "mix")]
    Mix {
        #[command(flatten)]
        mix: MixArgs,

        /// Output file; the extension selects the format
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Extract a time range of a file into a new file
    #[command(name = "isolate")]
    Isolate {
        /// Source audio file
        input: PathBuf,

        /// Range start in seconds
        #[arg(short, long)]
        start: f64,

        /// Range end in seconds
        #[arg(short, long)]
        end: f64,

        /// Output file; the extension selects the format
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Split a file into instrument stems with Spleeter
    #[command(name = "separate")]
    Separate {
        /// Source audio file
        input: PathBuf,

        /// 2, 4 or 5 stems (default from config)
        #[arg(long)]
        stems: Option<StemCount>,

        /// Directory for the stem WAV files
        #[arg(short, long)]
        output_dir: PathBuf,
    },
}
