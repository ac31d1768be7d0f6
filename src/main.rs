//! Reorch CLI - Multi-Track Mixing Engine
//!
//! Command-line interface for the Reorch mixing engine.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reorch::cli::commands;
use reorch::cli::{Cli, Commands};
use reorch::EngineConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("Reorch v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    }
    .with_env_overrides()
    .context("applying environment overrides")?;

    match cli.command {
        Some(cmd) => handle_command(cmd, &config),
        None => {
            println!("Reorch v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: &EngineConfig) -> anyhow::Result<()> {
    match cmd {
        Commands::Info { inputs, json } => commands::info(config, &inputs, json)?,
        Commands::Play {
            mix,
            start,
            duration,
        } => commands::play(config, &mix, start, duration)?,
        Commands::Mix { mix, output } => commands::mix(config, &mix, &output)?,
        Commands::Isolate {
            input,
            start,
            end,
            output,
        } => commands::isolate(config, &input, start, end, &output)?,
        Commands::Separate {
            input,
            stems,
            output_dir,
        } => {
            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            runtime.block_on(commands::separate(config, &input, stems, &output_dir))?
        }
    }
    Ok(())
}
