//! LoopLab CLI - headless audio demos
//!
//! Command-line interface for the looplab demos.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use looplab::cli::commands::{self, RenderOptions};
use looplab::cli::{Cli, Commands};
use looplab::engine::ExportFormat;
use looplab::loops::LoopTiming;
use looplab::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG still overrides the default filter
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("LoopLab v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Some(cmd) => handle_command(cmd, &config, cli.sample_rate, cli.bit_depth),
        None => {
            println!("LoopLab v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: &Config, sample_rate: u32, bit_depth: u16) -> Result<()> {
    let render = |output: PathBuf, length: f64| RenderOptions {
        output,
        length,
        sample_rate,
        format: ExportFormat::new(bit_depth),
    };

    match cmd {
        Commands::Loops {
            files,
            presses,
            length,
            output,
            video,
            skew,
            tempo,
            bars,
        } => {
            let loop_duration = if tempo.is_some() || bars.is_some() {
                let timing = LoopTiming {
                    tempo: tempo.unwrap_or(config.timing.tempo),
                    bars: bars.unwrap_or(config.timing.bars),
                    ..config.timing
                };
                timing.validate()?;
                Some(timing.duration())
            } else {
                None
            };

            let report = commands::render_loops(
                config,
                &files,
                &presses,
                loop_duration,
                video.then_some(skew),
                &render(output, length),
            )?;
            commands::print_report(&report.render);
            if let Some(stats) = &report.drift {
                commands::print_drift(stats);
            }
            Ok(())
        }
        Commands::Scrub {
            file,
            points,
            release,
            length,
            output,
            surface,
        } => {
            let report = commands::render_scrub(
                config,
                &file,
                &points,
                release,
                surface,
                &render(output, length),
            )?;
            commands::print_report(&report);
            Ok(())
        }
        Commands::Radio {
            file,
            inputs,
            length,
            output,
        } => {
            let report =
                commands::render_radio(config, &file, &inputs, None, &render(output, length))?;
            commands::print_report(&report);
            Ok(())
        }
        Commands::Synth {
            points,
            release,
            length,
            output,
            mouse,
            surface,
        } => {
            let report = commands::render_synth(
                config,
                &points,
                release,
                mouse,
                surface,
                &render(output, length),
            )?;
            commands::print_report(&report);
            Ok(())
        }
        Commands::Pads {
            files,
            hits,
            length,
            output,
        } => {
            let report = commands::render_pads(&files, &hits, &render(output, length))?;
            commands::print_report(&report);
            Ok(())
        }
        Commands::Meter { file, fps } => commands::print_meter(config, &file, fps, sample_rate),
        Commands::DefaultConfig => {
            println!("{}", commands::default_config()?);
            Ok(())
        }
    }
}
