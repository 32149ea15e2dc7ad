//! # Trigger Runner
//!
//! Thin per-event driver for the Level-1 hardware-trigger track-finding
//! engine: loads configuration, builds the (φ, η) sector grid once, then
//! reads a run of events from a JSON file, dispatches each through
//! [`trigger_core::ht_pair::process_sector`] across every sector it touches,
//! and writes the fitted-track collection back out as JSON.
//!
//! # Usage
//!
//! ```bash
//! trigger_runner --config /etc/trigger/config.toml --input events.json --output tracks.json
//! ```

#![deny(warnings)]

mod io;
mod producer;

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;
use trigger_common::config::{ConfigLoader, TriggerConfig};
use trigger_core::stub::Stub;

/// Trigger Runner - per-event driver for the track-finding engine
#[derive(Parser, Debug)]
#[command(name = "trigger_runner")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Dispatches stub events through the track-finding engine")]
#[command(long_about = None)]
struct Args {
    /// Path to the engine configuration file (config.toml)
    #[arg(short, long, default_value = trigger_common::consts::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Path to the input event file (JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Path to write fitted-track output (JSON). Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("trigger_runner failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("trigger_runner v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = TriggerConfig::load(&args.config)?;
    config.validate()?;

    let input_json = std::fs::read_to_string(&args.input)?;
    let input: io::RunInput = serde_json::from_str(&input_json)?;
    config.set_magnetic_field(input.magnetic_field_tesla);

    let grid = producer::SectorGrid::build(&config);
    info!(n_sectors = grid.len(), n_events = input.events.len(), "sector grid built");

    let mut outputs = Vec::with_capacity(input.events.len());
    for (event_idx, event) in input.events.into_iter().enumerate() {
        let span = tracing::info_span!("event", event_idx);
        let _enter = span.enter();

        let mut arena: Vec<Stub> = event
            .stubs
            .into_iter()
            .enumerate()
            .map(|(i, record)| record.into_stub(i as u32))
            .collect();

        let event_output = producer::run_event(&grid, &mut arena, &config)?;
        info!(num_tracks = event_output.fitted_tracks.len(), "event processed");

        let tracks: Vec<io::FittedTrackRecord> =
            event_output.fitted_tracks.iter().map(io::FittedTrackRecord::from).collect();
        outputs.push(io::EventOutput {
            tracks,
            diagnostics: (&event_output.diagnostics).into(),
        });
    }

    let output_json = serde_json::to_string_pretty(&outputs)?;
    match &args.output {
        Some(path) => std::fs::write(path, output_json)?,
        None => println!("{output_json}"),
    }

    info!("trigger_runner done");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
