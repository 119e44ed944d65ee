#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Headless command-line driver for the liquid sandbox.

mod config;
mod logging;
mod output;
mod scenario;
mod scene;
mod simulation;

use std::{io, path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use liquid_sandbox_rendering::FrameSink;
use liquid_sandbox_world::query;
use log::{debug, info, warn};

use crate::{
    config::SandboxConfig,
    output::{AsciiSink, PpmSink},
    scenario::{Scenario, Script},
    simulation::Simulation,
};

/// Runs a scripted liquid scene without a window.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scene to simulate.
    #[arg(long, value_enum, default_value_t = Scenario::Drop)]
    scenario: Scenario,
    /// Number of ticks to run.
    #[arg(long, default_value_t = 300)]
    ticks: u64,
    /// Simulated milliseconds per tick.
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,
    /// TOML file overriding tuning defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed for splash randomness and scenario scripting.
    #[arg(long)]
    seed: Option<u64>,
    /// Log a summary line every N ticks (0 disables).
    #[arg(long, default_value_t = 60)]
    report_every: u64,
    /// Print an ASCII frame every N ticks (0 disables).
    #[arg(long, default_value_t = 0)]
    ascii_every: u64,
    /// Write the final frame as a PPM image.
    #[arg(long)]
    ppm: Option<PathBuf>,
    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);
    debug!("arguments: {args:?}");

    let mut config = match &args.config {
        Some(path) => config::load(path)?,
        None => SandboxConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.tuning.splash.seed = seed;
    }
    let seed = config.tuning.splash.seed;

    let mut simulation = Simulation::new(config.tuning);
    let mut script = Script::setup(args.scenario, seed, &mut simulation);
    let mut ascii = AsciiSink::new(io::stdout().lock(), args.ascii_every);
    let dt = Duration::from_millis(args.tick_ms);

    for tick in 0..args.ticks {
        script.before_tick(&mut simulation, tick, dt);
        let report = simulation.step(dt);
        if args.report_every > 0 && report.tick % args.report_every == 0 {
            info!("{report}");
        }
        simulation.present(&mut ascii)?;
    }

    info!("final: {}", simulation.report());
    if simulation.rejected_tuning() > 0 {
        warn!(
            "{} tuning update(s) were rejected during the run",
            simulation.rejected_tuning()
        );
    }
    for absorber in query::absorber_view(simulation.world()).iter() {
        info!(
            "absorber {} ({}) holds {:.3}",
            absorber.id.get(),
            absorber.tag.as_str(),
            simulation.absorption().saturation(absorber.id)
        );
    }

    if let Some(path) = args.ppm {
        let mut sink = PpmSink::new(path, config.render.palette());
        simulation.present(&mut sink as &mut dyn FrameSink)?;
    }
    Ok(())
}
