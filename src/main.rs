//! Trains a network to approximate `sin(x)` on [-10, 10) and shows the fit converging
//! in a live terminal chart, one full-batch Adam step every tick.
//!
//! # Usage
//! Runnable via
//! ```sh
//! cargo run -- -h
//! cargo run
//! RUST_LOG=info cargo run -- --headless-steps 2000 --output-dir output
//! ```
//!
//! Logs go to stderr; redirect it (`2>train.log`) when enabling them alongside the live chart.

use std::{error::Error, path::PathBuf, time::Duration};

use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use sine_fit::{
    app::{App, SnapshotConfig, run, run_headless},
    model::{Topology, build_model},
    optim::AdamConfig,
    trainer::Trainer,
};

#[derive(Parser)]
struct Args {
    /// Seed for parameter initialization, random when omitted
    #[clap(short, long)]
    seed: Option<u64>,
    #[clap(short, long, default_value_t = 0.001)]
    lr: f32,
    /// Milliseconds between training steps
    #[clap(short, long, default_value_t = 100)]
    interval_ms: u64,
    #[clap(short, long, default_value_t = Topology::Explicit)]
    topology: Topology,
    /// Directory for PNG snapshots of the fit, none are written when omitted
    #[clap(short, long)]
    output_dir: Option<PathBuf>,
    #[clap(long, default_value_t = 100)]
    snapshot_every: usize,
    /// Train this many steps without opening the display
    #[clap(long)]
    headless_steps: Option<usize>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(|| rand::rng().random());
    log::info!("seed: {}, topology: {}, lr: {}", seed, args.topology, args.lr);

    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let model = build_model(args.topology, &mut rng)?;
    let cfg = AdamConfig {
        lr: args.lr,
        ..Default::default()
    };
    let trainer = Trainer::new(model, cfg);

    let snapshots = args.output_dir.map(|output_dir| SnapshotConfig {
        output_dir,
        every: args.snapshot_every,
    });
    let mut app = App::new(
        trainer,
        Duration::from_millis(args.interval_ms),
        snapshots,
    );

    match args.headless_steps {
        Some(steps) => run_headless(&mut app, steps)?,
        None => run(&mut app)?,
    }
    Ok(())
}
