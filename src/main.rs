#[macro_use]
extern crate log;

use std::process;
use std::time::Instant;

use anyhow::Result;
use clap::{CommandFactory, Parser};

use memsim::*;

fn exit_invalid(e: &SimError) -> ! {
    eprintln!("{}\n", e);
    let _ = Args::command().print_help();
    process::exit(1);
}

pub fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let cfg = match args.validate() {
        Ok(cfg) => cfg,
        Err(e) => exit_invalid(&e),
    };
    let mut sim = match Simulation::new(&cfg) {
        Ok(sim) => sim,
        Err(e) => exit_invalid(&e),
    };

    let start = Instant::now();
    sim.run()?;
    info!(
        "simulation finished in {} ms",
        start.elapsed().as_micros() as f64 / 1000f64
    );

    print_report(&cfg, &sim);
    Ok(())
}
