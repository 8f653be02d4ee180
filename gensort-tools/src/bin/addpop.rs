//! Create a population, synthesize its seed units, print the new
//! population id to stdout.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use gensort_engine::{RngPool, Synthesizer};
use gensort_store::Store;
use gensort_tools::{init_logging, load_population_config, load_tool_config};

#[derive(Parser)]
#[command(about = "Create a gensort population and synthesize its seed units")]
struct Args {
    /// Tool config file.
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Population config file.
    #[arg(long, default_value = "./pop.toml")]
    popconfig: PathBuf,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let tool_config = load_tool_config(&args.config)?;
    let population_config = load_population_config(&args.popconfig)?;

    let store = Store::open(&tool_config.persistence).context("failed to open store")?;
    let population = store
        .create_population(&population_config)
        .context("failed to create population")?;

    let rng = RngPool::new(tool_config.persistence.seed);
    let seeded = Synthesizer::new(&store, &population, &rng)
        .synthesize()
        .context("synthesis failed")?;
    info!(population = population.id, seeded, "population ready");

    println!("{}", population.id);
    Ok(())
}
