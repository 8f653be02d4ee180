//! Run generations against an existing population.
//!
//! Exits nonzero when the population goes extinct.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use gensort_engine::GenerationEngine;
use gensort_store::Store;
use gensort_tools::{init_logging, load_tool_config};

#[derive(Parser)]
#[command(about = "Advance a gensort population by K generations")]
struct Args {
    /// Tool config file.
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Population to progress.
    #[arg(long)]
    popid: u64,

    /// Generations to run.
    #[arg(long, default_value_t = 1)]
    generations: u64,

    /// Stream shard batches. Streaming is the authoritative mode and
    /// the flag exists for driver compatibility; runs stream either way.
    #[arg(long)]
    streaming: bool,

    /// Override the configured evaluation rounds per unit.
    #[arg(long)]
    eval_rounds: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let tool_config = load_tool_config(&args.config)?;
    let store = Store::open(&tool_config.persistence).context("failed to open store")?;
    let population = store
        .load_population(args.popid)
        .context("unable to load population")?;
    info!(
        population = population.id,
        generation = population.current_generation,
        generations = args.generations,
        streaming = args.streaming,
        "starting run"
    );

    let mut engine = GenerationEngine::new(&store, population);
    if let Some(rounds) = args.eval_rounds {
        engine = engine.with_eval_rounds(rounds);
    }

    for _ in 0..args.generations {
        let summary = engine.run_generation()?;
        let metrics = store.metrics(args.popid)?;
        info!(
            generation = summary.generation,
            alive = metrics.alive_count,
            best_sortedness = metrics.best_sortedness,
            best_set_fidelity = metrics.best_set_fidelity,
            avg_sortedness = format!("{:.1}", metrics.avg_sortedness),
            avg_set_fidelity = format!("{:.1}", metrics.avg_set_fidelity),
            "progress"
        );
    }

    Ok(())
}
