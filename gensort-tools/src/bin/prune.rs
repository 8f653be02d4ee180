//! Offline prune: delete dead lineages that no alive unit descends
//! from, then reclaim file space.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use gensort_store::Store;
use gensort_tools::{init_logging, load_tool_config};

#[derive(Parser)]
#[command(about = "Prune dead lineages from a gensort population")]
struct Args {
    /// Tool config file.
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Population to prune.
    #[arg(long)]
    popid: u64,

    /// Preview what would be deleted without deleting.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let tool_config = load_tool_config(&args.config)?;
    let store = Store::open(&tool_config.persistence).context("failed to open store")?;
    // Fails fast if the population does not exist.
    let population = store
        .load_population(args.popid)
        .context("unable to load population")?;

    if args.dry_run {
        info!(population = population.id, "dry run, nothing will be deleted");
    }
    let report = store.prune(population.id, args.dry_run)?;

    let mode = if args.dry_run { "(dry run)" } else { "complete" };
    println!("Population {} prune {}:", population.id, mode);
    println!("  Total units:           {}", report.total_units);
    println!("  Alive units:           {}", report.alive_units);
    println!("  Ancestor units kept:   {}", report.ancestor_units);
    println!("  Units deleted:         {}", report.deleted_units);
    println!("  Instructions deleted:  {}", report.deleted_instructions);
    println!("  Mutations deleted:     {}", report.deleted_mutations);
    println!("  Evaluations deleted:   {}", report.deleted_evaluations);
    println!("  Tombstones deleted:    {}", report.deleted_tombstones);
    Ok(())
}
