//! Shared plumbing for the gensort driver binaries: config loading and
//! logging setup.
//!
//! Every binary logs to stderr with timestamps; the single line of
//! structured output each tool produces (a population id, a winning
//! program) is the only thing written to stdout.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use gensort_core::PopulationConfig;
use gensort_store::StoreConfig;

/// The tool config file: persistence settings under `[persistence]`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub persistence: StoreConfig,
}

pub fn load_tool_config(path: &Path) -> anyhow::Result<ToolConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read tool config [{}]", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("unable to parse tool config [{}]", path.display()))
}

pub fn load_population_config(path: &Path) -> anyhow::Result<PopulationConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read population config [{}]", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("unable to parse population config [{}]", path.display()))
}

/// Timestamped stderr logging; `RUST_LOG` overrides the `info` default.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
