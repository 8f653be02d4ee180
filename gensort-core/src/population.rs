//! The root aggregate.

use crate::config::PopulationConfig;

/// A population row: identity, progress counter, and the frozen
/// configuration. Units are streamed from the store, never held here.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    pub id: u64,
    pub current_generation: u64,
    pub config: PopulationConfig,
}

impl Population {
    pub fn new(config: PopulationConfig) -> Self {
        Self {
            id: 0,
            current_generation: 0,
            config,
        }
    }
}
