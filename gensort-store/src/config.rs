//! Store configuration, the `[persistence]` table of the tool config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory the shard files live in.
    pub path: PathBuf,
    /// Base database file name; shards append `_shard<i>` to its stem.
    pub name: String,
    /// Number of shard databases. 0 is treated as 1.
    pub shard_count: u64,
    /// PRAGMA statements applied to every connection at open, e.g.
    /// `"journal_mode = WAL"`.
    pub pragmas: Vec<String>,
    /// Extra per-connection settings, applied after `pragmas`.
    pub options: Vec<String>,
    /// Rows per streamed unit batch.
    pub batch_size: usize,
    /// Rows per streamed batch in the evaluate phase.
    pub eval_batch_size: usize,
    /// Base seed for the engine's RNG pool.
    pub seed: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            name: "gensort.db".to_string(),
            shard_count: 1,
            pragmas: vec![
                "journal_mode = WAL".to_string(),
                "synchronous = NORMAL".to_string(),
            ],
            options: Vec::new(),
            batch_size: 1_000,
            eval_batch_size: 1_000,
            seed: 42,
        }
    }
}

impl StoreConfig {
    pub fn shard_count(&self) -> usize {
        self.shard_count.max(1) as usize
    }

    /// File path of one shard. A single-shard store keeps the plain
    /// configured name.
    pub fn shard_path(&self, shard: usize) -> PathBuf {
        if self.shard_count() <= 1 {
            return self.path.join(&self.name);
        }
        let name = Path::new(&self.name);
        let stem = name
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(self.name.as_str());
        self.path.join(format!("{stem}_shard{shard}.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_shard_keeps_the_plain_name() {
        let config = StoreConfig {
            path: PathBuf::from("/data"),
            name: "pop.db".to_string(),
            shard_count: 1,
            ..StoreConfig::default()
        };
        assert_eq!(config.shard_path(0), PathBuf::from("/data/pop.db"));
    }

    #[test]
    fn multiple_shards_get_numbered_files() {
        let config = StoreConfig {
            path: PathBuf::from("/data"),
            name: "pop.db".to_string(),
            shard_count: 3,
            ..StoreConfig::default()
        };
        assert_eq!(config.shard_path(0), PathBuf::from("/data/pop_shard0.db"));
        assert_eq!(config.shard_path(2), PathBuf::from("/data/pop_shard2.db"));
    }

    #[test]
    fn zero_shard_count_means_one() {
        let config = StoreConfig {
            shard_count: 0,
            ..StoreConfig::default()
        };
        assert_eq!(config.shard_count(), 1);
    }
}
