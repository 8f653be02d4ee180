//! # Gensort Store
//!
//! Sharded persistence for populations. N identically-schema'd SQLite
//! databases hold the units; a unit lives on shard `id % N` and all of
//! its child rows live with it. Populations live on shard 0 only.
//!
//! Ids come from process-wide atomic generators seeded from the max id
//! observed across shards at open, so an id is unique everywhere and
//! deterministically routes to one shard. Writes that touch many units
//! are partitioned by shard and run in parallel transactions, one writer
//! per shard at a time.

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod prune;
pub mod schema;
pub mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use ids::{IdGenerator, IdGenerators};
pub use metrics::{BestUnit, PopulationMetrics};
pub use prune::{PruneReport, PrunedDeadData};
pub use store::Store;
