//! # Gensort Engine
//!
//! The genetic engine: evaluation against randomized inputs, threshold
//! selection with curriculum ramps, competitive culling with a protected
//! elite band, fitness-proportional reproduction, and population
//! synthesis.
//!
//! All parallelism is fork-join. A generation is four strictly ordered
//! phases; inside a phase, work fans out across shards and cores and
//! joins at the phase boundary. Workers share nothing but the store, the
//! id generators, and the pooled RNG provider.

pub mod culler;
pub mod engine;
#[cfg(test)]
pub(crate) mod testutil;
pub mod error;
pub mod evaluator;
pub mod fitness;
pub mod reproducer;
pub mod rng;
pub mod selector;
pub mod synthesis;

pub use culler::Culler;
pub use engine::{GenerationEngine, GenerationSummary};
pub use error::{EngineError, EngineResult};
pub use evaluator::Evaluator;
pub use fitness::FitnessRanker;
pub use reproducer::Reproducer;
pub use rng::{PooledRng, RngPool};
pub use selector::Selector;
pub use synthesis::Synthesizer;
