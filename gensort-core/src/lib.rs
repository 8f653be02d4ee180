//! # Gensort Core
//!
//! The data model of the genetic engine: populations of units, each unit
//! a list of instructions, each instruction a mutable op sequence with a
//! packed on-disk form and a lazily-decompressed working form.
//!
//! Nothing in this crate talks to a database or spawns a thread; it is
//! the vocabulary the store and the engine share.

pub mod codec;
pub mod config;
pub mod evaluation;
pub mod instruction;
pub mod mutation;
pub mod population;
pub mod tombstone;
pub mod unit;

pub use config::{
    EvaluatorConfig, FitnessConfig, InstructionConfig, MachineSettings, PopulationConfig,
    SelectorConfig, UnitConfig,
};
pub use evaluation::Evaluation;
pub use instruction::Instruction;
pub use mutation::{MetaOp, Mutation};
pub use population::Population;
pub use tombstone::{FailReason, Tombstone};
pub use unit::{Alive, Unit};
