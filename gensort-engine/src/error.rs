//! Engine errors.

use thiserror::Error;

use gensort_store::StoreError;

#[derive(Error, Debug)]
pub enum EngineError {
    /// No alive units remain after selection and culling.
    #[error("population [{population}] went extinct at generation [{generation}]")]
    Extinct { population: u64, generation: u64 },

    /// Synthesis hit its deadline or attempt budget with zero viable
    /// candidates. Thresholds are too harsh for the random-program
    /// distribution.
    #[error("synthesis produced no viable units within its budget")]
    SynthesisFailed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;
