//! Store errors.
//!
//! Any failure here aborts the current generation; the engine never
//! continues past a broken shard.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("population [{0}] not found")]
    PopulationNotFound(u64),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keep the first of a batch of parallel shard errors.
pub(crate) fn first_error(errors: Vec<StoreError>) -> StoreResult<()> {
    match errors.into_iter().next() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
