//! Machine runtime errors.
//!
//! Every variant carries the offending instruction pointer and, where it
//! matters, the memory pointer. These messages end up verbatim in
//! evaluation records, so they stay stable and specific.

use thiserror::Error;

/// Operational failures raised while executing a program.
///
/// None of these abort the process; the evaluator captures them and the
/// generation moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineError {
    #[error("op [{ip}] failed to move memory pointer [0] left, out of bounds")]
    PointerUnderflow { ip: usize },

    #[error("op [{ip}] failed to move memory pointer [{pointer}] right, out of bounds")]
    PointerOverflow { ip: usize, pointer: usize },

    #[error("op [{ip}] failed to increment cell [{pointer}], already at 255")]
    CellOverflow { ip: usize, pointer: usize },

    #[error("op [{ip}] failed to decrement cell [{pointer}], already at 0")]
    CellUnderflow { ip: usize, pointer: usize },

    #[error("op [{ip}] found no `]` at or after it")]
    MissingLoopEnd { ip: usize },

    #[error("unbalanced `]` at op [{ip}], while stack is empty")]
    UnbalancedLoopEnd { ip: usize },

    #[error("op [{ip}] failed to jump, bookmark [{bookmark}] out of bounds (memory length [{cells}])")]
    BookmarkOutOfBounds {
        ip: usize,
        bookmark: usize,
        cells: usize,
    },

    #[error("instruction pointer [{ip}] out of bounds (program length [{len}])")]
    TapeOutOfBounds { ip: usize, len: usize },

    #[error("input length [{len}] is greater than memory capacity [{capacity}]")]
    InputTooLong { len: usize, capacity: usize },

    #[error("read count [{count}] is greater than memory capacity [{capacity}]")]
    ReadTooLong { count: usize, capacity: usize },

    #[error("instruction execution count limit reached: {executed}")]
    ExecutionLimit { executed: u64 },
}

impl MachineError {
    /// True for the one halt cause that is a budget, not a program fault.
    pub fn is_execution_limit(&self) -> bool {
        matches!(self, MachineError::ExecutionLimit { .. })
    }
}
