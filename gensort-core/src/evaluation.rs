//! Fitness snapshots.

/// One fitness measurement of a unit. Append-only per unit; the most
/// recent evaluation is always the authoritative one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluation {
    pub id: u64,
    pub unit_id: u64,
    /// True iff the machine halted without error.
    pub machine_run: bool,
    /// Share of distinct input values that survived into the output,
    /// 0..=100.
    pub set_fidelity: u8,
    /// Inversion-based sortedness of the output, 0..=100.
    pub sortedness: u8,
    /// Decompressed program length.
    pub instruction_count: u64,
    /// Ops attempted by the machine.
    pub instructions_executed: u64,
    pub machine_error: Option<String>,
}

impl Evaluation {
    /// Combined score used for synthesis ranking and worst-of-rounds
    /// selection. Not the survival gate.
    pub fn fitness(&self) -> u32 {
        u32::from(self.set_fidelity) + u32::from(self.sortedness)
    }
}
