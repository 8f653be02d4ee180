//! Death records.

/// Why a unit died. The first failing selector check is the reason that
/// gets recorded, so the check order upstream is observable here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum FailReason {
    MachineRun = 1,
    SetFidelity = 2,
    Sortedness = 3,
    InstructionCount = 4,
    InstructionsExecuted = 5,
    Lifespan = 6,
    Competition = 7,
}

impl FailReason {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => FailReason::MachineRun,
            2 => FailReason::SetFidelity,
            3 => FailReason::Sortedness,
            4 => FailReason::InstructionCount,
            5 => FailReason::InstructionsExecuted,
            6 => FailReason::Lifespan,
            7 => FailReason::Competition,
            unknown => panic!("unknown fail reason value [{unknown}] in store"),
        }
    }
}

/// Created exactly once, at the Alive→Dead transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    pub id: u64,
    pub unit_id: u64,
    pub reason: FailReason,
}

impl Tombstone {
    pub fn new(unit_id: u64, reason: FailReason) -> Self {
        Self {
            id: 0,
            unit_id,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_round_trip_their_persistence_values() {
        for reason in [
            FailReason::MachineRun,
            FailReason::SetFidelity,
            FailReason::Sortedness,
            FailReason::InstructionCount,
            FailReason::InstructionsExecuted,
            FailReason::Lifespan,
            FailReason::Competition,
        ] {
            assert_eq!(FailReason::from_i64(reason.as_i64()), reason);
        }
    }
}
