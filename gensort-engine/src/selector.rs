//! The threshold gate.

use gensort_core::{Evaluation, FailReason, SelectorConfig};

/// Decides survival from a unit's latest evaluation. Returns the first
/// failing check; the order is observable in tombstone statistics and
/// must not change.
pub struct Selector {
    config: SelectorConfig,
}

impl Selector {
    pub fn new(config: &SelectorConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn select(&self, evaluation: &Evaluation, generation: u64) -> Option<FailReason> {
        if self.config.machine_run && !evaluation.machine_run {
            return Some(FailReason::MachineRun);
        }
        if evaluation.set_fidelity < self.config.effective_set_fidelity(generation) {
            return Some(FailReason::SetFidelity);
        }
        if evaluation.sortedness < self.config.effective_sortedness(generation) {
            return Some(FailReason::Sortedness);
        }
        if evaluation.instruction_count > self.config.instruction_count {
            return Some(FailReason::InstructionCount);
        }
        if evaluation.instructions_executed > self.config.instructions_executed {
            return Some(FailReason::InstructionsExecuted);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SelectorConfig {
        SelectorConfig {
            machine_run: true,
            set_fidelity: 100,
            sortedness: 100,
            set_fidelity_start: 0,
            set_fidelity_step: 0,
            sortedness_start: 0,
            sortedness_step: 0,
            instruction_count: 200,
            instructions_executed: 10_000,
        }
    }

    fn passing_evaluation() -> Evaluation {
        Evaluation {
            machine_run: true,
            set_fidelity: 100,
            sortedness: 100,
            instruction_count: 200,
            instructions_executed: 10_000,
            ..Evaluation::default()
        }
    }

    #[test]
    fn a_passing_evaluation_survives() {
        let selector = Selector::new(&config());
        assert_eq!(selector.select(&passing_evaluation(), 0), None);
    }

    #[test]
    fn checks_fail_in_declared_order() {
        let selector = Selector::new(&config());

        let mut evaluation = passing_evaluation();
        evaluation.machine_run = false;
        evaluation.set_fidelity = 0;
        assert_eq!(
            selector.select(&evaluation, 0),
            Some(FailReason::MachineRun)
        );

        let mut evaluation = passing_evaluation();
        evaluation.set_fidelity = 99;
        evaluation.sortedness = 0;
        assert_eq!(
            selector.select(&evaluation, 0),
            Some(FailReason::SetFidelity)
        );

        let mut evaluation = passing_evaluation();
        evaluation.sortedness = 99;
        evaluation.instruction_count = 1_000;
        assert_eq!(
            selector.select(&evaluation, 0),
            Some(FailReason::Sortedness)
        );

        let mut evaluation = passing_evaluation();
        evaluation.instruction_count = 201;
        assert_eq!(
            selector.select(&evaluation, 0),
            Some(FailReason::InstructionCount)
        );

        let mut evaluation = passing_evaluation();
        evaluation.instructions_executed = 10_001;
        assert_eq!(
            selector.select(&evaluation, 0),
            Some(FailReason::InstructionsExecuted)
        );
    }

    #[test]
    fn curriculum_thresholds_gate_by_generation() {
        let ramped = SelectorConfig {
            sortedness: 100,
            sortedness_start: 20,
            sortedness_step: 10,
            ..config()
        };
        let selector = Selector::new(&ramped);

        let mut evaluation = passing_evaluation();
        evaluation.sortedness = 20;
        // Effective threshold is 20 until generation 10, 21 after.
        assert_eq!(selector.select(&evaluation, 0), None);
        assert_eq!(selector.select(&evaluation, 9), None);
        assert_eq!(
            selector.select(&evaluation, 10),
            Some(FailReason::Sortedness)
        );
    }
}
