//! Population configuration.
//!
//! A population's every tunable lives here, in the nested shape the TOML
//! file uses. The store persists a flat projection of these fields in the
//! `populations` table, one column per leaf; the nesting exists for
//! humans, the flattening for SQL.

use serde::{Deserialize, Serialize};

/// Master configuration of a population. Immutable once the population
/// has been created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Seed-unit target: synthesis runs until this many candidates pass.
    pub unit_count: u64,
    /// Attempt budget for synthesis before it gives up.
    pub synthesis_pool: u64,
    /// Alive ceiling enforced by the competitive cull.
    pub carrying_capacity: u64,
    /// Top ranks protected from the cull.
    pub elitism: u64,
    /// Offspring allocated to the best-ranked survivor.
    pub max_offspring: u64,
    pub unit: UnitConfig,
    pub eval: EvaluatorConfig,
    pub select: SelectorConfig,
    pub fitness: FitnessConfig,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            unit_count: 1_000,
            synthesis_pool: 1_000_000,
            carrying_capacity: 10_000,
            elitism: 10,
            max_offspring: 5,
            unit: UnitConfig::default(),
            eval: EvaluatorConfig::default(),
            select: SelectorConfig::default(),
            fitness: FitnessConfig::default(),
        }
    }
}

/// Per-unit genome parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Per-instruction-per-generation mutation probability.
    pub mutation_chance: f32,
    /// Instructions per fresh genome.
    pub instruction_count: u64,
    /// Generations a unit may survive before dying of old age.
    pub lifespan: u64,
    pub instruction: InstructionConfig,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            mutation_chance: 0.25,
            instruction_count: 10,
            lifespan: 20,
            instruction: InstructionConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstructionConfig {
    /// Prefab op-sequences concatenated per synthesized instruction.
    pub op_set_count: u64,
}

impl Default for InstructionConfig {
    fn default() -> Self {
        Self { op_set_count: 5 }
    }
}

/// Machine limits, owned by the evaluator section of the config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    pub max_instruction_execution_count: u64,
    pub memory_cell_count: u64,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            max_instruction_execution_count: 100_000,
            memory_cell_count: 100,
        }
    }
}

/// Evaluation parameters, including the input-size curriculum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub machine: MachineSettings,
    /// Full-difficulty input length; the curriculum ramps toward this.
    pub input_cell_count: u64,
    /// Cells read back for scoring at full difficulty.
    pub output_cell_count: u64,
    /// Input length used while seeding the population.
    pub synthesis_input_cell_count: u64,
    /// Curriculum start size; 0 disables the ramp.
    pub input_cell_start: u64,
    /// Generations per +1 cell; 0 disables the ramp.
    pub input_cell_step: u64,
    /// Evaluations per unit per generation; the worst one counts.
    pub eval_rounds: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            machine: MachineSettings::default(),
            input_cell_count: 8,
            output_cell_count: 8,
            synthesis_input_cell_count: 2,
            input_cell_start: 2,
            input_cell_step: 50,
            eval_rounds: 1,
        }
    }
}

impl EvaluatorConfig {
    /// Curriculum-effective input length at `generation`.
    pub fn effective_input_cells(&self, generation: u64) -> u64 {
        ramp(
            self.input_cell_start,
            self.input_cell_step,
            self.input_cell_count,
            generation,
        )
    }
}

/// Threshold gate parameters, including the score-threshold curricula.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Require a clean machine run to survive.
    pub machine_run: bool,
    /// Set-fidelity target threshold (0..=100).
    pub set_fidelity: u8,
    /// Sortedness target threshold (0..=100).
    pub sortedness: u8,
    pub set_fidelity_start: u8,
    pub set_fidelity_step: u64,
    pub sortedness_start: u8,
    pub sortedness_step: u64,
    /// Program-length ceiling.
    pub instruction_count: u64,
    /// Executed-op ceiling.
    pub instructions_executed: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            machine_run: true,
            set_fidelity: 100,
            sortedness: 100,
            set_fidelity_start: 20,
            set_fidelity_step: 10,
            sortedness_start: 20,
            sortedness_step: 10,
            instruction_count: 2_000,
            instructions_executed: 100_000,
        }
    }
}

impl SelectorConfig {
    pub fn effective_set_fidelity(&self, generation: u64) -> u8 {
        ramp(
            u64::from(self.set_fidelity_start),
            self.set_fidelity_step,
            u64::from(self.set_fidelity),
            generation,
        ) as u8
    }

    pub fn effective_sortedness(&self, generation: u64) -> u8 {
        ramp(
            u64::from(self.sortedness_start),
            self.sortedness_step,
            u64::from(self.sortedness),
            generation,
        ) as u8
    }
}

/// Priority weights for the competitive fitness order. 0 skips a metric;
/// otherwise lower priority values compare first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FitnessConfig {
    pub sortedness_priority: u64,
    pub set_fidelity_priority: u64,
    pub efficiency_priority: u64,
}

/// The shared curriculum shape: hold at `start`, gain one per `step`
/// generations, saturate at `target`. A zero `start` or `step` disables
/// the ramp.
fn ramp(start: u64, step: u64, target: u64, generation: u64) -> u64 {
    if start == 0 || step == 0 {
        return target;
    }
    (start + generation / step).min(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_ramp_matches_schedule() {
        let select = SelectorConfig {
            sortedness: 100,
            sortedness_start: 20,
            sortedness_step: 10,
            ..SelectorConfig::default()
        };
        assert_eq!(select.effective_sortedness(0), 20);
        assert_eq!(select.effective_sortedness(9), 20);
        assert_eq!(select.effective_sortedness(10), 21);
        assert_eq!(select.effective_sortedness(1000), 100);
    }

    #[test]
    fn zero_step_disables_the_ramp() {
        let select = SelectorConfig {
            sortedness: 100,
            sortedness_start: 20,
            sortedness_step: 0,
            ..SelectorConfig::default()
        };
        assert_eq!(select.effective_sortedness(0), 100);
    }

    #[test]
    fn zero_start_disables_the_ramp() {
        let eval = EvaluatorConfig {
            input_cell_count: 8,
            input_cell_start: 0,
            input_cell_step: 50,
            ..EvaluatorConfig::default()
        };
        assert_eq!(eval.effective_input_cells(0), 8);
    }

    #[test]
    fn input_ramp_saturates_at_the_configured_size() {
        let eval = EvaluatorConfig {
            input_cell_count: 8,
            input_cell_start: 2,
            input_cell_step: 50,
            ..EvaluatorConfig::default()
        };
        assert_eq!(eval.effective_input_cells(0), 2);
        assert_eq!(eval.effective_input_cells(49), 2);
        assert_eq!(eval.effective_input_cells(50), 3);
        assert_eq!(eval.effective_input_cells(10_000), 8);
    }
}
