//! Units: the individuals of the genetic algorithm.

use rand::Rng;

use crate::config::UnitConfig;
use crate::evaluation::Evaluation;
use crate::instruction::Instruction;
use crate::mutation::Mutation;
use crate::tombstone::{FailReason, Tombstone};

/// Liveness flag, persisted as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum Alive {
    Alive = 1,
    Dead = 2,
}

impl Alive {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => Alive::Alive,
            2 => Alive::Dead,
            unknown => panic!("unknown alive value [{unknown}] in store"),
        }
    }
}

/// One candidate program.
///
/// The parent link is an id only; resolving it is an explicit store
/// query. Batch processing never holds unit object graphs.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub id: u64,
    pub population_id: u64,
    pub parent_id: Option<u64>,
    /// Generations survived.
    pub age: u64,
    /// 0 for synthesis seeds; parent's generation + 1 for offspring.
    pub generation: u64,
    pub lifespan: u64,
    pub mutation_chance: f32,
    pub alive: Alive,
    pub instructions: Vec<Instruction>,
    pub evaluations: Vec<Evaluation>,
    pub tombstone: Option<Tombstone>,
}

impl Unit {
    /// A fresh random genome per the unit config.
    pub fn random<R: Rng + ?Sized>(config: &UnitConfig, rng: &mut R) -> Self {
        let instructions = (0..config.instruction_count)
            .map(|_| Instruction::random(config.instruction.op_set_count, rng))
            .collect();
        Self {
            id: 0,
            population_id: 0,
            parent_id: None,
            age: 0,
            generation: 0,
            lifespan: config.lifespan,
            mutation_chance: config.mutation_chance,
            alive: Alive::Alive,
            instructions,
            evaluations: Vec::new(),
            tombstone: None,
        }
    }

    /// Concatenated working forms of all instructions, in order.
    pub fn program(&mut self) -> Vec<u8> {
        let mut program = Vec::new();
        for instruction in &mut self.instructions {
            program.extend_from_slice(instruction.ops());
        }
        program
    }

    /// Decompress every instruction now, so later access is read-only.
    pub fn warm_instruction_cache(&mut self) {
        for instruction in &mut self.instructions {
            instruction.ensure_raw();
        }
    }

    /// Repack any instruction a mutation left stale.
    pub fn ensure_packed(&mut self) {
        for instruction in &mut self.instructions {
            instruction.ensure_packed();
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive == Alive::Alive
    }

    pub fn increment_age(&mut self) {
        self.age += 1;
    }

    pub fn within_lifespan(&self) -> bool {
        self.age < self.lifespan
    }

    /// Alive→Dead transition with its tombstone.
    pub fn die(&mut self, reason: FailReason) {
        debug_assert!(self.is_alive(), "unit [{}] died twice", self.id);
        self.alive = Alive::Dead;
        self.tombstone = Some(Tombstone::new(self.id, reason));
    }

    pub fn latest_evaluation(&self) -> Option<&Evaluation> {
        self.evaluations.last()
    }

    /// Asexual reproduction: clone, link to the parent, roll one
    /// mutation chance per instruction. Ids are assigned at persistence.
    pub fn mitosis<R: Rng + ?Sized>(&self, rng: &mut R) -> Unit {
        let mut instructions = Vec::with_capacity(self.instructions.len());
        for instruction in &self.instructions {
            let mut child_instruction = instruction.clone_for_child();
            let chance: f32 = rng.gen();
            if chance < self.mutation_chance {
                Mutation::random(chance, rng).apply(&mut child_instruction, rng);
            }
            instructions.push(child_instruction);
        }

        Unit {
            id: 0,
            population_id: self.population_id,
            parent_id: Some(self.id),
            age: 0,
            generation: self.generation + 1,
            lifespan: self.lifespan,
            mutation_chance: self.mutation_chance,
            alive: Alive::Alive,
            instructions,
            evaluations: Vec::new(),
            tombstone: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstructionConfig, UnitConfig};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn unit_config() -> UnitConfig {
        UnitConfig {
            mutation_chance: 0.25,
            instruction_count: 10,
            lifespan: 20,
            instruction: InstructionConfig { op_set_count: 5 },
        }
    }

    #[test]
    fn random_unit_has_the_configured_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut unit = Unit::random(&unit_config(), &mut rng);
        assert_eq!(unit.instructions.len(), 10);
        assert_eq!(unit.mutation_chance, 0.25);
        assert_eq!(unit.generation, 0);
        assert!(unit.is_alive());
        assert!(!unit.program().is_empty());
    }

    #[test]
    fn mitosis_links_generations() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut parent = Unit::random(&unit_config(), &mut rng);
        parent.id = 17;
        parent.generation = 3;

        let child = parent.mitosis(&mut rng);
        assert_eq!(child.parent_id, Some(17));
        assert_eq!(child.generation, 4);
        assert_eq!(child.age, 0);
        assert!(child.evaluations.is_empty());
        assert!(child.tombstone.is_none());
        assert!(child.is_alive());
    }

    #[test]
    fn mitosis_without_mutation_copies_ops_exactly() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut parent = Unit::random(&unit_config(), &mut rng);
        parent.mutation_chance = 0.0;

        let mut child = parent.mitosis(&mut rng);
        assert_eq!(child.program(), parent.program());
        for instruction in &child.instructions {
            assert!(instruction.mutations.is_empty());
        }
    }

    #[test]
    fn mitosis_ages_the_cloned_instructions() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let parent = Unit::random(&unit_config(), &mut rng);
        let child = parent.mitosis(&mut rng);
        for (parent_ins, child_ins) in parent.instructions.iter().zip(&child.instructions) {
            assert_eq!(child_ins.age, parent_ins.age + 1);
        }
    }

    #[test]
    fn death_plants_a_tombstone() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut unit = Unit::random(&unit_config(), &mut rng);
        unit.id = 9;
        unit.die(FailReason::Sortedness);
        assert!(!unit.is_alive());
        let tombstone = unit.tombstone.as_ref().unwrap();
        assert_eq!(tombstone.unit_id, 9);
        assert_eq!(tombstone.reason, FailReason::Sortedness);
    }

    #[test]
    fn lifespan_bounds_age() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut unit = Unit::random(&unit_config(), &mut rng);
        unit.lifespan = 2;
        assert!(unit.within_lifespan());
        unit.increment_age();
        unit.increment_age();
        assert!(!unit.within_lifespan());
    }
}
