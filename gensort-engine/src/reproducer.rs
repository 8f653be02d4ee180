//! Phase 3: fitness-proportional reproduction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use tracing::info;

use gensort_core::Unit;
use gensort_store::Store;

use crate::error::EngineResult;
use crate::fitness::FitnessRanker;
use crate::rng::RngPool;

/// Streams alive survivors and produces offspring in proportion to rank:
/// the best unit gets `max_offspring` children, the worst gets one.
pub struct Reproducer<'a> {
    store: &'a Store,
    population_id: u64,
    max_offspring: u64,
    batch_size: usize,
    ranker: &'a FitnessRanker,
    rng: &'a RngPool,
}

impl<'a> Reproducer<'a> {
    pub fn new(
        store: &'a Store,
        population_id: u64,
        max_offspring: u64,
        batch_size: usize,
        ranker: &'a FitnessRanker,
        rng: &'a RngPool,
    ) -> Self {
        Self {
            store,
            population_id,
            max_offspring: max_offspring.max(1),
            batch_size,
            ranker,
            rng,
        }
    }

    /// Returns the number of offspring produced.
    pub fn reproduce(&self) -> EngineResult<u64> {
        // Rank survivors once, globally, from their latest evaluations.
        let mut evaluations = self.store.latest_evaluations(self.population_id)?;
        if evaluations.is_empty() {
            return Ok(0);
        }
        evaluations.sort_by(|a, b| self.ranker.compare(a, b));

        let survivors = evaluations.len();
        let offspring_counts: HashMap<u64, u64> = evaluations
            .iter()
            .enumerate()
            .map(|(rank, evaluation)| {
                (evaluation.unit_id, offspring_for_rank(self.max_offspring, rank, survivors))
            })
            .collect();

        // The phase-3 horizon: offspring inserted below must never be
        // visited by this same pass.
        let horizon = self.store.max_unit_ids(self.population_id)?;
        let produced = AtomicU64::new(0);

        self.store
            .for_each_unit_batch(self.population_id, self.batch_size, &horizon, |batch| {
                batch
                    .par_iter_mut()
                    .for_each(|unit| unit.warm_instruction_cache());

                let mut offspring: Vec<Unit> = batch
                    .par_iter()
                    .flat_map_iter(|parent| {
                        let count = offspring_counts.get(&parent.id).copied().unwrap_or(1);
                        let mut rng = self.rng.borrow();
                        let children: Vec<Unit> =
                            (0..count).map(|_| parent.mitosis(&mut *rng)).collect();
                        children
                    })
                    .collect();

                if offspring.is_empty() {
                    return Ok(());
                }
                self.store.insert_units(&mut offspring, self.population_id)?;
                produced.fetch_add(offspring.len() as u64, Ordering::Relaxed);
                Ok(())
            })?;

        let produced = produced.load(Ordering::Relaxed);
        info!(
            population = self.population_id,
            survivors,
            offspring = produced,
            max_offspring = self.max_offspring,
            "reproduction"
        );
        Ok(produced)
    }
}

/// `max(1, ceil(max_offspring * (1 - rank/total)))`.
fn offspring_for_rank(max_offspring: u64, rank: usize, total: usize) -> u64 {
    let share = 1.0 - rank as f64 / total as f64;
    let count = (max_offspring as f64 * share).ceil() as u64;
    count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{open_store, scored_population};
    use gensort_core::FitnessConfig;

    #[test]
    fn offspring_allocation_follows_rank() {
        assert_eq!(offspring_for_rank(5, 0, 5), 5);
        assert_eq!(offspring_for_rank(5, 1, 5), 4);
        assert_eq!(offspring_for_rank(5, 2, 5), 3);
        assert_eq!(offspring_for_rank(5, 3, 5), 2);
        assert_eq!(offspring_for_rank(5, 4, 5), 1);
        // The floor is always one child.
        assert_eq!(offspring_for_rank(1, 99, 100), 1);
    }

    #[test]
    fn reproduction_scales_counts_by_rank_and_links_lineage() {
        let (_dir, store) = open_store(2);
        let (population_id, ids) = scored_population(&store, &[0, 1, 2, 3, 4]);

        let ranker = FitnessRanker::new(&FitnessConfig::default());
        let rng = RngPool::new(42);
        let reproducer = Reproducer::new(&store, population_id, 5, 2, &ranker, &rng);
        let produced = reproducer.reproduce().unwrap();
        assert_eq!(produced, 15);
        assert_eq!(store.alive_count(population_id).unwrap(), 20);

        // Count children per parent and check generation/lineage rules.
        let units = store.alive_units(population_id).unwrap();
        let mut children_of: HashMap<u64, u64> = HashMap::new();
        for unit in &units {
            if let Some(parent_id) = unit.parent_id {
                *children_of.entry(parent_id).or_default() += 1;
                assert!(parent_id < unit.id, "ids are monotonic across generations");
                let parent = units.iter().find(|candidate| candidate.id == parent_id).unwrap();
                assert_eq!(unit.generation, parent.generation + 1);
                assert_eq!(unit.age, 0);
            }
        }

        // scores 0..=4 map rank 4..=0: best parent (score 4) gets 5.
        assert_eq!(children_of[&ids[4]], 5);
        assert_eq!(children_of[&ids[3]], 4);
        assert_eq!(children_of[&ids[2]], 3);
        assert_eq!(children_of[&ids[1]], 2);
        assert_eq!(children_of[&ids[0]], 1);
    }

    #[test]
    fn empty_population_produces_nothing() {
        let (_dir, store) = open_store(1);
        let population = store
            .create_population(&gensort_core::PopulationConfig::default())
            .unwrap();
        let ranker = FitnessRanker::new(&FitnessConfig::default());
        let rng = RngPool::new(1);
        let reproducer = Reproducer::new(&store, population.id, 5, 10, &ranker, &rng);
        assert_eq!(reproducer.reproduce().unwrap(), 0);
    }
}
