//! The four-phase generation pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use tracing::{debug, info};

use gensort_core::{FailReason, Population};
use gensort_store::Store;

use crate::culler::Culler;
use crate::error::{EngineError, EngineResult};
use crate::evaluator::Evaluator;
use crate::fitness::FitnessRanker;
use crate::reproducer::Reproducer;
use crate::rng::RngPool;
use crate::selector::Selector;

/// What one generation did, for driver logs and the optimizer's
/// stagnation checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    pub generation: u64,
    pub evaluated: u64,
    pub died_in_selection: u64,
    pub culled: u64,
    pub offspring: u64,
    pub alive_after: u64,
}

/// Runs generations for one population. The store is the authoritative
/// state; this struct holds only the loaded population row and the
/// shared pieces every phase needs.
pub struct GenerationEngine<'a> {
    store: &'a Store,
    population: Population,
    selector: Selector,
    ranker: FitnessRanker,
    rng: RngPool,
    eval_rounds: u64,
}

impl<'a> GenerationEngine<'a> {
    pub fn new(store: &'a Store, population: Population) -> Self {
        let selector = Selector::new(&population.config.select);
        let ranker = FitnessRanker::new(&population.config.fitness);
        let rng = RngPool::new(store.config().seed);
        let eval_rounds = population.config.eval.eval_rounds.max(1);
        Self {
            store,
            population,
            selector,
            ranker,
            rng,
            eval_rounds,
        }
    }

    /// Override the configured number of evaluation rounds.
    pub fn with_eval_rounds(mut self, eval_rounds: u64) -> Self {
        self.eval_rounds = eval_rounds.max(1);
        self
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Advance the population by one generation.
    ///
    /// Phases run strictly in order: evaluate & threshold-select, cull,
    /// prune dead data, reproduce, then bump the generation counter.
    /// Work inside each phase fans out across shards and cores.
    pub fn run_generation(&mut self) -> EngineResult<GenerationSummary> {
        let population_id = self.population.id;
        let generation = self.population.current_generation;
        let config = &self.population.config;

        // Phase 1: evaluate and gate, streaming under the phase-1
        // horizon so nothing inserted later is ever visited.
        let horizon = self.store.max_unit_ids(population_id)?;
        let evaluated = AtomicU64::new(0);
        let died = AtomicU64::new(0);
        let batch_size = self.store.config().eval_batch_size.max(1);

        self.store
            .for_each_unit_batch(population_id, batch_size, &horizon, |batch| {
                batch
                    .par_iter_mut()
                    .for_each(|unit| unit.warm_instruction_cache());

                batch.par_iter_mut().for_each_init(
                    || Evaluator::new(&config.eval),
                    |evaluator, unit| {
                        let mut rng = self.rng.borrow();
                        let evaluation =
                            evaluator.evaluate(unit, generation, self.eval_rounds, &mut *rng);
                        unit.evaluations.push(evaluation);

                        let latest = unit.latest_evaluation().expect("evaluation just pushed");
                        if let Some(reason) = self.selector.select(latest, generation) {
                            unit.die(reason);
                            return;
                        }
                        unit.increment_age();
                        if !unit.within_lifespan() {
                            unit.die(FailReason::Lifespan);
                        }
                    },
                );

                let batch_dead = batch.iter().filter(|unit| !unit.is_alive()).count();
                self.store.persist_evaluated(batch)?;
                evaluated.fetch_add(batch.len() as u64, Ordering::Relaxed);
                died.fetch_add(batch_dead as u64, Ordering::Relaxed);
                Ok(())
            })?;

        let evaluated = evaluated.load(Ordering::Relaxed);
        let died_in_selection = died.load(Ordering::Relaxed);
        debug!(
            population = population_id,
            generation, evaluated, died_in_selection, "phase 1 complete"
        );

        // Phase 2: competitive cull.
        let culler = Culler::new(
            self.store,
            population_id,
            config.carrying_capacity,
            config.elitism,
            &self.ranker,
        );
        let culled = culler.cull()?;

        let survivors = self.store.alive_count(population_id)?;
        if survivors == 0 {
            return Err(EngineError::Extinct {
                population: population_id,
                generation,
            });
        }

        // Phase 2.5: drop dead units' data so shard files stay bounded.
        let pruned = self.store.prune_dead_unit_data(population_id)?;
        debug!(
            population = population_id,
            generation,
            evaluations = pruned.evaluations,
            instructions = pruned.instructions,
            "dead data pruned"
        );

        // Phase 3: reproduce survivors, best-ranked first in allocation.
        let reproducer = Reproducer::new(
            self.store,
            population_id,
            config.max_offspring,
            self.store.config().batch_size.max(1),
            &self.ranker,
            &self.rng,
        );
        let offspring = reproducer.reproduce()?;

        // Phase 4: bookkeeping.
        self.store.increment_generation(population_id)?;
        self.population.current_generation += 1;

        let summary = GenerationSummary {
            generation,
            evaluated,
            died_in_selection,
            culled,
            offspring,
            alive_after: survivors + offspring,
        };
        info!(
            population = population_id,
            generation = summary.generation,
            evaluated = summary.evaluated,
            died = summary.died_in_selection,
            culled = summary.culled,
            offspring = summary.offspring,
            alive = summary.alive_after,
            "generation complete"
        );
        Ok(summary)
    }
}
