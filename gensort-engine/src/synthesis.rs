//! Population seeding.
//!
//! Workers on every core generate random candidate units and keep the
//! ones that pass the generation-0 threshold gate at the synthesis input
//! size, until the target count is reached, the attempt budget runs dry,
//! or the wall-clock deadline trips.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use gensort_core::{Evaluation, Population, Unit};
use gensort_store::Store;

use crate::error::{EngineError, EngineResult};
use crate::evaluator::Evaluator;
use crate::rng::RngPool;
use crate::selector::Selector;

/// How many candidate draws between deadline checks.
const DEADLINE_CHECK_INTERVAL: u64 = 256;

pub const DEFAULT_SYNTHESIS_DEADLINE: Duration = Duration::from_secs(120);

pub struct Synthesizer<'a> {
    store: &'a Store,
    population: &'a Population,
    rng: &'a RngPool,
    deadline: Duration,
}

impl<'a> Synthesizer<'a> {
    pub fn new(store: &'a Store, population: &'a Population, rng: &'a RngPool) -> Self {
        Self {
            store,
            population,
            rng,
            deadline: DEFAULT_SYNTHESIS_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Seed the population. Returns the number of units inserted, which
    /// is `unit_count` unless the budget cut acceptance short.
    pub fn synthesize(&self) -> EngineResult<u64> {
        let config = &self.population.config;
        let target = config.unit_count;
        let input_cells = config.eval.synthesis_input_cell_count as usize;

        let accepted = AtomicU64::new(0);
        let attempted = AtomicU64::new(0);
        let stop = AtomicBool::new(false);
        let started = Instant::now();
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let mut pool: Vec<(Unit, Evaluation)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        self.run_worker(
                            target,
                            input_cells,
                            &accepted,
                            &attempted,
                            &stop,
                            started,
                        )
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        });

        if pool.is_empty() {
            warn!(
                population = self.population.id,
                attempts = attempted.load(Ordering::Relaxed),
                "synthesis found no viable candidates"
            );
            return Err(EngineError::SynthesisFailed);
        }

        // Best-first by single-eval fitness, trimmed to the target. The
        // synthesis evaluations are then discarded; generation one
        // re-evaluates everyone.
        pool.sort_by(|a, b| b.1.fitness().cmp(&a.1.fitness()));
        pool.truncate(target as usize);
        let mut units: Vec<Unit> = pool.into_iter().map(|(unit, _)| unit).collect();

        self.store.insert_units(&mut units, self.population.id)?;
        info!(
            population = self.population.id,
            inserted = units.len(),
            attempts = attempted.load(Ordering::Relaxed),
            elapsed = ?started.elapsed(),
            "synthesis complete"
        );
        Ok(units.len() as u64)
    }

    fn run_worker(
        &self,
        target: u64,
        input_cells: usize,
        accepted: &AtomicU64,
        attempted: &AtomicU64,
        stop: &AtomicBool,
        started: Instant,
    ) -> Vec<(Unit, Evaluation)> {
        let config = &self.population.config;
        let selector = Selector::new(&config.select);
        let mut evaluator = Evaluator::new(&config.eval);
        let mut local = Vec::new();
        let mut iterations = 0u64;

        loop {
            if stop.load(Ordering::Relaxed) || accepted.load(Ordering::Relaxed) >= target {
                break;
            }
            if attempted.fetch_add(1, Ordering::Relaxed) >= config.synthesis_pool {
                stop.store(true, Ordering::Relaxed);
                break;
            }
            iterations += 1;
            if iterations % DEADLINE_CHECK_INTERVAL == 0 && started.elapsed() >= self.deadline {
                stop.store(true, Ordering::Relaxed);
                break;
            }

            let mut rng = self.rng.borrow();
            let mut unit = Unit::random(&config.unit, &mut *rng);
            let evaluation =
                evaluator.evaluate_at(&mut unit, input_cells, input_cells, &mut *rng);
            if selector.select(&evaluation, 0).is_none() {
                accepted.fetch_add(1, Ordering::Relaxed);
                local.push((unit, evaluation));
            }
        }
        local
    }
}
