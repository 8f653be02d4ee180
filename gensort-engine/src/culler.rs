//! Phase 2: the competitive cull.

use tracing::info;

use gensort_core::FailReason;
use gensort_store::Store;

use crate::error::EngineResult;
use crate::fitness::FitnessRanker;

/// Ranks alive units by fitness and kills everything beyond the carrying
/// capacity, never touching the elite band.
pub struct Culler<'a> {
    store: &'a Store,
    population_id: u64,
    carrying_capacity: u64,
    elitism: u64,
    ranker: &'a FitnessRanker,
}

impl<'a> Culler<'a> {
    pub fn new(
        store: &'a Store,
        population_id: u64,
        carrying_capacity: u64,
        elitism: u64,
        ranker: &'a FitnessRanker,
    ) -> Self {
        Self {
            store,
            population_id,
            carrying_capacity,
            elitism,
            ranker,
        }
    }

    /// Returns the number of units culled.
    pub fn cull(&self) -> EngineResult<u64> {
        let mut evaluations = self.store.latest_evaluations(self.population_id)?;
        let alive = evaluations.len() as u64;
        if alive <= self.carrying_capacity {
            return Ok(0);
        }

        evaluations.sort_by(|a, b| self.ranker.compare(a, b));

        // Everything ranked at or past the capacity dies. The elite band
        // is min(elitism, capacity), which sits strictly inside the kept
        // prefix, so it can never be reached.
        let protect = self.elitism.min(self.carrying_capacity);
        debug_assert!(protect <= self.carrying_capacity);
        let kill_ids: Vec<u64> = evaluations[self.carrying_capacity as usize..]
            .iter()
            .map(|evaluation| evaluation.unit_id)
            .collect();

        self.store.mark_dead(&kill_ids, FailReason::Competition)?;
        info!(
            population = self.population_id,
            alive,
            capacity = self.carrying_capacity,
            elites = protect,
            culled = kill_ids.len(),
            "competitive cull"
        );
        Ok(kill_ids.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{open_store, scored_population};
    use gensort_core::FitnessConfig;

    #[test]
    fn cull_kills_the_worst_and_protects_elites() {
        let (_dir, store) = open_store(2);
        let (population_id, ids) = scored_population(&store, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);

        let ranker = FitnessRanker::new(&FitnessConfig::default());
        let culler = Culler::new(&store, population_id, 3, 3, &ranker);
        assert_eq!(culler.cull().unwrap(), 7);

        // Survivors are the sortedness 9, 8, 7 units.
        let mut expected: Vec<u64> = ids[7..].to_vec();
        expected.sort_unstable();
        let mut alive = store.alive_unit_ids(population_id).unwrap();
        alive.sort_unstable();
        assert_eq!(alive, expected);

        // The culled die of competition.
        for &id in &ids[..7] {
            assert_eq!(
                store.tombstone_reason(id).unwrap(),
                Some(FailReason::Competition)
            );
        }
        assert_eq!(store.tombstone_reason(ids[9]).unwrap(), None);
    }

    #[test]
    fn under_capacity_population_is_left_alone() {
        let (_dir, store) = open_store(1);
        let (population_id, _ids) = scored_population(&store, &[1, 2, 3]);

        let ranker = FitnessRanker::new(&FitnessConfig::default());
        let culler = Culler::new(&store, population_id, 10, 2, &ranker);
        assert_eq!(culler.cull().unwrap(), 0);
        assert_eq!(store.alive_count(population_id).unwrap(), 3);
    }

    #[test]
    fn elitism_larger_than_capacity_is_clamped() {
        let (_dir, store) = open_store(1);
        let (population_id, _ids) = scored_population(&store, &[0, 1, 2, 3, 4]);

        let ranker = FitnessRanker::new(&FitnessConfig::default());
        let culler = Culler::new(&store, population_id, 2, 100, &ranker);
        assert_eq!(culler.cull().unwrap(), 3);
        assert_eq!(store.alive_count(population_id).unwrap(), 2);
    }
}
