//! Dead-data pruning: the per-generation sweep that keeps shard files
//! bounded, and the offline ancestry-keeping prune.

use std::collections::HashSet;

use rusqlite::{params, params_from_iter, Transaction};
use tracing::info;

use gensort_core::Alive;

use crate::error::StoreResult;
use crate::store::{placeholders, Store, IDS_PER_QUERY};

/// Rows removed by the per-generation dead-data sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrunedDeadData {
    pub evaluations: u64,
    pub instructions: u64,
    pub mutations: u64,
    pub tombstones: u64,
}

/// The offline prune summary the CLI prints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub total_units: u64,
    pub alive_units: u64,
    pub ancestor_units: u64,
    pub deleted_units: u64,
    pub deleted_instructions: u64,
    pub deleted_mutations: u64,
    pub deleted_evaluations: u64,
    pub deleted_tombstones: u64,
}

impl Store {
    /// Phase 2.5: delete evaluations, instructions, mutations, and
    /// tombstones of every DEAD unit of the population. Unit rows stay
    /// so parent chains survive for lineage queries. Idempotent.
    pub fn prune_dead_unit_data(&self, population_id: u64) -> StoreResult<PrunedDeadData> {
        let per_shard = self.for_each_shard(|shard| {
            self.with_tx(shard, |tx| {
                let mutations = tx.execute(
                    "DELETE FROM mutations WHERE instruction_id IN (
                         SELECT id FROM instructions WHERE unit_id IN (
                             SELECT id FROM units WHERE population_id = ?1 AND alive = ?2))",
                    params![population_id as i64, Alive::Dead.as_i64()],
                )?;
                let instructions = tx.execute(
                    "DELETE FROM instructions WHERE unit_id IN (
                         SELECT id FROM units WHERE population_id = ?1 AND alive = ?2)",
                    params![population_id as i64, Alive::Dead.as_i64()],
                )?;
                let evaluations = tx.execute(
                    "DELETE FROM evaluations WHERE unit_id IN (
                         SELECT id FROM units WHERE population_id = ?1 AND alive = ?2)",
                    params![population_id as i64, Alive::Dead.as_i64()],
                )?;
                let tombstones = tx.execute(
                    "DELETE FROM tombstones WHERE unit_id IN (
                         SELECT id FROM units WHERE population_id = ?1 AND alive = ?2)",
                    params![population_id as i64, Alive::Dead.as_i64()],
                )?;
                Ok(PrunedDeadData {
                    evaluations: evaluations as u64,
                    instructions: instructions as u64,
                    mutations: mutations as u64,
                    tombstones: tombstones as u64,
                })
            })
        })?;

        let mut total = PrunedDeadData::default();
        for counts in per_shard {
            total.evaluations += counts.evaluations;
            total.instructions += counts.instructions;
            total.mutations += counts.mutations;
            total.tombstones += counts.tombstones;
        }
        Ok(total)
    }

    /// Offline prune: keep alive units and every ancestor on a parent
    /// chain from an alive unit; delete everything else, then reclaim
    /// file space.
    pub fn prune(&self, population_id: u64, dry_run: bool) -> StoreResult<PruneReport> {
        let mut report = PruneReport::default();

        let totals = self.for_each_shard(|shard| {
            let conn = self.lock_shard(shard);
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM units WHERE population_id = ?1",
                params![population_id as i64],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })?;
        report.total_units = totals.into_iter().sum();

        // Step 1: the keep set starts as every alive unit.
        let mut keep: HashSet<u64> = self.alive_unit_ids(population_id)?.into_iter().collect();
        report.alive_units = keep.len() as u64;

        // Step 2: trace ancestry until no new parents turn up.
        let mut frontier: Vec<u64> = keep.iter().copied().collect();
        while !frontier.is_empty() {
            let parents = self.lookup_parents(&frontier)?;
            frontier = parents
                .into_iter()
                .filter(|parent| keep.insert(*parent))
                .collect();
        }
        report.ancestor_units = keep.len() as u64 - report.alive_units;

        // Step 3: per shard, delete everything outside the keep set.
        let per_shard = self.for_each_shard(|shard| {
            let keep_for_shard: Vec<u64> = keep
                .iter()
                .copied()
                .filter(|&id| self.shard_for(id) == shard)
                .collect();
            let counts = self.with_tx(shard, |tx| {
                prune_shard(tx, population_id, &keep_for_shard, dry_run)
            })?;
            if !dry_run {
                let conn = self.lock_shard(shard);
                conn.execute_batch("VACUUM")?;
            }
            Ok(counts)
        })?;

        for counts in per_shard {
            report.deleted_units += counts[0];
            report.deleted_instructions += counts[1];
            report.deleted_mutations += counts[2];
            report.deleted_evaluations += counts[3];
            report.deleted_tombstones += counts[4];
        }

        info!(
            population = population_id,
            dry_run,
            deleted_units = report.deleted_units,
            "prune finished"
        );
        Ok(report)
    }

    /// parent_id of every unit in `ids` that has one, across shards.
    fn lookup_parents(&self, ids: &[u64]) -> StoreResult<Vec<u64>> {
        let mut buckets: Vec<Vec<u64>> = vec![Vec::new(); self.shard_count()];
        for &id in ids {
            buckets[self.shard_for(id)].push(id);
        }

        let per_shard = self.for_each_shard(|shard| {
            let bucket = &buckets[shard];
            if bucket.is_empty() {
                return Ok(Vec::new());
            }
            let conn = self.lock_shard(shard);
            let mut parents = Vec::new();
            for chunk in bucket.chunks(IDS_PER_QUERY) {
                let sql = format!(
                    "SELECT parent_id FROM units WHERE id IN ({}) AND parent_id IS NOT NULL",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let found = stmt
                    .query_map(params_from_iter(chunk.iter().map(|&id| id as i64)), |row| {
                        row.get::<_, i64>(0).map(|id| id as u64)
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                parents.extend(found);
            }
            Ok(parents)
        })?;
        Ok(per_shard.into_iter().flatten().collect())
    }
}

/// Delete (or count, on a dry run) the non-kept rows of one shard:
/// mutations, instructions, evaluations, tombstones, then units.
fn prune_shard(
    tx: &Transaction,
    population_id: u64,
    keep_ids: &[u64],
    dry_run: bool,
) -> StoreResult<[u64; 5]> {
    tx.execute_batch("CREATE TEMP TABLE keep_ids (id INTEGER PRIMARY KEY)")?;
    for chunk in keep_ids.chunks(IDS_PER_QUERY) {
        if chunk.is_empty() {
            continue;
        }
        let mut sql = String::from("INSERT INTO keep_ids (id) VALUES ");
        for (i, _) in chunk.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str("(?)");
        }
        tx.execute(&sql, params_from_iter(chunk.iter().map(|&id| id as i64)))?;
    }

    let doomed_units =
        "SELECT id FROM units WHERE population_id = ?1 AND id NOT IN (SELECT id FROM keep_ids)";
    let run = |body: String| -> StoreResult<u64> {
        if dry_run {
            Ok(tx.query_row(
                &format!("SELECT COUNT(*) {body}"),
                params![population_id as i64],
                |row| row.get::<_, i64>(0),
            )? as u64)
        } else {
            Ok(tx.execute(&format!("DELETE {body}"), params![population_id as i64])? as u64)
        }
    };

    // Children before parents.
    let mutations = run(format!(
        "FROM mutations WHERE instruction_id IN (
             SELECT id FROM instructions WHERE unit_id IN ({doomed_units}))"
    ))?;
    let instructions = run(format!("FROM instructions WHERE unit_id IN ({doomed_units})"))?;
    let evaluations = run(format!("FROM evaluations WHERE unit_id IN ({doomed_units})"))?;
    let tombstones = run(format!("FROM tombstones WHERE unit_id IN ({doomed_units})"))?;
    let units = run(format!(
        "FROM units WHERE population_id = ?1 AND id NOT IN (SELECT id FROM keep_ids)"
    ))?;

    tx.execute_batch("DROP TABLE keep_ids")?;
    Ok([units, instructions, mutations, evaluations, tombstones])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use gensort_core::{
        Evaluation, FailReason, InstructionConfig, PopulationConfig, Unit, UnitConfig,
    };
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tempfile::TempDir;

    fn open_store(shards: u64) -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            path: dir.path().to_path_buf(),
            name: "test.db".to_string(),
            shard_count: shards,
            ..StoreConfig::default()
        };
        let store = Store::open(&config).unwrap();
        (dir, store)
    }

    fn make_units(store: &Store, population_id: u64, count: usize) -> Vec<Unit> {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let config = UnitConfig {
            mutation_chance: 0.25,
            instruction_count: 2,
            lifespan: 10,
            instruction: InstructionConfig { op_set_count: 1 },
        };
        let mut units: Vec<Unit> = (0..count).map(|_| Unit::random(&config, &mut rng)).collect();
        store.insert_units(&mut units, population_id).unwrap();
        units
    }

    fn row_count(store: &Store, table: &str) -> u64 {
        let mut total = 0u64;
        for shard in 0..store.shard_count() {
            let conn = store.lock_shard(shard);
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap();
            total += count as u64;
        }
        total
    }

    #[test]
    fn dead_data_prune_removes_only_dead_rows() {
        let (_dir, store) = open_store(2);
        let population = store.create_population(&PopulationConfig::default()).unwrap();
        let mut units = make_units(&store, population.id, 6);

        for unit in units.iter_mut() {
            unit.evaluations.push(Evaluation {
                unit_id: unit.id,
                machine_run: true,
                ..Evaluation::default()
            });
        }
        for unit in units.iter_mut().take(2) {
            unit.die(FailReason::Sortedness);
        }
        store.persist_evaluated(&mut units).unwrap();

        let pruned = store.prune_dead_unit_data(population.id).unwrap();
        assert_eq!(pruned.evaluations, 2);
        assert_eq!(pruned.instructions, 4);
        assert_eq!(pruned.tombstones, 2);

        // Survivor data stays.
        assert_eq!(row_count(&store, "evaluations"), 4);
        assert_eq!(row_count(&store, "instructions"), 8);
        // Dead unit rows themselves are retained.
        assert_eq!(row_count(&store, "units"), 6);
    }

    #[test]
    fn dead_data_prune_is_idempotent() {
        let (_dir, store) = open_store(2);
        let population = store.create_population(&PopulationConfig::default()).unwrap();
        let mut units = make_units(&store, population.id, 4);
        for unit in units.iter_mut().take(3) {
            unit.die(FailReason::SetFidelity);
        }
        store.persist_evaluated(&mut units).unwrap();

        let first = store.prune_dead_unit_data(population.id).unwrap();
        assert!(first.instructions > 0);

        let second = store.prune_dead_unit_data(population.id).unwrap();
        assert_eq!(second, PrunedDeadData::default());
    }

    #[test]
    fn offline_prune_keeps_alive_units_and_their_ancestors() {
        let (_dir, store) = open_store(2);
        let population = store.create_population(&PopulationConfig::default()).unwrap();

        // grandparent -> parent -> child, plus two unrelated dead units.
        let units = make_units(&store, population.id, 3);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut parent = units[0].mitosis(&mut rng);
        store.insert_units(std::slice::from_mut(&mut parent), population.id).unwrap();
        let mut child = parent.mitosis(&mut rng);
        store.insert_units(std::slice::from_mut(&mut child), population.id).unwrap();

        // Kill everything except the child; the chain above it must be
        // kept as ancestry, the two unrelated units must go.
        let kill: Vec<u64> = units
            .iter()
            .map(|unit| unit.id)
            .chain(std::iter::once(parent.id))
            .collect();
        store.mark_dead(&kill, FailReason::Competition).unwrap();

        let report = store.prune(population.id, false).unwrap();
        assert_eq!(report.total_units, 5);
        assert_eq!(report.alive_units, 1);
        assert_eq!(report.ancestor_units, 2);
        assert_eq!(report.deleted_units, 2);

        assert_eq!(row_count(&store, "units"), 3);
        // Kept ancestors keep their child rows; only the two unrelated
        // units lost theirs.
        assert_eq!(row_count(&store, "instructions"), 6);
        assert_eq!(row_count(&store, "tombstones"), 2);
    }

    #[test]
    fn dry_run_counts_without_deleting() {
        let (_dir, store) = open_store(1);
        let population = store.create_population(&PopulationConfig::default()).unwrap();
        let units = make_units(&store, population.id, 4);
        let kill: Vec<u64> = units.iter().take(3).map(|unit| unit.id).collect();
        store.mark_dead(&kill, FailReason::Competition).unwrap();

        let report = store.prune(population.id, true).unwrap();
        assert_eq!(report.deleted_units, 3);
        assert_eq!(report.deleted_tombstones, 3);
        assert_eq!(row_count(&store, "units"), 4);
        assert_eq!(row_count(&store, "tombstones"), 3);
    }
}
