//! Cross-shard aggregation: progress metrics and the best-unit query.

use rusqlite::{params, OptionalExtension};

use gensort_core::{Alive, Evaluation, Unit};

use crate::error::StoreResult;
use crate::store::Store;

/// Aggregate fitness picture of a population, merged across shards from
/// the latest evaluation of each alive unit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PopulationMetrics {
    pub alive_count: u64,
    pub best_sortedness: u8,
    pub best_set_fidelity: u8,
    pub avg_sortedness: f64,
    pub avg_set_fidelity: f64,
}

/// The current champion with its latest evaluation and decompressed
/// program.
#[derive(Debug, Clone)]
pub struct BestUnit {
    pub unit: Unit,
    pub evaluation: Evaluation,
    pub program: String,
}

#[derive(Debug, Clone, Copy, Default)]
struct ShardAggregate {
    count: u64,
    sum_sortedness: u64,
    sum_set_fidelity: u64,
    max_sortedness: u8,
    max_set_fidelity: u8,
}

impl Store {
    /// Merge per-shard aggregates over the latest-evaluation join.
    pub fn metrics(&self, population_id: u64) -> StoreResult<PopulationMetrics> {
        let per_shard = self.for_each_shard(|shard| {
            let conn = self.lock_shard(shard);
            let aggregate = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(e.sortedness), 0),
                        COALESCE(SUM(e.set_fidelity), 0),
                        COALESCE(MAX(e.sortedness), 0),
                        COALESCE(MAX(e.set_fidelity), 0)
                 FROM evaluations e
                 JOIN (
                     SELECT MAX(evaluations.id) AS id
                     FROM evaluations
                     JOIN units ON units.id = evaluations.unit_id
                     WHERE units.population_id = ?1 AND units.alive = ?2
                     GROUP BY evaluations.unit_id
                 ) latest ON e.id = latest.id",
                params![population_id as i64, Alive::Alive.as_i64()],
                |row| {
                    Ok(ShardAggregate {
                        count: row.get::<_, i64>(0)? as u64,
                        sum_sortedness: row.get::<_, i64>(1)? as u64,
                        sum_set_fidelity: row.get::<_, i64>(2)? as u64,
                        max_sortedness: row.get::<_, i64>(3)? as u8,
                        max_set_fidelity: row.get::<_, i64>(4)? as u8,
                    })
                },
            )?;
            Ok(aggregate)
        })?;

        let mut metrics = PopulationMetrics::default();
        let mut sum_sortedness = 0u64;
        let mut sum_set_fidelity = 0u64;
        for aggregate in per_shard {
            metrics.alive_count += aggregate.count;
            sum_sortedness += aggregate.sum_sortedness;
            sum_set_fidelity += aggregate.sum_set_fidelity;
            metrics.best_sortedness = metrics.best_sortedness.max(aggregate.max_sortedness);
            metrics.best_set_fidelity = metrics.best_set_fidelity.max(aggregate.max_set_fidelity);
        }
        if metrics.alive_count > 0 {
            metrics.avg_sortedness = sum_sortedness as f64 / metrics.alive_count as f64;
            metrics.avg_set_fidelity = sum_set_fidelity as f64 / metrics.alive_count as f64;
        }
        Ok(metrics)
    }

    /// Best alive unit by `sortedness + set_fidelity` across all shards,
    /// with instructions loaded and decompressed. None when extinct.
    pub fn best_unit(&self, population_id: u64) -> StoreResult<Option<BestUnit>> {
        let per_shard = self.for_each_shard(|shard| {
            let conn = self.lock_shard(shard);
            let best = conn
                .query_row(
                    "SELECT e.id, e.unit_id, e.machine_run, e.set_fidelity, e.sortedness,
                            e.instruction_count, e.instructions_executed, e.machine_error
                     FROM evaluations e
                     JOIN (
                         SELECT MAX(evaluations.id) AS id
                         FROM evaluations
                         JOIN units ON units.id = evaluations.unit_id
                         WHERE units.population_id = ?1 AND units.alive = ?2
                         GROUP BY evaluations.unit_id
                     ) latest ON e.id = latest.id
                     ORDER BY (e.sortedness + e.set_fidelity) DESC
                     LIMIT 1",
                    params![population_id as i64, Alive::Alive.as_i64()],
                    |row| {
                        Ok(Evaluation {
                            id: row.get::<_, i64>(0)? as u64,
                            unit_id: row.get::<_, i64>(1)? as u64,
                            machine_run: row.get::<_, i64>(2)? != 0,
                            set_fidelity: row.get::<_, i64>(3)? as u8,
                            sortedness: row.get::<_, i64>(4)? as u8,
                            instruction_count: row.get::<_, i64>(5)? as u64,
                            instructions_executed: row.get::<_, i64>(6)? as u64,
                            machine_error: row.get::<_, Option<String>>(7)?,
                        })
                    },
                )
                .optional()?;
            Ok(best)
        })?;

        let best = per_shard
            .into_iter()
            .flatten()
            .max_by_key(|evaluation| evaluation.fitness());
        let Some(evaluation) = best else {
            return Ok(None);
        };

        let shard = self.shard_for(evaluation.unit_id);
        let mut units = self.load_units_by_ids(shard, &[evaluation.unit_id])?;
        let Some(mut unit) = units.pop() else {
            return Ok(None);
        };
        unit.warm_instruction_cache();
        let program = String::from_utf8_lossy(&unit.program()).into_owned();

        Ok(Some(BestUnit {
            unit,
            evaluation,
            program,
        }))
    }
}
