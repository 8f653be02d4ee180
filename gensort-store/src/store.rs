//! The store proper: shard connections, population CRUD, unit IO, bulk
//! inserts, and cursor streaming.

use std::collections::HashMap;

use parking_lot::{Mutex, MutexGuard};
use rayon::prelude::*;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use gensort_core::{
    Alive, Evaluation, EvaluatorConfig, FailReason, FitnessConfig, Instruction, InstructionConfig,
    MachineSettings, Mutation, Population, PopulationConfig, SelectorConfig, Tombstone, Unit,
    UnitConfig,
};

use crate::config::StoreConfig;
use crate::error::{first_error, StoreError, StoreResult};
use crate::ids::{IdGenerator, IdGenerators};
use crate::schema;

/// Multi-row insert chunk sizes, sized to stay under SQLite's
/// 999-variable statement limit.
pub(crate) const UNIT_ROWS_PER_INSERT: usize = 60;
pub(crate) const INSTRUCTION_ROWS_PER_INSERT: usize = 100;
pub(crate) const MUTATION_ROWS_PER_INSERT: usize = 100;
/// IN-clause chunk size for id-list queries.
pub(crate) const IDS_PER_QUERY: usize = 900;

pub struct Store {
    config: StoreConfig,
    shards: Vec<Mutex<Connection>>,
    pub ids: IdGenerators,
}

impl Store {
    /// Open (creating as needed) every shard, apply pragmas, create the
    /// schema, and seed the id generators from the max ids on disk.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let shard_count = config.shard_count();
        std::fs::create_dir_all(&config.path)?;

        let mut shards = Vec::with_capacity(shard_count);
        for shard in 0..shard_count {
            let path = config.shard_path(shard);
            debug!(shard, path = %path.display(), "opening shard");
            let conn = Connection::open(&path)?;
            for pragma in config.pragmas.iter().chain(config.options.iter()) {
                apply_pragma(&conn, pragma)?;
            }
            conn.execute_batch(schema::SCHEMA)?;
            shards.push(Mutex::new(conn));
        }

        let ids = init_id_generators(&shards)?;
        info!(shards = shard_count, "store open");
        Ok(Self {
            config: config.clone(),
            shards,
            ids,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub(crate) fn shard_for(&self, unit_id: u64) -> usize {
        (unit_id % self.shards.len() as u64) as usize
    }

    pub(crate) fn lock_shard(&self, shard: usize) -> MutexGuard<'_, Connection> {
        self.shards[shard].lock()
    }

    /// Run `f` inside a transaction on one shard. Dropping the
    /// transaction on error rolls it back.
    pub(crate) fn with_tx<T>(
        &self,
        shard: usize,
        f: impl FnOnce(&Transaction) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.lock_shard(shard);
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f(shard)` for every shard in parallel and collect results in
    /// shard order; the first error wins.
    pub(crate) fn for_each_shard<T, F>(&self, f: F) -> StoreResult<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> StoreResult<T> + Sync,
    {
        (0..self.shards.len())
            .into_par_iter()
            .map(&f)
            .collect::<StoreResult<Vec<T>>>()
    }

    // ------------------------------------------------------------------
    // Populations (shard 0 only)
    // ------------------------------------------------------------------

    /// Persist a new population with the next population id.
    pub fn create_population(&self, config: &PopulationConfig) -> StoreResult<Population> {
        let mut population = Population::new(config.clone());
        population.id = self.ids.populations.next();

        let c = &population.config;
        let conn = self.lock_shard(0);
        conn.execute(
            "INSERT INTO populations (
                id, current_generation,
                unit_count, synthesis_pool, carrying_capacity, elitism, max_offspring,
                unit_mutation_chance, unit_instruction_count, unit_ins_op_set_count, unit_lifespan,
                eval_machine_max_instruction_execution_count, eval_machine_memory_cell_count,
                eval_input_cell_count, eval_output_cell_count, eval_synthesis_input_cell_count,
                eval_input_cell_start, eval_input_cell_step, eval_eval_rounds,
                sel_machine_run, sel_set_fidelity, sel_sortedness,
                sel_set_fidelity_start, sel_set_fidelity_step, sel_sortedness_start, sel_sortedness_step,
                sel_instruction_count, sel_instructions_executed,
                fit_sortedness_priority, fit_set_fidelity_priority, fit_efficiency_priority
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31)",
            params![
                population.id as i64,
                population.current_generation as i64,
                c.unit_count as i64,
                c.synthesis_pool as i64,
                c.carrying_capacity as i64,
                c.elitism as i64,
                c.max_offspring as i64,
                f64::from(c.unit.mutation_chance),
                c.unit.instruction_count as i64,
                c.unit.instruction.op_set_count as i64,
                c.unit.lifespan as i64,
                c.eval.machine.max_instruction_execution_count as i64,
                c.eval.machine.memory_cell_count as i64,
                c.eval.input_cell_count as i64,
                c.eval.output_cell_count as i64,
                c.eval.synthesis_input_cell_count as i64,
                c.eval.input_cell_start as i64,
                c.eval.input_cell_step as i64,
                c.eval.eval_rounds as i64,
                i64::from(c.select.machine_run),
                i64::from(c.select.set_fidelity),
                i64::from(c.select.sortedness),
                i64::from(c.select.set_fidelity_start),
                c.select.set_fidelity_step as i64,
                i64::from(c.select.sortedness_start),
                c.select.sortedness_step as i64,
                c.select.instruction_count as i64,
                c.select.instructions_executed as i64,
                c.fitness.sortedness_priority as i64,
                c.fitness.set_fidelity_priority as i64,
                c.fitness.efficiency_priority as i64,
            ],
        )?;

        info!(population = population.id, "population created");
        Ok(population)
    }

    /// Load a population row and rebuild its nested config. Units are
    /// not loaded.
    pub fn load_population(&self, id: u64) -> StoreResult<Population> {
        let conn = self.lock_shard(0);
        let population = conn
            .query_row(
                "SELECT id, current_generation,
                    unit_count, synthesis_pool, carrying_capacity, elitism, max_offspring,
                    unit_mutation_chance, unit_instruction_count, unit_ins_op_set_count, unit_lifespan,
                    eval_machine_max_instruction_execution_count, eval_machine_memory_cell_count,
                    eval_input_cell_count, eval_output_cell_count, eval_synthesis_input_cell_count,
                    eval_input_cell_start, eval_input_cell_step, eval_eval_rounds,
                    sel_machine_run, sel_set_fidelity, sel_sortedness,
                    sel_set_fidelity_start, sel_set_fidelity_step, sel_sortedness_start, sel_sortedness_step,
                    sel_instruction_count, sel_instructions_executed,
                    fit_sortedness_priority, fit_set_fidelity_priority, fit_efficiency_priority
                 FROM populations WHERE id = ?1",
                params![id as i64],
                row_to_population,
            )
            .optional()?;
        population.ok_or(StoreError::PopulationNotFound(id))
    }

    /// Phase-4 bookkeeping: bump the generation counter on shard 0.
    pub fn increment_generation(&self, population_id: u64) -> StoreResult<()> {
        let conn = self.lock_shard(0);
        conn.execute(
            "UPDATE populations SET current_generation = current_generation + 1 WHERE id = ?1",
            params![population_id as i64],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Id assignment
    // ------------------------------------------------------------------

    /// Give every unassigned entity in the unit tree a permanent id and
    /// wire up the foreign keys.
    pub fn assign_ids(&self, unit: &mut Unit) {
        if unit.id == 0 {
            unit.id = self.ids.units.next();
        }
        for instruction in &mut unit.instructions {
            if instruction.id == 0 {
                instruction.id = self.ids.instructions.next();
            }
            instruction.unit_id = unit.id;
            for mutation in &mut instruction.mutations {
                if mutation.id == 0 {
                    mutation.id = self.ids.mutations.next();
                }
                mutation.instruction_id = instruction.id;
            }
        }
    }

    // ------------------------------------------------------------------
    // Unit writes
    // ------------------------------------------------------------------

    /// Insert freshly created units (synthesis seeds or offspring) with
    /// their instructions and mutations, partitioned by shard, using
    /// multi-row statements.
    pub fn insert_units(&self, units: &mut [Unit], population_id: u64) -> StoreResult<()> {
        for unit in units.iter_mut() {
            unit.population_id = population_id;
            self.assign_ids(unit);
            unit.ensure_packed();
        }

        let groups = partition_by_shard(units, |unit| self.shard_for(unit.id));
        let errors: Vec<StoreError> = groups
            .into_par_iter()
            .filter_map(|(shard, group)| {
                self.with_tx(shard, |tx| {
                    bulk_insert_units(tx, group)?;
                    bulk_insert_instructions(tx, group)?;
                    bulk_insert_mutations(tx, group)
                })
                .err()
            })
            .collect();
        first_error(errors)
    }

    /// Phase-1 batch write: alive flips, age bumps, evaluation and
    /// tombstone inserts. Instructions and mutations are untouched.
    pub fn persist_evaluated(&self, units: &mut [Unit]) -> StoreResult<()> {
        let groups = partition_by_shard(units, |unit| self.shard_for(unit.id));
        let errors: Vec<StoreError> = groups
            .into_par_iter()
            .filter_map(|(shard, group)| {
                self.with_tx(shard, |tx| {
                    for unit in group.iter_mut() {
                        if unit.is_alive() {
                            tx.execute(
                                "UPDATE units SET age = age + 1 WHERE id = ?1",
                                params![unit.id as i64],
                            )?;
                        } else {
                            tx.execute(
                                "UPDATE units SET alive = ?1 WHERE id = ?2",
                                params![Alive::Dead.as_i64(), unit.id as i64],
                            )?;
                        }
                        for evaluation in &mut unit.evaluations {
                            if evaluation.id == 0 {
                                evaluation.id = self.ids.evaluations.next();
                                insert_evaluation(tx, evaluation)?;
                            }
                        }
                        if let Some(tombstone) = &mut unit.tombstone {
                            if tombstone.id == 0 {
                                tombstone.id = self.ids.tombstones.next();
                                insert_tombstone(tx, tombstone)?;
                            }
                        }
                    }
                    Ok(())
                })
                .err()
            })
            .collect();
        first_error(errors)
    }

    /// Kill units by id: flip alive and insert one tombstone each,
    /// partitioned by shard.
    pub fn mark_dead(&self, unit_ids: &[u64], reason: FailReason) -> StoreResult<()> {
        let mut buckets: HashMap<usize, Vec<u64>> = HashMap::new();
        for &id in unit_ids {
            buckets.entry(self.shard_for(id)).or_default().push(id);
        }

        let errors: Vec<StoreError> = buckets
            .into_par_iter()
            .filter_map(|(shard, ids)| {
                self.with_tx(shard, |tx| {
                    for id in ids {
                        tx.execute(
                            "UPDATE units SET alive = ?1 WHERE id = ?2",
                            params![Alive::Dead.as_i64(), id as i64],
                        )?;
                        let tombstone = Tombstone {
                            id: self.ids.tombstones.next(),
                            unit_id: id,
                            reason,
                        };
                        insert_tombstone(tx, &tombstone)?;
                    }
                    Ok(())
                })
                .err()
            })
            .collect();
        first_error(errors)
    }

    // ------------------------------------------------------------------
    // Unit reads
    // ------------------------------------------------------------------

    /// Per-shard max unit id for the population, dead or alive. The
    /// engine records these before streaming so a pass never visits rows
    /// it inserted itself.
    pub fn max_unit_ids(&self, population_id: u64) -> StoreResult<Vec<u64>> {
        self.for_each_shard(|shard| {
            let conn = self.lock_shard(shard);
            let max: Option<i64> = conn.query_row(
                "SELECT MAX(id) FROM units WHERE population_id = ?1",
                params![population_id as i64],
                |row| row.get(0),
            )?;
            Ok(max.unwrap_or(0) as u64)
        })
    }

    /// Ids of every alive unit of the population, across shards.
    pub fn alive_unit_ids(&self, population_id: u64) -> StoreResult<Vec<u64>> {
        let per_shard = self.for_each_shard(|shard| {
            let conn = self.lock_shard(shard);
            let mut stmt = conn
                .prepare_cached("SELECT id FROM units WHERE population_id = ?1 AND alive = ?2")?;
            let ids = stmt
                .query_map(
                    params![population_id as i64, Alive::Alive.as_i64()],
                    |row| row.get::<_, i64>(0).map(|id| id as u64),
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })?;
        Ok(per_shard.into_iter().flatten().collect())
    }

    /// Every alive unit with instructions attached, across shards.
    /// Convenience for tools and tests; the engine streams instead.
    pub fn alive_units(&self, population_id: u64) -> StoreResult<Vec<Unit>> {
        let max_ids = self.max_unit_ids(population_id)?;
        let per_shard = self.for_each_shard(|shard| {
            let mut units = Vec::new();
            let mut after_id = 0u64;
            loop {
                let batch =
                    self.load_unit_batch(shard, population_id, after_id, max_ids[shard], 1_000)?;
                if batch.is_empty() {
                    break;
                }
                after_id = batch.last().map(|unit| unit.id).unwrap_or(after_id);
                units.extend(batch);
            }
            Ok(units)
        })?;
        Ok(per_shard.into_iter().flatten().collect())
    }

    /// One unit by id, with instructions attached.
    pub fn load_unit(&self, unit_id: u64) -> StoreResult<Option<Unit>> {
        let mut units = self.load_units_by_ids(self.shard_for(unit_id), &[unit_id])?;
        Ok(units.pop())
    }

    /// The recorded death reason of a unit, if it has died.
    pub fn tombstone_reason(&self, unit_id: u64) -> StoreResult<Option<FailReason>> {
        let conn = self.lock_shard(self.shard_for(unit_id));
        let reason: Option<i64> = conn
            .query_row(
                "SELECT reason FROM tombstones WHERE unit_id = ?1",
                params![unit_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(reason.map(FailReason::from_i64))
    }

    /// Alive units across all shards.
    pub fn alive_count(&self, population_id: u64) -> StoreResult<u64> {
        let counts = self.for_each_shard(|shard| {
            let conn = self.lock_shard(shard);
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM units WHERE population_id = ?1 AND alive = ?2",
                params![population_id as i64, Alive::Alive.as_i64()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })?;
        Ok(counts.into_iter().sum())
    }

    /// Latest evaluation of every alive unit, merged across shards.
    pub fn latest_evaluations(&self, population_id: u64) -> StoreResult<Vec<Evaluation>> {
        let per_shard = self.for_each_shard(|shard| {
            let conn = self.lock_shard(shard);
            let mut stmt = conn.prepare_cached(
                "SELECT e.id, e.unit_id, e.machine_run, e.set_fidelity, e.sortedness,
                        e.instruction_count, e.instructions_executed, e.machine_error
                 FROM evaluations e
                 JOIN (
                     SELECT MAX(evaluations.id) AS id
                     FROM evaluations
                     JOIN units ON units.id = evaluations.unit_id
                     WHERE units.population_id = ?1 AND units.alive = ?2
                     GROUP BY evaluations.unit_id
                 ) latest ON e.id = latest.id",
            )?;
            let evaluations = stmt
                .query_map(
                    params![population_id as i64, Alive::Alive.as_i64()],
                    row_to_evaluation,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(evaluations)
        })?;
        Ok(per_shard.into_iter().flatten().collect())
    }

    /// One page of alive units on a shard: `id > after_id AND id <=
    /// max_id`, ascending, instructions attached.
    pub(crate) fn load_unit_batch(
        &self,
        shard: usize,
        population_id: u64,
        after_id: u64,
        max_id: u64,
        limit: usize,
    ) -> StoreResult<Vec<Unit>> {
        let conn = self.lock_shard(shard);
        let mut stmt = conn.prepare_cached(
            "SELECT id, population_id, parent_id, age, generation, lifespan, mutation_chance, alive
             FROM units
             WHERE population_id = ?1 AND alive = ?2 AND id > ?3 AND id <= ?4
             ORDER BY id LIMIT ?5",
        )?;
        let mut units = stmt
            .query_map(
                params![
                    population_id as i64,
                    Alive::Alive.as_i64(),
                    after_id as i64,
                    max_id as i64,
                    limit as i64
                ],
                row_to_unit,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        attach_instructions(&conn, &mut units)?;
        Ok(units)
    }

    /// Load specific units (with instructions) from one shard.
    pub(crate) fn load_units_by_ids(&self, shard: usize, unit_ids: &[u64]) -> StoreResult<Vec<Unit>> {
        let conn = self.lock_shard(shard);
        let mut units = Vec::with_capacity(unit_ids.len());
        for chunk in unit_ids.chunks(IDS_PER_QUERY) {
            let sql = format!(
                "SELECT id, population_id, parent_id, age, generation, lifespan, mutation_chance, alive
                 FROM units WHERE id IN ({}) ORDER BY id",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let loaded = stmt
                .query_map(
                    params_from_iter(chunk.iter().map(|&id| id as i64)),
                    row_to_unit,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            units.extend(loaded);
        }
        attach_instructions(&conn, &mut units)?;
        Ok(units)
    }

    /// Stream alive units in ascending-id batches, one pipeline per
    /// shard in parallel. While `f` chews on a batch the next one is
    /// already loading.
    pub fn for_each_unit_batch<F>(
        &self,
        population_id: u64,
        batch_size: usize,
        max_ids: &[u64],
        f: F,
    ) -> StoreResult<()>
    where
        F: Fn(&mut Vec<Unit>) -> StoreResult<()> + Sync,
    {
        assert_eq!(
            max_ids.len(),
            self.shards.len(),
            "one max id per shard required"
        );
        let errors: Mutex<Vec<StoreError>> = Mutex::new(Vec::new());
        std::thread::scope(|scope| {
            for (shard, &max_id) in max_ids.iter().enumerate() {
                let f = &f;
                let errors = &errors;
                scope.spawn(move || {
                    if let Err(error) =
                        self.stream_shard(shard, population_id, batch_size, max_id, f)
                    {
                        errors.lock().push(error);
                    }
                });
            }
        });
        first_error(errors.into_inner())
    }

    fn stream_shard<F>(
        &self,
        shard: usize,
        population_id: u64,
        batch_size: usize,
        max_id: u64,
        f: &F,
    ) -> StoreResult<()>
    where
        F: Fn(&mut Vec<Unit>) -> StoreResult<()> + Sync,
    {
        let (sender, receiver) = crossbeam_channel::bounded::<StoreResult<Vec<Unit>>>(1);
        std::thread::scope(|scope| {
            scope.spawn(move || {
                let mut after_id = 0u64;
                loop {
                    match self.load_unit_batch(shard, population_id, after_id, max_id, batch_size)
                    {
                        Ok(batch) => {
                            if batch.is_empty() {
                                break;
                            }
                            after_id = batch.last().map(|unit| unit.id).unwrap_or(after_id);
                            if sender.send(Ok(batch)).is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            let _ = sender.send(Err(error));
                            break;
                        }
                    }
                }
            });
            for message in receiver {
                let mut batch = message?;
                f(&mut batch)?;
            }
            Ok(())
        })
    }
}

// ----------------------------------------------------------------------
// Row mapping and insert helpers
// ----------------------------------------------------------------------

fn apply_pragma(conn: &Connection, pragma: &str) -> StoreResult<()> {
    // Some pragmas return a row (journal_mode), some return nothing.
    let sql = format!("PRAGMA {pragma}");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while rows.next()?.is_some() {}
    Ok(())
}

fn init_id_generators(shards: &[Mutex<Connection>]) -> StoreResult<IdGenerators> {
    let mut maxes = [0u64; schema::ID_TABLES.len()];
    for shard in shards {
        let conn = shard.lock();
        for (i, table) in schema::ID_TABLES.iter().enumerate() {
            let max: Option<i64> =
                conn.query_row(&format!("SELECT MAX(id) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
            maxes[i] = maxes[i].max(max.unwrap_or(0) as u64);
        }
    }
    Ok(IdGenerators {
        units: IdGenerator::new(maxes[0]),
        instructions: IdGenerator::new(maxes[1]),
        evaluations: IdGenerator::new(maxes[2]),
        mutations: IdGenerator::new(maxes[3]),
        tombstones: IdGenerator::new(maxes[4]),
        populations: IdGenerator::new(maxes[5]),
    })
}

fn row_to_unit(row: &rusqlite::Row<'_>) -> rusqlite::Result<Unit> {
    Ok(Unit {
        id: row.get::<_, i64>(0)? as u64,
        population_id: row.get::<_, i64>(1)? as u64,
        parent_id: row.get::<_, Option<i64>>(2)?.map(|id| id as u64),
        age: row.get::<_, i64>(3)? as u64,
        generation: row.get::<_, i64>(4)? as u64,
        lifespan: row.get::<_, i64>(5)? as u64,
        mutation_chance: row.get::<_, f64>(6)? as f32,
        alive: Alive::from_i64(row.get::<_, i64>(7)?),
        instructions: Vec::new(),
        evaluations: Vec::new(),
        tombstone: None,
    })
}

fn row_to_evaluation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Evaluation> {
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
}

fn row_to_population(row: &rusqlite::Row<'_>) -> rusqlite::Result<Population> {
    let config = PopulationConfig {
        unit_count: row.get::<_, i64>(2)? as u64,
        synthesis_pool: row.get::<_, i64>(3)? as u64,
        carrying_capacity: row.get::<_, i64>(4)? as u64,
        elitism: row.get::<_, i64>(5)? as u64,
        max_offspring: row.get::<_, i64>(6)? as u64,
        unit: UnitConfig {
            mutation_chance: row.get::<_, f64>(7)? as f32,
            instruction_count: row.get::<_, i64>(8)? as u64,
            instruction: InstructionConfig {
                op_set_count: row.get::<_, i64>(9)? as u64,
            },
            lifespan: row.get::<_, i64>(10)? as u64,
        },
        eval: EvaluatorConfig {
            machine: MachineSettings {
                max_instruction_execution_count: row.get::<_, i64>(11)? as u64,
                memory_cell_count: row.get::<_, i64>(12)? as u64,
            },
            input_cell_count: row.get::<_, i64>(13)? as u64,
            output_cell_count: row.get::<_, i64>(14)? as u64,
            synthesis_input_cell_count: row.get::<_, i64>(15)? as u64,
            input_cell_start: row.get::<_, i64>(16)? as u64,
            input_cell_step: row.get::<_, i64>(17)? as u64,
            eval_rounds: row.get::<_, i64>(18)? as u64,
        },
        select: SelectorConfig {
            machine_run: row.get::<_, i64>(19)? != 0,
            set_fidelity: row.get::<_, i64>(20)? as u8,
            sortedness: row.get::<_, i64>(21)? as u8,
            set_fidelity_start: row.get::<_, i64>(22)? as u8,
            set_fidelity_step: row.get::<_, i64>(23)? as u64,
            sortedness_start: row.get::<_, i64>(24)? as u8,
            sortedness_step: row.get::<_, i64>(25)? as u64,
            instruction_count: row.get::<_, i64>(26)? as u64,
            instructions_executed: row.get::<_, i64>(27)? as u64,
        },
        fitness: FitnessConfig {
            sortedness_priority: row.get::<_, i64>(28)? as u64,
            set_fidelity_priority: row.get::<_, i64>(29)? as u64,
            efficiency_priority: row.get::<_, i64>(30)? as u64,
        },
    };
    Ok(Population {
        id: row.get::<_, i64>(0)? as u64,
        current_generation: row.get::<_, i64>(1)? as u64,
        config,
    })
}

pub(crate) fn placeholders(count: usize) -> String {
    let mut out = String::with_capacity(count * 2);
    for i in 0..count {
        if i > 0 {
            out.push(',');
        }
        out.push('?');
    }
    out
}

/// Sort units by shard and hand back disjoint mutable groups, one per
/// occupied shard.
fn partition_by_shard<F>(units: &mut [Unit], shard_for: F) -> Vec<(usize, &mut [Unit])>
where
    F: Fn(&Unit) -> usize,
{
    units.sort_by_key(|unit| (shard_for(unit), unit.id));
    let mut groups = Vec::new();
    let mut rest = units;
    while !rest.is_empty() {
        let shard = shard_for(&rest[0]);
        let len = rest
            .iter()
            .take_while(|unit| shard_for(unit) == shard)
            .count();
        let (head, tail) = rest.split_at_mut(len);
        groups.push((shard, head));
        rest = tail;
    }
    groups
}

fn attach_instructions(conn: &Connection, units: &mut [Unit]) -> StoreResult<()> {
    if units.is_empty() {
        return Ok(());
    }
    let unit_ids: Vec<i64> = units.iter().map(|unit| unit.id as i64).collect();
    let mut by_unit: HashMap<u64, Vec<Instruction>> = HashMap::with_capacity(units.len());

    for chunk in unit_ids.chunks(IDS_PER_QUERY) {
        let sql = format!(
            "SELECT id, unit_id, age, initial_op_set, ops
             FROM instructions WHERE unit_id IN ({}) ORDER BY id",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter().copied()), |row| {
            Ok(Instruction::from_stored(
                row.get::<_, i64>(0)? as u64,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, Vec<u8>>(4)?,
            ))
        })?;
        for instruction in rows {
            let instruction = instruction?;
            by_unit
                .entry(instruction.unit_id)
                .or_default()
                .push(instruction);
        }
    }

    for unit in units {
        unit.instructions = by_unit.remove(&unit.id).unwrap_or_default();
    }
    Ok(())
}

fn insert_evaluation(tx: &Transaction, evaluation: &Evaluation) -> StoreResult<()> {
    tx.execute(
        "INSERT INTO evaluations (id, unit_id, machine_run, set_fidelity, sortedness,
            instruction_count, instructions_executed, machine_error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            evaluation.id as i64,
            evaluation.unit_id as i64,
            i64::from(evaluation.machine_run),
            i64::from(evaluation.set_fidelity),
            i64::from(evaluation.sortedness),
            evaluation.instruction_count as i64,
            evaluation.instructions_executed as i64,
            evaluation.machine_error,
        ],
    )?;
    Ok(())
}

fn insert_tombstone(tx: &Transaction, tombstone: &Tombstone) -> StoreResult<()> {
    tx.execute(
        "INSERT INTO tombstones (id, unit_id, reason) VALUES (?1, ?2, ?3)",
        params![
            tombstone.id as i64,
            tombstone.unit_id as i64,
            tombstone.reason.as_i64()
        ],
    )?;
    Ok(())
}

fn bulk_insert_units(tx: &Transaction, units: &[Unit]) -> StoreResult<()> {
    for chunk in units.chunks(UNIT_ROWS_PER_INSERT) {
        let mut sql = String::from(
            "INSERT INTO units (id, population_id, parent_id, age, generation, lifespan, mutation_chance, alive) VALUES ",
        );
        let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 8);
        for (i, unit) in chunk.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str("(?,?,?,?,?,?,?,?)");
            values.push(Value::from(unit.id as i64));
            values.push(Value::from(unit.population_id as i64));
            values.push(match unit.parent_id {
                Some(parent) => Value::from(parent as i64),
                None => Value::Null,
            });
            values.push(Value::from(unit.age as i64));
            values.push(Value::from(unit.generation as i64));
            values.push(Value::from(unit.lifespan as i64));
            values.push(Value::from(f64::from(unit.mutation_chance)));
            values.push(Value::from(unit.alive.as_i64()));
        }
        tx.execute(&sql, params_from_iter(values))?;
    }
    Ok(())
}

fn bulk_insert_instructions(tx: &Transaction, units: &[Unit]) -> StoreResult<()> {
    let instructions: Vec<&Instruction> =
        units.iter().flat_map(|unit| unit.instructions.iter()).collect();
    for chunk in instructions.chunks(INSTRUCTION_ROWS_PER_INSERT) {
        let mut sql =
            String::from("INSERT INTO instructions (id, unit_id, age, initial_op_set, ops) VALUES ");
        let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 5);
        for (i, instruction) in chunk.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str("(?,?,?,?,?)");
            values.push(Value::from(instruction.id as i64));
            values.push(Value::from(instruction.unit_id as i64));
            values.push(Value::from(instruction.age as i64));
            values.push(Value::from(instruction.initial_op_set.clone()));
            values.push(Value::from(
                instruction
                    .packed()
                    .expect("instruction packed form missing at insert")
                    .to_vec(),
            ));
        }
        tx.execute(&sql, params_from_iter(values))?;
    }
    Ok(())
}

fn bulk_insert_mutations(tx: &Transaction, units: &[Unit]) -> StoreResult<()> {
    let mutations: Vec<&Mutation> = units
        .iter()
        .flat_map(|unit| unit.instructions.iter())
        .flat_map(|instruction| instruction.mutations.iter())
        .collect();
    for chunk in mutations.chunks(MUTATION_ROWS_PER_INSERT) {
        let mut sql = String::from(
            "INSERT INTO mutations (id, instruction_id, position1, position2, meta_op, op, chance) VALUES ",
        );
        let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 7);
        for (i, mutation) in chunk.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str("(?,?,?,?,?,?,?)");
            values.push(Value::from(mutation.id as i64));
            values.push(Value::from(mutation.instruction_id as i64));
            values.push(match mutation.position1 {
                Some(position) => Value::from(i64::from(position)),
                None => Value::Null,
            });
            values.push(match mutation.position2 {
                Some(position) => Value::from(i64::from(position)),
                None => Value::Null,
            });
            values.push(Value::from(mutation.meta_op.as_i64()));
            values.push(Value::from(i64::from(mutation.op)));
            values.push(Value::from(f64::from(mutation.chance)));
        }
        tx.execute(&sql, params_from_iter(values))?;
    }
    Ok(())
}
