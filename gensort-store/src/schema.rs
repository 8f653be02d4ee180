//! The shard schema. Every shard is identical; populations are only ever
//! written on shard 0.

/// Ids are assigned by the process-wide generators, so primary keys are
/// plain INTEGER PRIMARY KEY with no autoincrement.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS populations (
    id INTEGER PRIMARY KEY,
    current_generation INTEGER DEFAULT 0,
    unit_count INTEGER,
    synthesis_pool INTEGER,
    carrying_capacity INTEGER,
    elitism INTEGER,
    max_offspring INTEGER,
    unit_mutation_chance REAL,
    unit_instruction_count INTEGER,
    unit_ins_op_set_count INTEGER,
    unit_lifespan INTEGER,
    eval_machine_max_instruction_execution_count INTEGER,
    eval_machine_memory_cell_count INTEGER,
    eval_input_cell_count INTEGER,
    eval_output_cell_count INTEGER,
    eval_synthesis_input_cell_count INTEGER,
    eval_input_cell_start INTEGER,
    eval_input_cell_step INTEGER,
    eval_eval_rounds INTEGER,
    sel_machine_run INTEGER,
    sel_set_fidelity INTEGER,
    sel_sortedness INTEGER,
    sel_set_fidelity_start INTEGER DEFAULT 0,
    sel_set_fidelity_step INTEGER DEFAULT 0,
    sel_sortedness_start INTEGER DEFAULT 0,
    sel_sortedness_step INTEGER DEFAULT 0,
    sel_instruction_count INTEGER,
    sel_instructions_executed INTEGER,
    fit_sortedness_priority INTEGER,
    fit_set_fidelity_priority INTEGER,
    fit_efficiency_priority INTEGER
);

CREATE TABLE IF NOT EXISTS units (
    id INTEGER PRIMARY KEY,
    population_id INTEGER,
    parent_id INTEGER,
    age INTEGER DEFAULT 0,
    generation INTEGER DEFAULT 0,
    lifespan INTEGER,
    mutation_chance REAL,
    alive INTEGER DEFAULT 1
);

CREATE TABLE IF NOT EXISTS instructions (
    id INTEGER PRIMARY KEY,
    unit_id INTEGER,
    age INTEGER DEFAULT 0,
    initial_op_set BLOB,
    ops BLOB
);

CREATE TABLE IF NOT EXISTS mutations (
    id INTEGER PRIMARY KEY,
    instruction_id INTEGER,
    position1 INTEGER,
    position2 INTEGER,
    meta_op INTEGER,
    op INTEGER,
    chance REAL
);

CREATE TABLE IF NOT EXISTS evaluations (
    id INTEGER PRIMARY KEY,
    unit_id INTEGER,
    machine_run INTEGER,
    set_fidelity INTEGER,
    sortedness INTEGER,
    instruction_count INTEGER,
    instructions_executed INTEGER,
    machine_error TEXT
);

CREATE TABLE IF NOT EXISTS tombstones (
    id INTEGER PRIMARY KEY,
    unit_id INTEGER,
    reason INTEGER
);

CREATE INDEX IF NOT EXISTS idx_units_pop_alive ON units(population_id, alive);
CREATE INDEX IF NOT EXISTS idx_instructions_unit_id ON instructions(unit_id);
CREATE INDEX IF NOT EXISTS idx_evaluations_unit_id ON evaluations(unit_id);
CREATE INDEX IF NOT EXISTS idx_tombstones_unit_id ON tombstones(unit_id);
CREATE INDEX IF NOT EXISTS idx_mutations_instruction_id ON mutations(instruction_id);
";

/// Tables with a per-entity id generator, in initialization order.
pub const ID_TABLES: [&str; 6] = [
    "units",
    "instructions",
    "evaluations",
    "mutations",
    "tombstones",
    "populations",
];
