//! Shared fixtures for the engine's store-backed tests.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

use gensort_core::{Evaluation, InstructionConfig, PopulationConfig, Unit, UnitConfig};
use gensort_store::{Store, StoreConfig};

pub fn open_store(shards: u64) -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        path: dir.path().to_path_buf(),
        name: "engine.db".to_string(),
        shard_count: shards,
        ..StoreConfig::default()
    };
    let store = Store::open(&config).unwrap();
    (dir, store)
}

/// Insert one unit per score and give each a latest evaluation with that
/// sortedness. Returns the population id and the unit ids aligned with
/// `scores`.
pub fn scored_population(store: &Store, scores: &[u8]) -> (u64, Vec<u64>) {
    let population = store
        .create_population(&PopulationConfig::default())
        .unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let unit_config = UnitConfig {
        mutation_chance: 0.0,
        instruction_count: 1,
        lifespan: 100,
        instruction: InstructionConfig { op_set_count: 1 },
    };
    let mut units: Vec<Unit> = scores
        .iter()
        .map(|_| Unit::random(&unit_config, &mut rng))
        .collect();
    store.insert_units(&mut units, population.id).unwrap();

    // Record the score -> unit mapping before persistence, which is free
    // to reorder the slice while partitioning by shard.
    let mut ids = Vec::with_capacity(scores.len());
    for (unit, &sortedness) in units.iter_mut().zip(scores) {
        unit.evaluations.push(Evaluation {
            unit_id: unit.id,
            machine_run: true,
            sortedness,
            set_fidelity: 0,
            ..Evaluation::default()
        });
        ids.push(unit.id);
    }
    store.persist_evaluated(&mut units).unwrap();
    (population.id, ids)
}
