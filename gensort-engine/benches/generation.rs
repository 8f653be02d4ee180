//! Benchmarks for the hot per-generation paths: parallel evaluation and
//! parallel mitosis over a large batch of units.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use gensort_core::{EvaluatorConfig, InstructionConfig, MachineSettings, Unit, UnitConfig};
use gensort_engine::{Evaluator, RngPool};

fn make_units(count: usize) -> Vec<Unit> {
    let config = UnitConfig {
        mutation_chance: 0.25,
        instruction_count: 10,
        lifespan: 200,
        instruction: InstructionConfig { op_set_count: 10 },
    };
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut units: Vec<Unit> = (0..count).map(|_| Unit::random(&config, &mut rng)).collect();
    for unit in &mut units {
        unit.warm_instruction_cache();
    }
    units
}

fn eval_config() -> EvaluatorConfig {
    EvaluatorConfig {
        machine: MachineSettings {
            max_instruction_execution_count: 10_000,
            memory_cell_count: 30,
        },
        input_cell_count: 2,
        output_cell_count: 2,
        synthesis_input_cell_count: 2,
        input_cell_start: 0,
        input_cell_step: 0,
        eval_rounds: 1,
    }
}

fn bench_parallel_eval(c: &mut Criterion) {
    let mut units = make_units(10_000);
    let config = eval_config();
    let pool = RngPool::new(42);

    c.bench_function("parallel_eval_10k", |b| {
        b.iter(|| {
            units.par_iter_mut().for_each_init(
                || Evaluator::new(&config),
                |evaluator, unit| {
                    let mut rng = pool.borrow();
                    black_box(evaluator.evaluate(unit, 0, 1, &mut *rng));
                },
            );
        })
    });
}

fn bench_parallel_mitosis(c: &mut Criterion) {
    let units = make_units(10_000);
    let pool = RngPool::new(42);

    c.bench_function("parallel_mitosis_10k", |b| {
        b.iter(|| {
            units.par_iter().for_each(|unit| {
                let mut rng = pool.borrow();
                black_box(unit.mitosis(&mut *rng));
            });
        })
    });
}

criterion_group!(benches, bench_parallel_eval, bench_parallel_mitosis);
criterion_main!(benches);
