//! Evaluation: run a unit's program on a randomized input and score the
//! output for sortedness and set fidelity.

use rand::Rng;

use gensort_core::{Evaluation, EvaluatorConfig, Unit};
use gensort_machine::{Machine, MachineConfig};

/// One evaluator per worker thread; it owns its machine and reuses it
/// across evaluations.
pub struct Evaluator {
    machine: Machine,
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(config: &EvaluatorConfig) -> Self {
        let machine = Machine::new(&MachineConfig {
            max_instruction_executions: config.machine.max_instruction_execution_count,
            memory_cell_count: config.machine.memory_cell_count as usize,
        });
        Self {
            machine,
            config: config.clone(),
        }
    }

    /// Evaluate at the curriculum-effective input size for `generation`,
    /// running `rounds` rounds and keeping the worst evaluation.
    ///
    /// Below the full input size the output window tracks the effective
    /// size and both scores are scaled by `effective/max`, so short easy
    /// inputs cannot look artificially perfect.
    pub fn evaluate<R: Rng + ?Sized>(
        &mut self,
        unit: &mut Unit,
        generation: u64,
        rounds: u64,
        rng: &mut R,
    ) -> Evaluation {
        let max_cells = self.config.input_cell_count;
        let effective = self.config.effective_input_cells(generation).min(max_cells);
        let output_cells = if effective < max_cells {
            effective
        } else {
            self.config.output_cell_count
        };

        let mut worst: Option<Evaluation> = None;
        for _ in 0..rounds.max(1) {
            let evaluation = self.evaluate_once(
                unit,
                effective as usize,
                output_cells as usize,
                effective,
                max_cells,
                rng,
            );
            let is_worse = match &worst {
                Some(current) => evaluation.fitness() < current.fitness(),
                None => true,
            };
            if is_worse {
                worst = Some(evaluation);
            }
        }
        worst.unwrap()
    }

    /// Unscaled evaluation at an explicit input size; the synthesis path.
    pub fn evaluate_at<R: Rng + ?Sized>(
        &mut self,
        unit: &mut Unit,
        input_cells: usize,
        output_cells: usize,
        rng: &mut R,
    ) -> Evaluation {
        self.evaluate_once(unit, input_cells, output_cells, 1, 1, rng)
    }

    fn evaluate_once<R: Rng + ?Sized>(
        &mut self,
        unit: &mut Unit,
        input_cells: usize,
        output_cells: usize,
        scale_effective: u64,
        scale_max: u64,
        rng: &mut R,
    ) -> Evaluation {
        let program = unit.program();
        let input: Vec<u8> = (0..input_cells).map(|_| rng.gen()).collect();

        self.machine.reset();
        self.machine.load_program(&program);
        self.machine
            .load_memory(&input)
            .expect("input cell count exceeds machine memory; check eval config");

        let mut evaluation = Evaluation {
            unit_id: unit.id,
            ..Evaluation::default()
        };
        match self.machine.run() {
            Ok(()) => evaluation.machine_run = true,
            Err(error) => evaluation.machine_error = Some(error.to_string()),
        }

        let output = self
            .machine
            .read_memory(output_cells)
            .expect("output cell count exceeds machine memory; check eval config");

        evaluation.set_fidelity = set_fidelity(&input, output);
        evaluation.sortedness = sortedness(output);
        if scale_effective < scale_max {
            evaluation.set_fidelity =
                scale_score(evaluation.set_fidelity, scale_effective, scale_max);
            evaluation.sortedness = scale_score(evaluation.sortedness, scale_effective, scale_max);
        }
        evaluation.instruction_count = program.len() as u64;
        evaluation.instructions_executed = self.machine.executed();
        evaluation
    }
}

fn scale_score(score: u8, effective: u64, max: u64) -> u8 {
    (u64::from(score) * effective / max) as u8
}

/// Of the distinct input values, the percentage that also appear among
/// the distinct output values. Integer truncation.
fn set_fidelity(input: &[u8], output: &[u8]) -> u8 {
    if input.is_empty() {
        return 100;
    }
    let mut in_set = [false; 256];
    let mut out_set = [false; 256];
    for &value in input {
        in_set[value as usize] = true;
    }
    for &value in output {
        out_set[value as usize] = true;
    }
    let mut total = 0u32;
    let mut kept = 0u32;
    for value in 0..256 {
        if in_set[value] {
            total += 1;
            if out_set[value] {
                kept += 1;
            }
        }
    }
    (kept * 100 / total) as u8
}

/// `100 - floor(inversions / maxInversions * 100)`; vacuously 100 for
/// n <= 1.
fn sortedness(output: &[u8]) -> u8 {
    let n = output.len();
    if n <= 1 {
        return 100;
    }
    let mut scratch = output.to_vec();
    let inversions = count_inversions(&mut scratch);
    let max_inversions = (n * (n - 1) / 2) as u64;
    (100 - inversions * 100 / max_inversions) as u8
}

/// Merge sort that returns the inversion total.
fn count_inversions(values: &mut [u8]) -> u64 {
    let len = values.len();
    if len <= 1 {
        return 0;
    }
    let mid = len / 2;
    let mut inversions = {
        let (left, right) = values.split_at_mut(mid);
        count_inversions(left) + count_inversions(right)
    };

    let mut merged = Vec::with_capacity(len);
    let (mut i, mut j) = (0, mid);
    while i < mid && j < len {
        if values[i] <= values[j] {
            merged.push(values[i]);
            i += 1;
        } else {
            inversions += (mid - i) as u64;
            merged.push(values[j]);
            j += 1;
        }
    }
    merged.extend_from_slice(&values[i..mid]);
    merged.extend_from_slice(&values[j..len]);
    values.copy_from_slice(&merged);
    inversions
}
