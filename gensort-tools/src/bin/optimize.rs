//! Meta-driver: run whole trials and consult a local language model for
//! new starting parameters between them. On success the winning program
//! goes to stdout.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use gensort_core::PopulationConfig;
use gensort_engine::{EngineError, GenerationEngine, RngPool, Synthesizer};
use gensort_store::Store;
use gensort_tools::{init_logging, load_population_config, load_tool_config};

#[derive(Parser)]
#[command(about = "Run gensort trials, adjusting parameters with an LLM between them")]
struct Args {
    /// Tool config file.
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Starting population config.
    #[arg(long, default_value = "./pop.toml")]
    popconfig: PathBuf,

    /// Trials to run; 1 means a single run with no consultation.
    #[arg(long, default_value_t = 1)]
    trials: u32,

    /// Max generations per trial.
    #[arg(long, default_value_t = 500)]
    gen_cap: u64,

    /// Generations between metric checks.
    #[arg(long, default_value_t = 10)]
    check: u64,

    /// Consecutive no-improvement checks before aborting a trial;
    /// 0 disables.
    #[arg(long, default_value_t = 5)]
    stagnation: u64,

    /// Ollama generate endpoint.
    #[arg(long, default_value = "http://localhost:11434/api/generate")]
    ollama: String,

    /// Ollama model name.
    #[arg(long, default_value = "gemma3:4b-it-qat")]
    model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Extinct,
    Timeout,
    Stagnant,
    SynthesisFailed,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Extinct => "extinct",
            Outcome::Timeout => "timeout",
            Outcome::Stagnant => "stagnant",
            Outcome::SynthesisFailed => "synthesis_failed",
        }
    }
}

struct TrialResult {
    outcome: Outcome,
    generations_run: u64,
    best_sortedness: u8,
    best_set_fidelity: u8,
    alive_at_end: u64,
    program: String,
    at_cap_checks: u64,
    total_checks: u64,
}

/// Parameter adjustments the model may propose between trials. Absent
/// fields keep their current values.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ParamAdjustments {
    reasoning: String,
    unit_count: Option<u64>,
    carrying_capacity: Option<u64>,
    elitism: Option<u64>,
    max_offspring: Option<u64>,
    mutation_chance: Option<f32>,
    instruction_count: Option<u64>,
    op_set_count: Option<u64>,
    lifespan: Option<u64>,
    sortedness_start: Option<u8>,
    sortedness_step: Option<u64>,
    set_fidelity_start: Option<u8>,
    set_fidelity_step: Option<u64>,
    input_cell_start: Option<u64>,
    input_cell_step: Option<u64>,
    eval_rounds: Option<u64>,
    gen_cap: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let tool_config = load_tool_config(&args.config)?;
    let mut population_config = load_population_config(&args.popconfig)?;
    let mut gen_cap = args.gen_cap;
    let mut history: Vec<TrialResult> = Vec::new();

    for trial in 0..args.trials {
        info!(trial = trial + 1, total = args.trials, gen_cap, "trial start");
        let result = run_trial(
            &tool_config,
            &population_config,
            gen_cap,
            args.check,
            args.stagnation,
        )?;

        match result.outcome {
            Outcome::Success => info!(
                generations = result.generations_run,
                alive = result.alive_at_end,
                "trial succeeded"
            ),
            outcome => info!(
                outcome = outcome.as_str(),
                generations = result.generations_run,
                best_sortedness = result.best_sortedness,
                best_set_fidelity = result.best_set_fidelity,
                "trial ended"
            ),
        }

        let succeeded = result.outcome == Outcome::Success;
        let program = result.program.clone();
        history.push(result);
        if succeeded {
            println!("{program}");
            break;
        }
        if trial + 1 == args.trials {
            break;
        }

        info!("consulting model for next parameters");
        match consult_model(&args.ollama, &args.model, &history, &population_config) {
            Ok(adjustments) => {
                info!(reasoning = %adjustments.reasoning, "model responded");
                apply_adjustments(&mut population_config, &adjustments, &mut gen_cap);
            }
            Err(error) => warn!(%error, "consultation failed, keeping current parameters"),
        }
    }

    summarize(&history);
    Ok(())
}

fn run_trial(
    tool_config: &gensort_tools::ToolConfig,
    population_config: &PopulationConfig,
    gen_cap: u64,
    check_interval: u64,
    stagnation: u64,
) -> anyhow::Result<TrialResult> {
    let check_interval = check_interval.max(1);
    let store = Store::open(&tool_config.persistence).context("failed to open store")?;
    let population = store.create_population(population_config)?;
    let population_id = population.id;

    let rng = RngPool::new(tool_config.persistence.seed);
    if let Err(EngineError::SynthesisFailed) =
        Synthesizer::new(&store, &population, &rng).synthesize()
    {
        return Ok(TrialResult {
            outcome: Outcome::SynthesisFailed,
            generations_run: 0,
            best_sortedness: 0,
            best_set_fidelity: 0,
            alive_at_end: 0,
            program: String::new(),
            at_cap_checks: 0,
            total_checks: 0,
        });
    }

    let full_size = population_config.eval.input_cell_count;
    let mut engine = GenerationEngine::new(&store, population);
    let mut best_sortedness = 0u8;
    let mut best_set_fidelity = 0u8;
    let mut alive = 0u64;
    let mut stagnant_checks = 0u64;
    let mut at_cap_checks = 0u64;
    let mut total_checks = 0u64;
    let mut best_score = 0u16;

    for generation in 0..gen_cap {
        match engine.run_generation() {
            Ok(summary) => alive = summary.alive_after,
            Err(EngineError::Extinct { .. }) => {
                return Ok(TrialResult {
                    outcome: Outcome::Extinct,
                    generations_run: generation + 1,
                    best_sortedness,
                    best_set_fidelity,
                    alive_at_end: 0,
                    program: String::new(),
                    at_cap_checks,
                    total_checks,
                });
            }
            Err(error) => return Err(error.into()),
        }

        if (generation + 1) % check_interval != 0 {
            continue;
        }
        total_checks += 1;
        let metrics = store.metrics(population_id)?;
        best_sortedness = best_sortedness.max(metrics.best_sortedness);
        best_set_fidelity = best_set_fidelity.max(metrics.best_set_fidelity);
        if metrics.alive_count * 10 >= population_config.carrying_capacity * 9 {
            at_cap_checks += 1;
        }

        // Success means a perfect score at the full curriculum size.
        let at_full_size =
            population_config.eval.effective_input_cells(generation + 1) >= full_size;
        if at_full_size && metrics.best_sortedness >= 100 && metrics.best_set_fidelity >= 100 {
            let program = store
                .best_unit(population_id)?
                .map(|best| best.program)
                .unwrap_or_default();
            return Ok(TrialResult {
                outcome: Outcome::Success,
                generations_run: generation + 1,
                best_sortedness: 100,
                best_set_fidelity: 100,
                alive_at_end: metrics.alive_count,
                program,
                at_cap_checks,
                total_checks,
            });
        }

        let score = u16::from(metrics.best_sortedness) + u16::from(metrics.best_set_fidelity);
        if score > best_score {
            best_score = score;
            stagnant_checks = 0;
        } else {
            stagnant_checks += 1;
            if stagnation > 0 && stagnant_checks >= stagnation {
                return Ok(TrialResult {
                    outcome: Outcome::Stagnant,
                    generations_run: generation + 1,
                    best_sortedness,
                    best_set_fidelity,
                    alive_at_end: metrics.alive_count,
                    program: String::new(),
                    at_cap_checks,
                    total_checks,
                });
            }
        }
    }

    Ok(TrialResult {
        outcome: Outcome::Timeout,
        generations_run: gen_cap,
        best_sortedness,
        best_set_fidelity,
        alive_at_end: alive,
        program: String::new(),
        at_cap_checks,
        total_checks,
    })
}

fn consult_model(
    url: &str,
    model: &str,
    history: &[TrialResult],
    current: &PopulationConfig,
) -> anyhow::Result<ParamAdjustments> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;

    let response = client
        .post(url)
        .json(&serde_json::json!({
            "model": model,
            "prompt": build_prompt(history, current),
            "stream": false,
        }))
        .send()?
        .error_for_status()?;
    let body: serde_json::Value = response.json()?;
    let text = body["response"].as_str().unwrap_or_default();

    let json = extract_json(text).context("no JSON object in model response")?;
    let adjustments: ParamAdjustments =
        serde_json::from_str(json).context("model response is not valid adjustments JSON")?;
    Ok(adjustments)
}

fn build_prompt(history: &[TrialResult], current: &PopulationConfig) -> String {
    let mut prompt = String::from(
        "You are tuning a genetic algorithm that evolves array-sorting programs.\n\
         Trial history (most recent last):\n",
    );
    for (i, trial) in history.iter().enumerate() {
        prompt.push_str(&format!(
            "  trial {}: outcome={} generations={} best_sortedness={} best_set_fidelity={} \
             alive_at_end={} at_capacity_checks={}/{}\n",
            i + 1,
            trial.outcome.as_str(),
            trial.generations_run,
            trial.best_sortedness,
            trial.best_set_fidelity,
            trial.alive_at_end,
            trial.at_cap_checks,
            trial.total_checks,
        ));
    }
    prompt.push_str(&format!(
        "Current parameters: unit_count={} carrying_capacity={} elitism={} max_offspring={} \
         mutation_chance={} instruction_count={} op_set_count={} lifespan={} \
         sortedness_start={} sortedness_step={} set_fidelity_start={} set_fidelity_step={} \
         input_cell_start={} input_cell_step={} eval_rounds={}\n",
        current.unit_count,
        current.carrying_capacity,
        current.elitism,
        current.max_offspring,
        current.unit.mutation_chance,
        current.unit.instruction_count,
        current.unit.instruction.op_set_count,
        current.unit.lifespan,
        current.select.sortedness_start,
        current.select.sortedness_step,
        current.select.set_fidelity_start,
        current.select.set_fidelity_step,
        current.eval.input_cell_start,
        current.eval.input_cell_step,
        current.eval.eval_rounds,
    ));
    prompt.push_str(
        "Respond with one JSON object containing a short \"reasoning\" string and only the \
         parameters you want to change, using the names above (plus optional \"gen_cap\"). \
         No other text.",
    );
    prompt
}

/// The first `{`..last `}` span, for models that wrap JSON in prose.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn apply_adjustments(config: &mut PopulationConfig, adj: &ParamAdjustments, gen_cap: &mut u64) {
    if let Some(value) = adj.unit_count {
        config.unit_count = value;
    }
    if let Some(value) = adj.carrying_capacity {
        config.carrying_capacity = value;
    }
    if let Some(value) = adj.elitism {
        config.elitism = value;
    }
    if let Some(value) = adj.max_offspring {
        config.max_offspring = value;
    }
    if let Some(value) = adj.mutation_chance {
        config.unit.mutation_chance = value.clamp(0.0, 1.0);
    }
    if let Some(value) = adj.instruction_count {
        config.unit.instruction_count = value.max(1);
    }
    if let Some(value) = adj.op_set_count {
        config.unit.instruction.op_set_count = value.max(1);
    }
    if let Some(value) = adj.lifespan {
        config.unit.lifespan = value.max(1);
    }
    if let Some(value) = adj.sortedness_start {
        config.select.sortedness_start = value;
    }
    if let Some(value) = adj.sortedness_step {
        config.select.sortedness_step = value;
    }
    if let Some(value) = adj.set_fidelity_start {
        config.select.set_fidelity_start = value;
    }
    if let Some(value) = adj.set_fidelity_step {
        config.select.set_fidelity_step = value;
    }
    if let Some(value) = adj.input_cell_start {
        config.eval.input_cell_start = value;
    }
    if let Some(value) = adj.input_cell_step {
        config.eval.input_cell_step = value;
    }
    if let Some(value) = adj.eval_rounds {
        config.eval.eval_rounds = value.max(1);
    }
    if let Some(value) = adj.gen_cap {
        *gen_cap = value.max(1);
    }
}

fn summarize(history: &[TrialResult]) {
    info!("optimization summary");
    for (i, trial) in history.iter().enumerate() {
        info!(
            trial = i + 1,
            outcome = trial.outcome.as_str(),
            generations = trial.generations_run,
            best_sortedness = trial.best_sortedness,
            best_set_fidelity = trial.best_set_fidelity,
            alive = trial.alive_at_end,
            at_capacity = format!("{}/{}", trial.at_cap_checks, trial.total_checks),
            "trial"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_finds_the_object_span() {
        assert_eq!(
            extract_json("Sure! Here you go: {\"reasoning\": \"x\"} Hope it helps."),
            Some("{\"reasoning\": \"x\"}")
        );
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn adjustments_apply_only_present_fields() {
        let mut config = PopulationConfig::default();
        let before_capacity = config.carrying_capacity;
        let mut gen_cap = 500;

        let adj: ParamAdjustments = serde_json::from_str(
            r#"{"reasoning": "loosen the ramp", "mutation_chance": 0.5, "sortedness_step": 25, "gen_cap": 800}"#,
        )
        .unwrap();
        apply_adjustments(&mut config, &adj, &mut gen_cap);

        assert_eq!(config.unit.mutation_chance, 0.5);
        assert_eq!(config.select.sortedness_step, 25);
        assert_eq!(config.carrying_capacity, before_capacity);
        assert_eq!(gen_cap, 800);
    }

    #[test]
    fn mutation_chance_is_clamped() {
        let mut config = PopulationConfig::default();
        let mut gen_cap = 500;
        let adj = ParamAdjustments {
            mutation_chance: Some(7.5),
            ..ParamAdjustments::default()
        };
        apply_adjustments(&mut config, &adj, &mut gen_cap);
        assert_eq!(config.unit.mutation_chance, 1.0);
    }
}
