//! Evaluate command - replay a saved policy without learning

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;

use crate::{
    agents::AgentKind,
    app::App,
    cli::output::{print_kv, print_section, print_subsection},
    types::RunningAggregate,
};

#[derive(Parser, Debug)]
#[command(about = "Evaluate a saved policy checkpoint")]
pub struct EvaluateArgs {
    /// Checkpoint file written by `train`
    pub checkpoint: PathBuf,

    /// Number of evaluation episodes
    #[arg(long, short = 'e', default_value_t = 200)]
    pub episodes: usize,

    /// Seed for the evaluation environment
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Step cap per episode
    #[arg(long, alias = "max_step", default_value_t = 200)]
    pub max_step: usize,

    /// Export results to a JSON file
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub checkpoint: PathBuf,
    pub env: String,
    pub algo: AgentKind,
    pub trained_episodes: usize,
    pub episodes: usize,
    pub total_steps: usize,
    pub average_return: f64,
    pub collision_rate: f64,
    pub returns: Vec<f64>,
}

pub fn execute(args: EvaluateArgs) -> Result<()> {
    let app = App::new();
    let result = evaluate_checkpoint(
        &app,
        &args.checkpoint,
        args.episodes,
        args.seed,
        args.max_step,
    )?;

    print_section(&format!("Evaluation of {}", args.checkpoint.display()));
    print_kv("Environment", &result.env);
    print_kv("Algorithm", &result.algo.to_string());
    print_kv("Trained episodes", &result.trained_episodes.to_string());
    print_subsection("Results");
    print_kv("EvalEpisodes", &result.episodes.to_string());
    print_kv("Steps", &result.total_steps.to_string());
    print_kv("EvalAverageReturn", &format!("{:.2}", result.average_return));
    print_kv("CollisionRate", &format!("{:.2}", result.collision_rate));

    if let Some(path) = &args.export {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create export file {path:?}"))?;
        serde_json::to_writer_pretty(file, &result)?;
        println!("\nResults exported to {}", path.display());
    }
    Ok(())
}

/// Run `episodes` non-learning episodes with the policy stored at `path`.
pub fn evaluate_checkpoint(
    app: &App,
    path: &Path,
    episodes: usize,
    seed: u64,
    max_step: usize,
) -> Result<EvaluationResult> {
    if episodes == 0 {
        bail!("--episodes must be at least 1");
    }
    let (mut agent, saved) = app
        .restore_agent(path, seed)
        .with_context(|| format!("failed to restore agent from {path:?}"))?;
    agent.set_eval_mode(true);

    let mut aggregate = RunningAggregate::new();
    let mut returns = Vec::with_capacity(episodes);
    for _ in 0..episodes {
        let result = agent.run(max_step)?;
        aggregate.record(&result);
        returns.push(result.episode_return);
    }

    Ok(EvaluationResult {
        checkpoint: path.to_path_buf(),
        env: saved.metadata.env,
        algo: saved.metadata.algo,
        trained_episodes: saved.metadata.episodes,
        episodes,
        total_steps: aggregate.total_steps,
        average_return: aggregate.average_return(),
        collision_rate: aggregate.collision_rate(episodes),
        returns,
    })
}
