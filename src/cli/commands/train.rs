//! Train command - run the train/evaluate experiment loop for one algorithm

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};

use crate::{
    agents::AgentKind,
    app::{App, ExperimentConfig},
    cli::output::{format_number, print_kv, print_section},
    pipeline::{ConsoleReportObserver, ExperimentSummary, ProgressObserver},
};

#[derive(Parser, Debug, Clone)]
#[command(about = "Train an agent on the driving scenario", allow_negative_numbers = true)]
pub struct TrainArgs {
    /// Environment identifier, used in metric and checkpoint names
    #[arg(long, default_value = "sumo")]
    pub env: String,

    /// Algorithm: vpg, npg, trpo, ppo, ddpg, td3, sac, asac, tac or atac
    #[arg(long, default_value = "td3")]
    pub algo: String,

    /// Random seed for reproducibility
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Number of training episodes
    #[arg(long, alias = "training_eps", default_value_t = 20000)]
    pub training_eps: usize,

    /// Evaluate every this many training episodes
    #[arg(long, alias = "eval_per_train", default_value_t = 200)]
    pub eval_per_train: usize,

    /// Episodes per evaluation block
    #[arg(long, alias = "evaluation_eps", default_value_t = 200)]
    pub evaluation_eps: usize,

    /// Step cap per episode
    #[arg(long, alias = "max_step", default_value_t = 200)]
    pub max_step: usize,

    /// Evaluation average return that triggers a checkpoint
    #[arg(long, alias = "threshold_return", default_value_t = 15.0)]
    pub threshold_return: f64,

    /// Write scalar metrics (`true` or `false`)
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub tensorboard: bool,

    /// Accelerator index, if one is available
    #[arg(long, alias = "gpu_index", default_value_t = 0)]
    pub gpu_index: usize,

    /// Checkpoint to warm-start the policy from
    #[arg(long, alias = "model_path")]
    pub model_path: Option<PathBuf>,

    /// Directory for checkpoints
    #[arg(long, default_value = "tests/save_model")]
    pub save_dir: PathBuf,

    /// Root directory for metric runs
    #[arg(long, default_value = "runs")]
    pub log_dir: PathBuf,

    /// Show a progress bar
    #[arg(long)]
    pub progress: bool,

    /// Optional path for writing a summary JSON file
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

impl TrainArgs {
    /// Convert the parsed flags into a validated experiment configuration.
    pub fn to_config(&self) -> Result<ExperimentConfig> {
        let algo: AgentKind = self.algo.parse()?;
        let config = ExperimentConfig {
            env: self.env.clone(),
            algo,
            seed: self.seed,
            training_eps: self.training_eps,
            eval_per_train: self.eval_per_train,
            evaluation_eps: self.evaluation_eps,
            max_step: self.max_step,
            threshold_return: self.threshold_return,
            tensorboard: self.tensorboard,
            gpu_index: self.gpu_index,
            model_path: self.model_path.clone(),
            save_dir: self.save_dir.clone(),
            log_dir: self.log_dir.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

pub fn execute(args: TrainArgs) -> Result<()> {
    let config = args.to_config()?;
    let app = App::new();
    let summary = run(&app, config, args.progress)?;

    if let Some(path) = &args.summary {
        write_summary(&summary, path)?;
    }
    Ok(())
}

/// Run one experiment with the given app and print a closing summary.
pub fn run(app: &App, config: ExperimentConfig, progress: bool) -> Result<ExperimentSummary> {
    print_section(&format!("Training {} on {}", config.algo, config.env));
    print_kv("Seed", &config.seed.to_string());
    print_kv("Episodes", &format_number(config.training_eps));
    print_kv(
        "Evaluation",
        &format!(
            "{} episodes every {}",
            config.evaluation_eps, config.eval_per_train
        ),
    );
    print_kv("Threshold", &config.threshold_return.to_string());

    let context = app.run_context(&config);
    let mut agent = app
        .create_agent(&config, context)
        .context("failed to create agent")?;
    let metrics = app
        .create_metrics_sink(&config)
        .context("failed to open metrics sink")?;
    if let Some(dir) = &metrics.dir {
        print_kv("Metrics", &dir.display().to_string());
    }

    let mut experiment = app
        .create_experiment(config, metrics.sink)
        .with_observer(Box::new(ConsoleReportObserver::new()));
    if progress {
        experiment = experiment.with_observer(Box::new(ProgressObserver::new()));
    }

    let summary = experiment
        .run(agent.as_mut())
        .context("experiment failed")?;

    print_section("Training complete");
    print_kv("Episodes", &format_number(summary.train.total_episodes));
    print_kv("Steps", &format_number(summary.train.total_steps));
    print_kv(
        "AverageReturn",
        &format!("{:.2}", summary.train.average_return()),
    );
    if let Some(best) = summary.best_eval_average() {
        print_kv("BestEvalReturn", &format!("{best:.2}"));
    }
    print_kv("Checkpoints", &summary.checkpoints.len().to_string());
    for path in &summary.checkpoints {
        println!("    {}", path.display());
    }
    print_kv("Time", &format!("{:.1}s", summary.elapsed_secs));

    Ok(summary)
}

const DEFAULT_SUMMARY_FILE: &str = "experiment_summary.json";

/// Resolve the `--summary` argument to a file path.
///
/// A trailing separator or an existing directory gets the default file name;
/// a bare stem gets a `.json` extension.
pub fn resolve_summary_path(path: &Path) -> PathBuf {
    let raw = path.as_os_str().to_string_lossy();
    if raw.ends_with(std::path::MAIN_SEPARATOR) || raw.ends_with('/') || path.is_dir() {
        return path.join(DEFAULT_SUMMARY_FILE);
    }
    if path.extension().is_none() {
        return path.with_extension("json");
    }
    path.to_path_buf()
}

fn write_summary(summary: &ExperimentSummary, path: &Path) -> Result<()> {
    let path = &resolve_summary_path(path);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create summary directory {parent:?}"))?;
    }
    summary
        .save(path)
        .with_context(|| format!("failed to write summary to {path:?}"))?;
    println!("\nSummary written to {}", path.display());
    Ok(())
}
