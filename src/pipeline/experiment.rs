//! Experiment loop: alternating training episodes and evaluation blocks.
//!
//! The loop is a two-state machine. In TRAIN it runs one learning episode
//! per iteration and logs the running training statistics. Every
//! `eval_per_train` episodes it switches to EVAL, runs exactly
//! `evaluation_eps` non-learning episodes into a fresh aggregate, reports,
//! optionally writes a checkpoint, and returns to TRAIN.

use std::{
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    Error, Result,
    agents::{CheckpointMetadata, SavedPolicy},
    app::ExperimentConfig,
    ports::{Agent, CheckpointRepository, Diagnostics, MetricsSink, Observer},
    types::RunningAggregate,
};

/// Scalar tags emitted by the loop.
pub mod tags {
    pub const TRAIN_AVERAGE_RETURNS: &str = "Train/AverageReturns";
    pub const TRAIN_EPISODE_RETURNS: &str = "Train/EpisodeReturns";
    pub const TRAIN_ALPHA: &str = "Train/Alpha";
    pub const TRAIN_COLLISION_RATE: &str = "Train/CollisionRate";
    pub const EVAL_EPISODE_RETURNS: &str = "Eval/EpisodeReturns";
    pub const EVAL_AVERAGE_RETURNS: &str = "Eval/AverageReturns";
    pub const EVAL_COLLISION_RATE: &str = "Eval/CollisionRate";
}

/// Everything known at the end of one evaluation block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// 1-based block number
    pub block: usize,
    /// Training episode after which the block ran
    pub episode: usize,
    pub train_steps: usize,
    pub train_episodes: usize,
    pub train_average_return: f64,
    /// Collisions since the previous boundary divided by the cadence
    pub train_collision_rate: f64,
    pub eval_episodes: usize,
    pub eval_average_return: f64,
    pub eval_collision_rate: f64,
    /// Agent diagnostics at the time of the evaluation
    pub diagnostics: Diagnostics,
    pub elapsed_secs: f64,
    /// Checkpoint written for this block, if it qualified
    pub checkpoint: Option<PathBuf>,
}

/// Outcome of a full run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExperimentSummary {
    /// Training aggregate; its collision counter only covers episodes after
    /// the last evaluation boundary
    pub train: RunningAggregate,
    pub evaluations: Vec<EvaluationReport>,
    pub checkpoints: Vec<PathBuf>,
    pub elapsed_secs: f64,
}

impl ExperimentSummary {
    /// Best evaluation average over all blocks.
    pub fn best_eval_average(&self) -> Option<f64> {
        self.evaluations
            .iter()
            .map(|r| r.eval_average_return)
            .reduce(f64::max)
    }

    /// Save the summary as pretty JSON.
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

pub struct ExperimentLoop {
    config: ExperimentConfig,
    metrics: Box<dyn MetricsSink>,
    checkpoints: Arc<dyn CheckpointRepository + Send + Sync>,
    observers: Vec<Box<dyn Observer>>,
}

impl ExperimentLoop {
    pub fn new(
        config: ExperimentConfig,
        metrics: Box<dyn MetricsSink>,
        checkpoints: Arc<dyn CheckpointRepository + Send + Sync>,
    ) -> Self {
        Self {
            config,
            metrics,
            checkpoints,
            observers: Vec::new(),
        }
    }

    /// Add an observer to the loop
    pub fn with_observer(mut self, observer: Box<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Drive `agent` through the whole experiment.
    ///
    /// # Errors
    ///
    /// Invalid configuration, or an agent built for another algorithm, is
    /// reported before any episode runs. Agent, environment, metric and
    /// checkpoint failures abort the run.
    pub fn run(&mut self, agent: &mut dyn Agent) -> Result<ExperimentSummary> {
        self.config.validate()?;
        if agent.kind() != self.config.algo {
            return Err(Error::config(format!(
                "agent is '{}' but the experiment is configured for '{}'",
                agent.kind(),
                self.config.algo
            )));
        }
        let start = Instant::now();

        info!(
            env = %self.config.env,
            algo = %self.config.algo,
            seed = self.config.seed,
            training_eps = self.config.training_eps,
            eval_per_train = self.config.eval_per_train,
            evaluation_eps = self.config.evaluation_eps,
            evaluation_blocks = self.config.evaluation_blocks(),
            "experiment started"
        );
        for observer in &mut self.observers {
            observer.on_experiment_start(self.config.training_eps)?;
        }

        let mut train = RunningAggregate::new();
        let mut summary = ExperimentSummary::default();

        for episode in 1..=self.config.training_eps {
            agent.set_eval_mode(false);
            let result = agent.run(self.config.max_step)?;
            train.record(&result);

            let step = episode as i64;
            self.metrics
                .add_scalar(tags::TRAIN_AVERAGE_RETURNS, train.average_return(), step)?;
            self.metrics
                .add_scalar(tags::TRAIN_EPISODE_RETURNS, result.episode_return, step)?;
            if let Some(alpha) = agent.alpha() {
                self.metrics.add_scalar(tags::TRAIN_ALPHA, alpha, step)?;
            }
            for observer in &mut self.observers {
                observer.on_train_episode(episode, &result, &train)?;
            }

            if episode.is_multiple_of(self.config.eval_per_train) {
                let block = summary.evaluations.len() + 1;
                let report = self.evaluate(agent, block, episode, &mut train, start)?;
                if let Some(path) = &report.checkpoint {
                    summary.checkpoints.push(path.clone());
                }
                summary.evaluations.push(report);
            }
        }

        self.metrics.flush()?;
        agent.set_eval_mode(false);

        summary.train = train;
        summary.elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            episodes = summary.train.total_episodes,
            steps = summary.train.total_steps,
            evaluations = summary.evaluations.len(),
            checkpoints = summary.checkpoints.len(),
            "experiment finished"
        );
        for observer in &mut self.observers {
            observer.on_experiment_end(&summary)?;
        }
        Ok(summary)
    }

    fn evaluate(
        &mut self,
        agent: &mut dyn Agent,
        block: usize,
        episode: usize,
        train: &mut RunningAggregate,
        start: Instant,
    ) -> Result<EvaluationReport> {
        let boundary = episode as i64;
        let train_collision_rate = train.collision_rate(self.config.eval_per_train);
        self.metrics
            .add_scalar(tags::TRAIN_COLLISION_RATE, train_collision_rate, boundary)?;
        train.reset_collisions();

        agent.set_eval_mode(true);
        let mut eval = RunningAggregate::new();
        let first_step = boundary - self.config.evaluation_eps as i64;
        for i in 0..self.config.evaluation_eps {
            let result = agent.run(self.config.max_step)?;
            eval.record(&result);
            self.metrics.add_scalar(
                tags::EVAL_EPISODE_RETURNS,
                result.episode_return,
                first_step + i as i64,
            )?;
        }
        agent.set_eval_mode(false);

        let eval_collision_rate = eval.collision_rate(self.config.evaluation_eps);
        self.metrics
            .add_scalar(tags::EVAL_AVERAGE_RETURNS, eval.average_return(), boundary)?;
        self.metrics
            .add_scalar(tags::EVAL_COLLISION_RATE, eval_collision_rate, boundary)?;

        let mut report = EvaluationReport {
            block,
            episode,
            train_steps: train.total_steps,
            train_episodes: train.total_episodes,
            train_average_return: train.average_return(),
            train_collision_rate,
            eval_episodes: eval.total_episodes,
            eval_average_return: eval.average_return(),
            eval_collision_rate,
            diagnostics: agent.logger().clone(),
            elapsed_secs: start.elapsed().as_secs_f64(),
            checkpoint: None,
        };
        debug!(block, episode, eval_average = report.eval_average_return, "evaluation finished");

        if report.eval_average_return >= self.config.threshold_return {
            report.checkpoint = Some(self.save_checkpoint(agent, &report)?);
        }

        for observer in &mut self.observers {
            observer.on_evaluation_end(&report)?;
        }
        if let Some(path) = &report.checkpoint {
            for observer in &mut self.observers {
                observer.on_checkpoint(path)?;
            }
        }
        Ok(report)
    }

    fn save_checkpoint(&self, agent: &dyn Agent, report: &EvaluationReport) -> Result<PathBuf> {
        let path = self.config.checkpoint_path(
            report.train_episodes,
            report.train_average_return,
            report.eval_average_return,
        );
        let saved = SavedPolicy::new(
            CheckpointMetadata {
                env: self.config.env.clone(),
                algo: self.config.algo,
                seed: self.config.seed,
                episodes: report.train_episodes,
                train_average_return: report.train_average_return,
                eval_average_return: report.eval_average_return,
                saved_at: Some(chrono::Local::now().to_rfc3339()),
            },
            agent.policy().clone(),
        );
        self.checkpoints.save(&saved, &path)?;
        info!(
            path = %path.display(),
            eval_average = report.eval_average_return,
            threshold = self.config.threshold_return,
            "evaluation reached threshold, checkpoint written"
        );
        Ok(path)
    }
}
