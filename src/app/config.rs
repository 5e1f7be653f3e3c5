//! Experiment configuration and run context.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result, agents::AgentKind, utils::format_rounded};

/// Compute placement requested for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Gpu(usize),
}

impl Device {
    /// Resolve a requested GPU index against what this build can use.
    ///
    /// Falls back to the host when no accelerator is available.
    pub fn resolve(gpu_index: usize, accelerator_available: bool) -> Self {
        if accelerator_available {
            Device::Gpu(gpu_index)
        } else {
            warn!(gpu_index, "no accelerator backend available, running on the host");
            Device::Cpu
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu(index) => write!(f, "gpu:{index}"),
        }
    }
}

/// Seed and device threaded explicitly into every component that needs
/// determinism or compute placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub seed: u64,
    pub device: Device,
}

impl RunContext {
    pub fn new(seed: u64, device: Device) -> Self {
        Self { seed, device }
    }

    /// Seed for the agent's own random number generator.
    pub fn agent_seed(&self) -> u64 {
        self.seed
    }

    /// Seed for the environment, kept distinct from the agent stream.
    pub fn environment_seed(&self) -> u64 {
        self.seed.wrapping_add(1)
    }
}

/// Immutable settings for one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Environment identifier, used in metric and checkpoint names
    pub env: String,
    /// Algorithm to train
    pub algo: AgentKind,
    pub seed: u64,
    /// Number of training episodes
    pub training_eps: usize,
    /// Run an evaluation block every this many training episodes
    pub eval_per_train: usize,
    /// Episodes per evaluation block
    pub evaluation_eps: usize,
    /// Step cap for a single episode
    pub max_step: usize,
    /// Evaluation average return at or above which a checkpoint is written
    pub threshold_return: f64,
    /// Whether scalar metrics are written to disk
    pub tensorboard: bool,
    pub gpu_index: usize,
    /// Optional checkpoint used to warm-start the policy
    pub model_path: Option<PathBuf>,
    /// Directory receiving checkpoints
    pub save_dir: PathBuf,
    /// Root directory for metric runs
    pub log_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            env: "sumo".to_string(),
            algo: AgentKind::Td3,
            seed: 0,
            training_eps: 20_000,
            eval_per_train: 200,
            evaluation_eps: 200,
            max_step: 200,
            threshold_return: 15.0,
            tensorboard: true,
            gpu_index: 0,
            model_path: None,
            save_dir: PathBuf::from("tests/save_model"),
            log_dir: PathBuf::from("runs"),
        }
    }
}

impl ExperimentConfig {
    /// Check the settings the loop relies on.
    pub fn validate(&self) -> Result<()> {
        if self.env.trim().is_empty() {
            return Err(Error::config("environment id must not be empty"));
        }
        if self.eval_per_train == 0 {
            return Err(Error::config("eval_per_train must be at least 1"));
        }
        if self.evaluation_eps == 0 {
            return Err(Error::config("evaluation_eps must be at least 1"));
        }
        if !self.threshold_return.is_finite() {
            return Err(Error::config(format!(
                "threshold_return must be finite, got {}",
                self.threshold_return
            )));
        }
        Ok(())
    }

    /// Number of evaluation blocks the run will execute.
    pub fn evaluation_blocks(&self) -> usize {
        self.training_eps / self.eval_per_train.max(1)
    }

    /// Checkpoint location for a qualifying evaluation.
    pub fn checkpoint_path(
        &self,
        episodes: usize,
        train_average_return: f64,
        eval_average_return: f64,
    ) -> PathBuf {
        self.save_dir.join(checkpoint_file_name(
            &self.env,
            self.algo,
            self.seed,
            episodes,
            train_average_return,
            eval_average_return,
        ))
    }

    /// Metric run directory, `{log_dir}/{env}/{algo}_s_{seed}_t_{timestamp}`.
    pub fn metrics_dir(&self, timestamp: &str) -> PathBuf {
        self.log_dir.join(&self.env).join(format!(
            "{}_s_{}_t_{}",
            self.algo, self.seed, timestamp
        ))
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|source| Error::Io {
            operation: format!("create config file {path:?}"),
            source,
        })?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// `{env}_{algo}_s_{seed}_ep_{episodes}_tr_{train}_er_{eval}.msgpack`
pub fn checkpoint_file_name(
    env: &str,
    algo: AgentKind,
    seed: u64,
    episodes: usize,
    train_average_return: f64,
    eval_average_return: f64,
) -> String {
    format!(
        "{env}_{algo}_s_{seed}_ep_{episodes}_tr_{}_er_{}.msgpack",
        format_rounded(train_average_return),
        format_rounded(eval_average_return)
    )
}
