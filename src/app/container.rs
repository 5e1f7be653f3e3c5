//! Dependency injection container for experiment runs.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info, warn};

use super::{Device, ExperimentConfig, RunContext};
use crate::{
    Result,
    adapters::{JsonlScalarWriter, MsgPackCheckpointRepository},
    agents::{AgentParams, SavedPolicy, build_agent},
    pipeline::ExperimentLoop,
    ports::{Agent, CheckpointRepository, Environment, MetricsSink, NullSink},
    simulator::{SingleCarConfig, SingleCarEnv},
};

/// File name of the configuration snapshot written into each run directory.
pub const CONFIG_FILE: &str = "config.json";

/// Metric sink for a run together with the directory it writes to.
pub struct MetricsSetup {
    pub sink: Box<dyn MetricsSink>,
    /// `None` when metric logging is disabled
    pub dir: Option<PathBuf>,
}

/// Application with dependency injection.
///
/// # Examples
///
/// ```
/// use autodrive_rl::app::{App, ExperimentConfig};
///
/// let app = App::new();
/// let context = app.run_context(&ExperimentConfig::default());
/// assert_eq!(context.seed, 0);
/// ```
pub struct App {
    /// Repository for checkpoint persistence
    checkpoint_repository: Arc<dyn CheckpointRepository + Send + Sync>,
    /// Whether an accelerator backend can be used
    accelerator_available: bool,
    environment: SingleCarConfig,
}

impl App {
    /// Create a new app with production defaults.
    ///
    /// Uses `MsgPackCheckpointRepository` and runs on the host.
    pub fn new() -> Self {
        Self {
            checkpoint_repository: Arc::new(MsgPackCheckpointRepository::new()),
            accelerator_available: false,
            environment: SingleCarConfig::default(),
        }
    }

    /// Create a builder for constructing an app with custom dependencies.
    pub fn for_testing() -> AppBuilder {
        AppBuilder::new()
    }

    /// Get the checkpoint repository.
    pub fn checkpoint_repository(&self) -> Arc<dyn CheckpointRepository + Send + Sync> {
        Arc::clone(&self.checkpoint_repository)
    }

    /// Seed and device for a run.
    pub fn run_context(&self, config: &ExperimentConfig) -> RunContext {
        let device = Device::resolve(config.gpu_index, self.accelerator_available);
        RunContext::new(config.seed, device)
    }

    /// Create the driving environment, seeded from `context`.
    pub fn create_environment(
        &self,
        config: &ExperimentConfig,
        context: RunContext,
    ) -> Result<Box<dyn Environment>> {
        debug!(env = %config.env, seed = context.environment_seed(), "creating environment");
        let env = SingleCarEnv::try_new(self.environment.clone(), context.environment_seed())?;
        Ok(Box::new(env))
    }

    /// Create the agent selected by `config.algo`, warm-started from
    /// `config.model_path` when given.
    pub fn create_agent(
        &self,
        config: &ExperimentConfig,
        context: RunContext,
    ) -> Result<Box<dyn Agent>> {
        let env = self.create_environment(config, context)?;
        let mut options = config.algo.default_options();
        if let Some(path) = &config.model_path {
            options = options.with_warm_start(path.clone());
        }

        let mut agent = build_agent(config.algo, AgentParams::new(env, context), &options)?;
        info!(
            algo = %config.algo,
            seed = context.seed,
            device = %context.device,
            "agent created"
        );

        if let Some(path) = &options.warm_start {
            let saved = self.load_checkpoint(path)?;
            if saved.metadata.algo != config.algo {
                warn!(
                    saved = %saved.metadata.algo,
                    requested = %config.algo,
                    "warm-start checkpoint was trained with a different algorithm"
                );
            }
            agent.load_policy(saved.policy)?;
            info!(path = %path.display(), episodes = saved.metadata.episodes, "policy warm-started");
        }
        Ok(agent)
    }

    /// Open the metric sink for a run.
    ///
    /// With logging enabled this creates
    /// `{log_dir}/{env}/{algo}_s_{seed}_t_{timestamp}/`, writes the config
    /// snapshot into it and returns a JSONL writer. Otherwise returns a
    /// [`NullSink`].
    pub fn create_metrics_sink(&self, config: &ExperimentConfig) -> Result<MetricsSetup> {
        if !config.tensorboard {
            return Ok(MetricsSetup {
                sink: Box::new(NullSink),
                dir: None,
            });
        }
        let timestamp = chrono::Local::now()
            .format("%Y-%m-%d-%H-%M-%S")
            .to_string();
        let dir = config.metrics_dir(&timestamp);
        let writer = JsonlScalarWriter::create(&dir)?;
        config.save(&dir.join(CONFIG_FILE))?;
        info!(dir = %dir.display(), "logging metrics");
        Ok(MetricsSetup {
            sink: Box::new(writer),
            dir: Some(dir),
        })
    }

    /// Wire the experiment loop with this app's checkpoint repository.
    pub fn create_experiment(
        &self,
        config: ExperimentConfig,
        metrics: Box<dyn MetricsSink>,
    ) -> ExperimentLoop {
        ExperimentLoop::new(config, metrics, self.checkpoint_repository())
    }

    /// Load a checkpoint through the configured repository.
    pub fn load_checkpoint(&self, path: &Path) -> Result<SavedPolicy> {
        self.checkpoint_repository.load(path)
    }

    /// Rebuild the agent recorded in a checkpoint, with its saved policy,
    /// on a fresh environment seeded with `seed`.
    pub fn restore_agent(&self, path: &Path, seed: u64) -> Result<(Box<dyn Agent>, SavedPolicy)> {
        let saved = self.load_checkpoint(path)?;
        let config = ExperimentConfig {
            env: saved.metadata.env.clone(),
            algo: saved.metadata.algo,
            seed,
            ..ExperimentConfig::default()
        };
        let context = self.run_context(&config);
        let env = self.create_environment(&config, context)?;
        let kind = saved.metadata.algo;
        let mut agent = build_agent(kind, AgentParams::new(env, context), &kind.default_options())?;
        agent.load_policy(saved.policy.clone())?;
        Ok((agent, saved))
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing an app with custom dependencies.
pub struct AppBuilder {
    checkpoint_repository: Option<Arc<dyn CheckpointRepository + Send + Sync>>,
    accelerator_available: bool,
    environment: SingleCarConfig,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            checkpoint_repository: None,
            accelerator_available: false,
            environment: SingleCarConfig::default(),
        }
    }

    /// Set a custom checkpoint repository.
    pub fn with_repository<R: CheckpointRepository + Send + Sync + 'static>(
        mut self,
        repo: R,
    ) -> Self {
        self.checkpoint_repository = Some(Arc::new(repo));
        self
    }

    /// Pretend an accelerator is (or is not) present.
    pub fn with_accelerator(mut self, available: bool) -> Self {
        self.accelerator_available = available;
        self
    }

    /// Override the simulated scenario.
    pub fn with_environment(mut self, environment: SingleCarConfig) -> Self {
        self.environment = environment;
        self
    }

    pub fn build(self) -> App {
        App {
            checkpoint_repository: self
                .checkpoint_repository
                .unwrap_or_else(|| Arc::new(MsgPackCheckpointRepository::new())),
            accelerator_available: self.accelerator_available,
            environment: self.environment,
        }
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{
        adapters::InMemoryCheckpointRepository,
        agents::{AgentKind, CheckpointMetadata},
    };

    fn saved_for(app: &App, kind: AgentKind) -> SavedPolicy {
        let config = ExperimentConfig {
            algo: kind,
            seed: 99,
            ..ExperimentConfig::default()
        };
        let agent = app.create_agent(&config, app.run_context(&config)).unwrap();
        SavedPolicy::new(
            CheckpointMetadata {
                env: "sumo".to_string(),
                algo: kind,
                seed: 99,
                episodes: 200,
                train_average_return: 1.0,
                eval_average_return: 16.0,
                saved_at: None,
            },
            agent.policy().clone(),
        )
    }

    #[test]
    fn device_falls_back_to_host() {
        let config = ExperimentConfig {
            gpu_index: 3,
            ..ExperimentConfig::default()
        };
        assert_eq!(App::new().run_context(&config).device, Device::Cpu);

        let gpu_app = App::for_testing().with_accelerator(true).build();
        assert_eq!(gpu_app.run_context(&config).device, Device::Gpu(3));
    }

    #[test]
    fn warm_start_loads_saved_policy() {
        let repo = InMemoryCheckpointRepository::new();
        let app = App::for_testing().with_repository(repo.clone()).build();
        let saved = saved_for(&app, AgentKind::Sac);
        repo.save(&saved, Path::new("warm.msgpack")).unwrap();

        let config = ExperimentConfig {
            algo: AgentKind::Sac,
            seed: 1,
            model_path: Some(PathBuf::from("warm.msgpack")),
            ..ExperimentConfig::default()
        };
        let agent = app.create_agent(&config, app.run_context(&config)).unwrap();
        assert_eq!(agent.policy(), &saved.policy);
    }

    #[test]
    fn missing_warm_start_fails_before_training() {
        let app = App::for_testing()
            .with_repository(InMemoryCheckpointRepository::new())
            .build();
        let config = ExperimentConfig {
            model_path: Some(PathBuf::from("absent.msgpack")),
            ..ExperimentConfig::default()
        };
        assert!(app.create_agent(&config, app.run_context(&config)).is_err());
    }

    #[test]
    fn disabled_logging_uses_null_sink() {
        let temp_dir = TempDir::new().unwrap();
        let config = ExperimentConfig {
            tensorboard: false,
            log_dir: temp_dir.path().join("runs"),
            ..ExperimentConfig::default()
        };
        let setup = App::new().create_metrics_sink(&config).unwrap();
        assert!(setup.dir.is_none());
        assert!(!temp_dir.path().join("runs").exists());
    }

    #[test]
    fn enabled_logging_creates_run_directory() {
        let temp_dir = TempDir::new().unwrap();
        let config = ExperimentConfig {
            algo: AgentKind::Ppo,
            seed: 7,
            log_dir: temp_dir.path().join("runs"),
            ..ExperimentConfig::default()
        };
        let setup = App::new().create_metrics_sink(&config).unwrap();
        let dir = setup.dir.unwrap();
        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ppo_s_7_t_"), "{name}");
        assert_eq!(dir.parent().unwrap(), temp_dir.path().join("runs/sumo"));
        assert!(dir.join(CONFIG_FILE).exists());
    }

    #[test]
    fn restore_agent_uses_recorded_algorithm() {
        let repo = InMemoryCheckpointRepository::new();
        let app = App::for_testing().with_repository(repo.clone()).build();
        let saved = saved_for(&app, AgentKind::Trpo);
        repo.save(&saved, Path::new("trpo.msgpack")).unwrap();

        let (agent, loaded) = app.restore_agent(Path::new("trpo.msgpack"), 5).unwrap();
        assert_eq!(agent.kind(), AgentKind::Trpo);
        assert_eq!(agent.policy(), &loaded.policy);
    }
}
