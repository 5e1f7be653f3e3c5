//! Application layer with dependency injection container.
//!
//! The container owns infrastructure dependencies (checkpoint storage,
//! accelerator availability) and wires an experiment together:
//!
//! ```text
//! ExperimentConfig ──► RunContext {seed, device}
//!                        │
//!                        ├──► Environment (SingleCarEnv)
//!                        ├──► Agent (build_agent + optional warm start)
//!                        └──► MetricsSink (JSONL run directory or NullSink)
//!                                   │
//!                                   ▼
//!                             ExperimentLoop
//! ```
//!
//! # Usage
//!
//! ## Production
//!
//! ```no_run
//! use autodrive_rl::app::{App, ExperimentConfig};
//!
//! let app = App::new();
//! let config = ExperimentConfig::default();
//! let context = app.run_context(&config);
//! let mut agent = app.create_agent(&config, context)?;
//! let metrics = app.create_metrics_sink(&config)?;
//! let mut experiment = app.create_experiment(config, metrics.sink);
//! let summary = experiment.run(agent.as_mut())?;
//! # Ok::<(), autodrive_rl::Error>(())
//! ```
//!
//! ## Testing
//!
//! ```
//! use autodrive_rl::app::App;
//! use autodrive_rl::adapters::InMemoryCheckpointRepository;
//!
//! let app = App::for_testing()
//!     .with_repository(InMemoryCheckpointRepository::new())
//!     .build();
//! ```

pub mod config;
pub mod container;

pub use config::{Device, ExperimentConfig, RunContext, checkpoint_file_name};
pub use container::{App, AppBuilder, MetricsSetup};
