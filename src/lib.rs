//! Reinforcement-learning experiment driver for single-car autonomous driving
//!
//! This crate provides:
//! - A closed set of agents (VPG, NPG, TRPO, PPO, DDPG, TD3, SAC, ASAC, TAC,
//!   ATAC) behind one [`Agent`](ports::Agent) interface
//! - A built-in car-following environment with a 14-dimensional observation
//!   and a single bounded acceleration action
//! - The train/evaluate experiment loop with scalar metrics and
//!   threshold-triggered policy checkpoints
//! - A command-line front end

pub mod adapters;
pub mod agents;
pub mod app;
pub mod cli;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod simulator;
pub mod types;
pub mod utils;

pub use agents::{AgentKind, AgentOptions, LogType, build_agent};
pub use app::{App, ExperimentConfig};
pub use error::{Error, Result};
pub use pipeline::{ExperimentLoop, ExperimentSummary};
pub use types::{EpisodeResult, RunningAggregate};
