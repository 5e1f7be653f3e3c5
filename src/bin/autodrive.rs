//! autodrive CLI - reinforcement-learning experiments for single-car driving control
//!
//! This CLI provides:
//! - Training any supported algorithm with periodic evaluation and checkpoints
//! - Evaluating saved policy checkpoints

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autodrive")]
#[command(version, about = "RL experiment driver for autonomous driving control", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train an agent with periodic evaluation
    Train(Box<autodrive_rl::cli::commands::train::TrainArgs>),

    /// Evaluate a saved policy checkpoint
    Evaluate(autodrive_rl::cli::commands::evaluate::EvaluateArgs),
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,autodrive_rl=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Train(args) => autodrive_rl::cli::commands::train::execute(*args),
        Commands::Evaluate(args) => autodrive_rl::cli::commands::evaluate::execute(args),
    }
}
