//! Observer port - abstraction for watching an experiment run
//!
//! Observers receive loop events without coupling the training loop to a
//! particular presentation (progress bars, console reports, ...).

use std::path::Path;

use crate::{
    Result,
    pipeline::{EvaluationReport, ExperimentSummary},
    types::{EpisodeResult, RunningAggregate},
};

/// Observer trait for monitoring an experiment
///
/// # Event Sequence
///
/// 1. `on_experiment_start(training_episodes)` - once
/// 2. For each training episode:
///    - `on_train_episode(episode, result, aggregate)`
///    - at evaluation boundaries: `on_evaluation_end(report)`, followed by
///      `on_checkpoint(path)` when the report qualified for a checkpoint
/// 3. `on_experiment_end(summary)` - once
///
/// # Examples
///
/// ```no_run
/// use autodrive_rl::{ports::Observer, pipeline::EvaluationReport};
///
/// struct BestReturn(f64);
///
/// impl Observer for BestReturn {
///     fn on_evaluation_end(&mut self, report: &EvaluationReport) -> autodrive_rl::Result<()> {
///         self.0 = self.0.max(report.eval_average_return);
///         Ok(())
///     }
/// }
/// ```
pub trait Observer: Send {
    /// Called once before the first episode.
    fn on_experiment_start(&mut self, _training_episodes: usize) -> Result<()> {
        Ok(())
    }

    /// Called after every training episode (1-indexed).
    fn on_train_episode(
        &mut self,
        _episode: usize,
        _result: &EpisodeResult,
        _aggregate: &RunningAggregate,
    ) -> Result<()> {
        Ok(())
    }

    /// Called when an evaluation block finishes.
    fn on_evaluation_end(&mut self, _report: &EvaluationReport) -> Result<()> {
        Ok(())
    }

    /// Called after a checkpoint file was written.
    fn on_checkpoint(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// Called once after the last episode.
    fn on_experiment_end(&mut self, _summary: &ExperimentSummary) -> Result<()> {
        Ok(())
    }
}
