//! Observer implementations for experiment runs
//!
//! Observers allow composable reporting during an experiment without
//! coupling the loop to specific output formats.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use indicatif::{ProgressBar, ProgressStyle};

use super::{EvaluationReport, ExperimentSummary};
use crate::{
    Result,
    cli::output::{format_diagnostics, print_kv, print_section},
    ports::Observer,
    types::{EpisodeResult, RunningAggregate},
    utils::format_rounded,
};

/// Progress bar over training episodes.
pub struct ProgressObserver {
    progress_bar: Option<ProgressBar>,
    last_eval: Option<f64>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self {
            progress_bar: None,
            last_eval: None,
        }
    }

    fn message(&self, aggregate: &RunningAggregate) -> String {
        match self.last_eval {
            Some(eval) => format!(
                "avg {:.2} | eval {:.2}",
                aggregate.average_return(),
                eval
            ),
            None => format!("avg {:.2}", aggregate.average_return()),
        }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for ProgressObserver {
    fn on_experiment_start(&mut self, training_episodes: usize) -> Result<()> {
        let pb = ProgressBar::new(training_episodes as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} episodes ({msg})")
                .map_err(|e| crate::Error::ProgressBarTemplate {
                    message: e.to_string(),
                })?
                .progress_chars("=>-"),
        );
        self.progress_bar = Some(pb);
        Ok(())
    }

    fn on_train_episode(
        &mut self,
        episode: usize,
        _result: &EpisodeResult,
        aggregate: &RunningAggregate,
    ) -> Result<()> {
        if let Some(pb) = &self.progress_bar {
            pb.set_position(episode as u64);
            pb.set_message(self.message(aggregate));
        }
        Ok(())
    }

    fn on_evaluation_end(&mut self, report: &EvaluationReport) -> Result<()> {
        self.last_eval = Some(report.eval_average_return);
        Ok(())
    }

    fn on_checkpoint(&mut self, path: &Path) -> Result<()> {
        if let Some(pb) = &self.progress_bar {
            pb.println(format!("checkpoint: {}", path.display()));
        }
        Ok(())
    }

    fn on_experiment_end(&mut self, summary: &ExperimentSummary) -> Result<()> {
        if let Some(pb) = &self.progress_bar {
            pb.finish_with_message(self.message(&summary.train));
        }
        Ok(())
    }
}

/// Prints the per-evaluation report to stdout.
#[derive(Debug, Default)]
pub struct ConsoleReportObserver;

impl ConsoleReportObserver {
    pub fn new() -> Self {
        Self
    }
}

impl ConsoleReportObserver {
    /// Label/value pairs printed for one evaluation block.
    pub fn report_fields(report: &EvaluationReport) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("Steps", report.train_steps.to_string()),
            ("Episodes", report.train_episodes.to_string()),
            ("AverageReturn", format_rounded(report.train_average_return)),
            ("EvalEpisodes", report.eval_episodes.to_string()),
            ("EvalAverageReturn", format_rounded(report.eval_average_return)),
            ("CollisionRate", format_rounded(report.eval_collision_rate)),
            ("OtherLogs", format_diagnostics(&report.diagnostics)),
            ("Time", (report.elapsed_secs as u64).to_string()),
        ];
        if let Some(path) = &report.checkpoint {
            fields.push(("Checkpoint", path.display().to_string()));
        }
        fields
    }
}

impl Observer for ConsoleReportObserver {
    fn on_evaluation_end(&mut self, report: &EvaluationReport) -> Result<()> {
        print_section(&format!("Evaluation {}", report.block));
        for (label, value) in Self::report_fields(report) {
            print_kv(label, &value);
        }
        Ok(())
    }
}

/// Records every report it sees, for inspection after a run.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    reports: Arc<Mutex<Vec<EvaluationReport>>>,
    checkpoints: Arc<Mutex<Vec<PathBuf>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<EvaluationReport> {
        self.reports
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn checkpoints(&self) -> Vec<PathBuf> {
        self.checkpoints
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl Observer for RecordingObserver {
    fn on_evaluation_end(&mut self, report: &EvaluationReport) -> Result<()> {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
        Ok(())
    }

    fn on_checkpoint(&mut self, path: &Path) -> Result<()> {
        if let Ok(mut checkpoints) = self.checkpoints.lock() {
            checkpoints.push(path.to_path_buf());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Diagnostics;

    fn report(checkpoint: Option<&str>) -> EvaluationReport {
        EvaluationReport {
            block: 1,
            episode: 200,
            train_steps: 4000,
            train_episodes: 200,
            train_average_return: 3.14159,
            train_collision_rate: 0.1,
            eval_episodes: 200,
            eval_average_return: 16.0,
            eval_collision_rate: 0.0,
            diagnostics: Diagnostics::from([("LossQ".to_string(), 0.25)]),
            elapsed_secs: 12.7,
            checkpoint: checkpoint.map(Into::into),
        }
    }

    #[test]
    fn recording_observer_shares_state_between_clones() {
        let observer = RecordingObserver::new();
        let mut handle = observer.clone();
        handle.on_evaluation_end(&report(Some("x.msgpack"))).unwrap();
        handle.on_checkpoint(Path::new("x.msgpack")).unwrap();

        assert_eq!(observer.reports().len(), 1);
        assert_eq!(observer.checkpoints(), vec![PathBuf::from("x.msgpack")]);
    }

    #[test]
    fn console_report_does_not_fail() {
        let mut observer = ConsoleReportObserver::new();
        observer.on_evaluation_end(&report(None)).unwrap();
        observer.on_evaluation_end(&report(Some("a.msgpack"))).unwrap();
    }

    #[test]
    fn report_values_keep_one_fractional_digit() {
        let fields = ConsoleReportObserver::report_fields(&report(Some("a.msgpack")));
        let value = |label: &str| {
            fields
                .iter()
                .find(|(l, _)| *l == label)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(value("AverageReturn"), "3.14");
        assert_eq!(value("EvalAverageReturn"), "16.0");
        assert_eq!(value("CollisionRate"), "0.0");
        assert_eq!(value("Time"), "12");
        assert_eq!(value("Checkpoint"), "a.msgpack");
        assert!(
            ConsoleReportObserver::report_fields(&report(None))
                .iter()
                .all(|(l, _)| *l != "Checkpoint")
        );
    }

    #[test]
    fn progress_message_includes_last_evaluation() {
        let mut observer = ProgressObserver::new();
        let mut aggregate = RunningAggregate::new();
        aggregate.record(&EpisodeResult::new(1, 2.0, false));
        assert_eq!(observer.message(&aggregate), "avg 2.00");
        observer.on_evaluation_end(&report(None)).unwrap();
        assert_eq!(observer.message(&aggregate), "avg 2.00 | eval 16.00");
    }
}
