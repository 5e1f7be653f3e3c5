//! Experiment pipeline
//!
//! This module provides the training/evaluation loop that drives an
//! [`Agent`](crate::ports::Agent), together with the observers that report
//! on its progress.

pub mod experiment;
pub mod observers;

pub use experiment::{EvaluationReport, ExperimentLoop, ExperimentSummary, tags};
pub use observers::{ConsoleReportObserver, ProgressObserver, RecordingObserver};

pub use crate::ports::Observer;
