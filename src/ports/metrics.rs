//! Metrics port - scalar time series keyed by tag and step.

use serde::{Deserialize, Serialize};

use crate::Result;

/// One scalar point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    /// `Namespace/Name`, e.g. `Train/AverageReturns`
    pub tag: String,
    pub value: f64,
    pub step: i64,
}

/// Sink for scalar metrics.
///
/// Writes are synchronous. A failing write is returned to the caller, which
/// does not retry.
pub trait MetricsSink: Send {
    fn add_scalar(&mut self, tag: &str, value: f64, step: i64) -> Result<()>;

    /// Flush buffered output, if any.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink used when metric logging is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn add_scalar(&mut self, _tag: &str, _value: f64, _step: i64) -> Result<()> {
        Ok(())
    }
}
