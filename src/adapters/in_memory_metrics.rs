//! Scalar sink that keeps every record in memory.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    Result,
    ports::{MetricsSink, ScalarRecord},
};

/// Collects scalars in a shared vector.
///
/// Clones share storage: hand one to the experiment loop and inspect the
/// other afterwards.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScalarSink {
    records: Arc<Mutex<Vec<ScalarRecord>>>,
}

impl InMemoryScalarSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ScalarRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every record in emission order.
    pub fn records(&self) -> Vec<ScalarRecord> {
        self.lock().clone()
    }

    /// `(step, value)` pairs for one tag, in emission order.
    pub fn by_tag(&self, tag: &str) -> Vec<(i64, f64)> {
        self.lock()
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| (r.step, r.value))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl MetricsSink for InMemoryScalarSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: i64) -> Result<()> {
        self.lock().push(ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
        });
        Ok(())
    }
}
