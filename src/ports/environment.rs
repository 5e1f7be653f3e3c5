//! Environment port - reset/step semantics of the driving simulator.

use crate::Result;

/// Result of one environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Vec<f64>,
    pub reward: f64,
    /// Terminal state reached (collision or end of route); not set on
    /// truncation by a step limit
    pub done: bool,
    pub collision: bool,
}

/// Environment trait.
///
/// Observations have a fixed dimensionality and actions are bounded to
/// `[-action_limit, action_limit]` per dimension. Calling
/// [`step`](Environment::step) before [`reset`](Environment::reset), or after
/// a terminal transition, is an error.
pub trait Environment: Send {
    fn observation_dim(&self) -> usize;

    fn action_dim(&self) -> usize;

    fn action_limit(&self) -> f64;

    /// Start a new episode and return the first observation.
    fn reset(&mut self) -> Result<Vec<f64>>;

    /// Apply `action` for one simulation step.
    fn step(&mut self, action: &[f64]) -> Result<Transition>;
}
