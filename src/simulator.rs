//! In-process traffic simulation
//!
//! The experiment driver talks to environments only through the
//! [`Environment`](crate::ports::Environment) port. This module provides the
//! built-in scenario: a single controlled car on a one-lane road between a
//! leader and an IDM follower.

pub mod single_car;

pub use single_car::{SingleCarConfig, SingleCarEnv};

/// Observation dimensionality of the driving scenario.
pub const OBSERVATION_DIM: usize = 14;

/// Action dimensionality of the driving scenario.
pub const ACTION_DIM: usize = 1;

/// Symmetric bound on the raw action.
pub const ACTION_LIMIT: f64 = 15.0;
