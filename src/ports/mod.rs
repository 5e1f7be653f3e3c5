//! Ports (trait boundaries) for external collaborators.
//!
//! The experiment loop only talks to agents, environments, metric sinks and
//! checkpoint storage through these traits. Concrete implementations live in
//! `agents`, `simulator` and `adapters`.

pub mod agent;
pub mod checkpoint;
pub mod environment;
pub mod metrics;
pub mod observer;

pub use agent::{Agent, Diagnostics};
pub use checkpoint::CheckpointRepository;
pub use environment::{Environment, Transition};
pub use metrics::{MetricsSink, NullSink, ScalarRecord};
pub use observer::Observer;
