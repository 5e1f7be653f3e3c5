//! Agent port - the uniform contract every RL algorithm implements.

use std::collections::BTreeMap;

use crate::{
    Result,
    agents::{AgentKind, GaussianPolicy},
    types::EpisodeResult,
};

/// Free-form auxiliary diagnostics an agent reports about its last update
/// (losses, KL, entropy coefficient, ...).
pub type Diagnostics = BTreeMap<String, f64>;

/// Agent trait - one interface over every algorithm family.
///
/// The agent owns its environment. Learning is implicit: a call to
/// [`run`](Agent::run) outside evaluation mode may update parameters as the
/// episode unfolds or when it ends.
///
/// # Examples
///
/// ```no_run
/// use autodrive_rl::ports::Agent;
///
/// fn evaluate(agent: &mut dyn Agent, episodes: usize) -> autodrive_rl::Result<f64> {
///     agent.set_eval_mode(true);
///     let mut total = 0.0;
///     for _ in 0..episodes {
///         total += agent.run(200)?.episode_return;
///     }
///     Ok(total / episodes as f64)
/// }
/// ```
pub trait Agent: Send {
    /// Algorithm this agent implements.
    fn kind(&self) -> AgentKind;

    /// Whether parameter updates are currently disabled.
    fn eval_mode(&self) -> bool;

    /// Switch between learning and evaluation mode.
    fn set_eval_mode(&mut self, eval_mode: bool);

    /// Run one episode of at most `max_steps` environment steps.
    ///
    /// Exactly one [`EpisodeResult`] is produced per call.
    ///
    /// # Errors
    ///
    /// Propagates any environment failure.
    fn run(&mut self, max_steps: usize) -> Result<EpisodeResult>;

    /// Diagnostics from the most recent update.
    fn logger(&self) -> &Diagnostics;

    /// Current policy parameters.
    fn policy(&self) -> &GaussianPolicy;

    /// Replace the policy parameters, e.g. to warm-start from a checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`](crate::Error::DimensionMismatch)
    /// when the policy shape differs from the agent's.
    fn load_policy(&mut self, policy: GaussianPolicy) -> Result<()>;

    /// Entropy coefficient, for agents that tune it automatically.
    fn alpha(&self) -> Option<f64> {
        None
    }
}
