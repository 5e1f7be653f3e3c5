//! Shared test doubles for the integration suite.

#![allow(dead_code)]

use autodrive_rl::{
    AgentKind, EpisodeResult, Result,
    agents::GaussianPolicy,
    ports::{Agent, Diagnostics},
    utils::build_rng,
};

/// Agent replaying fixed returns.
///
/// Training episode `k` (1-based) returns `train_returns[(k - 1) % len]` and
/// collides when `train_collisions` says so. Every episode of evaluation
/// block `b` (1-based) returns `eval_returns[(b - 1) % len]`.
pub struct ScriptedAgent {
    pub train_returns: Vec<f64>,
    pub train_collisions: Vec<bool>,
    pub eval_returns: Vec<f64>,
    pub eval_collision_every: Option<usize>,
    pub steps_per_episode: usize,
    /// Evaluation mode observed at each `run` call
    pub modes: Vec<bool>,
    policy: GaussianPolicy,
    logger: Diagnostics,
    eval_mode: bool,
    train_runs: usize,
    eval_runs: usize,
    eval_blocks: usize,
}

impl ScriptedAgent {
    pub fn new(train_returns: Vec<f64>, eval_returns: Vec<f64>) -> Self {
        let mut rng = build_rng(0);
        Self {
            train_returns,
            train_collisions: vec![false],
            eval_returns,
            eval_collision_every: None,
            steps_per_episode: 10,
            modes: Vec::new(),
            policy: GaussianPolicy::new(14, 1, 15.0, -0.5, &mut rng),
            logger: Diagnostics::from([("LossQ".to_string(), 0.5)]),
            eval_mode: false,
            train_runs: 0,
            eval_runs: 0,
            eval_blocks: 0,
        }
    }

    pub fn with_train_collisions(mut self, collisions: Vec<bool>) -> Self {
        self.train_collisions = collisions;
        self
    }

    pub fn train_runs(&self) -> usize {
        self.train_runs
    }

    pub fn eval_runs(&self) -> usize {
        self.eval_runs
    }
}

impl Agent for ScriptedAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Td3
    }

    fn eval_mode(&self) -> bool {
        self.eval_mode
    }

    fn set_eval_mode(&mut self, eval_mode: bool) {
        if eval_mode && !self.eval_mode {
            self.eval_blocks += 1;
        }
        self.eval_mode = eval_mode;
    }

    fn run(&mut self, max_steps: usize) -> Result<EpisodeResult> {
        self.modes.push(self.eval_mode);
        let steps = self.steps_per_episode.min(max_steps);
        if self.eval_mode {
            self.eval_runs += 1;
            let value = self.eval_returns[(self.eval_blocks - 1) % self.eval_returns.len()];
            let collision = self
                .eval_collision_every
                .is_some_and(|n| self.eval_runs.is_multiple_of(n));
            Ok(EpisodeResult::new(steps, value, collision))
        } else {
            let i = self.train_runs;
            self.train_runs += 1;
            Ok(EpisodeResult::new(
                steps,
                self.train_returns[i % self.train_returns.len()],
                self.train_collisions[i % self.train_collisions.len()],
            ))
        }
    }

    fn logger(&self) -> &Diagnostics {
        &self.logger
    }

    fn policy(&self) -> &GaussianPolicy {
        &self.policy
    }

    fn load_policy(&mut self, policy: GaussianPolicy) -> Result<()> {
        self.policy = policy;
        Ok(())
    }
}
