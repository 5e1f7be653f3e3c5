//! On-policy policy-gradient agents: VPG, NPG, TRPO and PPO.
//!
//! All four share rollout collection, GAE advantages and a linear value
//! baseline; they differ only in how the policy gradient is turned into a
//! parameter update.

use rand::rngs::StdRng;
use tracing::debug;

use super::{AgentKind, AgentParams, GaussianPolicy, LinearValue};
use crate::{
    Result,
    ports::{Agent, Diagnostics, Environment},
    types::EpisodeResult,
    utils::{build_rng, mean, std_dev},
};

/// How the policy gradient becomes a parameter step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyUpdateRule {
    /// Plain gradient ascent
    Vanilla,
    /// Natural gradient step scaled to a KL radius
    Natural,
    /// Natural gradient step with a backtracking line search on the KL
    /// constraint and surrogate improvement
    TrustRegion,
    /// Several epochs of ascent on the clipped surrogate
    Proximal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnPolicyConfig {
    pub gamma: f64,
    /// GAE smoothing
    pub lam: f64,
    /// Minimum number of steps collected before an update
    pub sample_size: usize,
    pub policy_lr: f64,
    /// KL radius for NPG/TRPO, early-stop threshold for PPO
    pub max_kl: f64,
    pub fisher_damping: f64,
    pub backtrack_iters: usize,
    pub backtrack_coeff: f64,
    pub clip_param: f64,
    pub ppo_epochs: usize,
    pub value_ridge: f64,
    pub init_log_std: f64,
}

impl Default for OnPolicyConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            lam: 0.97,
            sample_size: 1000,
            policy_lr: 0.01,
            max_kl: 0.01,
            fisher_damping: 0.1,
            backtrack_iters: 10,
            backtrack_coeff: 0.5,
            clip_param: 0.2,
            ppo_epochs: 10,
            value_ridge: 1e-3,
            init_log_std: -0.5,
        }
    }
}

struct RolloutStep {
    features: Vec<f64>,
    pre_tanh: Vec<f64>,
    log_prob: f64,
    reward: f64,
    value: f64,
}

/// Completed trajectories waiting for the next update.
#[derive(Default)]
struct RolloutBuffer {
    features: Vec<Vec<f64>>,
    pre_tanh: Vec<Vec<f64>>,
    log_probs: Vec<f64>,
    advantages: Vec<f64>,
    returns: Vec<f64>,
}

impl RolloutBuffer {
    fn len(&self) -> usize {
        self.log_probs.len()
    }

    fn finish_trajectory(&mut self, steps: Vec<RolloutStep>, last_value: f64, gamma: f64, lam: f64) {
        let mut advantages = vec![0.0; steps.len()];
        let mut next_value = last_value;
        let mut running = 0.0;
        for (t, step) in steps.iter().enumerate().rev() {
            let delta = step.reward + gamma * next_value - step.value;
            running = delta + gamma * lam * running;
            advantages[t] = running;
            next_value = step.value;
        }
        for (step, advantage) in steps.into_iter().zip(advantages) {
            self.returns.push(advantage + step.value);
            self.advantages.push(advantage);
            self.features.push(step.features);
            self.pre_tanh.push(step.pre_tanh);
            self.log_probs.push(step.log_prob);
        }
    }

    fn normalized_advantages(&self) -> Vec<f64> {
        let m = mean(&self.advantages);
        let s = std_dev(&self.advantages);
        self.advantages.iter().map(|a| (a - m) / (s + 1e-8)).collect()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

pub struct OnPolicyAgent {
    kind: AgentKind,
    rule: PolicyUpdateRule,
    config: OnPolicyConfig,
    env: Box<dyn Environment>,
    policy: GaussianPolicy,
    value: LinearValue,
    rng: StdRng,
    eval_mode: bool,
    buffer: RolloutBuffer,
    logger: Diagnostics,
}

impl OnPolicyAgent {
    pub fn new(
        kind: AgentKind,
        rule: PolicyUpdateRule,
        params: AgentParams,
        config: OnPolicyConfig,
    ) -> Self {
        let mut rng = build_rng(params.context.agent_seed());
        let policy = GaussianPolicy::new(
            params.obs_dim,
            params.act_dim,
            params.act_limit,
            config.init_log_std,
            &mut rng,
        );
        let value = LinearValue::new(policy.feature_dim(), config.value_ridge);
        Self {
            kind,
            rule,
            config,
            env: params.env,
            policy,
            value,
            rng,
            eval_mode: false,
            buffer: RolloutBuffer::default(),
            logger: Diagnostics::new(),
        }
    }

    pub fn rule(&self) -> PolicyUpdateRule {
        self.rule
    }

    /// Steps collected since the last update.
    pub fn pending_steps(&self) -> usize {
        self.buffer.len()
    }

    fn surrogate(&self, policy: &GaussianPolicy, advantages: &[f64]) -> f64 {
        let total: f64 = self
            .buffer
            .features
            .iter()
            .zip(&self.buffer.pre_tanh)
            .zip(&self.buffer.log_probs)
            .zip(advantages)
            .map(|(((f, u), lp_old), a)| (policy.log_prob(f, u) - lp_old).exp() * a)
            .sum();
        total / advantages.len().max(1) as f64
    }

    fn policy_gradient(&self, advantages: &[f64]) -> (Vec<f64>, Vec<Vec<f64>>) {
        let n = advantages.len() as f64;
        let mut grad = vec![0.0; self.policy.num_params()];
        let mut scores = Vec::with_capacity(advantages.len());
        for ((f, u), a) in self
            .buffer
            .features
            .iter()
            .zip(&self.buffer.pre_tanh)
            .zip(advantages)
        {
            let score = self.policy.score(f, u);
            for (g, s) in grad.iter_mut().zip(&score) {
                *g += a * s / n;
            }
            scores.push(score);
        }
        (grad, scores)
    }

    /// Diagonal-Fisher natural direction and the step length that puts the
    /// quadratic KL estimate on the configured radius.
    fn natural_step(&self, grad: &[f64], scores: &[Vec<f64>]) -> (Vec<f64>, f64) {
        let n = scores.len().max(1) as f64;
        let mut fisher = vec![self.config.fisher_damping; grad.len()];
        for score in scores {
            for (f, s) in fisher.iter_mut().zip(score) {
                *f += s * s / n;
            }
        }
        let direction: Vec<f64> = grad.iter().zip(&fisher).map(|(g, f)| g / f).collect();
        let shs: f64 = grad.iter().zip(&direction).map(|(g, d)| g * d).sum();
        let step = (2.0 * self.config.max_kl / shs.max(1e-12)).sqrt();
        (direction, step)
    }

    fn update(&mut self) -> Result<()> {
        let advantages = self.buffer.normalized_advantages();
        let old_policy = self.policy.clone();
        let (grad, scores) = self.policy_gradient(&advantages);

        match self.rule {
            PolicyUpdateRule::Vanilla => {
                self.policy.step(&grad, self.config.policy_lr)?;
            }
            PolicyUpdateRule::Natural => {
                let (direction, step) = self.natural_step(&grad, &scores);
                self.policy.step(&direction, step)?;
                self.logger.insert("StepSize".to_string(), step);
            }
            PolicyUpdateRule::TrustRegion => {
                let (direction, step) = self.natural_step(&grad, &scores);
                let baseline = self.surrogate(&old_policy, &advantages);
                let mut accepted = None;
                for i in 0..self.config.backtrack_iters {
                    let fraction = self.config.backtrack_coeff.powi(i as i32);
                    let mut candidate = old_policy.clone();
                    candidate.step(&direction, step * fraction)?;
                    let kl = old_policy.kl_divergence(&candidate, &self.buffer.features);
                    let improvement = self.surrogate(&candidate, &advantages) - baseline;
                    if kl <= self.config.max_kl && improvement > 0.0 {
                        accepted = Some((candidate, i));
                        break;
                    }
                }
                match accepted {
                    Some((candidate, backtracks)) => {
                        self.policy = candidate;
                        self.logger
                            .insert("Backtracks".to_string(), backtracks as f64);
                    }
                    None => debug!(kind = %self.kind, "line search rejected every step"),
                }
            }
            PolicyUpdateRule::Proximal => self.proximal_update(&advantages)?,
        }

        let value_loss = self
            .value
            .fit(&self.buffer.features, &self.buffer.returns);

        let kl = old_policy.kl_divergence(&self.policy, &self.buffer.features);
        let surrogate = self.surrogate(&self.policy, &advantages);
        self.logger.insert("LossPi".to_string(), -surrogate);
        self.logger.insert("LossV".to_string(), value_loss);
        self.logger.insert("KL".to_string(), kl);
        self.logger
            .insert("Entropy".to_string(), self.policy.entropy());
        debug!(kind = %self.kind, samples = advantages.len(), kl, value_loss, "policy update");

        self.buffer.clear();
        Ok(())
    }

    fn proximal_update(&mut self, advantages: &[f64]) -> Result<()> {
        let n = advantages.len() as f64;
        let eps = self.config.clip_param;
        for _ in 0..self.config.ppo_epochs {
            let mut grad = vec![0.0; self.policy.num_params()];
            let mut approx_kl = 0.0;
            for (((f, u), lp_old), a) in self
                .buffer
                .features
                .iter()
                .zip(&self.buffer.pre_tanh)
                .zip(&self.buffer.log_probs)
                .zip(advantages)
            {
                let lp_new = self.policy.log_prob(f, u);
                approx_kl += (lp_old - lp_new) / n;
                let ratio = (lp_new - lp_old).exp();
                let clipped = (*a > 0.0 && ratio > 1.0 + eps) || (*a < 0.0 && ratio < 1.0 - eps);
                if !clipped {
                    for (g, s) in grad.iter_mut().zip(self.policy.score(f, u)) {
                        *g += a * ratio * s / n;
                    }
                }
            }
            if approx_kl > 1.5 * self.config.max_kl {
                break;
            }
            self.policy.step(&grad, self.config.policy_lr)?;
        }
        Ok(())
    }
}

impl Agent for OnPolicyAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn eval_mode(&self) -> bool {
        self.eval_mode
    }

    fn set_eval_mode(&mut self, eval_mode: bool) {
        self.eval_mode = eval_mode;
    }

    fn run(&mut self, max_steps: usize) -> Result<EpisodeResult> {
        let mut obs = self.env.reset()?;
        let mut steps = 0;
        let mut episode_return = 0.0;
        let mut collision = false;
        let mut terminal = false;
        let mut trajectory = Vec::new();

        while steps < max_steps {
            let features = self.policy.features(&obs);
            let transition = if self.eval_mode {
                let action = self.policy.deterministic(&features);
                self.env.step(&self.policy.to_env_action(&action))?
            } else {
                let sample = self.policy.sample(&features, &mut self.rng);
                let transition = self
                    .env
                    .step(&self.policy.to_env_action(&sample.normalized_action))?;
                trajectory.push(RolloutStep {
                    value: self.value.value(&features),
                    features,
                    pre_tanh: sample.pre_tanh,
                    log_prob: sample.log_prob,
                    reward: transition.reward,
                });
                transition
            };

            steps += 1;
            episode_return += transition.reward;
            collision |= transition.collision;
            obs = transition.observation;
            if transition.done {
                terminal = true;
                break;
            }
        }

        if !self.eval_mode && !trajectory.is_empty() {
            let last_value = if terminal {
                0.0
            } else {
                self.value.value(&self.policy.features(&obs))
            };
            self.buffer
                .finish_trajectory(trajectory, last_value, self.config.gamma, self.config.lam);
            if self.buffer.len() >= self.config.sample_size {
                self.update()?;
            }
        }

        Ok(EpisodeResult::new(steps, episode_return, collision))
    }

    fn logger(&self) -> &Diagnostics {
        &self.logger
    }

    fn policy(&self) -> &GaussianPolicy {
        &self.policy
    }

    fn load_policy(&mut self, policy: GaussianPolicy) -> Result<()> {
        self.policy.ensure_same_shape(&policy)?;
        self.policy = policy;
        Ok(())
    }
}
