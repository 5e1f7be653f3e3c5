//! Off-policy actor-critic agents: DDPG, TD3 and the soft actor-critic
//! family (SAC, ASAC, TAC, ATAC).
//!
//! Every variant stores transitions in a replay buffer and takes one
//! critic/actor update per environment step once a full batch is available.
//! Critics are [`LinearCritic`]s, so the actor gradient `∂Q/∂a` is exact.

use rand::{Rng, rngs::StdRng};
use rand_distr::StandardNormal;

use super::{
    AgentKind, AgentOptions, AgentParams, GaussianPolicy, LinearCritic, LogType, ReplayBuffer,
    StoredTransition,
};
use crate::{
    Error, Result,
    ports::{Agent, Diagnostics, Environment},
    types::EpisodeResult,
    utils::{build_rng, mean},
};

/// Entropy regularisation of the soft actor-critic family.
///
/// The penalty applied to a log-density `lp` is the ordinary log for
/// `LogType::Log` and `(π^(q-1) - 1) / (q - 1)` with `π = exp(lp)` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct EntropyConfig {
    pub alpha: f64,
    pub automatic_entropy_tuning: bool,
    pub log_type: LogType,
    pub entropic_index: f64,
}

impl EntropyConfig {
    pub fn from_options(options: &AgentOptions) -> Result<Self> {
        if !(options.alpha.is_finite() && options.alpha >= 0.0) {
            return Err(Error::config(format!(
                "entropy coefficient must be non-negative, got {}",
                options.alpha
            )));
        }
        if options.automatic_entropy_tuning && options.alpha == 0.0 {
            return Err(Error::config(
                "automatic entropy tuning needs a positive initial alpha",
            ));
        }
        if !(options.entropic_index.is_finite() && options.entropic_index > 0.0) {
            return Err(Error::config(format!(
                "entropic index must be positive, got {}",
                options.entropic_index
            )));
        }
        Ok(Self {
            alpha: options.alpha,
            automatic_entropy_tuning: options.automatic_entropy_tuning,
            log_type: options.log_type,
            entropic_index: options.entropic_index,
        })
    }

    fn q_minus_one(&self) -> Option<f64> {
        match self.log_type {
            LogType::Log => None,
            LogType::LogQ => {
                let k = self.entropic_index - 1.0;
                (k.abs() > 1e-12).then_some(k)
            }
        }
    }

    /// Entropy penalty for a sample with log-density `log_prob`.
    pub fn penalty(&self, log_prob: f64) -> f64 {
        match self.q_minus_one() {
            None => log_prob,
            Some(k) => ((k * log_prob).min(50.0).exp() - 1.0) / k,
        }
    }

    /// `d penalty / d log_prob`
    pub fn penalty_slope(&self, log_prob: f64) -> f64 {
        match self.q_minus_one() {
            None => 1.0,
            Some(k) => (k * log_prob).min(50.0).exp(),
        }
    }
}

/// Which actor-critic variant drives the update.
#[derive(Debug, Clone, PartialEq)]
pub enum ActorCriticRule {
    /// Single critic, deterministic actor, Gaussian exploration noise
    Ddpg,
    /// Twin critics, target smoothing, delayed actor updates
    Td3,
    /// Stochastic actor with entropy regularisation
    Sac(EntropyConfig),
}

impl ActorCriticRule {
    fn critic_count(&self) -> usize {
        match self {
            ActorCriticRule::Ddpg => 1,
            ActorCriticRule::Td3 | ActorCriticRule::Sac(_) => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OffPolicyConfig {
    pub gamma: f64,
    /// Polyak coefficient for target networks
    pub tau: f64,
    pub buffer_size: usize,
    pub batch_size: usize,
    pub actor_lr: f64,
    pub critic_lr: f64,
    pub alpha_lr: f64,
    /// Exploration noise std for the deterministic actors
    pub act_noise: f64,
    pub target_noise: f64,
    pub noise_clip: f64,
    pub policy_delay: usize,
    pub init_log_std: f64,
}

impl Default for OffPolicyConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            tau: 0.005,
            buffer_size: 100_000,
            batch_size: 64,
            actor_lr: 1e-3,
            critic_lr: 1e-2,
            alpha_lr: 1e-3,
            act_noise: 0.1,
            target_noise: 0.2,
            noise_clip: 0.5,
            policy_delay: 2,
            init_log_std: -0.5,
        }
    }
}

pub struct OffPolicyAgent {
    kind: AgentKind,
    rule: ActorCriticRule,
    config: OffPolicyConfig,
    env: Box<dyn Environment>,
    policy: GaussianPolicy,
    target_policy: GaussianPolicy,
    critics: Vec<LinearCritic>,
    target_critics: Vec<LinearCritic>,
    replay: ReplayBuffer,
    rng: StdRng,
    eval_mode: bool,
    logger: Diagnostics,
    updates: usize,
    log_alpha: f64,
}

impl OffPolicyAgent {
    pub fn new(
        kind: AgentKind,
        rule: ActorCriticRule,
        params: AgentParams,
        config: OffPolicyConfig,
    ) -> Self {
        let mut rng = build_rng(params.context.agent_seed());
        let policy = GaussianPolicy::new(
            params.obs_dim,
            params.act_dim,
            params.act_limit,
            config.init_log_std,
            &mut rng,
        );
        let critics =
            vec![LinearCritic::new(policy.feature_dim(), params.act_dim); rule.critic_count()];
        let log_alpha = match &rule {
            ActorCriticRule::Sac(entropy) if entropy.automatic_entropy_tuning => {
                entropy.alpha.ln()
            }
            _ => 0.0,
        };
        Self {
            kind,
            config: config.clone(),
            env: params.env,
            target_policy: policy.clone(),
            policy,
            target_critics: critics.clone(),
            critics,
            replay: ReplayBuffer::new(config.buffer_size),
            rng,
            eval_mode: false,
            logger: Diagnostics::new(),
            updates: 0,
            log_alpha,
            rule,
        }
    }

    pub fn rule(&self) -> &ActorCriticRule {
        &self.rule
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    /// Number of gradient updates taken so far.
    pub fn updates(&self) -> usize {
        self.updates
    }

    fn current_alpha(&self) -> f64 {
        match &self.rule {
            ActorCriticRule::Sac(entropy) if entropy.automatic_entropy_tuning => {
                self.log_alpha.exp()
            }
            ActorCriticRule::Sac(entropy) => entropy.alpha,
            _ => 0.0,
        }
    }

    fn select_action(&mut self, features: &[f64]) -> Vec<f64> {
        if self.eval_mode {
            return self.policy.deterministic(features);
        }
        match self.rule {
            ActorCriticRule::Sac(_) => {
                self.policy
                    .sample(features, &mut self.rng)
                    .normalized_action
            }
            ActorCriticRule::Ddpg | ActorCriticRule::Td3 => self
                .policy
                .deterministic(features)
                .into_iter()
                .map(|a| {
                    let noise = self.config.act_noise * self.rng.sample::<f64, _>(StandardNormal);
                    (a + noise).clamp(-1.0, 1.0)
                })
                .collect(),
        }
    }

    fn min_target_q(&self, features: &[f64], action: &[f64]) -> f64 {
        self.target_critics
            .iter()
            .map(|critic| critic.value(features, action))
            .fold(f64::INFINITY, f64::min)
    }

    fn bootstrap_target(&mut self, transition: &StoredTransition) -> f64 {
        let next = &transition.next_features;
        let next_value = match &self.rule {
            ActorCriticRule::Ddpg => {
                let action = self.target_policy.deterministic(next);
                self.target_critics[0].value(next, &action)
            }
            ActorCriticRule::Td3 => {
                let clip = self.config.noise_clip;
                let action: Vec<f64> = self
                    .target_policy
                    .deterministic(next)
                    .into_iter()
                    .map(|a| {
                        let noise = (self.config.target_noise
                            * self.rng.sample::<f64, _>(StandardNormal))
                        .clamp(-clip, clip);
                        (a + noise).clamp(-1.0, 1.0)
                    })
                    .collect();
                self.min_target_q(next, &action)
            }
            ActorCriticRule::Sac(entropy) => {
                let entropy = entropy.clone();
                let sample = self.policy.sample(next, &mut self.rng);
                self.min_target_q(next, &sample.normalized_action)
                    - self.current_alpha() * entropy.penalty(sample.log_prob)
            }
        };
        let not_done = if transition.done { 0.0 } else { 1.0 };
        transition.reward + self.config.gamma * not_done * next_value
    }

    fn update(&mut self) -> Result<()> {
        let batch: Vec<StoredTransition> = self
            .replay
            .sample(self.config.batch_size, &mut self.rng)
            .into_iter()
            .cloned()
            .collect();
        if batch.is_empty() {
            return Ok(());
        }
        self.updates += 1;

        let targets: Vec<f64> = batch.iter().map(|t| self.bootstrap_target(t)).collect();
        let mut critic_losses = Vec::with_capacity(self.critics.len());
        for critic in &mut self.critics {
            let regression: Vec<(Vec<f64>, f64)> = batch
                .iter()
                .zip(&targets)
                .map(|(t, y)| (critic.features(&t.features, &t.action), *y))
                .collect();
            critic_losses.push(critic.regress(&regression, self.config.critic_lr));
        }
        self.logger
            .insert("LossQ".to_string(), mean(&critic_losses));

        match self.rule.clone() {
            ActorCriticRule::Ddpg => {
                self.deterministic_actor_step(&batch);
                self.soft_update_targets(true);
            }
            ActorCriticRule::Td3 => {
                if self.updates.is_multiple_of(self.config.policy_delay.max(1)) {
                    self.deterministic_actor_step(&batch);
                    self.soft_update_targets(true);
                }
            }
            ActorCriticRule::Sac(entropy) => {
                self.soft_actor_step(&batch, &entropy);
                self.soft_update_targets(false);
            }
        }
        Ok(())
    }

    /// Ascend `Q(s, tanh(μ(s)))` through the first critic.
    fn deterministic_actor_step(&mut self, batch: &[StoredTransition]) {
        let n = batch.len() as f64;
        let feature_dim = self.policy.feature_dim();
        let act_dim = self.policy.act_dim();
        let mut grads = vec![vec![0.0; feature_dim]; act_dim];
        let mut q_total = 0.0;
        for transition in batch {
            let phi = &transition.features;
            let action = self.policy.deterministic(phi);
            q_total += self.critics[0].value(phi, &action);
            let dq = self.critics[0].action_gradient(phi, &action);
            for j in 0..act_dim {
                let scale = dq[j] * (1.0 - action[j] * action[j]) / n;
                for (g, f) in grads[j].iter_mut().zip(phi) {
                    *g += scale * f;
                }
            }
        }
        for (j, grad) in grads.iter().enumerate() {
            self.policy.step_row(j, grad, self.config.actor_lr);
        }
        self.logger.insert("LossPi".to_string(), -q_total / n);
    }

    /// Reparameterised descent on `α·penalty(log π(a|s)) - min Q(s, a)`.
    fn soft_actor_step(&mut self, batch: &[StoredTransition], entropy: &EntropyConfig) {
        let n = batch.len() as f64;
        let alpha = self.current_alpha();
        let feature_dim = self.policy.feature_dim();
        let act_dim = self.policy.act_dim();
        let std = self.policy.std();
        let mut mean_grads = vec![vec![0.0; feature_dim]; act_dim];
        let mut log_std_grads = vec![0.0; act_dim];
        let mut loss = 0.0;
        let mut penalty_total = 0.0;

        for transition in batch {
            let phi = &transition.features;
            let sample = self.policy.sample(phi, &mut self.rng);
            let action = &sample.normalized_action;
            let critic = self
                .critics
                .iter()
                .min_by(|a, b| a.value(phi, action).total_cmp(&b.value(phi, action)))
                .unwrap_or(&self.critics[0]);
            let q = critic.value(phi, action);
            let dq = critic.action_gradient(phi, action);
            let penalty = entropy.penalty(sample.log_prob);
            let slope = alpha * entropy.penalty_slope(sample.log_prob);
            loss += (alpha * penalty - q) / n;
            penalty_total += penalty;

            for j in 0..act_dim {
                let a = action[j];
                let dq_du = dq[j] * (1.0 - a * a);
                let sigma_eps = std[j] * sample.noise[j];
                let d_mean = slope * 2.0 * a - dq_du;
                let d_log_std = slope * (-1.0 + 2.0 * a * sigma_eps) - dq_du * sigma_eps;
                for (g, f) in mean_grads[j].iter_mut().zip(phi) {
                    *g += d_mean * f / n;
                }
                log_std_grads[j] += d_log_std / n;
            }
        }

        for j in 0..act_dim {
            self.policy
                .step_row(j, &mean_grads[j], -self.config.actor_lr);
            self.policy
                .step_log_std(j, log_std_grads[j], -self.config.actor_lr);
        }
        self.logger.insert("LossPi".to_string(), loss);

        if entropy.automatic_entropy_tuning {
            let target_entropy = -(act_dim as f64);
            let drive = penalty_total / n + target_entropy;
            self.log_alpha = (self.log_alpha + self.config.alpha_lr * drive).clamp(-20.0, 5.0);
            self.logger
                .insert("Alpha".to_string(), self.log_alpha.exp());
        }
    }

    fn soft_update_targets(&mut self, include_policy: bool) {
        let tau = self.config.tau;
        for (target, source) in self.target_critics.iter_mut().zip(&self.critics) {
            target.soft_update_from(source, tau);
        }
        if include_policy {
            self.target_policy.soft_update_from(&self.policy, tau);
        }
    }
}

impl Agent for OffPolicyAgent {
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

        while steps < max_steps {
            let features = self.policy.features(&obs);
            let action = self.select_action(&features);
            let transition = self.env.step(&self.policy.to_env_action(&action))?;

            steps += 1;
            episode_return += transition.reward;
            collision |= transition.collision;

            if !self.eval_mode {
                self.replay.push(StoredTransition {
                    next_features: self.policy.features(&transition.observation),
                    features,
                    action,
                    reward: transition.reward,
                    done: transition.done,
                });
                if self.replay.len() >= self.config.batch_size {
                    self.update()?;
                }
            }

            obs = transition.observation;
            if transition.done {
                break;
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
        self.target_policy = policy.clone();
        self.policy = policy;
        Ok(())
    }

    fn alpha(&self) -> Option<f64> {
        match &self.rule {
            ActorCriticRule::Sac(entropy) if entropy.automatic_entropy_tuning => {
                Some(self.log_alpha.exp())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        app::{Device, RunContext},
        simulator::{SingleCarConfig, SingleCarEnv},
    };

    fn agent(kind: AgentKind, rule: ActorCriticRule) -> OffPolicyAgent {
        let env = SingleCarEnv::new(SingleCarConfig::default(), 11);
        let params = AgentParams::new(Box::new(env), RunContext::new(5, Device::Cpu));
        let config = OffPolicyConfig {
            batch_size: 8,
            ..OffPolicyConfig::default()
        };
        OffPolicyAgent::new(kind, rule, params, config)
    }

    fn entropy(kind: AgentKind) -> EntropyConfig {
        EntropyConfig::from_options(&kind.default_options()).unwrap()
    }

    #[test]
    fn shannon_penalty_is_the_log_density() {
        let config = entropy(AgentKind::Sac);
        assert_eq!(config.penalty(-1.3), -1.3);
        assert_eq!(config.penalty_slope(-1.3), 1.0);
    }

    #[test]
    fn tsallis_penalty_matches_q_logarithm() {
        let config = entropy(AgentKind::Tac);
        let lp: f64 = -0.7;
        let p = lp.exp();
        let expected = (p.powf(1.2 - 1.0) - 1.0) / (1.2 - 1.0);
        assert!((config.penalty(lp) - expected).abs() < 1e-12);

        let h = 1e-6;
        let numeric = (config.penalty(lp + h) - config.penalty(lp - h)) / (2.0 * h);
        assert!((numeric - config.penalty_slope(lp)).abs() < 1e-6);
    }

    #[test]
    fn entropic_index_of_one_reduces_to_log() {
        let options = AgentOptions {
            log_type: LogType::LogQ,
            entropic_index: 1.0,
            ..AgentOptions::default()
        };
        let config = EntropyConfig::from_options(&options).unwrap();
        assert_eq!(config.penalty(-2.0), -2.0);
    }

    #[test]
    fn rejects_invalid_entropy_options() {
        let negative = AgentOptions {
            alpha: -0.1,
            ..AgentOptions::default()
        };
        assert!(EntropyConfig::from_options(&negative).is_err());

        let zero_q = AgentOptions {
            entropic_index: 0.0,
            ..AgentOptions::default()
        };
        assert!(EntropyConfig::from_options(&zero_q).is_err());

        let tuned_zero = AgentOptions {
            alpha: 0.0,
            automatic_entropy_tuning: true,
            ..AgentOptions::default()
        };
        assert!(EntropyConfig::from_options(&tuned_zero).is_err());
    }

    #[test]
    fn updates_start_after_a_full_batch() {
        let mut agent = agent(AgentKind::Ddpg, ActorCriticRule::Ddpg);
        let result = agent.run(5).unwrap();
        assert_eq!(agent.replay_len(), result.steps);
        assert_eq!(agent.updates(), 0);

        agent.run(20).unwrap();
        assert!(agent.updates() > 0);
        assert!(agent.logger().contains_key("LossQ"));
    }

    #[test]
    fn evaluation_does_not_store_transitions() {
        let mut agent = agent(AgentKind::Td3, ActorCriticRule::Td3);
        agent.set_eval_mode(true);
        agent.run(30).unwrap();
        assert_eq!(agent.replay_len(), 0);
        assert_eq!(agent.updates(), 0);
    }

    #[test]
    fn td3_delays_actor_updates() {
        let mut agent = agent(AgentKind::Td3, ActorCriticRule::Td3);
        let before = agent.policy().clone();
        agent.run(8).unwrap();
        if agent.updates() == 1 {
            assert_eq!(&before, agent.policy());
        }
        agent.run(30).unwrap();
        assert!(agent.updates() >= 2);
        assert_ne!(&before, agent.policy());
    }

    #[test]
    fn auto_tuned_alpha_moves() {
        let mut agent = agent(AgentKind::Atac, ActorCriticRule::Sac(entropy(AgentKind::Atac)));
        let initial = agent.alpha().unwrap();
        assert!((initial - 0.2).abs() < 1e-12);
        while agent.updates() < 10 {
            agent.run(50).unwrap();
        }
        let tuned = agent.alpha().unwrap();
        assert!(tuned.is_finite() && tuned > 0.0);
        assert_ne!(tuned, initial);
        assert!(agent.logger().contains_key("Alpha"));
    }

    #[test]
    fn fixed_alpha_agents_hide_alpha() {
        let agent = agent(AgentKind::Sac, ActorCriticRule::Sac(entropy(AgentKind::Sac)));
        assert!(agent.alpha().is_none());
    }

    #[test]
    fn load_policy_resets_target() {
        let mut agent = agent(AgentKind::Ddpg, ActorCriticRule::Ddpg);
        let mut replacement = agent.policy().clone();
        let delta = vec![0.1; replacement.num_params()];
        replacement.step(&delta, 1.0).unwrap();
        agent.load_policy(replacement.clone()).unwrap();
        assert_eq!(agent.policy(), &replacement);
        assert_eq!(agent.target_policy, replacement);
    }
}
