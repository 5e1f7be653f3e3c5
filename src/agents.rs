//! Reinforcement-learning agents
//!
//! This module provides the closed set of supported algorithms, the options
//! record each variant is built from, and the single factory that turns an
//! algorithm identifier into a boxed [`Agent`].

pub mod critic;
pub mod off_policy;
pub mod on_policy;
pub mod policy;
pub mod replay;
pub mod serialization;

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use critic::{LinearCritic, LinearValue};
pub use off_policy::{ActorCriticRule, EntropyConfig, OffPolicyAgent, OffPolicyConfig};
pub use on_policy::{OnPolicyAgent, OnPolicyConfig, PolicyUpdateRule};
pub use policy::{GaussianPolicy, PolicySample};
pub use replay::{ReplayBuffer, StoredTransition};
pub use serialization::{CheckpointMetadata, SavedPolicy};

use crate::{
    Error, Result,
    app::RunContext,
    ports::{Agent, Environment},
};

/// Supported algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Vanilla policy gradient
    Vpg,
    /// Natural policy gradient
    Npg,
    /// Trust region policy optimization
    Trpo,
    /// Proximal policy optimization
    Ppo,
    /// Deep deterministic policy gradient
    Ddpg,
    /// Twin delayed DDPG
    Td3,
    /// Soft actor-critic with a fixed entropy coefficient
    Sac,
    /// Soft actor-critic with automatic entropy tuning
    Asac,
    /// Tsallis actor-critic
    Tac,
    /// Tsallis actor-critic with automatic entropy tuning
    Atac,
}

/// Broad algorithm family; decides which agent implementation is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentFamily {
    OnPolicy,
    OffPolicy,
}

impl AgentKind {
    pub const ALL: [AgentKind; 10] = [
        AgentKind::Vpg,
        AgentKind::Npg,
        AgentKind::Trpo,
        AgentKind::Ppo,
        AgentKind::Ddpg,
        AgentKind::Td3,
        AgentKind::Sac,
        AgentKind::Asac,
        AgentKind::Tac,
        AgentKind::Atac,
    ];

    /// Identifier used on the command line and in file names.
    pub fn id(&self) -> &'static str {
        match self {
            AgentKind::Vpg => "vpg",
            AgentKind::Npg => "npg",
            AgentKind::Trpo => "trpo",
            AgentKind::Ppo => "ppo",
            AgentKind::Ddpg => "ddpg",
            AgentKind::Td3 => "td3",
            AgentKind::Sac => "sac",
            AgentKind::Asac => "asac",
            AgentKind::Tac => "tac",
            AgentKind::Atac => "atac",
        }
    }

    pub fn family(&self) -> AgentFamily {
        match self {
            AgentKind::Vpg | AgentKind::Npg | AgentKind::Trpo | AgentKind::Ppo => {
                AgentFamily::OnPolicy
            }
            _ => AgentFamily::OffPolicy,
        }
    }

    /// Variant-specific defaults.
    pub fn default_options(&self) -> AgentOptions {
        let base = AgentOptions::default();
        match self {
            AgentKind::Sac => AgentOptions { alpha: 0.5, ..base },
            AgentKind::Asac => AgentOptions {
                automatic_entropy_tuning: true,
                ..base
            },
            AgentKind::Tac => AgentOptions {
                alpha: 0.5,
                log_type: LogType::LogQ,
                entropic_index: 1.2,
                ..base
            },
            AgentKind::Atac => AgentOptions {
                log_type: LogType::LogQ,
                entropic_index: 1.2,
                automatic_entropy_tuning: true,
                ..base
            },
            _ => base,
        }
    }

    fn expected_ids() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.id())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.id() == needle)
            .ok_or_else(|| Error::UnknownAlgorithm {
                input: s.to_string(),
                expected: Self::expected_ids(),
            })
    }
}

/// Logarithm used in the entropy regulariser of the soft actor-critic family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogType {
    /// Natural logarithm (Shannon entropy)
    #[default]
    Log,
    /// Tsallis q-logarithm
    LogQ,
}

/// Variant-specific construction options.
///
/// Every field has a default; [`AgentKind::default_options`] fills in the
/// values each variant expects, so the caller never branches on algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOptions {
    /// Fixed entropy coefficient (ignored when tuned automatically)
    pub alpha: f64,
    /// Learn the entropy coefficient against a target entropy
    pub automatic_entropy_tuning: bool,
    pub log_type: LogType,
    /// Tsallis entropic index `q`
    pub entropic_index: f64,
    /// Checkpoint to warm-start the policy from
    pub warm_start: Option<PathBuf>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            automatic_entropy_tuning: false,
            log_type: LogType::Log,
            entropic_index: 1.0,
            warm_start: None,
        }
    }
}

impl AgentOptions {
    pub fn with_warm_start(mut self, path: PathBuf) -> Self {
        self.warm_start = Some(path);
        self
    }
}

/// Uniform construction bundle shared by every agent.
pub struct AgentParams {
    pub env: Box<dyn Environment>,
    pub context: RunContext,
    pub obs_dim: usize,
    pub act_dim: usize,
    pub act_limit: f64,
}

impl AgentParams {
    /// Take the dimensions from the environment itself.
    pub fn new(env: Box<dyn Environment>, context: RunContext) -> Self {
        let obs_dim = env.observation_dim();
        let act_dim = env.action_dim();
        let act_limit = env.action_limit();
        Self {
            env,
            context,
            obs_dim,
            act_dim,
            act_limit,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.obs_dim == 0 || self.act_dim == 0 {
            return Err(Error::config(format!(
                "agent needs non-empty observation and action spaces (obs_dim={}, act_dim={})",
                self.obs_dim, self.act_dim
            )));
        }
        if !(self.act_limit.is_finite() && self.act_limit > 0.0) {
            return Err(Error::config(format!(
                "action limit must be positive and finite, got {}",
                self.act_limit
            )));
        }
        if self.env.observation_dim() != self.obs_dim {
            return Err(Error::DimensionMismatch {
                what: "observation".to_string(),
                expected: self.env.observation_dim(),
                got: self.obs_dim,
            });
        }
        if self.env.action_dim() != self.act_dim {
            return Err(Error::DimensionMismatch {
                what: "action".to_string(),
                expected: self.env.action_dim(),
                got: self.act_dim,
            });
        }
        Ok(())
    }
}

/// Build the agent for `kind`.
///
/// Warm starting from `options.warm_start` is left to the caller, which owns
/// checkpoint storage.
pub fn build_agent(
    kind: AgentKind,
    params: AgentParams,
    options: &AgentOptions,
) -> Result<Box<dyn Agent>> {
    params.validate()?;
    let agent: Box<dyn Agent> = match kind.family() {
        AgentFamily::OnPolicy => {
            let rule = match kind {
                AgentKind::Npg => PolicyUpdateRule::Natural,
                AgentKind::Trpo => PolicyUpdateRule::TrustRegion,
                AgentKind::Ppo => PolicyUpdateRule::Proximal,
                _ => PolicyUpdateRule::Vanilla,
            };
            let agent = OnPolicyAgent::new(kind, rule, params, OnPolicyConfig::default());
            debug!(algo = %kind, rule = ?agent.rule(), "built on-policy agent");
            Box::new(agent)
        }
        AgentFamily::OffPolicy => {
            let rule = match kind {
                AgentKind::Ddpg => ActorCriticRule::Ddpg,
                AgentKind::Td3 => ActorCriticRule::Td3,
                _ => ActorCriticRule::Sac(EntropyConfig::from_options(options)?),
            };
            let agent = OffPolicyAgent::new(kind, rule, params, OffPolicyConfig::default());
            debug!(algo = %kind, rule = ?agent.rule(), "built off-policy agent");
            Box::new(agent)
        }
    };
    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        app::Device,
        simulator::{SingleCarConfig, SingleCarEnv},
    };

    fn params(seed: u64) -> AgentParams {
        let env = SingleCarEnv::new(SingleCarConfig::default(), seed);
        AgentParams::new(Box::new(env), RunContext::new(seed, Device::Cpu))
    }

    #[test]
    fn parses_every_identifier() {
        for kind in AgentKind::ALL {
            assert_eq!(kind.id().parse::<AgentKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.id());
        }
        assert_eq!(" TD3 ".parse::<AgentKind>().unwrap(), AgentKind::Td3);
    }

    #[test]
    fn unknown_identifier_fails_fast() {
        let err = "a2c".parse::<AgentKind>().unwrap_err();
        match err {
            Error::UnknownAlgorithm { input, expected } => {
                assert_eq!(input, "a2c");
                assert!(expected.contains("atac"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn variant_defaults() {
        let sac = AgentKind::Sac.default_options();
        assert_eq!(sac.alpha, 0.5);
        assert!(!sac.automatic_entropy_tuning);
        assert_eq!(sac.log_type, LogType::Log);

        let asac = AgentKind::Asac.default_options();
        assert!(asac.automatic_entropy_tuning);

        let tac = AgentKind::Tac.default_options();
        assert_eq!(tac.log_type, LogType::LogQ);
        assert_eq!(tac.entropic_index, 1.2);
        assert_eq!(tac.alpha, 0.5);

        let atac = AgentKind::Atac.default_options();
        assert!(atac.automatic_entropy_tuning);
        assert_eq!(atac.log_type, LogType::LogQ);
    }

    #[test]
    fn families() {
        assert_eq!(AgentKind::Trpo.family(), AgentFamily::OnPolicy);
        assert_eq!(AgentKind::Td3.family(), AgentFamily::OffPolicy);
        assert_eq!(AgentKind::Atac.family(), AgentFamily::OffPolicy);
    }

    #[test]
    fn factory_builds_every_kind() {
        for kind in AgentKind::ALL {
            let agent = build_agent(kind, params(1), &kind.default_options()).unwrap();
            assert_eq!(agent.kind(), kind);
            assert!(!agent.eval_mode());
            assert_eq!(agent.policy().obs_dim(), 14);
            assert_eq!(agent.policy().act_dim(), 1);
        }
    }

    #[test]
    fn only_auto_tuned_agents_report_alpha() {
        for kind in AgentKind::ALL {
            let agent = build_agent(kind, params(2), &kind.default_options()).unwrap();
            let tuned = matches!(kind, AgentKind::Asac | AgentKind::Atac);
            assert_eq!(agent.alpha().is_some(), tuned, "{kind}");
        }
    }
}
