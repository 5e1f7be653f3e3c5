use serde::{Deserialize, Serialize};

use super::{AgentKind, GaussianPolicy};

/// Provenance stored next to the policy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub env: String,
    pub algo: AgentKind,
    pub seed: u64,
    /// Training episodes completed when the checkpoint was taken
    pub episodes: usize,
    pub train_average_return: f64,
    pub eval_average_return: f64,
    #[serde(default)]
    pub saved_at: Option<String>,
}

/// Versioned on-disk policy snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPolicy {
    pub version: u32,
    pub metadata: CheckpointMetadata,
    pub policy: GaussianPolicy,
}

impl SavedPolicy {
    pub const VERSION: u32 = 1;

    pub fn new(metadata: CheckpointMetadata, policy: GaussianPolicy) -> Self {
        Self {
            version: Self::VERSION,
            metadata,
            policy,
        }
    }
}
