//! In-memory checkpoint repository for testing.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use super::msgpack_checkpoint::check_version;
use crate::{Result, agents::SavedPolicy, error::Error, ports::CheckpointRepository};

/// Stores encoded checkpoints in a shared map instead of on disk.
///
/// Clones share the same storage, so a test can keep one handle and hand
/// another to the [`App`](crate::app::App).
///
/// # Examples
///
/// ```
/// use autodrive_rl::adapters::InMemoryCheckpointRepository;
///
/// let repo = InMemoryCheckpointRepository::new();
/// assert_eq!(repo.count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryCheckpointRepository {
    storage: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl InMemoryCheckpointRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn storage(&self) -> MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        self.storage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of checkpoints stored.
    pub fn count(&self) -> usize {
        self.storage().len()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.storage().contains_key(path)
    }

    /// Stored locations, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.storage().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn clear(&self) {
        self.storage().clear();
    }
}

impl CheckpointRepository for InMemoryCheckpointRepository {
    fn save(&self, saved: &SavedPolicy, path: &Path) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(saved).map_err(|e| Error::SerializationContext {
            operation: "serialize checkpoint for in-memory storage".to_string(),
            message: e.to_string(),
        })?;
        self.storage().insert(path.to_path_buf(), bytes);
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<SavedPolicy> {
        let storage = self.storage();
        let bytes = storage.get(path).ok_or_else(|| Error::MissingCheckpoint {
            path: path.to_path_buf(),
        })?;
        let saved: SavedPolicy =
            rmp_serde::from_slice(bytes).map_err(|e| Error::SerializationContext {
                operation: "deserialize checkpoint from in-memory storage".to_string(),
                message: e.to_string(),
            })?;
        check_version(&saved, path)?;
        Ok(saved)
    }
}
