//! Repository port for policy checkpoints.

use std::path::Path;

use crate::{Result, agents::SavedPolicy};

/// Port for persisting and loading policy checkpoints.
///
/// # Examples
///
/// ```no_run
/// use autodrive_rl::agents::SavedPolicy;
/// use autodrive_rl::ports::CheckpointRepository;
/// use std::path::Path;
///
/// fn save<R: CheckpointRepository>(
///     repo: &R,
///     saved: &SavedPolicy,
///     path: &Path,
/// ) -> autodrive_rl::Result<()> {
///     repo.save(saved, path)
/// }
/// ```
pub trait CheckpointRepository {
    /// Save a checkpoint, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the location cannot be created or written, or if
    /// serialization fails.
    fn save(&self, saved: &SavedPolicy, path: &Path) -> Result<()>;

    /// Load a checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, or written by an
    /// unsupported format version.
    fn load(&self, path: &Path) -> Result<SavedPolicy>;
}
