//! MessagePack implementation of the checkpoint repository.
//!
//! Checkpoints are versioned [`SavedPolicy`] records written with rmp_serde.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use tracing::info;

use crate::{Result, agents::SavedPolicy, error::Error, ports::CheckpointRepository};

/// MessagePack-based checkpoint repository.
///
/// # Examples
///
/// ```no_run
/// use autodrive_rl::adapters::MsgPackCheckpointRepository;
/// use autodrive_rl::ports::CheckpointRepository;
/// use std::path::Path;
///
/// let repo = MsgPackCheckpointRepository::new();
/// let saved = repo.load(Path::new("tests/save_model/sumo_td3_s_0_ep_200_tr_3.1_er_16.0.msgpack"))?;
/// println!("trained for {} episodes", saved.metadata.episodes);
/// # Ok::<(), autodrive_rl::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCheckpointRepository;

impl MsgPackCheckpointRepository {
    pub fn new() -> Self {
        Self
    }
}

/// Reject snapshots written by a different format version.
pub(crate) fn check_version(saved: &SavedPolicy, path: &Path) -> Result<()> {
    if saved.version != SavedPolicy::VERSION {
        return Err(Error::UnsupportedCheckpointVersion {
            path: path.to_path_buf(),
            found: saved.version,
            expected: SavedPolicy::VERSION,
        });
    }
    Ok(())
}

impl CheckpointRepository for MsgPackCheckpointRepository {
    fn save(&self, saved: &SavedPolicy, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| Error::Io {
                operation: format!("create checkpoint directory {parent:?}"),
                source,
            })?;
        }

        let file = File::create(path).map_err(|source| Error::Io {
            operation: format!("create file {path:?}"),
            source,
        })?;
        let mut writer = BufWriter::new(file);

        rmp_serde::encode::write_named(&mut writer, saved).map_err(|e| {
            Error::SerializationContext {
                operation: "serialize checkpoint to MessagePack".to_string(),
                message: e.to_string(),
            }
        })?;
        writer.flush().map_err(|source| Error::Io {
            operation: format!("flush checkpoint {path:?}"),
            source,
        })?;

        info!(path = %path.display(), episodes = saved.metadata.episodes, "checkpoint saved");
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<SavedPolicy> {
        if !path.exists() {
            return Err(Error::MissingCheckpoint {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path).map_err(|source| Error::Io {
            operation: format!("open file {path:?}"),
            source,
        })?;

        let saved: SavedPolicy =
            rmp_serde::decode::from_read(file).map_err(|e| Error::SerializationContext {
                operation: "deserialize checkpoint from MessagePack".to_string(),
                message: e.to_string(),
            })?;
        check_version(&saved, path)?;
        Ok(saved)
    }
}
