use std::fs::{self, File, OpenOptions};
use std::future::Future;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::codec::{self, CODEC_VERSION};
use crate::error::{SnapshotError, StoreError, StoreResult};
use crate::value::StateTree;

/// What one snapshot file holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    /// Codec version the envelope was written with.
    pub version: u8,
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
    /// The saved state.
    pub state: StateTree,
}

impl SnapshotEnvelope {
    #[must_use]
    pub fn new(state: StateTree) -> Self {
        Self {
            version: CODEC_VERSION,
            saved_at: Utc::now(),
            state,
        }
    }
}

/// A single-file snapshot store.
///
/// Every save writes a temporary sibling file and renames it over the
/// target, so readers see either the previous snapshot or the new one.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    sync_on_write: bool,
}

impl SnapshotFile {
    /// A snapshot file at `path`. Nothing is touched until the first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync_on_write: true,
        }
    }

    /// Whether to fsync before the rename. On by default.
    #[must_use]
    pub const fn sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Writes `state`, replacing any previous snapshot.
    ///
    /// # Errors
    /// `SnapshotError::Io` if the directory or file cannot be written.
    pub fn save(&self, state: &StateTree) -> Result<SnapshotEnvelope, SnapshotError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let envelope = SnapshotEnvelope::new(state.clone());
        let temp_path = self.path.with_extension(format!("tmp.{}", Uuid::new_v4()));

        let written = self.write_temp(&temp_path, &envelope);
        if let Err(err) = written.and_then(|()| fs::rename(&temp_path, &self.path).map_err(Into::into)) {
            if temp_path.exists() {
                let _ = fs::remove_file(&temp_path);
            }
            return Err(err);
        }
        tracing::debug!(path = %self.path.display(), "snapshot saved");
        Ok(envelope)
    }

    fn write_temp(&self, temp_path: &Path, envelope: &SnapshotEnvelope) -> Result<(), SnapshotError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)?;
        let mut writer = BufWriter::new(file);
        codec::write_frame(&mut writer, envelope)?;
        writer.flush()?;
        if self.sync_on_write {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Reads the snapshot, or `None` if the file does not exist.
    ///
    /// # Errors
    /// `SnapshotError::Corrupted` or `SnapshotError::UnsupportedVersion` for
    /// an unreadable file, `SnapshotError::Io` for other I/O failures.
    pub fn load(&self) -> Result<Option<SnapshotEnvelope>, SnapshotError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let envelope = codec::decode(&mut BufReader::new(file))?;
        Ok(Some(envelope))
    }

    /// Loads and decodes the saved state on the blocking pool.
    ///
    /// # Errors
    /// - `StoreError::Snapshot` with `SnapshotError::Missing` if no snapshot
    ///   exists, or the underlying read error.
    /// - `StoreError::Decode` if the saved state is not a `T`.
    pub async fn load_state<T: DeserializeOwned>(&self) -> StoreResult<T> {
        let file = self.clone();
        let loaded = tokio::task::spawn_blocking(move || file.load())
            .await
            .map_err(|e| StoreError::internal(format!("snapshot load task failed: {e}")))??;
        let envelope = loaded.ok_or_else(|| SnapshotError::Missing {
            path: self.path.display().to_string(),
        })?;
        envelope.state.deserialize_into()
    }

    /// Encodes `state` now and writes it on the blocking pool.
    ///
    /// The returned future owns everything it needs.
    pub fn save_state<T: Serialize + ?Sized>(
        &self,
        state: &T,
    ) -> impl Future<Output = StoreResult<()>> + Send + 'static {
        let file = self.clone();
        let tree = StateTree::from_serialize(state);
        async move {
            let tree = tree?;
            tokio::task::spawn_blocking(move || file.save(&tree))
                .await
                .map_err(|e| StoreError::internal(format!("snapshot save task failed: {e}")))??;
            Ok(())
        }
    }
}
