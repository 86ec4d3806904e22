use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use super::file::SnapshotFile;
use crate::error::{SnapshotError, StoreError, StoreResult};
use crate::stream::lock;
use crate::value::StateTree;

/// A snapshot file used as both hydrator and persist hook of one store.
///
/// Saves wait until the hydrator has read the file, so the seed never
/// overwrites a snapshot before it is loaded. Each save carries the sequence
/// number it was issued with and is skipped if a later one already landed.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotLink {
    inner: Arc<LinkInner>,
}

#[derive(Debug)]
struct LinkInner {
    file: SnapshotFile,
    loaded: watch::Sender<bool>,
    issued: AtomicU64,
    written: Mutex<u64>,
}

impl SnapshotLink {
    pub(crate) fn new(file: SnapshotFile) -> Self {
        let (loaded, _) = watch::channel(false);
        Self {
            inner: Arc::new(LinkInner {
                file,
                loaded,
                issued: AtomicU64::new(0),
                written: Mutex::new(0),
            }),
        }
    }

    /// Loads the saved state. A missing file resolves to `None`.
    pub(crate) fn hydrate<T>(&self) -> impl Future<Output = StoreResult<Option<T>>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        async move {
            let outcome = match inner.file.load_state::<T>().await {
                Ok(state) => Ok(Some(state)),
                Err(StoreError::Snapshot(SnapshotError::Missing { path })) => {
                    tracing::debug!(%path, "no snapshot yet, starting from seed");
                    Ok(None)
                }
                Err(err) => Err(err),
            };
            inner.loaded.send_replace(true);
            outcome
        }
    }

    pub(crate) fn persist<T>(&self, state: &T) -> impl Future<Output = StoreResult<()>> + Send + 'static
    where
        T: Serialize + ?Sized,
    {
        let inner = Arc::clone(&self.inner);
        let seq = inner.issued.fetch_add(1, Ordering::AcqRel) + 1;
        let tree = StateTree::from_serialize(state);
        let mut loaded = inner.loaded.subscribe();
        async move {
            let tree = tree?;
            // A closed channel means the hydrator is gone; nothing left to wait for.
            let _ = loaded.wait_for(|done| *done).await;
            tokio::task::spawn_blocking(move || inner.save_if_newer(seq, &tree))
                .await
                .map_err(|e| StoreError::internal(format!("snapshot save task failed: {e}")))?
        }
    }
}

impl LinkInner {
    fn save_if_newer(&self, seq: u64, tree: &StateTree) -> StoreResult<()> {
        let mut written = lock(&self.written);
        if seq <= *written {
            tracing::debug!(seq, written = *written, "skipping superseded snapshot");
            return Ok(());
        }
        self.file.save(tree)?;
        *written = seq;
        Ok(())
    }
}
