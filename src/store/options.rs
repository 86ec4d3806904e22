use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
#[cfg(feature = "persistent")]
use serde::de::DeserializeOwned;
#[cfg(feature = "persistent")]
use serde::Serialize;

use crate::config::StoreConfig;
use crate::diagnostics::DiagnosticSink;
use crate::error::BoxError;
#[cfg(feature = "persistent")]
use crate::snapshot::{SnapshotFile, SnapshotLink};

/// Loads the initial state asynchronously. Invoked once, at construction.
///
/// `Ok(None)` means there is nothing to restore: the store keeps its seed
/// and no event is emitted.
pub type HydrateFn<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<Option<T>, BoxError>> + Send>;

/// Saves a state snapshot. Invoked for every canonical state change,
/// including the seed.
pub type PersistFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Builder for [`super::Store::with_options`].
///
/// # Examples
///
/// ```rust,ignore
/// let options = StoreOptions::new()
///     .debug(true)
///     .hydrator(|| async { Ok::<_, std::io::Error>(Counter { count: 88 }) })
///     .persist(|state: Counter| async move { save(state).await });
/// let store = Store::with_options(Counter { count: 0 }, options)?;
/// ```
pub struct StoreOptions<T> {
    pub(crate) config: StoreConfig,
    pub(crate) hydrator: Option<HydrateFn<T>>,
    pub(crate) persist: Option<PersistFn<T>>,
    pub(crate) sink: Option<Arc<dyn DiagnosticSink>>,
}

impl<T> Default for StoreOptions<T> {
    fn default() -> Self {
        Self {
            config: StoreConfig::default(),
            hydrator: None,
            persist: None,
            sink: None,
        }
    }
}

impl<T: Send + 'static> StoreOptions<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole config.
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Toggles diagnostic logging of events and states.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Sets the hydrator. Its resolved value supersedes the seed through a
    /// `@@HYDRATED` event; an error becomes `@@HYDRATE_ERROR`.
    #[must_use]
    pub fn hydrator<F, Fut, E>(mut self, hydrator: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.hydrator = Some(Box::new(move || {
            let fut = hydrator();
            async move { fut.await.map(Some).map_err(Into::into) }.boxed()
        }));
        self
    }

    /// Sets the persist callback. The callback runs synchronously on every
    /// state change; the future it returns is driven on the runtime and an
    /// error becomes `@@PERSIST_ERROR`.
    #[must_use]
    pub fn persist<F, Fut, E>(mut self, persist: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.persist = Some(Arc::new(move |state| {
            let fut = persist(state);
            async move { fut.await.map_err(Into::into) }.boxed()
        }));
        self
    }

    /// Hydrates from `file` and persists every state change back to it.
    ///
    /// Saves are held back until the file has been read. A missing file is
    /// a first launch: the store keeps its seed without a `@@HYDRATE_ERROR`
    /// and the first save creates the file. An unreadable file is still a
    /// hydrate error.
    #[cfg(feature = "persistent")]
    #[must_use]
    pub fn snapshot_file(self, file: SnapshotFile) -> Self
    where
        T: Serialize + DeserializeOwned,
    {
        let link = SnapshotLink::new(file);
        let reader = link.clone();
        let mut options = self.persist(move |state: T| link.persist(&state));
        options.hydrator = Some(Box::new(move || {
            let fut = reader.hydrate::<T>();
            async move { fut.await.map_err(|err| Box::new(err) as BoxError) }.boxed()
        }));
        options
    }

    /// Replaces the default tracing sink.
    #[must_use]
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}

impl<T> fmt::Debug for StoreOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("config", &self.config)
            .field("hydrator", &self.hydrator.is_some())
            .field("persist", &self.persist.is_some())
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}
