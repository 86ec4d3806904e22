//! The store façade.
//!
//! A [`Store`] owns one event bus, the canonical state folded from it, and the
//! hydration flag. Construction follows a fixed order: the bus is seeded with
//! `@@INIT`, then the persist hook attaches (so it sees the seed), then the
//! hydrator starts. Everything afterwards is an event on the bus.
//!
//! # Examples
//!
//! ```rust,ignore
//! #[derive(Serialize, Deserialize)]
//! struct Counter { count: i64 }
//!
//! let store = Store::new(Counter { count: 0 })?;
//! let count = store.field::<i64>("count")?;
//! let binding = store.bind(&count, BindOptions::new())?;
//! binding.set(5)?;
//! assert_eq!(store.state()?.count, 5);
//! ```

mod binding;
mod effects;
mod external;
mod options;

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;

pub use binding::{HydrateTrigger, HydrationBinding, ValueBinding, ValueSetter};
pub use external::ExternalStore;
pub use options::{HydrateFn, PersistFn, StoreOptions};

use crate::accessor;
use crate::bus::EventBus;
use crate::config::{BindOptions, StoreConfig};
use crate::diagnostics::{DiagnosticSink, StoreId, TracingSink};
use crate::error::{PathError, StoreError, StoreResult};
use crate::event::Event;
use crate::path::{Field, PropertyPath};
use crate::router::Router;
use crate::stream::{lock, BehaviorSubject, EventStream, Observable, Subscription};
use crate::value::StateTree;
use effects::FailureReporter;

/// Decodes the node at `path`, treating a missing node as `null`.
pub(crate) fn decode_at<V: DeserializeOwned>(
    path: &PropertyPath,
    node: Option<&StateTree>,
) -> StoreResult<V> {
    let json = node.map_or(serde_json::Value::Null, StateTree::to_json);
    serde_json::from_value(json).map_err(|e| StoreError::decode(path.as_str(), e))
}

/// Shared, type-erased half of a store. Bindings hold this directly.
pub(crate) struct Core {
    pub(crate) id: StoreId,
    pub(crate) config: StoreConfig,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) router: Router,
    pub(crate) sink: Arc<dyn DiagnosticSink>,
    pub(crate) state: BehaviorSubject<StateTree>,
    pub(crate) hydrated: BehaviorSubject<bool>,
    current: Arc<Mutex<StateTree>>,
    seed: StateTree,
    internal: Mutex<Vec<Subscription>>,
}

impl Core {
    pub(crate) fn snapshot(&self) -> StateTree {
        lock(&self.current).clone()
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.bus.is_destroyed()
    }

    pub(crate) fn scheduler(&self) -> Option<&Handle> {
        self.router.scheduler()
    }

    fn publish(&self, path: PropertyPath, payload: StateTree) {
        self.bus.emit(Event::property(path, payload));
    }
}

/// An event-sourced store over state type `T`.
///
/// Cloning is cheap and every clone addresses the same store.
pub struct Store<T> {
    core: Arc<Core>,
    _state: PhantomData<fn() -> T>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            _state: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.core.id)
            .field("destroyed", &self.core.is_destroyed())
            .field("hydrated", &self.core.hydrated.value())
            .finish_non_exhaustive()
    }
}

impl<T> Store<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Builds a store with default options.
    ///
    /// # Errors
    /// `StoreError::Encode` if `initial` cannot be represented as a tree.
    pub fn new(initial: T) -> StoreResult<Self> {
        Self::with_options(initial, StoreOptions::default())
    }

    /// Builds a store.
    ///
    /// Deferred work (hydrator, persist futures, throttles, child re-reads)
    /// runs on the tokio runtime current at this call.
    ///
    /// # Errors
    /// - `StoreError::Config` for an invalid config.
    /// - `StoreError::Encode` if `initial` cannot be represented as a tree.
    /// - `StoreError::SchedulerUnavailable` if a hydrator or persist hook is
    ///   set but no tokio runtime is running.
    pub fn with_options(initial: T, options: StoreOptions<T>) -> StoreResult<Self> {
        let StoreOptions {
            config,
            hydrator,
            persist,
            sink,
        } = options;
        let config = config.validate()?;
        let scheduler = Handle::try_current().ok();
        if scheduler.is_none() && (hydrator.is_some() || persist.is_some()) {
            return Err(StoreError::scheduler_unavailable("hydrator/persist"));
        }

        let seed = StateTree::from_serialize(&initial)?;
        let id = StoreId::new();
        let sink: Arc<dyn DiagnosticSink> = sink.unwrap_or_else(|| Arc::new(TracingSink));

        let bus = Arc::new(EventBus::new(seed.clone()));
        let state = BehaviorSubject::new(seed.clone());
        let hydrated = BehaviorSubject::new(false);
        let current = Arc::new(Mutex::new(seed.clone()));
        let router = Router::new(&bus, scheduler.clone());

        let mut internal = vec![
            effects::fold_state(
                &bus,
                Arc::clone(&current),
                state.clone(),
                id,
                Arc::clone(&sink),
                config.debug,
            ),
            effects::fold_hydration(&bus, hydrated.clone()),
        ];

        let reporter = FailureReporter {
            id,
            bus: Arc::clone(&bus),
            sink: Arc::clone(&sink),
        };
        if let (Some(persist), Some(handle)) = (persist, scheduler.clone()) {
            internal.push(effects::attach_persist(&state, persist, reporter.clone(), handle));
        }
        if let (Some(hydrator), Some(handle)) = (hydrator, scheduler.as_ref()) {
            effects::spawn_hydrator(hydrator, reporter, handle);
        }

        tracing::debug!(store_id = %id, debug = config.debug, "store created");

        Ok(Self {
            core: Arc::new(Core {
                id,
                config,
                bus,
                router,
                sink,
                state,
                hydrated,
                current,
                seed,
                internal: Mutex::new(internal),
            }),
            _state: PhantomData,
        })
    }

    /// Identity attached to this store's diagnostics.
    #[must_use]
    pub fn id(&self) -> StoreId {
        self.core.id
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.core.config
    }

    /// Validates `path` against the current state and types it as `V`.
    ///
    /// A path absent from the state is accepted when `V` decodes from
    /// `null` (for example `Option<_>`).
    ///
    /// # Errors
    /// - `StoreError::Path` if `path` is malformed or does not resolve.
    /// - `StoreError::Decode` if the value there is not a `V`.
    pub fn field<V: DeserializeOwned>(&self, path: &str) -> StoreResult<Field<V>> {
        let path = PropertyPath::parse(path)?;
        let state = self.core.snapshot();
        match accessor::get(&path, &state) {
            Some(node) => {
                decode_at::<V>(&path, Some(node))?;
            }
            None => {
                decode_at::<V>(&path, None).map_err(|_| PathError::NotFound {
                    path: path.to_string(),
                })?;
            }
        }
        Ok(Field::unchecked(path))
    }

    /// Publishes `value` at `field`.
    ///
    /// A no-op once the store is destroyed.
    ///
    /// # Errors
    /// `StoreError::Encode` if `value` cannot be represented as a tree.
    pub fn publish<V: Serialize>(&self, field: &Field<V>, value: &V) -> StoreResult<()> {
        if self.core.is_destroyed() {
            return Ok(());
        }
        let payload = StateTree::from_serialize(value)?;
        self.core.publish(field.path().clone(), payload);
        Ok(())
    }

    /// Publishes `value` at an unchecked dotted path.
    ///
    /// # Errors
    /// `StoreError::Path` for a malformed path, `StoreError::Encode` for an
    /// unrepresentable value.
    pub fn publish_at<V: Serialize + ?Sized>(&self, path: &str, value: &V) -> StoreResult<()> {
        let path = PropertyPath::parse(path)?;
        if self.core.is_destroyed() {
            return Ok(());
        }
        let payload = StateTree::from_serialize(value)?;
        self.core.publish(path, payload);
        Ok(())
    }

    /// Publishes an already-built tree at `path`.
    pub fn publish_tree(&self, path: PropertyPath, payload: StateTree) {
        self.core.publish(path, payload);
    }

    /// Replaces the whole state and clears the hydration flag.
    ///
    /// # Errors
    /// `StoreError::Encode` if `state` cannot be represented as a tree.
    pub fn reset(&self, state: &T) -> StoreResult<()> {
        self.emit_snapshot(state, Event::Reset)
    }

    /// Replaces the whole state, leaving the hydration flag as is.
    ///
    /// # Errors
    /// `StoreError::Encode` if `state` cannot be represented as a tree.
    pub fn feed(&self, state: &T) -> StoreResult<()> {
        self.emit_snapshot(state, Event::Feed)
    }

    /// Replaces the whole state and sets the hydration flag.
    ///
    /// # Errors
    /// `StoreError::Encode` if `state` cannot be represented as a tree.
    pub fn hydrate(&self, state: &T) -> StoreResult<()> {
        self.emit_snapshot(state, Event::Hydrated)
    }

    fn emit_snapshot(&self, state: &T, make: fn(StateTree) -> Event) -> StoreResult<()> {
        if self.core.is_destroyed() {
            return Ok(());
        }
        let tree = StateTree::from_serialize(state)?;
        self.core.bus.emit(make(tree));
        Ok(())
    }

    /// Appends a raw event. Returns `false` if the store is destroyed.
    pub fn dispatch(&self, event: Event) -> bool {
        self.core.bus.emit(event)
    }

    /// Binds a field to a local value cell.
    ///
    /// # Errors
    /// - `StoreError::Decode` if the current value is not a `V`.
    /// - `StoreError::SchedulerUnavailable` for a throttle without a runtime.
    pub fn bind<V>(&self, field: &Field<V>, options: BindOptions) -> StoreResult<ValueBinding<V>>
    where
        V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        ValueBinding::attach(Arc::clone(&self.core), field.clone(), options)
    }

    /// Binds the hydration flag.
    #[must_use]
    pub fn hydration_flag(&self) -> HydrationBinding {
        HydrationBinding::attach(&self.core)
    }

    /// A handle that publishes `@@HYDRATED` snapshots.
    #[must_use]
    pub fn hydrate_trigger(&self) -> HydrateTrigger<T> {
        HydrateTrigger::new(Arc::clone(&self.core.bus))
    }

    /// Payload stream of one property path.
    ///
    /// # Errors
    /// `StoreError::SchedulerUnavailable` for a throttle without a runtime.
    pub fn property_observable(
        &self,
        path: &PropertyPath,
        throttle: Option<Duration>,
    ) -> StoreResult<Observable<StateTree>> {
        self.core.router.property(path, throttle)
    }

    /// Typed payload stream of one field. Payloads that do not decode are
    /// reported to the diagnostic sink and skipped.
    ///
    /// # Errors
    /// As for [`Store::property_observable`].
    pub fn field_observable<V>(
        &self,
        field: &Field<V>,
        throttle: Option<Duration>,
    ) -> StoreResult<Observable<V>>
    where
        V: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let path = field.path().clone();
        let id = self.core.id;
        let sink = Arc::clone(&self.core.sink);
        Ok(self
            .core
            .router
            .property(&path, throttle)?
            .filter_map(move |payload| match decode_at::<V>(&path, Some(&payload)) {
                Ok(value) => Some(value),
                Err(err) => {
                    sink.decode_skipped(id, &path, &err.to_string());
                    None
                }
            }))
    }

    /// Canonical state stream. Replays the current state on subscribe.
    #[must_use]
    pub fn state_observable(&self) -> Observable<StateTree> {
        self.core.state.as_observable()
    }

    /// Hydration flag stream. Replays the current flag on subscribe.
    #[must_use]
    pub fn hydration_observable(&self) -> Observable<bool> {
        self.core.hydrated.as_observable()
    }

    /// Every `@@`-typed event.
    #[must_use]
    pub fn system_events(&self) -> Observable<Event> {
        self.core.router.system_events()
    }

    /// The raw bus.
    #[must_use]
    pub fn events(&self) -> Observable<Event> {
        self.core.router.events()
    }

    /// Derived streams for hydration, reset and feed snapshots.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.core.router
    }

    /// Pull-style canonical state stream, buffered to `stream_capacity`.
    #[must_use]
    pub fn state_stream(&self) -> EventStream<StateTree> {
        self.state_observable()
            .into_stream(self.core.config.stream_capacity)
    }

    /// Pull-style system-event stream, buffered to `stream_capacity`.
    #[must_use]
    pub fn system_event_stream(&self) -> EventStream<Event> {
        self.system_events()
            .into_stream(self.core.config.stream_capacity)
    }

    /// The current state, decoded.
    ///
    /// # Errors
    /// `StoreError::Decode` if raw events left the state in a shape that is
    /// no longer a `T`.
    pub fn state(&self) -> StoreResult<T> {
        self.core.snapshot().deserialize_into()
    }

    /// The current state tree.
    #[must_use]
    pub fn snapshot(&self) -> StateTree {
        self.core.snapshot()
    }

    /// The state the store was constructed with.
    #[must_use]
    pub fn seed_snapshot(&self) -> StateTree {
        self.core.seed.clone()
    }

    /// The current value of `field`.
    ///
    /// # Errors
    /// `StoreError::Decode` if the value is not a `V`.
    pub fn get<V: DeserializeOwned>(&self, field: &Field<V>) -> StoreResult<V> {
        let state = self.core.snapshot();
        decode_at(field.path(), accessor::get(field.path(), &state))
    }

    /// The subtree at `path`, if present.
    #[must_use]
    pub fn value_at(&self, path: &PropertyPath) -> Option<StateTree> {
        accessor::get(path, &self.core.snapshot()).cloned()
    }

    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.core.hydrated.value()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }

    /// Shuts the store down. Idempotent.
    ///
    /// Flips the destroyed switch, detaches the internal folds and the
    /// persist hook, then completes every stream. In-flight hydrator and
    /// persist futures still resolve but have no further effect.
    pub fn destroy(&self) {
        if !self.core.bus.shutdown() {
            return;
        }
        let internal = std::mem::take(&mut *lock(&self.core.internal));
        drop(internal);
        self.core.state.complete();
        self.core.hydrated.complete();
        tracing::debug!(store_id = %self.core.id, "store destroyed");
    }
}
