//! Value bindings: local cells kept in sync with one path of the store.
//!
//! A [`ValueBinding`] listens to five sources: hydration, reset and feed
//! snapshots (re-read the path from the new state), direct property events
//! (take the payload), and events on strict descendants (re-read the path
//! from the canonical state on the next scheduler turn). Dropping the binding
//! detaches every one of them.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{decode_at, Core};
use crate::accessor;
use crate::bus::EventBus;
use crate::config::BindOptions;
use crate::error::StoreResult;
use crate::event::Event;
use crate::path::{Field, PropertyPath};
use crate::stream::{BehaviorSubject, Observable, Subscription};
use crate::value::StateTree;

/// Writes decoded tree nodes into a binding's cell.
struct CellWriter<V> {
    core: Arc<Core>,
    path: PropertyPath,
    cell: BehaviorSubject<V>,
}

impl<V> Clone for CellWriter<V>
where
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            path: self.path.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<V> CellWriter<V>
where
    V: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn write(&self, node: Option<&StateTree>) {
        match decode_at::<V>(&self.path, node) {
            Ok(value) => {
                self.cell.emit(value);
            }
            Err(err) => self
                .core
                .sink
                .decode_skipped(self.core.id, &self.path, &err.to_string()),
        }
    }

    fn write_from(&self, state: &StateTree) {
        self.write(accessor::get(&self.path, state));
    }

    fn reread(&self) {
        if self.core.is_destroyed() {
            return;
        }
        let state = self.core.snapshot();
        self.write_from(&state);
    }
}

/// Publishes values at one path.
pub struct ValueSetter<V> {
    core: Arc<Core>,
    path: PropertyPath,
    cell: BehaviorSubject<V>,
    disable_cache: bool,
}

impl<V: Clone> Clone for ValueSetter<V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            path: self.path.clone(),
            cell: self.cell.clone(),
            disable_cache: self.disable_cache,
        }
    }
}

impl<V> ValueSetter<V>
where
    V: Serialize + Clone + Send + 'static,
{
    /// Writes `value` to the local cell (unless caching is disabled) and
    /// publishes it. A no-op once the store is destroyed.
    ///
    /// # Errors
    /// `StoreError::Encode` if `value` cannot be represented as a tree.
    pub fn set(&self, value: V) -> StoreResult<()> {
        if self.core.is_destroyed() {
            return Ok(());
        }
        let payload = StateTree::from_serialize(&value)?;
        if !self.disable_cache {
            self.cell.emit(value);
        }
        self.core.publish(self.path.clone(), payload);
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &PropertyPath {
        &self.path
    }
}

impl<V> fmt::Debug for ValueSetter<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSetter")
            .field("path", &self.path)
            .field("disable_cache", &self.disable_cache)
            .finish()
    }
}

/// A local value mirroring one field of the store.
pub struct ValueBinding<V> {
    field: Field<V>,
    cell: BehaviorSubject<V>,
    setter: ValueSetter<V>,
    _subscriptions: Vec<Subscription>,
}

impl<V> ValueBinding<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub(super) fn attach(core: Arc<Core>, field: Field<V>, options: BindOptions) -> StoreResult<Self> {
        let path = field.path().clone();
        let initial: V = decode_at(&path, accessor::get(&path, &core.snapshot()))?;
        let cell = BehaviorSubject::new(initial);
        let writer = CellWriter {
            core: Arc::clone(&core),
            path: path.clone(),
            cell: cell.clone(),
        };
        let throttle = options.throttle_window();
        let router = &core.router;

        let mut subscriptions = Vec::with_capacity(5);
        for snapshots in [router.hydration(), router.reset(), router.feed()] {
            let writer = writer.clone();
            subscriptions.push(snapshots.subscribe_next(move |state| writer.write_from(&state)));
        }

        let direct = writer.clone();
        subscriptions.push(
            router
                .property(&path, throttle)?
                .subscribe_next(move |payload| direct.write(Some(&payload))),
        );

        let child_writer = writer;
        subscriptions.push(router.child_property(&path, throttle)?.subscribe_next(
            move |event: Event| {
                let core = &child_writer.core;
                if core.config.debug {
                    core.sink.child_update(core.id, &child_writer.path, &event);
                }
                match core.scheduler() {
                    Some(handle) => {
                        let writer = child_writer.clone();
                        handle.spawn(async move { writer.reread() });
                    }
                    None => child_writer.reread(),
                }
            },
        ));

        let setter = ValueSetter {
            core,
            path,
            cell: cell.clone(),
            disable_cache: options.disable_cache,
        };
        Ok(Self {
            field,
            cell,
            setter,
            _subscriptions: subscriptions,
        })
    }

    /// The current local value.
    #[must_use]
    pub fn get(&self) -> V {
        self.cell.value()
    }

    /// See [`ValueSetter::set`].
    ///
    /// # Errors
    /// `StoreError::Encode` if `value` cannot be represented as a tree.
    pub fn set(&self, value: V) -> StoreResult<()> {
        self.setter.set(value)
    }

    /// A detached setter for this path.
    #[must_use]
    pub fn setter(&self) -> ValueSetter<V> {
        self.setter.clone()
    }

    /// `(value, setter)`.
    #[must_use]
    pub fn pair(&self) -> (V, ValueSetter<V>) {
        (self.get(), self.setter())
    }

    /// Stream of local values. Replays the current value on subscribe.
    #[must_use]
    pub fn observe(&self) -> Observable<V> {
        self.cell.as_observable()
    }

    #[must_use]
    pub fn field(&self) -> &Field<V> {
        &self.field
    }

    pub(super) fn cell(&self) -> &BehaviorSubject<V> {
        &self.cell
    }
}

impl<V> fmt::Debug for ValueBinding<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueBinding")
            .field("field", &self.field)
            .field("disable_cache", &self.setter.disable_cache)
            .finish_non_exhaustive()
    }
}

/// A local mirror of the hydration flag.
///
/// Set by `@@HYDRATED`, cleared by `@@RESET`.
pub struct HydrationBinding {
    cell: BehaviorSubject<bool>,
    _subscriptions: Vec<Subscription>,
}

impl HydrationBinding {
    pub(super) fn attach(core: &Core) -> Self {
        let cell = BehaviorSubject::new(core.hydrated.value());
        let on_hydrated = cell.clone();
        let on_reset = cell.clone();
        let subscriptions = vec![
            core.router
                .hydration()
                .subscribe_next(move |_| {
                    on_hydrated.emit(true);
                }),
            core.router.reset().subscribe_next(move |_| {
                on_reset.emit(false);
            }),
        ];
        Self {
            cell,
            _subscriptions: subscriptions,
        }
    }

    #[must_use]
    pub fn get(&self) -> bool {
        self.cell.value()
    }

    /// Stream of flag values. Replays the current flag on subscribe.
    #[must_use]
    pub fn observe(&self) -> Observable<bool> {
        self.cell.as_observable()
    }

    pub(super) fn cell(&self) -> &BehaviorSubject<bool> {
        &self.cell
    }
}

impl fmt::Debug for HydrationBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HydrationBinding")
            .field("hydrated", &self.get())
            .finish_non_exhaustive()
    }
}

/// Publishes `@@HYDRATED` snapshots of type `T`.
pub struct HydrateTrigger<T> {
    bus: Arc<EventBus>,
    _state: PhantomData<fn(T)>,
}

impl<T> Clone for HydrateTrigger<T> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            _state: PhantomData,
        }
    }
}

impl<T: Serialize> HydrateTrigger<T> {
    pub(super) fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            _state: PhantomData,
        }
    }

    /// Replaces the state with `state` and sets the hydration flag.
    /// A no-op once the store is destroyed.
    ///
    /// # Errors
    /// `StoreError::Encode` if `state` cannot be represented as a tree.
    pub fn hydrate(&self, state: &T) -> StoreResult<()> {
        if self.bus.is_destroyed() {
            return Ok(());
        }
        self.bus.emit(Event::Hydrated(StateTree::from_serialize(state)?));
        Ok(())
    }
}

impl<T> fmt::Debug for HydrateTrigger<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HydrateTrigger")
            .field("destroyed", &self.bus.is_destroyed())
            .finish()
    }
}
