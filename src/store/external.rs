//! Snapshot/subscribe contract for hosts that poll state and want a change
//! callback, such as UI frameworks with an external-store hook.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::binding::{HydrationBinding, ValueBinding};
use super::Store;
use crate::stream::Subscription;
use crate::value::StateTree;

/// A readable value with change notification.
pub trait ExternalStore {
    /// The value handed to readers.
    type Snapshot;

    /// The current value.
    fn snapshot(&self) -> Self::Snapshot;

    /// The value used before any client-side update: the seed for a store,
    /// the initial value for a binding.
    fn server_snapshot(&self) -> Self::Snapshot;

    /// Calls `on_change` after every change. The current value is not
    /// replayed.
    fn subscribe(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Subscription;
}

impl<T> ExternalStore for Store<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    type Snapshot = StateTree;

    fn snapshot(&self) -> StateTree {
        self.core.snapshot()
    }

    fn server_snapshot(&self) -> StateTree {
        self.core.seed.clone()
    }

    fn subscribe(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.core.state.as_observable().skip(1).subscribe_next(move |_| on_change())
    }
}

impl<V> ExternalStore for ValueBinding<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Snapshot = V;

    fn snapshot(&self) -> V {
        self.get()
    }

    fn server_snapshot(&self) -> V {
        self.cell().seed().clone()
    }

    fn subscribe(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.cell().as_observable().skip(1).subscribe_next(move |_| on_change())
    }
}

impl ExternalStore for HydrationBinding {
    type Snapshot = bool;

    fn snapshot(&self) -> bool {
        self.get()
    }

    fn server_snapshot(&self) -> bool {
        *self.cell().seed()
    }

    fn subscribe(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.cell().as_observable().skip(1).subscribe_next(move |_| on_change())
    }
}
