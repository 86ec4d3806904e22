//! Observer-list stream primitives.
//!
//! The store is built on a small push-based stream layer: a [`Subject`]
//! multicasts values to registered observers, a [`BehaviorSubject`] also
//! replays its latest value to each new observer, and an [`Observable`]
//! describes a derived stream (filter, map, throttle, ...) that attaches to
//! its source only when subscribed. [`EventStream`] turns any observable
//! into a pull-style channel receiver.
//!
//! Delivery is synchronous and serialized per subject: an emission made while
//! another one is being delivered is queued and delivered right after it.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Pull-style channel adapter.
pub mod channel;
/// Cold derived streams and operators.
pub mod observable;
/// Multicast subjects.
pub mod subject;
/// Subscription handles.
pub mod subscription;

pub use channel::EventStream;
pub use observable::{Observable, Observer};
pub use subject::{BehaviorSubject, Subject};
pub use subscription::Subscription;

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section in this layer leaves its state consistent before
/// running user callbacks, so a poisoned lock carries no torn data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
