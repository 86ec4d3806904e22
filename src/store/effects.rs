//! Internal subscriptions wired at construction: the two folds, the persist
//! hook and the hydrator task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;

use super::options::{HydrateFn, PersistFn};
use crate::bus::EventBus;
use crate::diagnostics::{DiagnosticSink, FailureKind, StoreId};
use crate::error::BoxError;
use crate::event::{Event, FailureReport};
use crate::reducer;
use crate::stream::{lock, BehaviorSubject, Observer, Subscription};
use crate::value::StateTree;

/// Routes asynchronous failures to the sink and onto the bus.
#[derive(Clone)]
pub(super) struct FailureReporter {
    pub(super) id: StoreId,
    pub(super) bus: Arc<EventBus>,
    pub(super) sink: Arc<dyn DiagnosticSink>,
}

impl FailureReporter {
    /// Late failures of a destroyed store are discarded.
    pub(super) fn report(&self, kind: FailureKind, error: BoxError) {
        if self.bus.is_destroyed() {
            return;
        }
        let report = FailureReport::new(error);
        self.sink.failure(self.id, kind, &report);
        let event = match kind {
            FailureKind::Hydrate => Event::HydrateError(report),
            FailureKind::Persist => Event::PersistError(report),
        };
        self.bus.emit(event);
    }
}

/// Folds bus events into `current` and republishes every new tree on `state`.
///
/// The first delivery is the bus replaying `@@INIT`; `state` already holds
/// that seed, so it is folded but not re-emitted.
pub(super) fn fold_state(
    bus: &EventBus,
    current: Arc<Mutex<StateTree>>,
    state: BehaviorSubject<StateTree>,
    id: StoreId,
    sink: Arc<dyn DiagnosticSink>,
    debug: bool,
) -> Subscription {
    let primed = AtomicBool::new(false);
    bus.subscribe(Observer::new(move |event: Event| {
        if debug {
            sink.event(id, &event);
        }
        let next = {
            let mut acc = lock(&current);
            let Some(next) = reducer::reduce_state(&acc, &event) else {
                return;
            };
            *acc = next.clone();
            next
        };
        if debug {
            sink.state(id, &next);
        }
        if primed.swap(true, Ordering::AcqRel) {
            state.emit(next);
        }
    }))
}

/// Folds bus events into the hydration flag, emitting only on change.
pub(super) fn fold_hydration(bus: &EventBus, hydrated: BehaviorSubject<bool>) -> Subscription {
    let current = AtomicBool::new(hydrated.value());
    bus.subscribe(Observer::new(move |event: Event| {
        let before = current.load(Ordering::Acquire);
        let after = reducer::reduce_hydration(before, &event);
        if after != before {
            current.store(after, Ordering::Release);
            hydrated.emit(after);
        }
    }))
}

/// Calls `persist` with every canonical state, the seed included.
///
/// The callback runs inline; its future runs on `scheduler`.
pub(super) fn attach_persist<T>(
    state: &BehaviorSubject<StateTree>,
    persist: PersistFn<T>,
    reporter: FailureReporter,
    scheduler: Handle,
) -> Subscription
where
    T: DeserializeOwned + Send + 'static,
{
    state.subscribe(Observer::new(move |snapshot: StateTree| {
        let typed: T = match snapshot.deserialize_into() {
            Ok(typed) => typed,
            Err(err) => {
                reporter.report(FailureKind::Persist, Box::new(err));
                return;
            }
        };
        let pending = persist(typed);
        let reporter = reporter.clone();
        scheduler.spawn(async move {
            if let Err(error) = pending.await {
                reporter.report(FailureKind::Persist, error);
            }
        });
    }))
}

/// Runs the hydrator once; its value arrives as `@@HYDRATED`.
/// A hydrator with nothing to restore leaves the seed in place.
pub(super) fn spawn_hydrator<T>(hydrator: HydrateFn<T>, reporter: FailureReporter, scheduler: &Handle)
where
    T: Serialize + Send + 'static,
{
    let pending = hydrator();
    scheduler.spawn(async move {
        let outcome = pending.await.and_then(|state| {
            state
                .map(|state| StateTree::from_serialize(&state))
                .transpose()
                .map_err(|err| Box::new(err) as BoxError)
        });
        if reporter.bus.is_destroyed() {
            return;
        }
        match outcome {
            Ok(Some(tree)) => {
                reporter.bus.emit(Event::Hydrated(tree));
            }
            Ok(None) => {
                tracing::debug!(store_id = %reporter.id, "nothing to hydrate, keeping seed");
            }
            Err(error) => reporter.report(FailureKind::Hydrate, error),
        }
    });
}
