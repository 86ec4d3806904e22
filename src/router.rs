//! Subscription router: derives scoped streams from the event bus.
//!
//! Property streams are shared (one bus attachment per stream, live only
//! while someone listens) and optionally throttled. System-event streams map
//! to the full-state payload and suppress consecutive repeats of the same
//! snapshot.

use std::time::Duration;

use tokio::runtime::Handle;

use crate::bus::EventBus;
use crate::error::{StoreError, StoreResult};
use crate::event::{Event, EventKind};
use crate::path::{self, PropertyPath};
use crate::stream::Observable;
use crate::value::StateTree;

/// Scoped views of one event bus.
#[derive(Debug, Clone)]
pub struct Router {
    events: Observable<Event>,
    scheduler: Option<Handle>,
}

impl Router {
    #[must_use]
    pub fn new(bus: &EventBus, scheduler: Option<Handle>) -> Self {
        Self {
            events: bus.observable(),
            scheduler,
        }
    }

    /// Payloads of property events whose type is exactly `path`.
    ///
    /// # Errors
    /// `StoreError::SchedulerUnavailable` if `throttle` is set and no tokio
    /// runtime was available when the store was built.
    pub fn property(
        &self,
        path: &PropertyPath,
        throttle: Option<Duration>,
    ) -> StoreResult<Observable<StateTree>> {
        let path = path.clone();
        let stream = self
            .events
            .clone()
            .filter_map(move |event| match event {
                Event::Property { path: p, payload } if p == path => Some(payload),
                _ => None,
            })
            .share();
        self.throttled(stream, throttle)
    }

    /// Events updating any strict descendant of `path`.
    ///
    /// These carry the child's value, not the parent's; subscribers re-read
    /// the parent from the canonical state.
    ///
    /// # Errors
    /// As for [`Router::property`].
    pub fn child_property(
        &self,
        path: &PropertyPath,
        throttle: Option<Duration>,
    ) -> StoreResult<Observable<Event>> {
        let path = path.clone();
        let stream = self
            .events
            .clone()
            .filter(move |event| path::is_child_type(event.event_type(), &path))
            .share();
        self.throttled(stream, throttle)
    }

    /// Full state delivered by each `@@HYDRATED`.
    #[must_use]
    pub fn hydration(&self) -> Observable<StateTree> {
        self.snapshots(EventKind::Hydrated)
    }

    /// Full state delivered by each `@@RESET`.
    #[must_use]
    pub fn reset(&self) -> Observable<StateTree> {
        self.snapshots(EventKind::Reset)
    }

    /// Full state delivered by each `@@FEED`.
    #[must_use]
    pub fn feed(&self) -> Observable<StateTree> {
        self.snapshots(EventKind::Feed)
    }

    /// Every `@@`-typed event.
    #[must_use]
    pub fn system_events(&self) -> Observable<Event> {
        self.events.clone().filter(Event::is_system)
    }

    /// The raw bus.
    #[must_use]
    pub fn events(&self) -> Observable<Event> {
        self.events.clone()
    }

    #[must_use]
    pub fn scheduler(&self) -> Option<&Handle> {
        self.scheduler.as_ref()
    }

    fn snapshots(&self, kind: EventKind) -> Observable<StateTree> {
        self.events
            .clone()
            .filter_map(move |event| {
                if event.kind() == kind {
                    event.snapshot().cloned()
                } else {
                    None
                }
            })
            .distinct_until_changed_by(StateTree::ptr_eq)
    }

    fn throttled<T: Clone + Send + Sync + 'static>(
        &self,
        stream: Observable<T>,
        throttle: Option<Duration>,
    ) -> StoreResult<Observable<T>> {
        match throttle {
            None => Ok(stream),
            Some(window) if window.is_zero() => Ok(stream),
            Some(window) => {
                let scheduler = self
                    .scheduler
                    .clone()
                    .ok_or_else(|| StoreError::scheduler_unavailable("throttled subscription"))?;
                Ok(stream.audit(window, scheduler))
            }
        }
    }
}
