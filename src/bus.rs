//! The event bus: one replay-last stream through which every mutation flows.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::event::Event;
use crate::stream::{BehaviorSubject, Observable, Observer, Subscription};
use crate::value::StateTree;

/// Serialized, replay-last event stream with a one-way `destroyed` switch.
#[derive(Debug)]
pub struct EventBus {
    subject: BehaviorSubject<Event>,
    destroyed: AtomicBool,
}

impl EventBus {
    /// Creates the bus holding `@@INIT` with the seed state.
    #[must_use]
    pub fn new(initial: StateTree) -> Self {
        Self {
            subject: BehaviorSubject::new(Event::Init(initial)),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Appends `event`.
    ///
    /// After [`EventBus::shutdown`] the event is silently dropped and `false`
    /// is returned; callers firing late (timers, async callbacks) never see
    /// an error.
    pub fn emit(&self, event: Event) -> bool {
        if self.is_destroyed() {
            return false;
        }
        self.subject.emit(event)
    }

    /// The most recent event.
    #[must_use]
    pub fn last(&self) -> Event {
        self.subject.value()
    }

    pub fn subscribe(&self, observer: Observer<Event>) -> Subscription {
        self.subject.subscribe(observer)
    }

    #[must_use]
    pub fn observable(&self) -> Observable<Event> {
        self.subject.as_observable()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Flips the destroyed switch and completes the stream.
    ///
    /// Returns `false` if the bus was already shut down.
    pub fn shutdown(&self) -> bool {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.subject.complete();
        true
    }
}
