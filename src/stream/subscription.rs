use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::lock;

type Teardown = Box<dyn FnOnce() + Send>;

/// Shared closing state of one subscription.
///
/// The subscriber holds it through [`Subscription`]; the source it observes
/// holds it too, so either side can close it.
#[derive(Default)]
pub(crate) struct SubscriptionState {
    closed: AtomicBool,
    teardowns: Mutex<Vec<Teardown>>,
}

impl SubscriptionState {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Idempotent. Runs every teardown exactly once.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let teardowns = std::mem::take(&mut *lock(&self.teardowns));
        for teardown in teardowns {
            teardown();
        }
    }

    /// Registers work to run on close; runs it now if already closed.
    pub(crate) fn add_teardown(&self, teardown: impl FnOnce() + Send + 'static) {
        {
            let mut guard = lock(&self.teardowns);
            if !self.is_closed() {
                guard.push(Box::new(teardown));
                return;
            }
        }
        teardown();
    }
}

/// Handle to an attached observer.
///
/// Dropping the handle detaches the observer, like [`Subscription::unsubscribe`].
/// A subscription also closes on its own when its source completes, e.g.
/// after the store is destroyed.
#[must_use = "dropping a Subscription immediately unsubscribes it"]
pub struct Subscription {
    state: Arc<SubscriptionState>,
}

impl Subscription {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(SubscriptionState::default()),
        }
    }

    /// A subscription that is already closed, returned when subscribing to a
    /// completed source.
    pub(crate) fn closed() -> Self {
        let sub = Self::new();
        sub.state.close();
        sub
    }

    pub(crate) fn state(&self) -> Arc<SubscriptionState> {
        Arc::clone(&self.state)
    }

    pub(crate) fn add_teardown(&self, teardown: impl FnOnce() + Send + 'static) {
        self.state.add_teardown(teardown);
    }

    /// Ties `child` to this subscription: closing this one closes the child.
    pub(crate) fn add(&self, child: Subscription) {
        self.add_teardown(move || drop(child));
    }

    /// True once unsubscribed or once the source completed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Detaches the observer. Idempotent.
    pub fn unsubscribe(&self) {
        self.state.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.state.close();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("closed", &self.is_closed()).finish()
    }
}
