use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use super::lock;
use super::observable::{Observable, Observer};
use super::subscription::{Subscription, SubscriptionState};

struct Registered<T> {
    id: u64,
    observer: Observer<T>,
    state: Arc<SubscriptionState>,
}

struct Core<T> {
    latest: Option<T>,
    replay: bool,
    observers: Vec<Registered<T>>,
    queue: VecDeque<T>,
    dispatching: bool,
    completed: bool,
    next_id: u64,
}

/// Resets the dispatch flag if an observer panics mid-delivery, so the
/// subject does not stay wedged in the "dispatching" state.
struct DispatchGuard<'a, T> {
    core: &'a Mutex<Core<T>>,
}

impl<T> Drop for DispatchGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut core = lock(self.core);
            core.dispatching = false;
            core.queue.clear();
        }
    }
}

/// A multicast observer list.
///
/// Observers are called synchronously, in registration order. A value
/// emitted from inside an observer callback is queued and delivered once the
/// current value has reached every observer, so observers always see values
/// in emission order.
pub struct Subject<T> {
    core: Arc<Mutex<Core<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    /// A subject that does not replay anything to late subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None, false)
    }

    fn build(latest: Option<T>, replay: bool) -> Self {
        Self {
            core: Arc::new(Mutex::new(Core {
                latest,
                replay,
                observers: Vec::new(),
                queue: VecDeque::new(),
                dispatching: false,
                completed: false,
                next_id: 0,
            })),
        }
    }

    /// Delivers `value` to every observer.
    ///
    /// Returns `false` (and drops the value) once the subject has completed.
    pub fn emit(&self, value: T) -> bool {
        let mut core = lock(&self.core);
        if core.completed {
            return false;
        }
        core.queue.push_back(value);
        if core.dispatching {
            return true;
        }
        core.dispatching = true;
        drop(core);

        let _guard = DispatchGuard { core: &self.core };
        loop {
            let mut core = lock(&self.core);
            let next = if core.completed { None } else { core.queue.pop_front() };
            let Some(value) = next else {
                core.queue.clear();
                core.dispatching = false;
                break;
            };
            core.latest = Some(value.clone());
            let targets: Vec<(Observer<T>, Arc<SubscriptionState>)> = core
                .observers
                .iter()
                .map(|r| (r.observer.clone(), Arc::clone(&r.state)))
                .collect();
            drop(core);

            for (observer, state) in targets {
                if !state.is_closed() {
                    observer.next(value.clone());
                }
            }
        }
        true
    }

    /// Registers `observer`.
    ///
    /// A replaying subject immediately hands the latest value to the new
    /// observer. Subscribing to a completed subject calls the observer's
    /// completion hook and returns a closed subscription.
    pub fn subscribe(&self, observer: Observer<T>) -> Subscription {
        let mut core = lock(&self.core);
        if core.completed {
            drop(core);
            observer.complete();
            return Subscription::closed();
        }

        let id = core.next_id;
        core.next_id += 1;
        let subscription = Subscription::new();
        core.observers.push(Registered {
            id,
            observer: observer.clone(),
            state: subscription.state(),
        });
        let replay = if core.replay { core.latest.clone() } else { None };
        drop(core);

        let weak = Arc::downgrade(&self.core);
        subscription.add_teardown(move || {
            if let Some(core) = weak.upgrade() {
                lock(&core).observers.retain(|r| r.id != id);
            }
        });

        if let Some(value) = replay {
            observer.next(value);
        }
        subscription
    }

    /// Completes the subject: every current subscription closes, later
    /// emissions are dropped and later subscriptions start closed.
    /// Idempotent.
    pub fn complete(&self) {
        let observers = {
            let mut core = lock(&self.core);
            if core.completed {
                return;
            }
            core.completed = true;
            core.queue.clear();
            std::mem::take(&mut core.observers)
        };
        for registered in observers {
            if !registered.state.is_closed() {
                registered.observer.complete();
            }
            registered.state.close();
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        lock(&self.core).completed
    }

    /// The most recently emitted value, if any.
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        lock(&self.core).latest.clone()
    }

    /// Number of attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        lock(&self.core).observers.len()
    }

    /// This subject as a composable observable.
    #[must_use]
    pub fn as_observable(&self) -> Observable<T>
    where
        T: Sync,
    {
        let subject = self.clone();
        Observable::new(move |observer| subject.subscribe(observer))
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = lock(&self.core);
        f.debug_struct("Subject")
            .field("observers", &core.observers.len())
            .field("completed", &core.completed)
            .finish()
    }
}

/// A subject that always holds a current value and replays it to every new
/// subscriber.
pub struct BehaviorSubject<T> {
    subject: Subject<T>,
    seed: T,
}

impl<T: Clone> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
            seed: self.seed.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> BehaviorSubject<T> {
    /// Creates the subject holding `seed`.
    #[must_use]
    pub fn new(seed: T) -> Self {
        Self {
            subject: Subject::build(Some(seed.clone()), true),
            seed,
        }
    }

    /// The current value. Still readable after completion.
    #[must_use]
    pub fn value(&self) -> T {
        self.subject.latest().unwrap_or_else(|| self.seed.clone())
    }

    /// The value the subject was created with.
    #[must_use]
    pub const fn seed(&self) -> &T {
        &self.seed
    }

    /// See [`Subject::emit`].
    pub fn emit(&self, value: T) -> bool {
        self.subject.emit(value)
    }

    /// See [`Subject::subscribe`].
    pub fn subscribe(&self, observer: Observer<T>) -> Subscription {
        self.subject.subscribe(observer)
    }

    /// See [`Subject::complete`].
    pub fn complete(&self) {
        self.subject.complete();
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.subject.is_completed()
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.subject.observer_count()
    }

    /// This subject as a composable observable.
    #[must_use]
    pub fn as_observable(&self) -> Observable<T>
    where
        T: Sync,
    {
        self.subject.as_observable()
    }
}

impl<T> fmt::Debug for BehaviorSubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorSubject").field("subject", &self.subject).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder<T: Clone + Send + Sync + 'static>() -> (Arc<Mutex<Vec<T>>>, Observer<T>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Observer::new(move |v| lock(&sink).push(v)))
    }

    #[test]
    fn test_subject_multicasts_in_order() {
        let subject = Subject::new();
        let (a, obs_a) = recorder::<i32>();
        let (b, obs_b) = recorder::<i32>();
        let _sa = subject.subscribe(obs_a);
        let _sb = subject.subscribe(obs_b);

        subject.emit(1);
        subject.emit(2);

        assert_eq!(*lock(&a), vec![1, 2]);
        assert_eq!(*lock(&b), vec![1, 2]);
    }

    #[test]
    fn test_plain_subject_does_not_replay() {
        let subject = Subject::new();
        subject.emit(1);
        let (seen, obs) = recorder::<i32>();
        let _sub = subject.subscribe(obs);
        assert!(lock(&seen).is_empty());
    }

    #[test]
    fn test_behavior_subject_replays_only_latest() {
        let subject = BehaviorSubject::new(0);
        subject.emit(1);
        subject.emit(2);

        let (seen, obs) = recorder::<i32>();
        let _sub = subject.subscribe(obs);
        subject.emit(3);

        assert_eq!(*lock(&seen), vec![2, 3]);
        assert_eq!(subject.value(), 3);
        assert_eq!(*subject.seed(), 0);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let subject = Subject::new();
        let (seen, obs) = recorder::<i32>();
        let sub = subject.subscribe(obs);
        subject.emit(1);
        sub.unsubscribe();
        subject.emit(2);

        assert_eq!(*lock(&seen), vec![1]);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn test_reentrant_emission_is_serialized() {
        let subject: Subject<i32> = Subject::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let inner = subject.clone();
        let first = Arc::clone(&order);
        let _s1 = subject.subscribe(Observer::new(move |v| {
            lock(&first).push(("a", v));
            if v == 1 {
                inner.emit(2);
            }
        }));
        let second = Arc::clone(&order);
        let _s2 = subject.subscribe(Observer::new(move |v| lock(&second).push(("b", v))));

        subject.emit(1);

        assert_eq!(*lock(&order), vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]);
    }

    #[test]
    fn test_complete_closes_subscriptions_and_drops_emissions() {
        let subject = BehaviorSubject::new(0);
        let (seen, obs) = recorder::<i32>();
        let sub = subject.subscribe(obs);

        subject.complete();
        subject.complete();
        assert!(sub.is_closed());
        assert!(!subject.emit(5));
        assert_eq!(subject.value(), 0);
        assert_eq!(*lock(&seen), vec![0]);

        let late = subject.subscribe(Observer::new(|_| {}));
        assert!(late.is_closed());
    }

    #[test]
    fn test_complete_hook_runs() {
        let subject: Subject<i32> = Subject::new();
        let done = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&done);
        let _sub = subject.subscribe(Observer::new(|_| {}).on_complete(move || *lock(&flag) = true));
        subject.complete();
        assert!(*lock(&done));
    }
}
