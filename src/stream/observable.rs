use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::runtime::Handle;

use super::channel::EventStream;
use super::lock;
use super::subject::Subject;
use super::subscription::{Subscription, SubscriptionState};

/// Callbacks attached to a stream.
pub struct Observer<T> {
    next: Arc<dyn Fn(T) + Send + Sync>,
    complete: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            next: Arc::clone(&self.next),
            complete: self.complete.clone(),
        }
    }
}

impl<T> Observer<T> {
    /// Observer that only handles values.
    pub fn new(next: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            next: Arc::new(next),
            complete: None,
        }
    }

    /// Adds a hook that runs when the source completes.
    #[must_use]
    pub fn on_complete(mut self, complete: impl Fn() + Send + Sync + 'static) -> Self {
        self.complete = Some(Arc::new(complete));
        self
    }

    /// Delivers one value.
    pub fn next(&self, value: T) {
        (self.next)(value);
    }

    /// Signals completion.
    pub fn complete(&self) {
        if let Some(complete) = &self.complete {
            complete();
        }
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("has_complete", &self.complete.is_some())
            .finish()
    }
}

type SubscribeFn<T> = dyn Fn(Observer<T>) -> Subscription + Send + Sync;

/// A cold stream description.
///
/// Nothing runs until [`Observable::subscribe`] is called; each subscription
/// attaches its own chain of operators to the source. Use
/// [`Observable::share`] to multicast one attachment to many subscribers.
pub struct Observable<T> {
    source: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}

struct AuditWindow<T> {
    latest: Option<T>,
    armed: bool,
}

struct ShareState<T> {
    subject: Subject<T>,
    upstream: Option<Subscription>,
    ref_count: usize,
    connecting: bool,
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    /// Builds an observable from its subscribe function.
    pub fn new(subscribe: impl Fn(Observer<T>) -> Subscription + Send + Sync + 'static) -> Self {
        Self {
            source: Arc::new(subscribe),
        }
    }

    /// Attaches `observer`.
    pub fn subscribe(&self, observer: Observer<T>) -> Subscription {
        (self.source)(observer)
    }

    /// Attaches a value-only callback.
    pub fn subscribe_next(&self, next: impl Fn(T) + Send + Sync + 'static) -> Subscription {
        self.subscribe(Observer::new(next))
    }

    /// Builds an operator: `make` turns the downstream observer into the
    /// observer attached upstream. Completion is forwarded automatically and
    /// closes the downstream subscription.
    fn lift<U, F>(self, make: F) -> Observable<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(Observer<U>, Weak<SubscriptionState>) -> Observer<T> + Send + Sync + 'static,
    {
        Observable::new(move |downstream: Observer<U>| {
            let subscription = Subscription::new();
            let state = subscription.state();
            let completer = downstream.clone();
            let done = Arc::downgrade(&state);
            let upstream_observer = make(downstream, Arc::downgrade(&state)).on_complete(move || {
                completer.complete();
                if let Some(state) = done.upgrade() {
                    state.close();
                }
            });
            let upstream = self.subscribe(upstream_observer);
            subscription.add(upstream);
            subscription
        })
    }

    /// Passes only values matching `predicate`.
    #[must_use]
    pub fn filter(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        let predicate = Arc::new(predicate);
        self.lift(move |downstream, _| {
            let predicate = Arc::clone(&predicate);
            Observer::new(move |value| {
                if predicate(&value) {
                    downstream.next(value);
                }
            })
        })
    }

    /// Transforms every value.
    #[must_use]
    pub fn map<U: Clone + Send + Sync + 'static>(
        self,
        f: impl Fn(T) -> U + Send + Sync + 'static,
    ) -> Observable<U> {
        let f = Arc::new(f);
        self.lift(move |downstream, _| {
            let f = Arc::clone(&f);
            Observer::new(move |value| downstream.next(f(value)))
        })
    }

    /// Transforms every value, dropping those mapped to `None`.
    #[must_use]
    pub fn filter_map<U: Clone + Send + Sync + 'static>(
        self,
        f: impl Fn(T) -> Option<U> + Send + Sync + 'static,
    ) -> Observable<U> {
        let f = Arc::new(f);
        self.lift(move |downstream, _| {
            let f = Arc::clone(&f);
            Observer::new(move |value| {
                if let Some(mapped) = f(value) {
                    downstream.next(mapped);
                }
            })
        })
    }

    /// Drops the first `count` values of each subscription.
    #[must_use]
    pub fn skip(self, count: usize) -> Self {
        self.lift(move |downstream, _| {
            let seen = AtomicUsize::new(0);
            Observer::new(move |value| {
                if seen.fetch_add(1, Ordering::AcqRel) >= count {
                    downstream.next(value);
                }
            })
        })
    }

    /// Suppresses a value equal (per `same`) to the previous one.
    #[must_use]
    pub fn distinct_until_changed_by(self, same: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        let same = Arc::new(same);
        self.lift(move |downstream, _| {
            let same = Arc::clone(&same);
            let previous: Mutex<Option<T>> = Mutex::new(None);
            Observer::new(move |value: T| {
                let mut last = lock(&previous);
                if last.as_ref().is_some_and(|prev| same(prev, &value)) {
                    return;
                }
                *last = Some(value.clone());
                drop(last);
                downstream.next(value);
            })
        })
    }

    /// Suppresses consecutive duplicates.
    #[must_use]
    pub fn distinct_until_changed(self) -> Self
    where
        T: PartialEq,
    {
        self.distinct_until_changed_by(|a, b| a == b)
    }

    /// Multicasts one upstream attachment to every subscriber.
    ///
    /// The upstream is attached when the first subscriber arrives and
    /// detached when the last one leaves; the next subscriber attaches
    /// afresh. Subscribers joining while attached see only later values.
    #[must_use]
    pub fn share(self) -> Self {
        let shared = Arc::new(Mutex::new(ShareState {
            subject: Subject::new(),
            upstream: None,
            ref_count: 0,
            connecting: false,
        }));
        let source = self;

        Observable::new(move |observer| {
            let (subject, connect) = {
                let mut st = lock(&shared);
                if st.subject.is_completed() {
                    st.subject = Subject::new();
                    st.upstream = None;
                }
                st.ref_count += 1;
                let connect = st.upstream.is_none() && !st.connecting;
                if connect {
                    st.connecting = true;
                }
                (st.subject.clone(), connect)
            };

            let subscription = subject.subscribe(observer);

            let weak = Arc::downgrade(&shared);
            subscription.add_teardown(move || {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let released = {
                    let mut st = lock(&shared);
                    st.ref_count = st.ref_count.saturating_sub(1);
                    if st.ref_count == 0 {
                        st.upstream.take()
                    } else {
                        None
                    }
                };
                drop(released);
            });

            if connect {
                let feed = subject.clone();
                let closer = subject.clone();
                let upstream = source.subscribe(
                    Observer::new(move |value| {
                        feed.emit(value);
                    })
                    .on_complete(move || closer.complete()),
                );
                let stale = {
                    let mut st = lock(&shared);
                    st.connecting = false;
                    if st.ref_count > 0 && !upstream.is_closed() {
                        st.upstream = Some(upstream);
                        None
                    } else {
                        Some(upstream)
                    }
                };
                drop(stale);
            }

            subscription
        })
    }

    /// Trailing-edge throttle.
    ///
    /// The first value opens a window of length `window`; when it closes, the
    /// most recent value received during the window is delivered and the
    /// next value opens a new window. Timers run on `scheduler`.
    #[must_use]
    pub fn audit(self, window: Duration, scheduler: Handle) -> Self {
        self.lift(move |downstream, state| {
            let pending: Arc<Mutex<AuditWindow<T>>> = Arc::new(Mutex::new(AuditWindow {
                latest: None,
                armed: false,
            }));
            let scheduler = scheduler.clone();
            Observer::new(move |value| {
                let arm = {
                    let mut w = lock(&pending);
                    w.latest = Some(value);
                    !std::mem::replace(&mut w.armed, true)
                };
                if !arm {
                    return;
                }

                let deadline = tokio::time::Instant::now() + window;
                let pending = Arc::clone(&pending);
                let downstream = downstream.clone();
                let state = state.clone();
                scheduler.spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    let value = {
                        let mut w = lock(&pending);
                        w.armed = false;
                        w.latest.take()
                    };
                    let live = state.upgrade().is_some_and(|s| !s.is_closed());
                    if let (Some(value), true) = (value, live) {
                        downstream.next(value);
                    }
                });
            })
        })
    }

    /// Buffers values into a pull-style stream of at most `capacity` items.
    #[must_use]
    pub fn into_stream(self, capacity: usize) -> EventStream<T> {
        EventStream::attach(&self, capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::BehaviorSubject;

    fn collect<T: Clone + Send + Sync + 'static>(obs: &Observable<T>) -> (Arc<Mutex<Vec<T>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = obs.subscribe_next(move |v| lock(&sink).push(v));
        (seen, sub)
    }

    #[test]
    fn test_filter_and_map() {
        let subject = Subject::new();
        let obs = subject
            .as_observable()
            .filter(|v: &i32| v % 2 == 0)
            .map(|v| v * 10);
        let (seen, _sub) = collect(&obs);

        for v in 1..=4 {
            subject.emit(v);
        }
        assert_eq!(*lock(&seen), vec![20, 40]);
    }

    #[test]
    fn test_filter_map_and_skip() {
        let subject = BehaviorSubject::new(0);
        let obs = subject
            .as_observable()
            .skip(1)
            .filter_map(|v: i32| (v > 1).then_some(v));
        let (seen, _sub) = collect(&obs);

        subject.emit(1);
        subject.emit(2);
        assert_eq!(*lock(&seen), vec![2]);
    }

    #[test]
    fn test_distinct_until_changed() {
        let subject = Subject::new();
        let obs = subject.as_observable().distinct_until_changed();
        let (seen, _sub) = collect(&obs);

        for v in [1, 1, 2, 2, 1] {
            subject.emit(v);
        }
        assert_eq!(*lock(&seen), vec![1, 2, 1]);
    }

    #[test]
    fn test_each_subscription_has_its_own_operator_state() {
        let subject = Subject::new();
        let obs = subject.as_observable().skip(1);
        let (a, _sa) = collect(&obs);
        subject.emit(1);
        let (b, _sb) = collect(&obs);
        subject.emit(2);

        assert_eq!(*lock(&a), vec![2]);
        assert!(lock(&b).is_empty());
    }

    #[test]
    fn test_unsubscribe_detaches_upstream() {
        let subject: Subject<i32> = Subject::new();
        let obs = subject.as_observable().map(|v| v + 1);
        let sub = obs.subscribe_next(|_| {});
        assert_eq!(subject.observer_count(), 1);
        drop(sub);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn test_completion_propagates_through_operators() {
        let subject: Subject<i32> = Subject::new();
        let sub = subject.as_observable().map(|v| v + 1).filter(|_| true).subscribe_next(|_| {});
        subject.complete();
        assert!(sub.is_closed());
    }

    #[test]
    fn test_share_attaches_once_and_refcounts() {
        let subject: Subject<i32> = Subject::new();
        let shared = subject.as_observable().share();

        let (a, sa) = collect(&shared);
        let (b, sb) = collect(&shared);
        assert_eq!(subject.observer_count(), 1);

        subject.emit(7);
        assert_eq!(*lock(&a), vec![7]);
        assert_eq!(*lock(&b), vec![7]);

        drop(sa);
        assert_eq!(subject.observer_count(), 1);
        drop(sb);
        assert_eq!(subject.observer_count(), 0);

        let (c, _sc) = collect(&shared);
        subject.emit(8);
        assert_eq!(*lock(&c), vec![8]);
    }

    #[test]
    fn test_share_first_subscriber_sees_replay() {
        let subject = BehaviorSubject::new(3);
        let shared = subject.as_observable().share();
        let (first, _s1) = collect(&shared);
        let (second, _s2) = collect(&shared);

        assert_eq!(*lock(&first), vec![3]);
        assert!(lock(&second).is_empty());
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_audit_delivers_latest_at_window_end() {
        let subject = Subject::new();
        let obs = subject
            .as_observable()
            .audit(Duration::from_millis(25), Handle::current());
        let (seen, _sub) = collect(&obs);

        subject.emit(1);
        subject.emit(2);
        assert!(lock(&seen).is_empty());

        tokio::time::advance(Duration::from_millis(24)).await;
        settle().await;
        assert!(lock(&seen).is_empty());

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(*lock(&seen), vec![2]);

        subject.emit(3);
        tokio::time::advance(Duration::from_millis(25)).await;
        settle().await;
        assert_eq!(*lock(&seen), vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_audit_drops_pending_after_unsubscribe() {
        let subject = Subject::new();
        let obs = subject
            .as_observable()
            .audit(Duration::from_millis(10), Handle::current());
        let (seen, sub) = collect(&obs);

        subject.emit(1);
        drop(sub);
        tokio::time::advance(Duration::from_millis(20)).await;
        settle().await;
        assert!(lock(&seen).is_empty());
    }
}
