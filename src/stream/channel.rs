use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError, TrySendError};

use crate::error::{StoreResult, StreamError};

use super::observable::{Observable, Observer};
use super::subscription::Subscription;

/// A pull-style view of an observable.
///
/// Values are buffered in a bounded channel. When the buffer is full, new
/// values are dropped rather than blocking the emitter, and counted in
/// [`EventStream::dropped`]. Dropping the stream unsubscribes it.
#[derive(Debug)]
pub struct EventStream<T> {
    rx: Receiver<T>,
    subscription: Subscription,
    dropped: Arc<AtomicU64>,
}

impl<T: Clone + Send + Sync + 'static> EventStream<T> {
    pub(crate) fn attach(source: &Observable<T>, capacity: usize) -> Self {
        let (tx, rx) = bounded::<T>(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&dropped);

        // The sender lives inside the observer: once the source completes or
        // the subscription closes, the receiver becomes disconnected.
        let subscription = source.subscribe(Observer::new(move |value| match tx.try_send(value) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }));

        Self {
            rx,
            subscription,
            dropped,
        }
    }
}

impl<T> EventStream<T> {
    /// Receive the next value (blocking).
    ///
    /// # Errors
    /// `StreamError::Disconnected` once the source completed and the buffer
    /// is drained.
    pub fn recv(&self) -> StoreResult<T> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next value with a timeout.
    ///
    /// # Errors
    /// `StreamError::Timeout` if nothing arrived in time,
    /// `StreamError::Disconnected` once the source is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> StoreResult<T> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => StreamError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into(),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Receive a buffered value without waiting.
    ///
    /// # Errors
    /// `StreamError::Disconnected` once the source is gone and the buffer is
    /// empty.
    pub fn try_recv(&self) -> StoreResult<Option<T>> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    /// Takes every buffered value.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    /// Values lost because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// True once the underlying subscription closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.subscription.is_closed()
    }

    /// Detaches from the source. Already-buffered values stay readable.
    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }
}

fn disconnected() -> crate::error::StoreError {
    StreamError::Disconnected {
        stream: "event_stream".to_string(),
    }
    .into()
}
