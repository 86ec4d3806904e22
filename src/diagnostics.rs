//! Diagnostic output.
//!
//! The store never prints directly; it reports to a [`DiagnosticSink`]. The
//! default [`TracingSink`] forwards everything to `tracing`, so hosts choose
//! formatting and filtering with their own subscriber.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{Event, FailureReport};
use crate::path::PropertyPath;
use crate::value::StateTree;

/// Identity of one store instance, attached to every diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(Uuid);

impl StoreId {
    /// Create a new random store id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The two asynchronous side effects that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The hydrator's future resolved to an error.
    Hydrate,
    /// A persist call's future resolved to an error.
    Persist,
}

impl FailureKind {
    /// Fixed message prefix for the error log.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Hydrate => "Failed to hydrate store",
            Self::Persist => "Failed to persist store",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Receiver of diagnostic records.
///
/// `event`, `state` and `child_update` are only called in debug mode.
pub trait DiagnosticSink: Send + Sync {
    /// A raw event entered the bus.
    fn event(&self, store: StoreId, event: &Event);

    /// The canonical state after folding an event.
    fn state(&self, store: StoreId, state: &StateTree);

    /// A descendant of a bound path changed and a re-read was scheduled.
    fn child_update(&self, store: StoreId, path: &PropertyPath, event: &Event);

    /// Hydration or persistence failed.
    fn failure(&self, store: StoreId, kind: FailureKind, report: &FailureReport);

    /// A bound value could not be decoded into its field type.
    fn decode_skipped(&self, store: StoreId, path: &PropertyPath, reason: &str);
}

/// Default sink: forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn event(&self, store: StoreId, event: &Event) {
        tracing::info!(store_id = %store, event = %event, "event");
    }

    fn state(&self, store: StoreId, state: &StateTree) {
        tracing::info!(store_id = %store, state = %state, "State after update");
    }

    fn child_update(&self, store: StoreId, path: &PropertyPath, event: &Event) {
        tracing::debug!(store_id = %store, path = %path, event = %event, "child property changed");
    }

    fn failure(&self, store: StoreId, kind: FailureKind, report: &FailureReport) {
        tracing::error!(store_id = %store, error = %report.message(), "{}", kind.message());
    }

    fn decode_skipped(&self, store: StoreId, path: &PropertyPath, reason: &str) {
        tracing::warn!(store_id = %store, path = %path, reason, "bound value not decodable, keeping previous value");
    }
}
