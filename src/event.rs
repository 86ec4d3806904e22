//! Events carried by the store's bus.
//!
//! Every mutation is an `Event`. Property events patch one path; system
//! events (type prefixed with `@@`) replace the whole state or report a
//! side-channel failure.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::error::BoxError;
use crate::path::PropertyPath;
use crate::value::StateTree;

/// Type string of the seed event.
pub const INIT: &str = "@@INIT";
/// Type string of a successful hydration.
pub const HYDRATED: &str = "@@HYDRATED";
/// Type string of a reset.
pub const RESET: &str = "@@RESET";
/// Type string of a bulk feed.
pub const FEED: &str = "@@FEED";
/// Type string of a failed hydration.
pub const HYDRATE_ERROR: &str = "@@HYDRATE_ERROR";
/// Type string of a failed persist.
pub const PERSIST_ERROR: &str = "@@PERSIST_ERROR";

/// A hydrate or persist failure, as carried on the bus.
#[derive(Clone)]
pub struct FailureReport {
    error: Arc<dyn StdError + Send + Sync + 'static>,
}

impl FailureReport {
    /// Wraps the error returned by a user callback.
    #[must_use]
    pub fn new(error: BoxError) -> Self {
        Self {
            error: Arc::from(error),
        }
    }

    /// The original error value.
    #[must_use]
    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.error.as_ref()
    }

    /// Rendered error message.
    #[must_use]
    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

impl fmt::Debug for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureReport").field("error", &self.message()).finish()
    }
}

/// Discriminant of [`Event`], used for routing.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Property,
    Init,
    Hydrated,
    Reset,
    Feed,
    HydrateError,
    PersistError,
}

/// One entry of the event stream.
#[derive(Debug, Clone)]
pub enum Event {
    /// Set the node at `path` to `payload`.
    Property { path: PropertyPath, payload: StateTree },
    /// Seed state, emitted once at construction.
    Init(StateTree),
    /// State loaded by a hydrator or a hydrate trigger.
    Hydrated(StateTree),
    /// State replaced by a reset; clears the hydration flag.
    Reset(StateTree),
    /// State replaced in bulk; leaves the hydration flag alone.
    Feed(StateTree),
    /// The hydrator failed.
    HydrateError(FailureReport),
    /// A persist call failed.
    PersistError(FailureReport),
}

impl Event {
    /// Builds a property event.
    #[must_use]
    pub fn property(path: PropertyPath, payload: StateTree) -> Self {
        Self::Property { path, payload }
    }

    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Property { .. } => EventKind::Property,
            Self::Init(_) => EventKind::Init,
            Self::Hydrated(_) => EventKind::Hydrated,
            Self::Reset(_) => EventKind::Reset,
            Self::Feed(_) => EventKind::Feed,
            Self::HydrateError(_) => EventKind::HydrateError,
            Self::PersistError(_) => EventKind::PersistError,
        }
    }

    /// The event type string: the dotted path, or an `@@` system type.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Property { path, .. } => path.as_str(),
            Self::Init(_) => INIT,
            Self::Hydrated(_) => HYDRATED,
            Self::Reset(_) => RESET,
            Self::Feed(_) => FEED,
            Self::HydrateError(_) => HYDRATE_ERROR,
            Self::PersistError(_) => PERSIST_ERROR,
        }
    }

    /// True for every `@@` event.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        !matches!(self, Self::Property { .. })
    }

    /// The full-state payload of `@@INIT`, `@@HYDRATED`, `@@RESET` and `@@FEED`.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&StateTree> {
        match self {
            Self::Init(s) | Self::Hydrated(s) | Self::Reset(s) | Self::Feed(s) => Some(s),
            _ => None,
        }
    }

    /// The failure carried by `@@HYDRATE_ERROR` and `@@PERSIST_ERROR`.
    #[must_use]
    pub const fn failure(&self) -> Option<&FailureReport> {
        match self {
            Self::HydrateError(f) | Self::PersistError(f) => Some(f),
            _ => None,
        }
    }

    /// The payload value, whatever the event kind.
    ///
    /// Failure events render as `{ "error": "<message>" }`.
    #[must_use]
    pub fn payload(&self) -> StateTree {
        match self {
            Self::Property { payload, .. } => payload.clone(),
            Self::Init(s) | Self::Hydrated(s) | Self::Reset(s) | Self::Feed(s) => s.clone(),
            Self::HydrateError(f) | Self::PersistError(f) => {
                StateTree::from(serde_json::json!({ "error": f.message() }))
            }
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property { path, payload } => write!(f, "{path} = {payload}"),
            Self::HydrateError(r) | Self::PersistError(r) => {
                write!(f, "{} ({})", self.event_type(), r.message())
            }
            _ => f.write_str(self.event_type()),
        }
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_struct("Event", 2)?;
        out.serialize_field("type", self.event_type())?;
        out.serialize_field("payload", &self.payload())?;
        out.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_types() {
        let path = PropertyPath::parse("user.name").unwrap();
        let ev = Event::property(path, StateTree::from("Ada"));
        assert_eq!(ev.event_type(), "user.name");
        assert!(!ev.is_system());
        assert_eq!(ev.kind(), EventKind::Property);

        let reset = Event::Reset(StateTree::empty_object());
        assert_eq!(reset.event_type(), RESET);
        assert!(reset.is_system());
        assert!(reset.snapshot().is_some());
    }

    #[test]
    fn test_failure_events_carry_error() {
        let ev = Event::PersistError(FailureReport::new("disk full".into()));
        assert_eq!(ev.event_type(), PERSIST_ERROR);
        assert!(ev.snapshot().is_none());
        assert_eq!(ev.failure().map(FailureReport::message).as_deref(), Some("disk full"));
        assert_eq!(ev.payload().to_json(), json!({ "error": "disk full" }));
    }

    #[test]
    fn test_serialize_as_type_and_payload() {
        let ev = Event::Feed(StateTree::from(json!({ "count": 5 })));
        let text = serde_json::to_value(&ev).unwrap();
        assert_eq!(text, json!({ "type": "@@FEED", "payload": { "count": 5 } }));
    }

    #[test]
    fn test_display() {
        let path = PropertyPath::parse("count").unwrap();
        let ev = Event::property(path, StateTree::from(2_i64));
        assert_eq!(ev.to_string(), "count = 2");
        assert_eq!(Event::Init(StateTree::Null).to_string(), "@@INIT");
    }
}
