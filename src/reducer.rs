//! Pure folds over the event stream.

use crate::accessor;
use crate::event::Event;
use crate::value::StateTree;

/// Next canonical state after `event`.
///
/// Snapshot events replace the state wholesale, property events patch one
/// path. Failure events are side-channel notifications and return `None`:
/// they are not part of the fold.
#[must_use]
pub fn reduce_state(state: &StateTree, event: &Event) -> Option<StateTree> {
    match event {
        Event::Init(s) | Event::Hydrated(s) | Event::Reset(s) | Event::Feed(s) => Some(s.clone()),
        Event::Property { path, payload } => Some(accessor::set(path, payload.clone(), state)),
        Event::HydrateError(_) | Event::PersistError(_) => None,
    }
}

/// Next hydration flag after `event`.
#[must_use]
pub const fn reduce_hydration(hydrated: bool, event: &Event) -> bool {
    match event {
        Event::Init(_) | Event::Reset(_) => false,
        Event::Hydrated(_) => true,
        _ => hydrated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FailureReport;
    use crate::path::PropertyPath;
    use serde_json::json;

    fn tree(v: serde_json::Value) -> StateTree {
        StateTree::from(v)
    }

    #[test]
    fn test_snapshot_events_replace_state() {
        let state = tree(json!({ "count": 1 }));
        for event in [
            Event::Init(tree(json!({ "count": 0 }))),
            Event::Hydrated(tree(json!({ "count": 88 }))),
            Event::Reset(tree(json!({ "count": 0 }))),
            Event::Feed(tree(json!({ "count": 5 }))),
        ] {
            let next = reduce_state(&state, &event).unwrap();
            assert!(next.ptr_eq(event.snapshot().unwrap()));
        }
    }

    #[test]
    fn test_property_event_patches() {
        let state = tree(json!({ "count": 0, "user": { "name": "n/a" } }));
        let event = Event::property(PropertyPath::parse("user.name").unwrap(), StateTree::from("Ada"));
        let next = reduce_state(&state, &event).unwrap();
        assert_eq!(next.to_json(), json!({ "count": 0, "user": { "name": "Ada" } }));
    }

    #[test]
    fn test_failure_events_are_excluded() {
        let state = tree(json!({ "count": 3 }));
        let event = Event::HydrateError(FailureReport::new("boom".into()));
        assert!(reduce_state(&state, &event).is_none());
        let event = Event::PersistError(FailureReport::new("boom".into()));
        assert!(reduce_state(&state, &event).is_none());
    }

    #[test]
    fn test_hydration_fold() {
        let s = StateTree::Null;
        assert!(!reduce_hydration(true, &Event::Init(s.clone())));
        assert!(reduce_hydration(false, &Event::Hydrated(s.clone())));
        assert!(!reduce_hydration(true, &Event::Reset(s.clone())));
        assert!(reduce_hydration(true, &Event::Feed(s.clone())));
        assert!(!reduce_hydration(false, &Event::Feed(s)));
        let failure = Event::HydrateError(FailureReport::new("x".into()));
        assert!(!reduce_hydration(false, &failure));
    }
}
