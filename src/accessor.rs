//! Path accessor: read and patch a state tree at a dotted path.
//!
//! `set` never mutates its input. It rebuilds the spine from the root to the
//! patched leaf and reuses every other branch by reference, so untouched
//! subtrees keep their identity across updates.
//!
//! Paths are not checked against any schema here. A missing node or a
//! scalar met mid-path is replaced by an array when the segment is an index,
//! otherwise by an object. A named key on an array turns it into an object
//! keyed by index, keeping its elements. An array grows by at most
//! [`MAX_ARRAY_GAP`] padding slots per write; an index further out is stored
//! as an object key instead. Callers that bypass [`crate::Field`] validation
//! own the shape of what they write.

use std::sync::Arc;

use crate::path::PropertyPath;
use crate::value::{ObjectMap, StateTree};

/// Most `null` slots a single write may pad an array with.
pub const MAX_ARRAY_GAP: usize = 1024;

/// Reads the node at `path`, or `None` if any segment is missing.
#[must_use]
pub fn get<'a>(path: &PropertyPath, tree: &'a StateTree) -> Option<&'a StateTree> {
    path.segments().try_fold(tree, |node, segment| child(node, segment))
}

/// Returns a new tree whose node at `path` is `value`.
#[must_use]
pub fn set(path: &PropertyPath, value: StateTree, tree: &StateTree) -> StateTree {
    let segments: Vec<&str> = path.segments().collect();
    set_segments(&segments, value, tree)
}

fn child<'a>(node: &'a StateTree, segment: &str) -> Option<&'a StateTree> {
    match node {
        StateTree::Object(map) => map.get(segment),
        StateTree::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn set_segments(segments: &[&str], value: StateTree, node: &StateTree) -> StateTree {
    let Some((head, rest)) = segments.split_first() else {
        return value;
    };

    match node {
        StateTree::Array(items) => match array_slot(head, items.len()) {
            Some(index) => set_in_array(items.as_ref().clone(), index, rest, value),
            None => set_in_object(indexed(items), head, rest, value),
        },
        StateTree::Object(map) => set_in_object(map.as_ref().clone(), head, rest, value),
        _ => match array_slot(head, 0) {
            Some(index) => set_in_array(Vec::new(), index, rest, value),
            None => set_in_object(ObjectMap::new(), head, rest, value),
        },
    }
}

/// The index `segment` names in an array of `len` items, if it is within
/// padding reach.
fn array_slot(segment: &str, len: usize) -> Option<usize> {
    segment
        .parse::<usize>()
        .ok()
        .filter(|&index| index <= len.saturating_add(MAX_ARRAY_GAP))
}

fn indexed(items: &[StateTree]) -> ObjectMap {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| (i.to_string(), item.clone()))
        .collect()
}

fn set_in_array(mut items: Vec<StateTree>, index: usize, rest: &[&str], value: StateTree) -> StateTree {
    if index >= items.len() {
        items.resize(index + 1, StateTree::Null);
    }
    items[index] = set_segments(rest, value, &items[index]);
    StateTree::Array(Arc::new(items))
}

fn set_in_object(mut map: ObjectMap, head: &str, rest: &[&str], value: StateTree) -> StateTree {
    let existing = map.remove(head).unwrap_or_default();
    let patched = set_segments(rest, value, &existing);
    map.insert(head.to_string(), patched);
    StateTree::Object(Arc::new(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> PropertyPath {
        PropertyPath::parse(s).unwrap()
    }

    fn tree(v: serde_json::Value) -> StateTree {
        StateTree::from(v)
    }

    #[test]
    fn test_get_nested_value() {
        let state = tree(json!({ "user": { "address": { "city": "Aubonne" } } }));
        let city = get(&path("user.address.city"), &state);
        assert_eq!(city.and_then(StateTree::as_str), Some("Aubonne"));
    }

    #[test]
    fn test_get_missing_is_none() {
        let state = tree(json!({ "user": { "name": "n/a" } }));
        assert!(get(&path("user.age"), &state).is_none());
        assert!(get(&path("user.name.first"), &state).is_none());
        assert!(get(&path("missing.deep.path"), &state).is_none());
    }

    #[test]
    fn test_get_array_index() {
        let state = tree(json!({ "rows": [{ "price": 1 }, { "price": 2 }] }));
        let price = get(&path("rows.1.price"), &state);
        assert_eq!(price.and_then(StateTree::as_i64), Some(2));
        assert!(get(&path("rows.9.price"), &state).is_none());
    }

    #[test]
    fn test_set_preserves_sibling_references() {
        let state = tree(json!({ "a": { "x": 1 }, "b": { "y": 2 } }));
        let next = set(&path("a.x"), StateTree::from(9_i64), &state);

        let before_b = state.field("b").unwrap();
        let after_b = next.field("b").unwrap();
        assert!(before_b.ptr_eq(after_b));

        assert!(!state.ptr_eq(&next));
        assert!(!state.field("a").unwrap().ptr_eq(next.field("a").unwrap()));
        assert_eq!(get(&path("a.x"), &next).and_then(StateTree::as_i64), Some(9));
    }

    #[test]
    fn test_set_does_not_mutate_input() {
        let state = tree(json!({ "count": 0 }));
        let _next = set(&path("count"), StateTree::from(5_i64), &state);
        assert_eq!(state.to_json(), json!({ "count": 0 }));
    }

    #[test]
    fn test_set_creates_missing_branches() {
        let state = tree(json!({}));
        let next = set(&path("user.address.city"), StateTree::from("Geneva"), &state);
        assert_eq!(next.to_json(), json!({ "user": { "address": { "city": "Geneva" } } }));
    }

    #[test]
    fn test_set_replaces_scalar_in_the_way() {
        let state = tree(json!({ "user": "n/a" }));
        let next = set(&path("user.name"), StateTree::from("Ada"), &state);
        assert_eq!(next.to_json(), json!({ "user": { "name": "Ada" } }));
    }

    #[test]
    fn test_set_array_element_shares_other_elements() {
        let state = tree(json!({ "rows": [{ "p": 1 }, { "p": 2 }] }));
        let next = set(&path("rows.1.p"), StateTree::from(20_i64), &state);

        let before = state.field("rows").and_then(StateTree::as_array).unwrap();
        let after = next.field("rows").and_then(StateTree::as_array).unwrap();
        assert!(before[0].ptr_eq(&after[0]));
        assert_eq!(after[1].to_json(), json!({ "p": 20 }));
    }

    #[test]
    fn test_set_array_past_end_pads_with_null() {
        let state = tree(json!({ "rows": [1] }));
        let next = set(&path("rows.3"), StateTree::from(4_i64), &state);
        assert_eq!(next.to_json(), json!({ "rows": [1, null, null, 4] }));
    }

    #[test]
    fn test_set_index_beyond_padding_reach_becomes_key() {
        let state = tree(json!({ "rows": [1] }));
        let next = set(&path("rows.18446744073709551615"), StateTree::from(4_i64), &state);
        assert_eq!(
            next.to_json(),
            json!({ "rows": { "0": 1, "18446744073709551615": 4 } })
        );

        let far = set(&path("rows.20000000"), StateTree::from(4_i64), &state);
        assert_eq!(far.to_json(), json!({ "rows": { "0": 1, "20000000": 4 } }));
    }

    #[test]
    fn test_set_pads_up_to_the_gap_limit() {
        let state = tree(json!({ "rows": [] }));
        let next = set(&path(&format!("rows.{MAX_ARRAY_GAP}")), StateTree::from(1_i64), &state);
        let rows = next.field("rows").and_then(StateTree::as_array).unwrap();
        assert_eq!(rows.len(), MAX_ARRAY_GAP + 1);
        assert!(rows[0].is_null());
    }

    #[test]
    fn test_set_named_key_on_array_keeps_elements() {
        let state = tree(json!({ "rows": ["a", "b"] }));
        let next = set(&path("rows.total"), StateTree::from(2_i64), &state);
        assert_eq!(next.to_json(), json!({ "rows": { "0": "a", "1": "b", "total": 2 } }));
    }

    #[test]
    fn test_set_index_under_missing_node_creates_array() {
        let state = tree(json!({}));
        let next = set(&path("rows.1.price"), StateTree::from(3_i64), &state);
        assert_eq!(next.to_json(), json!({ "rows": [null, { "price": 3 }] }));
    }
}
