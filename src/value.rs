//! State tree values.
//!
//! A `StateTree` is a JSON-shaped value whose arrays and objects sit behind
//! `Arc`. Cloning a node never copies its children, so a patched tree can
//! share every untouched branch with its predecessor and consumers can use
//! [`StateTree::ptr_eq`] as a cheap change detector.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{StoreError, StoreResult};

/// Object node storage.
pub type ObjectMap = BTreeMap<String, StateTree>;

/// A node of the canonical state.
///
/// # Examples
///
/// ```
/// use statebus::StateTree;
///
/// let tree = StateTree::from(serde_json::json!({ "count": 1 }));
/// assert!(tree.is_object());
/// assert_eq!(tree.field("count").and_then(StateTree::as_i64), Some(1));
/// ```
#[derive(Debug, Clone, Default)]
pub enum StateTree {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(Arc<str>),
    Array(Arc<Vec<StateTree>>),
    Object(Arc<ObjectMap>),
}

impl StateTree {
    /// Builds an empty object node.
    #[must_use]
    pub fn empty_object() -> Self {
        Self::Object(Arc::new(ObjectMap::new()))
    }

    /// Converts any serializable value into a tree.
    ///
    /// # Errors
    /// Returns `StoreError::Encode` if `value` cannot be represented as JSON.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> StoreResult<Self> {
        serde_json::to_value(value)
            .map(Self::from)
            .map_err(StoreError::encode)
    }

    /// Decodes this tree into a concrete type.
    ///
    /// # Errors
    /// Returns `StoreError::Decode` if the shape does not match `T`.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_value(self.to_json()).map_err(|e| StoreError::decode("<root>", e))
    }

    /// Deep-converts this tree back into a `serde_json::Value`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Number(v) => serde_json::Value::Number(v.clone()),
            Self::String(v) => serde_json::Value::String(v.to_string()),
            Self::Array(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Reference identity.
    ///
    /// Containers are identical when they share the same allocation; scalars
    /// have no identity of their own and compare by value.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Array(_) | Self::Object(_), _) | (_, Self::Array(_) | Self::Object(_)) => false,
            (a, b) => a == b,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(v) => v.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(&**v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectMap> {
        match self {
            Self::Object(map) => Some(&**map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[StateTree]> {
        match self {
            Self::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Looks up a direct child of an object node.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&StateTree> {
        self.as_object().and_then(|map| map.get(key))
    }
}

impl PartialEq for StateTree {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Arc::ptr_eq(a, b) || a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl From<serde_json::Value> for StateTree {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(v) => Self::Bool(v),
            serde_json::Value::Number(v) => Self::Number(v),
            serde_json::Value::String(v) => Self::String(Arc::from(v)),
            serde_json::Value::Array(items) => {
                Self::Array(Arc::new(items.into_iter().map(Self::from).collect()))
            }
            serde_json::Value::Object(map) => {
                Self::Object(Arc::new(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()))
            }
        }
    }
}

impl From<bool> for StateTree {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for StateTree {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for StateTree {
    fn from(value: &str) -> Self {
        Self::String(Arc::from(value))
    }
}

impl fmt::Display for StateTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for StateTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Number(v) => v.serialize(serializer),
            Self::String(v) => serializer.serialize_str(v),
            Self::Array(items) => items.as_slice().serialize(serializer),
            Self::Object(map) => map.as_ref().serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StateTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: i64,
        label: String,
    }

    #[test]
    fn test_json_conversion_preserves_shape() {
        let source = json!({ "a": { "x": 1 }, "b": [true, null, "s"] });
        let tree = StateTree::from(source.clone());
        assert_eq!(tree.to_json(), source);
    }

    #[test]
    fn test_typed_conversion() {
        let counter = Counter {
            count: 3,
            label: "n/a".to_string(),
        };
        let tree = StateTree::from_serialize(&counter).unwrap();
        assert_eq!(tree.field("count").and_then(StateTree::as_i64), Some(3));

        let back: Counter = tree.deserialize_into().unwrap();
        assert_eq!(back, counter);
    }

    #[test]
    fn test_decode_mismatch_is_error() {
        let tree = StateTree::from(json!({ "count": "three" }));
        let err = tree.deserialize_into::<Counter>().unwrap_err();
        assert!(err.is_codec());
    }

    #[test]
    fn test_clone_shares_containers() {
        let tree = StateTree::from(json!({ "a": { "x": 1 } }));
        let copy = tree.clone();
        assert!(tree.ptr_eq(&copy));
    }

    #[test]
    fn test_ptr_eq_distinguishes_equal_but_separate_objects() {
        let a = StateTree::from(json!({ "x": 1 }));
        let b = StateTree::from(json!({ "x": 1 }));
        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_scalars_compare_by_value_for_identity() {
        assert!(StateTree::from(5_i64).ptr_eq(&StateTree::from(5_i64)));
        assert!(!StateTree::from("a").ptr_eq(&StateTree::from("b")));
    }

    #[test]
    fn test_serde_roundtrip_through_json_text() {
        let tree = StateTree::from(json!({ "user": { "name": "Ada" } }));
        let text = serde_json::to_string(&tree).unwrap();
        let parsed: StateTree = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, tree);
    }
}
