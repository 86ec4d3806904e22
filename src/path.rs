//! Dotted property paths and typed field lenses.
//!
//! A `PropertyPath` addresses one node of the state tree, e.g. `user.name`
//! or `rows.0.price`. A `Field<V>` pairs a path with the Rust type of the
//! value stored there; fields are built once at setup time through
//! [`crate::Store::field`], which checks the path against the live state.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PathError;

/// Prefix reserved for system event types.
pub const SYSTEM_PREFIX: &str = "@@";

/// A validated dotted path into the state tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyPath(Arc<str>);

impl PropertyPath {
    /// Parse a dotted string such as `user.address.city`.
    ///
    /// # Errors
    /// Rejects empty paths, empty segments (`a..b`, trailing dots) and the
    /// reserved `@@` prefix.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        if input.is_empty() {
            return Err(PathError::Empty);
        }
        if input.starts_with(SYSTEM_PREFIX) {
            return Err(PathError::Reserved {
                path: input.to_string(),
            });
        }
        if input.split('.').any(str::is_empty) {
            return Err(PathError::EmptySegment {
                path: input.to_string(),
            });
        }
        Ok(Self(Arc::from(input)))
    }

    /// The path as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates the segments from the root down.
    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.split('.')
    }

    /// Number of segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// True if `self` names a strict descendant of `ancestor`.
    ///
    /// The character right after the ancestor prefix must be a `.`, so
    /// `username` is not a child of `user`.
    #[must_use]
    pub fn is_child_of(&self, ancestor: &PropertyPath) -> bool {
        is_child_type(self.as_str(), ancestor)
    }
}

/// Prefix check on a raw event type string, delimiter-aware.
pub(crate) fn is_child_type(event_type: &str, ancestor: &PropertyPath) -> bool {
    event_type
        .strip_prefix(ancestor.as_str())
        .is_some_and(|rest| rest.starts_with('.'))
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PropertyPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for PropertyPath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl AsRef<str> for PropertyPath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Serialize for PropertyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PropertyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A typed lens onto one property of the state.
///
/// `V` is the Rust type of the value at [`Field::path`]. Publishing through a
/// field only accepts a `V`, which restores at compile time the guarantee a
/// structural path type would give.
pub struct Field<V> {
    path: PropertyPath,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Field<V> {
    /// Wraps a path without checking it against any state.
    ///
    /// Prefer [`crate::Store::field`], which validates the path.
    #[must_use]
    pub const fn unchecked(path: PropertyPath) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// The dotted path this field reads and writes.
    #[must_use]
    pub const fn path(&self) -> &PropertyPath {
        &self.path
    }
}

impl<V> Clone for Field<V> {
    fn clone(&self) -> Self {
        Self::unchecked(self.path.clone())
    }
}

impl<V> fmt::Debug for Field<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("path", &self.path)
            .field("type", &std::any::type_name::<V>())
            .finish()
    }
}

impl<V> PartialEq for Field<V> {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl<V> Eq for Field<V> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> PropertyPath {
        PropertyPath::parse(s).unwrap()
    }

    #[test]
    fn test_parse_valid_paths() {
        assert_eq!(path("count").depth(), 1);
        let nested = path("user.address.city");
        assert_eq!(nested.segments().collect::<Vec<_>>(), vec!["user", "address", "city"]);
        assert_eq!(nested.to_string(), "user.address.city");
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        assert_eq!(PropertyPath::parse(""), Err(PathError::Empty));
        assert!(matches!(PropertyPath::parse("a..b"), Err(PathError::EmptySegment { .. })));
        assert!(matches!(PropertyPath::parse("a."), Err(PathError::EmptySegment { .. })));
        assert!(matches!(PropertyPath::parse(".a"), Err(PathError::EmptySegment { .. })));
        assert!(matches!(PropertyPath::parse("@@RESET"), Err(PathError::Reserved { .. })));
    }

    #[test]
    fn test_child_detection_requires_delimiter() {
        let user = path("user");
        assert!(path("user.name").is_child_of(&user));
        assert!(path("user.address.city").is_child_of(&user));
        assert!(!path("username").is_child_of(&user));
        assert!(!path("user").is_child_of(&user));
        assert!(!path("other.user.name").is_child_of(&user));
    }

    #[test]
    fn test_field_carries_path() {
        let field: Field<i64> = Field::unchecked(path("count"));
        assert_eq!(field.path().as_str(), "count");
        assert_eq!(field.clone(), field);
        assert!(format!("{field:?}").contains("i64"));
    }

    #[test]
    fn test_serde_validates_on_deserialize() {
        let parsed: PropertyPath = serde_json::from_str("\"user.name\"").unwrap();
        assert_eq!(parsed, path("user.name"));
        assert!(serde_json::from_str::<PropertyPath>("\"user..name\"").is_err());
    }
}
