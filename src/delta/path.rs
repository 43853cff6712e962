//! Addresses of leaves inside a state tree.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// One step into a state tree: an object key or an array index.
///
/// Keys and indices are distinct variants, so an object key that happens to look like a
/// number (`"5"`) is never confused with array position 5, and a key containing `.` needs no
/// escaping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array position.
    Index(usize),
    /// Object key.
    Key(String),
}

impl PathSegment {
    /// Returns true for [`PathSegment::Index`].
    #[inline]
    #[must_use]
    pub const fn is_index(&self) -> bool {
        matches!(self, PathSegment::Index(_))
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Key(k) => f.write_str(k),
        }
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

/// A full address from the root of a state tree to a leaf.
///
/// Serialized as a JSON array of segments (`["players", 0, "position"]`). `Display` joins
/// segments with `.` for logs only; it is not parsed back.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(SmallVec<[PathSegment; 4]>);

impl Path {
    /// The empty path, addressing the root.
    #[must_use]
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    /// Returns a new path with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let mut next = self.clone();
        next.0.push(segment.into());
        next
    }

    /// The segments from root to leaf.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the root path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<PathSegment>> FromIterator<S> for Path {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn child_appends_without_touching_parent() {
        let root = Path::root();
        let players = root.child("players");
        let first = players.child(0usize);
        assert!(root.is_empty());
        assert_eq!(players.len(), 1);
        assert_eq!(first.segments(), &[PathSegment::from("players"), PathSegment::Index(0)]);
    }

    #[test]
    fn display_joins_with_dots() {
        let path: Path = vec![
            PathSegment::from("players"),
            PathSegment::Index(1),
            PathSegment::from("tokens"),
        ]
        .into_iter()
        .collect();
        assert_eq!(path.to_string(), "players.1.tokens");
    }

    #[test]
    fn numeric_looking_key_stays_a_key() {
        let path = Path::root().child("5");
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, r#"["5"]"#);
        let back: Path = serde_json::from_str(&json).unwrap();
        assert!(!back.segments()[0].is_index());
    }

    #[test]
    fn serializes_as_segment_array() {
        let path = Path::root().child("board").child(3usize).child("a.b");
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, r#"["board",3,"a.b"]"#);
        let back: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
