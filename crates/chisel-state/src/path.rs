//! Patch paths: sequences of string-or-integer segments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single path segment: a record/map key or a sequence index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seg {
    /// Key access into a record or keyed map.
    Key(String),
    /// Index access into a sequence.
    Index(usize),
}

impl Seg {
    /// Get the key if this is a key segment.
    #[inline]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Seg::Key(k) => Some(k),
            Seg::Index(_) => None,
        }
    }

    /// Get the index if this is an index segment.
    #[inline]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Seg::Key(_) => None,
            Seg::Index(i) => Some(*i),
        }
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => write!(f, ".{k}"),
            Seg::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::Key(s.to_owned())
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s)
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// A path into nested structure. Empty means the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Seg>);

impl Path {
    /// The empty (root) path.
    #[inline]
    pub fn root() -> Self {
        Path(Vec::new())
    }

    /// Build a path from segments.
    #[inline]
    pub fn from_segments(segments: Vec<Seg>) -> Self {
        Path(segments)
    }

    /// Append a key segment (builder pattern).
    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(Seg::Key(k.into()));
        self
    }

    /// Append an index segment (builder pattern).
    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    /// Push a segment.
    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    /// The segments of this path.
    #[inline]
    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    /// Whether this is the root path.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The last segment, if any.
    #[inline]
    pub fn last(&self) -> Option<&Seg> {
        self.0.last()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.0 {
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl From<Vec<Seg>> for Path {
    fn from(segments: Vec<Seg>) -> Self {
        Path(segments)
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Seg;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// Construct a [`Path`] from a sequence of segments.
///
/// String literals become key segments, integers become index segments.
///
/// # Examples
///
/// ```
/// use chisel_state::path;
///
/// let p = path!("users", 0, "name");
/// assert_eq!(p.to_string(), "$.users[0].name");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::Seg::from($seg));
        )+
        p
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_macro_and_display() {
        let p = path!("a", 2, "b");
        assert_eq!(p.len(), 3);
        assert_eq!(p[0], Seg::Key("a".into()));
        assert_eq!(p[1], Seg::Index(2));
        assert_eq!(p.to_string(), "$.a[2].b");
        assert_eq!(path!().to_string(), "$");
    }

    #[test]
    fn test_path_serde_wire_shape() {
        let p = path!("a", 0);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"["a",0]"#);
        let parsed: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, p);
    }
}
