//! Patches: discrete edits derived from observed draft mutations.
//!
//! The wire format is stable for consumers: `{"op": "add" | "replace" |
//! "remove", "path": [...], "value": ...}` with `value` omitted where absent.
//! Set-membership removals carry the removed element as their `value`, since
//! sets are addressed by element rather than by position.

use crate::path::Path;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A single edit against a record, sequence, map, or set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Patch {
    /// Introduce a value at a path that did not previously exist.
    Add {
        /// Target path.
        path: Path,
        /// Value to introduce.
        value: Value,
    },

    /// Replace the value at an existing path.
    Replace {
        /// Target path.
        path: Path,
        /// New value.
        value: Value,
    },

    /// Remove the value at a path, or a set element by value.
    Remove {
        /// Target path.
        path: Path,
        /// The removed element, present only for set membership patches.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

impl Patch {
    /// Create an `add` patch.
    #[inline]
    pub fn add(path: Path, value: impl Into<Value>) -> Self {
        Patch::Add {
            path,
            value: value.into(),
        }
    }

    /// Create a `replace` patch.
    #[inline]
    pub fn replace(path: Path, value: impl Into<Value>) -> Self {
        Patch::Replace {
            path,
            value: value.into(),
        }
    }

    /// Create a `remove` patch.
    #[inline]
    pub fn remove(path: Path) -> Self {
        Patch::Remove { path, value: None }
    }

    /// Create a set-membership `remove` patch carrying the removed element.
    #[inline]
    pub fn remove_value(path: Path, value: impl Into<Value>) -> Self {
        Patch::Remove {
            path,
            value: Some(value.into()),
        }
    }

    /// The path this patch targets.
    #[inline]
    pub fn path(&self) -> &Path {
        match self {
            Patch::Add { path, .. } => path,
            Patch::Replace { path, .. } => path,
            Patch::Remove { path, .. } => path,
        }
    }

    /// The carried value, if any.
    #[inline]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Patch::Add { value, .. } => Some(value),
            Patch::Replace { value, .. } => Some(value),
            Patch::Remove { value, .. } => value.as_ref(),
        }
    }

    /// The operation name as it appears on the wire.
    #[inline]
    pub fn op(&self) -> &'static str {
        match self {
            Patch::Add { .. } => "add",
            Patch::Replace { .. } => "replace",
            Patch::Remove { .. } => "remove",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{path, value, Value};

    #[test]
    fn test_constructors() {
        let p = Patch::add(path!("a"), 1);
        assert_eq!(p.op(), "add");
        assert_eq!(p.path(), &path!("a"));
        assert_eq!(p.value(), Some(&value!(1)));

        let p = Patch::remove(path!("a"));
        assert_eq!(p.value(), None);

        let p = Patch::remove_value(path!(0), 2);
        assert_eq!(p.value(), Some(&value!(2)));
    }

    #[test]
    fn test_wire_format() {
        let p = Patch::replace(path!("a", "x"), 9);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"op":"replace","path":["a","x"],"value":9}"#);

        let p = Patch::remove(path!(3));
        assert_eq!(
            serde_json::to_string(&p).unwrap(),
            r#"{"op":"remove","path":[3]}"#
        );

        let parsed: Patch = serde_json::from_str(r#"{"op":"add","path":["k"],"value":null}"#).unwrap();
        assert_eq!(parsed, Patch::add(path!("k"), Value::Null));
    }

    #[test]
    fn test_unknown_op_rejected() {
        let parsed: Result<Patch, _> =
            serde_json::from_str(r#"{"op":"splice","path":[],"value":1}"#);
        assert!(parsed.is_err());
    }
}
