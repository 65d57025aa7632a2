//! Error types for chisel-state operations.

use crate::path::Path;
use thiserror::Error;

/// Result type alias for chisel-state operations.
pub type ChiselResult<T> = Result<T, ChiselError>;

/// Errors that can occur while drafting, finalizing, or replaying patches.
///
/// Every error is unrecoverable from the engine's perspective: the owning
/// scope is revoked on the failure path and the error propagates to the
/// caller. The base value is guaranteed unmodified on any failure.
#[derive(Debug, Error)]
pub enum ChiselError {
    /// The input value cannot be drafted.
    #[error("value is not draftable: {found}")]
    NotDraftable {
        /// Type name of the offending value.
        found: &'static str,
    },

    /// A write was attempted on a frozen value.
    #[error("cannot mutate a frozen {kind}")]
    FrozenMutation {
        /// Container kind of the frozen target.
        kind: &'static str,
    },

    /// An operation was attempted on a draft whose scope has ended.
    #[error("draft has been revoked: its owning scope has ended")]
    Revoked,

    /// A recipe both mutated its draft and returned a distinct value.
    #[error("a recipe may either mutate its draft or return a replacement, not both")]
    ModifiedAndReturned,

    /// A draft's copy was found to contain itself during finalization.
    #[error("circular reference detected during finalization")]
    CircularReference,

    /// A caller-supplied argument was invalid.
    #[error("bad argument: {message}")]
    BadArgument {
        /// Description of what went wrong.
        message: String,
    },

    /// The requested operation is not supported for the target kind.
    #[error("unsupported operation: {message}")]
    UnsupportedOperation {
        /// Description of the rejected operation.
        message: String,
    },

    /// A patch path could not be walked to its target.
    #[error("patch path {path} cannot be resolved: {reason}")]
    PathUnresolved {
        /// The offending path.
        path: Path,
        /// Why the walk stopped.
        reason: String,
    },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChiselError {
    /// Create a not-draftable error for a value of the given type.
    #[inline]
    pub fn not_draftable(found: &'static str) -> Self {
        ChiselError::NotDraftable { found }
    }

    /// Create a frozen-mutation error for the given container kind.
    #[inline]
    pub fn frozen_mutation(kind: &'static str) -> Self {
        ChiselError::FrozenMutation { kind }
    }

    /// Create a bad-argument error.
    #[inline]
    pub fn bad_argument(message: impl Into<String>) -> Self {
        ChiselError::BadArgument {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error.
    #[inline]
    pub fn unsupported(message: impl Into<String>) -> Self {
        ChiselError::UnsupportedOperation {
            message: message.into(),
        }
    }

    /// Create a path-unresolved error.
    #[inline]
    pub fn path_unresolved(path: Path, reason: impl Into<String>) -> Self {
        ChiselError::PathUnresolved {
            path,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    #[test]
    fn test_error_display() {
        let err = ChiselError::not_draftable("string");
        assert!(err.to_string().contains("not draftable"));

        let err = ChiselError::path_unresolved(path!("a", 0), "not a container");
        assert!(err.to_string().contains("$.a[0]"));
    }

    #[test]
    fn test_constructors() {
        assert!(matches!(
            ChiselError::frozen_mutation("record"),
            ChiselError::FrozenMutation { kind: "record" }
        ));
        assert!(matches!(
            ChiselError::bad_argument("nope"),
            ChiselError::BadArgument { .. }
        ));
        assert!(matches!(
            ChiselError::unsupported("nope"),
            ChiselError::UnsupportedOperation { .. }
        ));
    }
}
