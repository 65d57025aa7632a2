//! The freeze hook: marks finalized subtrees read-only.

use crate::value::Value;

/// Mark a value read-only; with `deep`, its entire subtree.
///
/// Scalars are inherently immutable, drafts and non-draftable containers are
/// left alone. Frozen containers reject every in-place builder mutation with
/// `FrozenMutation` and short-circuit finalization.
pub fn freeze(value: &Value, deep: bool) {
    if value.is_draft() || value.is_frozen() || !value.is_draftable() {
        return;
    }
    value.mark_frozen();
    if !deep {
        return;
    }
    match value {
        Value::Record(repr) => {
            for prop in repr.props.values() {
                freeze(&prop.value, true);
            }
        }
        Value::Sequence(repr) => {
            for item in &repr.items {
                freeze(item, true);
            }
        }
        Value::Map(repr) => {
            for entry in repr.entries.values() {
                freeze(entry, true);
            }
        }
        Value::Set(repr) => {
            for key in &repr.items {
                freeze(&key.0, true);
            }
        }
        _ => {}
    }
}
