//! Draft-free snapshots of in-progress state.

use crate::draft::{Draft, NodeBuf};
use crate::value::{Prop, Value, ValueKey};

/// Produce a fully substituted, draft-free, unfrozen view of `value`.
///
/// Unmodified drafts resolve to their base (shared, not copied); modified
/// drafts produce an independent shallow copy whose entries are recursively
/// snapshotted. Plain containers are rebuilt only when a draft was found
/// inside them. The draft tree itself is left untouched and not finalized.
pub fn snapshot(value: &Value) -> Value {
    snapshot_value(value)
}

pub(crate) fn snapshot_value(value: &Value) -> Value {
    match value {
        Value::Draft(draft) => snapshot_draft(draft),
        Value::Record(_) | Value::Sequence(_) | Value::Map(_) | Value::Set(_) => {
            if value.is_frozen() {
                // Frozen subtrees are finalized output and cannot hold drafts.
                value.clone()
            } else {
                snapshot_plain(value)
            }
        }
        other => other.clone(),
    }
}

fn snapshot_draft(draft: &Draft) -> Value {
    let (mut buf, prev_finalized) = {
        let mut st = draft.lock();
        if !st.modified {
            return st.base.clone();
        }
        let prev = st.finalized;
        // Suppress child-draft creation while the tree is being walked.
        st.finalized = true;
        match st.copy.clone() {
            Some(buf) => (buf, prev),
            None => {
                st.finalized = prev;
                return st.base.clone();
            }
        }
    };

    match &mut buf {
        NodeBuf::Record { props, .. } => {
            for prop in props.values_mut() {
                prop.value = snapshot_value(&prop.value);
            }
        }
        NodeBuf::Sequence(items) => {
            for item in items.iter_mut() {
                *item = snapshot_value(item);
            }
        }
        NodeBuf::Map(entries) => {
            for entry in entries.values_mut() {
                *entry = snapshot_value(entry);
            }
        }
        NodeBuf::Set(items) => {
            let values: Vec<Value> = items.iter().map(|k| snapshot_value(&k.0)).collect();
            *items = values.into_iter().map(ValueKey).collect();
        }
    }

    {
        let mut st = draft.lock();
        st.finalized = prev_finalized;
    }
    buf.into_value()
}

fn snapshot_plain(value: &Value) -> Value {
    match value {
        Value::Record(repr) => {
            let mut changed = false;
            let props = repr
                .props
                .iter()
                .map(|(k, p)| {
                    let snapped = snapshot_value(&p.value);
                    if !Value::same(&snapped, &p.value) {
                        changed = true;
                    }
                    (
                        k.clone(),
                        Prop {
                            value: snapped,
                            enumerable: p.enumerable,
                        },
                    )
                })
                .collect();
            if changed {
                Value::record_from_parts(repr.class.clone(), props)
            } else {
                value.clone()
            }
        }
        Value::Sequence(repr) => {
            let mut changed = false;
            let items = repr
                .items
                .iter()
                .map(|item| {
                    let snapped = snapshot_value(item);
                    if !Value::same(&snapped, item) {
                        changed = true;
                    }
                    snapped
                })
                .collect();
            if changed {
                Value::sequence_from_items(items)
            } else {
                value.clone()
            }
        }
        Value::Map(repr) => {
            let mut changed = false;
            let entries = repr
                .entries
                .iter()
                .map(|(k, v)| {
                    let snapped = snapshot_value(v);
                    if !Value::same(&snapped, v) {
                        changed = true;
                    }
                    (k.clone(), snapped)
                })
                .collect();
            if changed {
                Value::map_from_entries(entries)
            } else {
                value.clone()
            }
        }
        Value::Set(repr) => {
            let mut changed = false;
            let items = repr
                .items
                .iter()
                .map(|k| {
                    let snapped = snapshot_value(&k.0);
                    if !Value::same(&snapped, &k.0) {
                        changed = true;
                    }
                    ValueKey(snapped)
                })
                .collect();
            if changed {
                Value::set_from_keys(items)
            } else {
                value.clone()
            }
        }
        other => other.clone(),
    }
}
