//! Copy primitives: one-level draft copies and deep patch-value clones.

use crate::draft::NodeBuf;
use crate::error::{ChiselError, ChiselResult};
use crate::snapshot::snapshot_value;
use crate::value::{Prop, Value, ValueKey};

/// Controls how record shallow copies treat class accessors.
///
/// In strict mode the copy collapses class accessors into plain data
/// properties, reading each current value through the base (never through a
/// draft), so later writes store data instead of re-invoking a getter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StrictCopyMode {
    /// Collapse accessors on every record copy.
    Always,
    /// Collapse accessors only for class-tagged records.
    ClassOnly,
    /// Plain field-by-field copies; accessors stay on the class.
    #[default]
    Never,
}

/// Produce a same-kind mutable one-level copy of a draftable value.
///
/// Children are shared, not cloned; the engine swaps them for drafts or
/// finalized values as mutation and finalization proceed.
pub(crate) fn shallow_copy(base: &Value, mode: StrictCopyMode) -> ChiselResult<NodeBuf> {
    match base {
        Value::Record(repr) => {
            let mut props = repr.props.clone();
            let strict = match mode {
                StrictCopyMode::Always => true,
                StrictCopyMode::ClassOnly => repr.class.is_some(),
                StrictCopyMode::Never => false,
            };
            if strict {
                if let Some(class) = &repr.class {
                    for (key, accessor) in class.accessors() {
                        if !props.contains_key(key) {
                            let collapsed = (*accessor.get)(base);
                            props.insert(key.to_owned(), Prop::new(collapsed));
                        }
                    }
                }
            }
            Ok(NodeBuf::Record {
                class: repr.class.clone(),
                props,
            })
        }
        Value::Sequence(repr) => Ok(NodeBuf::Sequence(repr.items.clone())),
        Value::Map(repr) => Ok(NodeBuf::Map(repr.entries.clone())),
        Value::Set(repr) => Ok(NodeBuf::Set(repr.items.clone())),
        other => Err(ChiselError::not_draftable(other.type_name())),
    }
}

/// Fully clone a value, substituting drafts with their current snapshots.
///
/// Used for patch values so that a held patch never aliases into the draft
/// tree or the produced result. Kind, class tag, and the draftable marker all
/// survive the clone. Map keys keep their identity; set elements are cloned.
pub(crate) fn deep_clone(value: &Value) -> Value {
    match value {
        Value::Draft(_) => deep_clone(&snapshot_value(value)),
        Value::Record(repr) => {
            let props = repr
                .props
                .iter()
                .map(|(k, p)| {
                    (
                        k.clone(),
                        Prop {
                            value: deep_clone(&p.value),
                            enumerable: p.enumerable,
                        },
                    )
                })
                .collect();
            Value::record_from_parts(repr.class.clone(), props)
        }
        Value::Sequence(repr) => {
            Value::sequence_from_items(repr.items.iter().map(deep_clone).collect())
        }
        Value::Map(repr) => Value::map_from_entries(
            repr.entries
                .iter()
                .map(|(k, v)| (k.clone(), deep_clone(v)))
                .collect(),
        ),
        Value::Set(repr) => Value::set_from_keys(
            repr.items
                .iter()
                .map(|k| ValueKey(deep_clone(&k.0)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value;

    #[test]
    fn test_shallow_copy_shares_children() {
        let base = value!({"child": {"x": 1}});
        let buf = shallow_copy(&base, StrictCopyMode::Never).unwrap();
        let copied = buf.into_value();
        assert!(Value::same(
            &copied.get_key("child").unwrap(),
            &base.get_key("child").unwrap()
        ));
    }

    #[test]
    fn test_shallow_copy_rejects_scalars() {
        assert!(shallow_copy(&value!(1), StrictCopyMode::Never).is_err());
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let base = value!({"child": {"x": 1}, "list": [1, 2]});
        let cloned = deep_clone(&base);
        assert_eq!(cloned, base);
        assert!(!Value::same(
            &cloned.get_key("child").unwrap(),
            &base.get_key("child").unwrap()
        ));
    }

    #[test]
    fn test_strict_copy_collapses_accessors() {
        let class = crate::ClassTag::define("copy.Celsius")
            .draftable()
            .getter("fahrenheit", |v| {
                let c = match v.get_key("celsius") {
                    Some(Value::Int(c)) => c,
                    _ => 0,
                };
                Value::Int(c * 9 / 5 + 32)
            })
            .register();
        let base = Value::record_with_class(class, [("celsius", 100)]);

        let plain = shallow_copy(&base, StrictCopyMode::Never).unwrap().into_value();
        assert_eq!(plain.get_key("fahrenheit"), None);

        let strict = shallow_copy(&base, StrictCopyMode::ClassOnly)
            .unwrap()
            .into_value();
        assert_eq!(strict.get_key("fahrenheit"), Some(Value::Int(212)));
    }
}
