//! The patch applier.
//!
//! Replays a patch list against a live draft or a plain value. Plain targets
//! are routed through a fresh producer, so applying patches is itself an
//! immutable update. Path walking rejects the prototype-polluting segments
//! `"__proto__"` and `"constructor"` at the wire level and reports a
//! descriptive error when an intermediate segment resolves to a non-container.

use crate::copy::deep_clone;
use crate::draft::Draft;
use crate::error::{ChiselError, ChiselResult};
use crate::patch::Patch;
use crate::path::{Path, Seg};
use crate::runtime::Engine;
use crate::value::{Kind, Value};

/// Apply `patches` to `base`, returning the new value.
///
/// A root `replace` patch resets the base wholesale, so the list is scanned
/// tail-first: everything before the last root replace is dead and skipped.
pub(crate) fn apply_patch_list(
    engine: &Engine,
    base: &Value,
    patches: &[Patch],
) -> ChiselResult<Value> {
    let mut base = base.clone();
    let mut rest = patches;
    for (i, patch) in patches.iter().enumerate().rev() {
        if patch.path().is_empty() {
            if let Patch::Replace { value, .. } = patch {
                base = value.clone();
                rest = &patches[i + 1..];
                break;
            }
        }
    }
    if let Value::Draft(draft) = &base {
        apply_to_draft(draft, rest)?;
        return Ok(base);
    }
    engine.produce(base, |draft| {
        apply_to_draft(draft, rest)?;
        Ok(None)
    })
}

pub(crate) fn apply_to_draft(root: &Draft, patches: &[Patch]) -> ChiselResult<()> {
    for patch in patches {
        let segments = patch.path().segments();
        let (walk, last) = match segments.split_last() {
            Some((last, walk)) => (walk, last),
            None => {
                return Err(ChiselError::unsupported(
                    "root operations cannot be applied to a live draft",
                ))
            }
        };
        let mut current = root.clone();
        for seg in walk {
            guard_segment(patch.path(), seg)?;
            match step_into(&current, seg, patch.path())? {
                Value::Draft(next) => current = next,
                other => {
                    return Err(ChiselError::path_unresolved(
                        patch.path().clone(),
                        format!("segment {seg} resolves to {}", other.type_name()),
                    ))
                }
            }
        }
        guard_segment(patch.path(), last)?;
        apply_leaf(&current, last, patch)?;
    }
    Ok(())
}

fn guard_segment(path: &Path, seg: &Seg) -> ChiselResult<()> {
    if let Seg::Key(key) = seg {
        if key == "__proto__" || key == "constructor" {
            return Err(ChiselError::path_unresolved(
                path.clone(),
                format!("forbidden segment {key:?}"),
            ));
        }
    }
    Ok(())
}

fn step_into(current: &Draft, seg: &Seg, path: &Path) -> ChiselResult<Value> {
    match (current.kind(), seg) {
        (Kind::Record, Seg::Key(key)) => current.get(key),
        (Kind::Record, Seg::Index(index)) => current.get(&index.to_string()),
        (Kind::Sequence, Seg::Index(index)) => current.get_index(*index),
        (Kind::Map, _) => current.map_get(&seg_to_value(seg)),
        (Kind::Set, _) => Err(ChiselError::path_unresolved(
            path.clone(),
            "cannot walk into a set".to_owned(),
        )),
        (kind, seg) => Err(ChiselError::path_unresolved(
            path.clone(),
            format!(
                "segment {seg} cannot address a {}",
                crate::draft::kind_name(kind)
            ),
        )),
    }
}

fn apply_leaf(parent: &Draft, seg: &Seg, patch: &Patch) -> ChiselResult<()> {
    match (patch, parent.kind()) {
        // replace
        (Patch::Replace { .. }, Kind::Set) => Err(ChiselError::unsupported(
            "set elements cannot be replaced; remove and add instead",
        )),
        (Patch::Replace { value, .. }, Kind::Map) => {
            parent.map_insert(seg_to_value(seg), deep_clone(value))
        }
        (Patch::Replace { value, .. }, Kind::Record) => {
            parent.set(&key_string(seg), deep_clone(value))
        }
        (Patch::Replace { value, .. }, Kind::Sequence) => match seg {
            Seg::Index(index) => parent.set_index(*index, deep_clone(value)),
            Seg::Key(key) if key == "length" => match value {
                Value::Int(len) if *len >= 0 => parent.set_len(*len as usize),
                _ => Err(ChiselError::bad_argument(
                    "sequence length must be a non-negative integer",
                )),
            },
            Seg::Key(_) => Err(ChiselError::path_unresolved(
                patch.path().clone(),
                "sequences accept only integer segments and \"length\"".to_owned(),
            )),
        },

        // add
        (Patch::Add { value, .. }, Kind::Sequence) => match seg {
            Seg::Key(key) if key == "-" => parent.push(deep_clone(value)),
            Seg::Index(index) => parent.insert_index(*index, deep_clone(value)),
            Seg::Key(_) => Err(ChiselError::path_unresolved(
                patch.path().clone(),
                "sequences accept only integer segments and \"-\"".to_owned(),
            )),
        },
        (Patch::Add { value, .. }, Kind::Map) => {
            parent.map_insert(seg_to_value(seg), deep_clone(value))
        }
        (Patch::Add { value, .. }, Kind::Set) => parent.set_add(deep_clone(value)),
        (Patch::Add { value, .. }, Kind::Record) => parent.set(&key_string(seg), deep_clone(value)),

        // remove
        (Patch::Remove { .. }, Kind::Sequence) => match seg {
            Seg::Index(index) => parent.remove_index(*index).map(|_| ()),
            Seg::Key(_) => Err(ChiselError::path_unresolved(
                patch.path().clone(),
                "sequences accept only integer segments".to_owned(),
            )),
        },
        (Patch::Remove { .. }, Kind::Map) => parent.map_remove(&seg_to_value(seg)).map(|_| ()),
        (Patch::Remove { value, .. }, Kind::Set) => {
            let member = value.as_ref().ok_or_else(|| {
                ChiselError::bad_argument("set remove patches must carry the removed value")
            })?;
            parent.set_remove(member).map(|_| ())
        }
        (Patch::Remove { .. }, Kind::Record) => parent.remove(&key_string(seg)),

        (_, Kind::Leaf) => Err(ChiselError::unsupported(
            "patches cannot address a non-container value",
        )),
    }
}

fn seg_to_value(seg: &Seg) -> Value {
    match seg {
        Seg::Key(key) => Value::from(key.as_str()),
        Seg::Index(index) => Value::Int(*index as i64),
    }
}

fn key_string(seg: &Seg) -> String {
    match seg {
        Seg::Key(key) => key.clone(),
        Seg::Index(index) => index.to_string(),
    }
}
