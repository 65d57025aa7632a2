//! The patch generator.
//!
//! Patches are derived from observed mutation, not differential comparison:
//! records and maps read the per-key `assigned` record, sequences use
//! index-stable replaces plus tail append/truncate, and sets use per-element
//! set difference. Values captured while still drafts are deep-cloned so a
//! held patch never aliases into the draft tree.

use crate::copy::deep_clone;
use crate::error::{ChiselError, ChiselResult};
use crate::patch::Patch;
use crate::path::{Path, Seg};
use crate::scope::Scope;
use crate::value::{Kind, Value, ValueKey};
use indexmap::IndexMap;

/// Convert a map key into a patch path segment, when representable.
pub(crate) fn seg_for_map_key(key: &Value) -> Option<Seg> {
    match key {
        Value::Str(s) => Some(Seg::Key(s.to_string())),
        Value::Int(i) if *i >= 0 => Some(Seg::Index(*i as usize)),
        _ => None,
    }
}

pub(crate) fn clone_patch_value(value: &Value) -> Value {
    if value.is_draft() {
        deep_clone(value)
    } else {
        value.clone()
    }
}

/// Emit the single root-replace pair for a recipe that returned a
/// replacement. A *nothing* replacement is serialized as `Null`.
pub(crate) fn generate_replacement_patches(scope: &Scope, base: &Value, replacement: &Value) {
    let forward_value = if replacement.is_nothing() {
        Value::Null
    } else {
        clone_patch_value(replacement)
    };
    let inverse_value = clone_patch_value(base);
    scope.with_patches(move |bufs| {
        bufs.forward.push(Patch::replace(Path::root(), forward_value));
        bufs.inverse.push(Patch::replace(Path::root(), inverse_value));
    });
}

/// Derive the patch pairs for one finalized draft and append them to the
/// scope's buffers.
pub(crate) fn generate_draft_patches(
    scope: &Scope,
    kind: Kind,
    base: &Value,
    copy: &Value,
    assigned: &IndexMap<ValueKey, bool>,
    base_path: &[Seg],
) -> ChiselResult<()> {
    let (forward, inverse) = match kind {
        Kind::Record | Kind::Map => generate_assigned_patches(base, copy, assigned, base_path)?,
        Kind::Sequence => generate_sequence_patches(base, copy, assigned, base_path),
        Kind::Set => generate_set_patches(base, copy, base_path),
        Kind::Leaf => (Vec::new(), Vec::new()),
    };
    scope.with_patches(move |bufs| {
        bufs.forward.extend(forward);
        bufs.inverse.extend(inverse);
    });
    Ok(())
}

fn generate_assigned_patches(
    base: &Value,
    copy: &Value,
    assigned: &IndexMap<ValueKey, bool>,
    base_path: &[Seg],
) -> ChiselResult<(Vec<Patch>, Vec<Patch>)> {
    let mut forward = Vec::new();
    let mut inverse = Vec::new();
    for (key, &flag) in assigned {
        let old = container_get(base, &key.0);
        let new = container_get(copy, &key.0);
        let seg = seg_for_map_key(&key.0).ok_or_else(|| {
            ChiselError::unsupported("map key cannot be represented in a patch path")
        })?;
        let path = joined(base_path, seg);
        if !flag {
            forward.push(Patch::remove(path.clone()));
            inverse.push(Patch::add(
                path,
                clone_patch_value(&old.unwrap_or(Value::Null)),
            ));
        } else if let Some(old_value) = old {
            let new_value = new.unwrap_or(Value::Null);
            if Value::same(&old_value, &new_value) {
                continue;
            }
            forward.push(Patch::replace(path.clone(), clone_patch_value(&new_value)));
            inverse.push(Patch::replace(path, clone_patch_value(&old_value)));
        } else {
            let new_value = new.unwrap_or(Value::Null);
            forward.push(Patch::add(path.clone(), clone_patch_value(&new_value)));
            inverse.push(Patch::remove(path));
        }
    }
    Ok((forward, inverse))
}

/// Index-stable replaces plus tail append/truncate, never a mid-sequence
/// splice. Swapping (base, copy) together with (forward, inverse) when the
/// copy shrank halves the case analysis.
fn generate_sequence_patches(
    base: &Value,
    copy: &Value,
    assigned: &IndexMap<ValueKey, bool>,
    base_path: &[Seg],
) -> (Vec<Patch>, Vec<Patch>) {
    let base_items = base.items();
    let copy_items = copy.items();
    let swapped = copy_items.len() < base_items.len();
    let (from, to) = if swapped {
        (copy_items, base_items)
    } else {
        (base_items, copy_items)
    };

    let mut fwd = Vec::new();
    let mut inv = Vec::new();
    {
        let (patches, inverse): (&mut Vec<Patch>, &mut Vec<Patch>) = if swapped {
            (&mut inv, &mut fwd)
        } else {
            (&mut fwd, &mut inv)
        };

        for i in 0..from.len() {
            let flagged = assigned.get(&ValueKey(Value::Int(i as i64))) == Some(&true);
            if flagged && !Value::same(&to[i], &from[i]) {
                let path = joined(base_path, Seg::Index(i));
                patches.push(Patch::replace(path.clone(), clone_patch_value(&to[i])));
                inverse.push(Patch::replace(path, clone_patch_value(&from[i])));
            }
        }
        for i in from.len()..to.len() {
            patches.push(Patch::add(
                joined(base_path, Seg::Index(i)),
                clone_patch_value(&to[i]),
            ));
        }
        for i in (from.len()..to.len()).rev() {
            inverse.push(Patch::remove(joined(base_path, Seg::Index(i))));
        }
    }
    (fwd, inv)
}

/// Per-element set difference; membership patches carry the element itself.
fn generate_set_patches(base: &Value, copy: &Value, base_path: &[Seg]) -> (Vec<Patch>, Vec<Patch>) {
    let mut forward = Vec::new();
    let mut inverse = Vec::new();
    for (i, member) in base.set_values().iter().enumerate() {
        if !copy.set_contains(member) {
            let path = joined(base_path, Seg::Index(i));
            forward.push(Patch::remove_value(path.clone(), clone_patch_value(member)));
            inverse.push(Patch::add(path, clone_patch_value(member)));
        }
    }
    for (i, member) in copy.set_values().iter().enumerate() {
        if !base.set_contains(member) {
            let path = joined(base_path, Seg::Index(i));
            forward.push(Patch::add(path.clone(), clone_patch_value(member)));
            inverse.push(Patch::remove_value(path, clone_patch_value(member)));
        }
    }
    (forward, inverse)
}

fn container_get(container: &Value, key: &Value) -> Option<Value> {
    match (container, key) {
        (Value::Map(_), _) => container.map_get(key),
        (Value::Record(_), Value::Str(k)) => container.get_key(k),
        _ => None,
    }
}

fn joined(base_path: &[Seg], seg: Seg) -> Path {
    let mut segments = base_path.to_vec();
    segments.push(seg);
    Path::from_segments(segments)
}
