//! The finalization engine.
//!
//! After a recipe returns, the draft tree is reconciled into the final
//! immutable value: unmodified drafts resolve to their shared base, modified
//! drafts commit their copies with every child substituted, patches are
//! derived where buffers are live, and the freeze hook is applied subject to
//! policy. The scope is revoked afterwards regardless of outcome.

use crate::draft::{Draft, NodeBuf};
use crate::error::{ChiselError, ChiselResult};
use crate::freeze::freeze;
use crate::generate::{generate_draft_patches, generate_replacement_patches, seg_for_map_key};
use crate::path::Seg;
use crate::scope::Scope;
use crate::value::{Prop, Value, ValueKey};
use indexmap::IndexMap;

/// Reconcile a finished run into its final value and revoke the scope.
///
/// `result` is the recipe's return: `None` leaves the root draft in charge;
/// anything else (other than the root draft itself) is a replacement, which
/// is rejected when the root was also mutated.
pub(crate) fn finish_run(scope: &Scope, result: Option<Value>) -> ChiselResult<Value> {
    scope.reset_unfinalized();
    let root = match scope.first_draft() {
        Some(root) => root,
        None => {
            scope.revoke();
            return Err(ChiselError::bad_argument("scope has no root draft"));
        }
    };
    let replaced = match &result {
        Some(Value::Draft(d)) => !Draft::ptr_eq(d, &root),
        Some(_) => true,
        None => false,
    };
    let outcome = if replaced {
        let replacement = result.unwrap_or(Value::Null);
        finalize_replacement(scope, &root, replacement)
    } else {
        finalize_value(scope, root.value(), Some(Vec::new()))
    };
    scope.revoke();
    let value = outcome?;
    Ok(if value.is_nothing() { Value::Null } else { value })
}

fn finalize_replacement(scope: &Scope, root: &Draft, replacement: Value) -> ChiselResult<Value> {
    if root.is_modified() {
        return Err(ChiselError::ModifiedAndReturned);
    }
    let finalized = if replacement.is_draftable() {
        let value = finalize_value(scope, replacement, None)?;
        maybe_freeze(scope, &value, false);
        value
    } else {
        replacement
    };
    if scope.patches_enabled() {
        generate_replacement_patches(scope, &root.base(), &finalized);
    }
    Ok(finalized)
}

/// Recursively finalize a value.
///
/// Frozen and non-draftable values pass through. Plain draftable values are
/// walked for drafts buried inside fresh substructure. Drafts belonging to a
/// different scope are honoured by their owning scope and returned unchanged.
pub(crate) fn finalize_value(
    scope: &Scope,
    value: Value,
    path: Option<Vec<Seg>>,
) -> ChiselResult<Value> {
    if value.is_frozen() {
        return Ok(value);
    }
    match value {
        Value::Draft(ref draft) => finalize_draft(scope, draft, path),
        _ if value.is_draftable() => finalize_plain(scope, value),
        _ => Ok(value),
    }
}

struct ParentCtx<'a> {
    state_addr: usize,
    assigned: &'a IndexMap<ValueKey, bool>,
    scope_is_root: bool,
}

fn finalize_draft(scope: &Scope, draft: &Draft, path: Option<Vec<Seg>>) -> ChiselResult<Value> {
    let (kind, base, mut buf, assigned, scope_is_root) = {
        let mut st = draft.lock();
        if !Scope::same(&st.scope, scope) {
            return Ok(Value::Draft(draft.clone()));
        }
        if !st.modified {
            let base = st.base.clone();
            drop(st);
            maybe_freeze(scope, &base, true);
            return Ok(base);
        }
        if st.finalized {
            return Ok(st.out.clone().unwrap_or_else(|| st.base.clone()));
        }
        st.finalized = true;
        st.scope.dec_unfinalized();
        let buf = st.copy.take().expect("modified draft must have a copy");
        (
            st.kind,
            st.base.clone(),
            buf,
            st.assigned.clone(),
            st.scope.is_root(),
        )
    };

    let ctx = ParentCtx {
        state_addr: draft.addr(),
        assigned: &assigned,
        scope_is_root,
    };

    match &mut buf {
        NodeBuf::Record { props, .. } => {
            for (key, prop) in props.iter_mut() {
                let assigned_key = ValueKey(Value::Str(key.as_str().into()));
                prop.value = finalize_property(
                    scope,
                    Some(&ctx),
                    prop.value.clone(),
                    Some(&assigned_key),
                    Some(Seg::Key(key.clone())),
                    prop.enumerable,
                    path.as_ref(),
                    false,
                )?;
            }
        }
        NodeBuf::Sequence(items) => {
            for (index, slot) in items.iter_mut().enumerate() {
                let assigned_key = ValueKey(Value::Int(index as i64));
                *slot = finalize_property(
                    scope,
                    Some(&ctx),
                    slot.clone(),
                    Some(&assigned_key),
                    Some(Seg::Index(index)),
                    true,
                    path.as_ref(),
                    false,
                )?;
            }
        }
        NodeBuf::Map(entries) => {
            for (key, slot) in entries.iter_mut() {
                *slot = finalize_property(
                    scope,
                    Some(&ctx),
                    slot.clone(),
                    Some(key),
                    seg_for_map_key(&key.0),
                    false,
                    path.as_ref(),
                    false,
                )?;
            }
        }
        NodeBuf::Set(items) => {
            // Snapshot and rebuild so re-insertions keep base order and
            // drafted members rewrite membership.
            let members: Vec<Value> = items.iter().map(|k| k.0.clone()).collect();
            items.clear();
            for member in members {
                let finalized = finalize_property(
                    scope,
                    Some(&ctx),
                    member,
                    None,
                    None,
                    false,
                    path.as_ref(),
                    true,
                )?;
                items.insert(ValueKey(finalized));
            }
        }
    }

    let result = buf.into_value();
    maybe_freeze(scope, &result, false);
    if let Some(base_path) = &path {
        if scope.patches_enabled() {
            generate_draft_patches(scope, kind, &base, &result, &assigned, base_path)?;
        }
    }
    {
        let mut st = draft.lock();
        st.out = Some(result.clone());
    }
    Ok(result)
}

/// Decide the finalized value of one copy entry.
#[allow(clippy::too_many_arguments)]
fn finalize_property(
    scope: &Scope,
    parent: Option<&ParentCtx<'_>>,
    child: Value,
    assigned_key: Option<&ValueKey>,
    seg: Option<Seg>,
    enumerable: bool,
    path: Option<&Vec<Seg>>,
    target_is_set: bool,
) -> ChiselResult<Value> {
    if let (Some(ctx), Value::Draft(d)) = (parent, &child) {
        if d.addr() == ctx.state_addr {
            return Err(ChiselError::CircularReference);
        }
    }

    if child.is_draft() {
        // Patch paths are extended only for children reached by read-through
        // drafting: sets emit whole-element patches, and keys recorded in
        // `assigned` are covered by the enclosing assignment's own patch.
        let sub_path = match (path, parent) {
            (Some(base_path), Some(ctx)) if !target_is_set => {
                let suppressed = assigned_key
                    .map(|k| ctx.assigned.contains_key(k))
                    .unwrap_or(false);
                if suppressed {
                    None
                } else {
                    match seg {
                        Some(seg) => {
                            let mut sub = base_path.clone();
                            sub.push(seg);
                            Some(sub)
                        }
                        None => {
                            if scope.patches_enabled() {
                                return Err(ChiselError::unsupported(
                                    "map key cannot be represented in a patch path",
                                ));
                            }
                            None
                        }
                    }
                }
            }
            _ => None,
        };
        let finalized = finalize_value(scope, child, sub_path)?;
        if finalized.is_draft() {
            // Still a draft: it belongs to an enclosing live scope, which
            // will finalize the shared subtree. Freezing now would clash.
            scope.clear_auto_freeze();
        }
        return Ok(finalized);
    }

    if child.is_draftable() && !child.is_frozen() {
        // Bulk-paste escape: with auto-freeze off and nothing left to
        // finalize, fresh plain substructure cannot contain live drafts.
        if !scope.auto_freeze_config() && scope.unfinalized() < 1 {
            return Ok(child);
        }
        let finalized = finalize_value(scope, child, None)?;
        let rootish = parent.map(|ctx| ctx.scope_is_root).unwrap_or(true);
        if rootish && enumerable {
            maybe_freeze(scope, &finalized, false);
        }
        return Ok(finalized);
    }

    Ok(child)
}

/// Walk a plain draftable container for drafts handed back inside fresh
/// structure, rebuilding only the nodes where something changed.
fn finalize_plain(scope: &Scope, value: Value) -> ChiselResult<Value> {
    match &value {
        Value::Record(repr) => {
            let mut changed = false;
            let mut props: IndexMap<String, Prop> = IndexMap::with_capacity(repr.props.len());
            for (key, prop) in &repr.props {
                let finalized = finalize_property(
                    scope,
                    None,
                    prop.value.clone(),
                    None,
                    None,
                    prop.enumerable,
                    None,
                    false,
                )?;
                if !Value::same(&finalized, &prop.value) {
                    changed = true;
                }
                props.insert(
                    key.clone(),
                    Prop {
                        value: finalized,
                        enumerable: prop.enumerable,
                    },
                );
            }
            Ok(if changed {
                Value::record_from_parts(repr.class.clone(), props)
            } else {
                value.clone()
            })
        }
        Value::Sequence(repr) => {
            let mut changed = false;
            let mut items = Vec::with_capacity(repr.items.len());
            for item in &repr.items {
                let finalized =
                    finalize_property(scope, None, item.clone(), None, None, true, None, false)?;
                if !Value::same(&finalized, item) {
                    changed = true;
                }
                items.push(finalized);
            }
            Ok(if changed {
                Value::sequence_from_items(items)
            } else {
                value.clone()
            })
        }
        Value::Map(repr) => {
            let mut changed = false;
            let mut entries: IndexMap<ValueKey, Value> =
                IndexMap::with_capacity(repr.entries.len());
            for (key, entry) in &repr.entries {
                let finalized =
                    finalize_property(scope, None, entry.clone(), None, None, false, None, false)?;
                if !Value::same(&finalized, entry) {
                    changed = true;
                }
                entries.insert(key.clone(), finalized);
            }
            Ok(if changed {
                Value::map_from_entries(entries)
            } else {
                value.clone()
            })
        }
        Value::Set(repr) => {
            let mut changed = false;
            let mut items = indexmap::IndexSet::with_capacity(repr.items.len());
            for key in &repr.items {
                let finalized =
                    finalize_property(scope, None, key.0.clone(), None, None, false, None, true)?;
                if !Value::same(&finalized, &key.0) {
                    changed = true;
                }
                items.insert(ValueKey(finalized));
            }
            Ok(if changed {
                Value::set_from_keys(items)
            } else {
                value.clone()
            })
        }
        _ => Ok(value),
    }
}

/// Apply the freeze hook when policy allows: root scope only, config
/// permitting, and no cross-scope draft has suppressed it.
pub(crate) fn maybe_freeze(scope: &Scope, value: &Value, deep: bool) {
    if scope.is_root() && scope.auto_freeze_config() && scope.can_auto_freeze() {
        freeze(value, deep);
    }
}
