//! Keyed-map and unique-set draft operations.
//!
//! These kinds cannot route through key-by-key property interception; each
//! mutating and reading method is implemented directly against the shared
//! draft state, with the same copy-on-first-write and revocation discipline
//! as the record layer.

use crate::draft::{mark_changed, prepare_copy, Draft, DraftState, NodeBuf};
use crate::error::ChiselResult;
use crate::value::{Kind, Value, ValueKey};
use indexmap::IndexSet;

impl Draft {
    // ------------------------------------------------------------------
    // Keyed map
    // ------------------------------------------------------------------

    /// Read a map entry; missing keys return `Null`.
    ///
    /// Like record reads, the first read of a draftable value still matching
    /// the base creates and caches a child draft.
    pub fn map_get(&self, key: &Value) -> ChiselResult<Value> {
        let mut st = self.lock();
        Draft::check_live(&st)?;
        check_kind(&st, Kind::Map, "map_get")?;
        let entry_key = ValueKey(key.clone());
        let val = match effective_map_get(&st, &entry_key) {
            None => return Ok(Value::Null),
            Some(v) => v,
        };
        if !val.is_draftable() || st.finalized {
            return Ok(val);
        }
        let base_val = st
            .base
            .as_map()
            .and_then(|r| r.entries.get(&entry_key))
            .cloned();
        match base_val {
            Some(bv) if Value::same(&val, &bv) => {
                prepare_copy(&mut st)?;
                let child = Draft::attach(val, Some(self), &st.scope.clone())?;
                if let Some(NodeBuf::Map(entries)) = &mut st.copy {
                    entries.insert(entry_key, Value::Draft(child.clone()));
                }
                Ok(Value::Draft(child))
            }
            _ => Ok(val),
        }
    }

    /// Read a map entry, requiring a drafted value.
    pub fn map_get_draft(&self, key: &Value) -> ChiselResult<Draft> {
        match self.map_get(key)? {
            Value::Draft(child) => Ok(child),
            other => Err(crate::ChiselError::bad_argument(format!(
                "map value is not a draftable child, found {}",
                other.type_name()
            ))),
        }
    }

    /// Write a map entry. Writing the stored value is a no-op.
    pub fn map_insert(&self, key: Value, value: impl Into<Value>) -> ChiselResult<()> {
        let value = value.into();
        {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            check_kind(&st, Kind::Map, "map_insert")?;
            let entry_key = ValueKey(key);
            if let Some(current) = effective_map_get(&st, &entry_key) {
                if Value::same(&current, &value) {
                    return Ok(());
                }
            }
            prepare_copy(&mut st)?;
            if let Some(NodeBuf::Map(entries)) = &mut st.copy {
                entries.insert(entry_key.clone(), value);
            }
            st.assigned.insert(entry_key, true);
        }
        mark_changed(self);
        Ok(())
    }

    /// Delete a map entry. Returns whether the key was present.
    pub fn map_remove(&self, key: &Value) -> ChiselResult<bool> {
        {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            check_kind(&st, Kind::Map, "map_remove")?;
            let entry_key = ValueKey(key.clone());
            if effective_map_get(&st, &entry_key).is_none() {
                return Ok(false);
            }
            prepare_copy(&mut st)?;
            let base_has = st
                .base
                .as_map()
                .map(|r| r.entries.contains_key(&entry_key))
                .unwrap_or(false);
            if base_has {
                st.assigned.insert(entry_key.clone(), false);
            } else {
                st.assigned.shift_remove(&entry_key);
            }
            if let Some(NodeBuf::Map(entries)) = &mut st.copy {
                entries.shift_remove(&entry_key);
            }
        }
        mark_changed(self);
        Ok(true)
    }

    /// Whether a map key is present.
    pub fn map_has(&self, key: &Value) -> ChiselResult<bool> {
        let st = self.lock();
        Draft::check_live(&st)?;
        check_kind(&st, Kind::Map, "map_has")?;
        let entry_key = ValueKey(key.clone());
        Ok(match &st.copy {
            Some(NodeBuf::Map(entries)) => entries.contains_key(&entry_key),
            _ => st
                .base
                .as_map()
                .map(|r| r.entries.contains_key(&entry_key))
                .unwrap_or(false),
        })
    }

    /// Remove every entry, recording each base key as deleted.
    pub fn map_clear(&self) -> ChiselResult<()> {
        let changed = {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            check_kind(&st, Kind::Map, "map_clear")?;
            let len = match &st.copy {
                Some(buf) => buf.len(),
                None => st.base.len().unwrap_or(0),
            };
            if len == 0 {
                false
            } else {
                prepare_copy(&mut st)?;
                st.assigned.clear();
                let base_keys: Vec<ValueKey> = st
                    .base
                    .as_map()
                    .map(|r| r.entries.keys().cloned().collect())
                    .unwrap_or_default();
                for key in base_keys {
                    st.assigned.insert(key, false);
                }
                if let Some(NodeBuf::Map(entries)) = &mut st.copy {
                    entries.clear();
                }
                true
            }
        };
        if changed {
            mark_changed(self);
        }
        Ok(())
    }

    /// Map keys of the effective value, in insertion order. Keys are served
    /// raw; only values are drafted.
    pub fn map_keys(&self) -> ChiselResult<Vec<Value>> {
        let st = self.lock();
        Draft::check_live(&st)?;
        check_kind(&st, Kind::Map, "map_keys")?;
        Ok(match &st.copy {
            Some(NodeBuf::Map(entries)) => entries.keys().map(|k| k.0.clone()).collect(),
            _ => st
                .base
                .as_map()
                .map(|r| r.entries.keys().map(|k| k.0.clone()).collect())
                .unwrap_or_default(),
        })
    }

    /// Map values, each routed through [`Draft::map_get`] so draftable values
    /// arrive drafted.
    pub fn map_values(&self) -> ChiselResult<Vec<Value>> {
        let keys = self.map_keys()?;
        keys.iter().map(|k| self.map_get(k)).collect()
    }

    /// Map entries, values routed through [`Draft::map_get`].
    pub fn map_entries(&self) -> ChiselResult<Vec<(Value, Value)>> {
        let keys = self.map_keys()?;
        keys.into_iter()
            .map(|k| {
                let v = self.map_get(&k)?;
                Ok((k, v))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Unique set
    // ------------------------------------------------------------------

    /// Whether the set contains `value`, either directly or through the child
    /// draft previously issued for it.
    pub fn set_has(&self, value: &Value) -> ChiselResult<bool> {
        let st = self.lock();
        Draft::check_live(&st)?;
        check_kind(&st, Kind::Set, "set_has")?;
        Ok(set_has_inner(&st, value))
    }

    /// Add an element. No-op if already present (by identity, or as a draft).
    pub fn set_add(&self, value: impl Into<Value>) -> ChiselResult<()> {
        let value = value.into();
        {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            check_kind(&st, Kind::Set, "set_add")?;
            if set_has_inner(&st, &value) {
                return Ok(());
            }
            prepare_set_copy(&mut st, self)?;
            if let Some(NodeBuf::Set(items)) = &mut st.copy {
                items.insert(ValueKey(value));
            }
        }
        mark_changed(self);
        Ok(())
    }

    /// Remove an element (or the draft issued for it). Returns whether
    /// anything was removed.
    pub fn set_remove(&self, value: &Value) -> ChiselResult<bool> {
        {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            check_kind(&st, Kind::Set, "set_remove")?;
            if !set_has_inner(&st, value) {
                return Ok(false);
            }
            prepare_set_copy(&mut st, self)?;
            let key = ValueKey(value.clone());
            let draft_key = st
                .set_drafts
                .get(&key)
                .map(|d| ValueKey(Value::Draft(d.clone())));
            if let Some(NodeBuf::Set(items)) = &mut st.copy {
                if !items.shift_remove(&key) {
                    if let Some(dk) = draft_key {
                        items.shift_remove(&dk);
                    }
                }
            }
        }
        mark_changed(self);
        Ok(true)
    }

    /// Remove every element.
    pub fn set_clear(&self) -> ChiselResult<()> {
        {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            check_kind(&st, Kind::Set, "set_clear")?;
            prepare_set_copy(&mut st, self)?;
            if let Some(NodeBuf::Set(items)) = &mut st.copy {
                items.clear();
            }
        }
        mark_changed(self);
        Ok(())
    }

    /// Set elements in insertion order.
    ///
    /// Iteration materializes the copy: the base is walked in order, every
    /// draftable element is drafted and recorded, so the draft tree is
    /// addressable before iteration starts. Iteration alone does not count
    /// as a mutation.
    pub fn set_values(&self) -> ChiselResult<Vec<Value>> {
        let mut st = self.lock();
        Draft::check_live(&st)?;
        check_kind(&st, Kind::Set, "set_values")?;
        prepare_set_copy(&mut st, self)?;
        Ok(match &st.copy {
            Some(NodeBuf::Set(items)) => items.iter().map(|k| k.0.clone()).collect(),
            _ => Vec::new(),
        })
    }
}

fn check_kind(st: &DraftState, kind: Kind, op: &str) -> ChiselResult<()> {
    if st.kind == kind {
        Ok(())
    } else {
        Err(crate::ChiselError::bad_argument(format!(
            "{op} requires a {} draft, found {}",
            crate::draft::kind_name(kind),
            crate::draft::kind_name(st.kind)
        )))
    }
}

fn effective_map_get(st: &DraftState, key: &ValueKey) -> Option<Value> {
    match &st.copy {
        Some(NodeBuf::Map(entries)) => entries.get(key).cloned(),
        _ => st.base.as_map().and_then(|r| r.entries.get(key)).cloned(),
    }
}

fn set_has_inner(st: &DraftState, value: &Value) -> bool {
    let key = ValueKey(value.clone());
    match &st.copy {
        Some(NodeBuf::Set(items)) => {
            if items.contains(&key) {
                return true;
            }
            match st.set_drafts.get(&key) {
                Some(draft) => items.contains(&ValueKey(Value::Draft(draft.clone()))),
                None => false,
            }
        }
        _ => st
            .base
            .as_set()
            .map(|r| r.items.contains(&key))
            .unwrap_or(false),
    }
}

/// Materialize a set draft's copy: walk the base in order, drafting each
/// draftable element and recording the original-to-draft mapping.
fn prepare_set_copy(st: &mut DraftState, draft: &Draft) -> ChiselResult<()> {
    if st.copy.is_some() {
        return Ok(());
    }
    let base_items: Vec<Value> = st
        .base
        .as_set()
        .map(|r| r.items.iter().map(|k| k.0.clone()).collect())
        .unwrap_or_default();
    let mut copy = IndexSet::with_capacity(base_items.len());
    for item in base_items {
        if item.is_draftable() {
            let child = Draft::attach(item.clone(), Some(draft), &st.scope.clone())?;
            st.set_drafts.insert(ValueKey(item), child.clone());
            copy.insert(ValueKey(Value::Draft(child)));
        } else {
            copy.insert(ValueKey(item));
        }
    }
    st.copy = Some(NodeBuf::Set(copy));
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{value, Engine, Value};

    fn engine() -> Engine {
        let engine = Engine::new();
        engine.set_auto_freeze(false);
        engine
    }

    #[test]
    fn test_map_insert_remove_has() {
        let base = Value::map_from([(value!("a"), value!(1))]);
        let out = engine()
            .produce(base, |d| {
                assert!(d.map_has(&value!("a"))?);
                assert_eq!(d.map_get(&value!("a"))?, Value::Int(1));
                d.map_insert(value!("b"), 2)?;
                assert!(d.map_remove(&value!("a"))?);
                assert!(!d.map_remove(&value!("a"))?);
                Ok(None)
            })
            .unwrap();
        assert_eq!(out.map_entries(), vec![(value!("b"), value!(2))]);
    }

    #[test]
    fn test_map_redundant_insert_is_noop() {
        let base = Value::map_from([(value!("k"), value!(1))]);
        let out = engine()
            .produce(base.clone(), |d| {
                d.map_insert(value!("k"), 1)?;
                assert!(!d.is_modified());
                Ok(None)
            })
            .unwrap();
        assert!(Value::same(&out, &base));
    }

    #[test]
    fn test_map_clear_marks_base_keys_deleted() {
        let base = Value::map_from([(value!("a"), value!(1)), (value!("b"), value!(2))]);
        let out = engine()
            .produce(base, |d| {
                d.map_clear()?;
                assert_eq!(d.len()?, 0);
                Ok(None)
            })
            .unwrap();
        assert_eq!(out.len(), Some(0));
    }

    #[test]
    fn test_map_values_arrive_drafted() {
        let base = Value::map_from([(value!("u"), value!({"n": "a"}))]);
        let out = engine()
            .produce(base, |d| {
                for entry in d.map_values()? {
                    assert!(entry.is_draft());
                }
                d.map_get_draft(&value!("u"))?.set("n", "b")?;
                Ok(None)
            })
            .unwrap();
        assert_eq!(
            out.map_get(&value!("u")).unwrap().get_key("n"),
            Some(value!("b"))
        );
    }

    #[test]
    fn test_set_add_delete_has() {
        let base = Value::set_from([1, 2, 3]);
        let out = engine()
            .produce(base, |d| {
                assert!(d.set_has(&value!(2))?);
                assert!(d.set_remove(&value!(2))?);
                assert!(!d.set_remove(&value!(2))?);
                d.set_add(4)?;
                // Re-adding an existing member is a no-op.
                d.set_add(1)?;
                assert_eq!(d.len()?, 3);
                Ok(None)
            })
            .unwrap();
        assert_eq!(out.set_values(), vec![value!(1), value!(3), value!(4)]);
    }

    #[test]
    fn test_set_iteration_drafts_members() {
        let base = Value::set_from([value!({"id": 1}), value!("plain")]);
        let out = engine()
            .produce(base, |d| {
                let members = d.set_values()?;
                assert_eq!(members.len(), 2);
                assert!(members[0].is_draft());
                assert!(!members[1].is_draft());
                // Iterating alone is not a modification.
                assert!(!d.is_modified());
                members[0].as_draft().unwrap().set("id", 2)?;
                Ok(None)
            })
            .unwrap();
        let members = out.set_values();
        assert_eq!(members[0].get_key("id"), Some(value!(2)));
    }

    #[test]
    fn test_set_has_sees_drafted_member() {
        let member = value!({"id": 1});
        let base = Value::set_from([member.clone()]);
        engine()
            .produce(base, |d| {
                let _ = d.set_values()?;
                // The member is now represented by its draft, but membership
                // checks against the original still succeed.
                assert!(d.set_has(&member)?);
                assert!(d.set_remove(&member)?);
                assert_eq!(d.len()?, 0);
                Ok(None)
            })
            .unwrap();
    }

    #[test]
    fn test_set_clear() {
        let out = engine()
            .produce(Value::set_from([1, 2]), |d| {
                d.set_clear()?;
                Ok(None)
            })
            .unwrap();
        assert_eq!(out.len(), Some(0));
    }
}
