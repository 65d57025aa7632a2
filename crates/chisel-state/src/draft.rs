//! Draft handles and per-draft state.
//!
//! A [`Draft`] interposes on a base value: reads resolve against the base
//! until a write lazily materializes a one-level copy, and reading a
//! draftable child hands back a child draft so mutation can continue
//! arbitrarily deep. The original value is never touched.
//!
//! This module carries the shared state record plus the record and sequence
//! operations; keyed-map and unique-set operations live in
//! [`collections`](crate::collections).

use crate::class::Accessor;
use crate::copy::shallow_copy;
use crate::error::{ChiselError, ChiselResult};
use crate::scope::Scope;
use crate::value::{Kind, Prop, Value, ValueKey};
use indexmap::{IndexMap, IndexSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// The lazily materialized mutable copy of a single draft node.
///
/// Entries may hold child drafts; finalization substitutes them with their
/// finalized values before the buffer becomes a shared immutable value.
#[derive(Clone)]
pub(crate) enum NodeBuf {
    Record {
        class: Option<crate::class::ClassTag>,
        props: IndexMap<String, Prop>,
    },
    Sequence(Vec<Value>),
    Map(IndexMap<ValueKey, Value>),
    Set(IndexSet<ValueKey>),
}

impl NodeBuf {
    pub(crate) fn len(&self) -> usize {
        match self {
            NodeBuf::Record { props, .. } => props.len(),
            NodeBuf::Sequence(items) => items.len(),
            NodeBuf::Map(entries) => entries.len(),
            NodeBuf::Set(items) => items.len(),
        }
    }

    /// Convert the buffer into a shared immutable value.
    pub(crate) fn into_value(self) -> Value {
        match self {
            NodeBuf::Record { class, props } => Value::record_from_parts(class, props),
            NodeBuf::Sequence(items) => Value::sequence_from_items(items),
            NodeBuf::Map(entries) => Value::map_from_entries(entries),
            NodeBuf::Set(items) => Value::set_from_keys(items),
        }
    }
}

/// Per-draft bookkeeping.
pub(crate) struct DraftState {
    pub(crate) kind: Kind,
    /// The original value; never mutated by the engine.
    pub(crate) base: Value,
    /// Lazily allocated mutable copy; `modified` implies it is present.
    pub(crate) copy: Option<NodeBuf>,
    /// Sticky once true; propagated eagerly to every ancestor on first write.
    pub(crate) modified: bool,
    /// Set during finalization; suppresses further child-draft creation.
    pub(crate) finalized: bool,
    /// True for drafts whose lifetime outlives a single recipe call.
    pub(crate) manual: bool,
    /// Set when the owning scope ends; every later operation fails.
    pub(crate) revoked: bool,
    /// Per-key write record: `true` = assigned, `false` = deleted. Record
    /// keys are strings, sequence keys are indices, map keys are arbitrary.
    pub(crate) assigned: IndexMap<ValueKey, bool>,
    /// Set drafts only: original element to the child draft issued for it.
    pub(crate) set_drafts: IndexMap<ValueKey, Draft>,
    pub(crate) parent: Option<Weak<Mutex<DraftState>>>,
    pub(crate) scope: Scope,
    /// Finalized output, cached so repeat visits are stable.
    pub(crate) out: Option<Value>,
}

/// A transparent mutable stand-in for a base value.
///
/// Drafts are cheap to clone and compare by identity. All operations check
/// the revocation flag first; once the owning scope ends, a captured draft
/// only ever reports [`ChiselError::Revoked`].
#[derive(Clone)]
pub struct Draft {
    pub(crate) state: Arc<Mutex<DraftState>>,
}

impl Draft {
    /// Create a draft over `base`, registered with `scope`.
    pub(crate) fn attach(
        base: Value,
        parent: Option<&Draft>,
        scope: &Scope,
    ) -> ChiselResult<Draft> {
        if base.is_draft() || !base.is_draftable() {
            return Err(ChiselError::not_draftable(base.type_name()));
        }
        let kind = match &base {
            Value::Record(_) => Kind::Record,
            Value::Sequence(_) => Kind::Sequence,
            Value::Map(_) => Kind::Map,
            Value::Set(_) => Kind::Set,
            _ => return Err(ChiselError::not_draftable(base.type_name())),
        };
        let draft = Draft::with_state(kind, base, parent, scope);
        scope.register(&draft);
        Ok(draft)
    }

    /// Create the inert stand-in used when a recipe runs over a non-container
    /// base. It supports reading the base and nothing else.
    pub(crate) fn attach_leaf(base: Value, scope: &Scope) -> Draft {
        Draft::with_state(Kind::Leaf, base, None, scope)
    }

    fn with_state(kind: Kind, base: Value, parent: Option<&Draft>, scope: &Scope) -> Draft {
        Draft {
            state: Arc::new(Mutex::new(DraftState {
                kind,
                base,
                copy: None,
                modified: false,
                finalized: false,
                manual: false,
                revoked: false,
                assigned: IndexMap::new(),
                set_drafts: IndexMap::new(),
                parent: parent.map(|p| Arc::downgrade(&p.state)),
                scope: scope.clone(),
                out: None,
            })),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DraftState> {
        self.state.lock().expect("draft state mutex poisoned")
    }

    #[inline]
    pub(crate) fn ptr_eq(a: &Draft, b: &Draft) -> bool {
        Arc::ptr_eq(&a.state, &b.state)
    }

    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }

    /// The container kind of this draft.
    pub fn kind(&self) -> Kind {
        self.lock().kind
    }

    /// Whether at least one write has been observed in this subtree.
    pub fn is_modified(&self) -> bool {
        self.lock().modified
    }

    /// Whether the owning scope has ended.
    pub fn is_revoked(&self) -> bool {
        self.lock().revoked
    }

    /// The original value this draft stands in for.
    pub fn base(&self) -> Value {
        self.lock().base.clone()
    }

    /// This draft as a [`Value`].
    pub fn value(&self) -> Value {
        Value::Draft(self.clone())
    }

    pub(crate) fn revoke(&self) {
        self.lock().revoked = true;
    }

    pub(crate) fn check_live(st: &DraftState) -> ChiselResult<()> {
        if st.revoked {
            Err(ChiselError::Revoked)
        } else {
            Ok(())
        }
    }

    fn check_kind(st: &DraftState, kind: Kind, op: &str) -> ChiselResult<()> {
        if st.kind == kind {
            Ok(())
        } else {
            Err(ChiselError::bad_argument(format!(
                "{op} requires a {} draft, found {}",
                kind_name(kind),
                kind_name(st.kind)
            )))
        }
    }

    /// Effective size of the draft: the copy if present, otherwise the base.
    pub fn len(&self) -> ChiselResult<usize> {
        let st = self.lock();
        Draft::check_live(&st)?;
        Ok(match &st.copy {
            Some(buf) => buf.len(),
            None => st.base.len().unwrap_or(0),
        })
    }

    /// Whether the draft is empty.
    pub fn is_empty(&self) -> ChiselResult<bool> {
        Ok(self.len()? == 0)
    }

    // ------------------------------------------------------------------
    // Record operations
    // ------------------------------------------------------------------

    /// Read a record property.
    ///
    /// The first read of a draftable child that still matches the base
    /// materializes a child draft, stores it in the copy, and returns it;
    /// subsequent reads return the same child. Missing keys fall back to the
    /// base class's accessors (the getter is invoked bound to this draft),
    /// then to `Null`.
    pub fn get(&self, key: &str) -> ChiselResult<Value> {
        let step = {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            Draft::check_kind(&st, Kind::Record, "get")?;
            let existing = effective_record_get(&st, key);
            match existing {
                None => GetStep::Missing(class_accessor(&st.base, key)),
                Some(val) => {
                    if !val.is_draftable() || st.finalized {
                        GetStep::Done(val)
                    } else {
                        let base_val = base_record_get(&st, key);
                        match base_val {
                            Some(bv) if Value::same(&val, &bv) => {
                                prepare_copy(&mut st)?;
                                let child = Draft::attach(val, Some(self), &st.scope.clone())?;
                                record_copy_set(&mut st, key, Value::Draft(child.clone()));
                                GetStep::Done(Value::Draft(child))
                            }
                            _ => GetStep::Done(val),
                        }
                    }
                }
            }
        };
        match step {
            GetStep::Done(v) => Ok(v),
            GetStep::Missing(Some(accessor)) => Ok((*accessor.get)(&self.value())),
            GetStep::Missing(None) => Ok(Value::Null),
        }
    }

    /// Read a record property, requiring a drafted child.
    ///
    /// Convenience over [`Draft::get`] for navigating nested structure.
    pub fn get_draft(&self, key: &str) -> ChiselResult<Draft> {
        match self.get(key)? {
            Value::Draft(child) => Ok(child),
            other => Err(ChiselError::bad_argument(format!(
                "property {key:?} is not a draftable child, found {}",
                other.type_name()
            ))),
        }
    }

    /// Write a record property.
    ///
    /// Writing the value already stored is a no-op (NaN treated as equal to
    /// itself); writing a child draft back over its own base slot records the
    /// mapping without counting as a mutation. A class setter, when present
    /// on the base, takes the write instead.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> ChiselResult<()> {
        let value = value.into();
        let incoming_base = match &value {
            Value::Draft(d) if !Draft::ptr_eq(d, self) => Some(d.base()),
            _ => None,
        };
        let setter = {
            let st = self.lock();
            Draft::check_live(&st)?;
            Draft::check_kind(&st, Kind::Record, "set")?;
            class_accessor(&st.base, key).and_then(|a| a.set)
        };
        if let Some(setter) = setter {
            return (*setter)(self, value);
        }
        let need_mark = {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            let assigned_key = ValueKey(Value::Str(key.into()));
            if !st.modified {
                let current = effective_record_get(&st, key);
                let has = current.is_some();
                let current = current.unwrap_or(Value::Null);
                if let Some(ib) = &incoming_base {
                    if Value::same(ib, &current) {
                        prepare_copy(&mut st)?;
                        record_copy_set(&mut st, key, value);
                        st.assigned.shift_remove(&assigned_key);
                        return Ok(());
                    }
                }
                if Value::same(&value, &current) && (has || !matches!(value, Value::Null)) {
                    return Ok(());
                }
                prepare_copy(&mut st)?;
                record_copy_set(&mut st, key, value);
                st.assigned.insert(assigned_key, true);
                true
            } else {
                if let Some(NodeBuf::Record { props, .. }) = &st.copy {
                    if let Some(stored) = props.get(key) {
                        if Value::same(&stored.value, &value) {
                            return Ok(());
                        }
                    }
                }
                record_copy_set(&mut st, key, value);
                st.assigned.insert(assigned_key, true);
                false
            }
        };
        if need_mark {
            mark_changed(self);
        }
        Ok(())
    }

    /// Delete a record property.
    pub fn remove(&self, key: &str) -> ChiselResult<()> {
        let need_mark = {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            Draft::check_kind(&st, Kind::Record, "remove")?;
            let assigned_key = ValueKey(Value::Str(key.into()));
            let base_has = st
                .base
                .as_record()
                .map(|r| r.props.contains_key(key))
                .unwrap_or(false);
            let mark = if base_has {
                st.assigned.insert(assigned_key, false);
                prepare_copy(&mut st)?;
                true
            } else {
                st.assigned.shift_remove(&assigned_key);
                false
            };
            if let Some(NodeBuf::Record { props, .. }) = &mut st.copy {
                props.shift_remove(key);
            }
            mark
        };
        if need_mark {
            mark_changed(self);
        }
        Ok(())
    }

    /// Whether a record property is present.
    pub fn has(&self, key: &str) -> ChiselResult<bool> {
        let st = self.lock();
        Draft::check_live(&st)?;
        Draft::check_kind(&st, Kind::Record, "has")?;
        Ok(match &st.copy {
            Some(NodeBuf::Record { props, .. }) => props.contains_key(key),
            _ => st
                .base
                .as_record()
                .map(|r| r.props.contains_key(key))
                .unwrap_or(false),
        })
    }

    /// Record keys, in insertion order of the effective value.
    pub fn keys(&self) -> ChiselResult<Vec<String>> {
        let st = self.lock();
        Draft::check_live(&st)?;
        Draft::check_kind(&st, Kind::Record, "keys")?;
        Ok(match &st.copy {
            Some(NodeBuf::Record { props, .. }) => props.keys().cloned().collect(),
            _ => st.base.keys(),
        })
    }

    // ------------------------------------------------------------------
    // Sequence operations
    // ------------------------------------------------------------------

    /// Read a sequence element; out-of-range reads return `Null`.
    pub fn get_index(&self, index: usize) -> ChiselResult<Value> {
        let mut st = self.lock();
        Draft::check_live(&st)?;
        Draft::check_kind(&st, Kind::Sequence, "get_index")?;
        let val = match effective_seq_get(&st, index) {
            None => return Ok(Value::Null),
            Some(v) => v,
        };
        if !val.is_draftable() || st.finalized {
            return Ok(val);
        }
        let base_val = st.base.as_sequence().and_then(|r| r.items.get(index)).cloned();
        match base_val {
            Some(bv) if Value::same(&val, &bv) => {
                prepare_copy(&mut st)?;
                let child = Draft::attach(val, Some(self), &st.scope.clone())?;
                seq_copy_set(&mut st, index, Value::Draft(child.clone()));
                Ok(Value::Draft(child))
            }
            _ => Ok(val),
        }
    }

    /// Read a sequence element, requiring a drafted child.
    pub fn get_index_draft(&self, index: usize) -> ChiselResult<Draft> {
        match self.get_index(index)? {
            Value::Draft(child) => Ok(child),
            other => Err(ChiselError::bad_argument(format!(
                "element {index} is not a draftable child, found {}",
                other.type_name()
            ))),
        }
    }

    /// Write a sequence element. `index == len` appends; beyond that fails.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) -> ChiselResult<()> {
        let value = value.into();
        let incoming_base = match &value {
            Value::Draft(d) if !Draft::ptr_eq(d, self) => Some(d.base()),
            _ => None,
        };
        let need_mark = {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            Draft::check_kind(&st, Kind::Sequence, "set_index")?;
            let len = effective_seq_len(&st);
            if index > len {
                return Err(ChiselError::bad_argument(format!(
                    "sequence index {index} out of bounds (len: {len})"
                )));
            }
            let assigned_key = ValueKey(Value::Int(index as i64));
            if !st.modified {
                if index < len {
                    let current = effective_seq_get(&st, index).unwrap_or(Value::Null);
                    if let Some(ib) = &incoming_base {
                        if Value::same(ib, &current) {
                            prepare_copy(&mut st)?;
                            seq_copy_set(&mut st, index, value);
                            st.assigned.shift_remove(&assigned_key);
                            return Ok(());
                        }
                    }
                    if Value::same(&value, &current) {
                        return Ok(());
                    }
                }
                prepare_copy(&mut st)?;
                seq_copy_set(&mut st, index, value);
                st.assigned.insert(assigned_key, true);
                true
            } else {
                if let Some(NodeBuf::Sequence(items)) = &st.copy {
                    if let Some(stored) = items.get(index) {
                        if Value::same(stored, &value) {
                            return Ok(());
                        }
                    }
                }
                seq_copy_set(&mut st, index, value);
                st.assigned.insert(assigned_key, true);
                false
            }
        };
        if need_mark {
            mark_changed(self);
        }
        Ok(())
    }

    /// Resize the sequence: shrinking truncates, growing pads with `Null`.
    pub fn set_len(&self, len: usize) -> ChiselResult<()> {
        let changed = {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            Draft::check_kind(&st, Kind::Sequence, "set_len")?;
            if effective_seq_len(&st) == len {
                false
            } else {
                prepare_copy(&mut st)?;
                if let Some(NodeBuf::Sequence(items)) = &mut st.copy {
                    items.resize(len, Value::Null);
                }
                true
            }
        };
        if changed {
            mark_changed(self);
        }
        Ok(())
    }

    /// Append an element.
    pub fn push(&self, value: impl Into<Value>) -> ChiselResult<()> {
        let len = self.len()?;
        self.set_index(len, value)
    }

    /// Remove and return the last element, if any.
    pub fn pop(&self) -> ChiselResult<Option<Value>> {
        let (len, last) = {
            let st = self.lock();
            Draft::check_live(&st)?;
            Draft::check_kind(&st, Kind::Sequence, "pop")?;
            let len = effective_seq_len(&st);
            if len == 0 {
                return Ok(None);
            }
            (len, effective_seq_get(&st, len - 1).unwrap_or(Value::Null))
        };
        self.set_len(len - 1)?;
        Ok(Some(last))
    }

    /// Insert an element, shifting the tail right.
    pub fn insert_index(&self, index: usize, value: impl Into<Value>) -> ChiselResult<()> {
        let value = value.into();
        {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            Draft::check_kind(&st, Kind::Sequence, "insert_index")?;
            let len = effective_seq_len(&st);
            if index > len {
                return Err(ChiselError::bad_argument(format!(
                    "sequence index {index} out of bounds (len: {len})"
                )));
            }
            prepare_copy(&mut st)?;
            let state = &mut *st;
            if let Some(NodeBuf::Sequence(items)) = &mut state.copy {
                items.insert(index, value);
                let new_len = items.len();
                for i in index..new_len {
                    state.assigned.insert(ValueKey(Value::Int(i as i64)), true);
                }
            }
        }
        mark_changed(self);
        Ok(())
    }

    /// Remove an element, shifting the tail left. Returns the removed value.
    pub fn remove_index(&self, index: usize) -> ChiselResult<Value> {
        let removed = {
            let mut st = self.lock();
            Draft::check_live(&st)?;
            Draft::check_kind(&st, Kind::Sequence, "remove_index")?;
            let len = effective_seq_len(&st);
            if index >= len {
                return Err(ChiselError::bad_argument(format!(
                    "sequence index {index} out of bounds (len: {len})"
                )));
            }
            prepare_copy(&mut st)?;
            let state = &mut *st;
            match &mut state.copy {
                Some(NodeBuf::Sequence(items)) => {
                    let removed = items.remove(index);
                    let new_len = items.len();
                    for i in index..new_len {
                        state.assigned.insert(ValueKey(Value::Int(i as i64)), true);
                    }
                    removed
                }
                _ => Value::Null,
            }
        };
        mark_changed(self);
        Ok(removed)
    }

    /// Delete an element by index, leaving a `Null` slot. No-op past the end.
    pub fn delete_index(&self, index: usize) -> ChiselResult<()> {
        if index >= self.len()? {
            return Ok(());
        }
        self.set_index(index, Value::Null)
    }

    /// Sequence elements, each routed through [`Draft::get_index`] so
    /// draftable children arrive drafted.
    pub fn items(&self) -> ChiselResult<Vec<Value>> {
        let len = self.len()?;
        (0..len).map(|i| self.get_index(i)).collect()
    }
}

impl PartialEq for Draft {
    fn eq(&self, other: &Self) -> bool {
        Draft::ptr_eq(self, other)
    }
}

impl fmt::Debug for Draft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_lock() {
            Ok(st) => f
                .debug_struct("Draft")
                .field("kind", &st.kind)
                .field("modified", &st.modified)
                .field("revoked", &st.revoked)
                .finish(),
            Err(_) => f.write_str("Draft(<locked>)"),
        }
    }
}

enum GetStep {
    Done(Value),
    Missing(Option<Accessor>),
}

pub(crate) fn kind_name(kind: Kind) -> &'static str {
    match kind {
        Kind::Record => "record",
        Kind::Sequence => "sequence",
        Kind::Map => "map",
        Kind::Set => "set",
        Kind::Leaf => "leaf",
    }
}

/// Allocate the draft's copy from its base if not yet present.
pub(crate) fn prepare_copy(st: &mut DraftState) -> ChiselResult<()> {
    if st.copy.is_none() {
        st.copy = Some(shallow_copy(&st.base, st.scope.strict_copy())?);
    }
    Ok(())
}

/// Set the sticky modified flag on a draft and every ancestor.
pub(crate) fn mark_changed(draft: &Draft) {
    let mut current = draft.clone();
    loop {
        let parent = {
            let mut st = current.lock();
            if st.modified {
                return;
            }
            st.modified = true;
            st.parent.as_ref().and_then(Weak::upgrade)
        };
        match parent {
            Some(state) => current = Draft { state },
            None => return,
        }
    }
}

fn class_accessor(base: &Value, key: &str) -> Option<Accessor> {
    base.class().and_then(|c| c.accessor(key).cloned())
}

pub(crate) fn effective_record_get(st: &DraftState, key: &str) -> Option<Value> {
    match &st.copy {
        Some(NodeBuf::Record { props, .. }) => props.get(key).map(|p| p.value.clone()),
        _ => base_record_get(st, key),
    }
}

fn base_record_get(st: &DraftState, key: &str) -> Option<Value> {
    st.base
        .as_record()
        .and_then(|r| r.props.get(key))
        .map(|p| p.value.clone())
}

fn record_copy_set(st: &mut DraftState, key: &str, value: Value) {
    if let Some(NodeBuf::Record { props, .. }) = &mut st.copy {
        match props.get_mut(key) {
            Some(prop) => prop.value = value,
            None => {
                props.insert(key.to_owned(), Prop::new(value));
            }
        }
    }
}

fn effective_seq_get(st: &DraftState, index: usize) -> Option<Value> {
    match &st.copy {
        Some(NodeBuf::Sequence(items)) => items.get(index).cloned(),
        _ => st.base.as_sequence().and_then(|r| r.items.get(index)).cloned(),
    }
}

fn effective_seq_len(st: &DraftState) -> usize {
    match &st.copy {
        Some(NodeBuf::Sequence(items)) => items.len(),
        _ => st.base.len().unwrap_or(0),
    }
}

fn seq_copy_set(st: &mut DraftState, index: usize, value: Value) {
    if let Some(NodeBuf::Sequence(items)) = &mut st.copy {
        if index == items.len() {
            items.push(value);
        } else if index < items.len() {
            items[index] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{value, ChiselError, Engine, Value};

    fn engine() -> Engine {
        let engine = Engine::new();
        engine.set_auto_freeze(false);
        engine
    }

    #[test]
    fn test_reads_resolve_against_base() {
        engine()
            .produce(value!({"a": 1}), |d| {
                assert_eq!(d.get("a")?, Value::Int(1));
                assert_eq!(d.get("missing")?, Value::Null);
                assert!(d.has("a")?);
                assert!(!d.has("missing")?);
                assert_eq!(d.keys()?, vec!["a".to_string()]);
                assert!(!d.is_modified());
                Ok(None)
            })
            .unwrap();
    }

    #[test]
    fn test_first_read_of_child_returns_stable_draft() {
        engine()
            .produce(value!({"sub": {"x": 1}}), |d| {
                let first = d.get("sub")?;
                let second = d.get("sub")?;
                assert!(first.is_draft());
                assert!(Value::same(&first, &second));
                // Reading alone is not a modification.
                assert!(!d.is_modified());
                Ok(None)
            })
            .unwrap();
    }

    #[test]
    fn test_self_assignment_is_not_a_modification() {
        let base = value!({"n": 1, "nan": f64::NAN, "sub": {"x": 1}});
        let out = engine()
            .produce(base.clone(), |d| {
                let n = d.get("n")?;
                d.set("n", n)?;
                let nan = d.get("nan")?;
                d.set("nan", nan)?;
                let sub = d.get("sub")?;
                d.set("sub", sub)?;
                assert!(!d.is_modified());
                Ok(None)
            })
            .unwrap();
        assert!(Value::same(&out, &base));
    }

    #[test]
    fn test_set_then_delete_bookkeeping() {
        let out = engine()
            .produce(value!({"a": 1, "b": 2}), |d| {
                d.set("c", 3)?;
                d.remove("a")?;
                assert!(!d.has("a")?);
                assert!(d.has("c")?);
                assert_eq!(d.keys()?, vec!["b".to_string(), "c".to_string()]);
                Ok(None)
            })
            .unwrap();
        assert_eq!(out, value!({"b": 2, "c": 3}));
    }

    #[test]
    fn test_delete_missing_key_is_silent() {
        let base = value!({"a": 1});
        let out = engine()
            .produce(base.clone(), |d| {
                d.remove("missing")?;
                assert!(!d.is_modified());
                Ok(None)
            })
            .unwrap();
        assert!(Value::same(&out, &base));
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        engine()
            .produce(value!([1, 2]), |d| {
                let err = d.get("key").unwrap_err();
                assert!(matches!(err, ChiselError::BadArgument { .. }));
                let err = d.map_get(&value!(1)).unwrap_err();
                assert!(matches!(err, ChiselError::BadArgument { .. }));
                Ok(None)
            })
            .unwrap();
    }

    #[test]
    fn test_sequence_push_pop_and_len() {
        let out = engine()
            .produce(value!([10, 20]), |d| {
                d.push(30)?;
                assert_eq!(d.len()?, 3);
                assert_eq!(d.pop()?, Some(Value::Int(30)));
                d.push(40)?;
                Ok(None)
            })
            .unwrap();
        assert_eq!(out, value!([10, 20, 40]));
    }

    #[test]
    fn test_sequence_set_len_truncates_and_pads() {
        let out = engine()
            .produce(value!([1, 2, 3]), |d| {
                d.set_len(5)?;
                assert_eq!(d.get_index(4)?, Value::Null);
                d.set_len(2)?;
                Ok(None)
            })
            .unwrap();
        assert_eq!(out, value!([1, 2]));
    }

    #[test]
    fn test_sequence_insert_and_remove_shift() {
        let out = engine()
            .produce(value!([1, 3]), |d| {
                d.insert_index(1, 2)?;
                assert_eq!(d.remove_index(2)?, Value::Int(3));
                Ok(None)
            })
            .unwrap();
        assert_eq!(out, value!([1, 2]));
    }

    #[test]
    fn test_sequence_out_of_bounds_write() {
        engine()
            .produce(value!([1]), |d| {
                let err = d.set_index(5, 9).unwrap_err();
                assert!(matches!(err, ChiselError::BadArgument { .. }));
                Ok(None)
            })
            .unwrap();
    }

    #[test]
    fn test_delete_index_leaves_null_slot() {
        let out = engine()
            .produce(value!([1, 2, 3]), |d| {
                d.delete_index(1)?;
                d.delete_index(9)?;
                Ok(None)
            })
            .unwrap();
        assert_eq!(out, value!([1, null, 3]));
    }

    #[test]
    fn test_class_getter_reads_through_draft() {
        let class = crate::ClassTag::define("draft.Rect")
            .draftable()
            .getter("area", |v| {
                let read = |key: &str| match v.as_draft() {
                    Some(d) => d.get(key).unwrap_or(Value::Null),
                    None => v.get_key(key).unwrap_or(Value::Null),
                };
                match (read("w"), read("h")) {
                    (Value::Int(w), Value::Int(h)) => Value::Int(w * h),
                    _ => Value::Null,
                }
            })
            .register();
        let base = Value::record_with_class(class, [("w", 3), ("h", 4)]);
        engine()
            .produce(base, |d| {
                assert_eq!(d.get("area")?, Value::Int(12));
                d.set("w", 5)?;
                // The getter sees the drafted write.
                assert_eq!(d.get("area")?, Value::Int(20));
                Ok(None)
            })
            .unwrap();
    }
}
