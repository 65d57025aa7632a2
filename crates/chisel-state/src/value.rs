//! The value model the draft engine operates on.
//!
//! Every value belongs to exactly one kind: an opaque scalar, one of the four
//! draftable container kinds (record, sequence, map, set), an opaque user
//! payload, an interned sentinel, or a live draft.
//!
//! Container representations are shared behind `Arc`, so cloning a [`Value`]
//! is cheap and unmodified substructure is shared by pointer identity. That
//! identity is the engine's analog of reference equality: [`Value::same`]
//! compares scalars by content (NaN equal to itself, positive and negative
//! zero distinguished) and containers by allocation.

use crate::class::ClassTag;
use crate::draft::Draft;
use crate::error::{ChiselError, ChiselResult};
use crate::sentinel::{self, Sentinel};
use indexmap::{IndexMap, IndexSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The container kind of a draft or draftable value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// String-keyed record.
    Record,
    /// Dense ordered sequence.
    Sequence,
    /// Insertion-ordered map with arbitrary keys.
    Map,
    /// Insertion-ordered set of unique values.
    Set,
    /// Pseudo-kind for drafts over non-container bases; read-only.
    Leaf,
}

/// A single record property: a value plus its enumerability.
///
/// Non-enumerable properties are excluded from the conditional deep-freeze
/// applied during finalization, which keeps third-party bookkeeping slots
/// mutable.
#[derive(Clone, Debug, PartialEq)]
pub struct Prop {
    /// The property value.
    pub value: Value,
    /// Whether the property participates in deep-freezing.
    pub enumerable: bool,
}

impl Prop {
    /// Create an enumerable property.
    #[inline]
    pub fn new(value: Value) -> Self {
        Prop {
            value,
            enumerable: true,
        }
    }

    /// Create a non-enumerable property.
    #[inline]
    pub fn hidden(value: Value) -> Self {
        Prop {
            value,
            enumerable: false,
        }
    }
}

/// Shared representation of a record.
pub struct RecordRepr {
    pub(crate) class: Option<ClassTag>,
    pub(crate) props: IndexMap<String, Prop>,
    frozen: AtomicBool,
}

/// Shared representation of a sequence.
pub struct SequenceRepr {
    pub(crate) items: Vec<Value>,
    frozen: AtomicBool,
}

/// Shared representation of a keyed map.
pub struct MapRepr {
    pub(crate) entries: IndexMap<ValueKey, Value>,
    frozen: AtomicBool,
}

/// Shared representation of a unique-value set.
pub struct SetRepr {
    pub(crate) items: IndexSet<ValueKey>,
    frozen: AtomicBool,
}

macro_rules! repr_common {
    ($repr:ident, $($field:ident),+) => {
        impl $repr {
            #[inline]
            pub(crate) fn frozen(&self) -> bool {
                self.frozen.load(Ordering::Relaxed)
            }

            #[inline]
            pub(crate) fn set_frozen(&self) {
                self.frozen.store(true, Ordering::Relaxed);
            }
        }

        impl Clone for $repr {
            fn clone(&self) -> Self {
                $repr {
                    $($field: self.$field.clone(),)+
                    frozen: AtomicBool::new(false),
                }
            }
        }
    };
}

repr_common!(RecordRepr, class, props);
repr_common!(SequenceRepr, items);
repr_common!(MapRepr, entries);
repr_common!(SetRepr, items);

/// Marker trait for user payloads carried through the engine untouched.
///
/// Opaque values are never drafted, copied, or frozen; they compare and hash
/// by allocation identity.
pub trait OpaqueValue: fmt::Debug + Send + Sync {}

/// A shared handle to an opaque user payload.
#[derive(Clone)]
pub struct OpaqueRef(pub(crate) Arc<dyn OpaqueValue>);

impl OpaqueRef {
    /// Wrap a payload.
    pub fn new<T: OpaqueValue + 'static>(payload: T) -> Self {
        OpaqueRef(Arc::new(payload))
    }

    #[inline]
    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for OpaqueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({:?})", self.0)
    }
}

/// A value participating in the draft engine.
#[derive(Clone)]
pub enum Value {
    /// The absent value.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// String scalar.
    Str(Arc<str>),
    /// String-keyed record, optionally class-tagged.
    Record(Arc<RecordRepr>),
    /// Dense ordered sequence.
    Sequence(Arc<SequenceRepr>),
    /// Insertion-ordered map with arbitrary keys.
    Map(Arc<MapRepr>),
    /// Insertion-ordered set of unique values.
    Set(Arc<SetRepr>),
    /// Opaque user payload; pass-through.
    Opaque(OpaqueRef),
    /// Interned sentinel marker.
    Sentinel(Sentinel),
    /// A live draft standing in for a value.
    Draft(Draft),
}

impl Value {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create an empty plain record.
    pub fn record() -> Value {
        Value::Record(Arc::new(RecordRepr {
            class: None,
            props: IndexMap::new(),
            frozen: AtomicBool::new(false),
        }))
    }

    /// Create a plain record from key/value pairs.
    pub fn record_from<K, V, I>(entries: I) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let props = entries
            .into_iter()
            .map(|(k, v)| (k.into(), Prop::new(v.into())))
            .collect();
        Value::Record(Arc::new(RecordRepr {
            class: None,
            props,
            frozen: AtomicBool::new(false),
        }))
    }

    /// Create a class-tagged record from key/value pairs.
    pub fn record_with_class<K, V, I>(class: ClassTag, entries: I) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let props = entries
            .into_iter()
            .map(|(k, v)| (k.into(), Prop::new(v.into())))
            .collect();
        Value::Record(Arc::new(RecordRepr {
            class: Some(class),
            props,
            frozen: AtomicBool::new(false),
        }))
    }

    pub(crate) fn record_from_parts(
        class: Option<ClassTag>,
        props: IndexMap<String, Prop>,
    ) -> Value {
        Value::Record(Arc::new(RecordRepr {
            class,
            props,
            frozen: AtomicBool::new(false),
        }))
    }

    /// Create a sequence from values.
    pub fn sequence_from<V, I>(items: I) -> Value
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Sequence(Arc::new(SequenceRepr {
            items: items.into_iter().map(Into::into).collect(),
            frozen: AtomicBool::new(false),
        }))
    }

    pub(crate) fn sequence_from_items(items: Vec<Value>) -> Value {
        Value::Sequence(Arc::new(SequenceRepr {
            items,
            frozen: AtomicBool::new(false),
        }))
    }

    /// Create a keyed map from key/value pairs. Later duplicates of a key
    /// overwrite earlier ones.
    pub fn map_from<I>(entries: I) -> Value
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        Value::Map(Arc::new(MapRepr {
            entries: entries
                .into_iter()
                .map(|(k, v)| (ValueKey(k), v))
                .collect(),
            frozen: AtomicBool::new(false),
        }))
    }

    pub(crate) fn map_from_entries(entries: IndexMap<ValueKey, Value>) -> Value {
        Value::Map(Arc::new(MapRepr {
            entries,
            frozen: AtomicBool::new(false),
        }))
    }

    /// Create a unique-value set. Duplicate values (by identity) collapse.
    pub fn set_from<V, I>(items: I) -> Value
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Set(Arc::new(SetRepr {
            items: items.into_iter().map(|v| ValueKey(v.into())).collect(),
            frozen: AtomicBool::new(false),
        }))
    }

    pub(crate) fn set_from_keys(items: IndexSet<ValueKey>) -> Value {
        Value::Set(Arc::new(SetRepr {
            items,
            frozen: AtomicBool::new(false),
        }))
    }

    /// Wrap an opaque user payload.
    pub fn opaque<T: OpaqueValue + 'static>(payload: T) -> Value {
        Value::Opaque(OpaqueRef::new(payload))
    }

    /// The *nothing* sentinel as a value.
    pub fn nothing() -> Value {
        Value::Sentinel(sentinel::nothing())
    }

    // ------------------------------------------------------------------
    // Classification
    // ------------------------------------------------------------------

    /// Human-readable type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Record(_) => "record",
            Value::Sequence(_) => "sequence",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Opaque(_) => "opaque",
            Value::Sentinel(_) => "sentinel",
            Value::Draft(_) => "draft",
        }
    }

    /// The container kind, if this value is a container or a draft.
    pub fn container_kind(&self) -> Option<Kind> {
        match self {
            Value::Record(_) => Some(Kind::Record),
            Value::Sequence(_) => Some(Kind::Sequence),
            Value::Map(_) => Some(Kind::Map),
            Value::Set(_) => Some(Kind::Set),
            Value::Draft(d) => Some(d.kind()),
            _ => None,
        }
    }

    /// Whether the engine may draft this value.
    ///
    /// Sequences, maps, and sets always qualify. Records qualify when plain,
    /// when their class opted in, or when the instance carries the draftable
    /// marker. Everything else is opaque to the engine.
    pub fn is_draftable(&self) -> bool {
        match self {
            Value::Sequence(_) | Value::Map(_) | Value::Set(_) | Value::Draft(_) => true,
            Value::Record(repr) => match &repr.class {
                None => true,
                Some(class) => class.draftable() || record_has_marker(repr),
            },
            _ => false,
        }
    }

    /// Whether this value is a live draft.
    #[inline]
    pub fn is_draft(&self) -> bool {
        matches!(self, Value::Draft(_))
    }

    /// Borrow the draft handle, if this value is one.
    #[inline]
    pub fn as_draft(&self) -> Option<&Draft> {
        match self {
            Value::Draft(d) => Some(d),
            _ => None,
        }
    }

    /// Whether this value is the *nothing* sentinel.
    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Sentinel(s) if *s == sentinel::nothing())
    }

    /// Whether this value is read-only.
    ///
    /// Scalars, sentinels, and opaques are inherently immutable and report
    /// `true`; containers report their freeze flag; drafts are never frozen.
    pub fn is_frozen(&self) -> bool {
        match self {
            Value::Record(r) => r.frozen(),
            Value::Sequence(r) => r.frozen(),
            Value::Map(r) => r.frozen(),
            Value::Set(r) => r.frozen(),
            Value::Draft(_) => false,
            _ => true,
        }
    }

    pub(crate) fn mark_frozen(&self) {
        match self {
            Value::Record(r) => r.set_frozen(),
            Value::Sequence(r) => r.set_frozen(),
            Value::Map(r) => r.set_frozen(),
            Value::Set(r) => r.set_frozen(),
            _ => {}
        }
    }

    /// Identity equality: the engine's no-change detector.
    ///
    /// Scalars compare by content with NaN equal to NaN and positive and
    /// negative zero distinguished; containers, opaques, sentinels, and drafts
    /// compare by allocation identity.
    pub fn same(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => {
                if x.is_nan() && y.is_nan() {
                    true
                } else {
                    x.to_bits() == y.to_bits()
                }
            }
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Record(x), Value::Record(y)) => Arc::ptr_eq(x, y),
            (Value::Sequence(x), Value::Sequence(y)) => Arc::ptr_eq(x, y),
            (Value::Map(x), Value::Map(y)) => Arc::ptr_eq(x, y),
            (Value::Set(x), Value::Set(y)) => Arc::ptr_eq(x, y),
            (Value::Opaque(x), Value::Opaque(y)) => x.addr() == y.addr(),
            (Value::Sentinel(x), Value::Sentinel(y)) => Sentinel::ptr_eq(x, y),
            (Value::Draft(x), Value::Draft(y)) => Draft::ptr_eq(x, y),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    pub(crate) fn as_record(&self) -> Option<&Arc<RecordRepr>> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn as_sequence(&self) -> Option<&Arc<SequenceRepr>> {
        match self {
            Value::Sequence(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn as_map(&self) -> Option<&Arc<MapRepr>> {
        match self {
            Value::Map(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn as_set(&self) -> Option<&Arc<SetRepr>> {
        match self {
            Value::Set(r) => Some(r),
            _ => None,
        }
    }

    /// Read a record property by key.
    pub fn get_key(&self, key: &str) -> Option<Value> {
        self.as_record()
            .and_then(|r| r.props.get(key))
            .map(|p| p.value.clone())
    }

    /// Read a sequence element by index.
    pub fn get_index(&self, index: usize) -> Option<Value> {
        self.as_sequence().and_then(|r| r.items.get(index)).cloned()
    }

    /// Read a map entry by key (identity-or-value key equality).
    pub fn map_get(&self, key: &Value) -> Option<Value> {
        self.as_map()
            .and_then(|r| r.entries.get(&ValueKey(key.clone())))
            .cloned()
    }

    /// Whether a set contains the given value.
    pub fn set_contains(&self, value: &Value) -> bool {
        self.as_set()
            .map(|r| r.items.contains(&ValueKey(value.clone())))
            .unwrap_or(false)
    }

    /// Number of entries in a container; `None` for non-containers.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Record(r) => Some(r.props.len()),
            Value::Sequence(r) => Some(r.items.len()),
            Value::Map(r) => Some(r.entries.len()),
            Value::Set(r) => Some(r.items.len()),
            _ => None,
        }
    }

    /// Whether a container is empty; `None` for non-containers.
    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|n| n == 0)
    }

    /// Record keys, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.as_record()
            .map(|r| r.props.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Record entries, in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.as_record()
            .map(|r| {
                r.props
                    .iter()
                    .map(|(k, p)| (k.clone(), p.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sequence elements, in order.
    pub fn items(&self) -> Vec<Value> {
        self.as_sequence()
            .map(|r| r.items.clone())
            .unwrap_or_default()
    }

    /// Map entries, in insertion order.
    pub fn map_entries(&self) -> Vec<(Value, Value)> {
        self.as_map()
            .map(|r| {
                r.entries
                    .iter()
                    .map(|(k, v)| (k.0.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set values, in insertion order.
    pub fn set_values(&self) -> Vec<Value> {
        self.as_set()
            .map(|r| r.items.iter().map(|k| k.0.clone()).collect())
            .unwrap_or_default()
    }

    /// The class tag of a record, if any.
    pub fn class(&self) -> Option<ClassTag> {
        self.as_record().and_then(|r| r.class.clone())
    }

    // ------------------------------------------------------------------
    // In-place building (copy-on-write; fails on frozen targets)
    // ------------------------------------------------------------------

    /// Insert a record property. Fails on frozen records and non-records.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> ChiselResult<()> {
        match self {
            Value::Record(repr) => {
                if repr.frozen() {
                    return Err(ChiselError::frozen_mutation("record"));
                }
                Arc::make_mut(repr)
                    .props
                    .insert(key.into(), Prop::new(value.into()));
                Ok(())
            }
            other => Err(ChiselError::bad_argument(format!(
                "insert requires a record, found {}",
                other.type_name()
            ))),
        }
    }

    /// Insert a non-enumerable record property.
    pub fn insert_hidden(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> ChiselResult<()> {
        match self {
            Value::Record(repr) => {
                if repr.frozen() {
                    return Err(ChiselError::frozen_mutation("record"));
                }
                Arc::make_mut(repr)
                    .props
                    .insert(key.into(), Prop::hidden(value.into()));
                Ok(())
            }
            other => Err(ChiselError::bad_argument(format!(
                "insert requires a record, found {}",
                other.type_name()
            ))),
        }
    }

    /// Remove a record property.
    pub fn remove_key(&mut self, key: &str) -> ChiselResult<Option<Value>> {
        match self {
            Value::Record(repr) => {
                if repr.frozen() {
                    return Err(ChiselError::frozen_mutation("record"));
                }
                Ok(Arc::make_mut(repr)
                    .props
                    .shift_remove(key)
                    .map(|p| p.value))
            }
            other => Err(ChiselError::bad_argument(format!(
                "remove_key requires a record, found {}",
                other.type_name()
            ))),
        }
    }

    /// Append to a sequence.
    pub fn push(&mut self, value: impl Into<Value>) -> ChiselResult<()> {
        match self {
            Value::Sequence(repr) => {
                if repr.frozen() {
                    return Err(ChiselError::frozen_mutation("sequence"));
                }
                Arc::make_mut(repr).items.push(value.into());
                Ok(())
            }
            other => Err(ChiselError::bad_argument(format!(
                "push requires a sequence, found {}",
                other.type_name()
            ))),
        }
    }

    /// Insert into a keyed map.
    pub fn map_insert(&mut self, key: Value, value: impl Into<Value>) -> ChiselResult<()> {
        match self {
            Value::Map(repr) => {
                if repr.frozen() {
                    return Err(ChiselError::frozen_mutation("map"));
                }
                Arc::make_mut(repr)
                    .entries
                    .insert(ValueKey(key), value.into());
                Ok(())
            }
            other => Err(ChiselError::bad_argument(format!(
                "map_insert requires a map, found {}",
                other.type_name()
            ))),
        }
    }

    /// Remove a map entry.
    pub fn map_remove(&mut self, key: &Value) -> ChiselResult<Option<Value>> {
        match self {
            Value::Map(repr) => {
                if repr.frozen() {
                    return Err(ChiselError::frozen_mutation("map"));
                }
                Ok(Arc::make_mut(repr)
                    .entries
                    .shift_remove(&ValueKey(key.clone())))
            }
            other => Err(ChiselError::bad_argument(format!(
                "map_remove requires a map, found {}",
                other.type_name()
            ))),
        }
    }

    /// Add to a unique-value set.
    pub fn set_add(&mut self, value: impl Into<Value>) -> ChiselResult<bool> {
        match self {
            Value::Set(repr) => {
                if repr.frozen() {
                    return Err(ChiselError::frozen_mutation("set"));
                }
                Ok(Arc::make_mut(repr).items.insert(ValueKey(value.into())))
            }
            other => Err(ChiselError::bad_argument(format!(
                "set_add requires a set, found {}",
                other.type_name()
            ))),
        }
    }

    /// Remove from a unique-value set.
    pub fn set_remove(&mut self, value: &Value) -> ChiselResult<bool> {
        match self {
            Value::Set(repr) => {
                if repr.frozen() {
                    return Err(ChiselError::frozen_mutation("set"));
                }
                Ok(Arc::make_mut(repr)
                    .items
                    .shift_remove(&ValueKey(value.clone())))
            }
            other => Err(ChiselError::bad_argument(format!(
                "set_remove requires a set, found {}",
                other.type_name()
            ))),
        }
    }

    /// Store the draftable marker on a record, opting the instance into
    /// drafting regardless of its class.
    pub fn mark_draftable(&mut self) -> ChiselResult<()> {
        self.insert(
            sentinel::DRAFTABLE_KEY,
            Value::Sentinel(sentinel::draftable_marker()),
        )
    }

    // ------------------------------------------------------------------
    // JSON interop
    // ------------------------------------------------------------------

    /// Convert a `serde_json::Value` into an engine value.
    ///
    /// Objects become plain records, arrays become sequences.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.into()),
            serde_json::Value::Array(items) => {
                Value::sequence_from_items(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                Value::record_from(map.into_iter().map(|(k, v)| (k, Value::from_json(v))))
            }
        }
    }

    /// Convert to a `serde_json::Value` via the wire encoding.
    ///
    /// Maps, sets, sentinels, and class-tagged records use their `$`-envelope
    /// forms; drafts and opaques are unrepresentable and fail.
    pub fn to_json(&self) -> ChiselResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn record_has_marker(repr: &RecordRepr) -> bool {
    match repr.props.get(sentinel::DRAFTABLE_KEY) {
        Some(prop) => match &prop.value {
            Value::Sentinel(s) => *s == sentinel::draftable_marker(),
            Value::Bool(b) => *b,
            _ => false,
        },
        None => false,
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

// Structural equality. Drafts, opaques, and sentinels fall back to identity;
// floats use ordinary IEEE comparison (NaN unequal to itself).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Record(x), Value::Record(y)) => {
                let class_eq = match (&x.class, &y.class) {
                    (None, None) => true,
                    (Some(a), Some(b)) => ClassTag::ptr_eq(a, b),
                    _ => false,
                };
                class_eq && x.props == y.props
            }
            (Value::Sequence(x), Value::Sequence(y)) => x.items == y.items,
            (Value::Map(x), Value::Map(y)) => x.entries == y.entries,
            (Value::Set(x), Value::Set(y)) => x.items == y.items,
            (Value::Opaque(x), Value::Opaque(y)) => x.addr() == y.addr(),
            (Value::Sentinel(x), Value::Sentinel(y)) => x == y,
            (Value::Draft(x), Value::Draft(y)) => Draft::ptr_eq(x, y),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Record(r) => {
                if let Some(class) = &r.class {
                    write!(f, "{}", class.name())?;
                }
                f.debug_map()
                    .entries(r.props.iter().map(|(k, p)| (k, &p.value)))
                    .finish()
            }
            Value::Sequence(r) => f.debug_list().entries(r.items.iter()).finish(),
            Value::Map(r) => f
                .debug_map()
                .entries(r.entries.iter().map(|(k, v)| (&k.0, v)))
                .finish(),
            Value::Set(r) => f.debug_set().entries(r.items.iter().map(|k| &k.0)).finish(),
            Value::Opaque(o) => o.fmt(f),
            Value::Sentinel(s) => s.fmt(f),
            Value::Draft(d) => d.fmt(f),
        }
    }
}

/// A value wrapped for use as a map key or set element.
///
/// Equality and hashing follow [`Value::same`]: scalars by content (floats by
/// bit pattern, all NaNs collapsed), everything else by allocation identity.
#[derive(Clone, Debug)]
pub struct ValueKey(pub Value);

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        Value::same(&self.0, &other.0)
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Null => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Int(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Value::Float(x) => {
                3u8.hash(state);
                let bits = if x.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    x.to_bits()
                };
                bits.hash(state);
            }
            Value::Str(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Value::Record(r) => {
                5u8.hash(state);
                (Arc::as_ptr(r) as usize).hash(state);
            }
            Value::Sequence(r) => {
                6u8.hash(state);
                (Arc::as_ptr(r) as usize).hash(state);
            }
            Value::Map(r) => {
                7u8.hash(state);
                (Arc::as_ptr(r) as usize).hash(state);
            }
            Value::Set(r) => {
                8u8.hash(state);
                (Arc::as_ptr(r) as usize).hash(state);
            }
            Value::Opaque(o) => {
                9u8.hash(state);
                o.addr().hash(state);
            }
            Value::Sentinel(s) => {
                10u8.hash(state);
                s.addr().hash(state);
            }
            Value::Draft(d) => {
                11u8.hash(state);
                d.addr().hash(state);
            }
        }
    }
}

// ----------------------------------------------------------------------
// Scalar conversions
// ----------------------------------------------------------------------

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v.into())
    }
}

impl From<Sentinel> for Value {
    fn from(v: Sentinel) -> Self {
        Value::Sentinel(v)
    }
}

impl From<Draft> for Value {
    fn from(v: Draft) -> Self {
        Value::Draft(v)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(v: Vec<V>) -> Self {
        Value::sequence_from(v)
    }
}

impl<V: Into<Value> + Clone> From<&[V]> for Value {
    fn from(v: &[V]) -> Self {
        Value::sequence_from(v.iter().cloned())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value;

    #[test]
    fn test_same_distinguishes_zero_signs() {
        assert!(Value::same(&Value::Float(f64::NAN), &Value::Float(f64::NAN)));
        assert!(!Value::same(&Value::Float(0.0), &Value::Float(-0.0)));
        assert!(Value::same(&Value::Int(3), &Value::Int(3)));
        assert!(!Value::same(&Value::Int(3), &Value::Float(3.0)));
    }

    #[test]
    fn test_same_is_identity_for_containers() {
        let a = value!({"x": 1});
        let b = a.clone();
        let c = value!({"x": 1});
        assert!(Value::same(&a, &b));
        assert!(!Value::same(&a, &c));
        assert_eq!(a, c, "structural equality still holds");
    }

    #[test]
    fn test_draftable_classification() {
        assert!(value!({"a": 1}).is_draftable());
        assert!(value!([1, 2]).is_draftable());
        assert!(Value::map_from([(value!("k"), value!(1))]).is_draftable());
        assert!(Value::set_from([1, 2]).is_draftable());
        assert!(!value!(1).is_draftable());
        assert!(!value!("s").is_draftable());
        assert!(!Value::Null.is_draftable());
    }

    #[test]
    fn test_class_tagged_record_draftability() {
        let plain_class = crate::ClassTag::define("value.Plain").register();
        let open_class = crate::ClassTag::define("value.Open").draftable().register();

        let closed = Value::record_with_class(plain_class.clone(), [("x", 1)]);
        assert!(!closed.is_draftable());

        let open = Value::record_with_class(open_class, [("x", 1)]);
        assert!(open.is_draftable());

        let mut marked = Value::record_with_class(plain_class, [("x", 1)]);
        marked.mark_draftable().unwrap();
        assert!(marked.is_draftable());
    }

    #[test]
    fn test_frozen_mutation_fails() {
        let mut v = value!({"a": 1});
        v.mark_frozen();
        let err = v.insert("b", 2).unwrap_err();
        assert!(matches!(
            err,
            crate::ChiselError::FrozenMutation { kind: "record" }
        ));
    }

    #[test]
    fn test_builder_mutation() {
        let mut v = Value::record();
        v.insert("a", 1).unwrap();
        v.insert("b", value!([1, 2])).unwrap();
        assert_eq!(v.get_key("a"), Some(Value::Int(1)));
        assert_eq!(v.remove_key("a").unwrap(), Some(Value::Int(1)));
        assert_eq!(v.get_key("a"), None);

        let mut s = Value::set_from([1, 2]);
        assert!(!s.set_add(2).unwrap());
        assert!(s.set_add(3).unwrap());
        assert!(s.set_remove(&value!(1)).unwrap());
        assert_eq!(s.set_values(), vec![value!(2), value!(3)]);
    }

    #[test]
    fn test_map_keys_by_identity() {
        let key_obj = value!({"id": 1});
        let mut m = Value::map_from([(key_obj.clone(), value!("v"))]);
        assert_eq!(m.map_get(&key_obj), Some(value!("v")));
        // A structurally equal but distinct allocation is a different key.
        assert_eq!(m.map_get(&value!({"id": 1})), None);

        m.map_insert(value!(f64::NAN), value!("nan")).unwrap();
        assert_eq!(m.map_get(&value!(f64::NAN)), Some(value!("nan")));
    }

    #[test]
    fn test_from_json_roundtrip_shapes() {
        let v = Value::from_json(serde_json::json!({"a": [1, 2.5, "x", null, true]}));
        assert_eq!(v.keys(), vec!["a".to_string()]);
        let items = v.get_key("a").unwrap().items();
        assert_eq!(items[0], Value::Int(1));
        assert_eq!(items[1], Value::Float(2.5));
        assert_eq!(items[2], value!("x"));
        assert_eq!(items[3], Value::Null);
        assert_eq!(items[4], Value::Bool(true));
    }
}
