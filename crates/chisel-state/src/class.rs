//! Class tags: the user-type analog for records.
//!
//! A plain record is always draftable. A record carrying a [`ClassTag`] models
//! a typed value; it participates in drafting only when its class was defined
//! draftable, or when the instance itself carries the draftable marker (see
//! [`crate::sentinel::DRAFTABLE_KEY`]).
//!
//! A class may register *accessors*: computed properties resolved when a read
//! misses the record's own properties. The getter is invoked bound to the
//! draft so self-references resolve against current draft state; strict
//! shallow-copy mode collapses accessors into plain data properties by reading
//! through the base instead.
//!
//! Tags are interned by name in a process-wide registry, so identity
//! comparison of tags is meaningful and the serde wire format can resolve a
//! class by name.

use crate::draft::Draft;
use crate::error::ChiselResult;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

type Getter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
type Setter = Arc<dyn Fn(&Draft, Value) -> ChiselResult<()> + Send + Sync>;

/// A computed property registered on a class.
#[derive(Clone)]
pub struct Accessor {
    pub(crate) get: Getter,
    pub(crate) set: Option<Setter>,
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("has_setter", &self.set.is_some())
            .finish()
    }
}

struct ClassDef {
    name: String,
    draftable: bool,
    accessors: Vec<(String, Accessor)>,
}

/// An interned tag naming a user type.
#[derive(Clone)]
pub struct ClassTag(Arc<ClassDef>);

impl ClassTag {
    /// Start defining a class with the given name.
    ///
    /// If a class with this name was already defined, [`ClassBuilder::register`]
    /// returns the existing tag unchanged; definitions are interned, not
    /// replaced.
    pub fn define(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder {
            name: name.into(),
            draftable: false,
            accessors: Vec::new(),
        }
    }

    /// Look up a previously defined class by name.
    pub fn for_name(name: &str) -> Option<ClassTag> {
        registry().lock().unwrap().get(name).cloned()
    }

    /// Look up a class by name, defining a bare non-draftable class if none
    /// exists. Used when deserializing class-tagged records.
    pub(crate) fn resolve(name: &str) -> ClassTag {
        let mut guard = registry().lock().unwrap();
        if let Some(existing) = guard.get(name) {
            return existing.clone();
        }
        let tag = ClassTag(Arc::new(ClassDef {
            name: name.to_owned(),
            draftable: false,
            accessors: Vec::new(),
        }));
        guard.insert(name.to_owned(), tag.clone());
        tag
    }

    /// The class name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Whether instances of this class opted into drafting at the class level.
    #[inline]
    pub fn draftable(&self) -> bool {
        self.0.draftable
    }

    /// Look up an accessor by property name.
    pub(crate) fn accessor(&self, key: &str) -> Option<&Accessor> {
        self.0
            .accessors
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, acc)| acc)
    }

    /// Iterate over the registered accessors.
    pub(crate) fn accessors(&self) -> impl Iterator<Item = (&str, &Accessor)> {
        self.0.accessors.iter().map(|(k, a)| (k.as_str(), a))
    }

    #[inline]
    pub(crate) fn ptr_eq(a: &ClassTag, b: &ClassTag) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for ClassTag {
    fn eq(&self, other: &Self) -> bool {
        ClassTag::ptr_eq(self, other)
    }
}

impl Eq for ClassTag {}

impl fmt::Debug for ClassTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassTag({})", self.0.name)
    }
}

/// Builder for defining a class tag.
pub struct ClassBuilder {
    name: String,
    draftable: bool,
    accessors: Vec<(String, Accessor)>,
}

impl ClassBuilder {
    /// Opt instances of this class into drafting.
    pub fn draftable(mut self) -> Self {
        self.draftable = true;
        self
    }

    /// Register a getter-only accessor.
    pub fn getter(
        mut self,
        key: impl Into<String>,
        get: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.accessors.push((
            key.into(),
            Accessor {
                get: Arc::new(get),
                set: None,
            },
        ));
        self
    }

    /// Register an accessor with both a getter and a setter.
    pub fn accessor(
        mut self,
        key: impl Into<String>,
        get: impl Fn(&Value) -> Value + Send + Sync + 'static,
        set: impl Fn(&Draft, Value) -> ChiselResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.accessors.push((
            key.into(),
            Accessor {
                get: Arc::new(get),
                set: Some(Arc::new(set)),
            },
        ));
        self
    }

    /// Intern the definition and return its tag.
    ///
    /// Returns the previously interned tag if the name was already defined.
    pub fn register(self) -> ClassTag {
        let mut guard = registry().lock().unwrap();
        if let Some(existing) = guard.get(&self.name) {
            return existing.clone();
        }
        let tag = ClassTag(Arc::new(ClassDef {
            name: self.name.clone(),
            draftable: self.draftable,
            accessors: self.accessors,
        }));
        guard.insert(self.name, tag.clone());
        tag
    }
}

fn registry() -> &'static Mutex<HashMap<String, ClassTag>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, ClassTag>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_interns_by_name() {
        let a = ClassTag::define("test.Interned").draftable().register();
        let b = ClassTag::define("test.Interned").register();
        assert_eq!(a, b);
        assert!(b.draftable(), "first definition wins");
    }

    #[test]
    fn test_for_name() {
        assert!(ClassTag::for_name("test.Missing").is_none());
        let tag = ClassTag::define("test.Present").register();
        assert_eq!(ClassTag::for_name("test.Present"), Some(tag));
    }

    #[test]
    fn test_getter_lookup() {
        let tag = ClassTag::define("test.WithGetter")
            .getter("doubled", |_| Value::Int(42))
            .register();
        assert!(tag.accessor("doubled").is_some());
        assert!(tag.accessor("missing").is_none());
    }
}
