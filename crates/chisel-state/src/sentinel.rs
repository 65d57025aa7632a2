//! Process-wide interned sentinel values.
//!
//! Sentinels are named singleton markers with shared identity across every
//! engine instance in the process. Two lookups of the same name always return
//! the same underlying allocation, so identity comparison is meaningful even
//! when independent copies of the library's configuration coexist.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

/// Registry name of the *nothing* sentinel.
const NOTHING_NAME: &str = "chisel.nothing";

/// Registry name of the *draftable marker* sentinel.
const DRAFTABLE_NAME: &str = "chisel.draftable";

/// Well-known record key under which the draftable marker is stored to opt a
/// class-tagged record into drafting.
pub const DRAFTABLE_KEY: &str = "__draftable__";

struct SentinelRepr {
    name: String,
}

/// An interned, process-wide singleton marker value.
///
/// Sentinels compare by identity: `Sentinel::for_name` interns by name, so
/// equality of two sentinels is equivalent to equality of their names.
#[derive(Clone)]
pub struct Sentinel(Arc<SentinelRepr>);

impl Sentinel {
    /// Look up (or intern) the sentinel with the given name.
    pub fn for_name(name: &str) -> Sentinel {
        let registry = registry();
        let mut guard = registry.lock().unwrap();
        if let Some(existing) = guard.get(name) {
            return existing.clone();
        }
        let sentinel = Sentinel(Arc::new(SentinelRepr {
            name: name.to_owned(),
        }));
        guard.insert(name.to_owned(), sentinel.clone());
        sentinel
    }

    /// The registry name of this sentinel.
    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline]
    pub(crate) fn ptr_eq(a: &Sentinel, b: &Sentinel) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for Sentinel {
    fn eq(&self, other: &Self) -> bool {
        Sentinel::ptr_eq(self, other)
    }
}

impl Eq for Sentinel {}

impl fmt::Debug for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sentinel({})", self.0.name)
    }
}

fn registry() -> &'static Mutex<HashMap<String, Sentinel>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Sentinel>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The *nothing* sentinel: returned from a recipe to signal "the result is
/// empty", mapping the produced root value to `Value::Null`.
pub fn nothing() -> Sentinel {
    Sentinel::for_name(NOTHING_NAME)
}

/// The *draftable marker* sentinel: stored under [`DRAFTABLE_KEY`] on a
/// class-tagged record to opt that instance into drafting.
pub fn draftable_marker() -> Sentinel {
    Sentinel::for_name(DRAFTABLE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_identity_stable() {
        let a = Sentinel::for_name("test.alpha");
        let b = Sentinel::for_name("test.alpha");
        let c = Sentinel::for_name("test.beta");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_well_known_sentinels() {
        assert_eq!(nothing(), nothing());
        assert_eq!(draftable_marker(), draftable_marker());
        assert_ne!(nothing(), draftable_marker());
        assert_eq!(nothing().name(), "chisel.nothing");
    }
}
