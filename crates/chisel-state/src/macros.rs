//! The `value!` literal macro.

use crate::value::{Prop, Value};
use indexmap::IndexMap;

/// Construct a [`Value`](crate::Value) from a JSON-like literal.
///
/// Objects become plain records, arrays become sequences. Any interpolated
/// expression is converted with `Value::from`.
///
/// # Examples
///
/// ```
/// use chisel_state::{value, Value};
///
/// let v = value!({
///     "name": "Alice",
///     "tags": ["admin", "ops"],
///     "meta": { "active": true, "score": 9.5 },
/// });
///
/// assert_eq!(v.get_key("name"), Some(Value::from("Alice")));
/// assert_eq!(v.get_key("tags").unwrap().len(), Some(2));
/// ```
#[macro_export(local_inner_macros)]
macro_rules! value {
    ($($tt:tt)+) => {
        value_internal!($($tt)+)
    };
}

#[macro_export(local_inner_macros)]
#[doc(hidden)]
macro_rules! value_internal {
    //////////////////////////////////////////////////////////////////////////
    // TT muncher for arrays: [...]. Produces a vec![...] of elements.
    //////////////////////////////////////////////////////////////////////////

    (@array [$($elems:expr,)*]) => {
        value_internal_vec![$($elems,)*]
    };

    (@array [$($elems:expr),*]) => {
        value_internal_vec![$($elems),*]
    };

    (@array [$($elems:expr,)*] null $($rest:tt)*) => {
        value_internal!(@array [$($elems,)* value_internal!(null)] $($rest)*)
    };

    (@array [$($elems:expr,)*] true $($rest:tt)*) => {
        value_internal!(@array [$($elems,)* value_internal!(true)] $($rest)*)
    };

    (@array [$($elems:expr,)*] false $($rest:tt)*) => {
        value_internal!(@array [$($elems,)* value_internal!(false)] $($rest)*)
    };

    (@array [$($elems:expr,)*] [$($array:tt)*] $($rest:tt)*) => {
        value_internal!(@array [$($elems,)* value_internal!([$($array)*])] $($rest)*)
    };

    (@array [$($elems:expr,)*] {$($map:tt)*} $($rest:tt)*) => {
        value_internal!(@array [$($elems,)* value_internal!({$($map)*})] $($rest)*)
    };

    (@array [$($elems:expr,)*] $next:expr, $($rest:tt)*) => {
        value_internal!(@array [$($elems,)* value_internal!($next),] $($rest)*)
    };

    (@array [$($elems:expr,)*] $last:expr) => {
        value_internal!(@array [$($elems,)* value_internal!($last)])
    };

    (@array [$($elems:expr),*] , $($rest:tt)*) => {
        value_internal!(@array [$($elems,)*] $($rest)*)
    };

    (@array [$($elems:expr),*] $unexpected:tt $($rest:tt)*) => {
        value_unexpected!($unexpected)
    };

    //////////////////////////////////////////////////////////////////////////
    // TT muncher for objects: {...}. Inserts entries into $object.
    //////////////////////////////////////////////////////////////////////////

    (@object $object:ident () () ()) => {};

    (@object $object:ident [$($key:tt)+] ($value:expr) , $($rest:tt)*) => {
        $object.insert(($($key)+).into(), $value);
        value_internal!(@object $object () ($($rest)*) ($($rest)*));
    };

    (@object $object:ident [$($key:tt)+] ($value:expr) $unexpected:tt $($rest:tt)*) => {
        value_unexpected!($unexpected);
    };

    (@object $object:ident [$($key:tt)+] ($value:expr)) => {
        $object.insert(($($key)+).into(), $value);
    };

    (@object $object:ident ($($key:tt)+) (: null $($rest:tt)*) $copy:tt) => {
        value_internal!(@object $object [$($key)+] (value_internal!(null)) $($rest)*);
    };

    (@object $object:ident ($($key:tt)+) (: true $($rest:tt)*) $copy:tt) => {
        value_internal!(@object $object [$($key)+] (value_internal!(true)) $($rest)*);
    };

    (@object $object:ident ($($key:tt)+) (: false $($rest:tt)*) $copy:tt) => {
        value_internal!(@object $object [$($key)+] (value_internal!(false)) $($rest)*);
    };

    (@object $object:ident ($($key:tt)+) (: [$($array:tt)*] $($rest:tt)*) $copy:tt) => {
        value_internal!(@object $object [$($key)+] (value_internal!([$($array)*])) $($rest)*);
    };

    (@object $object:ident ($($key:tt)+) (: {$($map:tt)*} $($rest:tt)*) $copy:tt) => {
        value_internal!(@object $object [$($key)+] (value_internal!({$($map)*})) $($rest)*);
    };

    (@object $object:ident ($($key:tt)+) (: $value:expr , $($rest:tt)*) $copy:tt) => {
        value_internal!(@object $object [$($key)+] (value_internal!($value)) , $($rest)*);
    };

    (@object $object:ident ($($key:tt)+) (: $value:expr) $copy:tt) => {
        value_internal!(@object $object [$($key)+] (value_internal!($value)));
    };

    // Missing value for the last entry: trigger a "no rules expected" error.
    (@object $object:ident ($($key:tt)+) (:) $copy:tt) => {
        value_internal!();
    };

    // Missing colon or key: report the unexpected token.
    (@object $object:ident () (: $($rest:tt)*) ($colon:tt $($copy:tt)*)) => {
        value_unexpected!($colon);
    };

    (@object $object:ident ($($key:tt)*) (, $($rest:tt)*) ($comma:tt $($copy:tt)*)) => {
        value_unexpected!($comma);
    };

    // Parenthesized key expression.
    (@object $object:ident () (($key:expr) : $($rest:tt)*) $copy:tt) => {
        value_internal!(@object $object ($key) (: $($rest)*) (: $($rest)*));
    };

    // Munch one token into the current key.
    (@object $object:ident ($($key:tt)*) ($tt:tt $($rest:tt)*) $copy:tt) => {
        value_internal!(@object $object ($($key)* $tt) ($($rest)*) ($($rest)*));
    };

    //////////////////////////////////////////////////////////////////////////
    // Primary entry points.
    //////////////////////////////////////////////////////////////////////////

    (null) => {
        $crate::Value::Null
    };

    (true) => {
        $crate::Value::Bool(true)
    };

    (false) => {
        $crate::Value::Bool(false)
    };

    ([]) => {
        $crate::Value::sequence_from(::std::vec::Vec::<$crate::Value>::new())
    };

    ([ $($tt:tt)+ ]) => {
        value_internal!(@array [] $($tt)+)
    };

    ({}) => {
        $crate::Value::record()
    };

    ({ $($tt:tt)+ }) => {{
        let mut object = $crate::RecordBuilder::new();
        value_internal!(@object object () ($($tt)+) ($($tt)+));
        object.build()
    }};

    ($other:expr) => {
        $crate::Value::from($other)
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! value_internal_vec {
    ($($content:tt)*) => {
        $crate::Value::sequence_from(vec![$($content)*])
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! value_unexpected {
    () => {};
}

/// Accumulator used by the `value!` macro to build records.
#[doc(hidden)]
pub struct RecordBuilder {
    props: IndexMap<String, Prop>,
}

impl RecordBuilder {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        RecordBuilder {
            props: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.props.insert(key, Prop::new(value));
    }

    pub fn build(self) -> Value {
        Value::record_from_parts(None, self.props)
    }
}

#[cfg(test)]
mod tests {
    use crate::Value;

    #[test]
    fn test_scalars() {
        assert_eq!(value!(null), Value::Null);
        assert_eq!(value!(true), Value::Bool(true));
        assert_eq!(value!(3), Value::Int(3));
        assert_eq!(value!(2.5), Value::Float(2.5));
        assert_eq!(value!("hi"), Value::from("hi"));
    }

    #[test]
    fn test_nested_literal() {
        let v = value!({
            "a": {"x": 1},
            "list": [1, [2, 3], {"deep": null}],
            "flag": false,
        });
        assert_eq!(v.get_key("a").unwrap().get_key("x"), Some(Value::Int(1)));
        let list = v.get_key("list").unwrap();
        assert_eq!(list.len(), Some(3));
        assert_eq!(list.get_index(1).unwrap().items(), vec![value!(2), value!(3)]);
        assert_eq!(
            list.get_index(2).unwrap().get_key("deep"),
            Some(Value::Null)
        );
    }

    #[test]
    fn test_interpolation() {
        let n = 7;
        let v = value!({"n": n, "doubled": n * 2});
        assert_eq!(v.get_key("doubled"), Some(Value::Int(14)));
    }

    #[test]
    fn test_empty_containers() {
        assert_eq!(value!({}).len(), Some(0));
        assert_eq!(value!([]).len(), Some(0));
    }
}
