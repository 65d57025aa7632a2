//! Serde wire encoding for values.
//!
//! Scalars, plain records, and sequences serialize as their JSON analogs.
//! The kinds JSON cannot express directly use `$`-envelopes:
//!
//! - keyed map: `{"$map": [[key, value], ...]}`
//! - unique set: `{"$set": [...]}`
//! - sentinel: `{"$sentinel": "name"}` (resolved through the process registry)
//! - class-tagged record: `{"$class": "Name", "$props": {...}}` (resolved
//!   through the class registry; unknown names deserialize as bare classes)
//!
//! Live drafts and opaque payloads have no wire representation and fail to
//! serialize. Record keys beginning with `$` are reserved for the envelopes.

use crate::class::ClassTag;
use crate::sentinel::Sentinel;
use crate::value::{Prop, Value, ValueKey};
use indexmap::IndexMap;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Sequence(repr) => {
                let mut seq = serializer.serialize_seq(Some(repr.items.len()))?;
                for item in &repr.items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Record(repr) => {
                if let Some(class) = &repr.class {
                    let mut map = serializer.serialize_map(Some(2))?;
                    map.serialize_entry("$class", class.name())?;
                    map.serialize_entry("$props", &PropsView(&repr.props))?;
                    map.end()
                } else {
                    PropsView(&repr.props).serialize(serializer)
                }
            }
            Value::Map(repr) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$map", &PairsView(&repr.entries))?;
                map.end()
            }
            Value::Set(repr) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$set", &ItemsView(&repr.items))?;
                map.end()
            }
            Value::Sentinel(s) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$sentinel", s.name())?;
                map.end()
            }
            Value::Opaque(_) => Err(ser::Error::custom(
                "opaque values have no wire representation",
            )),
            Value::Draft(_) => Err(ser::Error::custom(
                "live drafts have no wire representation",
            )),
        }
    }
}

struct PropsView<'a>(&'a IndexMap<String, Prop>);

impl Serialize for PropsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, prop) in self.0 {
            map.serialize_entry(key, &prop.value)?;
        }
        map.end()
    }
}

struct PairsView<'a>(&'a IndexMap<ValueKey, Value>);

impl Serialize for PairsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for (key, value) in self.0 {
            seq.serialize_element(&(&key.0, value))?;
        }
        seq.end()
    }
}

struct ItemsView<'a>(&'a indexmap::IndexSet<ValueKey>);

impl Serialize for ItemsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for key in self.0 {
            seq.serialize_element(&key.0)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a chisel-state value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        if v <= i64::MAX as u64 {
            Ok(Value::Int(v as i64))
        } else {
            Ok(Value::Float(v as f64))
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::Str(v.into()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::Str(v.into()))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Value::sequence_from_items(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let first: Option<String> = map.next_key()?;
        let first = match first {
            None => return Ok(Value::record()),
            Some(key) => key,
        };

        match first.as_str() {
            "$map" => {
                let pairs: Vec<(Value, Value)> = map.next_value()?;
                expect_end(&mut map)?;
                Ok(Value::map_from(pairs))
            }
            "$set" => {
                let items: Vec<Value> = map.next_value()?;
                expect_end(&mut map)?;
                Ok(Value::set_from(items))
            }
            "$sentinel" => {
                let name: String = map.next_value()?;
                expect_end(&mut map)?;
                Ok(Value::Sentinel(Sentinel::for_name(&name)))
            }
            "$class" => {
                let name: String = map.next_value()?;
                let props_key: Option<String> = map.next_key()?;
                if props_key.as_deref() != Some("$props") {
                    return Err(de::Error::custom("expected \"$props\" after \"$class\""));
                }
                let props: IndexMap<String, Value> = map.next_value()?;
                expect_end(&mut map)?;
                let props = props
                    .into_iter()
                    .map(|(k, v)| (k, Prop::new(v)))
                    .collect();
                Ok(Value::record_from_parts(Some(ClassTag::resolve(&name)), props))
            }
            _ => {
                let mut props: IndexMap<String, Prop> = IndexMap::new();
                let first_value: Value = map.next_value()?;
                props.insert(first, Prop::new(first_value));
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    props.insert(key, Prop::new(value));
                }
                Ok(Value::record_from_parts(None, props))
            }
        }
    }
}

fn expect_end<'de, A: MapAccess<'de>>(map: &mut A) -> Result<(), A::Error> {
    match map.next_key::<String>()? {
        Some(key) => Err(de::Error::custom(format!(
            "unexpected entry {key:?} after envelope key"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use crate::{value, ClassTag, Sentinel, Value};

    #[test]
    fn test_json_scalars_roundtrip() {
        for v in [
            value!(null),
            value!(true),
            value!(42),
            value!(2.5),
            value!("hello"),
        ] {
            let json = serde_json::to_string(&v).unwrap();
            let back: Value = serde_json::from_str(&json).unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn test_record_and_sequence_roundtrip() {
        let v = value!({"a": [1, {"b": null}], "c": "x"});
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"a":[1,{"b":null}],"c":"x"}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_map_envelope_roundtrip() {
        let v = Value::map_from([(value!("k"), value!(1)), (value!(2), value!("two"))]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"$map":[["k",1],[2,"two"]]}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back.map_get(&value!("k")), Some(value!(1)));
        assert_eq!(back.map_get(&value!(2)), Some(value!("two")));
    }

    #[test]
    fn test_set_envelope_roundtrip() {
        let v = Value::set_from([1, 2, 3]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"$set":[1,2,3]}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back.set_values(), v.set_values());
    }

    #[test]
    fn test_sentinel_roundtrip_preserves_identity() {
        let v = Value::Sentinel(Sentinel::for_name("wire.test"));
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert!(Value::same(&back, &v));
    }

    #[test]
    fn test_class_envelope_roundtrip() {
        let tag = ClassTag::define("wire.Point").draftable().register();
        let v = Value::record_with_class(tag.clone(), [("x", 1), ("y", 2)]);
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back.class(), Some(tag));
        assert_eq!(back.get_key("x"), Some(value!(1)));
    }

    #[test]
    fn test_unserializable_kinds() {
        #[derive(Debug)]
        struct Blob;
        impl crate::OpaqueValue for Blob {}
        let v = Value::opaque(Blob);
        assert!(serde_json::to_string(&v).is_err());
    }
}
