//! Edge cases: class instances, strict copies, accessors, wire stability,
//! opaque payloads, and freeze policy corners.

use chisel_state::{
    draftable_marker, path, value, ChiselError, ClassTag, Engine, OpaqueValue, Patch,
    StrictCopyMode, Value,
};

fn engine() -> Engine {
    let engine = Engine::new();
    engine.set_auto_freeze(false);
    engine
}

#[test]
fn test_marker_opts_instance_into_drafting() {
    let class = ClassTag::define("edge.Unregistered").register();
    let mut base = Value::record_with_class(class, [("x", 1)]);
    assert!(matches!(
        engine().produce(base.clone(), |_| Ok(None)),
        Err(ChiselError::NotDraftable { .. })
    ));

    base.mark_draftable().unwrap();
    let next = engine()
        .produce(base, |d| {
            d.set("x", 2)?;
            Ok(None)
        })
        .unwrap();
    assert_eq!(next.get_key("x"), Some(Value::Int(2)));
    // The marker survives the copy.
    assert!(next.is_draftable());
}

#[test]
fn test_class_tag_survives_production() {
    let class = ClassTag::define("edge.Point").draftable().register();
    let base = Value::record_with_class(class.clone(), [("x", 1), ("y", 2)]);
    let next = engine()
        .produce(base, |d| {
            d.set("x", 3)?;
            Ok(None)
        })
        .unwrap();
    assert_eq!(next.class(), Some(class));
}

#[test]
fn test_class_setter_takes_the_write() {
    let class = ClassTag::define("edge.Boxed")
        .draftable()
        .accessor(
            "wrapped",
            |v| match v.as_draft() {
                Some(d) => d.get("raw").unwrap_or(Value::Null),
                None => v.get_key("raw").unwrap_or(Value::Null),
            },
            |draft, incoming| draft.set("raw", incoming),
        )
        .register();
    let base = Value::record_with_class(class, [("raw", 1)]);
    let next = engine()
        .produce(base, |d| {
            assert_eq!(d.get("wrapped")?, Value::Int(1));
            d.set("wrapped", 5)?;
            assert_eq!(d.get("wrapped")?, Value::Int(5));
            Ok(None)
        })
        .unwrap();
    assert_eq!(next.get_key("raw"), Some(Value::Int(5)));
    assert_eq!(next.get_key("wrapped"), None);
}

#[test]
fn test_strict_copy_collapses_accessors_into_data() {
    let class = ClassTag::define("edge.Celsius")
        .draftable()
        .getter("fahrenheit", |v| {
            let celsius = match v.as_draft() {
                Some(d) => d.get("celsius").unwrap_or(Value::Null),
                None => v.get_key("celsius").unwrap_or(Value::Null),
            };
            match celsius {
                Value::Int(c) => Value::Int(c * 9 / 5 + 32),
                _ => Value::Null,
            }
        })
        .register();
    let base = Value::record_with_class(class, [("celsius", 100)]);

    // Plain mode: the accessor stays on the class, the copy has no own slot.
    let next = engine()
        .produce(base.clone(), |d| {
            d.set("celsius", 0)?;
            Ok(None)
        })
        .unwrap();
    assert_eq!(next.get_key("fahrenheit"), None);

    // Strict mode: the copy collapses the accessor to data read through the
    // base, so the collapsed value reflects the base, not the draft write.
    let strict = engine();
    strict.set_strict_copy(StrictCopyMode::ClassOnly);
    let next = strict
        .produce(base, |d| {
            d.set("celsius", 0)?;
            Ok(None)
        })
        .unwrap();
    assert_eq!(next.get_key("fahrenheit"), Some(Value::Int(212)));
    assert_eq!(next.get_key("celsius"), Some(Value::Int(0)));
}

#[test]
fn test_sentinel_identity_across_engine_instances() {
    // Sentinels are process-wide: independent engines resolve the same value.
    let a = Engine::new();
    let b = Engine::new();
    let out_a = a.produce(value!({"x": 1}), |_| Ok(Some(Value::nothing()))).unwrap();
    let out_b = b.produce(value!({"x": 1}), |_| Ok(Some(Value::nothing()))).unwrap();
    assert_eq!(out_a, Value::Null);
    assert_eq!(out_b, Value::Null);
    assert!(Value::same(
        &Value::Sentinel(draftable_marker()),
        &Value::Sentinel(chisel_state::draftable_marker())
    ));
}

#[test]
fn test_opaque_payloads_pass_through_untouched() {
    #[derive(Debug)]
    struct Handle(&'static str);
    impl OpaqueValue for Handle {}

    let payload = Value::opaque(Handle("connection"));
    let mut base = value!({"n": 1});
    base.insert("handle", payload.clone()).unwrap();

    let next = engine()
        .produce(base, |d| {
            let handle = d.get("handle")?;
            assert!(!handle.is_draft());
            d.set("n", 2)?;
            Ok(None)
        })
        .unwrap();
    assert!(Value::same(&next.get_key("handle").unwrap(), &payload));
}

#[test]
fn test_opaque_base_is_not_draftable() {
    #[derive(Debug)]
    struct Handle(&'static str);
    impl OpaqueValue for Handle {}

    // A bare opaque payload is an object the engine cannot draft, not a
    // scalar to run the recipe over directly.
    let base = Value::opaque(Handle("connection"));
    let err = engine().produce(base, |_| Ok(None)).unwrap_err();
    assert!(matches!(
        err,
        ChiselError::NotDraftable { found: "opaque" }
    ));
}

#[test]
fn test_produce_over_draft_is_rejected() {
    let engine = engine();
    engine
        .produce(value!({"a": 1}), |d| {
            let nested = engine.produce(d.value(), |_| Ok(None));
            assert!(matches!(nested, Err(ChiselError::BadArgument { .. })));
            Ok(None)
        })
        .unwrap();
}

#[test]
fn test_nan_keyed_map_entries() {
    let base = Value::map_from([(value!(f64::NAN), value!("nan"))]);
    engine()
        .produce(base, |d| {
            assert!(d.map_has(&value!(f64::NAN))?);
            // Identity-equals: the stored value matches, so this is a no-op.
            d.map_insert(value!(f64::NAN), "nan")?;
            assert!(!d.is_modified());
            Ok(None)
        })
        .unwrap();
}

#[test]
fn test_record_insertion_order_is_preserved() {
    let next = engine()
        .produce(value!({"b": 1, "a": 2}), |d| {
            d.set("c", 3)?;
            d.remove("b")?;
            d.set("b", 4)?;
            Ok(None)
        })
        .unwrap();
    assert_eq!(
        next.keys(),
        vec!["a".to_string(), "c".to_string(), "b".to_string()]
    );
}

#[test]
fn test_hidden_props_escape_deep_freeze() {
    let mut base = Value::record();
    base.insert("visible", value!({"n": 1})).unwrap();
    base.insert_hidden("bookkeeping", value!({"n": 2})).unwrap();

    let engine = Engine::new(); // auto-freeze on
    let next = engine
        .produce(base, |d| {
            d.set("touch", 1)?;
            Ok(None)
        })
        .unwrap();
    assert!(next.is_frozen());
    assert!(next.get_key("visible").unwrap().is_frozen());
    assert!(!next.get_key("bookkeeping").unwrap().is_frozen());
}

#[test]
fn test_patch_wire_format_is_stable() {
    let patches = vec![
        Patch::replace(path!("a", 0, "b"), 1),
        Patch::add(path!("list", 2), value!({"k": null})),
        Patch::remove(path!("gone")),
        Patch::remove_value(path!(1), 7),
    ];
    let json = serde_json::to_string(&patches).unwrap();
    assert_eq!(
        json,
        concat!(
            r#"[{"op":"replace","path":["a",0,"b"],"value":1},"#,
            r#"{"op":"add","path":["list",2],"value":{"k":null}},"#,
            r#"{"op":"remove","path":["gone"]},"#,
            r#"{"op":"remove","path":[1],"value":7}]"#,
        )
    );
    let parsed: Vec<Patch> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, patches);
}

#[test]
fn test_patches_survive_wire_round_trip_and_still_apply() {
    let engine = engine();
    let base = value!({"a": {"x": 1}});
    let (next, forward, _) = engine
        .produce_with_patches(base.clone(), |d| {
            d.get_draft("a")?.set("x", 2)?;
            Ok(None)
        })
        .unwrap();
    let json = serde_json::to_string(&forward).unwrap();
    let parsed: Vec<Patch> = serde_json::from_str(&json).unwrap();
    assert_eq!(engine.apply_patches(&base, &parsed).unwrap(), next);
}

#[test]
fn test_draft_values_refuse_serialization() {
    engine()
        .produce(value!({"a": {"x": 1}}), |d| {
            let child = d.get("a")?;
            assert!(serde_json::to_string(&child).is_err());
            Ok(None)
        })
        .unwrap();
}

#[test]
fn test_set_remove_patch_requires_value() {
    let engine = engine();
    let base = Value::set_from([1]);
    let patch = Patch::remove(path!(0));
    let err = engine.apply_patches(&base, &[patch]).unwrap_err();
    assert!(matches!(err, ChiselError::BadArgument { .. }));
}
