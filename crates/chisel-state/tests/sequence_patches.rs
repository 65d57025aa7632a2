//! Sequence drafting and its patch model: index-stable replaces plus tail
//! append/truncate, never a mid-sequence splice.

use chisel_state::{path, value, Engine, Patch, Value};

fn engine() -> Engine {
    let engine = Engine::new();
    engine.set_auto_freeze(false);
    engine
}

#[test]
fn test_append_and_replace() {
    let base = value!([10, 20, 30]);
    let (next, forward, inverse) = engine()
        .produce_with_patches(base.clone(), |d| {
            d.push(40)?;
            d.set_index(0, 11)?;
            Ok(None)
        })
        .unwrap();

    assert_eq!(next, value!([11, 20, 30, 40]));
    assert_eq!(base, value!([10, 20, 30]));
    assert_eq!(
        forward,
        vec![
            Patch::replace(path!(0), 11),
            Patch::add(path!(3), 40),
        ]
    );
    assert_eq!(
        inverse,
        vec![
            Patch::replace(path!(0), 10),
            Patch::remove(path!(3)),
        ]
    );
}

#[test]
fn test_shrink_via_len() {
    let base = value!([1, 2, 3, 4]);
    let (next, forward, inverse) = engine()
        .produce_with_patches(base.clone(), |d| {
            d.set_len(2)?;
            Ok(None)
        })
        .unwrap();

    assert_eq!(next, value!([1, 2]));
    // Tail removals come highest-index-first so forward replay stays valid.
    assert_eq!(
        forward,
        vec![Patch::remove(path!(3)), Patch::remove(path!(2))]
    );
    assert_eq!(
        inverse,
        vec![Patch::add(path!(2), 3), Patch::add(path!(3), 4)]
    );

    let engine = engine();
    let restored = engine.apply_patches(&next, &inverse).unwrap();
    assert_eq!(restored, base);
    let shrunk = engine.apply_patches(&base, &forward).unwrap();
    assert_eq!(shrunk, next);
}

#[test]
fn test_grow_via_len_pads_null() {
    let (next, forward, inverse) = engine()
        .produce_with_patches(value!([1]), |d| {
            d.set_len(3)?;
            Ok(None)
        })
        .unwrap();
    assert_eq!(next, value!([1, null, null]));
    assert_eq!(
        forward,
        vec![
            Patch::add(path!(1), Value::Null),
            Patch::add(path!(2), Value::Null),
        ]
    );
    assert_eq!(
        inverse,
        vec![Patch::remove(path!(2)), Patch::remove(path!(1))]
    );
}

#[test]
fn test_nested_element_mutation_gets_granular_patches() {
    let base = value!([{"n": 1}, {"n": 2}]);
    let (next, forward, inverse) = engine()
        .produce_with_patches(base.clone(), |d| {
            d.get_index_draft(1)?.set("n", 9)?;
            Ok(None)
        })
        .unwrap();

    assert_eq!(next, value!([{"n": 1}, {"n": 9}]));
    assert!(Value::same(
        &next.get_index(0).unwrap(),
        &base.get_index(0).unwrap()
    ));
    assert_eq!(forward, vec![Patch::replace(path!(1, "n"), 9)]);
    assert_eq!(inverse, vec![Patch::replace(path!(1, "n"), 2)]);
}

#[test]
fn test_directly_assigned_element_suppresses_granular_patches() {
    // When an index is explicitly assigned, the assignment's own patch covers
    // it; the child draft emits nothing extra.
    let base = value!([{"n": 1}]);
    let (_, forward, _) = engine()
        .produce_with_patches(base, |d| {
            let child = d.get_index_draft(0)?;
            child.set("n", 2)?;
            d.set_index(0, value!({"n": 3}))?;
            Ok(None)
        })
        .unwrap();
    assert_eq!(forward, vec![Patch::replace(path!(0), value!({"n": 3}))]);
}

#[test]
fn test_splice_style_ops_round_trip() {
    let base = value!([1, 2, 3, 4, 5]);
    let engine = engine();
    let (next, forward, inverse) = engine
        .produce_with_patches(base.clone(), |d| {
            d.remove_index(1)?;
            d.insert_index(3, 99)?;
            Ok(None)
        })
        .unwrap();

    assert_eq!(next, value!([1, 3, 4, 99, 5]));
    assert_eq!(engine.apply_patches(&base, &forward).unwrap(), next);
    assert_eq!(engine.apply_patches(&next, &inverse).unwrap(), base);
}

#[test]
fn test_pop_round_trip() {
    let base = value!([1, 2]);
    let engine = engine();
    let (next, forward, inverse) = engine
        .produce_with_patches(base.clone(), |d| {
            assert_eq!(d.pop()?, Some(Value::Int(2)));
            Ok(None)
        })
        .unwrap();
    assert_eq!(next, value!([1]));
    assert_eq!(engine.apply_patches(&base, &forward).unwrap(), next);
    assert_eq!(engine.apply_patches(&next, &inverse).unwrap(), base);
}

#[test]
fn test_append_patch_with_dash_segment_applies() {
    let base = value!([1]);
    let patch: Patch =
        serde_json::from_str(r#"{"op":"add","path":["-"],"value":2}"#).unwrap();
    let next = engine().apply_patches(&base, &[patch]).unwrap();
    assert_eq!(next, value!([1, 2]));
}
