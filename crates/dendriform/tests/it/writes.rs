use dendriform::{Error, Mutation};
use proptest::prelude::*;
use serde_json::{json, Value};

use crate::helpers::{form, form_with_history, Calls};

fn increment(draft: &mut Value) {
    *draft = json!(draft.as_i64().unwrap_or_default() + 1);
}

#[test]
fn writes_are_visible_before_the_flush() {
    let form = form(json!(123));
    form.set(456).unwrap();
    assert_eq!(form.value().unwrap(), json!(456));
    assert_eq!(form.id(), Some(0));
}

#[test]
fn multiple_writes_fold_into_one_commit() {
    let form = form_with_history(json!(1), 10);
    form.produce(increment).unwrap();
    form.produce(increment).unwrap();
    form.produce(increment).unwrap();
    assert_eq!(form.value().unwrap(), json!(4));

    form.produce(increment).unwrap();
    form.produce(increment).unwrap();
    form.flush().unwrap();
    assert_eq!(form.value().unwrap(), json!(6));
    assert_eq!(form.history_len(), 1);
}

#[test]
fn producers_edit_nested_drafts() {
    let form = form(json!({"foo": [1, 2]}));
    let foo = form.branch("foo");
    for front in [0, -1] {
        foo.produce(move |draft| {
            if let Value::Array(items) = draft {
                items.insert(0, json!(front));
            }
        })
        .unwrap();
    }
    assert_eq!(form.value().unwrap(), json!({"foo": [-1, 0, 1, 2]}));
}

#[test]
fn producing_a_missing_branch_starts_from_null() {
    let form = form(json!({}));
    form.branch("count")
        .produce(|draft| {
            assert!(draft.is_null());
            *draft = json!(1);
        })
        .unwrap();
    form.branch("untouched").produce(|_| {}).unwrap();
    assert_eq!(form.value().unwrap(), json!({"count": 1}));
}

#[test]
fn writes_through_scalars_fail_at_once() {
    let form = form_with_history(json!({"foo": 1}), 10);
    let err = form.branch_in(["foo", "bar"]).set(2).unwrap_err();
    assert!(matches!(err, Error::Access(_)));

    let err = form.branch_in(["missing", "bar"]).set(2).unwrap_err();
    assert_eq!(err.to_string(), "nothing at /missing");

    form.flush().unwrap();
    assert_eq!(form.value().unwrap(), json!({"foo": 1}));
    assert_eq!(form.history_len(), 0);
}

#[test]
fn equal_writes_do_not_commit() {
    let form = form_with_history(json!({"a": 1}), 10);
    let changes = Calls::default();
    form.on_change(changes.callback());

    form.branch("a").set(1).unwrap();
    form.flush().unwrap();
    assert_eq!(form.history_len(), 0);
    assert_eq!(changes.len(), 0);
}

#[test]
fn writes_that_cancel_out_do_not_commit() {
    let form = form_with_history(json!({"a": 1, "b": [1, 2]}), 10);
    let changes = Calls::default();
    form.on_change(changes.callback());

    form.branch("a").set(5).unwrap();
    form.branch("b").set(json!([2])).unwrap();
    form.branch("a").set(1).unwrap();
    form.branch("b").set(json!([1, 2])).unwrap();
    form.flush().unwrap();

    assert_eq!(form.value().unwrap(), json!({"a": 1, "b": [1, 2]}));
    assert_eq!(form.history_len(), 0);
    assert_eq!(changes.len(), 0);
}

#[test]
fn value_mutations_convert() {
    let form = form(json!(null));
    form.write(json!({"x": true})).unwrap();
    form.write(Mutation::NoChange).unwrap();
    assert_eq!(form.value().unwrap(), json!({"x": true}));
}

fn arb_edit() -> impl Strategy<Value = (usize, i64)> {
    (0usize..4, -50i64..50)
}

proptest! {
    #[test]
    fn unflushed_writes_apply_in_order_exactly_once(edits in prop::collection::vec(arb_edit(), 1..12)) {
        let initial = json!([0, 0, 0, 0]);
        let form = form_with_history(initial.clone(), 10);

        let mut expected = initial.clone();
        for (slot, delta) in &edits {
            let delta = *delta;
            form.branch(*slot)
                .produce(move |draft| *draft = json!(draft.as_i64().unwrap_or_default() + delta))
                .unwrap();
            expected[*slot] = json!(expected[*slot].as_i64().unwrap_or_default() + delta);
        }
        form.flush().unwrap();
        prop_assert_eq!(form.value().unwrap(), expected.clone());

        if expected != initial {
            prop_assert_eq!(form.history_len(), 1);
            form.undo().unwrap();
            prop_assert_eq!(form.value().unwrap(), initial);
        } else {
            prop_assert_eq!(form.history_len(), 0);
        }
    }
}
