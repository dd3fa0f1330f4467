use std::cell::Cell;
use std::rc::Rc;

use dendriform::{CommitDetails, Dendriform, Options, Patch};
use serde_json::{json, Value};

use crate::helpers::{form, form_with_history, Calls};

fn replace(path: &[&str], value: Value) -> Patch {
    Patch::Replace {
        path: path.iter().map(|key| (*key).into()).collect(),
        value,
    }
}

fn letters_of(value: &Value) -> usize {
    value["name"].as_str().map_or(0, str::len)
}

// ── Change listeners ──────────────────────────────────────────────────────

#[test]
fn listeners_fire_when_the_value_changes() {
    let form = form(json!(123));
    let changes = Calls::default();
    let subscription = form.on_change(changes.callback());

    form.set(456).unwrap();
    form.flush().unwrap();
    assert_eq!(changes.len(), 1);
    let (value, details) = changes.last().unwrap();
    assert_eq!(value, json!(456));
    assert_eq!(details.patches, [replace(&[], json!(456))]);

    form.set(456).unwrap();
    form.flush().unwrap();
    assert_eq!(changes.len(), 1);

    form.set(457).unwrap();
    form.flush().unwrap();
    assert_eq!(changes.values(), [json!(456), json!(457)]);

    subscription.cancel();
    subscription.cancel();
    form.set(458).unwrap();
    form.flush().unwrap();
    assert_eq!(changes.len(), 2);
}

#[test]
fn listeners_see_undo() {
    let form = form_with_history(json!(123), 100);
    let changes = Calls::default();
    form.on_change(changes.callback());

    form.set(456).unwrap();
    form.flush().unwrap();
    form.undo().unwrap();
    form.flush().unwrap();

    assert_eq!(changes.len(), 2);
    let (value, details) = changes.last().unwrap();
    assert_eq!(value, json!(123));
    assert_eq!(details.go, -1);
    assert_eq!(details.patches, [replace(&[], json!(123))]);
}

#[test]
fn one_notification_carries_every_patch_since_the_last() {
    let form = form_with_history(json!(123), 100);
    let changes = Calls::default();
    form.on_change(changes.callback());

    form.set(456).unwrap();
    form.done().unwrap();
    form.set(789).unwrap();
    form.undo().unwrap();
    form.flush().unwrap();

    assert_eq!(changes.len(), 1);
    let (value, details) = changes.last().unwrap();
    assert_eq!(value, json!(456));
    assert_eq!(
        details.patches,
        [
            replace(&[], json!(456)),
            replace(&[], json!(789)),
            replace(&[], json!(456)),
        ]
    );
}

#[test]
fn branch_listeners_only_fire_for_their_branch() {
    let form = form(json!({"a": 1, "b": 1}));
    let a_changes = Calls::default();
    form.branch("a").on_change(a_changes.callback());

    form.branch("b").set(2).unwrap();
    form.flush().unwrap();
    assert_eq!(a_changes.len(), 0);

    form.branch("a").set(2).unwrap();
    form.flush().unwrap();
    assert_eq!(a_changes.values(), [json!(2)]);
}

#[test]
fn no_change_writes_notify_anyway() {
    let form = form(json!(1));
    let changes = Calls::default();
    form.on_change(changes.callback());
    form.no_change().unwrap();
    form.flush().unwrap();
    assert_eq!(changes.values(), [json!(1)]);
}

// ── Derivers ──────────────────────────────────────────────────────────────

#[test]
fn derivers_run_on_registration_and_after_commits() {
    let form = form(json!({"name": "boo", "letters": 0, "lettersDoubled": 0}));
    let changes = Calls::default();
    form.on_change(changes.callback());

    let first = Calls::default();
    let letters = form.branch("letters");
    let mut record = first.callback();
    form.on_derive(move |value, details| {
        record(value, details);
        letters.set(letters_of(value)).unwrap();
    })
    .unwrap();
    form.flush().unwrap();

    assert_eq!(
        form.value().unwrap(),
        json!({"name": "boo", "letters": 3, "lettersDoubled": 0})
    );
    assert_eq!(
        first.last(),
        Some((
            json!({"name": "boo", "letters": 0, "lettersDoubled": 0}),
            CommitDetails {
                go: 0,
                replace: true,
                patches: vec![]
            }
        ))
    );

    let second = Calls::default();
    let doubled = form.branch("lettersDoubled");
    let mut record = second.callback();
    form.on_derive(move |value, details| {
        record(value, details);
        let letters = value["letters"].as_u64().unwrap_or_default();
        doubled.set(letters * 2).unwrap();
    })
    .unwrap();
    form.flush().unwrap();

    assert_eq!(
        form.value().unwrap(),
        json!({"name": "boo", "letters": 3, "lettersDoubled": 6})
    );
    assert_eq!(second.values(), [json!({"name": "boo", "letters": 3, "lettersDoubled": 0})]);
    assert_eq!(changes.len(), 0);

    form.branch("name").set("boooo").unwrap();
    form.flush().unwrap();

    let (value, details) = first.last().unwrap();
    assert_eq!(value, json!({"name": "boooo", "letters": 3, "lettersDoubled": 6}));
    assert_eq!(
        details,
        CommitDetails {
            go: 0,
            replace: false,
            patches: vec![replace(&["name"], json!("boooo"))]
        }
    );

    let (value, details) = second.last().unwrap();
    assert_eq!(value, json!({"name": "boooo", "letters": 5, "lettersDoubled": 6}));
    assert_eq!(
        details.patches,
        [
            replace(&["name"], json!("boooo")),
            replace(&["letters"], json!(5)),
        ]
    );

    assert_eq!(
        changes.values(),
        [json!({"name": "boooo", "letters": 5, "lettersDoubled": 10})]
    );
}

#[test]
fn cancelled_derivers_stop_running() {
    let form = form(json!({"name": "boo", "letters": 0}));
    let changes = Calls::default();
    form.on_change(changes.callback());

    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let letters = form.branch("letters");
    let subscription = form
        .on_derive(move |value, _| {
            counter.set(counter.get() + 1);
            letters.set(letters_of(value)).unwrap();
        })
        .unwrap();

    form.branch("name").set("boooo").unwrap();
    form.flush().unwrap();
    subscription.cancel();
    assert!(!subscription.is_active());

    form.branch("name").set("boooooo").unwrap();
    form.flush().unwrap();

    assert_eq!(runs.get(), 2);
    assert_eq!(
        changes.values(),
        [
            json!({"name": "boooo", "letters": 5}),
            json!({"name": "boooooo", "letters": 5}),
        ]
    );
}

#[test]
fn derivers_receive_navigation() {
    let form = form_with_history(json!({"name": "boo", "letters": 0}), 1000);
    let changes = Calls::default();
    form.on_change(changes.callback());

    let derived = Calls::default();
    let mut record = derived.callback();
    let letters = form.branch("letters");
    form.on_derive(move |value, details| {
        record(value, details);
        letters.set(letters_of(value)).unwrap();
    })
    .unwrap();
    form.flush().unwrap();

    form.branch("name").set("boooo").unwrap();
    form.flush().unwrap();
    assert_eq!((form.history_len(), form.history_position()), (1, 1));

    form.undo().unwrap();
    form.flush().unwrap();
    assert_eq!((form.history_len(), form.history_position()), (1, 0));

    form.redo().unwrap();
    form.flush().unwrap();
    assert_eq!((form.history_len(), form.history_position()), (1, 1));

    assert_eq!(
        changes.values(),
        [
            json!({"name": "boooo", "letters": 5}),
            json!({"name": "boo", "letters": 3}),
            json!({"name": "boooo", "letters": 5}),
        ]
    );
    assert_eq!(
        derived.values(),
        [
            json!({"name": "boo", "letters": 0}),
            json!({"name": "boooo", "letters": 3}),
            json!({"name": "boo", "letters": 3}),
            json!({"name": "boooo", "letters": 5}),
        ]
    );
    let meta: Vec<(isize, bool)> = derived
        .details()
        .iter()
        .map(|details| (details.go, details.replace))
        .collect();
    assert_eq!(meta, [(0, true), (0, false), (-1, false), (1, false)]);
}

#[test]
fn branch_derivers_receive_their_branch_value() {
    let form = form(json!({"name": "Ada", "letters": 0}));
    let letters = form.branch("letters");
    form.branch("name")
        .on_derive(move |name, _| {
            letters.set(name.as_str().map_or(0, str::len)).unwrap();
        })
        .unwrap();
    assert_eq!(form.branch("letters").value().unwrap(), json!(3));
}

// ── Between containers ────────────────────────────────────────────────────

#[test]
fn second_container_is_always_derived() {
    let form = form_with_history(json!(100), 1000);
    let form2 = crate::helpers::form(json!(0));
    let target = form2.clone();
    form.on_derive(move |value, _| {
        target.set(value.as_i64().unwrap_or_default() * 2).unwrap();
    })
    .unwrap();
    form.flush().unwrap();
    form2.flush().unwrap();
    assert_eq!(form2.value().unwrap(), json!(200));

    form.set(200).unwrap();
    form.flush().unwrap();
    form2.flush().unwrap();
    assert_eq!(form2.value().unwrap(), json!(400));

    form.undo().unwrap();
    form.flush().unwrap();
    form2.flush().unwrap();
    assert_eq!(form.value().unwrap(), json!(100));
    assert_eq!(form2.value().unwrap(), json!(200));
}

#[test]
fn second_container_follows_navigation() {
    let form = form_with_history(json!(100), 1000);
    let form2 = form_with_history(json!(0), 1000);
    let target = form2.clone();
    form.on_derive(move |value, details| {
        if details.go != 0 {
            target.go(details.go).unwrap();
            return;
        }
        target.replace(details.replace);
        target.set(value.as_i64().unwrap_or_default() * 2).unwrap();
    })
    .unwrap();
    assert_eq!(form2.value().unwrap(), json!(200));

    form.set(200).unwrap();
    form.flush().unwrap();
    form2.flush().unwrap();
    assert_eq!(form2.value().unwrap(), json!(400));

    form.undo().unwrap();
    form.flush().unwrap();
    form2.flush().unwrap();
    assert_eq!(form.value().unwrap(), json!(100));
    assert_eq!(form2.value().unwrap(), json!(200));
    assert!(!form2.history().can_undo && form2.history().can_redo);

    form.redo().unwrap();
    form.flush().unwrap();
    form2.flush().unwrap();
    assert_eq!(form2.value().unwrap(), json!(400));
    assert!(form2.history().can_undo && !form2.history().can_redo);
}

#[test]
fn follower_history_only_marks_leader_commits() {
    let form = form_with_history(json!(100), 1000);
    let form2 = Dendriform::new(json!(0), Options::default().history(1000).replace(true)).unwrap();
    let target = form2.clone();
    form.on_derive(move |_, details| {
        if details.go != 0 {
            target.go(details.go).unwrap();
            return;
        }
        target.replace(details.replace);
        if !details.replace {
            target.no_change().unwrap();
        }
    })
    .unwrap();

    form2.set(1).unwrap();
    form2.flush().unwrap();
    form2.set(2).unwrap();
    form2.flush().unwrap();
    assert_eq!((form2.history_len(), form2.history_position()), (0, 0));

    form.set(200).unwrap();
    form.flush().unwrap();
    form2.flush().unwrap();
    assert_eq!(form2.value().unwrap(), json!(2));
    assert_eq!((form2.history_len(), form2.history_position()), (1, 1));

    form2.set(3).unwrap();
    form2.flush().unwrap();
    form2.set(4).unwrap();
    form2.flush().unwrap();

    form.undo().unwrap();
    form.flush().unwrap();
    form2.flush().unwrap();
    assert_eq!(form.value().unwrap(), json!(100));
    assert_eq!(form2.value().unwrap(), json!(2));
    assert_eq!((form2.history_len(), form2.history_position()), (1, 0));

    form.redo().unwrap();
    form.flush().unwrap();
    form2.flush().unwrap();
    assert_eq!(form2.value().unwrap(), json!(4));
    assert_eq!((form2.history_len(), form2.history_position()), (1, 1));
}

#[test]
fn mutually_deriving_containers_settle() {
    let a = form(json!(0));
    let b = crate::helpers::form(json!(0));

    let (to_b, to_a) = (b.clone(), a.clone());
    a.on_derive(move |value, _| {
        to_b.set(value.as_i64().unwrap_or_default() + 1).unwrap();
    })
    .unwrap();
    b.on_derive(move |value, _| {
        to_a.set(value.as_i64().unwrap_or_default() + 1).unwrap();
    })
    .unwrap();

    a.set(10).unwrap();
    a.flush().unwrap();
    b.flush().unwrap();
    assert_eq!(a.value().unwrap(), json!(10));
    assert_eq!(b.value().unwrap(), json!(11));
}

#[test]
fn other_containers_notify_on_their_own_flush() {
    let leader = form(json!("x"));
    let follower = crate::helpers::form(json!(""));
    let changes = Calls::default();
    follower.on_change(changes.callback());

    let target = follower.clone();
    leader
        .on_derive(move |value, _| {
            let text = value.as_str().unwrap_or_default().to_uppercase();
            target.set(text).unwrap();
        })
        .unwrap();
    assert_eq!(changes.len(), 0);

    leader.set("y").unwrap();
    leader.flush().unwrap();
    assert_eq!(follower.value().unwrap(), json!("Y"));
    assert_eq!(changes.len(), 0);

    follower.flush().unwrap();
    assert_eq!(changes.values(), [json!("Y")]);
}
