//! Integration tests for controllers
//!
//! These tests verify that:
//! - Batched events fire once per run with the combined values
//! - Delayed updates honor stops issued before they wake
//! - Newer writes to a key win over older delayed ones
//! - Attached controllers trail their parent

mod common;

use common::{number, take, Harness};
use ressort_animation::{AnimatableNode, Controller, ControllerProps, Value, ValueMap};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn values(pairs: &[(&str, f64)]) -> ValueMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect()
}

fn get(ctrl: &Controller, key: &str) -> f64 {
    number(&ctrl.get()[key])
}

#[test]
fn test_controller_animates_keys() {
    let mut h = Harness::new();
    let ctrl = Controller::new(&h.handle()).unwrap();
    let done = h.spawn(
        ctrl.start_with(
            ControllerProps::to([("x", 1.0), ("y", -1.0)]).start_from([("x", 0.0), ("y", 0.0)]),
        )
        .unwrap(),
    );
    assert_eq!(ctrl.keys(), vec!["x".to_string(), "y".to_string()]);
    assert!(!ctrl.is_idle());

    h.run();
    let result = take(&done);
    assert!(result.finished);
    assert_eq!(result.value, values(&[("x", 1.0), ("y", -1.0)]));
    assert!(ctrl.is_idle());
}

/// A key that never had a value and gets no `from` is skipped
#[test]
fn test_key_without_start_is_skipped() {
    let mut h = Harness::new();
    let ctrl = Controller::new(&h.handle()).unwrap();
    h.spawn(ctrl.start_with(ControllerProps::to([("x", 1.0)])).unwrap());

    assert!(ctrl.keys().is_empty());
    assert!(ctrl.spring("x").is_none());
    assert!(ctrl.is_idle());
}

/// One start, many changes, one rest per run
#[test]
fn test_events_are_batched() {
    let mut h = Harness::new();
    let starts = Rc::new(Cell::new(0));
    let changes = Rc::new(Cell::new(0));
    let rests = Rc::new(RefCell::new(Vec::new()));

    let ctrl = Controller::with_item(&h.handle(), "card").unwrap();
    ctrl.set(&values(&[("x", 0.0), ("y", 0.0)])).unwrap();

    let (s, c, r) = (starts.clone(), changes.clone(), rests.clone());
    let props = ControllerProps::to([("x", 1.0), ("y", 2.0)])
        .on_start(move |_, _, _| s.set(s.get() + 1))
        .on_change(move |_, _, _| c.set(c.get() + 1))
        .on_rest(move |result, _, item| {
            let item = item.and_then(|i| i.downcast_ref::<&str>()).copied();
            r.borrow_mut().push((result.finished, item));
        });
    h.spawn(ctrl.start_with(props).unwrap());

    let frames = h.run();
    assert_eq!(starts.get(), 1);
    assert_eq!(changes.get(), frames);
    assert_eq!(*rests.borrow(), vec![(true, Some("card"))]);
}

/// A stop issued while an update waits out its delay discards it
#[test]
fn test_stop_discards_delayed_update() {
    let mut h = Harness::new();
    let ctrl = Controller::new(&h.handle()).unwrap();
    ctrl.set(&values(&[("x", 0.0)])).unwrap();
    let done = h.spawn(
        ctrl.start_with(ControllerProps::to([("x", 1.0)]).delay(100.0))
            .unwrap(),
    );
    h.steps(3);
    assert!(!ctrl.is_idle());
    assert_eq!(get(&ctrl, "x"), 0.0);

    ctrl.stop(None).unwrap();
    h.run();
    assert!(take(&done).cancelled);
    assert_eq!(get(&ctrl, "x"), 0.0);
    assert!(ctrl.is_idle());
}

#[test]
fn test_delay_postpones_update() {
    let mut h = Harness::new();
    let ctrl = Controller::new(&h.handle()).unwrap();
    ctrl.set(&values(&[("x", 0.0)])).unwrap();
    let done = h.spawn(
        ctrl.start_with(ControllerProps::to([("x", 1.0)]).delay(100.0))
            .unwrap(),
    );

    // 100ms is six frames at 60fps
    h.steps(5);
    assert_eq!(get(&ctrl, "x"), 0.0);
    h.steps(2);
    assert!(get(&ctrl, "x") > 0.0);

    h.run();
    assert!(take(&done).finished);
    assert_eq!(get(&ctrl, "x"), 1.0);
}

/// An older delayed write to a key loses against a newer immediate one
#[test]
fn test_newer_write_wins() {
    let mut h = Harness::new();
    let ctrl = Controller::new(&h.handle()).unwrap();
    ctrl.set(&values(&[("x", 0.0)])).unwrap();

    ctrl.update(ControllerProps::to([("x", 5.0)]).delay(50.0))
        .unwrap()
        .update(ControllerProps::to([("x", 2.0)]))
        .unwrap();
    let done = h.spawn(ctrl.start().unwrap());

    h.run();
    assert_eq!(get(&ctrl, "x"), 2.0);
    assert!(!take(&done).cancelled);
}

/// Queued updates sharing a delay merge into one
#[test]
fn test_queued_updates_merge() {
    let mut h = Harness::new();
    let ctrl = Controller::new(&h.handle()).unwrap();
    ctrl.set(&values(&[("x", 0.0), ("y", 0.0)])).unwrap();

    ctrl.update(ControllerProps::to([("x", 1.0)])).unwrap();
    ctrl.update(ControllerProps::to([("y", 1.0)])).unwrap();
    ctrl.update(ControllerProps::to([("x", 3.0)])).unwrap();
    let done = h.spawn(ctrl.start().unwrap());

    h.run();
    assert!(take(&done).finished);
    assert_eq!(ctrl.get(), values(&[("x", 3.0), ("y", 1.0)]));
}

#[test]
fn test_pause_holds_every_key() {
    let mut h = Harness::new();
    let rests = Rc::new(Cell::new(0));
    let r = rests.clone();
    let ctrl = Controller::new(&h.handle()).unwrap();
    ctrl.set(&values(&[("x", 0.0)])).unwrap();
    let done = h.spawn(
        ctrl.start_with(ControllerProps::to([("x", 1.0)]).on_rest(move |_, _, _| r.set(r.get() + 1)))
            .unwrap(),
    );
    h.steps(4);

    ctrl.pause(None).unwrap();
    let held = get(&ctrl, "x");
    h.steps(10);
    assert_eq!(get(&ctrl, "x"), held);
    assert_eq!(rests.get(), 0);
    assert!(!ctrl.is_idle());

    ctrl.resume(None).unwrap();
    h.run();
    assert_eq!(rests.get(), 1);
    assert!(take(&done).finished);
}

/// Keys of a child without their own goal trail the parent's springs
#[test]
fn test_attached_child_trails_parent() {
    let mut h = Harness::new();
    let parent = Controller::new(&h.handle()).unwrap();
    let child = Controller::new(&h.handle()).unwrap();
    parent.set(&values(&[("x", 0.0)])).unwrap();
    child.set(&values(&[("x", 0.0)])).unwrap();
    child.attach(&parent).unwrap();

    let led = h.spawn(parent.start_with(ControllerProps::to([("x", 1.0)])).unwrap());
    h.step();
    assert!(!child.is_idle());

    h.run();
    assert!(take(&led).finished);
    assert_eq!(get(&child, "x"), 1.0);
    let (p, c) = (parent.spring("x").unwrap(), child.spring("x").unwrap());
    assert!(c.priority() > p.priority());
}

/// A child that already came to rest wakes up again when its parent restarts
#[test]
fn test_idle_child_wakes_with_parent() {
    let mut h = Harness::new();
    let parent = Controller::new(&h.handle()).unwrap();
    let child = Controller::new(&h.handle()).unwrap();
    parent.set(&values(&[("x", 0.0)])).unwrap();
    child.set(&values(&[("x", 0.0)])).unwrap();
    child.attach(&parent).unwrap();

    h.spawn(parent.start_with(ControllerProps::to([("x", 1.0)])).unwrap());
    h.run();
    assert!(child.is_idle());

    h.spawn(parent.start_with(ControllerProps::to([("x", -1.0)])).unwrap());
    h.step();
    assert!(!child.is_idle());

    h.run();
    assert_eq!(get(&child, "x"), -1.0);
    assert!(child.is_idle());
}

#[test]
fn test_stopping_keys_leaves_others_running() {
    let mut h = Harness::new();
    let ctrl = Controller::new(&h.handle()).unwrap();
    ctrl.set(&values(&[("x", 0.0), ("y", 0.0)])).unwrap();
    h.spawn(ctrl.start_with(ControllerProps::to([("x", 1.0), ("y", 1.0)])).unwrap());
    h.steps(5);

    ctrl.stop(Some(&["x"])).unwrap();
    let frozen = get(&ctrl, "x");
    h.run();
    assert_eq!(get(&ctrl, "x"), frozen);
    assert_eq!(get(&ctrl, "y"), 1.0);
}

#[test]
fn test_dispose_frees_springs() {
    let mut h = Harness::new();
    let ctrl = Controller::new(&h.handle()).unwrap();
    ctrl.set(&values(&[("x", 0.0)])).unwrap();
    let spring = ctrl.spring("x").unwrap();
    h.spawn(ctrl.start_with(ControllerProps::to([("x", 1.0)])).unwrap());
    h.steps(2);

    ctrl.dispose().unwrap();
    assert!(ctrl.keys().is_empty());
    assert!(spring.try_get().is_err());
    assert!(ctrl.start_with(ControllerProps::to([("x", 1.0)])).is_err());
}
