//! Integration tests for async scripts and chains
//!
//! These tests verify that:
//! - Scripts run their steps in order and resolve finished
//! - Stopping or cancelling a target unwinds its script as cancelled
//! - Starting a new script supersedes the running one

mod common;

use common::{number, take, Harness};
use ressort_animation::{
    AnimatableNode, AnimationContext, Controller, ControllerProps, Script, ScriptContext,
    SpringProps, SpringValue, Value, ValueMap,
};
use std::cell::RefCell;
use std::rc::Rc;

fn two_steps() -> Script<SpringValue> {
    Script::new(|ctx: ScriptContext<SpringValue>| async move {
        ctx.next(SpringProps::to(1.0)).await?;
        ctx.next(SpringProps::to(2.0)).await?;
        Ok(())
    })
}

#[test]
fn test_script_runs_steps_in_order() {
    let mut h = Harness::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let script = Script::new(move |ctx: ScriptContext<SpringValue>| {
        let log = log.clone();
        async move {
            let first = ctx.next(SpringProps::to(1.0)).await?;
            log.borrow_mut().push(number(&first.value));
            let second = ctx.next(SpringProps::to(2.0)).await?;
            log.borrow_mut().push(number(&second.value));
            Ok(())
        }
    });

    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(x.start(SpringProps::script(script)).unwrap());
    h.run();

    assert_eq!(*seen.borrow(), vec![1.0, 2.0]);
    let result = take(&done);
    assert!(result.finished);
    assert_eq!(result.value, Value::from(2.0));
}

#[test]
fn test_chain_runs_like_a_script() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let chain = SpringProps::chain([SpringProps::to(3.0), SpringProps::to(-1.0)]);
    let done = h.spawn(x.start(chain).unwrap());

    h.run();
    assert!(take(&done).finished);
    assert_eq!(x.get(), Value::from(-1.0));
}

/// A stop unwinds the script at its current step
#[test]
fn test_stop_cancels_script() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(x.start(SpringProps::script(two_steps())).unwrap());
    h.steps(10);

    x.stop().unwrap();
    h.settle();
    let result = take(&done);
    assert!(result.cancelled);
    assert!(!x.is_animating());

    // The second step never starts
    let frozen = x.get();
    h.steps(60);
    assert_eq!(x.get(), frozen);
}

fn forever() -> Script<SpringValue> {
    Script::new(|ctx: ScriptContext<SpringValue>| async move {
        loop {
            ctx.next(SpringProps::to(1.0).reset(true)).await?;
        }
    })
}

/// An endless script only ends through a stop
#[test]
fn test_stop_ends_endless_script() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(x.start(SpringProps::script(forever())).unwrap());

    // Past the first run, so the loop has restarted at least once
    h.steps(60);
    assert!(done.borrow().is_none());
    assert!(x.is_animating());

    x.stop().unwrap();
    h.settle();
    let result = take(&done);
    assert!(result.cancelled);
    assert!(!result.finished);
    assert!(x.idle());

    let frozen = x.get();
    h.steps(30);
    assert_eq!(x.get(), frozen);
}

#[test]
fn test_cancel_ends_endless_script() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(x.start(SpringProps::script(forever())).unwrap());
    h.steps(12);

    x.cancel().unwrap();
    h.settle();
    assert!(take(&done).cancelled);
    assert!(x.idle());
    assert!(!x.is_animating());
}

/// With animations skipped a script does not run and settles at once
#[test]
fn test_script_under_skip_animation() {
    let mut h = Harness::with_context(|clock, frames| {
        AnimationContext::builder()
            .clock(clock.clone())
            .frames(frames.clone())
            .skip_animation(true)
            .build()
    });
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(x.start(SpringProps::script(two_steps())).unwrap());

    let result = take(&done);
    assert!(!result.finished);
    assert_eq!(result.value, Value::from(0.0));
}

/// A second script takes over; the first resolves unfinished
#[test]
fn test_new_script_supersedes_old() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let first = h.spawn(x.start(SpringProps::script(two_steps())).unwrap());
    h.steps(5);

    let other = Script::new(|ctx: ScriptContext<SpringValue>| async move {
        ctx.next(SpringProps::to(-5.0)).await?;
        Ok(())
    });
    let second = h.spawn(x.start(SpringProps::script(other)).unwrap());
    h.run();

    let first = take(&first);
    assert!(!first.finished);
    assert!(!first.cancelled);
    assert!(take(&second).finished);
    assert_eq!(x.get(), Value::from(-5.0));
}

/// A paused script holds between steps until resumed
#[test]
fn test_paused_script_waits() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(x.start(SpringProps::script(two_steps())).unwrap());
    h.steps(3);

    x.pause().unwrap();
    h.steps(30);
    assert!(done.borrow().is_none());
    assert!(x.is_paused());

    x.resume().unwrap();
    h.run();
    assert!(take(&done).finished);
    assert_eq!(x.get(), Value::from(2.0));
}

#[test]
fn test_controller_script() {
    let mut h = Harness::new();
    let ctrl = Controller::new(&h.handle()).unwrap();
    let start: ValueMap = [("x".to_string(), Value::from(0.0))].into_iter().collect();
    ctrl.set(&start).unwrap();

    let script = Script::new(|ctx: ScriptContext<Controller>| async move {
        ctx.next(ControllerProps::to([("x", 1.0)])).await?;
        ctx.next(ControllerProps::to([("x", 4.0)])).await?;
        Ok(())
    });
    let done = h.spawn(ctrl.start_with(ControllerProps::script(script)).unwrap());
    h.run();

    let result = take(&done);
    assert!(result.finished);
    assert_eq!(number(&result.value["x"]), 4.0);
    assert!(ctrl.is_idle());
}

#[test]
fn test_controller_cancel_unwinds_script() {
    let mut h = Harness::new();
    let ctrl = Controller::new(&h.handle()).unwrap();
    let start: ValueMap = [("x".to_string(), Value::from(0.0))].into_iter().collect();
    ctrl.set(&start).unwrap();

    let script = Script::new(|ctx: ScriptContext<Controller>| async move {
        ctx.next(ControllerProps::to([("x", 1.0)])).await?;
        ctx.next(ControllerProps::to([("x", 4.0)])).await?;
        Ok(())
    });
    let done = h.spawn(ctrl.start_with(ControllerProps::script(script)).unwrap());
    h.steps(8);

    ctrl.cancel(None).unwrap();
    h.settle();
    assert!(take(&done).cancelled);

    h.run();
    assert!(ctrl.is_idle());
    assert!(number(&ctrl.get()["x"]) < 1.0);
}
