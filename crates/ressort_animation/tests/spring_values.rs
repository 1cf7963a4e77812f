//! Integration tests for spring values driven by the frame loop
//!
//! These tests verify that:
//! - Springs follow the expected trajectory and settle on their goal
//! - Stop, cancel, finish and pause resolve pending updates correctly
//! - Interpolations and followers stay in sync with their sources

mod common;

use common::{number, take, Harness};
use ressort_animation::{
    AnimatableNode, AnimationContext, AnimationError, ConfigUpdate, Decay, Phase, SpringProps,
    SpringValue, Value,
};
use std::cell::Cell;
use std::rc::Rc;

/// The default spring takes 42 frames from 0 to 1 and never overshoots
#[test]
fn test_default_spring_settles_on_goal() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(x.start(SpringProps::to(1.0)).unwrap());
    assert!(h.frames.is_requested());

    h.step();
    assert_eq!(number(&x.get()), 0.022634843307857987);

    let mut peak: f64 = 0.0;
    let mut frames = 1;
    while h.frames.is_requested() {
        h.step();
        frames += 1;
        peak = peak.max(number(&x.get()));
    }
    assert_eq!(frames, 42);
    assert!(peak <= 1.0);
    assert_eq!(x.get(), Value::from(1.0));

    let result = take(&done);
    assert!(result.finished);
    assert!(!result.cancelled);
    assert_eq!(x.phase(), Phase::Idle);
}

/// Immediate updates jump to the goal on the next frame
#[test]
fn test_immediate_jumps_to_goal() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(x.start(SpringProps::to(5.0).immediate(true)).unwrap());

    assert_eq!(h.run(), 1);
    assert_eq!(x.get(), Value::from(5.0));
    assert!(take(&done).finished);
}

/// Skipping animations finishes every update synchronously
#[test]
fn test_skip_animation_finishes_at_once() {
    let mut h = Harness::with_context(|clock, frames| {
        AnimationContext::builder()
            .clock(clock.clone())
            .frames(frames.clone())
            .skip_animation(true)
            .build()
    });
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(x.start(SpringProps::to(3.0)).unwrap());

    assert_eq!(x.get(), Value::from(3.0));
    assert!(take(&done).finished);
    assert!(!x.is_animating());
}

/// Stopping freezes the value the pending future reports
#[test]
fn test_stop_resolves_with_current_value() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(x.start(SpringProps::to(1.0)).unwrap());
    h.steps(10);

    x.stop().unwrap();
    h.settle();
    let result = take(&done);
    assert_eq!(result.value, x.get());
    assert!(!result.finished);
    assert!(!result.cancelled);
    assert!(!x.is_animating());

    // Nothing moves after a stop
    let frozen = x.get();
    h.steps(5);
    assert_eq!(x.get(), frozen);
}

#[test]
fn test_cancel_reports_cancelled() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(x.start(SpringProps::to(1.0)).unwrap());
    h.steps(3);

    x.cancel().unwrap();
    h.settle();
    assert!(take(&done).cancelled);
}

#[test]
fn test_finish_jumps_to_goal() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(x.start(SpringProps::to(4.0)).unwrap());
    h.steps(2);

    x.finish().unwrap();
    h.settle();
    assert_eq!(x.get(), Value::from(4.0));
    assert!(take(&done).finished);
}

/// A newer goal settles the previous update as unfinished
#[test]
fn test_retarget_settles_previous_update() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let first = h.spawn(x.start(SpringProps::to(1.0)).unwrap());
    h.steps(5);

    let second = h.spawn(x.start(SpringProps::to(2.0)).unwrap());
    let first = take(&first);
    assert!(!first.finished);

    h.run();
    assert!(take(&second).finished);
    assert_eq!(x.get(), Value::from(2.0));
}

/// While paused no frames advance and `on_rest` stays quiet
#[test]
fn test_pause_holds_without_resting() {
    let mut h = Harness::new();
    let rests = Rc::new(Cell::new(0));
    let r = rests.clone();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let done = h.spawn(
        x.start(SpringProps::to(1.0).on_rest(move |_, _| r.set(r.get() + 1)))
            .unwrap(),
    );
    h.steps(5);

    x.pause().unwrap();
    assert!(x.is_paused());
    let held = x.get();
    h.steps(20);
    assert_eq!(x.get(), held);
    assert_eq!(rests.get(), 0);
    assert!(done.borrow().is_none());

    x.resume().unwrap();
    h.run();
    assert_eq!(rests.get(), 1);
    assert_eq!(x.get(), Value::from(1.0));
    assert!(take(&done).finished);
}

#[test]
fn test_on_change_sees_every_frame() {
    let mut h = Harness::new();
    let changes = Rc::new(Cell::new(0));
    let c = changes.clone();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let _sub = x.on_change(move |_| c.set(c.get() + 1)).unwrap();

    h.spawn(x.start(SpringProps::to(1.0)).unwrap());
    let frames = h.run();
    assert_eq!(changes.get(), frames);
}

/// Switching representation mid-animation is rejected
#[test]
fn test_kind_change_is_rejected() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    h.spawn(x.start(SpringProps::to(1.0)).unwrap());
    h.run();

    let err = x.start(SpringProps::to([1.0, 2.0])).err();
    assert!(matches!(err, Some(AnimationError::TypeMismatch { .. })));

    // Jumping is fine
    h.spawn(x.start(SpringProps::to([1.0, 2.0]).immediate(true)).unwrap());
    h.run();
    assert_eq!(x.get(), Value::from([1.0, 2.0]));
}

#[test]
fn test_vector_components_move_together() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), [0.0, 10.0]).unwrap();
    h.spawn(x.start(SpringProps::to([10.0, 0.0])).unwrap());
    h.steps(10);

    let mid = x.get().components();
    assert!(mid[0] > 0.0 && mid[0] < 10.0);
    assert!((mid[0] + mid[1] - 10.0).abs() < 1e-9);

    h.run();
    assert_eq!(x.get(), Value::from([10.0, 0.0]));
}

#[test]
fn test_duration_config_is_linear() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let config = ConfigUpdate::new().duration(100.0);
    let done = h.spawn(x.start(SpringProps::to(10.0).config(config)).unwrap());

    h.step();
    assert!((number(&x.get()) - 10.0 / 6.0).abs() < 1e-9);
    assert_eq!(h.run() + 1, 6);
    assert!(take(&done).finished);
}

/// Decay coasts along `v0 / (1 - f) * (1 - e^(-(1 - f) t))`
#[test]
fn test_decay_slows_exponentially() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let config = ConfigUpdate::new()
        .decay(Decay::Factor(0.998))
        .velocity(1000.0);
    h.spawn(x.start(SpringProps::new().config(config)).unwrap());

    let mut stepped = 0;
    for frames in [10, 20, 30] {
        h.steps(frames - stepped);
        stepped = frames;
        let t = frames as f64 * 1000.0 / 60.0;
        let expected = 500_000.0 * (1.0 - (-0.002 * t).exp());
        let actual = number(&x.get());
        assert!(
            (actual - expected).abs() < 1e-9 * expected,
            "frame {frames}: {actual} vs {expected}"
        );
    }
    assert!(x.is_animating());
}

/// Derived nodes recompute from their sources each frame
#[test]
fn test_interpolations_chain() {
    let mut h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    let doubled = x.to(|v| Value::from(number(v) * 2.0)).unwrap();
    let shifted = doubled.to(|v| Value::from(number(v) + 1.0)).unwrap();
    assert_eq!(shifted.get(), Value::from(1.0));

    h.spawn(x.start(SpringProps::to(1.0)).unwrap());
    h.step();
    assert_eq!(number(&doubled.get()), number(&x.get()) * 2.0);
    assert_eq!(number(&shifted.get()), number(&doubled.get()) + 1.0);

    h.run();
    assert_eq!(shifted.get(), Value::from(3.0));
    assert!(shifted.idle());
}

/// A spring following another trails it and settles on its final value
#[test]
fn test_spring_follows_node() {
    let mut h = Harness::new();
    let leader = SpringValue::new(&h.handle(), 0.0).unwrap();
    let follower = SpringValue::new(&h.handle(), 0.0).unwrap();

    let followed = h.spawn(follower.start(SpringProps::to(&leader)).unwrap());
    let led = h.spawn(leader.start(SpringProps::to(1.0)).unwrap());
    assert!(follower.priority() > leader.priority());

    h.run();
    assert!(take(&led).finished);
    assert!(take(&followed).finished);
    assert_eq!(follower.get(), Value::from(1.0));
    assert!(follower.idle());
}

#[test]
fn test_disposed_spring_rejects_updates() {
    let h = Harness::new();
    let x = SpringValue::new(&h.handle(), 0.0).unwrap();
    x.dispose().unwrap();

    assert_eq!(x.phase(), Phase::Disposed);
    assert!(matches!(x.start(SpringProps::to(1.0)).err(), Some(AnimationError::Disposed)));
}
