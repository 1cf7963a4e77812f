//! Headless scenario runner
//!
//! Builds the scenario's springs on a scheduler driven by a manual clock,
//! steps it at the scenario's frame rate and records every frame.

use anyhow::{Context, Result};
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use indexmap::IndexMap;
use ressort_animation::{
    AnimatableNode, AnimationContext, AnimationResult, AnimationScheduler, ManualClock,
    ManualFrames, SpringProps, SpringValue, Value,
};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

use crate::scenario::Scenario;

/// Values of every spring after one frame
#[derive(Debug, Serialize)]
pub struct Frame {
    pub index: usize,
    pub time_ms: f64,
    pub values: IndexMap<String, Value>,
}

/// Everything a run produced
#[derive(Debug, Serialize)]
pub struct Trace {
    pub frames: Vec<Frame>,
    /// How each spring's update ended; missing while still moving
    pub results: IndexMap<String, AnimationResult>,
    /// Ran into `max_frames` before everything came to rest
    pub truncated: bool,
}

type Results = Rc<RefCell<IndexMap<String, AnimationResult>>>;

pub fn run(scenario: &Scenario) -> Result<Trace> {
    let clock = ManualClock::new(0.0);
    let frames = ManualFrames::new();
    let ctx = AnimationContext::builder()
        .clock(clock.clone())
        .frames(frames.clone())
        .settings(scenario.scheduler.clone())
        .build();
    let scheduler = AnimationScheduler::new(ctx);
    let handle = scheduler.handle();

    let mut springs: IndexMap<String, SpringValue> = IndexMap::new();
    for spec in &scenario.springs {
        let spring = SpringValue::keyed(&handle, spec.key.clone(), spec.from.clone())
            .with_context(|| format!("Failed to create spring `{}`", spec.key))?;
        springs.insert(spec.key.clone(), spring);
    }

    let mut pool = LocalPool::new();
    let results: Results = Rc::new(RefCell::new(IndexMap::new()));
    for spec in &scenario.springs {
        let Some(spring) = springs.get(&spec.key) else {
            continue;
        };
        let mut props = match (&spec.to, &spec.follow) {
            (_, Some(leader)) => {
                let leader = springs
                    .get(leader)
                    .with_context(|| format!("Spring `{}` follows unknown key `{leader}`", spec.key))?;
                SpringProps::to(leader)
            }
            (Some(to), None) => SpringProps::to(to.clone()),
            (None, None) => continue,
        };
        props.immediate = spec.immediate.then_some(true);
        props.delay = spec.delay;
        props.config = spec.resolved_config()?;

        let future = spring
            .start(props)
            .with_context(|| format!("Failed to start spring `{}`", spec.key))?;
        let key = spec.key.clone();
        let sink = results.clone();
        pool.spawner()
            .spawn_local(async move {
                match future.await {
                    Ok(result) => {
                        sink.borrow_mut().insert(key, result);
                    }
                    Err(err) => tracing::error!(key = %key, %err, "spring failed"),
                }
            })
            .context("Failed to spawn animation future")?;
        tracing::debug!(key = %spec.key, "spring started");
    }
    pool.run_until_stalled();

    let mut trace = Trace {
        frames: Vec::new(),
        results: IndexMap::new(),
        truncated: false,
    };
    let frame_ms = scenario.frame_ms();
    while frames.is_requested() {
        if trace.frames.len() >= scenario.max_frames {
            tracing::warn!(max_frames = scenario.max_frames, "stopping before everything came to rest");
            trace.truncated = true;
            break;
        }
        clock.advance(frame_ms);
        scheduler.tick().context("Frame failed")?;
        pool.run_until_stalled();

        trace.frames.push(Frame {
            index: trace.frames.len(),
            time_ms: clock.position(),
            values: springs
                .iter()
                .map(|(key, spring)| (key.clone(), spring.get()))
                .collect(),
        });
    }
    tracing::info!(frames = trace.frames.len(), "scenario finished");

    trace.results = std::mem::take(&mut *results.borrow_mut());
    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spring_trace() {
        let scenario = Scenario::parse(
            r#"
            [[spring]]
            key = "x"
            from = 0.0
            to = 1.0
            "#,
        )
        .unwrap();
        let trace = run(&scenario).unwrap();
        assert_eq!(trace.frames.len(), 42);
        assert!(!trace.truncated);
        assert_eq!(trace.frames[0].values["x"], Value::from(0.022634843307857987));
        assert_eq!(trace.frames[41].values["x"], Value::from(1.0));
        assert!(trace.results["x"].finished);
    }

    #[test]
    fn test_follower_settles_with_leader() {
        let scenario = Scenario::parse(
            r#"
            [[spring]]
            key = "shadow"
            from = 0.0
            follow = "x"

            [[spring]]
            key = "x"
            from = 0.0
            to = 10.0
            preset = "stiff"
            "#,
        )
        .unwrap();
        let trace = run(&scenario).unwrap();
        let last = trace.frames.last().unwrap();
        assert_eq!(last.values["shadow"], Value::from(10.0));
        assert!(trace.results["shadow"].finished);
    }

    #[test]
    fn test_max_frames_truncates() {
        let scenario = Scenario::parse(
            r#"
            max_frames = 5

            [[spring]]
            key = "x"
            from = 0.0
            to = 1.0
            "#,
        )
        .unwrap();
        let trace = run(&scenario).unwrap();
        assert_eq!(trace.frames.len(), 5);
        assert!(trace.truncated);
        assert!(trace.results.is_empty());
    }

    #[test]
    fn test_delay_waits() {
        let scenario = Scenario::parse(
            r#"
            [[spring]]
            key = "x"
            from = 0.0
            to = 1.0
            delay = 50.0
            config = { duration = 100.0 }
            "#,
        )
        .unwrap();
        let trace = run(&scenario).unwrap();
        assert_eq!(trace.frames[1].values["x"], Value::from(0.0));
        assert_eq!(trace.frames.last().unwrap().values["x"], Value::from(1.0));
    }
}
