//! Shared harness: a scheduler on a manual clock plus a local executor for
//! the futures animations return

#![allow(dead_code)]

use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use ressort_animation::{
    AnimationContext, AnimationFuture, AnimationResult, AnimationScheduler, ManualClock,
    ManualFrames, Result, SchedulerHandle,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Where a spawned animation future leaves its outcome
pub type Outcome<T> = Rc<RefCell<Option<Result<AnimationResult<T>>>>>;

pub struct Harness {
    pub scheduler: AnimationScheduler,
    pub clock: ManualClock,
    pub frames: ManualFrames,
    pool: LocalPool,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_context(|clock, frames| AnimationContext::manual(clock, frames))
    }

    pub fn with_context(build: impl FnOnce(&ManualClock, &ManualFrames) -> AnimationContext) -> Self {
        let clock = ManualClock::new(0.0);
        let frames = ManualFrames::new();
        let scheduler = AnimationScheduler::new(build(&clock, &frames));
        Self {
            scheduler,
            clock,
            frames,
            pool: LocalPool::new(),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.scheduler.handle()
    }

    /// Drive `future` on the local executor and expose its outcome
    pub fn spawn<T: 'static>(&mut self, future: AnimationFuture<T>) -> Outcome<T> {
        let outcome: Outcome<T> = Rc::new(RefCell::new(None));
        let slot = outcome.clone();
        self.pool
            .spawner()
            .spawn_local(async move {
                *slot.borrow_mut() = Some(future.await);
            })
            .unwrap();
        self.pool.run_until_stalled();
        outcome
    }

    /// Let spawned futures react to whatever just happened
    pub fn settle(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Advance the clock by one 60fps frame and tick once
    pub fn step(&mut self) {
        self.clock.step_frame();
        self.scheduler.tick().unwrap();
        self.pool.run_until_stalled();
    }

    pub fn steps(&mut self, frames: usize) {
        for _ in 0..frames {
            self.step();
        }
    }

    /// Step until no frame is requested. Returns the number of frames.
    pub fn run(&mut self) -> usize {
        let mut frames = 0;
        while self.frames.is_requested() {
            self.step();
            frames += 1;
            assert!(frames < 10_000, "animation never came to rest");
        }
        frames
    }
}

pub fn number(value: &ressort_animation::Value) -> f64 {
    value.as_number().expect("numeric value")
}

pub fn take<T: Clone>(outcome: &Outcome<T>) -> AnimationResult<T> {
    outcome
        .borrow()
        .clone()
        .expect("animation future has not settled")
        .expect("animation failed")
}
