//! Host collaborators
//!
//! The animation graph never reaches for process-wide state. The clock, the
//! frame requester, the batching wrapper and the string interpolator are
//! injected once through an [`AnimationContext`] when the scheduler is
//! created.

use serde::Deserialize;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use crate::interpolate::StringRange;

/// Monotonic time source in milliseconds
pub trait Clock {
    fn now(&self) -> f64;
}

/// Requests and cancels the host's periodic frame callback.
///
/// The host answers a request by calling
/// [`AnimationScheduler::tick`](crate::AnimationScheduler::tick) on its next
/// frame.
pub trait FrameRequester {
    fn request_frame(&self);
    fn cancel_frame(&self);
}

/// Wraps a batch of mutations so the host can commit them once
pub type BatchFn = Rc<dyn Fn(&mut dyn FnMut())>;

/// Maps progress to a text value
pub type TextInterpolator = Rc<dyn Fn(f64) -> String>;

/// Builds a text interpolator from endpoint strings (colors, CSS-like shapes)
pub type StringInterpolatorFn = Rc<dyn Fn(&StringRange) -> TextInterpolator>;

/// Tunables of the frame loop
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SchedulerSettings {
    /// Upper bound of a frame's delta, so a stalled clock doesn't cause jumps
    pub max_frame_delta_ms: f64,
    /// Delta used for the first frame after the loop (re)starts
    pub first_frame_delta_ms: f64,
    /// Jump every animation straight to its goal
    pub skip_animation: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_frame_delta_ms: 64.0,
            first_frame_delta_ms: 1000.0 / 60.0,
            skip_animation: false,
        }
    }
}

/// Everything the scheduler consumes from its host
#[derive(Clone)]
pub struct AnimationContext {
    pub(crate) clock: Rc<dyn Clock>,
    pub(crate) frames: Rc<dyn FrameRequester>,
    pub(crate) batch: BatchFn,
    pub(crate) string_interpolator: Option<StringInterpolatorFn>,
    pub(crate) settings: SchedulerSettings,
}

impl fmt::Debug for AnimationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationContext")
            .field("settings", &self.settings)
            .field(
                "string_interpolator",
                &self.string_interpolator.is_some(),
            )
            .finish_non_exhaustive()
    }
}

impl AnimationContext {
    pub fn builder() -> AnimationContextBuilder {
        AnimationContextBuilder::default()
    }

    /// A context driven by the given manual clock and frame recorder
    pub fn manual(clock: &ManualClock, frames: &ManualFrames) -> Self {
        Self::builder()
            .clock(clock.clone())
            .frames(frames.clone())
            .build()
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn string_interpolator(&self) -> Option<&StringInterpolatorFn> {
        self.string_interpolator.as_ref()
    }

    pub(crate) fn batched(&self, f: &mut dyn FnMut()) {
        (self.batch)(f)
    }
}

impl Default for AnimationContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Default)]
pub struct AnimationContextBuilder {
    clock: Option<Rc<dyn Clock>>,
    frames: Option<Rc<dyn FrameRequester>>,
    batch: Option<BatchFn>,
    string_interpolator: Option<StringInterpolatorFn>,
    settings: SchedulerSettings,
}

impl AnimationContextBuilder {
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Rc::new(clock));
        self
    }

    pub fn frames(mut self, frames: impl FrameRequester + 'static) -> Self {
        self.frames = Some(Rc::new(frames));
        self
    }

    pub fn batch<F>(mut self, batch: F) -> Self
    where
        F: Fn(&mut dyn FnMut()) + 'static,
    {
        self.batch = Some(Rc::new(batch));
        self
    }

    pub fn string_interpolator<F>(mut self, factory: F) -> Self
    where
        F: Fn(&StringRange) -> TextInterpolator + 'static,
    {
        self.string_interpolator = Some(Rc::new(factory));
        self
    }

    pub fn settings(mut self, settings: SchedulerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn skip_animation(mut self, skip: bool) -> Self {
        self.settings.skip_animation = skip;
        self
    }

    pub fn build(self) -> AnimationContext {
        AnimationContext {
            clock: self.clock.unwrap_or_else(|| Rc::new(SystemClock::new())),
            frames: self
                .frames
                .unwrap_or_else(|| Rc::new(ManualFrames::default())),
            batch: self.batch.unwrap_or_else(|| Rc::new(|f: &mut dyn FnMut()| f())),
            string_interpolator: self.string_interpolator,
            settings: self.settings,
        }
    }
}

/// Wall-clock time since creation
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A controllable clock for deterministic stepping.
///
/// Clones share the same position.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    position: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            position: Rc::new(Cell::new(start_ms)),
        }
    }

    /// Current position in milliseconds
    pub fn position(&self) -> f64 {
        self.position.get()
    }

    /// Advance by a relative amount; negative deltas are ignored
    pub fn advance(&self, delta_ms: f64) {
        self.position.set(self.position.get() + delta_ms.max(0.0));
    }

    /// Seek to an absolute position; the clock never runs backwards
    pub fn seek(&self, position_ms: f64) {
        self.position.set(position_ms.max(self.position.get()));
    }

    /// Step forward by one frame (at 60fps)
    pub fn step_frame(&self) {
        self.advance(1000.0 / 60.0);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.position.get()
    }
}

/// Records frame requests instead of scheduling anything.
///
/// Clones share state, so a test can keep one and hand the other to the
/// context.
#[derive(Debug, Clone, Default)]
pub struct ManualFrames {
    requested: Rc<Cell<bool>>,
    requests: Rc<Cell<u64>>,
}

impl ManualFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the scheduler currently wants a frame
    pub fn is_requested(&self) -> bool {
        self.requested.get()
    }

    /// Total number of requests made
    pub fn request_count(&self) -> u64 {
        self.requests.get()
    }
}

impl FrameRequester for ManualFrames {
    fn request_frame(&self) {
        self.requested.set(true);
        self.requests.set(self.requests.get() + 1);
    }

    fn cancel_frame(&self) {
        self.requested.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared_and_monotonic() {
        let clock = ManualClock::new(10.0);
        let other = clock.clone();

        clock.advance(5.0);
        assert_eq!(other.now(), 15.0);

        clock.advance(-3.0);
        assert_eq!(clock.now(), 15.0);

        clock.seek(12.0);
        assert_eq!(clock.now(), 15.0);

        clock.seek(40.0);
        assert_eq!(other.position(), 40.0);
    }

    #[test]
    fn test_manual_frames_records_requests() {
        let frames = ManualFrames::new();
        assert!(!frames.is_requested());

        frames.request_frame();
        frames.request_frame();
        assert!(frames.is_requested());
        assert_eq!(frames.request_count(), 2);

        frames.cancel_frame();
        assert!(!frames.is_requested());
    }

    #[test]
    fn test_default_settings() {
        let settings = SchedulerSettings::default();
        assert_eq!(settings.max_frame_delta_ms, 64.0);
        assert!((settings.first_frame_delta_ms - 16.666_666).abs() < 1e-3);
        assert!(!settings.skip_animation);
    }

    #[test]
    fn test_batch_wrapper_runs_closure() {
        let calls = Rc::new(Cell::new(0));
        let ctx = AnimationContext::builder()
            .batch(|f: &mut dyn FnMut()| f())
            .build();

        let counter = calls.clone();
        ctx.batched(&mut || counter.set(counter.get() + 1));
        assert_eq!(calls.get(), 1);
    }
}
