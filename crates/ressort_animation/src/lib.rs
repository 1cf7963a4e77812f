//! Ressort Animation Graph
//!
//! Physics-driven values wired into a dependency graph and advanced by one
//! frame loop.
//!
//! # Features
//!
//! - **Spring Values**: springs, fixed-duration easings and decay, retargetable
//!   mid-flight and able to follow other nodes
//! - **Interpolations**: memoized derived nodes, mapped through functions or
//!   range configs
//! - **Controllers**: named sets of springs with delays, batched events and
//!   parent/child trailing
//! - **Async Scripts**: multi-step animations that stop, cancel and pause
//!   cleanly
//!
//! Everything is single-threaded. An [`AnimationScheduler`] owns the graph;
//! handles such as [`SpringValue`] and [`Controller`] are cheap clones that
//! address it by id. Time comes from an injected [`Clock`] and frames are
//! driven by calling [`AnimationScheduler::tick`].
//!
//! ```ignore
//! let clock = ManualClock::new(0.0);
//! let frames = ManualFrames::new();
//! let scheduler = AnimationScheduler::new(AnimationContext::manual(&clock, &frames));
//!
//! let x = SpringValue::new(&scheduler.handle(), 0.0)?;
//! let done = x.start(SpringProps::to(1.0))?;
//! while frames.is_requested() {
//!     clock.step_frame();
//!     scheduler.tick()?;
//! }
//! ```

mod animated;
pub mod config;
pub mod context;
pub mod controller;
pub mod easing;
pub mod error;
pub mod graph;
pub mod interpolate;
pub mod interpolation;
pub mod result;
pub mod runner;
pub mod scheduler;
pub mod spring;
pub mod value;

pub use config::{AnimationConfig, AnimationFamily, ConfigUpdate, Decay, Velocity};
pub use context::{
    AnimationContext, AnimationContextBuilder, Clock, FrameRequester, ManualClock, ManualFrames,
    SchedulerSettings, SystemClock,
};
pub use controller::{
    ConfigProp, Controller, ControllerCallbacks, ControllerProps, ControllerTo, Delay, GoalMap,
    KeyMatch,
};
pub use easing::{Easing, StepPosition};
pub use error::{AnimationError, Result};
pub use graph::NodeId;
pub use interpolate::{Extrapolate, RangeConfig, RangeOutput, StringRange};
pub use interpolation::{AnimatableNode, Interpolation, Subscription};
pub use result::{AnimationFuture, AnimationResult};
pub use runner::{Interrupt, Script, ScriptContext};
pub use scheduler::{AnimationScheduler, SchedulerHandle};
pub use spring::{Goal, Loop, Phase, SpringCallbacks, SpringProps, SpringTo, SpringValue};
pub use value::{Value, ValueKind, ValueMap};
