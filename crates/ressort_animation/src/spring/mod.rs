//! Spring values
//!
//! A [`SpringValue`] animates one number, vector or text value toward a goal
//! using a spring, a duration curve, or exponential decay. It is a cheap
//! handle: the state lives in the scheduler's arena.
//!
//! ```text
//! Created/Idle --start--> Active --pause--> Paused
//!                           ^                 |
//!                           +-----resume------+
//! Active --finish/stop--> Idle
//! any --dispose--> Disposed
//! ```

mod advance;
mod merge;
mod props;

pub use props::{
    Goal, Loop, SpringCallbacks, SpringChangeFn, SpringEventFn, SpringProps, SpringTo,
};

pub(crate) use props::SpringDefaults;

use futures::channel::oneshot;
use std::cell::RefCell;
use std::rc::Rc;

use crate::animated::{Animated, Payload};
use crate::config::AnimationConfig;
use crate::error::{AnimationError, Result};
use crate::graph::{NodeBase, NodeId};
use crate::interpolation::AnimatableNode;
use crate::result::{combine_results, AnimationFuture, AnimationResult};
use crate::runner::{
    flush_pause_queue, flush_resume_queue, resolution_future, schedule_props, AsyncState,
    AsyncTarget, Resolution, Resolver, ScheduleActions, ScheduleRequest,
};
use crate::scheduler::{Node, NodeKind, Runtime, SchedulerHandle};
use crate::value::{Components, Value};

/// Lifecycle of a spring
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Never animated
    Created,
    Idle,
    Active,
    Paused,
    /// Terminal
    Disposed,
}

/// The live animation of a spring
pub(crate) struct Animation {
    pub to: Option<Goal>,
    pub from: Option<Goal>,
    /// Goal components, `None` while following another node
    pub to_values: Option<Components>,
    pub from_values: Components,
    pub config: AnimationConfig,
    pub immediate: bool,
    /// Started emitting changes since the last rest
    pub changed: bool,
    pub callbacks: SpringCallbacks,
}

impl Default for Animation {
    fn default() -> Self {
        Self {
            to: None,
            from: None,
            to_values: None,
            from_values: Components::new(),
            config: AnimationConfig::default(),
            immediate: false,
            changed: false,
            callbacks: SpringCallbacks::default(),
        }
    }
}

/// Settles one update of a spring, repeating it first if it loops
pub(crate) struct SpringResolver {
    pub tx: Resolver<Value>,
    pub looping: Option<Box<SpringProps>>,
    pub is_loop: bool,
    pub parent_id: Option<u64>,
}

impl SpringResolver {
    pub fn send(self, result: Result<AnimationResult>) {
        let _ = self.tx.send(Resolution::Done(result));
    }
}

pub(crate) struct SpringState {
    pub key: Option<String>,
    pub payload: Option<Payload>,
    pub anim: Animation,
    pub animating: bool,
    pub paused: bool,
    pub has_animated: bool,
    pub defaults: SpringDefaults,
    pub pending: Vec<SpringResolver>,
    pub queue: Vec<SpringProps>,
    pub last_call_id: u64,
    pub last_to_id: u64,
    pub memoized_duration: Option<f64>,
    pub async_state: Rc<RefCell<AsyncState<Value>>>,
}

impl SpringState {
    fn new(key: Option<String>, value: Option<Value>) -> Self {
        let goal = value.clone().map(Goal::Value);
        Self {
            key,
            payload: value.as_ref().map(Payload::for_value),
            anim: Animation {
                to: goal.clone(),
                from: goal,
                ..Animation::default()
            },
            animating: false,
            paused: false,
            has_animated: false,
            defaults: SpringDefaults::default(),
            pending: Vec::new(),
            queue: Vec::new(),
            last_call_id: 0,
            last_to_id: 0,
            memoized_duration: None,
            async_state: AsyncState::new_shared(),
        }
    }

    pub fn value(&self) -> Value {
        self.payload.as_ref().map(|p| p.value()).unwrap_or_default()
    }

    fn phase(&self) -> Phase {
        if self.paused {
            Phase::Paused
        } else if self.animating {
            Phase::Active
        } else if self.has_animated {
            Phase::Idle
        } else {
            Phase::Created
        }
    }
}

impl Runtime {
    pub(crate) fn spring(&self, id: NodeId) -> Option<&SpringState> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Spring(spring) => Some(spring),
            _ => None,
        }
    }

    pub(crate) fn spring_mut(&mut self, id: NodeId) -> Option<&mut SpringState> {
        match &mut self.nodes.get_mut(id)?.kind {
            NodeKind::Spring(spring) => Some(spring),
            _ => None,
        }
    }

    pub(crate) fn insert_spring(&mut self, key: Option<String>, value: Option<Value>) -> NodeId {
        self.nodes.insert(Node {
            base: NodeBase::default(),
            kind: NodeKind::Spring(Box::new(SpringState::new(key, value))),
        })
    }

    pub(crate) fn spring_handle(&self, id: NodeId) -> SpringValue {
        SpringValue {
            sched: self.handle(),
            id,
        }
    }
}

/// An animated value
#[derive(Clone, Debug)]
pub struct SpringValue {
    sched: SchedulerHandle,
    id: NodeId,
}

impl PartialEq for SpringValue {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl SpringValue {
    /// A spring resting at `value`
    pub fn new(sched: &SchedulerHandle, value: impl Into<Value>) -> Result<Self> {
        Self::create(sched, None, Some(value.into()))
    }

    /// A spring with no value yet; the first update provides one
    pub fn empty(sched: &SchedulerHandle) -> Result<Self> {
        Self::create(sched, None, None)
    }

    /// A named spring resting at `value`
    pub fn keyed(sched: &SchedulerHandle, key: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        Self::create(sched, Some(key.into()), Some(value.into()))
    }

    pub(crate) fn create(sched: &SchedulerHandle, key: Option<String>, value: Option<Value>) -> Result<Self> {
        let id = sched.with(|rt| rt.insert_spring(key, value))?;
        Ok(Self {
            sched: sched.clone(),
            id,
        })
    }

    fn read<R>(&self, f: impl FnOnce(&SpringState) -> R) -> Result<R> {
        let id = self.id;
        self.sched
            .read(|rt| rt.spring(id).map(f))?
            .ok_or(AnimationError::Disposed)
    }

    pub fn key(&self) -> Option<String> {
        self.read(|s| s.key.clone()).ok().flatten()
    }

    pub fn phase(&self) -> Phase {
        self.read(SpringState::phase).unwrap_or(Phase::Disposed)
    }

    pub fn is_animating(&self) -> bool {
        self.read(|s| s.animating).unwrap_or(false)
    }

    pub fn is_paused(&self) -> bool {
        self.read(|s| s.paused).unwrap_or(false)
    }

    /// An update is waiting out its delay
    pub fn is_delayed(&self) -> bool {
        self.read(|s| s.async_state.borrow().delayed).unwrap_or(false)
    }

    /// The goal, resolved to a value
    pub fn goal(&self) -> Option<Value> {
        let id = self.id;
        self.sched
            .read(|rt| {
                let goal = rt.spring(id)?.anim.to.clone()?;
                rt.goal_value(&goal)
            })
            .ok()
            .flatten()
    }

    /// Velocity per component, in units per millisecond
    pub fn velocity(&self) -> Components {
        self.read(|s| {
            s.payload
                .as_ref()
                .map(|p| {
                    p.scalars()
                        .iter()
                        .map(|c| c.last_velocity.unwrap_or(0.0))
                        .collect()
                })
                .unwrap_or_default()
        })
        .unwrap_or_default()
    }

    /// The live config
    pub fn config(&self) -> Option<AnimationConfig> {
        self.read(|s| s.anim.config.clone()).ok()
    }

    /// Stop animating and jump to `value`, notifying observers
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.set_with(value, true)
    }

    /// Stop animating and jump to `value`
    pub fn set_with(&self, value: impl Into<Value>, notify: bool) -> Result<()> {
        let value = value.into();
        let id = self.id;
        self.sched.with(|rt| {
            rt.spring(id).ok_or(AnimationError::Disposed)?;
            rt.stop_spring(id, None, false);
            rt.focus(id, Some(Goal::Value(value.clone())));
            rt.set_spring_value(id, &value, true, notify);
            Ok(())
        })?
    }

    /// Queue an update for the next [`start_queued`](Self::start_queued)
    pub fn update(&self, props: impl Into<SpringProps>) -> Result<&Self> {
        let props = props.into();
        let id = self.id;
        self.sched.with(|rt| {
            rt.spring_mut(id)
                .map(|s| s.queue.push(props))
                .ok_or(AnimationError::Disposed)
        })??;
        Ok(self)
    }

    /// Apply an update. The future settles when the resulting animation
    /// comes to rest, is interrupted, or turns out to be a no-op.
    pub fn start(&self, props: impl Into<SpringProps>) -> Result<AnimationFuture> {
        self.start_inner(props.into(), None)
    }

    /// Apply every queued update at once
    pub fn start_queued(&self) -> Result<AnimationFuture> {
        let id = self.id;
        let queue = self.sched.with(|rt| {
            rt.spring_mut(id)
                .map(|s| std::mem::take(&mut s.queue))
                .ok_or(AnimationError::Disposed)
        })??;
        let futures = queue
            .into_iter()
            .map(|props| self.start_inner(props, None))
            .collect::<Result<Vec<_>>>()?;
        let spring = self.clone();
        Ok(Box::pin(async move {
            let results = futures::future::join_all(futures)
                .await
                .into_iter()
                .collect::<Result<Vec<_>>>()?;
            Ok(combine_results(spring.get(), &results))
        }))
    }

    fn start_inner(&self, props: SpringProps, parent_id: Option<u64>) -> Result<AnimationFuture> {
        self.check_goal_kind(&props)?;
        let (tx, rx) = oneshot::channel();
        self.run_update(props, false, parent_id, tx)?;
        Ok(resolution_future(rx))
    }

    /// A goal needing another representation is rejected up front
    fn check_goal_kind(&self, props: &SpringProps) -> Result<()> {
        let id = self.id;
        let goal = match props.goal_ref() {
            Some(goal) => goal.clone(),
            None => return Ok(()),
        };
        let immediate = props.immediate == Some(true);
        self.sched.read(|rt| {
            let spring = rt.spring(id).ok_or(AnimationError::Disposed)?;
            let immediate = immediate || spring.defaults.immediate == Some(true);
            let (Some(payload), Some(goal)) = (&spring.payload, rt.goal_value(&goal)) else {
                return Ok(());
            };
            if !spring.has_animated || immediate || payload.kind() == goal.kind() {
                return Ok(());
            }
            Err(AnimationError::TypeMismatch {
                from: payload.kind(),
                to: goal.kind(),
            })
        })?
    }

    pub(crate) fn run_update(
        &self,
        props: SpringProps,
        is_loop: bool,
        parent_id: Option<u64>,
        tx: Resolver<Value>,
    ) -> Result<()> {
        let id = self.id;
        let (state, range, request) = self.sched.with(|rt| {
            if props.default {
                rt.spring_mut(id)
                    .ok_or(AnimationError::Disposed)?
                    .defaults
                    .absorb(&props);
            }
            let range = rt.prepare_spring(id, &props);
            let spring = rt.spring_mut(id).ok_or(AnimationError::Disposed)?;
            spring.last_call_id += 1;
            let request = ScheduleRequest {
                call_id: spring.last_call_id,
                delay: props.delay.unwrap_or(0.0),
                pause: props.pause,
                default_pause: spring.defaults.pause == Some(true),
                cancel: props.cancel.or(spring.defaults.cancel).unwrap_or(false),
            };
            Ok::<_, AnimationError>((spring.async_state.clone(), range, request))
        })??;

        let resolver = SpringResolver {
            tx,
            looping: props.looping.map(|_| Box::new(props.clone())),
            is_loop,
            parent_id,
        };
        let call_id = request.call_id;
        let merge = self.clone();
        let actions = ScheduleActions {
            pause: Box::new(self.pause_action()),
            resume: Box::new(self.resume_action()),
            start: Box::new(move |cancel| {
                let id = merge.id;
                merge
                    .sched
                    .with(|rt| rt.merge_spring(id, range, &props, call_id, cancel, resolver))?
            }),
        };
        schedule_props(&self.sched, &state, request, actions)
    }

    fn pause_action(&self) -> impl Fn() + 'static {
        let spring = self.clone();
        move || {
            let id = spring.id;
            if let Ok(Some(state)) = spring.sched.with(|rt| rt.pause_spring(id)) {
                flush_pause_queue(&state);
            }
        }
    }

    fn resume_action(&self) -> impl Fn() + 'static {
        let spring = self.clone();
        move || {
            let id = spring.id;
            if let Ok(Some(state)) = spring.sched.with(|rt| rt.resume_spring(id)) {
                flush_resume_queue(&state);
            }
        }
    }

    /// Freeze at the current value; the pending future reports unfinished
    pub fn stop(&self) -> Result<()> {
        self.halt_with(false)
    }

    /// Freeze at the current value; the pending future reports cancelled
    pub fn cancel(&self) -> Result<()> {
        self.halt_with(true)
    }

    fn halt_with(&self, cancel: bool) -> Result<()> {
        let id = self.id;
        self.sched.with(|rt| rt.halt_spring(id, cancel))?
    }

    /// Hold the animation; time spent paused does not count
    pub fn pause(&self) -> Result<()> {
        self.start(SpringProps::new().pause(true)).map(drop)
    }

    pub fn resume(&self) -> Result<()> {
        self.start(SpringProps::new().pause(false)).map(drop)
    }

    /// Jump to the goal and come to rest as finished
    pub fn finish(&self) -> Result<()> {
        let id = self.id;
        self.sched.with(|rt| rt.finish_spring(id, None))?
    }

    /// Jump to `to` and come to rest as finished
    pub fn finish_at(&self, to: impl Into<Goal>) -> Result<()> {
        let id = self.id;
        let to = to.into();
        self.sched.with(|rt| rt.finish_spring(id, Some(to)))?
    }

    /// Restart from `from` toward the current goal
    pub fn reset(&self) -> Result<AnimationFuture> {
        self.start(SpringProps::new().reset(true))
    }

    /// Swap `from` and `to` and animate back
    pub fn reverse(&self) -> Result<AnimationFuture> {
        self.start(SpringProps::new().reverse(true))
    }

    /// Stop, detach from the graph and free the node. Terminal.
    pub fn dispose(&self) -> Result<()> {
        let id = self.id;
        self.sched.with(|rt| rt.dispose_spring(id))?
    }
}

impl AnimatableNode for SpringValue {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn scheduler(&self) -> &SchedulerHandle {
        &self.sched
    }
}

impl AsyncTarget for SpringValue {
    type Props = SpringProps;
    type Output = Value;

    fn start_nested(&self, props: SpringProps, parent_id: u64) -> Result<AnimationFuture> {
        self.start_inner(props, Some(parent_id))
    }

    fn inherit(props: &mut SpringProps, launcher: &SpringProps) {
        if props.config.is_none() {
            props.config = launcher.config.clone();
        }
        let mut inherited = launcher.callbacks.clone();
        inherited.on_rest = None;
        props.callbacks.or(&inherited);
    }

    fn snapshot(&self) -> Value {
        self.get()
    }

    fn halt(&self) -> Result<()> {
        self.stop()
    }
}
