//! Animation scheduler
//!
//! Owns the node arena and the frame loop. Each host frame calls
//! [`AnimationScheduler::tick`], which:
//!
//! 1. fires frame-driven timeouts that are due
//! 2. advances every active node once, in ascending priority
//! 3. flushes per-frame listeners and queued callbacks in one batch
//! 4. requests the next frame, or stops when nothing is left to do
//!
//! User callbacks never run while the arena is borrowed. They are queued as
//! effects and drained once the mutation that produced them completes, so a
//! callback may freely start, stop or read other animations.

use slotmap::{new_key_type, SlotMap};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::context::AnimationContext;
use crate::controller::ControllerState;
use crate::error::{AnimationError, Result};
use crate::graph::{ControllerId, ListenerId, NodeBase, NodeEvent, NodeId, Observer};
use crate::interpolation::InterpolationState;
use crate::spring::SpringState;
use crate::value::Value;

new_key_type! {
    /// Identifier of a frame-driven timeout
    pub struct TimeoutId;
}

/// A deferred callback, run outside the arena borrow
pub(crate) type Effect = Box<dyn FnOnce()>;

pub(crate) struct Node {
    pub base: NodeBase,
    pub kind: NodeKind,
}

pub(crate) enum NodeKind {
    Spring(Box<SpringState>),
    Interpolation(Box<InterpolationState>),
}

pub(crate) struct Listener {
    pub node: NodeId,
    pub callback: Rc<dyn Fn(&Value)>,
}

struct Timeout {
    time: f64,
    seq: u64,
    handler: Effect,
}

/// Per-frame bookkeeping
#[derive(Default)]
pub(crate) struct FrameLoop {
    /// Nodes advanced this frame, sorted by priority
    current: Vec<NodeId>,
    /// Nodes started mid-pass at a lower priority than the one being advanced
    start_queue: Vec<NodeId>,
    /// Priority of the node being advanced, 0 outside a pass
    priority: i32,
    in_pass: bool,
    ticking: bool,
    /// A host frame is requested or in progress
    running: bool,
    wants_frame: bool,
    last_time: Option<f64>,
    timeouts: SlotMap<TimeoutId, Timeout>,
    timeout_seq: u64,
    on_frame: Vec<Effect>,
    frames: u64,
}

/// The arena and frame state behind a scheduler
pub(crate) struct Runtime {
    pub ctx: AnimationContext,
    pub nodes: SlotMap<NodeId, Node>,
    pub controllers: SlotMap<ControllerId, ControllerState>,
    pub listeners: SlotMap<ListenerId, Listener>,
    pub frame: FrameLoop,
    pub effects: Vec<Effect>,
    pub controller_flush: Vec<ControllerId>,
    stamp: u64,
    handle: SchedulerHandle,
}

impl Runtime {
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Issue a new logical timestamp
    pub fn next_stamp(&mut self) -> u64 {
        self.stamp += 1;
        self.stamp
    }

    /// The most recently issued timestamp
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn defer(&mut self, effect: impl FnOnce() + 'static) {
        self.effects.push(Box::new(effect));
    }

    pub fn skip_animation(&self) -> bool {
        self.ctx.settings.skip_animation
    }

    pub fn priority(&self, id: NodeId) -> i32 {
        self.nodes.get(id).map_or(0, |n| n.base.priority)
    }

    /// Whether a node has nothing to do in the frame loop
    pub fn is_node_idle(&self, id: NodeId) -> bool {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Spring(spring)) => !spring.animating || spring.paused,
            Some(NodeKind::Interpolation(interp)) => interp.idle,
            None => true,
        }
    }

    /// Whether a node counts as settled for its observers
    pub fn is_node_settled(&self, id: NodeId) -> bool {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Spring(spring)) => !spring.animating,
            Some(NodeKind::Interpolation(interp)) => interp.idle,
            None => true,
        }
    }

    pub fn add_child(&mut self, parent: NodeId, observer: Observer) {
        let first = match self.nodes.get_mut(parent) {
            Some(node) => node.base.add_child(observer),
            None => return,
        };
        if first {
            self.node_attached(parent);
        }
    }

    pub fn remove_child(&mut self, parent: NodeId, observer: Observer) {
        let last = match self.nodes.get_mut(parent) {
            Some(node) => node.base.remove_child(observer),
            None => return,
        };
        if last {
            self.node_detached(parent);
        }
    }

    fn node_attached(&mut self, id: NodeId) {
        if let Some(NodeKind::Interpolation(_)) = self.nodes.get(id).map(|n| &n.kind) {
            self.attach_interpolation(id);
        }
    }

    fn node_detached(&mut self, id: NodeId) {
        if let Some(NodeKind::Interpolation(_)) = self.nodes.get(id).map(|n| &n.kind) {
            self.detach_interpolation(id);
        }
    }

    pub fn set_priority(&mut self, id: NodeId, priority: i32) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.base.priority == priority {
            return;
        }
        node.base.priority = priority;
        if !self.is_node_idle(id) {
            self.frame_sort(id);
        }
        self.emit(id, NodeEvent::Priority(priority));
    }

    /// Notify every observer of `source`
    pub fn emit(&mut self, source: NodeId, event: NodeEvent) {
        let children = match self.nodes.get(source) {
            Some(node) => node.base.children.clone(),
            None => return,
        };
        for observer in children {
            match observer {
                Observer::Node(child) => self.node_observed(child, source, &event),
                Observer::Controller(cid) => self.controller_observed(cid, source, &event),
                Observer::Listener(lid) => {
                    if let NodeEvent::Change { value, .. } = &event {
                        if let Some(listener) = self.listeners.get(lid) {
                            let callback = listener.callback.clone();
                            let value = value.clone();
                            self.defer(move || callback(&value));
                        }
                    }
                }
            }
        }
    }

    fn node_observed(&mut self, id: NodeId, source: NodeId, event: &NodeEvent) {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Spring(_)) => self.spring_observed(id, source, event),
            Some(NodeKind::Interpolation(_)) => self.interpolation_observed(id, source, event),
            None => {}
        }
    }

    fn advance_node(&mut self, id: NodeId, dt: f64) {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Spring(_)) => {
                self.advance_spring(id, dt);
            }
            Some(NodeKind::Interpolation(_)) => self.advance_interpolation(id),
            None => {}
        }
    }

    /// Put a node into the frame loop
    pub fn start_node(&mut self, id: NodeId) {
        let priority = self.priority(id);
        if self.frame.in_pass && self.frame.priority > priority {
            if !self.frame.start_queue.contains(&id) {
                self.frame.start_queue.push(id);
            }
        } else if !self.frame.current.contains(&id) {
            self.insert_sorted(id);
        }
        self.wake();
    }

    fn insert_sorted(&mut self, id: NodeId) {
        let priority = self.priority(id);
        let index = self
            .frame
            .current
            .iter()
            .position(|other| self.priority(*other) > priority)
            .unwrap_or(self.frame.current.len());
        self.frame.current.insert(index, id);
    }

    fn frame_sort(&mut self, id: NodeId) {
        // The whole list is re-sorted once the pass ends
        if self.frame.in_pass {
            return;
        }
        if let Some(index) = self.frame.current.iter().position(|other| *other == id) {
            self.frame.current.remove(index);
            self.insert_sorted(id);
        }
    }

    /// Ask the host for a frame unless one is already coming
    fn wake(&mut self) {
        if !self.frame.running {
            self.frame.running = true;
            self.frame.wants_frame = true;
        }
    }

    pub fn set_timeout(&mut self, delay_ms: f64, handler: Effect) -> TimeoutId {
        let time = self.ctx.now() + delay_ms.max(0.0);
        self.frame.timeout_seq += 1;
        let seq = self.frame.timeout_seq;
        let id = self.frame.timeouts.insert(Timeout { time, seq, handler });
        self.wake();
        id
    }

    pub fn cancel_timeout(&mut self, id: TimeoutId) -> bool {
        self.frame.timeouts.remove(id).is_some()
    }

    /// Milliseconds until a timeout fires
    pub fn timeout_remaining(&self, id: TimeoutId) -> Option<f64> {
        let timeout = self.frame.timeouts.get(id)?;
        Some((timeout.time - self.ctx.now()).max(0.0))
    }

    fn take_due_timeouts(&mut self, now: f64) -> Vec<Effect> {
        let mut due: Vec<(f64, u64, TimeoutId)> = self
            .frame
            .timeouts
            .iter()
            .filter(|(_, t)| t.time <= now)
            .map(|(id, t)| (t.time, t.seq, id))
            .collect();
        due.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        due.into_iter()
            .filter_map(|(_, _, id)| self.frame.timeouts.remove(id))
            .map(|t| t.handler)
            .collect()
    }

    /// Advance every active node once
    fn advance_frame(&mut self, now: f64) {
        let settings = &self.ctx.settings;
        let dt = match self.frame.last_time {
            Some(last) => (now - last).clamp(0.0, settings.max_frame_delta_ms),
            None => settings.first_frame_delta_ms,
        };
        self.frame.last_time = Some(now);
        self.frame.frames += 1;

        for id in std::mem::take(&mut self.frame.start_queue) {
            if !self.frame.current.contains(&id) {
                self.insert_sorted(id);
            }
        }

        tracing::trace!(frame = self.frame.frames, dt, active = self.frame.current.len(), "advance");

        self.frame.in_pass = true;
        let mut index = 0;
        while index < self.frame.current.len() {
            let id = self.frame.current[index];
            self.frame.priority = self.priority(id);
            if !self.is_node_idle(id) {
                self.advance_node(id, dt);
            }
            index += 1;
        }
        self.frame.in_pass = false;
        self.frame.priority = 0;

        let current = std::mem::take(&mut self.frame.current);
        let mut next: Vec<NodeId> = current
            .into_iter()
            .filter(|id| !self.is_node_idle(*id))
            .collect();
        next.sort_by_key(|id| self.priority(*id));
        self.frame.current = next;

        let listeners = std::mem::take(&mut self.frame.on_frame);
        self.effects.extend(listeners);
    }

    fn has_pending_work(&self) -> bool {
        !self.frame.current.is_empty()
            || !self.frame.start_queue.is_empty()
            || !self.frame.timeouts.is_empty()
            || !self.frame.on_frame.is_empty()
    }

    /// Turn queued controller notifications into effects
    fn flush_controllers(&mut self) {
        for cid in std::mem::take(&mut self.controller_flush) {
            self.flush_controller_events(cid);
        }
    }

    pub fn remove_node(&mut self, id: NodeId) {
        self.frame.current.retain(|other| *other != id);
        self.frame.start_queue.retain(|other| *other != id);
        self.nodes.remove(id);
    }
}

/// A weak reference to a scheduler's runtime.
///
/// Every animation handle holds one, so handles never keep the scheduler
/// alive and never form reference cycles with it.
#[derive(Clone)]
pub struct SchedulerHandle {
    rt: Weak<RefCell<Runtime>>,
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl SchedulerHandle {
    pub fn is_alive(&self) -> bool {
        self.rt.strong_count() > 0
    }

    fn upgrade(&self) -> Result<Rc<RefCell<Runtime>>> {
        self.rt.upgrade().ok_or(AnimationError::SchedulerDropped)
    }

    /// Mutate the runtime, then drain any effects the mutation produced
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Runtime) -> R) -> Result<R> {
        let rt = self.upgrade()?;
        let out = {
            let mut guard = rt
                .try_borrow_mut()
                .map_err(|_| AnimationError::Reentrant("graph mutated during advance"))?;
            f(&mut guard)
        };
        commit(&rt);
        Ok(out)
    }

    /// Read the runtime without side effects
    pub(crate) fn read<R>(&self, f: impl FnOnce(&Runtime) -> R) -> Result<R> {
        let rt = self.upgrade()?;
        let guard = rt
            .try_borrow()
            .map_err(|_| AnimationError::Reentrant("graph read during advance"))?;
        Ok(f(&guard))
    }

    /// Current time of the scheduler's clock
    pub fn now(&self) -> Result<f64> {
        self.read(|rt| rt.ctx.now())
    }

    /// Run `handler` on the first frame at least `delay_ms` from now
    pub fn set_timeout(&self, delay_ms: f64, handler: impl FnOnce() + 'static) -> Result<TimeoutId> {
        self.with(|rt| rt.set_timeout(delay_ms, Box::new(handler)))
    }

    pub fn cancel_timeout(&self, id: TimeoutId) -> Result<bool> {
        self.with(|rt| rt.cancel_timeout(id))
    }

    pub(crate) fn context(&self) -> Result<AnimationContext> {
        self.read(|rt| rt.ctx.clone())
    }
}

/// Drain effects and forward frame requests to the host
fn commit(rt: &Rc<RefCell<Runtime>>) {
    loop {
        let (effects, ctx, request) = {
            let Ok(mut guard) = rt.try_borrow_mut() else {
                return;
            };
            guard.flush_controllers();
            let request = std::mem::take(&mut guard.frame.wants_frame);
            (
                std::mem::take(&mut guard.effects),
                guard.ctx.clone(),
                request,
            )
        };
        if request {
            ctx.frames.request_frame();
        }
        if effects.is_empty() {
            return;
        }
        run_batched(&ctx, effects);
    }
}

fn run_batched(ctx: &AnimationContext, mut effects: Vec<Effect>) {
    ctx.batched(&mut || {
        for effect in effects.drain(..) {
            effect();
        }
    });
}

/// Clears the ticking flag even if a callback panics
struct TickGuard<'a>(&'a Rc<RefCell<Runtime>>);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut rt) = self.0.try_borrow_mut() {
            rt.frame.ticking = false;
        }
    }
}

/// The frame loop driving every animation created from it
pub struct AnimationScheduler {
    rt: Rc<RefCell<Runtime>>,
}

impl AnimationScheduler {
    pub fn new(ctx: AnimationContext) -> Self {
        let rt = Rc::new_cyclic(|weak: &Weak<RefCell<Runtime>>| {
            RefCell::new(Runtime {
                ctx,
                nodes: SlotMap::with_key(),
                controllers: SlotMap::with_key(),
                listeners: SlotMap::with_key(),
                frame: FrameLoop::default(),
                effects: Vec::new(),
                controller_flush: Vec::new(),
                stamp: 0,
                handle: SchedulerHandle { rt: weak.clone() },
            })
        });
        tracing::debug!("animation scheduler created");
        Self { rt }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            rt: Rc::downgrade(&self.rt),
        }
    }

    pub fn context(&self) -> AnimationContext {
        self.rt.borrow().ctx.clone()
    }

    /// Run one frame. Returns whether another frame was requested.
    pub fn tick(&self) -> Result<bool> {
        let (now, due, ctx) = {
            let mut rt = self
                .rt
                .try_borrow_mut()
                .map_err(|_| AnimationError::Reentrant("tick during advance"))?;
            if rt.frame.ticking {
                return Err(AnimationError::Reentrant("tick called from a frame callback"));
            }
            rt.frame.ticking = true;
            let now = rt.ctx.now();
            let due = rt.take_due_timeouts(now);
            (now, due, rt.ctx.clone())
        };
        let _guard = TickGuard(&self.rt);

        if !due.is_empty() {
            tracing::trace!(count = due.len(), "firing timeouts");
            run_batched(&ctx, due);
            commit(&self.rt);
        }

        self.rt.borrow_mut().advance_frame(now);
        commit(&self.rt);

        let keep_going = {
            let mut rt = self.rt.borrow_mut();
            rt.frame.wants_frame = false;
            let keep_going = rt.has_pending_work();
            rt.frame.running = keep_going;
            if !keep_going {
                rt.frame.last_time = None;
            }
            keep_going
        };

        if keep_going {
            ctx.frames.request_frame();
        } else {
            tracing::debug!("frame loop idle");
            ctx.frames.cancel_frame();
        }
        Ok(keep_going)
    }

    /// Run `f` once, after the next frame's advance pass
    pub fn on_frame(&self, f: impl FnOnce() + 'static) -> Result<()> {
        let mut rt = self
            .rt
            .try_borrow_mut()
            .map_err(|_| AnimationError::Reentrant("on_frame during advance"))?;
        rt.frame.on_frame.push(Box::new(f));
        rt.wake();
        let request = std::mem::take(&mut rt.frame.wants_frame);
        let ctx = rt.ctx.clone();
        drop(rt);
        if request {
            ctx.frames.request_frame();
        }
        Ok(())
    }

    pub fn set_timeout(&self, delay_ms: f64, handler: impl FnOnce() + 'static) -> Result<TimeoutId> {
        self.handle().set_timeout(delay_ms, handler)
    }

    pub fn cancel_timeout(&self, id: TimeoutId) -> Result<bool> {
        self.handle().cancel_timeout(id)
    }

    /// Drop every active node, timeout and pending listener without settling
    /// them
    pub fn clear(&self) -> Result<()> {
        let ctx = {
            let mut rt = self
                .rt
                .try_borrow_mut()
                .map_err(|_| AnimationError::Reentrant("clear during advance"))?;
            rt.frame.current.clear();
            rt.frame.start_queue.clear();
            rt.frame.timeouts.clear();
            rt.frame.on_frame.clear();
            rt.frame.running = false;
            rt.frame.wants_frame = false;
            rt.frame.last_time = None;
            rt.ctx.clone()
        };
        ctx.frames.cancel_frame();
        Ok(())
    }

    /// No node is animating and no timeout is pending
    pub fn is_idle(&self) -> bool {
        self.rt
            .try_borrow()
            .map(|rt| !rt.has_pending_work())
            .unwrap_or(false)
    }

    /// Number of nodes advanced each frame
    pub fn active_count(&self) -> usize {
        self.rt
            .try_borrow()
            .map(|rt| rt.frame.current.len() + rt.frame.start_queue.len())
            .unwrap_or(0)
    }

    /// Frames run so far
    pub fn frame_count(&self) -> u64 {
        self.rt.try_borrow().map(|rt| rt.frame.frames).unwrap_or(0)
    }
}

impl Default for AnimationScheduler {
    fn default() -> Self {
        Self::new(AnimationContext::default())
    }
}

impl std::fmt::Debug for AnimationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationScheduler")
            .field("active", &self.active_count())
            .field("frames", &self.frame_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ManualClock, ManualFrames};
    use std::cell::Cell;

    fn scheduler() -> (AnimationScheduler, ManualClock, ManualFrames) {
        let clock = ManualClock::new(0.0);
        let frames = ManualFrames::new();
        let scheduler = AnimationScheduler::new(AnimationContext::manual(&clock, &frames));
        (scheduler, clock, frames)
    }

    #[test]
    fn test_timeouts_fire_in_order() {
        let (scheduler, clock, frames) = scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        scheduler.set_timeout(30.0, move || l.borrow_mut().push("late")).unwrap();
        let l = log.clone();
        scheduler.set_timeout(10.0, move || l.borrow_mut().push("early")).unwrap();
        assert!(frames.is_requested());

        clock.advance(16.0);
        assert!(scheduler.tick().unwrap());
        assert_eq!(*log.borrow(), vec!["early"]);

        clock.advance(16.0);
        assert!(!scheduler.tick().unwrap());
        assert_eq!(*log.borrow(), vec!["early", "late"]);
        assert!(!frames.is_requested());
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_cancelled_timeout_never_fires() {
        let (scheduler, clock, _frames) = scheduler();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let id = scheduler.set_timeout(5.0, move || f.set(true)).unwrap();
        assert!(scheduler.cancel_timeout(id).unwrap());

        clock.advance(10.0);
        scheduler.tick().unwrap();
        assert!(!fired.get());
    }

    #[test]
    fn test_on_frame_runs_once() {
        let (scheduler, clock, _frames) = scheduler();
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        scheduler.on_frame(move || c.set(c.get() + 1)).unwrap();

        clock.step_frame();
        scheduler.tick().unwrap();
        clock.step_frame();
        scheduler.tick().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_handle_outlives_scheduler() {
        let (scheduler, _clock, _frames) = scheduler();
        let handle = scheduler.handle();
        assert!(handle.is_alive());
        drop(scheduler);
        assert!(!handle.is_alive());
        assert_eq!(handle.now(), Err(AnimationError::SchedulerDropped));
    }

    #[test]
    fn test_nested_tick_is_rejected() {
        let (scheduler, clock, _frames) = scheduler();
        let scheduler = Rc::new(scheduler);
        let result = Rc::new(RefCell::new(None));

        let inner = Rc::downgrade(&scheduler);
        let r = result.clone();
        scheduler
            .on_frame(move || {
                if let Some(s) = inner.upgrade() {
                    *r.borrow_mut() = Some(s.tick());
                }
            })
            .unwrap();

        clock.step_frame();
        scheduler.tick().unwrap();
        assert!(matches!(
            result.borrow().as_ref(),
            Some(Err(AnimationError::Reentrant(_)))
        ));
    }
}
