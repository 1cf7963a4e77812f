//! Applying updates to a spring
//!
//! An update is applied in two steps. [`Runtime::prepare_spring`] runs as
//! soon as the update is issued and settles the starting value of a spring
//! that has never animated. [`Runtime::merge_spring`] runs once the update's
//! delay and pause have been waited out and decides whether the spring
//! starts, keeps going, or resolves right away.

use std::rc::Rc;

use crate::animated::{Animated, Payload};
use crate::error::{AnimationError, Result};
use crate::graph::{NodeEvent, NodeId, Observer};
use crate::result::AnimationResult;
use crate::runner::{run_async, stop_async, AsyncRun, AsyncState, AsyncTo, Resolution};
use crate::scheduler::Runtime;
use crate::value::{Components, Value, ValueKind};

use super::{Goal, SpringProps, SpringResolver, SpringTo};

use std::cell::RefCell;

/// Endpoints an update asked for, captured when it was issued
#[derive(Clone, Debug, Default)]
pub(crate) struct Range {
    pub to: Option<Goal>,
    pub from: Option<Goal>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum SpringEvent {
    Start,
    Rest,
    Pause,
    Resume,
}

impl Runtime {
    /// Resolve a goal to a value
    pub(crate) fn goal_value(&self, goal: &Goal) -> Option<Value> {
        match goal {
            Goal::Value(value) => Some(value.clone()),
            Goal::Node(id) => self.current_value(*id),
        }
    }

    /// Point the spring at a new goal, following it if it is a node
    pub(crate) fn focus(&mut self, id: NodeId, to: Option<Goal>) {
        let Some(spring) = self.spring_mut(id) else {
            return;
        };
        if spring.anim.to == to {
            return;
        }
        let previous = std::mem::replace(&mut spring.anim.to, to.clone());
        if let Some(Goal::Node(source)) = previous {
            self.remove_child(source, Observer::Node(id));
        }
        let priority = match to {
            Some(Goal::Node(source)) => {
                self.add_child(source, Observer::Node(id));
                self.priority(source) + 1
            }
            _ => 0,
        };
        self.set_priority(id, priority);
    }

    /// Jump to `value`, replacing the payload when the representation
    /// changes. Returns whether the value changed.
    pub(crate) fn set_spring_value(&mut self, id: NodeId, value: &Value, idle: bool, notify: bool) -> bool {
        let Some(spring) = self.spring_mut(id) else {
            return false;
        };
        let changed = match &mut spring.payload {
            Some(payload) if payload.kind() == value.kind() => payload.set(value),
            Some(payload) => {
                *payload = Payload::for_value(value);
                true
            }
            None => {
                spring.payload = Some(Payload::for_value(value));
                return false;
            }
        };
        if changed && notify {
            self.spring_changed(id, value.clone(), idle);
        }
        changed
    }

    /// Notify callbacks and observers of a new value
    pub(crate) fn spring_changed(&mut self, id: NodeId, value: Value, idle: bool) {
        let handle = self.spring_handle(id);
        let Some(spring) = self.spring(id) else {
            return;
        };
        let on_change = if idle {
            None
        } else {
            spring.anim.callbacks.on_change.clone()
        };
        let default_on_change = spring.defaults.callbacks.on_change.clone();
        if !idle {
            self.spring_started(id);
        }
        for callback in on_change.into_iter().chain(default_on_change) {
            let spring = handle.clone();
            let value = value.clone();
            self.defer(move || callback(&value, &spring));
        }
        self.emit(id, NodeEvent::Change { value, idle });
    }

    /// Send `on_start` once per run, on its first change
    fn spring_started(&mut self, id: NodeId) {
        let Some(spring) = self.spring_mut(id) else {
            return;
        };
        if spring.anim.changed {
            return;
        }
        spring.anim.changed = true;
        let value = spring.value();
        let goal = spring.anim.to.clone();
        let finished = goal.and_then(|g| self.goal_value(&g)).is_some_and(|g| g == value);
        self.send_spring_event(id, SpringEvent::Start, AnimationResult::with_finished(value, finished));
    }

    /// Queue the callbacks of the live animation and the defaults
    pub(crate) fn send_spring_event(&mut self, id: NodeId, event: SpringEvent, result: AnimationResult) {
        let handle = self.spring_handle(id);
        let Some(spring) = self.spring(id) else {
            return;
        };
        let pick = |callbacks: &super::SpringCallbacks| match event {
            SpringEvent::Start => callbacks.on_start.clone(),
            SpringEvent::Rest => callbacks.on_rest.clone(),
            SpringEvent::Pause => callbacks.on_pause.clone(),
            SpringEvent::Resume => callbacks.on_resume.clone(),
        };
        let callbacks: Vec<_> = pick(&spring.anim.callbacks)
            .into_iter()
            .chain(pick(&spring.defaults.callbacks))
            .collect();
        for callback in callbacks {
            let spring = handle.clone();
            let result = result.clone();
            self.defer(move || callback(&result, &spring));
        }
    }

    /// Restart integration toward the current goal
    pub(crate) fn start_spring(&mut self, id: NodeId) {
        let goal = self
            .spring(id)
            .and_then(|s| s.anim.to.clone())
            .and_then(|g| self.goal_value(&g));
        let factory = self.ctx.string_interpolator().cloned();
        let Some(spring) = self.spring_mut(id) else {
            return;
        };
        let Some(payload) = spring.payload.as_mut() else {
            return;
        };
        if let (Payload::Text(text), Some(Value::Text(goal))) = (&mut *payload, &goal) {
            if !spring.anim.immediate && *goal != text.text {
                if let Err(err) = text.retarget(goal, factory.as_ref()) {
                    tracing::warn!(%err, "text goal cannot be animated");
                }
            }
        }
        payload.reset(true);
        if !spring.anim.immediate {
            spring.anim.from_values = payload.last_positions();
        }
        let wake = !spring.animating;
        if wake {
            spring.animating = true;
            spring.has_animated = true;
        }
        let paused = spring.paused;
        if let Some(goal) = goal {
            self.emit(id, NodeEvent::Reset { goal });
        }
        if wake && !paused {
            self.activate_spring(id);
        }
    }

    /// Enter the frame loop, or finish at once when animations are skipped
    fn activate_spring(&mut self, id: NodeId) {
        if self.skip_animation() {
            self.finish_spring_now(id);
        } else {
            tracing::trace!(?id, "spring active");
            self.start_node(id);
        }
    }

    /// Come to rest. Pending updates settle finished when the value reached
    /// `goal` (the current goal when `None`), or cancelled with `cancel`.
    pub(crate) fn stop_spring(&mut self, id: NodeId, goal: Option<Goal>, cancel: bool) {
        let Some(spring) = self.spring_mut(id) else {
            return;
        };
        if !spring.animating {
            return;
        }
        spring.animating = false;
        if let Some(payload) = spring.payload.as_mut() {
            payload.mark_done();
        }
        if spring.anim.to_values.is_some() {
            spring.anim.callbacks.on_change = None;
            spring.anim.callbacks.on_pause = None;
            spring.anim.callbacks.on_resume = None;
        }
        let value = spring.value();
        let goal = goal.or_else(|| spring.anim.to.clone());
        self.emit(id, NodeEvent::Idle);

        let result = if cancel {
            AnimationResult::cancelled(value)
        } else {
            let finished = goal.and_then(|g| self.goal_value(&g)).is_some_and(|g| g == value);
            AnimationResult::with_finished(value, finished)
        };
        tracing::debug!(?id, finished = result.finished, cancelled = result.cancelled, "spring at rest");
        self.settle_pending(id, result.clone());

        let Some(spring) = self.spring_mut(id) else {
            return;
        };
        if spring.anim.changed {
            spring.anim.changed = false;
            self.send_spring_event(id, SpringEvent::Rest, result);
        }
    }

    /// Resolve every pending update with `result`
    pub(crate) fn settle_pending(&mut self, id: NodeId, result: AnimationResult) {
        let Some(spring) = self.spring_mut(id) else {
            return;
        };
        let pending = std::mem::take(&mut spring.pending);
        let (from, to) = (spring.anim.from.clone(), spring.anim.to.clone());
        for resolver in pending {
            self.resolve_update(id, resolver, result.clone(), from.clone(), to.clone());
        }
    }

    /// Settle one update, or issue its next loop iteration
    fn resolve_update(
        &mut self,
        id: NodeId,
        resolver: SpringResolver,
        result: AnimationResult,
        from: Option<Goal>,
        to: Option<Goal>,
    ) {
        let repeat = match &resolver.looping {
            Some(props) if result.finished && !(resolver.is_loop && result.noop) => {
                props.loop_update(from, to)
            }
            _ => None,
        };
        let Some(next) = repeat else {
            resolver.send(Ok(result));
            return;
        };
        let spring = self.spring_handle(id);
        let SpringResolver { tx, parent_id, .. } = resolver;
        self.defer(move || {
            if let Err(err) = spring.run_update(next, true, parent_id, tx) {
                tracing::error!(%err, "loop iteration failed");
            }
        });
    }

    /// Settle the starting point of a spring that has never animated.
    /// Returns the endpoints the update asked for.
    pub(crate) fn prepare_spring(&mut self, id: NodeId, props: &SpringProps) -> Range {
        let range = Range {
            to: props.goal_ref().cloned(),
            from: props.from.clone(),
        };
        let Some(spring) = self.spring(id) else {
            return range;
        };
        if spring.has_animated {
            return range;
        }
        let has_payload = spring.payload.is_some();
        let (mut to, mut from) = (range.to.clone(), range.from.clone());
        if props.reverse {
            std::mem::swap(&mut to, &mut from);
        }
        if let Some(from) = from.and_then(|g| self.goal_value(&g)) {
            self.set_spring_value(id, &from, true, true);
        } else if !has_payload {
            if let Some(to) = to.and_then(|g| self.goal_value(&g)) {
                self.set_spring_value(id, &to, true, true);
            }
        }
        range
    }

    /// Apply one update whose delay and pause have passed
    pub(crate) fn merge_spring(
        &mut self,
        id: NodeId,
        range: Range,
        props: &SpringProps,
        call_id: u64,
        cancel: bool,
        resolver: SpringResolver,
    ) -> Result<()> {
        let handle = self.spring_handle(id);
        let Some(spring) = self.spring_mut(id) else {
            resolver.send(Err(AnimationError::Disposed));
            return Err(AnimationError::Disposed);
        };

        if cancel {
            let value = spring.value();
            self.halt_spring(id, true)?;
            resolver.send(Ok(AnimationResult::cancelled(value)));
            return Ok(());
        }

        let has_to = range.to.is_some();
        let has_from = range.from.is_some();
        if has_to || has_from {
            if call_id > spring.last_to_id {
                spring.last_to_id = call_id;
            } else {
                resolver.send(Ok(AnimationResult::cancelled(spring.value())));
                return Ok(());
            }
        }

        let prev_to = spring.anim.to.clone();
        let prev_from = spring.anim.from.clone();
        let mut to = range.to.or_else(|| prev_to.clone());
        let mut from = range.from.or_else(|| prev_from.clone());
        if has_from && !has_to && (!props.default || to.is_none()) {
            to = from.clone();
        }
        if props.reverse {
            std::mem::swap(&mut to, &mut from);
        }

        let from_changed = from != prev_from;
        if from_changed {
            spring.anim.from = from.clone();
        }

        let has_async = props.is_async();
        let prev_decay = spring.anim.config.decay;
        let prev_velocity = spring.anim.config.velocity.clone();
        if has_to || has_from {
            spring.anim.config.velocity = Default::default();
        }
        if let Some(config) = props.config.as_ref().filter(|_| !has_async) {
            let defaults = if props.default {
                None
            } else {
                spring.defaults.config.clone()
            };
            spring.anim.config.merge(config, defaults.as_ref());
        }
        let decay_changed = spring.anim.config.decay != prev_decay;
        let velocity_changed = spring.anim.config.velocity != prev_velocity;
        let default_immediate = spring.defaults.immediate == Some(true);
        let has_payload = spring.payload.is_some();

        let to_changed = to != prev_to;
        if to_changed {
            self.focus(id, to.clone());
        }

        let Some(to) = to.filter(|_| has_payload) else {
            let value = self.spring(id).map(|s| s.value()).unwrap_or_default();
            resolver.send(Ok(AnimationResult::finished(value)));
            return Ok(());
        };

        let reset = match props.reset {
            Some(reset) => reset && from.is_some(),
            None => has_from && !props.default,
        };
        let current = self.spring(id).map(|s| s.value()).unwrap_or_default();
        let value = match (&from, reset) {
            (Some(from), true) => self.goal_value(from).unwrap_or_else(|| current.clone()),
            _ => current.clone(),
        };
        let Some(goal) = self.goal_value(&to) else {
            resolver.send(Err(AnimationError::UnknownNode));
            return Err(AnimationError::UnknownNode);
        };

        let animatable = match &goal {
            Value::Text(_) => value.as_text().is_some(),
            _ => true,
        };
        let immediate = !has_async
            && (!animatable || default_immediate || props.immediate == Some(true));

        if let Err(err) = self.check_retarget(id, &goal, to_changed, immediate) {
            resolver.send(Err(err.clone()));
            return Err(err);
        }

        let is_node_goal = matches!(to, Goal::Node(_));
        let mut started = is_node_goal;
        let mut finished = false;
        if !started {
            let value_changed = reset || (!self.spring(id).is_some_and(|s| s.has_animated) && from_changed);
            if to_changed || value_changed {
                finished = value == goal;
                started = !finished;
            }
            let anim_immediate = self.spring(id).is_some_and(|s| s.anim.immediate);
            if (anim_immediate != immediate && !immediate) || decay_changed || velocity_changed {
                started = true;
            }
        }

        let (animating, changed) = self
            .spring(id)
            .map_or((false, false), |s| (s.animating, s.anim.changed));
        if finished && animating {
            if changed && !reset {
                started = true;
            } else if !started {
                self.stop_spring(id, prev_to.clone(), false);
            }
        }

        if !has_async {
            if started || matches!(prev_to, Some(Goal::Node(_))) {
                let to_values: Option<Components> = if is_node_goal {
                    None
                } else {
                    Some(goal.components())
                };
                if let Some(spring) = self.spring_mut(id) {
                    spring.anim.to_values = to_values;
                }
            }

            let flipped = self.spring_mut(id).and_then(|spring| {
                (spring.anim.immediate != immediate).then(|| {
                    spring.anim.immediate = immediate;
                    immediate
                })
            });
            if flipped == Some(false) && !reset {
                if let Some(prev) = prev_to.as_ref().and_then(|g| self.goal_value(g)) {
                    self.set_spring_value(id, &prev, true, true);
                }
            }

            if started {
                let current = self.spring(id).map(|s| s.value()).unwrap_or_default();
                let prev_goal = prev_to.as_ref().and_then(|g| self.goal_value(g));
                let prev_finished = prev_goal.is_some_and(|g| g == current);
                self.settle_pending(id, AnimationResult::with_finished(current.clone(), prev_finished));

                let Some(spring) = self.spring_mut(id) else {
                    resolver.send(Err(AnimationError::Disposed));
                    return Err(AnimationError::Disposed);
                };
                let prev_on_rest = spring.anim.callbacks.on_rest.clone();
                spring.anim.callbacks = if props.default {
                    Default::default()
                } else {
                    props.callbacks.clone()
                };
                spring.pending.push(resolver);

                if spring.anim.changed {
                    spring.anim.changed = !reset;
                    let result = AnimationResult::with_finished(current, prev_finished);
                    if let Some(on_rest) = prev_on_rest {
                        let spring = handle.clone();
                        let result = result.clone();
                        self.defer(move || on_rest(&result, &spring));
                    }
                    if reset {
                        let on_rest = self.spring(id).and_then(|s| s.defaults.callbacks.on_rest.clone());
                        if let Some(on_rest) = on_rest {
                            let spring = handle.clone();
                            self.defer(move || on_rest(&result, &spring));
                        }
                    } else {
                        self.send_spring_event(id, SpringEvent::Start, result);
                    }
                }
                if reset {
                    self.set_spring_value(id, &value, true, true);
                }
                self.start_spring(id);
                return Ok(());
            }
        }

        if reset {
            self.set_spring_value(id, &value, true, true);
        }

        if has_async {
            let to = match &props.to {
                Some(SpringTo::Script(script)) => AsyncTo::Script(script.clone()),
                Some(SpringTo::Chain(chain)) => AsyncTo::Chain(chain.clone()),
                _ => {
                    resolver.send(Ok(AnimationResult::noop(value)));
                    return Ok(());
                }
            };
            let on_rest = props.callbacks.on_rest.clone().map(|on_rest| {
                let spring = handle.clone();
                Rc::new(move |result: &AnimationResult| on_rest(result, &spring))
                    as Rc<dyn Fn(&AnimationResult)>
            });
            let run = AsyncRun {
                call_id,
                parent_id: resolver.parent_id,
                reset,
                skip_animation: self.skip_animation(),
                launcher: props.clone(),
                on_rest,
            };
            let Some(state) = self.spring(id).map(|s| s.async_state.clone()) else {
                resolver.send(Err(AnimationError::Disposed));
                return Ok(());
            };
            let shared = run_async(handle, state, to, run);
            let _ = resolver.tx.send(Resolution::Async(shared));
            return Ok(());
        }

        match self.spring_mut(id) {
            Some(spring) if spring.animating && !to_changed => spring.pending.push(resolver),
            _ => resolver.send(Ok(AnimationResult::noop(value))),
        }
        Ok(())
    }

    /// A new goal must keep the payload's representation unless the spring
    /// jumps to it, and text needs an interpolator to animate
    fn check_retarget(&mut self, id: NodeId, goal: &Value, to_changed: bool, immediate: bool) -> Result<()> {
        if !to_changed {
            return Ok(());
        }
        let Some(kind) = self.spring(id).and_then(|s| s.payload.as_ref()).map(|p| p.kind()) else {
            return Ok(());
        };
        if kind != goal.kind() {
            if immediate {
                self.set_spring_value(id, goal, true, true);
                return Ok(());
            }
            return Err(AnimationError::TypeMismatch {
                from: kind,
                to: goal.kind(),
            });
        }
        if kind == ValueKind::Text && !immediate && self.ctx.string_interpolator().is_none() {
            if let Value::Text(text) = goal {
                if self.spring(id).map(|s| s.value()).as_ref() != Some(goal) {
                    return Err(AnimationError::MissingStringInterpolator(text.clone()));
                }
            }
        }
        Ok(())
    }

    /// Freeze at the current value and drop pending async steps
    pub(crate) fn halt_spring(&mut self, id: NodeId, cancel: bool) -> Result<()> {
        let spring = self.spring(id).ok_or(AnimationError::Disposed)?;
        let prev_to = spring.anim.to.clone();
        let value = spring.value();
        let state = spring.async_state.clone();
        let last_call_id = spring.last_call_id;
        self.focus(id, Some(Goal::Value(value)));
        stop_async(&state, Some(last_call_id)).settle(self);
        self.stop_spring(id, prev_to, cancel);
        Ok(())
    }

    /// Jump to the goal (or `to`) and rest as finished
    pub(crate) fn finish_spring(&mut self, id: NodeId, to: Option<Goal>) -> Result<()> {
        self.spring(id).ok_or(AnimationError::Disposed)?;
        if let Some(to) = to {
            self.focus(id, Some(to));
        }
        self.finish_spring_now(id);
        Ok(())
    }

    fn finish_spring_now(&mut self, id: NodeId) {
        let Some(spring) = self.spring(id) else {
            return;
        };
        if !spring.animating {
            return;
        }
        let decay = spring.anim.config.decay.and_then(|d| d.factor()).is_some();
        let goal = spring.anim.to.clone().and_then(|g| self.goal_value(&g));
        self.spring_started(id);
        if !decay {
            if let Some(goal) = goal {
                self.set_spring_value(id, &goal, false, true);
            }
        }
        self.stop_spring(id, None, false);
    }

    /// Set the paused bit. Returns the async state when the spring was
    /// running.
    pub(crate) fn pause_spring(&mut self, id: NodeId) -> Option<Rc<RefCell<AsyncState<Value>>>> {
        let spring = self.spring_mut(id)?;
        if spring.paused {
            return None;
        }
        spring.paused = true;
        let state = spring.async_state.clone();
        let result = AnimationResult::unfinished(spring.value());
        tracing::debug!(?id, "spring paused");
        self.send_spring_event(id, SpringEvent::Pause, result);
        Some(state)
    }

    /// Clear the paused bit. Returns the async state when the spring was
    /// paused.
    pub(crate) fn resume_spring(&mut self, id: NodeId) -> Option<Rc<RefCell<AsyncState<Value>>>> {
        let spring = self.spring_mut(id)?;
        if !spring.paused {
            return None;
        }
        spring.paused = false;
        let animating = spring.animating;
        let state = spring.async_state.clone();
        let result = AnimationResult::unfinished(spring.value());
        if animating {
            self.activate_spring(id);
        }
        tracing::debug!(?id, "spring resumed");
        self.send_spring_event(id, SpringEvent::Resume, result);
        Some(state)
    }

    /// React to a change of the node this spring follows
    pub(crate) fn spring_observed(&mut self, id: NodeId, source: NodeId, event: &NodeEvent) {
        match event {
            NodeEvent::Change { .. } | NodeEvent::Reset { .. } => {
                let follows = self
                    .spring(id)
                    .is_some_and(|s| s.anim.to == Some(Goal::Node(source)));
                if follows {
                    self.start_spring(id);
                }
            }
            NodeEvent::Priority(priority) => self.set_priority(id, priority + 1),
            NodeEvent::Idle => {}
        }
    }

    /// Stop, detach and free the spring
    pub(crate) fn dispose_spring(&mut self, id: NodeId) -> Result<()> {
        self.halt_spring(id, false)?;
        self.focus(id, None);
        if let Some(spring) = self.spring_mut(id) {
            spring.pending.clear();
            spring.queue.clear();
        }
        self.listeners.retain(|_, l| l.node != id);
        tracing::debug!(?id, "spring disposed");
        self.remove_node(id);
        Ok(())
    }
}
