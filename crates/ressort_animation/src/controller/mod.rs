//! Controllers
//!
//! A [`Controller`] drives a named set of springs as one unit. Updates are
//! queued with [`Controller::update`] and applied by [`Controller::start`]:
//! queued updates sharing a delay merge into one batch, each batch waits out
//! its delay on a frame-driven timeout, and a batch issued before the last
//! [`stop`](Controller::stop) is discarded when it wakes.
//!
//! Controllers can be attached to a parent. Keys of the child without an
//! explicit goal then trail the parent's spring of the same key.

mod diff;
mod props;

pub use props::{
    ConfigProp, ControllerCallbacks, ControllerEventFn, ControllerProps, ControllerTo, Delay,
    GoalMap, KeyMatch,
};

use futures::channel::oneshot;
use futures::FutureExt;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{AnimationError, Result};
use crate::graph::{ControllerId, NodeEvent, NodeId, Observer};
use crate::result::{combine_results, AnimationFuture, AnimationResult};
use crate::runner::{
    flush_pause_queue, flush_resume_queue, ready, resolution_future, run_async, stop_async,
    AsyncRun, AsyncState, AsyncTarget, AsyncTo, Resolution,
};
use crate::scheduler::{Runtime, SchedulerHandle};
use crate::spring::{Goal, SpringProps, SpringTo, SpringValue};
use crate::value::{Value, ValueMap};

use diff::{diff, group_by_delay, Batch};

/// Props remembered across updates
#[derive(Clone, Debug, Default)]
struct ControllerDefaults {
    config: Option<ConfigProp>,
    immediate: Option<KeyMatch>,
    callbacks: ControllerCallbacks,
}

/// Per-frame event bookkeeping
#[derive(Debug, Default)]
struct Events {
    /// Springs that changed without settling since the last rest
    active: FxHashSet<NodeId>,
    changed: bool,
    started: bool,
    scheduled: bool,
    /// The next rest reports cancelled
    cancelled: bool,
}

pub(crate) struct ControllerState {
    springs: IndexMap<String, NodeId>,
    merged_to: GoalMap,
    merged_from: GoalMap,
    timestamps: FxHashMap<String, u64>,
    queue: Vec<Batch>,
    /// Batches stamped at or below this are discarded
    cancelled_at: u64,
    parent: Option<ControllerId>,
    children: Vec<ControllerId>,
    async_state: Rc<RefCell<AsyncState<ValueMap>>>,
    last_async_id: u64,
    /// Batches waiting out their delay
    delayed: usize,
    item: Option<Rc<dyn Any>>,
    defaults: ControllerDefaults,
    callbacks: ControllerCallbacks,
    events: Events,
}

impl ControllerState {
    fn new(item: Option<Rc<dyn Any>>) -> Self {
        Self {
            springs: IndexMap::new(),
            merged_to: GoalMap::new(),
            merged_from: GoalMap::new(),
            timestamps: FxHashMap::default(),
            queue: Vec::new(),
            cancelled_at: 0,
            parent: None,
            children: Vec::new(),
            async_state: AsyncState::new_shared(),
            last_async_id: 0,
            delayed: 0,
            item,
            defaults: ControllerDefaults::default(),
            callbacks: ControllerCallbacks::default(),
            events: Events::default(),
        }
    }
}

/// What applying a batch amounts to
enum Plan {
    /// Issued before the last stop
    Discarded,
    Cancel,
    Async {
        to: AsyncTo<Controller>,
        props: ControllerProps,
        call_id: u64,
    },
    Springs {
        starts: Vec<(SpringValue, SpringProps)>,
        pause: Option<bool>,
    },
}

impl Runtime {
    fn controller_values(&self, cid: ControllerId) -> ValueMap {
        let Some(ctrl) = self.controllers.get(cid) else {
            return ValueMap::new();
        };
        ctrl.springs
            .iter()
            .map(|(key, id)| (key.clone(), self.current_value(*id).unwrap_or_default()))
            .collect()
    }

    /// Every spring sits at its goal
    fn controller_at_goal(&self, cid: ControllerId) -> bool {
        let Some(ctrl) = self.controllers.get(cid) else {
            return false;
        };
        ctrl.springs.values().all(|id| {
            let goal = self
                .spring(*id)
                .and_then(|s| s.anim.to.clone())
                .and_then(|g| self.goal_value(&g));
            goal.is_some() && goal == self.current_value(*id)
        })
    }

    pub(crate) fn controller_observed(&mut self, cid: ControllerId, source: NodeId, event: &NodeEvent) {
        let Some(ctrl) = self.controllers.get_mut(cid) else {
            return;
        };
        match event {
            NodeEvent::Change { idle, .. } => {
                ctrl.events.changed = true;
                if !idle {
                    ctrl.events.active.insert(source);
                }
            }
            NodeEvent::Idle => {
                ctrl.events.active.remove(&source);
            }
            _ => return,
        }
        if !ctrl.events.scheduled {
            ctrl.events.scheduled = true;
            self.controller_flush.push(cid);
        }
    }

    /// Turn the changes seen since the last flush into batched events
    pub(crate) fn flush_controller_events(&mut self, cid: ControllerId) {
        let values = self.controller_values(cid);
        let at_goal = self.controller_at_goal(cid);
        let handle = Controller {
            sched: self.handle(),
            id: cid,
        };
        let Some(ctrl) = self.controllers.get_mut(cid) else {
            return;
        };
        let events = &mut ctrl.events;
        events.scheduled = false;
        let active = !events.active.is_empty();
        let changed = std::mem::take(&mut events.changed);

        let mut fire: Vec<(ControllerEventFn, AnimationResult<ValueMap>)> = Vec::new();
        let callbacks = &ctrl.callbacks;
        if (active || changed) && !events.started {
            events.started = true;
            if let Some(on_start) = &callbacks.on_start {
                fire.push((on_start.clone(), AnimationResult::unfinished(values.clone())));
            }
        }
        if changed {
            if let Some(on_change) = &callbacks.on_change {
                fire.push((on_change.clone(), AnimationResult::unfinished(values.clone())));
            }
        }
        if !active && events.started {
            events.started = false;
            let result = if std::mem::take(&mut events.cancelled) {
                AnimationResult::cancelled(values)
            } else {
                AnimationResult::with_finished(values, at_goal)
            };
            tracing::debug!(?cid, finished = result.finished, "controller at rest");
            if let Some(on_rest) = &callbacks.on_rest {
                fire.push((on_rest.clone(), result));
            }
        }

        let item = ctrl.item.clone();
        for (callback, result) in fire {
            let handle = handle.clone();
            let item = item.clone();
            self.defer(move || callback(&result, &handle, item.as_deref()));
        }
    }

    /// Stamp an update and split it into batches
    fn controller_batches(&mut self, props: ControllerProps) -> Vec<Batch> {
        let stamp = self.next_stamp();
        let per_key = match &props.delay {
            Some(Delay::PerKey(delay)) => Some((delay.clone(), props.named_keys())),
            _ => None,
        };
        match per_key {
            Some((delay, keys)) if !keys.is_empty() => keys
                .into_iter()
                .map(|key| {
                    let ms = delay(&key);
                    let mut split = props.for_key(&key);
                    split.delay = Some(Delay::Fixed(ms));
                    Batch::new(split, ms, stamp)
                })
                .collect(),
            _ => {
                let ms = props.delay.as_ref().and_then(Delay::fixed).unwrap_or(0.0);
                vec![Batch::new(props, ms, stamp)]
            }
        }
    }

    /// Create a spring for `key` observed by the controller
    fn controller_spring(&mut self, cid: ControllerId, key: &str, initial: Value) -> NodeId {
        let id = self.insert_spring(Some(key.to_string()), Some(initial));
        self.add_child(id, Observer::Controller(cid));
        if let Some(ctrl) = self.controllers.get_mut(cid) {
            ctrl.springs.insert(key.to_string(), id);
        }
        id
    }

    /// Decide what a batch does once its delay has passed
    fn plan_batch(&mut self, cid: ControllerId, batch: Batch) -> Result<Plan> {
        let ctrl = self.controllers.get_mut(cid).ok_or(AnimationError::Disposed)?;
        if batch.delay > 0.0 {
            ctrl.delayed = ctrl.delayed.saturating_sub(1);
        }
        if batch.stamp <= ctrl.cancelled_at {
            tracing::debug!(?cid, stamp = batch.stamp, "discarding update issued before stop");
            return Ok(Plan::Discarded);
        }

        let props = &batch.props;
        if props.default {
            if props.config.is_some() {
                ctrl.defaults.config = props.config.clone();
            }
            if props.immediate.is_some() {
                ctrl.defaults.immediate = props.immediate.clone();
            }
            ctrl.defaults.callbacks.overlay(&props.callbacks);
        }
        let mut callbacks = ctrl.defaults.callbacks.clone();
        callbacks.overlay(&props.callbacks);
        if !callbacks.is_empty() {
            ctrl.callbacks = callbacks;
        }

        if props.cancel {
            return Ok(Plan::Cancel);
        }

        let pause = props.pause.filter(|p| *p != ctrl.async_state.borrow().paused);
        if let Some(paused) = pause {
            ctrl.async_state.borrow_mut().paused = paused;
        }
        let paused = ctrl.async_state.borrow().paused;

        match &props.to {
            Some(ControllerTo::Script(script)) => {
                ctrl.last_async_id += 1;
                return Ok(Plan::Async {
                    to: AsyncTo::Script(script.clone()),
                    props: props.clone(),
                    call_id: ctrl.last_async_id,
                });
            }
            Some(ControllerTo::Chain(chain)) => {
                ctrl.last_async_id += 1;
                return Ok(Plan::Async {
                    to: AsyncTo::Chain(chain.clone()),
                    props: props.clone(),
                    call_id: ctrl.last_async_id,
                });
            }
            _ => {}
        }

        let accepted = diff(&batch, &mut ctrl.timestamps, &mut ctrl.merged_to, &mut ctrl.merged_from);
        let mut keys = accepted.keys();
        if props.goals().is_none() && props.from.is_none() {
            keys.extend(ctrl.springs.keys().cloned());
        }
        if let Some(only) = &props.keys {
            keys.retain(|k| only.contains(k));
        }

        let config = props.config.clone().or_else(|| ctrl.defaults.config.clone());
        let immediate = props.immediate.clone().or_else(|| ctrl.defaults.immediate.clone());
        let merged_to = ctrl.merged_to.clone();
        let merged_from = ctrl.merged_from.clone();
        let parent = ctrl.parent;
        let known: Vec<String> = ctrl.springs.keys().cloned().collect();

        let mut starts = Vec::new();
        for key in &keys {
            let follow = if merged_to.contains_key(key) {
                None
            } else {
                parent
                    .and_then(|p| self.controllers.get(p))
                    .and_then(|p| p.springs.get(key))
                    .map(|id| Goal::Node(*id))
            };
            let to = accepted.to.get(key).cloned().or(follow);
            let from = accepted.from.get(key).cloned();

            let spring_id = match self.controllers.get(cid).and_then(|c| c.springs.get(key)) {
                Some(id) => *id,
                None => {
                    let initial = from
                        .as_ref()
                        .or(merged_from.get(key))
                        .or(to.as_ref().filter(|g| matches!(g, Goal::Node(_))))
                        .and_then(|g| self.goal_value(g));
                    let Some(initial) = initial else {
                        tracing::warn!(key = %key, "no starting value for key, skipping");
                        continue;
                    };
                    self.controller_spring(cid, key, initial)
                }
            };

            let spring_props = SpringProps {
                to: to.map(SpringTo::Goal),
                from,
                config: config.as_ref().map(|c| c.resolve(key)),
                immediate: immediate.as_ref().map(|m| m.matches(key)),
                reset: props.reset.as_ref().map(|m| m.matches(key)),
                reverse: props.reverse,
                pause: pause.or(paused.then_some(true)),
                ..SpringProps::default()
            };
            starts.push((self.spring_handle(spring_id), spring_props));
        }

        // Keys left out of this batch still follow a pause change
        if let Some(paused) = pause {
            for key in known.iter().filter(|k| !keys.contains(*k)) {
                if let Some(id) = self.controllers.get(cid).and_then(|c| c.springs.get(key)) {
                    starts.push((self.spring_handle(*id), SpringProps::new().pause(paused)));
                }
            }
        }
        Ok(Plan::Springs { starts, pause })
    }

    fn halt_controller(&mut self, cid: ControllerId, keys: Option<&[String]>, cancel: bool) -> Result<()> {
        let stamp = self.stamp();
        let ctrl = self.controllers.get_mut(cid).ok_or(AnimationError::Disposed)?;
        let springs: Vec<NodeId> = match keys {
            Some(keys) => keys.iter().filter_map(|k| ctrl.springs.get(k).copied()).collect(),
            None => {
                ctrl.cancelled_at = stamp;
                ctrl.events.cancelled = cancel;
                let state = ctrl.async_state.clone();
                let last_async_id = ctrl.last_async_id;
                let springs = ctrl.springs.values().copied().collect();
                stop_async(&state, Some(last_async_id)).settle(self);
                springs
            }
        };
        for id in springs {
            self.halt_spring(id, cancel)?;
        }
        Ok(())
    }
}

/// Drives a named set of springs
#[derive(Clone, Debug)]
pub struct Controller {
    sched: SchedulerHandle,
    id: ControllerId,
}

impl PartialEq for Controller {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Controller {
    pub fn new(sched: &SchedulerHandle) -> Result<Self> {
        Self::create(sched, None)
    }

    /// A controller carrying an opaque item, handed to every event callback
    pub fn with_item(sched: &SchedulerHandle, item: impl Any) -> Result<Self> {
        Self::create(sched, Some(Rc::new(item)))
    }

    fn async_state(&self) -> Result<Rc<RefCell<AsyncState<ValueMap>>>> {
        let id = self.id;
        self.sched
            .read(|rt| rt.controllers.get(id).map(|c| c.async_state.clone()))?
            .ok_or(AnimationError::Disposed)
    }

    fn create(sched: &SchedulerHandle, item: Option<Rc<dyn Any>>) -> Result<Self> {
        let id = sched.with(|rt| rt.controllers.insert(ControllerState::new(item)))?;
        tracing::debug!(?id, "controller created");
        Ok(Self {
            sched: sched.clone(),
            id,
        })
    }

    pub fn item(&self) -> Option<Rc<dyn Any>> {
        let id = self.id;
        self.sched
            .read(|rt| rt.controllers.get(id).and_then(|c| c.item.clone()))
            .ok()
            .flatten()
    }

    /// Queue an update for the next [`start`](Self::start)
    pub fn update(&self, props: impl Into<ControllerProps>) -> Result<&Self> {
        let id = self.id;
        let props = props.into();
        self.sched.with(|rt| {
            rt.controllers.get(id).ok_or(AnimationError::Disposed)?;
            let batches = rt.controller_batches(props);
            if let Some(ctrl) = rt.controllers.get_mut(id) {
                ctrl.queue.extend(batches);
            }
            Ok::<_, AnimationError>(())
        })??;
        Ok(self)
    }

    /// Apply every queued update. The future settles once all of them have
    /// come to rest.
    pub fn start(&self) -> Result<AnimationFuture<ValueMap>> {
        let id = self.id;
        let queue = self.sched.with(|rt| {
            rt.controllers
                .get_mut(id)
                .map(|c| std::mem::take(&mut c.queue))
                .ok_or(AnimationError::Disposed)
        })??;
        self.flush(queue, None)
    }

    /// Apply one update right away, leaving the queue alone
    pub fn start_with(&self, props: impl Into<ControllerProps>) -> Result<AnimationFuture<ValueMap>> {
        self.start_inner(props.into(), None)
    }

    fn start_inner(&self, props: ControllerProps, parent_id: Option<u64>) -> Result<AnimationFuture<ValueMap>> {
        let id = self.id;
        let batches = self.sched.with(|rt| {
            rt.controllers.get(id).ok_or(AnimationError::Disposed)?;
            Ok::<_, AnimationError>(rt.controller_batches(props))
        })??;
        self.flush(batches, parent_id)
    }

    fn flush(&self, batches: Vec<Batch>, parent_id: Option<u64>) -> Result<AnimationFuture<ValueMap>> {
        let skip = self.sched.read(|rt| rt.skip_animation())?;
        let mut futures = Vec::new();
        for mut batch in group_by_delay(batches) {
            if skip {
                batch.delay = 0.0;
            }
            if batch.delay > 0.0 {
                let (tx, rx) = oneshot::channel();
                let id = self.id;
                self.sched.with(|rt| {
                    if let Some(ctrl) = rt.controllers.get_mut(id) {
                        ctrl.delayed += 1;
                    }
                })?;
                let ctrl = self.clone();
                let delay = batch.delay;
                self.sched.set_timeout(delay, move || {
                    let resolution = match ctrl.apply_batch(batch, parent_id) {
                        Ok(future) => Resolution::Async(future.shared()),
                        Err(err) => {
                            tracing::error!(%err, "delayed controller update failed");
                            Resolution::Done(Err(err))
                        }
                    };
                    let _ = tx.send(resolution);
                })?;
                futures.push(resolution_future(rx));
            } else {
                futures.push(self.apply_batch(batch, parent_id)?);
            }
        }
        let ctrl = self.clone();
        Ok(Box::pin(async move {
            let results = futures::future::join_all(futures)
                .await
                .into_iter()
                .collect::<Result<Vec<_>>>()?;
            Ok(combine_results(ctrl.get(), &results))
        }))
    }

    fn apply_batch(&self, batch: Batch, parent_id: Option<u64>) -> Result<AnimationFuture<ValueMap>> {
        let id = self.id;
        let plan = self.sched.with(|rt| rt.plan_batch(id, batch))??;
        match plan {
            Plan::Discarded => Ok(ready(Ok(AnimationResult::cancelled(self.get())))),
            Plan::Cancel => {
                self.cancel(None)?;
                Ok(ready(Ok(AnimationResult::cancelled(self.get()))))
            }
            Plan::Async { to, props, call_id } => {
                let run = AsyncRun {
                    call_id,
                    parent_id,
                    reset: props.reset.as_ref().is_some_and(|r| matches!(r, KeyMatch::All(true))),
                    skip_animation: self.sched.read(|rt| rt.skip_animation())?,
                    launcher: props,
                    on_rest: None,
                };
                let shared = run_async(self.clone(), self.async_state()?, to, run);
                Ok(Box::pin(shared))
            }
            Plan::Springs { starts, pause } => {
                let futures = starts
                    .into_iter()
                    .map(|(spring, props)| spring.start(props))
                    .collect::<Result<Vec<_>>>()?;
                if let Some(paused) = pause {
                    let state = self.async_state()?;
                    if paused {
                        flush_pause_queue(&state);
                    } else {
                        flush_resume_queue(&state);
                    }
                }
                let ctrl = self.clone();
                Ok(Box::pin(async move {
                    let results = futures::future::join_all(futures)
                        .await
                        .into_iter()
                        .collect::<Result<Vec<_>>>()?;
                    Ok(combine_results(ctrl.get(), &results))
                }))
            }
        }
    }

    /// Freeze the named keys, or every key and every pending update
    pub fn stop(&self, keys: Option<&[&str]>) -> Result<()> {
        self.halt_with(keys, false)
    }

    /// Like [`stop`](Self::stop), resolving pending futures as cancelled
    pub fn cancel(&self, keys: Option<&[&str]>) -> Result<()> {
        self.halt_with(keys, true)
    }

    fn halt_with(&self, keys: Option<&[&str]>, cancel: bool) -> Result<()> {
        let id = self.id;
        let keys: Option<Vec<String>> = keys.map(|k| k.iter().map(|s| s.to_string()).collect());
        self.sched
            .with(|rt| rt.halt_controller(id, keys.as_deref(), cancel))?
    }

    /// Hold the named keys, or the whole controller including async scripts
    pub fn pause(&self, keys: Option<&[&str]>) -> Result<()> {
        self.set_paused(keys, true)
    }

    pub fn resume(&self, keys: Option<&[&str]>) -> Result<()> {
        self.set_paused(keys, false)
    }

    fn set_paused(&self, keys: Option<&[&str]>, paused: bool) -> Result<()> {
        match keys {
            None => self.start_with(ControllerProps::new().pause(paused)).map(drop),
            Some(keys) => {
                for spring in keys.iter().filter_map(|k| self.spring(k)) {
                    if paused {
                        spring.pause()?;
                    } else {
                        spring.resume()?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Jump keys to values without animating, creating springs as needed
    pub fn set(&self, values: &ValueMap) -> Result<()> {
        let id = self.id;
        let springs = self.sched.with(|rt| {
            let ctrl = rt.controllers.get(id).ok_or(AnimationError::Disposed)?;
            let existing: Vec<(Option<NodeId>, String)> = values
                .keys()
                .map(|k| (ctrl.springs.get(k).copied(), k.clone()))
                .collect();
            let mut springs = Vec::new();
            for (node, key) in existing {
                match node {
                    Some(node) => springs.push((rt.spring_handle(node), key)),
                    None => {
                        if let Some(value) = values.get(&key) {
                            rt.controller_spring(id, &key, value.clone());
                        }
                    }
                }
            }
            Ok::<_, AnimationError>(springs)
        })??;
        for (spring, key) in springs {
            if let Some(value) = values.get(&key) {
                spring.set(value.clone())?;
            }
        }
        Ok(())
    }

    /// Current value of every key
    pub fn get(&self) -> ValueMap {
        let id = self.id;
        self.sched.read(|rt| rt.controller_values(id)).unwrap_or_default()
    }

    pub fn spring(&self, key: &str) -> Option<SpringValue> {
        let id = self.id;
        self.sched
            .read(|rt| {
                let node = rt.controllers.get(id)?.springs.get(key).copied()?;
                Some(rt.spring_handle(node))
            })
            .ok()
            .flatten()
    }

    pub fn keys(&self) -> Vec<String> {
        let id = self.id;
        self.sched
            .read(|rt| {
                rt.controllers
                    .get(id)
                    .map(|c| c.springs.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// No key is animating, delayed or paused and no script is running
    pub fn is_idle(&self) -> bool {
        let id = self.id;
        self.sched
            .read(|rt| {
                let Some(ctrl) = rt.controllers.get(id) else {
                    return true;
                };
                let state = ctrl.async_state.borrow();
                state.async_to.is_none()
                    && ctrl.delayed == 0
                    && ctrl.springs.values().all(|node| {
                        rt.spring(*node).is_some_and(|s| {
                            !s.animating && !s.paused && !s.async_state.borrow().delayed
                        })
                    })
            })
            .unwrap_or(true)
    }

    /// Make keys without an explicit goal trail `parent`'s spring of the
    /// same key
    pub fn attach(&self, parent: &Controller) -> Result<()> {
        let (id, parent_id) = (self.id, parent.id);
        let follows = self.sched.with(|rt| {
            let parent_springs = rt
                .controllers
                .get_mut(parent_id)
                .map(|p| {
                    if !p.children.contains(&id) {
                        p.children.push(id);
                    }
                    p.springs.clone()
                })
                .ok_or(AnimationError::Disposed)?;
            let ctrl = rt.controllers.get_mut(id).ok_or(AnimationError::Disposed)?;
            ctrl.parent = Some(parent_id);
            let follows: Vec<(NodeId, NodeId)> = ctrl
                .springs
                .iter()
                .filter(|(key, _)| !ctrl.merged_to.contains_key(*key))
                .filter_map(|(key, node)| parent_springs.get(key).map(|p| (*node, *p)))
                .collect();
            Ok::<_, AnimationError>(
                follows
                    .into_iter()
                    .map(|(node, source)| (rt.spring_handle(node), source))
                    .collect::<Vec<_>>(),
            )
        })??;
        for (spring, source) in follows {
            // Resolves when the parent comes to rest; nothing awaits it
            let _follow = spring.start(SpringProps::to(Goal::Node(source)))?;
        }
        Ok(())
    }

    /// Stop everything, dispose every spring and unlink from parent and
    /// children. Terminal.
    pub fn dispose(&self) -> Result<()> {
        let id = self.id;
        self.sched.with(|rt| {
            rt.halt_controller(id, None, false)?;
            let ctrl = rt.controllers.remove(id).ok_or(AnimationError::Disposed)?;
            if let Some(parent) = ctrl.parent.and_then(|p| rt.controllers.get_mut(p)) {
                parent.children.retain(|c| *c != id);
            }
            for child in &ctrl.children {
                if let Some(child) = rt.controllers.get_mut(*child) {
                    child.parent = None;
                }
            }
            for node in ctrl.springs.values() {
                rt.remove_child(*node, Observer::Controller(id));
                rt.dispose_spring(*node)?;
            }
            rt.controller_flush.retain(|c| *c != id);
            tracing::debug!(?id, "controller disposed");
            Ok(())
        })?
    }
}

impl AsyncTarget for Controller {
    type Props = ControllerProps;
    type Output = ValueMap;

    fn start_nested(&self, props: ControllerProps, parent_id: u64) -> Result<AnimationFuture<ValueMap>> {
        self.start_inner(props, Some(parent_id))
    }

    fn inherit(props: &mut ControllerProps, launcher: &ControllerProps) {
        if props.config.is_none() {
            props.config = launcher.config.clone();
        }
        if props.immediate.is_none() {
            props.immediate = launcher.immediate.clone();
        }
    }

    fn snapshot(&self) -> ValueMap {
        self.get()
    }

    fn halt(&self) -> Result<()> {
        self.stop(None)
    }
}
