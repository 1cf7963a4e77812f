//! Derived nodes
//!
//! An [`Interpolation`] computes a pure function over one or more source
//! nodes. It only subscribes to its sources once something observes it;
//! until then, reads recompute on demand.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::rc::Rc;

use crate::error::{AnimationError, Result};
use crate::graph::{ListenerId, NodeBase, NodeEvent, NodeId, Observer};
use crate::interpolate::{Interpolator, RangeConfig};
use crate::scheduler::{Listener, Node, NodeKind, Runtime, SchedulerHandle};
use crate::value::Value;

/// Computes a derived value from the current source values
pub type Calc = Rc<dyn Fn(&[Value]) -> Value>;

pub(crate) struct InterpolationState {
    pub sources: SmallVec<[NodeId; 2]>,
    pub calc: Calc,
    pub value: Value,
    pub idle: bool,
    /// Sources seen animating since this node last went idle
    pub active: FxHashSet<NodeId>,
    pub attached: bool,
}

impl Runtime {
    /// Value of a node, recomputing unobserved interpolations
    pub(crate) fn current_value(&self, id: NodeId) -> Option<Value> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Spring(spring) => Some(spring.value()),
            NodeKind::Interpolation(interp) if interp.attached => Some(interp.value.clone()),
            NodeKind::Interpolation(interp) => Some(self.compute(interp)),
        }
    }

    fn compute(&self, interp: &InterpolationState) -> Value {
        let inputs: SmallVec<[Value; 2]> = interp
            .sources
            .iter()
            .map(|s| self.current_value(*s).unwrap_or_default())
            .collect();
        (interp.calc)(&inputs)
    }

    fn interpolation(&self, id: NodeId) -> Option<&InterpolationState> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Interpolation(interp) => Some(interp),
            _ => None,
        }
    }

    fn interpolation_mut(&mut self, id: NodeId) -> Option<&mut InterpolationState> {
        match &mut self.nodes.get_mut(id)?.kind {
            NodeKind::Interpolation(interp) => Some(interp),
            _ => None,
        }
    }

    /// Every source that was active has gone idle or paused
    fn sources_settled(&self, id: NodeId) -> bool {
        self.interpolation(id)
            .map_or(true, |i| i.active.iter().all(|s| self.is_node_idle(*s)))
    }

    pub(crate) fn advance_interpolation(&mut self, id: NodeId) {
        let Some(interp) = self.interpolation(id) else {
            return;
        };
        let value = self.compute(interp);
        let idle = interp.idle;
        if !value.same_as(&interp.value) {
            if let Some(interp) = self.interpolation_mut(id) {
                interp.value = value.clone();
            }
            self.emit(id, NodeEvent::Change { value, idle });
        }
        if !idle && self.sources_settled(id) {
            self.interpolation_idle(id);
        }
    }

    fn start_interpolation(&mut self, id: NodeId) {
        let wake = self
            .interpolation(id)
            .is_some_and(|i| i.idle)
            && !self.sources_settled(id);
        if !wake {
            return;
        }
        if let Some(interp) = self.interpolation_mut(id) {
            interp.idle = false;
        }
        if self.skip_animation() {
            self.advance_interpolation(id);
            self.interpolation_idle(id);
        } else {
            self.start_node(id);
        }
    }

    fn interpolation_idle(&mut self, id: NodeId) {
        let Some(interp) = self.interpolation_mut(id) else {
            return;
        };
        if interp.idle {
            return;
        }
        interp.idle = true;
        self.emit(id, NodeEvent::Idle);
    }

    pub(crate) fn attach_interpolation(&mut self, id: NodeId) {
        let Some(interp) = self.interpolation(id) else {
            return;
        };
        let sources = interp.sources.clone();
        let mut priority = 1;
        let mut active = FxHashSet::default();
        for source in &sources {
            self.add_child(*source, Observer::Node(id));
            if !self.is_node_settled(*source) {
                active.insert(*source);
            }
            priority = priority.max(self.priority(*source) + 1);
        }

        let value = self.interpolation(id).map(|i| self.compute(i));
        if let Some(interp) = self.interpolation_mut(id) {
            interp.attached = true;
            interp.active = active;
            if let Some(value) = value {
                interp.value = value;
            }
        }
        self.set_priority(id, priority);
        self.start_interpolation(id);
    }

    pub(crate) fn detach_interpolation(&mut self, id: NodeId) {
        let Some(interp) = self.interpolation_mut(id) else {
            return;
        };
        interp.attached = false;
        interp.active.clear();
        let sources = interp.sources.clone();
        for source in sources {
            self.remove_child(source, Observer::Node(id));
        }
        self.interpolation_idle(id);
    }

    pub(crate) fn interpolation_observed(&mut self, id: NodeId, source: NodeId, event: &NodeEvent) {
        match event {
            NodeEvent::Change { idle: true, .. } => self.advance_interpolation(id),
            NodeEvent::Change { idle: false, .. } => {
                if let Some(interp) = self.interpolation_mut(id) {
                    interp.active.insert(source);
                }
                self.start_interpolation(id);
            }
            NodeEvent::Idle => {
                if let Some(interp) = self.interpolation_mut(id) {
                    interp.active.remove(&source);
                }
            }
            NodeEvent::Priority(_) => {
                let sources = match self.interpolation(id) {
                    Some(interp) => interp.sources.clone(),
                    None => return,
                };
                let priority = sources
                    .iter()
                    .map(|s| self.priority(*s) + 1)
                    .fold(1, i32::max);
                self.set_priority(id, priority);
            }
            NodeEvent::Reset { .. } => {}
        }
    }

    pub(crate) fn insert_interpolation(&mut self, sources: SmallVec<[NodeId; 2]>, calc: Calc) -> NodeId {
        let priority = sources
            .iter()
            .map(|s| self.priority(*s) + 1)
            .fold(1, i32::max);
        let mut state = InterpolationState {
            sources,
            calc,
            value: Value::default(),
            idle: true,
            active: FxHashSet::default(),
            attached: false,
        };
        state.value = self.compute(&state);
        self.nodes.insert(Node {
            base: NodeBase {
                children: SmallVec::new(),
                priority,
            },
            kind: NodeKind::Interpolation(Box::new(state)),
        })
    }

    pub(crate) fn subscribe(&mut self, node: NodeId, callback: Rc<dyn Fn(&Value)>) -> Result<ListenerId> {
        if !self.nodes.contains_key(node) {
            return Err(AnimationError::UnknownNode);
        }
        let listener = self.listeners.insert(Listener { node, callback });
        self.add_child(node, Observer::Listener(listener));
        Ok(listener)
    }

    pub(crate) fn unsubscribe(&mut self, listener: ListenerId) {
        if let Some(Listener { node, .. }) = self.listeners.remove(listener) {
            self.remove_child(node, Observer::Listener(listener));
        }
    }

    /// Drop an interpolation and its subscriptions
    pub(crate) fn dispose_interpolation(&mut self, id: NodeId) {
        if self.interpolation(id).is_some_and(|i| i.attached) {
            self.detach_interpolation(id);
        }
        self.listeners.retain(|_, l| l.node != id);
        self.remove_node(id);
    }
}

/// A graph node: something with a value, a priority and observers
pub trait AnimatableNode {
    fn node_id(&self) -> NodeId;
    fn scheduler(&self) -> &SchedulerHandle;

    /// The current value
    fn try_get(&self) -> Result<Value> {
        let id = self.node_id();
        self.scheduler()
            .read(|rt| rt.current_value(id))?
            .ok_or(AnimationError::Disposed)
    }

    /// The current value, or the default value when it cannot be read
    fn get(&self) -> Value {
        self.try_get().unwrap_or_else(|err| {
            tracing::warn!(%err, "reading animated value failed");
            Value::default()
        })
    }

    fn priority(&self) -> i32 {
        let id = self.node_id();
        self.scheduler().read(|rt| rt.priority(id)).unwrap_or(0)
    }

    /// Not animating (paused springs are idle too)
    fn idle(&self) -> bool {
        let id = self.node_id();
        self.scheduler()
            .read(|rt| rt.is_node_idle(id))
            .unwrap_or(true)
    }

    /// Call `f` with every new value until the subscription is removed
    fn on_change(&self, f: impl Fn(&Value) + 'static) -> Result<Subscription>
    where
        Self: Sized,
    {
        let node = self.node_id();
        let listener = self.scheduler().with(|rt| rt.subscribe(node, Rc::new(f)))??;
        Ok(Subscription {
            sched: self.scheduler().clone(),
            listener,
        })
    }

    /// Derive a node computing `f` over this one
    fn to(&self, f: impl Fn(&Value) -> Value + 'static) -> Result<Interpolation>
    where
        Self: Sized,
    {
        Interpolation::new(self.scheduler(), smallvec::smallvec![self.node_id()], {
            Rc::new(move |inputs: &[Value]| f(&inputs[0]))
        })
    }

    /// Derive a node mapping this one through a range config
    fn to_range(&self, config: RangeConfig) -> Result<Interpolation>
    where
        Self: Sized,
    {
        let ctx = self.scheduler().context()?;
        let interpolator = Interpolator::new(&config, ctx.string_interpolator())?;
        self.to(move |value| interpolator.apply(value))
    }
}

/// A registered `on_change` callback
#[must_use = "the listener stays registered until `unsubscribe` is called"]
#[derive(Debug)]
pub struct Subscription {
    sched: SchedulerHandle,
    listener: ListenerId,
}

impl Subscription {
    pub fn unsubscribe(self) -> Result<()> {
        let listener = self.listener;
        self.sched.with(|rt| rt.unsubscribe(listener))
    }
}

/// A memoized node computing a pure function of its sources
#[derive(Clone, Debug)]
pub struct Interpolation {
    sched: SchedulerHandle,
    id: NodeId,
}

impl Interpolation {
    fn new(sched: &SchedulerHandle, sources: SmallVec<[NodeId; 2]>, calc: Calc) -> Result<Self> {
        let id = sched.with(|rt| rt.insert_interpolation(sources, calc))?;
        Ok(Self {
            sched: sched.clone(),
            id,
        })
    }

    /// Derive a node from several sources; `f` receives their values in
    /// order
    pub fn combine<F>(sources: &[&dyn AnimatableNode], f: F) -> Result<Self>
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        let first = sources
            .first()
            .ok_or_else(|| AnimationError::InvalidRange("no sources to combine".into()))?;
        let ids = sources.iter().map(|s| s.node_id()).collect();
        Self::new(first.scheduler(), ids, Rc::new(f))
    }

    /// Remove this node. Observers stop receiving changes.
    pub fn dispose(&self) -> Result<()> {
        let id = self.id;
        self.sched.with(|rt| rt.dispose_interpolation(id))
    }
}

impl AnimatableNode for Interpolation {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn scheduler(&self) -> &SchedulerHandle {
        &self.sched
    }
}
