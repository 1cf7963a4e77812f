//! Spring update props

use std::fmt;
use std::rc::Rc;

use crate::config::ConfigUpdate;
use crate::graph::NodeId;
use crate::interpolation::{AnimatableNode, Interpolation};
use crate::result::AnimationResult;
use crate::runner::Script;
use crate::value::Value;

use super::SpringValue;

/// A goal: a fixed value, or another node to follow
#[derive(Clone, Debug, PartialEq)]
pub enum Goal {
    Value(Value),
    /// Track the live value of another node
    Node(NodeId),
}

impl Goal {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Goal::Value(v) => Some(v),
            Goal::Node(_) => None,
        }
    }
}

impl<T: Into<Value>> From<T> for Goal {
    fn from(value: T) -> Self {
        Goal::Value(value.into())
    }
}

impl From<&SpringValue> for Goal {
    fn from(spring: &SpringValue) -> Self {
        Goal::Node(spring.node_id())
    }
}

impl From<&Interpolation> for Goal {
    fn from(interp: &Interpolation) -> Self {
        Goal::Node(interp.node_id())
    }
}

/// Where a spring update goes
#[derive(Clone)]
pub enum SpringTo {
    Goal(Goal),
    /// Drive the spring from an async script
    Script(Script<SpringValue>),
    /// Run a list of updates in order
    Chain(Rc<[SpringProps]>),
}

impl fmt::Debug for SpringTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpringTo::Goal(goal) => f.debug_tuple("Goal").field(goal).finish(),
            SpringTo::Script(script) => fmt::Debug::fmt(script, f),
            SpringTo::Chain(chain) => write!(f, "Chain({} steps)", chain.len()),
        }
    }
}

impl SpringTo {
    pub(crate) fn goal(&self) -> Option<&Goal> {
        match self {
            SpringTo::Goal(goal) => Some(goal),
            _ => None,
        }
    }

    pub(crate) fn is_async(&self) -> bool {
        !matches!(self, SpringTo::Goal(_))
    }
}

impl<T: Into<Goal>> From<T> for SpringTo {
    fn from(goal: T) -> Self {
        SpringTo::Goal(goal.into())
    }
}

/// How many more times a finished run repeats
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Loop {
    Forever,
    Times(u32),
}

impl Loop {
    /// The loop for the next iteration, if any
    pub(crate) fn next(self) -> Option<Loop> {
        match self {
            Loop::Forever => Some(Loop::Forever),
            Loop::Times(0) => None,
            Loop::Times(n) => Some(Loop::Times(n - 1)),
        }
    }
}

pub type SpringEventFn = Rc<dyn Fn(&AnimationResult, &SpringValue)>;
pub type SpringChangeFn = Rc<dyn Fn(&Value, &SpringValue)>;

/// Event callbacks of a spring
#[derive(Clone, Default)]
pub struct SpringCallbacks {
    pub on_start: Option<SpringEventFn>,
    pub on_change: Option<SpringChangeFn>,
    pub on_rest: Option<SpringEventFn>,
    pub on_pause: Option<SpringEventFn>,
    pub on_resume: Option<SpringEventFn>,
}

impl SpringCallbacks {
    /// Fill unset callbacks from `other`
    pub(crate) fn or(&mut self, other: &SpringCallbacks) {
        macro_rules! fill {
            ($($field:ident),*) => {
                $(if self.$field.is_none() { self.$field = other.$field.clone(); })*
            };
        }
        fill!(on_start, on_change, on_rest, on_pause, on_resume);
    }

    /// Fields set in `other` win
    pub(crate) fn overlay(&mut self, other: &SpringCallbacks) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field.clone(); })*
            };
        }
        take!(on_start, on_change, on_rest, on_pause, on_resume);
    }
}

impl fmt::Debug for SpringCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpringCallbacks")
            .field("on_start", &self.on_start.is_some())
            .field("on_change", &self.on_change.is_some())
            .field("on_rest", &self.on_rest.is_some())
            .field("on_pause", &self.on_pause.is_some())
            .field("on_resume", &self.on_resume.is_some())
            .finish()
    }
}

/// One update of a spring. Unset fields keep their current state.
#[derive(Clone, Debug, Default)]
pub struct SpringProps {
    pub to: Option<SpringTo>,
    pub from: Option<Goal>,
    pub config: Option<ConfigUpdate>,
    /// Jump to the goal instead of animating
    pub immediate: Option<bool>,
    /// Restart from `from` even if the goal is unchanged
    pub reset: Option<bool>,
    /// Swap `from` and `to`
    pub reverse: bool,
    pub cancel: Option<bool>,
    pub pause: Option<bool>,
    /// Milliseconds to wait before applying the update
    pub delay: Option<f64>,
    /// Remember `config`, `immediate`, `pause`, `cancel` and callbacks for
    /// later updates
    pub default: bool,
    pub looping: Option<Loop>,
    /// Alternate direction on every loop iteration
    pub loop_reverse: bool,
    pub callbacks: SpringCallbacks,
}

impl SpringProps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Animate toward `to`
    pub fn to(to: impl Into<SpringTo>) -> Self {
        Self {
            to: Some(to.into()),
            ..Self::default()
        }
    }

    /// Drive the spring with an async script
    pub fn script(script: Script<SpringValue>) -> Self {
        Self::to(SpringTo::Script(script))
    }

    /// Run updates in order
    pub fn chain(steps: impl IntoIterator<Item = SpringProps>) -> Self {
        Self::to(SpringTo::Chain(steps.into_iter().collect()))
    }

    pub fn goal(mut self, to: impl Into<SpringTo>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn start_from(mut self, from: impl Into<Goal>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn config(mut self, config: impl Into<ConfigUpdate>) -> Self {
        self.config = Some(config.into());
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = Some(immediate);
        self
    }

    pub fn reset(mut self, reset: bool) -> Self {
        self.reset = Some(reset);
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn cancel(mut self, cancel: bool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn pause(mut self, pause: bool) -> Self {
        self.pause = Some(pause);
        self
    }

    pub fn delay(mut self, delay_ms: f64) -> Self {
        self.delay = Some(delay_ms);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn looping(mut self, looping: Loop) -> Self {
        self.looping = Some(looping);
        self
    }

    pub fn loop_reverse(mut self, reverse: bool) -> Self {
        self.loop_reverse = reverse;
        self
    }

    pub fn on_start(mut self, f: impl Fn(&AnimationResult, &SpringValue) + 'static) -> Self {
        self.callbacks.on_start = Some(Rc::new(f));
        self
    }

    pub fn on_change(mut self, f: impl Fn(&Value, &SpringValue) + 'static) -> Self {
        self.callbacks.on_change = Some(Rc::new(f));
        self
    }

    pub fn on_rest(mut self, f: impl Fn(&AnimationResult, &SpringValue) + 'static) -> Self {
        self.callbacks.on_rest = Some(Rc::new(f));
        self
    }

    pub fn on_pause(mut self, f: impl Fn(&AnimationResult, &SpringValue) + 'static) -> Self {
        self.callbacks.on_pause = Some(Rc::new(f));
        self
    }

    pub fn on_resume(mut self, f: impl Fn(&AnimationResult, &SpringValue) + 'static) -> Self {
        self.callbacks.on_resume = Some(Rc::new(f));
        self
    }

    pub(crate) fn goal_ref(&self) -> Option<&Goal> {
        self.to.as_ref().and_then(SpringTo::goal)
    }

    pub(crate) fn is_async(&self) -> bool {
        self.to.as_ref().is_some_and(SpringTo::is_async)
    }

    /// The update that repeats this one after it finished
    pub(crate) fn loop_update(&self, from: Option<Goal>, to: Option<Goal>) -> Option<SpringProps> {
        let looping = self.looping?.next()?;
        let mut next = self.clone();
        next.looping = Some(looping);
        next.default = false;
        next.pause = None;
        next.delay = None;
        next.reset = Some(true);
        if self.loop_reverse {
            next.to = from.map(SpringTo::Goal);
            next.from = to;
            next.reverse = false;
        }
        Some(next)
    }
}

impl<T: Into<SpringTo>> From<T> for SpringProps {
    fn from(to: T) -> Self {
        SpringProps::to(to)
    }
}

/// Props remembered across updates
#[derive(Clone, Debug, Default)]
pub(crate) struct SpringDefaults {
    pub config: Option<ConfigUpdate>,
    pub immediate: Option<bool>,
    pub pause: Option<bool>,
    pub cancel: Option<bool>,
    pub callbacks: SpringCallbacks,
}

impl SpringDefaults {
    pub fn absorb(&mut self, props: &SpringProps) {
        if let Some(config) = &props.config {
            self.config = Some(config.clone());
        }
        if props.immediate.is_some() {
            self.immediate = props.immediate;
        }
        if props.pause.is_some() {
            self.pause = props.pause;
        }
        if props.cancel.is_some() {
            self.cancel = props.cancel;
        }
        self.callbacks.overlay(&props.callbacks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_counts_down() {
        assert_eq!(Loop::Times(2).next(), Some(Loop::Times(1)));
        assert_eq!(Loop::Times(0).next(), None);
        assert_eq!(Loop::Forever.next(), Some(Loop::Forever));
    }

    #[test]
    fn test_reverse_loop_swaps_endpoints() {
        let props = SpringProps::to(1.0)
            .start_from(0.0)
            .looping(Loop::Times(1))
            .loop_reverse(true);
        let next = props
            .loop_update(Some(Goal::from(0.0)), Some(Goal::from(1.0)))
            .unwrap();
        assert_eq!(next.goal_ref(), Some(&Goal::from(0.0)));
        assert_eq!(next.from, Some(Goal::from(1.0)));
        assert_eq!(next.reset, Some(true));
        assert_eq!(next.looping, Some(Loop::Times(0)));
        assert!(next.loop_update(None, None).is_none());
    }

    #[test]
    fn test_conversions() {
        let props: SpringProps = 2.0.into();
        assert_eq!(props.goal_ref(), Some(&Goal::Value(Value::Number(2.0))));
        let props: SpringProps = [1.0, 2.0].into();
        assert_eq!(props.goal_ref(), Some(&Goal::Value(Value::from([1.0, 2.0]))));
        assert!(!props.is_async());
    }
}
