//! Controller update props

use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::config::ConfigUpdate;
use crate::result::AnimationResult;
use crate::runner::Script;
use crate::spring::Goal;
use crate::value::ValueMap;

use super::Controller;

/// Goals per key
pub type GoalMap = IndexMap<String, Goal>;

/// Batched controller event: the result, the controller, and its item
pub type ControllerEventFn = Rc<dyn Fn(&AnimationResult<ValueMap>, &Controller, Option<&dyn Any>)>;

/// Selects keys for a per-key flag
#[derive(Clone)]
pub enum KeyMatch {
    All(bool),
    Keys(Vec<String>),
    Predicate(Rc<dyn Fn(&str) -> bool>),
}

impl KeyMatch {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyMatch::All(all) => *all,
            KeyMatch::Keys(keys) => keys.iter().any(|k| k == key),
            KeyMatch::Predicate(f) => f(key),
        }
    }
}

impl fmt::Debug for KeyMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMatch::All(all) => f.debug_tuple("All").field(all).finish(),
            KeyMatch::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
            KeyMatch::Predicate(_) => write!(f, "Predicate"),
        }
    }
}

impl From<bool> for KeyMatch {
    fn from(all: bool) -> Self {
        KeyMatch::All(all)
    }
}

/// Milliseconds before an update applies
#[derive(Clone)]
pub enum Delay {
    Fixed(f64),
    /// Each key waits on its own
    PerKey(Rc<dyn Fn(&str) -> f64>),
}

impl Delay {
    pub(crate) fn fixed(&self) -> Option<f64> {
        match self {
            Delay::Fixed(ms) => Some(*ms),
            Delay::PerKey(_) => None,
        }
    }
}

impl fmt::Debug for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delay::Fixed(ms) => f.debug_tuple("Fixed").field(ms).finish(),
            Delay::PerKey(_) => write!(f, "PerKey"),
        }
    }
}

/// Config shared by every key, or computed per key
#[derive(Clone)]
pub enum ConfigProp {
    Shared(ConfigUpdate),
    PerKey(Rc<dyn Fn(&str) -> ConfigUpdate>),
}

impl ConfigProp {
    pub(crate) fn resolve(&self, key: &str) -> ConfigUpdate {
        match self {
            ConfigProp::Shared(config) => config.clone(),
            ConfigProp::PerKey(f) => f(key),
        }
    }
}

impl fmt::Debug for ConfigProp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigProp::Shared(config) => f.debug_tuple("Shared").field(config).finish(),
            ConfigProp::PerKey(_) => write!(f, "PerKey"),
        }
    }
}

impl<T: Into<ConfigUpdate>> From<T> for ConfigProp {
    fn from(config: T) -> Self {
        ConfigProp::Shared(config.into())
    }
}

/// Where a controller update goes
#[derive(Clone)]
pub enum ControllerTo {
    Values(GoalMap),
    Script(Script<Controller>),
    Chain(Rc<[ControllerProps]>),
}

impl fmt::Debug for ControllerTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerTo::Values(values) => f.debug_tuple("Values").field(values).finish(),
            ControllerTo::Script(script) => fmt::Debug::fmt(script, f),
            ControllerTo::Chain(chain) => write!(f, "Chain({} steps)", chain.len()),
        }
    }
}

/// Batched event callbacks of a controller
#[derive(Clone, Default)]
pub struct ControllerCallbacks {
    pub on_start: Option<ControllerEventFn>,
    pub on_change: Option<ControllerEventFn>,
    pub on_rest: Option<ControllerEventFn>,
}

impl ControllerCallbacks {
    pub(crate) fn overlay(&mut self, other: &ControllerCallbacks) {
        if other.on_start.is_some() {
            self.on_start = other.on_start.clone();
        }
        if other.on_change.is_some() {
            self.on_change = other.on_change.clone();
        }
        if other.on_rest.is_some() {
            self.on_rest = other.on_rest.clone();
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.on_start.is_none() && self.on_change.is_none() && self.on_rest.is_none()
    }
}

impl fmt::Debug for ControllerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerCallbacks")
            .field("on_start", &self.on_start.is_some())
            .field("on_change", &self.on_change.is_some())
            .field("on_rest", &self.on_rest.is_some())
            .finish()
    }
}

/// One update of a controller. Unset fields keep their current state.
#[derive(Clone, Debug, Default)]
pub struct ControllerProps {
    pub to: Option<ControllerTo>,
    pub from: Option<GoalMap>,
    pub config: Option<ConfigProp>,
    pub immediate: Option<KeyMatch>,
    pub reset: Option<KeyMatch>,
    pub reverse: bool,
    /// Stop every key and resolve as cancelled
    pub cancel: bool,
    pub pause: Option<bool>,
    pub delay: Option<Delay>,
    /// Only these keys are affected
    pub keys: Option<Vec<String>>,
    /// Remember `config`, `immediate` and callbacks for later updates
    pub default: bool,
    pub callbacks: ControllerCallbacks,
}

impl ControllerProps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Animate each key toward its goal
    pub fn to<K, G>(values: impl IntoIterator<Item = (K, G)>) -> Self
    where
        K: Into<String>,
        G: Into<Goal>,
    {
        Self {
            to: Some(ControllerTo::Values(collect_goals(values))),
            ..Self::default()
        }
    }

    /// Drive the controller with an async script
    pub fn script(script: Script<Controller>) -> Self {
        Self {
            to: Some(ControllerTo::Script(script)),
            ..Self::default()
        }
    }

    /// Run updates in order
    pub fn chain(steps: impl IntoIterator<Item = ControllerProps>) -> Self {
        Self {
            to: Some(ControllerTo::Chain(steps.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn start_from<K, G>(mut self, values: impl IntoIterator<Item = (K, G)>) -> Self
    where
        K: Into<String>,
        G: Into<Goal>,
    {
        self.from = Some(collect_goals(values));
        self
    }

    pub fn config(mut self, config: impl Into<ConfigProp>) -> Self {
        self.config = Some(config.into());
        self
    }

    pub fn config_per_key(mut self, f: impl Fn(&str) -> ConfigUpdate + 'static) -> Self {
        self.config = Some(ConfigProp::PerKey(Rc::new(f)));
        self
    }

    pub fn immediate(mut self, immediate: impl Into<KeyMatch>) -> Self {
        self.immediate = Some(immediate.into());
        self
    }

    pub fn reset(mut self, reset: impl Into<KeyMatch>) -> Self {
        self.reset = Some(reset.into());
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn cancel(mut self, cancel: bool) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn pause(mut self, pause: bool) -> Self {
        self.pause = Some(pause);
        self
    }

    pub fn delay(mut self, delay_ms: f64) -> Self {
        self.delay = Some(Delay::Fixed(delay_ms));
        self
    }

    pub fn delay_per_key(mut self, f: impl Fn(&str) -> f64 + 'static) -> Self {
        self.delay = Some(Delay::PerKey(Rc::new(f)));
        self
    }

    pub fn keys<K: Into<String>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn on_start(
        mut self,
        f: impl Fn(&AnimationResult<ValueMap>, &Controller, Option<&dyn Any>) + 'static,
    ) -> Self {
        self.callbacks.on_start = Some(Rc::new(f));
        self
    }

    pub fn on_change(
        mut self,
        f: impl Fn(&AnimationResult<ValueMap>, &Controller, Option<&dyn Any>) + 'static,
    ) -> Self {
        self.callbacks.on_change = Some(Rc::new(f));
        self
    }

    pub fn on_rest(
        mut self,
        f: impl Fn(&AnimationResult<ValueMap>, &Controller, Option<&dyn Any>) + 'static,
    ) -> Self {
        self.callbacks.on_rest = Some(Rc::new(f));
        self
    }

    pub(crate) fn goals(&self) -> Option<&GoalMap> {
        match &self.to {
            Some(ControllerTo::Values(values)) => Some(values),
            _ => None,
        }
    }

    pub(crate) fn is_async(&self) -> bool {
        matches!(
            self.to,
            Some(ControllerTo::Script(_)) | Some(ControllerTo::Chain(_))
        )
    }

    /// Every key named by `to`, `from` or `keys`
    pub(crate) fn named_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        let named = self
            .goals()
            .into_iter()
            .flat_map(|g| g.keys())
            .chain(self.from.iter().flat_map(|f| f.keys()))
            .chain(self.keys.iter().flatten());
        for key in named {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// The part of this update that concerns one key
    pub(crate) fn for_key(&self, key: &str) -> ControllerProps {
        let pick = |map: &GoalMap| -> GoalMap {
            map.iter()
                .filter(|(k, _)| k.as_str() == key)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        let mut props = self.clone();
        if let Some(goals) = self.goals() {
            props.to = Some(ControllerTo::Values(pick(goals)));
        }
        props.from = self.from.as_ref().map(pick);
        props.keys = Some(vec![key.to_string()]);
        props
    }
}

impl From<ControllerTo> for ControllerProps {
    fn from(to: ControllerTo) -> Self {
        Self {
            to: Some(to),
            ..Self::default()
        }
    }
}

impl From<GoalMap> for ControllerProps {
    fn from(values: GoalMap) -> Self {
        ControllerTo::Values(values).into()
    }
}

fn collect_goals<K, G>(values: impl IntoIterator<Item = (K, G)>) -> GoalMap
where
    K: Into<String>,
    G: Into<Goal>,
{
    values
        .into_iter()
        .map(|(k, g)| (k.into(), g.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_match() {
        assert!(KeyMatch::All(true).matches("x"));
        assert!(!KeyMatch::All(false).matches("x"));
        assert!(KeyMatch::Keys(vec!["x".into()]).matches("x"));
        assert!(!KeyMatch::Keys(vec!["x".into()]).matches("y"));
        assert!(KeyMatch::Predicate(Rc::new(|k| k.starts_with('o'))).matches("opacity"));
    }

    #[test]
    fn test_for_key_splits_goals() {
        let props = ControllerProps::to([("x", 1.0), ("y", 2.0)]).start_from([("x", 0.0)]);
        assert_eq!(props.named_keys(), vec!["x".to_string(), "y".to_string()]);

        let y = props.for_key("y");
        assert_eq!(y.goals().map(|g| g.len()), Some(1));
        assert_eq!(y.goals().and_then(|g| g.get("y")), Some(&Goal::from(2.0)));
        assert_eq!(y.from.as_ref().map(|f| f.len()), Some(0));
        assert_eq!(y.keys, Some(vec!["y".to_string()]));
    }
}
