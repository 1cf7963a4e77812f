//! Per-component animation state
//!
//! A spring's value is backed by a [`Payload`]: one [`AnimatedScalar`] per
//! numeric component. Text values animate a single progress scalar from 0 to
//! 1 and render through the injected string interpolator.

use smallvec::SmallVec;

use crate::context::{StringInterpolatorFn, TextInterpolator};
use crate::error::{AnimationError, Result};
use crate::interpolate::StringRange;
use crate::value::{Value, ValueKind};

/// Integration state of one numeric component
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AnimatedScalar {
    pub value: f64,
    pub done: bool,
    /// Milliseconds since the current run started
    pub elapsed: f64,
    pub last_position: f64,
    pub last_velocity: Option<f64>,
    /// Initial velocity, latched on the first frame of a run
    pub v0: Option<f64>,
    pub duration_progress: f64,
}

impl AnimatedScalar {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            done: true,
            elapsed: 0.0,
            last_position: value,
            last_velocity: None,
            v0: None,
            duration_progress: 0.0,
        }
    }

    /// Prepare for a new run starting at the current value
    pub fn reset(&mut self, restart_velocity: bool) {
        self.done = false;
        self.elapsed = 0.0;
        self.duration_progress = 0.0;
        self.last_position = self.value;
        if restart_velocity {
            self.last_velocity = None;
        }
        self.v0 = None;
    }

    /// Store a new position. Returns `true` when the visible value changed.
    pub fn set_value(&mut self, position: f64, round: Option<f64>) -> bool {
        self.last_position = position;
        let mut value = position;
        if let Some(step) = round.filter(|s| *s > 0.0) {
            value = (position / step).round() * step;
            if self.done {
                self.last_position = value;
            }
        }
        if self.value == value {
            return false;
        }
        self.value = value;
        true
    }
}

/// A text value driven by a progress scalar
#[derive(Clone)]
pub(crate) struct AnimatedText {
    pub progress: AnimatedScalar,
    pub text: String,
    interpolate: Option<TextInterpolator>,
}

impl std::fmt::Debug for AnimatedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimatedText")
            .field("progress", &self.progress)
            .field("text", &self.text)
            .finish()
    }
}

impl AnimatedText {
    pub fn new(text: String) -> Self {
        Self {
            progress: AnimatedScalar::new(1.0),
            text,
            interpolate: None,
        }
    }

    /// Aim at a new text goal, starting from the current text
    pub fn retarget(&mut self, goal: &str, factory: Option<&StringInterpolatorFn>) -> Result<()> {
        let factory =
            factory.ok_or_else(|| AnimationError::MissingStringInterpolator(goal.to_string()))?;
        let range = StringRange::new(vec![0.0, 1.0], vec![self.text.clone(), goal.to_string()]);
        self.interpolate = Some(factory(&range));
        self.progress.value = 0.0;
        Ok(())
    }

    /// Re-render the text for the current progress
    pub fn sync(&mut self) -> bool {
        match &self.interpolate {
            Some(interpolate) => {
                let text = interpolate(self.progress.value);
                if text == self.text {
                    return false;
                }
                self.text = text;
                true
            }
            None => false,
        }
    }

    fn set_text(&mut self, text: &str) -> bool {
        self.interpolate = None;
        self.progress = AnimatedScalar::new(1.0);
        if self.text == text {
            return false;
        }
        self.text = text.to_string();
        true
    }
}

/// Shared traversal over the components of a value
pub(crate) trait Animated {
    fn scalars(&self) -> &[AnimatedScalar];
    fn scalars_mut(&mut self) -> &mut [AnimatedScalar];
    fn value(&self) -> Value;
    fn kind(&self) -> ValueKind;

    fn last_positions(&self) -> SmallVec<[f64; 4]> {
        self.scalars().iter().map(|s| s.last_position).collect()
    }
}

/// The backing store of a spring, one variant per value representation
#[derive(Clone, Debug)]
pub(crate) enum Payload {
    Scalar(AnimatedScalar),
    Vector(SmallVec<[AnimatedScalar; 4]>),
    Text(AnimatedText),
}

impl Payload {
    pub fn for_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => Payload::Scalar(AnimatedScalar::new(*n)),
            Value::Vector(v) => Payload::Vector(v.iter().map(|c| AnimatedScalar::new(*c)).collect()),
            Value::Text(s) => Payload::Text(AnimatedText::new(s.clone())),
        }
    }

    /// Jump to a value of the same kind. Returns `true` when it changed.
    pub fn set(&mut self, value: &Value) -> bool {
        match (self, value) {
            (Payload::Scalar(s), Value::Number(n)) => s.set_value(*n, None),
            (Payload::Vector(v), Value::Vector(values)) if v.len() == values.len() => {
                let mut changed = false;
                for (s, n) in v.iter_mut().zip(values.iter()) {
                    changed |= s.set_value(*n, None);
                }
                changed
            }
            (Payload::Text(t), Value::Text(s)) => t.set_text(s),
            _ => false,
        }
    }

    /// Prepare every component for a new run
    pub fn reset(&mut self, restart_velocity: bool) {
        for scalar in self.scalars_mut() {
            scalar.reset(restart_velocity);
        }
    }

    pub fn mark_done(&mut self) {
        for scalar in self.scalars_mut() {
            scalar.done = true;
        }
    }
}

impl Animated for Payload {
    fn scalars(&self) -> &[AnimatedScalar] {
        match self {
            Payload::Scalar(s) => std::slice::from_ref(s),
            Payload::Vector(v) => v,
            Payload::Text(t) => std::slice::from_ref(&t.progress),
        }
    }

    fn scalars_mut(&mut self) -> &mut [AnimatedScalar] {
        match self {
            Payload::Scalar(s) => std::slice::from_mut(s),
            Payload::Vector(v) => v,
            Payload::Text(t) => std::slice::from_mut(&mut t.progress),
        }
    }

    fn value(&self) -> Value {
        match self {
            Payload::Scalar(s) => Value::Number(s.value),
            Payload::Vector(v) => Value::Vector(v.iter().map(|s| s.value).collect()),
            Payload::Text(t) => Value::Text(t.text.clone()),
        }
    }

    fn kind(&self) -> ValueKind {
        match self {
            Payload::Scalar(_) => ValueKind::Number,
            Payload::Vector(v) => ValueKind::Vector(v.len()),
            Payload::Text(_) => ValueKind::Text,
        }
    }
}
