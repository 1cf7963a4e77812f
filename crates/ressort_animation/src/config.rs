//! Animation configuration
//!
//! An [`AnimationConfig`] selects exactly one animation family:
//!
//! - **Spring**: `mass`, `tension`, `friction` (or `frequency` + `damping`,
//!   converted to tension/friction)
//! - **Duration**: `duration` with an `easing` curve
//! - **Decay**: exponential slowdown from an initial `velocity`
//!
//! Partial updates arrive as [`ConfigUpdate`]s. Merging one into a live config
//! discards fields of any incompatible family instead of blending them.

use serde::Deserialize;
use smallvec::SmallVec;
use std::f64::consts::PI;

use crate::easing::Easing;

/// Decay mode
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Decay {
    /// `true` selects the default factor, `false` disables decay
    Enabled(bool),
    /// Explicit per-millisecond decay factor in `(0, 1)`
    Factor(f64),
}

impl Decay {
    pub const DEFAULT_FACTOR: f64 = 0.998;

    /// The effective factor, or `None` when decay is switched off
    pub fn factor(&self) -> Option<f64> {
        match *self {
            Decay::Enabled(true) => Some(Self::DEFAULT_FACTOR),
            Decay::Enabled(false) => None,
            Decay::Factor(f) => Some(f),
        }
    }
}

/// Initial velocity, shared by all components or given per component
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Velocity {
    Uniform(f64),
    PerComponent(SmallVec<[f64; 4]>),
}

impl Velocity {
    pub fn component(&self, index: usize) -> f64 {
        match self {
            Velocity::Uniform(v) => *v,
            Velocity::PerComponent(v) => v.get(index).copied().unwrap_or(0.0),
        }
    }
}

impl Default for Velocity {
    fn default() -> Self {
        Velocity::Uniform(0.0)
    }
}

impl From<f64> for Velocity {
    fn from(v: f64) -> Self {
        Velocity::Uniform(v)
    }
}

/// The live configuration of one animation
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationConfig {
    pub mass: f64,
    pub tension: f64,
    pub friction: f64,
    pub frequency: Option<f64>,
    pub damping: f64,
    /// Initial velocity in units per millisecond
    pub velocity: Velocity,
    /// Velocity below which a spring may rest; defaults to `precision`
    pub rest_velocity: Option<f64>,
    /// Distance from the goal at which a spring may rest
    pub precision: Option<f64>,
    /// Starting progress of a duration animation, `0..=1`
    pub progress: f64,
    /// Duration in milliseconds
    pub duration: Option<f64>,
    pub easing: Easing,
    /// Stop at the goal instead of overshooting it
    pub clamp: bool,
    /// Velocity retained (as `1 - bounce`) when bouncing off the goal
    pub bounce: Option<f64>,
    pub decay: Option<Decay>,
    /// Snap produced values to multiples of this step
    pub round: Option<f64>,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            mass: 1.0,
            tension: 170.0,
            friction: 26.0,
            frequency: None,
            damping: 1.0,
            velocity: Velocity::default(),
            rest_velocity: None,
            precision: None,
            progress: 0.0,
            duration: None,
            easing: Easing::Linear,
            clamp: false,
            bounce: None,
            decay: None,
            round: None,
        }
    }
}

/// Which integrator a config selects
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimationFamily {
    Spring,
    Duration(f64),
    Decay(f64),
}

impl AnimationConfig {
    /// Gentle spring, slow to settle
    pub fn gentle() -> Self {
        Self::spring(120.0, 14.0)
    }

    /// Bouncy spring that overshoots noticeably
    pub fn wobbly() -> Self {
        Self::spring(180.0, 12.0)
    }

    /// Fast spring with little overshoot
    pub fn stiff() -> Self {
        Self::spring(210.0, 20.0)
    }

    pub fn slow() -> Self {
        Self::spring(280.0, 60.0)
    }

    pub fn molasses() -> Self {
        Self::spring(280.0, 120.0)
    }

    /// Spring with the given tension and friction at unit mass
    pub fn spring(tension: f64, friction: f64) -> Self {
        Self {
            tension,
            friction,
            ..Default::default()
        }
    }

    /// Linear-time animation of the given duration in milliseconds
    pub fn timed(duration: f64, easing: Easing) -> Self {
        Self {
            duration: Some(duration),
            easing,
            ..Default::default()
        }
    }

    pub fn family(&self) -> AnimationFamily {
        if let Some(duration) = self.duration {
            AnimationFamily::Duration(duration)
        } else if let Some(factor) = self.decay.and_then(|d| d.factor()) {
            AnimationFamily::Decay(factor)
        } else {
            AnimationFamily::Spring
        }
    }

    /// Merge a partial update into this config.
    ///
    /// `defaults` are applied underneath `update` first; fields of either that
    /// belong to a different family than the update's are dropped.
    pub fn merge(&mut self, update: &ConfigUpdate, defaults: Option<&ConfigUpdate>) {
        let update = match defaults {
            Some(defaults) => {
                let mut base = defaults.clone();
                base.sanitize_against(update);
                base.overlay(update);
                base
            }
            None => update.clone(),
        };

        self.sanitize(&update);
        self.apply(&update);

        if let Some(frequency) = self.frequency {
            let frequency = frequency.max(0.01);
            let damping = self.damping.max(0.0);
            self.tension = ((2.0 * PI) / frequency).powi(2) * self.mass;
            self.friction = (4.0 * PI * damping * self.mass) / frequency;
        }
    }

    fn sanitize(&mut self, update: &ConfigUpdate) {
        if update.decay.is_some() {
            self.duration = None;
        } else {
            let tension_config = update.tension.is_some() || update.friction.is_some();
            if tension_config
                || update.frequency.is_some()
                || update.damping.is_some()
                || update.mass.is_some()
            {
                self.duration = None;
                self.decay = None;
            }
            if tension_config {
                self.frequency = None;
            }
        }
    }

    fn apply(&mut self, update: &ConfigUpdate) {
        if let Some(v) = update.mass {
            self.mass = v;
        }
        if let Some(v) = update.tension {
            self.tension = v;
        }
        if let Some(v) = update.friction {
            self.friction = v;
        }
        if let Some(v) = update.frequency {
            self.frequency = Some(v);
        }
        if let Some(v) = update.damping {
            self.damping = v;
        }
        if let Some(v) = &update.velocity {
            self.velocity = v.clone();
        }
        if let Some(v) = update.rest_velocity {
            self.rest_velocity = Some(v);
        }
        if let Some(v) = update.precision {
            self.precision = Some(v);
        }
        if let Some(v) = update.progress {
            self.progress = v;
        }
        if let Some(v) = update.duration {
            self.duration = Some(v);
        }
        if let Some(v) = update.easing {
            self.easing = v;
        }
        if let Some(v) = update.clamp {
            self.clamp = v;
        }
        if let Some(v) = update.bounce {
            self.bounce = Some(v);
        }
        if let Some(v) = update.decay {
            self.decay = Some(v);
        }
        if let Some(v) = update.round {
            self.round = Some(v);
        }
    }
}

/// A partial config; `None` fields leave the live value untouched
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ConfigUpdate {
    pub mass: Option<f64>,
    pub tension: Option<f64>,
    pub friction: Option<f64>,
    pub frequency: Option<f64>,
    pub damping: Option<f64>,
    pub velocity: Option<Velocity>,
    pub rest_velocity: Option<f64>,
    pub precision: Option<f64>,
    pub progress: Option<f64>,
    pub duration: Option<f64>,
    pub easing: Option<Easing>,
    pub clamp: Option<bool>,
    pub bounce: Option<f64>,
    pub decay: Option<Decay>,
    pub round: Option<f64>,
}

impl ConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tension(mut self, tension: f64) -> Self {
        self.tension = Some(tension);
        self
    }

    pub fn friction(mut self, friction: f64) -> Self {
        self.friction = Some(friction);
        self
    }

    pub fn mass(mut self, mass: f64) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn frequency(mut self, frequency: f64) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn damping(mut self, damping: f64) -> Self {
        self.damping = Some(damping);
        self
    }

    pub fn velocity(mut self, velocity: impl Into<Velocity>) -> Self {
        self.velocity = Some(velocity.into());
        self
    }

    pub fn rest_velocity(mut self, rest_velocity: f64) -> Self {
        self.rest_velocity = Some(rest_velocity);
        self
    }

    pub fn precision(mut self, precision: f64) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = Some(easing);
        self
    }

    pub fn clamp(mut self, clamp: bool) -> Self {
        self.clamp = Some(clamp);
        self
    }

    pub fn bounce(mut self, bounce: f64) -> Self {
        self.bounce = Some(bounce);
        self
    }

    pub fn decay(mut self, decay: Decay) -> Self {
        self.decay = Some(decay);
        self
    }

    pub fn round(mut self, round: f64) -> Self {
        self.round = Some(round);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Drop fields of `self` whose family conflicts with `other`
    fn sanitize_against(&mut self, other: &ConfigUpdate) {
        if other.decay.is_some() {
            self.duration = None;
        } else {
            let tension_config = other.tension.is_some() || other.friction.is_some();
            if tension_config
                || other.frequency.is_some()
                || other.damping.is_some()
                || other.mass.is_some()
            {
                self.duration = None;
                self.decay = None;
            }
            if tension_config {
                self.frequency = None;
            }
        }
    }

    /// Fields set in `other` win
    pub fn overlay(&mut self, other: &ConfigUpdate) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field.clone(); })*
            };
        }
        take!(
            mass,
            tension,
            friction,
            frequency,
            damping,
            velocity,
            rest_velocity,
            precision,
            progress,
            duration,
            easing,
            clamp,
            bounce,
            decay,
            round
        );
    }
}

impl From<AnimationConfig> for ConfigUpdate {
    fn from(config: AnimationConfig) -> Self {
        Self {
            mass: Some(config.mass),
            tension: Some(config.tension),
            friction: Some(config.friction),
            frequency: config.frequency,
            damping: Some(config.damping),
            velocity: Some(config.velocity),
            rest_velocity: config.rest_velocity,
            precision: config.precision,
            progress: Some(config.progress),
            duration: config.duration,
            easing: Some(config.easing),
            clamp: Some(config.clamp),
            bounce: config.bounce,
            decay: config.decay,
            round: config.round,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnimationConfig::default();
        assert_eq!(config.tension, 170.0);
        assert_eq!(config.friction, 26.0);
        assert_eq!(config.mass, 1.0);
        assert_eq!(config.family(), AnimationFamily::Spring);
    }

    #[test]
    fn test_frequency_conversion() {
        let mut config = AnimationConfig::default();
        config.merge(&ConfigUpdate::new().frequency(0.5).damping(0.5), None);

        let expected_tension = (2.0 * PI / 0.5).powi(2);
        let expected_friction = 4.0 * PI * 0.5 / 0.5;
        assert!((config.tension - expected_tension).abs() < 1e-9);
        assert!((config.friction - expected_friction).abs() < 1e-9);
    }

    #[test]
    fn test_frequency_and_damping_are_floored() {
        let mut config = AnimationConfig::default();
        config.merge(&ConfigUpdate::new().frequency(0.0).damping(-1.0), None);

        assert!((config.tension - (2.0 * PI / 0.01).powi(2)).abs() < 1e-6);
        assert_eq!(config.friction, 0.0);
    }

    #[test]
    fn test_decay_clears_duration() {
        let mut config = AnimationConfig::default();
        config.merge(&ConfigUpdate::new().duration(300.0), None);
        assert_eq!(config.family(), AnimationFamily::Duration(300.0));

        config.merge(&ConfigUpdate::new().decay(Decay::Enabled(true)), None);
        assert_eq!(config.duration, None);
        assert_eq!(config.family(), AnimationFamily::Decay(0.998));
    }

    #[test]
    fn test_spring_fields_clear_duration_and_decay() {
        let mut config = AnimationConfig::default();
        config.merge(
            &ConfigUpdate::new()
                .duration(200.0)
                .decay(Decay::Factor(0.99)),
            None,
        );
        config.merge(&ConfigUpdate::new().tension(300.0), None);

        assert_eq!(config.duration, None);
        assert_eq!(config.decay, None);
        assert_eq!(config.tension, 300.0);
        assert_eq!(config.family(), AnimationFamily::Spring);
    }

    #[test]
    fn test_tension_clears_frequency() {
        let mut config = AnimationConfig::default();
        config.merge(&ConfigUpdate::new().frequency(1.0), None);
        assert!(config.frequency.is_some());

        config.merge(&ConfigUpdate::new().tension(100.0).friction(10.0), None);
        assert_eq!(config.frequency, None);
        assert_eq!(config.tension, 100.0);
        assert_eq!(config.friction, 10.0);
    }

    #[test]
    fn test_defaults_are_sanitized_against_update() {
        let mut config = AnimationConfig::default();
        let defaults = ConfigUpdate::new().duration(500.0);
        config.merge(&ConfigUpdate::new().tension(250.0), Some(&defaults));

        assert_eq!(config.duration, None);
        assert_eq!(config.tension, 250.0);
    }
}
