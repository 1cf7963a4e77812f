//! Per-frame integration
//!
//! Each component of a spring's payload advances on its own through one of
//! three families: a fixed-duration easing curve, exponential decay, or a
//! damped spring integrated in sub-steps small enough to stay stable.

use smallvec::SmallVec;

use crate::animated::{Animated, AnimatedScalar, Payload};
use crate::config::{AnimationConfig, AnimationFamily};
use crate::graph::NodeId;
use crate::scheduler::{NodeKind, Runtime};

use super::Goal;

/// Decay rests once a frame moves less than this
const DECAY_PRECISION: f64 = 0.1;

/// Live positions of a followed node, with whether each has settled
struct Followed {
    positions: SmallVec<[f64; 4]>,
    done: SmallVec<[bool; 4]>,
}

impl Followed {
    fn position(&self, index: usize) -> f64 {
        self.positions
            .get(index)
            .or(self.positions.last())
            .copied()
            .unwrap_or(0.0)
    }

    fn is_done(&self, index: usize) -> bool {
        self.done.get(index).or(self.done.last()).copied().unwrap_or(true)
    }
}

/// Outcome of one component for one frame
struct Step {
    position: f64,
    finished: bool,
}

impl Runtime {
    fn followed(&self, source: NodeId) -> Option<Followed> {
        match &self.nodes.get(source)?.kind {
            NodeKind::Spring(spring) => {
                let payload = spring.payload.as_ref()?;
                Some(Followed {
                    positions: payload.last_positions(),
                    done: payload.scalars().iter().map(|s| s.done).collect(),
                })
            }
            NodeKind::Interpolation(interp) => {
                let positions = interp.value.components();
                let done = positions.iter().map(|_| interp.idle).collect();
                Some(Followed { positions, done })
            }
        }
    }

    /// Advance a spring by `dt` milliseconds. Returns whether it came to rest.
    pub(crate) fn advance_spring(&mut self, id: NodeId, dt: f64) -> bool {
        let followed = match self.spring(id).and_then(|s| s.anim.to.clone()) {
            Some(Goal::Node(source)) => self.followed(source),
            _ => None,
        };
        let Some(spring) = self.spring_mut(id) else {
            return true;
        };
        let anim = &spring.anim;
        let Some(payload) = spring.payload.as_mut() else {
            return true;
        };
        let is_text = matches!(payload, Payload::Text(_));
        let config = &anim.config;

        let mut idle = true;
        let mut changed = false;
        for (index, node) in payload.scalars_mut().iter_mut().enumerate() {
            if node.done {
                continue;
            }
            let to = if is_text {
                1.0
            } else if let Some(followed) = &followed {
                followed.position(index)
            } else {
                anim.to_values
                    .as_ref()
                    .and_then(|v| v.get(index).copied())
                    .unwrap_or(node.last_position)
            };

            let step = if anim.immediate {
                Some(Step {
                    position: to,
                    finished: true,
                })
            } else {
                let from = if is_text {
                    0.0
                } else {
                    anim.from_values.get(index).copied().unwrap_or(node.last_position)
                };
                integrate(node, config, &mut spring.memoized_duration, index, from, to, dt)
            };
            let Some(Step {
                position,
                mut finished,
            }) = step
            else {
                node.done = true;
                continue;
            };

            if followed.as_ref().is_some_and(|f| !f.is_done(index)) {
                finished = false;
            }
            if finished {
                node.done = true;
            } else {
                idle = false;
            }
            if node.set_value(position, config.round) {
                changed = true;
            }
        }

        if let Payload::Text(text) = payload {
            text.sync();
        }
        let current = payload.value();
        let decay = matches!(anim.config.family(), AnimationFamily::Decay(_));
        let goal = anim.to.clone();

        if idle {
            let final_value = goal.as_ref().and_then(|g| self.goal_value(g));
            if !decay {
                match final_value {
                    Some(final_value) if final_value != current || changed => {
                        if let Some(payload) = self.spring_mut(id).and_then(|s| s.payload.as_mut()) {
                            payload.set(&final_value);
                        }
                        self.spring_changed(id, final_value, false);
                    }
                    _ => {}
                }
            } else {
                if changed {
                    self.spring_changed(id, current.clone(), false);
                }
                self.focus(id, Some(Goal::Value(current)));
            }
            self.stop_spring(id, None, false);
        } else if changed {
            self.spring_changed(id, current, false);
        }
        idle
    }
}

/// Advance one component. `None` means it cannot move and is done.
fn integrate(
    node: &mut AnimatedScalar,
    config: &AnimationConfig,
    memoized_duration: &mut Option<f64>,
    index: usize,
    from: f64,
    to: f64,
    dt: f64,
) -> Option<Step> {
    if config.tension <= 0.0 {
        return None;
    }
    node.elapsed += dt;
    let elapsed = node.elapsed;
    let v0 = *node.v0.get_or_insert_with(|| config.velocity.component(index));

    let mut step = match config.family() {
        AnimationFamily::Duration(duration) => {
            let mut progress = 1.0;
            if duration > 0.0 {
                if *memoized_duration != Some(duration) {
                    // A changed duration keeps the progress already made
                    *memoized_duration = Some(duration);
                    if node.duration_progress > 0.0 {
                        node.elapsed = duration * node.duration_progress + dt;
                    }
                }
                let p0 = config.progress.clamp(0.0, 1.0);
                progress = (p0 + (1.0 - p0) * (node.elapsed / duration).min(1.0)).clamp(0.0, 1.0);
                node.duration_progress = progress;
            }
            let position = from + config.easing.apply(progress) * (to - from);
            if dt > 0.0 {
                node.last_velocity = Some((position - node.last_position) / dt);
            }
            Step {
                position,
                finished: progress >= 1.0,
            }
        }
        AnimationFamily::Decay(factor) => {
            let precision = config.precision.unwrap_or(DECAY_PRECISION);
            let e = (-(1.0 - factor) * elapsed).exp();
            let position = from + v0 / (1.0 - factor) * (1.0 - e);
            node.last_velocity = Some(v0 * e);
            Step {
                position,
                finished: (node.last_position - position).abs() < precision,
            }
        }
        AnimationFamily::Spring => spring_step(node, config, v0, from, to, dt),
    };

    if step.position.is_nan() {
        tracing::warn!(from, to, "animation produced NaN, resting at the last position");
        step = Step {
            position: node.last_position,
            finished: true,
        };
    }
    Some(step)
}

/// Integrate a damped spring over `dt` in fixed sub-steps
fn spring_step(node: &mut AnimatedScalar, config: &AnimationConfig, v0: f64, from: f64, to: f64, dt: f64) -> Step {
    let precision = config.precision.unwrap_or(if from == to {
        0.005
    } else {
        ((to - from).abs() * 0.001).min(1.0)
    });
    let rest_velocity = config.rest_velocity.unwrap_or(precision);
    let can_bounce = (config.clamp || config.bounce.is_some()) && config.tension != 0.0;
    let bounce_factor = if config.clamp {
        1.0
    } else {
        config.bounce.unwrap_or(0.0)
    };
    let is_growing = if from == to { v0 > 0.0 } else { from < to };

    let w0 = (config.tension / config.mass).sqrt() / 1000.0;
    let step = (0.05 / w0).min(1.0);
    let steps = (dt / step).ceil().max(0.0) as usize;

    let mut position = node.last_position;
    let mut velocity = node.last_velocity.unwrap_or(v0);
    let mut finished = false;
    for _ in 0..steps {
        if velocity.abs() <= rest_velocity {
            finished = (to - position).abs() <= precision;
            if finished {
                break;
            }
        }
        if can_bounce {
            let bouncing = position == to || (position > to) == is_growing;
            if bouncing {
                velocity = -velocity * (1.0 - bounce_factor);
                position = to;
            }
        }
        let spring_force = -config.tension * 0.000001 * (position - to);
        let damping_force = -config.friction * 0.001 * velocity;
        let acceleration = (spring_force + damping_force) / config.mass;
        velocity += acceleration * step;
        position += velocity * step;
    }
    node.last_velocity = Some(velocity);
    Step { position, finished }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigUpdate;
    use crate::easing::Easing;

    fn run_frames(config: &AnimationConfig, from: f64, to: f64, frames: usize) -> Vec<(f64, bool)> {
        let mut node = AnimatedScalar::new(from);
        node.reset(true);
        let mut memo = None;
        let mut out = Vec::new();
        for _ in 0..frames {
            let step = integrate(&mut node, config, &mut memo, 0, from, to, 1000.0 / 60.0).unwrap();
            node.set_value(step.position, None);
            out.push((step.position, step.finished));
            if step.finished {
                break;
            }
        }
        out
    }

    #[test]
    fn test_default_spring_first_frame() {
        let frames = run_frames(&AnimationConfig::default(), 0.0, 1.0, 1);
        assert_eq!(frames[0].0, 0.022634843307857987);
    }

    #[test]
    fn test_default_spring_converges_without_overshoot() {
        let frames = run_frames(&AnimationConfig::default(), 0.0, 1.0, 200);
        assert!(frames.last().unwrap().1);
        assert!(frames.windows(2).all(|w| w[1].0 >= w[0].0));
        assert!(frames.iter().all(|(p, _)| *p <= 1.0));
        assert_eq!(frames.len(), 42);
    }

    #[test]
    fn test_wobbly_spring_overshoots() {
        let frames = run_frames(&AnimationConfig::wobbly(), 0.0, 1.0, 200);
        assert!(frames.iter().any(|(p, _)| *p > 1.1));
        assert!(frames.last().unwrap().1);
    }

    #[test]
    fn test_clamp_stops_at_goal() {
        let mut config = AnimationConfig::wobbly();
        config.merge(&ConfigUpdate::new().clamp(true), None);
        let frames = run_frames(&config, 0.0, 1.0, 200);
        assert!(frames.iter().all(|(p, _)| *p <= 1.01));
        assert_eq!(frames.last().unwrap(), &(1.0, true));
    }

    #[test]
    fn test_duration_is_linear_by_default() {
        let config = AnimationConfig::timed(100.0, Easing::Linear);
        let frames = run_frames(&config, 0.0, 10.0, 10);
        assert!((frames[0].0 - 10.0 / 6.0).abs() < 1e-9);
        assert_eq!(frames.len(), 6);
        assert_eq!(frames.last().unwrap().0, 10.0);
    }

    #[test]
    fn test_duration_starts_from_progress() {
        let mut config = AnimationConfig::timed(100.0, Easing::Linear);
        config.progress = 0.5;
        let frames = run_frames(&config, 0.0, 10.0, 1);
        let expected = 5.0 + 5.0 * (1000.0 / 60.0 / 100.0);
        assert!((frames[0].0 - expected).abs() < 1e-9);
    }

    #[test]
    fn test_decay_follows_exponential() {
        let mut config = AnimationConfig::default();
        config.merge(
            &ConfigUpdate::new()
                .decay(crate::config::Decay::Enabled(true))
                .velocity(1.0),
            None,
        );
        let frames = run_frames(&config, 0.0, 0.0, 1);
        let dt: f64 = 1000.0 / 60.0;
        let expected = 1.0 / (1.0 - 0.998) * (1.0 - (-(1.0 - 0.998) * dt).exp());
        assert!((frames[0].0 - expected).abs() < 1e-9);

        let frames = run_frames(&config, 0.0, 0.0, 2000);
        let (last, finished) = *frames.last().unwrap();
        assert!(finished);
        assert!((last - 500.0).abs() < 60.0);
    }

    #[test]
    fn test_zero_tension_is_done() {
        let mut config = AnimationConfig::default();
        config.tension = 0.0;
        let mut node = AnimatedScalar::new(0.0);
        assert!(integrate(&mut node, &config, &mut None, 0, 0.0, 1.0, 16.0).is_none());
    }
}
