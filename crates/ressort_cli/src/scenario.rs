//! Scenario file handling

use anyhow::{Context, Result};
use ressort_animation::{AnimationConfig, ConfigUpdate, SchedulerSettings, Value};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// A scenario (`*.toml`): springs to run and how to step the clock
#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Frames per second of the simulated clock
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Stop after this many frames even if something is still moving
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,
    #[serde(default, rename = "spring")]
    pub springs: Vec<SpringSpec>,
}

fn default_fps() -> f64 {
    60.0
}

fn default_max_frames() -> usize {
    600
}

/// One spring of a scenario
#[derive(Debug, Deserialize)]
pub struct SpringSpec {
    pub key: String,
    /// Starting value
    pub from: Value,
    #[serde(default)]
    pub to: Option<Value>,
    /// Key of another spring to trail instead of a fixed goal
    #[serde(default)]
    pub follow: Option<String>,
    /// Milliseconds before the spring starts
    #[serde(default)]
    pub delay: Option<f64>,
    #[serde(default)]
    pub immediate: bool,
    /// Named preset applied under `config`
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub config: Option<ConfigUpdate>,
}

impl SpringSpec {
    /// The preset with `config` on top
    pub fn resolved_config(&self) -> Result<Option<ConfigUpdate>> {
        let mut config = match self.preset.as_deref() {
            Some(name) => Some(ConfigUpdate::from(preset(name).with_context(|| {
                format!("Unknown preset `{name}` for spring `{}`", self.key)
            })?)),
            None => None,
        };
        if let Some(update) = &self.config {
            config.get_or_insert_with(ConfigUpdate::default).overlay(update);
        }
        Ok(config)
    }
}

/// Spring presets by name
pub fn preset(name: &str) -> Option<AnimationConfig> {
    match name {
        "default" => Some(AnimationConfig::default()),
        "gentle" => Some(AnimationConfig::gentle()),
        "wobbly" => Some(AnimationConfig::wobbly()),
        "stiff" => Some(AnimationConfig::stiff()),
        "slow" => Some(AnimationConfig::slow()),
        "molasses" => Some(AnimationConfig::molasses()),
        _ => None,
    }
}

impl Scenario {
    /// Load and validate a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        if self.fps.is_nan() || self.fps <= 0.0 {
            anyhow::bail!("fps must be positive, got {}", self.fps);
        }
        let mut keys = HashSet::new();
        for spring in &self.springs {
            if !keys.insert(spring.key.as_str()) {
                anyhow::bail!("Duplicate spring key `{}`", spring.key);
            }
        }
        for spring in &self.springs {
            match (&spring.to, &spring.follow) {
                (None, None) => anyhow::bail!("Spring `{}` needs `to` or `follow`", spring.key),
                (Some(_), Some(_)) => {
                    anyhow::bail!("Spring `{}` has both `to` and `follow`", spring.key)
                }
                (None, Some(leader)) if !keys.contains(leader.as_str()) => {
                    anyhow::bail!("Spring `{}` follows unknown key `{leader}`", spring.key)
                }
                (None, Some(leader)) if leader == &spring.key => {
                    anyhow::bail!("Spring `{}` cannot follow itself", spring.key)
                }
                _ => {}
            }
            spring.resolved_config()?;
        }
        Ok(())
    }

    /// Milliseconds between simulated frames
    pub fn frame_ms(&self) -> f64 {
        1000.0 / self.fps
    }
}

/// Scenario written by `ressort init`
pub fn template(name: &str) -> String {
    format!(
        r#"# {name}: a ressort animation scenario
#
# Run it with `ressort run {name}.toml`.

fps = 60
max_frames = 600

[scheduler]
max_frame_delta_ms = 64.0

[[spring]]
key = "x"
from = 0.0
to = 100.0
preset = "wobbly"

[[spring]]
key = "opacity"
from = 0.0
to = 1.0
delay = 100.0
config = {{ duration = 300.0, easing = "ease_out_cubic" }}

[[spring]]
key = "shadow"
from = 0.0
follow = "x"
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses() {
        let scenario = Scenario::parse(&template("demo")).unwrap();
        assert_eq!(scenario.springs.len(), 3);
        assert_eq!(scenario.springs[2].follow.as_deref(), Some("x"));
        assert_eq!(scenario.scheduler.max_frame_delta_ms, 64.0);
        assert!((scenario.frame_ms() - 1000.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_preset_under_config() {
        let scenario = Scenario::parse(
            r#"
            [[spring]]
            key = "x"
            from = 0.0
            to = 1.0
            preset = "stiff"
            config = { friction = 5.0 }
            "#,
        )
        .unwrap();
        let config = scenario.springs[0].resolved_config().unwrap().unwrap();
        assert_eq!(config.tension, Some(210.0));
        assert_eq!(config.friction, Some(5.0));
    }

    #[test]
    fn test_vector_values() {
        let scenario = Scenario::parse(
            r#"
            [[spring]]
            key = "pos"
            from = [0.0, 0.0]
            to = [10.0, 20.0]
            "#,
        )
        .unwrap();
        assert_eq!(scenario.springs[0].from, Value::from([0.0, 0.0]));
    }

    #[test]
    fn test_rejects_unknown_leader() {
        let err = Scenario::parse(
            r#"
            [[spring]]
            key = "a"
            from = 0.0
            follow = "b"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown key `b`"));
    }

    #[test]
    fn test_rejects_unknown_preset() {
        let err = Scenario::parse(
            r#"
            [[spring]]
            key = "a"
            from = 0.0
            to = 1.0
            preset = "springy"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("Unknown preset `springy`"));
    }
}
