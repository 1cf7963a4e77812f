//! Range interpolation
//!
//! Maps an input through piecewise-linear segments: find the bracketing
//! segment of `range`, normalize into `[0, 1]`, apply the easing, then scale
//! into the matching segment of `output`. Inputs outside the range are
//! extended, clamped, or passed through per side.

use serde::Deserialize;
use std::fmt;
use std::rc::Rc;

use crate::context::StringInterpolatorFn;
use crate::easing::Easing;
use crate::error::{AnimationError, Result};
use crate::value::{Components, Value};

/// What happens to inputs outside the range
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrapolate {
    /// Keep following the outermost segment
    #[default]
    Extend,
    /// Pin to the outermost output
    Clamp,
    /// Return the input unchanged
    Identity,
}

/// Output stops of a range
#[derive(Clone, Debug, PartialEq)]
pub enum RangeOutput {
    Numbers(Vec<f64>),
    /// Every stop must have the same length
    Vectors(Vec<Components>),
    Text(Vec<String>),
}

impl RangeOutput {
    fn len(&self) -> usize {
        match self {
            RangeOutput::Numbers(v) => v.len(),
            RangeOutput::Vectors(v) => v.len(),
            RangeOutput::Text(v) => v.len(),
        }
    }
}

impl From<Vec<f64>> for RangeOutput {
    fn from(v: Vec<f64>) -> Self {
        RangeOutput::Numbers(v)
    }
}

impl<const N: usize> From<[f64; N]> for RangeOutput {
    fn from(v: [f64; N]) -> Self {
        RangeOutput::Numbers(v.to_vec())
    }
}

impl From<Vec<Components>> for RangeOutput {
    fn from(v: Vec<Components>) -> Self {
        RangeOutput::Vectors(v)
    }
}

impl From<Vec<String>> for RangeOutput {
    fn from(v: Vec<String>) -> Self {
        RangeOutput::Text(v)
    }
}

impl<const N: usize> From<[&str; N]> for RangeOutput {
    fn from(v: [&str; N]) -> Self {
        RangeOutput::Text(v.iter().map(|s| s.to_string()).collect())
    }
}

/// Input transform applied before the range lookup
pub type InputMap = Rc<dyn Fn(f64) -> f64>;

/// A declarative interpolation
#[derive(Clone)]
pub struct RangeConfig {
    pub range: Vec<f64>,
    pub output: RangeOutput,
    pub easing: Easing,
    pub extrapolate_left: Extrapolate,
    pub extrapolate_right: Extrapolate,
    pub map: Option<InputMap>,
}

impl fmt::Debug for RangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeConfig")
            .field("range", &self.range)
            .field("output", &self.output)
            .field("easing", &self.easing)
            .field("extrapolate_left", &self.extrapolate_left)
            .field("extrapolate_right", &self.extrapolate_right)
            .field("map", &self.map.is_some())
            .finish()
    }
}

impl RangeConfig {
    pub fn new(range: impl Into<Vec<f64>>, output: impl Into<RangeOutput>) -> Self {
        Self {
            range: range.into(),
            output: output.into(),
            easing: Easing::Linear,
            extrapolate_left: Extrapolate::Extend,
            extrapolate_right: Extrapolate::Extend,
            map: None,
        }
    }

    /// Output stops over the default `[0, 1]` range
    pub fn output(output: impl Into<RangeOutput>) -> Self {
        let output = output.into();
        let range = evenly_spaced(output.len());
        Self::new(range, output)
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Same behavior on both sides
    pub fn extrapolate(mut self, extrapolate: Extrapolate) -> Self {
        self.extrapolate_left = extrapolate;
        self.extrapolate_right = extrapolate;
        self
    }

    pub fn extrapolate_left(mut self, extrapolate: Extrapolate) -> Self {
        self.extrapolate_left = extrapolate;
        self
    }

    pub fn extrapolate_right(mut self, extrapolate: Extrapolate) -> Self {
        self.extrapolate_right = extrapolate;
        self
    }

    pub fn map(mut self, map: impl Fn(f64) -> f64 + 'static) -> Self {
        self.map = Some(Rc::new(map));
        self
    }

    fn validate(&self) -> Result<()> {
        if self.range.len() < 2 {
            return Err(AnimationError::InvalidRange(format!(
                "need at least two stops, got {}",
                self.range.len()
            )));
        }
        if self.range.len() != self.output.len() {
            return Err(AnimationError::InvalidRange(format!(
                "range has {} stops but output has {}",
                self.range.len(),
                self.output.len()
            )));
        }
        if let RangeOutput::Vectors(stops) = &self.output {
            let len = stops[0].len();
            if stops.iter().any(|s| s.len() != len) {
                return Err(AnimationError::InvalidRange(
                    "vector stops differ in length".into(),
                ));
            }
        }
        Ok(())
    }

    fn segment(&self) -> Segment {
        Segment {
            range: self.range.clone(),
            easing: self.easing,
            left: self.extrapolate_left,
            right: self.extrapolate_right,
            map: self.map.clone(),
        }
    }
}

fn evenly_spaced(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![0.0],
        n => (0..n).map(|i| i as f64 / (n - 1) as f64).collect(),
    }
}

/// The config handed to the injected string interpolator
#[derive(Clone, Debug, PartialEq)]
pub struct StringRange {
    pub range: Vec<f64>,
    pub output: Vec<String>,
    pub easing: Easing,
    pub extrapolate_left: Extrapolate,
    pub extrapolate_right: Extrapolate,
}

impl StringRange {
    pub fn new(range: Vec<f64>, output: Vec<String>) -> Self {
        Self {
            range,
            output,
            easing: Easing::Linear,
            extrapolate_left: Extrapolate::Extend,
            extrapolate_right: Extrapolate::Extend,
        }
    }
}

#[derive(Clone)]
struct Segment {
    range: Vec<f64>,
    easing: Easing,
    left: Extrapolate,
    right: Extrapolate,
    map: Option<InputMap>,
}

impl Segment {
    fn eval(&self, input: f64, outputs: &[f64]) -> f64 {
        let i = find_range(input, &self.range);
        interpolate_segment(
            input,
            (self.range[i], self.range[i + 1]),
            (outputs[i], outputs[i + 1]),
            self.easing,
            (self.left, self.right),
            self.map.as_deref(),
        )
    }
}

/// Index of the segment bracketing `input`
fn find_range(input: f64, range: &[f64]) -> usize {
    let mut i = 1;
    while i < range.len() - 1 {
        if range[i] >= input {
            break;
        }
        i += 1;
    }
    i - 1
}

fn interpolate_segment(
    input: f64,
    (input_min, input_max): (f64, f64),
    (output_min, output_max): (f64, f64),
    easing: Easing,
    (left, right): (Extrapolate, Extrapolate),
    map: Option<&dyn Fn(f64) -> f64>,
) -> f64 {
    let mut result = map.map_or(input, |m| m(input));

    if result < input_min {
        match left {
            Extrapolate::Identity => return result,
            Extrapolate::Clamp => result = input_min,
            Extrapolate::Extend => {}
        }
    }
    if result > input_max {
        match right {
            Extrapolate::Identity => return result,
            Extrapolate::Clamp => result = input_max,
            Extrapolate::Extend => {}
        }
    }

    if output_min == output_max {
        return output_min;
    }
    if input_min == input_max {
        return if input <= input_min { output_min } else { output_max };
    }

    // Infinite bounds shift instead of dividing
    if input_min == f64::NEG_INFINITY {
        result = -result;
    } else if input_max == f64::INFINITY {
        result -= input_min;
    } else {
        result = (result - input_min) / (input_max - input_min);
    }

    result = easing.apply(result);

    if output_min == f64::NEG_INFINITY {
        -result
    } else if output_max == f64::INFINITY {
        result + output_min
    } else {
        result * (output_max - output_min) + output_min
    }
}

/// A compiled range interpolation
#[derive(Clone)]
pub struct Interpolator {
    eval: Rc<dyn Fn(f64) -> Value>,
    numeric: bool,
}

impl fmt::Debug for Interpolator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpolator")
            .field("numeric", &self.numeric)
            .finish_non_exhaustive()
    }
}

impl Interpolator {
    /// Compile a range config. Text outputs need a string interpolator.
    pub fn new(config: &RangeConfig, strings: Option<&StringInterpolatorFn>) -> Result<Self> {
        config.validate()?;
        let segment = config.segment();

        let (eval, numeric): (Rc<dyn Fn(f64) -> Value>, bool) = match &config.output {
            RangeOutput::Numbers(outputs) => {
                let outputs = outputs.clone();
                (
                    Rc::new(move |x| Value::Number(segment.eval(x, &outputs))),
                    true,
                )
            }
            RangeOutput::Vectors(stops) => {
                let columns: Vec<Vec<f64>> = (0..stops[0].len())
                    .map(|c| stops.iter().map(|s| s[c]).collect())
                    .collect();
                (
                    Rc::new(move |x| {
                        Value::Vector(columns.iter().map(|col| segment.eval(x, col)).collect())
                    }),
                    false,
                )
            }
            RangeOutput::Text(outputs) => {
                let factory = strings.ok_or_else(|| {
                    AnimationError::MissingStringInterpolator(outputs.join(", "))
                })?;
                let text = factory(&StringRange {
                    range: config.range.clone(),
                    output: outputs.clone(),
                    easing: config.easing,
                    extrapolate_left: config.extrapolate_left,
                    extrapolate_right: config.extrapolate_right,
                });
                let map = config.map.clone();
                (
                    Rc::new(move |x| Value::Text(text(map.as_ref().map_or(x, |m| m(x))))),
                    false,
                )
            }
        };

        Ok(Self { eval, numeric })
    }

    /// Interpolate a scalar input
    pub fn eval(&self, input: f64) -> Value {
        (self.eval)(input)
    }

    /// Interpolate a source value.
    ///
    /// Vector inputs map component-wise when the output is numeric. Text
    /// inputs pass through unchanged.
    pub fn apply(&self, input: &Value) -> Value {
        match input {
            Value::Number(n) => self.eval(*n),
            Value::Vector(v) if self.numeric => Value::Vector(
                v.iter()
                    .map(|c| self.eval(*c).as_number().unwrap_or(*c))
                    .collect(),
            ),
            Value::Vector(v) => self.eval(v.first().copied().unwrap_or(0.0)),
            Value::Text(_) => input.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(config: RangeConfig, input: f64) -> f64 {
        Interpolator::new(&config, None)
            .unwrap()
            .eval(input)
            .as_number()
            .unwrap()
    }

    #[test]
    fn test_linear_segments() {
        let config = RangeConfig::new([0.0, 0.5, 1.0], [0.0, 100.0, 0.0]);
        assert_eq!(eval(config.clone(), 0.25), 50.0);
        assert_eq!(eval(config.clone(), 0.5), 100.0);
        assert_eq!(eval(config, 0.75), 50.0);
    }

    #[test]
    fn test_extrapolation_modes() {
        let base = RangeConfig::new([0.0, 1.0], [0.0, 10.0]);
        assert_eq!(eval(base.clone(), 2.0), 20.0);
        assert_eq!(eval(base.clone().extrapolate(Extrapolate::Clamp), 2.0), 10.0);
        assert_eq!(eval(base.clone().extrapolate(Extrapolate::Clamp), -1.0), 0.0);
        assert_eq!(
            eval(base.clone().extrapolate_right(Extrapolate::Identity), 3.0),
            3.0
        );
        assert_eq!(eval(base.extrapolate_right(Extrapolate::Identity), -1.0), -10.0);
    }

    #[test]
    fn test_infinite_bounds() {
        let config = RangeConfig::new([0.0, f64::INFINITY], [0.0, f64::INFINITY]);
        assert_eq!(eval(config, 42.0), 42.0);

        let config = RangeConfig::new([f64::NEG_INFINITY, 0.0], [0.0, 1.0]);
        assert_eq!(eval(config, -3.0), 3.0);
    }

    #[test]
    fn test_degenerate_segments() {
        assert_eq!(eval(RangeConfig::new([0.0, 1.0], [5.0, 5.0]), 0.3), 5.0);
        assert_eq!(eval(RangeConfig::new([1.0, 1.0], [0.0, 9.0]), 0.5), 0.0);
        assert_eq!(eval(RangeConfig::new([1.0, 1.0], [0.0, 9.0]), 1.5), 9.0);
    }

    #[test]
    fn test_easing_and_map() {
        let eased = RangeConfig::new([0.0, 1.0], [0.0, 1.0]).easing(Easing::EaseInQuad);
        assert_eq!(eval(eased, 0.5), 0.25);

        let mapped = RangeConfig::new([0.0, 1.0], [0.0, 1.0]).map(|x| x / 10.0);
        assert_eq!(eval(mapped, 5.0), 0.5);
    }

    #[test]
    fn test_vector_outputs_and_inputs() {
        let stops: Vec<Components> = vec![
            smallvec::smallvec![0.0, 10.0],
            smallvec::smallvec![1.0, 20.0],
        ];
        let interp = Interpolator::new(&RangeConfig::output(stops), None).unwrap();
        assert_eq!(interp.eval(0.5), Value::from([0.5, 15.0]));

        let numeric = Interpolator::new(&RangeConfig::new([0.0, 1.0], [0.0, 100.0]), None).unwrap();
        assert_eq!(
            numeric.apply(&Value::from([0.1, 0.2])),
            Value::from([10.0, 20.0])
        );
    }

    #[test]
    fn test_invalid_ranges() {
        let mismatch = RangeConfig::new([0.0, 1.0, 2.0], [0.0, 1.0]);
        assert!(matches!(
            Interpolator::new(&mismatch, None),
            Err(AnimationError::InvalidRange(_))
        ));

        let text = RangeConfig::output(["red", "blue"]);
        assert!(matches!(
            Interpolator::new(&text, None),
            Err(AnimationError::MissingStringInterpolator(_))
        ));
    }
}
