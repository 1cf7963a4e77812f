//! Animatable values
//!
//! Every node in the graph holds one of three representations: a scalar, a
//! fixed-length vector of scalars, or a text value whose numeric progress is
//! mapped through the injected string interpolator.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Numeric components of a value. Most vectors are colors or 2D/3D points.
pub type Components = SmallVec<[f64; 4]>;

/// Snapshot of a keyed set of values, in insertion order.
pub type ValueMap = IndexMap<String, Value>;

/// A value an animation can hold or converge toward
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Vector(Components),
    Text(String),
}

/// The node representation a value needs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Number,
    Vector(usize),
    Text,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Number => write!(f, "number"),
            ValueKind::Vector(len) => write!(f, "vector[{len}]"),
            ValueKind::Text => write!(f, "text"),
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Vector(v) => ValueKind::Vector(v.len()),
            Value::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Vector(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric components, one per animated scalar.
    ///
    /// Text values animate a single progress scalar, so they report `[1.0]`
    /// (the progress they converge to).
    pub fn components(&self) -> Components {
        match self {
            Value::Number(n) => smallvec::smallvec![*n],
            Value::Vector(v) => v.clone(),
            Value::Text(_) => smallvec::smallvec![1.0],
        }
    }

    /// Value equality used to decide whether a goal or output changed.
    ///
    /// Vectors compare elementwise; `NaN` never equals anything.
    pub fn same_as(&self, other: &Value) -> bool {
        self == other
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Vector(v) => {
                write!(f, "[")?;
                for (i, c) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, "]")
            }
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(v: [f64; N]) -> Self {
        Value::Vector(v.iter().copied().collect())
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v.into_iter().collect())
    }
}

impl From<Components> for Value {
    fn from(v: Components) -> Self {
        Value::Vector(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Value::from(1.0).kind(), ValueKind::Number);
        assert_eq!(Value::from([1.0, 2.0]).kind(), ValueKind::Vector(2));
        assert_eq!(Value::from("red").kind(), ValueKind::Text);
        assert_ne!(ValueKind::Vector(2), ValueKind::Vector(3));
    }

    #[test]
    fn test_elementwise_equality() {
        assert!(Value::from([1.0, 2.0]).same_as(&Value::from(vec![1.0, 2.0])));
        assert!(!Value::from([1.0, 2.0]).same_as(&Value::from([1.0, 2.5])));
        assert!(!Value::Number(f64::NAN).same_as(&Value::Number(f64::NAN)));
    }
}
