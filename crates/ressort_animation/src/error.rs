//! Animation error types

use thiserror::Error;

use crate::value::ValueKind;

/// Errors raised by the animation graph.
///
/// Interruptions (stop, cancel, a newer script taking over) are not errors;
/// they resolve into an [`AnimationResult`](crate::AnimationResult).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimationError {
    /// The goal needs a different node representation than the one allocated
    #[error("Cannot animate between {from} and {to} without `immediate`")]
    TypeMismatch { from: ValueKind, to: ValueKind },

    /// The value was disposed and can no longer be animated
    #[error("Animated value was disposed")]
    Disposed,

    /// The handle outlived the scheduler that owns the graph
    #[error("Animation scheduler was dropped")]
    SchedulerDropped,

    /// A tick or mutation was attempted while the scheduler is mid-pass
    #[error("Animation scheduler is busy: {0}")]
    Reentrant(&'static str),

    /// A text goal was given but no string interpolator was injected
    #[error("No string interpolator configured for text value {0:?}")]
    MissingStringInterpolator(String),

    /// The node id does not exist in the graph
    #[error("Unknown animation node")]
    UnknownNode,

    /// Interpolation ranges are malformed
    #[error("Invalid interpolation range: {0}")]
    InvalidRange(String),
}

/// Result type for animation operations
pub type Result<T> = std::result::Result<T, AnimationError>;
