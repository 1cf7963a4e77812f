//! Animation results

use futures::future::LocalBoxFuture;
use serde::Serialize;

use crate::error::Result;
use crate::value::Value;

/// How an animation run ended
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AnimationResult<T = Value> {
    /// The value when the run ended
    pub value: T,
    /// The value reached its goal
    pub finished: bool,
    /// The run was cancelled before it could finish
    pub cancelled: bool,
    /// Nothing needed to animate
    pub noop: bool,
}

impl<T> AnimationResult<T> {
    pub fn finished(value: T) -> Self {
        Self {
            value,
            finished: true,
            cancelled: false,
            noop: false,
        }
    }

    /// Ended early without being cancelled
    pub fn unfinished(value: T) -> Self {
        Self {
            value,
            finished: false,
            cancelled: false,
            noop: false,
        }
    }

    pub fn cancelled(value: T) -> Self {
        Self {
            value,
            finished: false,
            cancelled: true,
            noop: false,
        }
    }

    pub fn noop(value: T) -> Self {
        Self {
            value,
            finished: true,
            cancelled: false,
            noop: true,
        }
    }

    pub(crate) fn with_finished(value: T, finished: bool) -> Self {
        if finished {
            Self::finished(value)
        } else {
            Self::unfinished(value)
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AnimationResult<U> {
        AnimationResult {
            value: f(self.value),
            finished: self.finished,
            cancelled: self.cancelled,
            noop: self.noop,
        }
    }
}

/// Combine the results of several runs into one.
///
/// Cancelled if any was cancelled, noop if all were, finished if all were.
pub(crate) fn combine_results<T, U>(value: T, results: &[AnimationResult<U>]) -> AnimationResult<T> {
    if results.iter().any(|r| r.cancelled) {
        AnimationResult::cancelled(value)
    } else if results.iter().all(|r| r.noop) {
        AnimationResult::noop(value)
    } else {
        AnimationResult::with_finished(value, results.iter().all(|r| r.finished))
    }
}

/// Resolves once the animation started by a call comes to rest
pub type AnimationFuture<T = Value> = LocalBoxFuture<'static, Result<AnimationResult<T>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_results() {
        let all_finished = [AnimationResult::finished(1.0), AnimationResult::noop(2.0)];
        let combined = combine_results("x", &all_finished);
        assert!(combined.finished);
        assert!(!combined.noop);

        let one_cancelled = [
            AnimationResult::finished(1.0),
            AnimationResult::cancelled(2.0),
        ];
        assert!(combine_results((), &one_cancelled).cancelled);

        let noops = [AnimationResult::noop(1.0), AnimationResult::noop(2.0)];
        assert!(combine_results((), &noops).noop);

        let empty: [AnimationResult<f64>; 0] = [];
        assert!(combine_results((), &empty).noop);
    }
}
