//! Batching and diffing of queued controller updates
//!
//! Every queued update carries a logical stamp per leaf path (`to.<key>`,
//! `from.<key>`). Updates sharing a delay merge into one [`Batch`]; when a
//! batch applies, each path only overwrites the cached goal if no newer
//! update already wrote it.

use indexmap::IndexSet;
use rustc_hash::FxHashMap;

use super::props::{ControllerProps, ControllerTo, GoalMap};

/// Updates that apply together after the same delay
#[derive(Clone, Debug)]
pub(crate) struct Batch {
    pub props: ControllerProps,
    pub delay: f64,
    /// Stamp of the last write to each leaf path
    pub stamps: FxHashMap<String, u64>,
    /// Newest stamp in the batch
    pub stamp: u64,
}

pub(crate) fn to_path(key: &str) -> String {
    format!("to.{key}")
}

pub(crate) fn from_path(key: &str) -> String {
    format!("from.{key}")
}

impl Batch {
    pub fn new(props: ControllerProps, delay: f64, stamp: u64) -> Self {
        let mut stamps = FxHashMap::default();
        if let Some(goals) = props.goals() {
            for key in goals.keys() {
                stamps.insert(to_path(key), stamp);
            }
        }
        if let Some(from) = &props.from {
            for key in from.keys() {
                stamps.insert(from_path(key), stamp);
            }
        }
        Self {
            props,
            delay,
            stamps,
            stamp,
        }
    }

    /// Fold a later update into this one; its fields win
    pub fn absorb(&mut self, later: Batch) {
        let Batch {
            props: later_props,
            stamps,
            stamp,
            ..
        } = later;
        let props = &mut self.props;

        props.to = match (props.to.take(), later_props.to) {
            (Some(ControllerTo::Values(mut goals)), Some(ControllerTo::Values(newer))) => {
                goals.extend(newer);
                Some(ControllerTo::Values(goals))
            }
            (earlier, None) => earlier,
            (_, newer) => newer,
        };
        props.from = match (props.from.take(), later_props.from) {
            (Some(mut from), Some(newer)) => {
                from.extend(newer);
                Some(from)
            }
            (earlier, newer) => newer.or(earlier),
        };
        props.keys = match (props.keys.take(), later_props.keys) {
            (Some(mut keys), Some(newer)) => {
                for key in newer {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                Some(keys)
            }
            _ => None,
        };

        macro_rules! later_wins {
            ($($field:ident),*) => {
                $(if later_props.$field.is_some() { props.$field = later_props.$field; })*
            };
        }
        later_wins!(config, immediate, reset, pause);
        props.reverse |= later_props.reverse;
        props.cancel |= later_props.cancel;
        props.default |= later_props.default;
        props.callbacks.overlay(&later_props.callbacks);

        self.stamps.extend(stamps);
        self.stamp = self.stamp.max(stamp);
    }
}

/// Merge batches sharing a delay, keeping the order of first appearance
pub(crate) fn group_by_delay(batches: Vec<Batch>) -> Vec<Batch> {
    let mut groups: Vec<Batch> = Vec::new();
    for batch in batches {
        // Async updates never merge with anything
        let mergeable = !batch.props.is_async();
        match groups
            .iter_mut()
            .find(|g| mergeable && !g.props.is_async() && g.delay == batch.delay)
        {
            Some(group) => group.absorb(batch),
            None => groups.push(batch),
        }
    }
    groups
}

/// Goals of one batch that survived the timestamp check
#[derive(Debug, Default)]
pub(crate) struct Accepted {
    pub to: GoalMap,
    pub from: GoalMap,
}

impl Accepted {
    pub fn keys(&self) -> IndexSet<String> {
        self.to.keys().chain(self.from.keys()).cloned().collect()
    }
}

/// Accept every leaf of `batch` that is not older than the last write to
/// its path, recording the write and caching the goal
pub(crate) fn diff(
    batch: &Batch,
    timestamps: &mut FxHashMap<String, u64>,
    merged_to: &mut GoalMap,
    merged_from: &mut GoalMap,
) -> Accepted {
    let mut accepted = Accepted::default();
    let mut accept = |path: String| -> bool {
        let stamp = batch.stamps.get(&path).copied().unwrap_or(batch.stamp);
        match timestamps.get(&path) {
            Some(last) if *last > stamp => false,
            _ => {
                timestamps.insert(path, stamp);
                true
            }
        }
    };
    if let Some(goals) = batch.props.goals() {
        for (key, goal) in goals {
            if accept(to_path(key)) {
                merged_to.insert(key.clone(), goal.clone());
                accepted.to.insert(key.clone(), goal.clone());
            }
        }
    }
    if let Some(from) = &batch.props.from {
        for (key, goal) in from {
            if accept(from_path(key)) {
                merged_from.insert(key.clone(), goal.clone());
                accepted.from.insert(key.clone(), goal.clone());
            }
        }
    }
    accepted
}
