//! Dependency graph
//!
//! Nodes live in an arena owned by the scheduler runtime and are addressed by
//! id. Edges point from a source to its observers: a node lists who listens to
//! it, never who it listens to, so dropping a handle cannot leak a cycle.
//!
//! Every node carries a priority. A node's priority is always greater than
//! the priority of each node it reads from, which lets the frame loop advance
//! the whole graph in one pass sorted by priority.

use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::value::Value;

new_key_type! {
    /// Identifier of a node in the animation graph
    pub struct NodeId;
    /// Identifier of a controller
    pub struct ControllerId;
    /// Identifier of an `on_change` subscription
    pub struct ListenerId;
}

/// Something notified when a node changes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Observer {
    Node(NodeId),
    Controller(ControllerId),
    Listener(ListenerId),
}

/// An event a node sends to its observers
#[derive(Clone, Debug, PartialEq)]
pub enum NodeEvent {
    /// The value changed; `idle` is set when this is the final change of a run
    Change { value: Value, idle: bool },
    /// The node's priority changed
    Priority(i32),
    /// The node restarted toward a new goal
    Reset { goal: Value },
    /// The node stopped animating
    Idle,
}

/// State shared by every node kind
#[derive(Debug, Default)]
pub(crate) struct NodeBase {
    pub children: SmallVec<[Observer; 2]>,
    pub priority: i32,
}

impl NodeBase {
    /// Register an observer. Returns `true` when it is the first one.
    pub fn add_child(&mut self, observer: Observer) -> bool {
        if self.children.contains(&observer) {
            return false;
        }
        self.children.push(observer);
        self.children.len() == 1
    }

    /// Unregister an observer. Returns `true` when none remain.
    pub fn remove_child(&mut self, observer: Observer) -> bool {
        let before = self.children.len();
        self.children.retain(|o| *o != observer);
        before != self.children.len() && self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_first_and_last_child() {
        let mut ids: SlotMap<ListenerId, ()> = SlotMap::with_key();
        let a = Observer::Listener(ids.insert(()));
        let b = Observer::Listener(ids.insert(()));

        let mut base = NodeBase::default();
        assert!(base.add_child(a));
        assert!(!base.add_child(b));
        assert!(!base.add_child(a));
        assert_eq!(base.children.len(), 2);

        assert!(!base.remove_child(a));
        assert!(!base.remove_child(a));
        assert!(base.remove_child(b));
        assert!(base.children.is_empty());
    }
}
