//! Change notifications emitted by the schema graph.

use crate::model::{NodeId, NodeType, PopulationState, Property, PropertyValue};

/// Handle returned by [`SchemaGraph::subscribe`](crate::SchemaGraph::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// A committed property write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    /// Node that changed.
    pub node: NodeId,
    /// Its type at the time of the change.
    pub node_type: NodeType,
    /// Property that changed.
    pub property: Property,
    /// Value before the write.
    pub old: PropertyValue,
    /// Value after the write.
    pub new: PropertyValue,
}

/// One committed mutation or scope marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// A node was attached as an owned child.
    ChildInserted {
        parent: NodeId,
        child: NodeId,
        index: usize,
    },
    /// An owned child was detached.
    ChildRemoved {
        parent: NodeId,
        child: NodeId,
        index: usize,
    },
    /// A relationship was linked into an imported-keys folder.
    LinkInserted {
        parent: NodeId,
        target: NodeId,
        index: usize,
    },
    /// A relationship link was removed.
    LinkRemoved {
        parent: NodeId,
        target: NodeId,
        index: usize,
    },
    /// A property value changed.
    PropertyChanged(PropertyChange),
    /// A compound scope was opened.
    CompoundStarted { label: String },
    /// The innermost compound scope was closed.
    CompoundEnded,
    /// Population of `node` began; events until the matching finish belong to it.
    PopulationStarted { node: NodeId },
    /// Population of `node` ended in `state`.
    PopulationFinished {
        node: NodeId,
        state: PopulationState,
    },
}

impl GraphEvent {
    /// Whether this event changes the tree or a property.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            GraphEvent::CompoundStarted { .. }
                | GraphEvent::CompoundEnded
                | GraphEvent::PopulationStarted { .. }
                | GraphEvent::PopulationFinished { .. }
        )
    }
}

/// Receives graph events synchronously after each committed mutation.
///
/// Listeners only observe; they get no access to the graph and must not
/// block.
pub trait GraphListener: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &GraphEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_mutation() {
        let node = NodeId(1);
        assert!(GraphEvent::ChildInserted {
            parent: node,
            child: NodeId(2),
            index: 0
        }
        .is_mutation());
        assert!(!GraphEvent::CompoundEnded.is_mutation());
        assert!(!GraphEvent::PopulationStarted { node }.is_mutation());
    }
}
