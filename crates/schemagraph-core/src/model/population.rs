//! Lazy population of subtrees.

use serde::{Deserialize, Serialize};

use super::graph::SchemaGraph;
use super::node::{FolderProps, FolderType, NodeId, NodeKind};
use crate::error::PopulationError;
use crate::progress::ProgressSink;

/// Whether a node's children reflect a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PopulationState {
    /// Children are complete.
    Populated,
    /// Children have not been fetched yet.
    Unpopulated,
    /// The last fetch failed; an exception placeholder is attached.
    PopulationFailed,
}

impl PopulationState {
    /// Persisted `populated` flag for this state.
    pub fn as_flag(self) -> bool {
        self == PopulationState::Populated
    }
}

/// A node to be attached by population, with its own children.
#[derive(Debug, Clone)]
pub struct NodeTemplate {
    /// Variant payload.
    pub kind: NodeKind,
    /// Population state of the new node.
    pub state: PopulationState,
    /// Children to attach below it.
    pub children: Vec<NodeTemplate>,
}

impl NodeTemplate {
    /// A populated leaf or empty container.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            state: PopulationState::Populated,
            children: Vec::new(),
        }
    }

    /// A container whose own children will be fetched later.
    pub fn unpopulated(kind: NodeKind) -> Self {
        Self {
            kind,
            state: PopulationState::Unpopulated,
            children: Vec::new(),
        }
    }

    /// Add a child template.
    pub fn with_child(mut self, child: NodeTemplate) -> Self {
        self.children.push(child);
        self
    }

    /// Complete a table template with its three folders.
    ///
    /// Folders already present are kept; missing ones are added unpopulated.
    pub(crate) fn normalize_table(&mut self) {
        if !matches!(self.kind, NodeKind::Table(_)) {
            return;
        }
        for folder_type in FolderType::ALL {
            let present = self.children.iter().any(|c| {
                matches!(&c.kind, NodeKind::Folder(f) if f.folder_type == folder_type)
            });
            if !present {
                self.children.push(NodeTemplate::unpopulated(NodeKind::Folder(
                    FolderProps::new(folder_type),
                )));
            }
        }
        self.children.sort_by_key(|c| match &c.kind {
            NodeKind::Folder(f) => f.folder_type.code(),
            _ => i32::MAX,
        });
    }
}

/// Supplies the children of an unpopulated node on demand.
///
/// Implementations typically read live database metadata. The graph calls
/// [`Populator::populate`] with shared access only; the returned templates
/// are attached by the graph itself inside a population bracket.
pub trait Populator: Send + Sync {
    /// Fetch the children of `node`.
    fn populate(
        &self,
        graph: &SchemaGraph,
        node: NodeId,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<NodeTemplate>, PopulationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TableProps;

    #[test]
    fn test_normalize_table_adds_missing_folders() {
        let mut template = NodeTemplate::new(NodeKind::Table(TableProps::new("t")))
            .with_child(NodeTemplate::new(NodeKind::Folder(FolderProps::new(
                FolderType::ExportedKeys,
            ))));

        template.normalize_table();

        let types: Vec<_> = template
            .children
            .iter()
            .map(|c| match &c.kind {
                NodeKind::Folder(f) => (f.folder_type, c.state),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            types,
            vec![
                (FolderType::Columns, PopulationState::Unpopulated),
                (FolderType::ImportedKeys, PopulationState::Unpopulated),
                (FolderType::ExportedKeys, PopulationState::Populated),
            ]
        );
    }

    #[test]
    fn test_flag() {
        assert!(PopulationState::Populated.as_flag());
        assert!(!PopulationState::PopulationFailed.as_flag());
    }
}
