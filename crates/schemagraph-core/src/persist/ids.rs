//! Identifier map shared by the writer and the reader.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::NodeId;

/// Bidirectional map between document identifiers and graph nodes.
///
/// Identifiers are unique within one save or load pass only.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    by_id: HashMap<String, NodeId>,
    by_node: HashMap<NodeId, String>,
}

impl IdentityMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Assign the next identifier with `prefix` to `node`.
    ///
    /// The numeric suffix is the map size before insertion.
    pub fn assign(&mut self, node: NodeId, prefix: &str) -> Result<String> {
        let id = format!("{prefix}{}", self.len());
        self.insert(id.clone(), node)?;
        Ok(id)
    }

    /// Register `id` for `node`.
    ///
    /// Fails with [`Error::DuplicateIdentifier`] when either side is already
    /// registered.
    pub fn insert(&mut self, id: String, node: NodeId) -> Result<()> {
        if self.by_id.contains_key(&id) {
            return Err(Error::DuplicateIdentifier(id));
        }
        if let Some(existing) = self.by_node.get(&node) {
            return Err(Error::DuplicateIdentifier(format!(
                "{node} is already registered as {existing}"
            )));
        }
        self.by_node.insert(node, id.clone());
        self.by_id.insert(id, node);
        Ok(())
    }

    /// Identifier of `node`, if registered.
    pub fn id_of(&self, node: NodeId) -> Option<&str> {
        self.by_node.get(&node).map(String::as_str)
    }

    /// Node registered under `id`.
    pub fn node_of(&self, id: &str) -> Option<NodeId> {
        self.by_id.get(id).copied()
    }

    /// Iterate over (identifier, node) pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.by_id.iter().map(|(id, node)| (id.as_str(), *node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_uses_map_size() {
        let mut ids = IdentityMap::new();

        assert_eq!(ids.assign(NodeId(7), "DB").unwrap(), "DB0");
        assert_eq!(ids.assign(NodeId(9), "TAB").unwrap(), "TAB1");
        assert_eq!(ids.node_of("TAB1"), Some(NodeId(9)));
        assert_eq!(ids.id_of(NodeId(7)), Some("DB0"));
    }

    #[test]
    fn test_duplicate_identifier() {
        let mut ids = IdentityMap::new();
        ids.insert("COL3".into(), NodeId(1)).unwrap();

        assert!(matches!(
            ids.insert("COL3".into(), NodeId(2)),
            Err(Error::DuplicateIdentifier(_))
        ));
        assert!(ids.assign(NodeId(1), "COL").is_err());
    }
}
