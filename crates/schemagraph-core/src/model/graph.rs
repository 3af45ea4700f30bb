//! The schema graph arena and its mutation API.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Shape changes go
//! through [`SchemaGraph::add_child`], [`SchemaGraph::remove_child`] and the
//! relationship link pair; property changes go through
//! [`SchemaGraph::set_property`]. Each committed change emits exactly one
//! [`GraphEvent`] to every subscribed listener.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::node::{
    ColumnProps, FolderProps, FolderType, Node, NodeId, NodeKind, NodeType, RelationshipProps,
    TableProps,
};
use super::population::{NodeTemplate, PopulationState, Populator};
use super::property::{Property, PropertyDescriptor, PropertyValue};
use crate::error::{Error, Result};
use crate::event::{GraphEvent, GraphListener, ListenerId, PropertyChange};
use crate::progress::ProgressSink;

/// Observable tree of schema nodes.
pub struct SchemaGraph {
    nodes: Vec<Node>,
    root: NodeId,
    listeners: Vec<(ListenerId, Arc<dyn GraphListener>)>,
    next_listener: u64,
    compounds: Vec<String>,
}

impl fmt::Debug for SchemaGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaGraph")
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .field("listeners", &self.listeners.len())
            .field("compounds", &self.compounds)
            .finish()
    }
}

impl Default for SchemaGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaGraph {
    /// Create a graph holding only the root container.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Root, PopulationState::Populated)],
            root: NodeId(0),
            listeners: Vec::new(),
            next_listener: 0,
            compounds: Vec::new(),
        }
    }

    /// The root container; its children are the source databases.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena, detached ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds only the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    // ============== Node creation ==============

    /// Create a detached, populated node.
    ///
    /// Tables are created with their three folders already attached.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let is_table = matches!(kind, NodeKind::Table(_));
        let id = self.alloc(kind, PopulationState::Populated);
        if is_table {
            self.ensure_table_folders(id, PopulationState::Populated);
        }
        id
    }

    /// Create a detached container whose children will be populated later.
    ///
    /// A table is itself always populated; its folders are the unpopulated
    /// part.
    pub fn create_unpopulated(&mut self, kind: NodeKind) -> Result<NodeId> {
        let node_type = kind.node_type();
        match node_type {
            NodeType::Table => {
                let id = self.alloc(kind, PopulationState::Populated);
                self.ensure_table_folders(id, PopulationState::Unpopulated);
                Ok(id)
            }
            NodeType::Database | NodeType::Catalog | NodeType::Schema | NodeType::Folder => {
                Ok(self.alloc(kind, PopulationState::Unpopulated))
            }
            other => Err(Error::InvalidStructure(format!(
                "{other} nodes cannot be populated lazily"
            ))),
        }
    }

    /// Create a detached table.
    pub fn create_table(&mut self, props: TableProps) -> NodeId {
        self.create(NodeKind::Table(props))
    }

    /// Allocate a node with no folder handling and no events.
    pub(crate) fn alloc(&mut self, kind: NodeKind, state: PopulationState) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind, state));
        id
    }

    /// Attach any of the three folders a table is missing, in folder order.
    pub(crate) fn ensure_table_folders(&mut self, table: NodeId, state: PopulationState) {
        for folder_type in FolderType::ALL {
            if self.folder(table, folder_type).is_none() {
                let folder = self.alloc(NodeKind::Folder(FolderProps::new(folder_type)), state);
                let index = self.nodes[table.index()]
                    .children
                    .iter()
                    .take_while(|c| {
                        matches!(&self.nodes[c.index()].kind,
                            NodeKind::Folder(f) if f.folder_type.code() < folder_type.code())
                    })
                    .count();
                self.nodes[table.index()].children.insert(index, folder);
                self.nodes[folder.index()].parent = Some(table);
            }
        }
    }

    pub(crate) fn set_state(&mut self, node: NodeId, state: PopulationState) {
        if let Some(n) = self.nodes.get_mut(node.index()) {
            n.state = state;
        }
    }

    // ============== Lookup ==============

    /// The node behind `id`.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    fn get(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.index()).ok_or(Error::UnknownNode(id))
    }

    /// Variant payload of `id`.
    pub fn kind(&self, id: NodeId) -> Result<&NodeKind> {
        Ok(&self.get(id)?.kind)
    }

    /// Variant tag of `id`.
    pub fn node_type(&self, id: NodeId) -> Result<NodeType> {
        Ok(self.get(id)?.node_type())
    }

    /// Owning parent of `id`.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Ordered children of `id`, links included. Empty for unknown ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Population state of `id`.
    pub fn population_state(&self, id: NodeId) -> Result<PopulationState> {
        Ok(self.get(id)?.state)
    }

    /// Whether `child` sits in `parent`'s children as a non-owning link.
    pub fn is_link(&self, parent: NodeId, child: NodeId) -> bool {
        self.children(parent).contains(&child) && self.parent(child) != Some(parent)
    }

    /// First owned child of `parent` whose display name is `name`.
    pub fn child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|&c| {
            self.parent(c) == Some(parent)
                && self.node(c).and_then(|n| n.kind.display_name()) == Some(name)
        })
    }

    /// Preorder walk of the owned subtree below and including `node`.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if self.node(id).is_none() {
                continue;
            }
            out.push(id);
            for &child in self.children(id).iter().rev() {
                if self.parent(child) == Some(id) {
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Whether `ancestor` owns `node` directly or transitively.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = self.parent(node);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    /// Whether `node` is reachable from the root through owned edges.
    pub fn is_attached(&self, node: NodeId) -> bool {
        node == self.root || self.is_ancestor(self.root, node)
    }

    // ============== Listeners ==============

    /// Register a listener; it sees every event emitted from now on.
    pub fn subscribe(&mut self, listener: Arc<dyn GraphListener>) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn emit(&self, event: GraphEvent) {
        for (_, listener) in &self.listeners {
            listener.on_event(&event);
        }
    }

    // ============== Compound scopes ==============

    /// Open a compound scope. Edits until the matching
    /// [`end_compound`](Self::end_compound) form one undo unit.
    pub fn begin_compound(&mut self, label: impl Into<String>) {
        let label = label.into();
        self.compounds.push(label.clone());
        self.emit(GraphEvent::CompoundStarted { label });
    }

    /// Close the innermost compound scope.
    pub fn end_compound(&mut self) -> Result<()> {
        if self.compounds.pop().is_none() {
            return Err(Error::InvalidStructure("no compound edit is open".into()));
        }
        self.emit(GraphEvent::CompoundEnded);
        Ok(())
    }

    /// Number of open compound scopes.
    pub fn compound_depth(&self) -> usize {
        self.compounds.len()
    }

    /// Run `f` inside a compound scope that is closed even when `f` fails.
    pub fn compound<T>(
        &mut self,
        label: impl Into<String>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.begin_compound(label);
        let result = f(self);
        self.end_compound()?;
        result
    }

    // ============== Tree shape ==============

    fn check_insert(
        &self,
        parent: NodeId,
        child: NodeId,
        index: usize,
        require_populated: bool,
    ) -> Result<()> {
        let p = self.get(parent)?;
        let c = self.get(child)?;

        if child == parent || self.is_ancestor(child, parent) {
            return Err(Error::InvalidStructure(format!(
                "attaching {child} under {parent} would create a cycle"
            )));
        }
        if let Some(owner) = c.parent {
            return Err(Error::InvalidStructure(format!(
                "{child} already belongs to {owner}"
            )));
        }
        if p.children.contains(&child) {
            return Err(Error::InvalidStructure(format!(
                "{child} is already a child of {parent}"
            )));
        }
        let (pt, ct) = (p.node_type(), c.node_type());
        if !pt.allowed_children().contains(&ct) {
            return Err(Error::InvalidStructure(format!(
                "{pt} nodes cannot hold {ct} children"
            )));
        }
        if let NodeKind::Folder(folder) = &p.kind {
            let expected = match ct {
                NodeType::Column => Some(FolderType::Columns),
                NodeType::Relationship => Some(FolderType::ExportedKeys),
                _ => None,
            };
            if expected.is_some_and(|e| e != folder.folder_type) {
                return Err(Error::InvalidStructure(format!(
                    "{ct} nodes do not belong in the {} folder",
                    folder.name
                )));
            }
        }
        if index > p.children.len() {
            return Err(Error::InvalidStructure(format!(
                "index {index} out of range for {parent} with {} children",
                p.children.len()
            )));
        }
        if require_populated && p.state != PopulationState::Populated {
            return Err(Error::InvalidStructure(format!(
                "{parent} is not populated"
            )));
        }
        Ok(())
    }

    fn insert_owned(&mut self, parent: NodeId, child: NodeId, index: usize) {
        self.nodes[parent.index()].children.insert(index, child);
        self.nodes[child.index()].parent = Some(parent);
        self.emit(GraphEvent::ChildInserted {
            parent,
            child,
            index,
        });
    }

    /// Attach `child` to `parent` at `index`.
    ///
    /// Fails with [`Error::InvalidStructure`] when the child already has a
    /// parent, is already present, would form a cycle, is not a legal child
    /// of the parent's variant, the index is out of range, or the parent is
    /// not populated. Exception placeholders are managed by population and
    /// cannot be attached here.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId, index: usize) -> Result<()> {
        if self.node_type(child)? == NodeType::ExceptionPlaceholder {
            return Err(Error::InvalidStructure(
                "exception placeholders are attached by population only".into(),
            ));
        }
        self.check_insert(parent, child, index, true)?;
        self.insert_owned(parent, child, index);
        Ok(())
    }

    /// Attach `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let index = self.get(parent)?.children.len();
        self.add_child(parent, child, index)
    }

    /// Attach without the populated check; used while loading documents.
    pub(crate) fn attach_loaded(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let index = self.get(parent)?.children.len();
        self.check_insert(parent, child, index, false)?;
        self.insert_owned(parent, child, index);
        Ok(())
    }

    /// Fail when a column below `node` is still mapped by an attached
    /// relationship outside `node`.
    pub(crate) fn check_unmapped(&self, node: NodeId) -> Result<()> {
        let removed: HashSet<NodeId> = self.subtree(node).into_iter().collect();
        for n in &self.nodes {
            let NodeKind::ColumnMapping {
                pk_column,
                fk_column,
            } = &n.kind
            else {
                continue;
            };
            let Some(relationship) = n.parent else {
                continue;
            };
            if self.parent(relationship).is_none() || removed.contains(&relationship) {
                continue;
            }
            if let Some(column) = [pk_column, fk_column].into_iter().find(|c| removed.contains(*c)) {
                return Err(Error::InvalidStructure(format!(
                    "{column} is mapped by {relationship}; remove the relationship first"
                )));
            }
        }
        Ok(())
    }

    /// Detach the owned child `child` from `parent`, returning its old index.
    ///
    /// The node stays in the arena so it can be reattached. A column that an
    /// attached relationship still maps cannot be removed, nor can a subtree
    /// holding one.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<usize> {
        self.get(child)?;
        let index = self
            .get(parent)?
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or_else(|| {
                Error::InvalidStructure(format!("{child} is not a child of {parent}"))
            })?;
        if self.nodes[child.index()].parent != Some(parent) {
            return Err(Error::InvalidStructure(format!(
                "{child} is linked into {parent}, not owned by it"
            )));
        }
        self.check_unmapped(child)?;
        self.nodes[parent.index()].children.remove(index);
        self.nodes[child.index()].parent = None;
        self.emit(GraphEvent::ChildRemoved {
            parent,
            child,
            index,
        });
        Ok(index)
    }

    fn check_link(&self, folder: NodeId, relationship: NodeId, index: usize) -> Result<()> {
        let f = self.get(folder)?;
        let r = self.get(relationship)?;
        match (&f.kind, &r.kind) {
            (NodeKind::Folder(props), NodeKind::Relationship { fk_table, .. })
                if props.folder_type == FolderType::ImportedKeys =>
            {
                if f.parent != Some(*fk_table) {
                    return Err(Error::InvalidStructure(format!(
                        "{relationship} can only be linked into the imported keys of {fk_table}"
                    )));
                }
            }
            _ => {
                return Err(Error::InvalidStructure(
                    "only relationships can be linked, and only into imported keys folders".into(),
                ))
            }
        }
        if f.children.contains(&relationship) {
            return Err(Error::InvalidStructure(format!(
                "{relationship} is already linked into {folder}"
            )));
        }
        if index > f.children.len() {
            return Err(Error::InvalidStructure(format!(
                "index {index} out of range for {folder} with {} children",
                f.children.len()
            )));
        }
        Ok(())
    }

    /// Link `relationship` into an imported-keys `folder` without taking
    /// ownership.
    pub fn link_child(&mut self, folder: NodeId, relationship: NodeId, index: usize) -> Result<()> {
        self.check_link(folder, relationship, index)?;
        if self.nodes[folder.index()].state != PopulationState::Populated {
            return Err(Error::InvalidStructure(format!("{folder} is not populated")));
        }
        self.insert_link(folder, relationship, index);
        Ok(())
    }

    pub(crate) fn link_loaded(&mut self, folder: NodeId, relationship: NodeId) -> Result<()> {
        let index = self.get(folder)?.children.len();
        self.check_link(folder, relationship, index)?;
        self.insert_link(folder, relationship, index);
        Ok(())
    }

    fn insert_link(&mut self, folder: NodeId, relationship: NodeId, index: usize) {
        self.nodes[folder.index()].children.insert(index, relationship);
        self.emit(GraphEvent::LinkInserted {
            parent: folder,
            target: relationship,
            index,
        });
    }

    /// Remove the link to `relationship` from `folder`, returning its index.
    pub fn unlink_child(&mut self, folder: NodeId, relationship: NodeId) -> Result<usize> {
        if !self.is_link(folder, relationship) {
            return Err(Error::InvalidStructure(format!(
                "{relationship} is not linked into {folder}"
            )));
        }
        let index = self.nodes[folder.index()]
            .children
            .iter()
            .position(|&c| c == relationship)
            .ok_or(Error::UnknownNode(relationship))?;
        self.nodes[folder.index()].children.remove(index);
        self.emit(GraphEvent::LinkRemoved {
            parent: folder,
            target: relationship,
            index,
        });
        Ok(index)
    }

    // ============== Properties ==============

    /// Current value of `property` on `node`.
    pub fn property(&self, node: NodeId, property: Property) -> Result<PropertyValue> {
        let n = self.get(node)?;
        if property == Property::Populated {
            return Ok(PropertyValue::Bool(n.state.as_flag()));
        }
        n.kind.get(property).ok_or_else(|| {
            Error::InvalidProperty(format!("{} has no property {property}", n.node_type()))
        })
    }

    /// Write `property` on `node`.
    ///
    /// Returns `Ok(false)` and emits nothing when the value is unchanged.
    pub fn set_property(
        &mut self,
        node: NodeId,
        property: Property,
        value: PropertyValue,
    ) -> Result<bool> {
        let node_type = self.node_type(node)?;
        let desc = PropertyDescriptor::find(node_type, property).ok_or_else(|| {
            Error::InvalidProperty(format!("{node_type} has no settable property {property}"))
        })?;
        if !desc.value_type.accepts(&value) {
            return Err(Error::InvalidProperty(format!(
                "{value:?} is not a valid {property} for {node_type}"
            )));
        }
        if self.nodes[node.index()].kind.get(property).as_ref() == Some(&value) {
            return Ok(false);
        }
        let old = self.nodes[node.index()].kind.set(property, value.clone())?;
        self.emit(GraphEvent::PropertyChanged(PropertyChange {
            node,
            node_type,
            property,
            old,
            new: value,
        }));
        Ok(true)
    }

    /// Set a property without emitting an event; used while loading documents.
    pub(crate) fn set_loaded(
        &mut self,
        node: NodeId,
        property: Property,
        value: PropertyValue,
    ) -> Result<()> {
        let n = self
            .nodes
            .get_mut(node.index())
            .ok_or(Error::UnknownNode(node))?;
        n.kind.set(property, value)?;
        Ok(())
    }

    pub(crate) fn kind_mut(&mut self, node: NodeId) -> Result<&mut NodeKind> {
        self.nodes
            .get_mut(node.index())
            .map(|n| &mut n.kind)
            .ok_or(Error::UnknownNode(node))
    }

    // ============== Tables, columns, relationships ==============

    /// The folder of the given type owned by `table`.
    pub fn folder(&self, table: NodeId, folder_type: FolderType) -> Option<NodeId> {
        self.children(table).iter().copied().find(|&c| {
            self.parent(c) == Some(table)
                && matches!(self.node(c).map(|n| &n.kind),
                    Some(NodeKind::Folder(f)) if f.folder_type == folder_type)
        })
    }

    /// Columns of `table`, in order.
    pub fn columns(&self, table: NodeId) -> Vec<NodeId> {
        self.folder(table, FolderType::Columns)
            .map(|f| self.children(f).to_vec())
            .unwrap_or_default()
    }

    /// Relationships owned by `table` (it is the primary-key side).
    pub fn exported_keys(&self, table: NodeId) -> Vec<NodeId> {
        self.folder(table, FolderType::ExportedKeys)
            .map(|f| self.children(f).to_vec())
            .unwrap_or_default()
    }

    /// Relationships linked into `table` (it is the foreign-key side).
    pub fn imported_keys(&self, table: NodeId) -> Vec<NodeId> {
        self.folder(table, FolderType::ImportedKeys)
            .map(|f| self.children(f).to_vec())
            .unwrap_or_default()
    }

    fn require_folder(&self, table: NodeId, folder_type: FolderType) -> Result<NodeId> {
        if self.node_type(table)? != NodeType::Table {
            return Err(Error::InvalidStructure(format!("{table} is not a table")));
        }
        self.folder(table, folder_type).ok_or_else(|| {
            Error::InvalidStructure(format!(
                "{table} has no {} folder",
                folder_type.default_name()
            ))
        })
    }

    /// Create a column and append it to `table`'s columns folder.
    pub fn add_column(&mut self, table: NodeId, props: ColumnProps) -> Result<NodeId> {
        let folder = self.require_folder(table, FolderType::Columns)?;
        if let Some(source) = props.source_column {
            if self.node_type(source)? != NodeType::Column {
                return Err(Error::InvalidStructure(format!(
                    "lineage source {source} is not a column"
                )));
            }
        }
        let column = self.create(NodeKind::Column(props));
        self.append_child(folder, column)?;
        Ok(column)
    }

    /// Primary-key (owning) table of a relationship.
    pub fn pk_table(&self, relationship: NodeId) -> Option<NodeId> {
        self.parent(relationship).and_then(|folder| self.parent(folder))
    }

    /// Foreign-key (referenced) table of a relationship.
    pub fn fk_table(&self, relationship: NodeId) -> Option<NodeId> {
        match self.node(relationship).map(|n| &n.kind) {
            Some(NodeKind::Relationship { fk_table, .. }) => Some(*fk_table),
            _ => None,
        }
    }

    /// Build a detached relationship with its column mappings.
    pub(crate) fn build_relationship(
        &mut self,
        pk_table: NodeId,
        fk_table: NodeId,
        props: RelationshipProps,
        mappings: &[(NodeId, NodeId)],
    ) -> Result<NodeId> {
        let pk_columns = self.columns(pk_table);
        let fk_columns = self.columns(fk_table);
        for &(pk_column, fk_column) in mappings {
            if !pk_columns.contains(&pk_column) {
                return Err(Error::InvalidStructure(format!(
                    "{pk_column} is not a column of {pk_table}"
                )));
            }
            if !fk_columns.contains(&fk_column) {
                return Err(Error::InvalidStructure(format!(
                    "{fk_column} is not a column of {fk_table}"
                )));
            }
        }
        let relationship = self.alloc(
            NodeKind::Relationship { fk_table, props },
            PopulationState::Populated,
        );
        for &(pk_column, fk_column) in mappings {
            let mapping = self.alloc(
                NodeKind::ColumnMapping {
                    pk_column,
                    fk_column,
                },
                PopulationState::Populated,
            );
            self.nodes[relationship.index()].children.push(mapping);
            self.nodes[mapping.index()].parent = Some(relationship);
        }
        Ok(relationship)
    }

    /// Create a relationship from `pk_table` to `fk_table` as one compound
    /// edit: owned by the primary-key table's exported keys and linked into
    /// the foreign-key table's imported keys.
    pub fn create_relationship(
        &mut self,
        pk_table: NodeId,
        fk_table: NodeId,
        props: RelationshipProps,
        mappings: &[(NodeId, NodeId)],
    ) -> Result<NodeId> {
        let exported = self.require_folder(pk_table, FolderType::ExportedKeys)?;
        let imported = self.require_folder(fk_table, FolderType::ImportedKeys)?;
        for folder in [exported, imported] {
            if self.population_state(folder)? != PopulationState::Populated {
                return Err(Error::InvalidStructure(format!("{folder} is not populated")));
            }
        }
        let relationship = self.build_relationship(pk_table, fk_table, props, mappings)?;
        let label = format!(
            "Create relationship {}",
            self.kind(relationship)?.display_name().unwrap_or_default()
        );
        self.compound(label, |g| {
            g.append_child(exported, relationship)?;
            let index = g.children(imported).len();
            g.link_child(imported, relationship, index)
        })?;
        debug!(%relationship, %pk_table, %fk_table, "Created relationship");
        Ok(relationship)
    }

    /// Detach a relationship from both tables as one compound edit.
    pub fn remove_relationship(&mut self, relationship: NodeId) -> Result<()> {
        let owner = self.parent(relationship).ok_or_else(|| {
            Error::InvalidStructure(format!("{relationship} is not attached"))
        })?;
        let link = self
            .fk_table(relationship)
            .and_then(|t| self.folder(t, FolderType::ImportedKeys))
            .filter(|&f| self.is_link(f, relationship));
        self.compound("Remove relationship", |g| {
            if let Some(folder) = link {
                g.unlink_child(folder, relationship)?;
            }
            g.remove_child(owner, relationship)?;
            Ok(())
        })
    }

    // ============== Population ==============

    /// Fill the children of an unpopulated node from `populator`.
    ///
    /// Every event this emits is bracketed by
    /// [`GraphEvent::PopulationStarted`] and
    /// [`GraphEvent::PopulationFinished`]. A provider error, or templates that
    /// do not fit under the node, move it to
    /// [`PopulationState::PopulationFailed`] with one exception placeholder;
    /// that outcome is reported through the returned state, not as an error.
    pub fn populate(
        &mut self,
        node: NodeId,
        populator: &dyn Populator,
        progress: &mut dyn ProgressSink,
    ) -> Result<PopulationState> {
        let state = self.population_state(node)?;
        if state != PopulationState::Unpopulated {
            return Ok(state);
        }

        self.emit(GraphEvent::PopulationStarted { node });
        let outcome = populator
            .populate(self, node, progress)
            .map_err(|e| e.message)
            .and_then(|templates| {
                let parent_type = self.nodes[node.index()].node_type();
                validate_templates(parent_type, &templates).map(|_| templates)
            });

        let state = match outcome {
            Ok(templates) => {
                for mut template in templates {
                    let child = self.build(&mut template);
                    let index = self.nodes[node.index()].children.len();
                    self.insert_owned(node, child, index);
                }
                self.nodes[node.index()].state = PopulationState::Populated;
                debug!(%node, children = self.children(node).len(), "Populated node");
                PopulationState::Populated
            }
            Err(message) => {
                warn!(%node, %message, "Population failed");
                let placeholder = self.alloc(
                    NodeKind::ExceptionPlaceholder { message },
                    PopulationState::Populated,
                );
                let index = self.nodes[node.index()].children.len();
                self.insert_owned(node, placeholder, index);
                self.nodes[node.index()].state = PopulationState::PopulationFailed;
                PopulationState::PopulationFailed
            }
        };
        self.emit(GraphEvent::PopulationFinished { node, state });

        if state == PopulationState::Populated {
            let node_type = self.nodes[node.index()].node_type();
            self.emit(GraphEvent::PropertyChanged(PropertyChange {
                node,
                node_type,
                property: Property::Populated,
                old: PropertyValue::Bool(false),
                new: PropertyValue::Bool(true),
            }));
        }
        Ok(state)
    }

    /// Move a failed node back to unpopulated, discarding its placeholder.
    pub fn retry_population(&mut self, node: NodeId) -> Result<()> {
        if self.population_state(node)? != PopulationState::PopulationFailed {
            return Err(Error::InvalidStructure(format!(
                "{node} has no failed population to retry"
            )));
        }
        self.emit(GraphEvent::PopulationStarted { node });
        let placeholders: Vec<NodeId> = self
            .children(node)
            .iter()
            .copied()
            .filter(|&c| {
                self.node(c).map(|n| n.node_type()) == Some(NodeType::ExceptionPlaceholder)
            })
            .collect();
        for placeholder in placeholders {
            self.remove_child(node, placeholder)?;
        }
        self.nodes[node.index()].state = PopulationState::Unpopulated;
        self.emit(GraphEvent::PopulationFinished {
            node,
            state: PopulationState::Unpopulated,
        });
        Ok(())
    }

    /// Attach a placeholder while loading a document that recorded a failure.
    pub(crate) fn mark_failed(&mut self, node: NodeId, message: String) -> Result<NodeId> {
        let placeholder = self.alloc(
            NodeKind::ExceptionPlaceholder { message },
            PopulationState::Populated,
        );
        self.attach_loaded(node, placeholder)?;
        self.set_state(node, PopulationState::PopulationFailed);
        Ok(placeholder)
    }

    /// Materialize a template subtree as a detached node.
    fn build(&mut self, template: &mut NodeTemplate) -> NodeId {
        template.normalize_table();
        let id = self.alloc(template.kind.clone(), template.state);
        for child in &mut template.children {
            let child_id = self.build(child);
            self.nodes[id.index()].children.push(child_id);
            self.nodes[child_id.index()].parent = Some(id);
        }
        id
    }
}

/// Check that templates only hold containment the graph allows.
///
/// Relationships and column mappings are cross-links and must be created
/// with [`SchemaGraph::create_relationship`] once both tables exist.
fn validate_templates(
    parent_type: NodeType,
    templates: &[NodeTemplate],
) -> std::result::Result<(), String> {
    for template in templates {
        let t = template.kind.node_type();
        let allowed = match t {
            NodeType::Root
            | NodeType::Relationship
            | NodeType::ColumnMapping
            | NodeType::ExceptionPlaceholder => false,
            _ => parent_type.allowed_children().contains(&t),
        };
        if !allowed {
            return Err(format!("population returned a {t} under a {parent_type}"));
        }
        if let NodeKind::Folder(_) = template.kind {
            if parent_type != NodeType::Table {
                return Err(format!("population returned a folder under a {parent_type}"));
            }
        }
        if template.state != PopulationState::Populated && !template.children.is_empty() {
            return Err(format!("unpopulated {t} template carries children"));
        }
        validate_templates(t, &template.children)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PopulationError;
    use crate::model::{DatabaseProps, SchemaProps};
    use crate::progress::NoProgress;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<GraphEvent>>,
    }

    impl GraphListener for Recorder {
        fn on_event(&self, event: &GraphEvent) {
            self.events.lock().push(event.clone());
        }
    }

    struct Fixed(std::result::Result<Vec<NodeTemplate>, PopulationError>);

    impl Populator for Fixed {
        fn populate(
            &self,
            _graph: &SchemaGraph,
            _node: NodeId,
            progress: &mut dyn ProgressSink,
        ) -> std::result::Result<Vec<NodeTemplate>, PopulationError> {
            progress.advance("fetch");
            self.0.clone()
        }
    }

    fn setup() -> (SchemaGraph, NodeId, Arc<Recorder>) {
        let mut graph = SchemaGraph::new();
        let db = graph.create(NodeKind::Database(DatabaseProps::new("db")));
        graph.append_child(graph.root(), db).unwrap();
        let recorder = Arc::new(Recorder::default());
        graph.subscribe(recorder.clone());
        (graph, db, recorder)
    }

    #[test]
    fn test_create_table_has_three_folders() {
        let mut graph = SchemaGraph::new();
        let table = graph.create_table(TableProps::new("orders"));

        assert_eq!(graph.children(table).len(), 3);
        for folder_type in FolderType::ALL {
            let folder = graph.folder(table, folder_type).unwrap();
            assert_eq!(graph.parent(folder), Some(table));
        }
    }

    #[test]
    fn test_add_child_emits_one_event() {
        let (mut graph, db, recorder) = setup();
        let table = graph.create_table(TableProps::new("t"));

        graph.add_child(db, table, 0).unwrap();

        let events = recorder.events.lock();
        assert_eq!(
            *events,
            vec![GraphEvent::ChildInserted {
                parent: db,
                child: table,
                index: 0
            }]
        );
        assert_eq!(graph.parent(table), Some(db));
    }

    #[test]
    fn test_add_child_rejects_invalid_structure() {
        let (mut graph, db, recorder) = setup();
        let table = graph.create_table(TableProps::new("t"));
        let column = graph.create(NodeKind::Column(ColumnProps::new("c", 4)));

        // wrong variant
        assert!(matches!(
            graph.add_child(db, column, 0),
            Err(Error::InvalidStructure(_))
        ));
        // index out of range
        assert!(graph.add_child(db, table, 5).is_err());
        // cycle
        graph.add_child(db, table, 0).unwrap();
        assert!(graph.add_child(table, db, 0).is_err());
        // already owned
        let other = graph.create(NodeKind::Database(DatabaseProps::new("other")));
        graph.append_child(graph.root(), other).unwrap();
        assert!(graph.add_child(other, table, 0).is_err());

        assert_eq!(recorder.events.lock().len(), 2);
    }

    #[test]
    fn test_add_child_requires_populated_parent() {
        let (mut graph, _, _) = setup();
        let schema = graph
            .create_unpopulated(NodeKind::Schema(SchemaProps::new("s")))
            .unwrap();
        let table = graph.create_table(TableProps::new("t"));

        assert!(graph.add_child(schema, table, 0).is_err());
    }

    #[test]
    fn test_remove_child_keeps_node_in_arena() {
        let (mut graph, db, recorder) = setup();
        let table = graph.create_table(TableProps::new("t"));
        graph.append_child(db, table).unwrap();

        let index = graph.remove_child(db, table).unwrap();

        assert_eq!(index, 0);
        assert_eq!(graph.parent(table), None);
        assert!(graph.node(table).is_some());
        assert!(matches!(
            recorder.events.lock().last(),
            Some(GraphEvent::ChildRemoved { .. })
        ));
    }

    #[test]
    fn test_remove_mapped_column_rejected() {
        let (mut graph, db, recorder) = setup();
        let parent = graph.create_table(TableProps::new("parent"));
        graph.append_child(db, parent).unwrap();
        let child = graph.create_table(TableProps::new("child"));
        graph.append_child(db, child).unwrap();
        let pk = graph.add_column(parent, ColumnProps::new("id", 4)).unwrap();
        let fk = graph.add_column(child, ColumnProps::new("parent_id", 4)).unwrap();
        let relationship = graph
            .create_relationship(parent, child, RelationshipProps::new("fk"), &[(pk, fk)])
            .unwrap();
        let columns = graph.folder(child, FolderType::Columns).unwrap();
        recorder.events.lock().clear();

        assert!(matches!(
            graph.remove_child(columns, fk),
            Err(Error::InvalidStructure(_))
        ));
        // the foreign-key table holds the mapped column too
        assert!(graph.remove_child(db, child).is_err());
        assert_eq!(graph.columns(child), vec![fk]);
        assert!(recorder.events.lock().is_empty());

        // the primary-key table takes the relationship with it
        graph.remove_child(db, parent).unwrap();
        graph.append_child(db, parent).unwrap();

        graph.remove_relationship(relationship).unwrap();
        graph.remove_child(columns, fk).unwrap();
        assert!(graph.columns(child).is_empty());
    }

    #[test]
    fn test_set_property_noop_emits_nothing() {
        let (mut graph, db, recorder) = setup();

        let changed = graph
            .set_property(db, Property::Name, PropertyValue::Text("db".into()))
            .unwrap();

        assert!(!changed);
        assert!(recorder.events.lock().is_empty());
    }

    #[test]
    fn test_set_property_rejects_unknown_property() {
        let (mut graph, db, _) = setup();

        let result = graph.set_property(db, Property::Scale, PropertyValue::Int(3));

        assert!(matches!(result, Err(Error::InvalidProperty(_))));
    }

    #[test]
    fn test_relationship_link_and_remove() {
        let (mut graph, db, _) = setup();
        let parent = graph.create_table(TableProps::new("parent"));
        let child = graph.create_table(TableProps::new("child"));
        graph.append_child(db, parent).unwrap();
        graph.append_child(db, child).unwrap();
        let pk = graph.add_column(parent, ColumnProps::new("id", 4).primary_key(1)).unwrap();
        let fk = graph.add_column(child, ColumnProps::new("parent_id", 4)).unwrap();

        let rel = graph
            .create_relationship(parent, child, RelationshipProps::new("fk_parent"), &[(pk, fk)])
            .unwrap();

        assert_eq!(graph.pk_table(rel), Some(parent));
        assert_eq!(graph.fk_table(rel), Some(child));
        assert_eq!(graph.imported_keys(child), vec![rel]);
        assert_eq!(graph.children(rel).len(), 1);

        graph.remove_relationship(rel).unwrap();
        assert!(graph.imported_keys(child).is_empty());
        assert!(graph.exported_keys(parent).is_empty());
        assert_eq!(graph.compound_depth(), 0);
    }

    #[test]
    fn test_create_relationship_rejects_foreign_column() {
        let (mut graph, db, _) = setup();
        let parent = graph.create_table(TableProps::new("parent"));
        let child = graph.create_table(TableProps::new("child"));
        graph.append_child(db, parent).unwrap();
        graph.append_child(db, child).unwrap();
        let fk = graph.add_column(child, ColumnProps::new("parent_id", 4)).unwrap();

        let result = graph.create_relationship(parent, child, RelationshipProps::new("r"), &[(fk, fk)]);

        assert!(matches!(result, Err(Error::InvalidStructure(_))));
        assert!(graph.exported_keys(parent).is_empty());
    }

    #[test]
    fn test_link_requires_imported_keys_folder() {
        let (mut graph, db, _) = setup();
        let parent = graph.create_table(TableProps::new("parent"));
        let child = graph.create_table(TableProps::new("child"));
        graph.append_child(db, parent).unwrap();
        graph.append_child(db, child).unwrap();
        let rel = graph
            .create_relationship(parent, child, RelationshipProps::new("r"), &[])
            .unwrap();

        let columns = graph.folder(child, FolderType::Columns).unwrap();
        assert!(graph.link_child(columns, rel, 0).is_err());
        let own_imported = graph.folder(parent, FolderType::ImportedKeys).unwrap();
        assert!(graph.link_child(own_imported, rel, 0).is_err());
    }

    #[test]
    fn test_populate_success() {
        let (mut graph, db, recorder) = setup();
        let schema = graph
            .create_unpopulated(NodeKind::Schema(SchemaProps::new("public")))
            .unwrap();
        graph.append_child(db, schema).unwrap();
        recorder.events.lock().clear();
        let populator = Fixed(Ok(vec![NodeTemplate::new(NodeKind::Table(TableProps::new(
            "t",
        )))]));

        let state = graph.populate(schema, &populator, &mut NoProgress).unwrap();

        assert_eq!(state, PopulationState::Populated);
        let table = graph.children(schema)[0];
        assert_eq!(graph.children(table).len(), 3);
        let events = recorder.events.lock();
        assert_eq!(events[0], GraphEvent::PopulationStarted { node: schema });
        assert!(events.contains(&GraphEvent::PopulationFinished {
            node: schema,
            state: PopulationState::Populated
        }));
    }

    #[test]
    fn test_populate_failure_attaches_placeholder() {
        let (mut graph, db, _) = setup();
        let schema = graph
            .create_unpopulated(NodeKind::Schema(SchemaProps::new("public")))
            .unwrap();
        graph.append_child(db, schema).unwrap();

        let state = graph
            .populate(schema, &Fixed(Err(PopulationError::new("timeout"))), &mut NoProgress)
            .unwrap();

        assert_eq!(state, PopulationState::PopulationFailed);
        let children = graph.children(schema);
        assert_eq!(children.len(), 1);
        assert_eq!(
            graph.kind(children[0]).unwrap(),
            &NodeKind::ExceptionPlaceholder {
                message: "timeout".into()
            }
        );

        // terminal until retried
        let again = graph.populate(schema, &Fixed(Ok(vec![])), &mut NoProgress).unwrap();
        assert_eq!(again, PopulationState::PopulationFailed);

        graph.retry_population(schema).unwrap();
        assert_eq!(graph.population_state(schema).unwrap(), PopulationState::Unpopulated);
        assert!(graph.children(schema).is_empty());
    }

    #[test]
    fn test_populate_rejects_misplaced_templates() {
        let (mut graph, db, _) = setup();
        let schema = graph
            .create_unpopulated(NodeKind::Schema(SchemaProps::new("public")))
            .unwrap();
        graph.append_child(db, schema).unwrap();
        let populator = Fixed(Ok(vec![NodeTemplate::new(NodeKind::Column(ColumnProps::new(
            "c", 4,
        )))]));

        let state = graph.populate(schema, &populator, &mut NoProgress).unwrap();

        assert_eq!(state, PopulationState::PopulationFailed);
    }

    #[test]
    fn test_unsubscribe() {
        let (mut graph, db, recorder) = setup();
        let id = graph.subscribe(recorder.clone());
        assert!(graph.unsubscribe(id));
        assert!(!graph.unsubscribe(id));

        graph
            .set_property(db, Property::Name, PropertyValue::Text("renamed".into()))
            .unwrap();

        assert_eq!(recorder.events.lock().len(), 1);
    }
}
