//! Project document writer.
//!
//! Walks the graph depth first, assigning `PREFIX{n}` identifiers on first
//! visit. Relationships are held back while their tables are written and
//! flushed in a `<relationships>` block at the end of each database, once
//! everything they reference has an identifier.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use tracing::{debug, warn};

use super::ids::IdentityMap;
use super::{
    ATTR_DBCS_REF, ATTR_FK_COLUMN_REF, ATTR_FK_TABLE_REF, ATTR_ID, ATTR_PK_COLUMN_REF, ATTR_PK_TABLE_REF,
    ATTR_POPULATED, ATTR_REF_ID, ATTR_SOURCE_COLUMN_REF, ATTR_TYPE, EL_CONNECTION_SPEC,
    EL_CONNECTION_SPECS, EL_DDL_FILE, EL_DDL_GENERATOR, EL_PLAY_PEN, EL_PROJECT, EL_REFERENCE,
    EL_RELATIONSHIPS, EL_SOURCE_DATABASES, EL_TABLE_LINK, EL_TABLE_PANE, EL_TARGET_DATABASE,
    FORMAT_VERSION,
};
use crate::config::SaveConfig;
use crate::error::{Error, Result};
use crate::model::{
    FolderType, NodeId, NodeKind, NodeType, PopulationState, Populator, PropertyDescriptor,
    SchemaGraph,
};
use crate::progress::ProgressSink;
use crate::project::Project;

/// Writes a [`Project`] as an XML document.
pub struct ProjectWriter<'a> {
    config: SaveConfig,
    populator: Option<&'a dyn Populator>,
}

impl<'a> ProjectWriter<'a> {
    /// Create a writer with the given configuration.
    pub fn new(config: SaveConfig) -> Self {
        Self {
            config,
            populator: None,
        }
    }

    /// Use `populator` to fill unpopulated subtrees when saving the entire
    /// source.
    pub fn with_populator(mut self, populator: &'a dyn Populator) -> Self {
        self.populator = Some(populator);
        self
    }

    /// Write `project` to `out`, returning the identifiers assigned.
    pub fn write<W: Write>(
        &self,
        project: &mut Project,
        out: W,
        progress: &mut dyn ProgressSink,
    ) -> Result<IdentityMap> {
        if self.config.save_entire_source {
            if let Some(populator) = self.populator {
                populate_all(project, populator, progress)?;
            }
        }

        let graph = project.graph();
        let total = count_written_tables(graph, graph.root())
            + if graph.parent(project.target_database()).is_none() {
                count_written_tables(graph, project.target_database())
            } else {
                0
            }
            + project.diagram().len();
        progress.set_total(total);

        let mut emitter = Emitter {
            xml: Writer::new_with_indent(out, b' ', self.config.indent),
            graph,
            progress,
            ids: IdentityMap::new(),
            pending: Vec::new(),
            expanded_folders: HashSet::new(),
            connection_ids: HashMap::new(),
        };
        let result = emitter.project(project);
        emitter.progress.close();
        result?;

        emitter.xml.get_mut().flush()?;
        debug!(
            project = project.name(),
            identifiers = emitter.ids.len(),
            "Wrote project document"
        );
        Ok(emitter.ids)
    }
}

/// Populate every unpopulated node until none are left.
///
/// Population can reveal new unpopulated containers (a schema's tables come
/// with unpopulated folders), so this repeats until a pass finds nothing.
fn populate_all(
    project: &mut Project,
    populator: &dyn Populator,
    progress: &mut dyn ProgressSink,
) -> Result<()> {
    let target = project.target_database();
    loop {
        let graph = project.graph();
        let mut pending: Vec<NodeId> = graph.subtree(graph.root());
        if graph.parent(target).is_none() {
            pending.extend(graph.subtree(target));
        }
        pending.retain(|&n| graph.population_state(n).ok() == Some(PopulationState::Unpopulated));
        if pending.is_empty() {
            return Ok(());
        }
        for node in pending {
            project.graph_mut().populate(node, populator, progress)?;
        }
    }
}

/// Whether the writer emits the children of `node`.
fn is_expanded(graph: &SchemaGraph, node: NodeId) -> bool {
    if graph.population_state(node).ok() != Some(PopulationState::Populated) {
        return false;
    }
    match graph.children(node) {
        [only] => graph.node_type(*only).ok() != Some(NodeType::ExceptionPlaceholder),
        _ => true,
    }
}

fn count_written_tables(graph: &SchemaGraph, node: NodeId) -> usize {
    let own = usize::from(graph.node_type(node).ok() == Some(NodeType::Table));
    if !is_expanded(graph, node) {
        return own;
    }
    own + graph
        .children(node)
        .iter()
        .filter(|&&c| graph.parent(c) == Some(node))
        .map(|&c| count_written_tables(graph, c))
        .sum::<usize>()
}

struct Emitter<'a, W: Write> {
    xml: Writer<W>,
    graph: &'a SchemaGraph,
    progress: &'a mut dyn ProgressSink,
    ids: IdentityMap,
    pending: Vec<NodeId>,
    expanded_folders: HashSet<NodeId>,
    connection_ids: HashMap<String, String>,
}

impl<'a, W: Write> Emitter<'a, W> {
    fn start(&mut self, elem: BytesStart<'_>) -> Result<()> {
        self.xml.write_event(Event::Start(elem))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.xml.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn empty(&mut self, elem: BytesStart<'_>) -> Result<()> {
        self.xml.write_event(Event::Empty(elem))?;
        Ok(())
    }

    fn project(&mut self, project: &Project) -> Result<()> {
        self.xml
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut root = BytesStart::new(EL_PROJECT);
        root.push_attribute(("version", FORMAT_VERSION));
        root.push_attribute(("name", project.name()));
        self.start(root)?;

        self.connection_specs(project)?;

        let graph = self.graph;
        self.start(BytesStart::new(EL_SOURCE_DATABASES))?;
        for &db in graph.children(graph.root()) {
            self.node(db)?;
        }
        self.end(EL_SOURCE_DATABASES)?;

        self.start(BytesStart::new(EL_TARGET_DATABASE))?;
        self.node(project.target_database())?;
        self.end(EL_TARGET_DATABASE)?;

        for rel in std::mem::take(&mut self.pending) {
            warn!(
                relationship = %rel,
                name = self.graph.kind(rel).ok().and_then(|k| k.display_name()).unwrap_or_default(),
                "Dropping relationship whose tables or columns were not written"
            );
        }

        self.ddl_generator(project)?;
        self.play_pen(project)?;
        self.end(EL_PROJECT)
    }

    fn connection_specs(&mut self, project: &Project) -> Result<()> {
        self.start(BytesStart::new(EL_CONNECTION_SPECS))?;
        for (i, spec) in project.connections().iter().enumerate() {
            let id = format!("DBCS{i}");
            let seq_no = spec.seq_no.to_string();
            let single_login = spec.single_login.to_string();
            let mut elem = BytesStart::new(EL_CONNECTION_SPEC);
            elem.push_attribute((ATTR_ID, id.as_str()));
            elem.push_attribute(("connection-name", spec.name.as_str()));
            elem.push_attribute(("display-name", spec.display_name.as_str()));
            elem.push_attribute(("driver-class", spec.driver_class.as_str()));
            elem.push_attribute(("jdbc-url", spec.url.as_str()));
            elem.push_attribute(("user-name", spec.user.as_str()));
            elem.push_attribute(("user-pass", spec.password.as_str()));
            elem.push_attribute(("sequence-number", seq_no.as_str()));
            elem.push_attribute(("single-login", single_login.as_str()));
            self.empty(elem)?;
            self.connection_ids.insert(spec.name.clone(), id);
        }
        self.end(EL_CONNECTION_SPECS)
    }

    /// Write `node` and its subtree, or a reference if it was written before.
    fn node(&mut self, node: NodeId) -> Result<()> {
        let node_type = self.graph.node_type(node)?;
        if let Some(id) = self.ids.id_of(node) {
            let mut elem = BytesStart::new(EL_REFERENCE);
            elem.push_attribute((ATTR_REF_ID, id));
            elem.push_attribute((ATTR_TYPE, node_type.element_name().unwrap_or_default()));
            return self.empty(elem);
        }
        let (Some(element), Some(prefix)) = (node_type.element_name(), node_type.id_prefix())
        else {
            return Err(Error::UnsupportedNodeVariant(node_type));
        };

        let id = self.ids.assign(node, prefix)?;
        let expanded = is_expanded(self.graph, node);
        let attributes = self.attributes(node)?;

        let mut elem = BytesStart::new(element);
        elem.push_attribute((ATTR_ID, id.as_str()));
        elem.push_attribute((ATTR_POPULATED, if expanded { "true" } else { "false" }));
        for (name, value) in &attributes {
            elem.push_attribute((name.as_str(), value.as_str()));
        }

        let graph = self.graph;
        let mut children = Vec::new();
        if expanded {
            if node_type == NodeType::Folder {
                self.expanded_folders.insert(node);
            }
            for &child in graph.children(node) {
                let owned = graph.parent(child) == Some(node);
                match graph.node_type(child)? {
                    NodeType::Relationship if owned => self.pending.push(child),
                    NodeType::Relationship => {}
                    _ if owned => children.push(child),
                    _ => {}
                }
            }
        }

        let has_block = node_type == NodeType::Database && !self.pending.is_empty();
        if children.is_empty() && !has_block {
            self.empty(elem)?;
        } else {
            self.start(elem)?;
            for child in children {
                self.node(child)?;
            }
            if node_type == NodeType::Database {
                self.relationships()?;
            }
            self.end(element)?;
        }

        if node_type == NodeType::Table {
            let name = self.graph.kind(node)?.display_name().unwrap_or_default().to_string();
            self.progress.advance(&name);
        }
        Ok(())
    }

    /// Attributes after `id` and `populated`, sorted by name, absent values
    /// omitted.
    fn attributes(&self, node: NodeId) -> Result<Vec<(String, String)>> {
        let graph = self.graph;
        let kind = graph.kind(node)?;
        let node_type = kind.node_type();
        let mut attrs: Vec<(String, String)> = Vec::new();

        for desc in PropertyDescriptor::for_type(node_type).filter(|d| !d.reference) {
            if let Some(value) = kind.get(desc.property).and_then(|v| v.to_attribute()) {
                attrs.push((desc.attribute.to_string(), value));
            }
        }

        match kind {
            NodeKind::Database(props) => {
                if let Some(name) = &props.connection {
                    match self.connection_ids.get(name) {
                        Some(id) => attrs.push((ATTR_DBCS_REF.to_string(), id.clone())),
                        None => warn!(database = %node, connection = %name, "Unknown connection spec"),
                    }
                }
            }
            NodeKind::Folder(props) => {
                attrs.push((ATTR_TYPE.to_string(), props.folder_type.code().to_string()));
            }
            NodeKind::Column(props) => {
                if let Some(source) = props.source_column {
                    match self.ids.id_of(source) {
                        Some(id) => attrs.push((ATTR_SOURCE_COLUMN_REF.to_string(), id.to_string())),
                        None => debug!(column = %node, %source, "Lineage source not written yet"),
                    }
                }
            }
            NodeKind::Relationship { fk_table, .. } => {
                let pk_table = graph.pk_table(node).ok_or_else(|| {
                    Error::InvalidStructure(format!("{node} has no owning table"))
                })?;
                attrs.push((ATTR_PK_TABLE_REF.to_string(), self.require_id(pk_table)?));
                attrs.push((ATTR_FK_TABLE_REF.to_string(), self.require_id(*fk_table)?));
            }
            NodeKind::ColumnMapping {
                pk_column,
                fk_column,
            } => {
                attrs.push((ATTR_PK_COLUMN_REF.to_string(), self.require_id(*pk_column)?));
                attrs.push((ATTR_FK_COLUMN_REF.to_string(), self.require_id(*fk_column)?));
            }
            _ => {}
        }

        attrs.sort();
        Ok(attrs)
    }

    fn require_id(&self, node: NodeId) -> Result<String> {
        self.ids
            .id_of(node)
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidStructure(format!("{node} was referenced before it was written")))
    }

    /// Whether every node `relationship` refers to already has an identifier.
    fn is_writable(&self, relationship: NodeId) -> bool {
        let graph = self.graph;
        let Some(owner) = graph.parent(relationship) else {
            return false;
        };
        let (Some(pk_table), Some(fk_table)) = (graph.pk_table(relationship), graph.fk_table(relationship))
        else {
            return false;
        };
        let linking = graph.folder(fk_table, FolderType::ImportedKeys);
        let folders_written = self.expanded_folders.contains(&owner)
            && linking.is_some_and(|f| self.expanded_folders.contains(&f));
        let tables_written = self.ids.id_of(pk_table).is_some() && self.ids.id_of(fk_table).is_some();
        let columns_written = graph.children(relationship).iter().all(|&m| {
            match graph.kind(m) {
                Ok(NodeKind::ColumnMapping {
                    pk_column,
                    fk_column,
                }) => self.ids.id_of(*pk_column).is_some() && self.ids.id_of(*fk_column).is_some(),
                _ => false,
            }
        });
        folders_written && tables_written && columns_written
    }

    /// Flush the pending relationships that can be written now.
    fn relationships(&mut self) -> Result<()> {
        let (ready, waiting): (Vec<NodeId>, Vec<NodeId>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|&r| self.is_writable(r));
        self.pending = waiting;
        if ready.is_empty() {
            return Ok(());
        }

        self.start(BytesStart::new(EL_RELATIONSHIPS))?;
        for rel in ready {
            let id = self.ids.assign(rel, NodeType::Relationship.id_prefix().unwrap_or("REL"))?;
            let attributes = self.attributes(rel)?;
            let mut elem = BytesStart::new("relationship");
            elem.push_attribute((ATTR_ID, id.as_str()));
            elem.push_attribute((ATTR_POPULATED, "true"));
            for (name, value) in &attributes {
                elem.push_attribute((name.as_str(), value.as_str()));
            }

            let mappings = self.graph.children(rel).to_vec();
            if mappings.is_empty() {
                self.empty(elem)?;
                continue;
            }
            self.start(elem)?;
            for mapping in mappings {
                let id = self
                    .ids
                    .assign(mapping, NodeType::ColumnMapping.id_prefix().unwrap_or("CMP"))?;
                let attributes = self.attributes(mapping)?;
                let mut elem = BytesStart::new("column-mapping");
                elem.push_attribute((ATTR_ID, id.as_str()));
                elem.push_attribute((ATTR_POPULATED, "true"));
                for (name, value) in &attributes {
                    elem.push_attribute((name.as_str(), value.as_str()));
                }
                self.empty(elem)?;
            }
            self.end("relationship")?;
        }
        self.end(EL_RELATIONSHIPS)
    }

    fn ddl_generator(&mut self, project: &Project) -> Result<()> {
        let ddl = project.ddl_generator();
        let mut elem = BytesStart::new(EL_DDL_GENERATOR);
        elem.push_attribute((ATTR_TYPE, ddl.generator.as_str()));
        elem.push_attribute((
            "allow-connection",
            if ddl.allow_connection { "true" } else { "false" },
        ));
        if let Some(catalog) = &ddl.target_catalog {
            elem.push_attribute(("target-catalog", catalog.as_str()));
        }
        if let Some(schema) = &ddl.target_schema {
            elem.push_attribute(("target-schema", schema.as_str()));
        }
        match &ddl.file {
            Some(path) => {
                self.start(elem)?;
                let path = path.to_string_lossy();
                let mut file = BytesStart::new(EL_DDL_FILE);
                file.push_attribute(("path", path.as_ref()));
                self.empty(file)?;
                self.end(EL_DDL_GENERATOR)
            }
            None => self.empty(elem),
        }
    }

    fn play_pen(&mut self, project: &Project) -> Result<()> {
        let diagram = project.diagram();
        self.start(BytesStart::new(EL_PLAY_PEN))?;
        for placement in &diagram.tables {
            let Some(table_ref) = self.ids.id_of(placement.table).map(str::to_string) else {
                warn!(table = %placement.table, "Skipping diagram placement of unwritten table");
                continue;
            };
            let (x, y) = (placement.x.to_string(), placement.y.to_string());
            let mut elem = BytesStart::new(EL_TABLE_PANE);
            elem.push_attribute(("table-ref", table_ref.as_str()));
            elem.push_attribute(("x", x.as_str()));
            elem.push_attribute(("y", y.as_str()));
            self.empty(elem)?;
            self.progress.advance("table pane");
        }
        for link in &diagram.links {
            let Some(rel_ref) = self.ids.id_of(link.relationship).map(str::to_string) else {
                warn!(relationship = %link.relationship, "Skipping diagram link of unwritten relationship");
                continue;
            };
            let coords = [link.pk_point.0, link.pk_point.1, link.fk_point.0, link.fk_point.1]
                .map(|c| c.to_string());
            let mut elem = BytesStart::new(EL_TABLE_LINK);
            elem.push_attribute(("relationship-ref", rel_ref.as_str()));
            elem.push_attribute(("pk-x", coords[0].as_str()));
            elem.push_attribute(("pk-y", coords[1].as_str()));
            elem.push_attribute(("fk-x", coords[2].as_str()));
            elem.push_attribute(("fk-y", coords[3].as_str()));
            self.empty(elem)?;
            self.progress.advance("table link");
        }
        self.end(EL_PLAY_PEN)
    }
}
