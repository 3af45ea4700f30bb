//! Project document reader.
//!
//! Elements are matched against a static table of path patterns, either
//! exact (`architect-project/source-databases/database`) or suffix wildcards
//! (`*/table`). The first matching entry wins, so exact entries come first.
//! Each entry lists the rules applied when the element opens and closes.
//!
//! References are resolved strictly backward: a `*-ref` attribute may only
//! name an element whose `id` was registered earlier in the document.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use super::ids::IdentityMap;
use super::{
    is_reference_attribute, ATTR_DBCS_REF, ATTR_FK_COLUMN_REF, ATTR_FK_TABLE_REF, ATTR_ID,
    ATTR_PK_COLUMN_REF, ATTR_PK_TABLE_REF, ATTR_POPULATED, ATTR_REF_ID, ATTR_SOURCE_COLUMN_REF,
    ATTR_TYPE, FORMAT_VERSION,
};
use crate::config::LoadConfig;
use crate::error::{Error, Result};
use crate::model::{
    CatalogProps, ColumnProps, DatabaseProps, FolderProps, FolderType, NodeId, NodeKind, NodeType,
    PopulationState, PropertyDescriptor, RelationshipProps, SchemaGraph, SchemaProps, TableProps,
};
use crate::project::{ConnectionSpec, DdlGeneratorSettings, DiagramLayout, Project};

/// What happens when a matched element opens or closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    /// Read the project name and version.
    Header,
    /// Register a connection spec.
    Connection,
    /// Build a node of this type and register its `id`.
    Create(NodeType),
    /// Copy plain attributes onto the node through its property descriptors.
    SetProperties,
    /// On close, attach the node to the nearest node frame below it.
    LinkChild,
    /// On close, append the database to the source databases.
    LinkSourceDatabase,
    /// On close, make the database the target database.
    LinkTarget,
    /// Relink a previously registered node at this point.
    Reference,
    /// Point the target database at a previously registered database.
    TargetReference,
    /// Record a failed population on the enclosing node.
    PopulationFailure,
    /// Read DDL generator settings.
    DdlGenerator,
    /// Read the DDL output file.
    DdlFile,
    /// Read a table placement.
    TablePane,
    /// Read a relationship line placement.
    TableLink,
}

use Rule::*;

/// Pattern table; exact entries first, then wildcards.
static RULES: &[(&str, &[Rule])] = &[
    ("architect-project", &[Header]),
    ("architect-project/project-connection-specs", &[]),
    ("architect-project/project-connection-specs/dbcs", &[Connection]),
    ("architect-project/source-databases", &[]),
    (
        "architect-project/source-databases/database",
        &[Create(NodeType::Database), SetProperties, LinkSourceDatabase],
    ),
    ("architect-project/target-database", &[]),
    (
        "architect-project/target-database/database",
        &[Create(NodeType::Database), SetProperties, LinkTarget],
    ),
    ("architect-project/target-database/reference", &[TargetReference]),
    ("architect-project/ddl-generator", &[DdlGenerator]),
    ("architect-project/ddl-generator/file", &[DdlFile]),
    ("architect-project/play-pen", &[]),
    ("architect-project/play-pen/table-pane", &[TablePane]),
    ("architect-project/play-pen/table-link", &[TableLink]),
    ("*/catalog", &[Create(NodeType::Catalog), SetProperties, LinkChild]),
    ("*/schema", &[Create(NodeType::Schema), SetProperties, LinkChild]),
    ("*/table", &[Create(NodeType::Table), SetProperties, LinkChild]),
    ("*/folder", &[Create(NodeType::Folder), SetProperties, LinkChild]),
    ("*/column", &[Create(NodeType::Column), SetProperties, LinkChild]),
    ("*/relationships", &[]),
    ("*/relationship", &[Create(NodeType::Relationship), SetProperties]),
    ("*/column-mapping", &[Create(NodeType::ColumnMapping), LinkChild]),
    ("*/sql-exception", &[PopulationFailure]),
    ("*/reference", &[Reference]),
];

fn matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) => path.ends_with(suffix) && path.len() > suffix.len(),
        None => pattern == path,
    }
}

fn rules_for(path: &str) -> Option<&'static [Rule]> {
    RULES
        .iter()
        .find(|(pattern, _)| matches(pattern, path))
        .map(|(_, rules)| *rules)
}

/// Attributes of one element, unescaped.
struct Attrs(Vec<(String, String)>);

impl Attrs {
    fn parse(e: &BytesStart<'_>) -> Result<Self> {
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|err| Error::MalformedDocument(err.to_string()))?
                .to_string();
            let value = attr.unescape_value()?.into_owned();
            attrs.push((key, value));
        }
        Ok(Self(attrs))
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, name: &str, element: &str) -> Result<&str> {
        self.get(name).ok_or_else(|| {
            Error::MalformedDocument(format!("<{element}> is missing the {name} attribute"))
        })
    }

    fn int(&self, name: &str, element: &str) -> Result<i32> {
        let raw = self.require(name, element)?;
        raw.trim().parse().map_err(|_| {
            Error::MalformedDocument(format!("<{element}> {name}=\"{raw}\" is not an integer"))
        })
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        match self.get(name) {
            Some(v) => v.trim() == "true",
            None => default,
        }
    }
}

/// One open element.
struct Frame {
    element: String,
    node: Option<NodeId>,
    rules: &'static [Rule],
}

/// Reads project documents.
#[derive(Debug, Clone, Default)]
pub struct ProjectReader {
    config: LoadConfig,
}

impl ProjectReader {
    /// Create a reader with the given configuration.
    pub fn new(config: LoadConfig) -> Self {
        Self { config }
    }

    /// Read a whole document.
    ///
    /// On any error the partially built graph is dropped; the caller only
    /// sees the error.
    pub fn read<R: BufRead>(&self, input: R) -> Result<(Project, IdentityMap)> {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);

        let mut state = LoadState::new(&self.config);
        let mut buf = Vec::new();
        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(quick_xml::Error::Io(e)) => {
                        return Err(Error::Io(std::io::Error::new(e.kind(), e.to_string())))
                }
                Err(e) => {
                    return Err(Error::MalformedDocument(format!(
                        "{e} (at byte {})",
                        reader.buffer_position()
                    )))
                }
            };
            match event {
                Event::Start(e) => state.open(&e)?,
                Event::Empty(e) => {
                    state.open(&e)?;
                    state.close()?;
                }
                Event::End(_) => state.close()?,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        state.finish()
    }
}

struct LoadState<'c> {
    config: &'c LoadConfig,
    graph: SchemaGraph,
    ids: IdentityMap,
    frames: Vec<Frame>,
    path: String,
    name: Option<String>,
    connections: Vec<ConnectionSpec>,
    connection_ids: HashMap<String, String>,
    target: Option<NodeId>,
    ddl: DdlGeneratorSettings,
    diagram: DiagramLayout,
}

/// Structural violations found while linking are document errors.
fn as_document_error(e: Error) -> Error {
    match e {
        Error::InvalidStructure(msg) => Error::MalformedDocument(msg),
        other => other,
    }
}

impl<'c> LoadState<'c> {
    fn new(config: &'c LoadConfig) -> Self {
        Self {
            config,
            graph: SchemaGraph::new(),
            ids: IdentityMap::new(),
            frames: Vec::new(),
            path: String::new(),
            name: None,
            connections: Vec::new(),
            connection_ids: HashMap::new(),
            target: None,
            ddl: DdlGeneratorSettings::default(),
            diagram: DiagramLayout::default(),
        }
    }

    fn open(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let element = std::str::from_utf8(e.name().as_ref())
            .map_err(|err| Error::MalformedDocument(err.to_string()))?
            .to_string();
        if self.frames.is_empty() && self.name.is_some() {
            return Err(Error::MalformedDocument(format!(
                "<{element}> follows the document element"
            )));
        }
        if !self.path.is_empty() {
            self.path.push('/');
        }
        self.path.push_str(&element);

        let rules = rules_for(&self.path).ok_or_else(|| {
            Error::MalformedDocument(format!("unexpected element at {}", self.path))
        })?;
        let attrs = Attrs::parse(e)?;

        let mut node = None;
        for rule in rules {
            match rule {
                Header => self.header(&attrs),
                Connection => self.connection(&attrs)?,
                Create(node_type) => {
                    node = Some(self.create(*node_type, &element, &attrs).map_err(as_document_error)?)
                }
                SetProperties => {
                    if let Some(node) = node {
                        self.set_properties(node, &attrs)?;
                    }
                }
                Reference => self.reference(&element, &attrs).map_err(as_document_error)?,
                TargetReference => self.target_reference(&element, &attrs)?,
                PopulationFailure => {
                    let parent = self.nearest_node().ok_or_else(|| {
                        Error::MalformedDocument("<sql-exception> outside a node".into())
                    })?;
                    let message = attrs.get("message").unwrap_or_default().to_string();
                    node = Some(
                        self.graph
                            .mark_failed(parent, message)
                            .map_err(as_document_error)?,
                    );
                }
                DdlGenerator => self.ddl_generator(&attrs),
                DdlFile => {
                    if let Some(path) = attrs.get("path") {
                        self.ddl.file = Some(PathBuf::from(path));
                    }
                }
                TablePane => self.table_pane(&element, &attrs)?,
                TableLink => self.table_link(&element, &attrs)?,
                LinkChild | LinkSourceDatabase | LinkTarget => {}
            }
        }

        self.frames.push(Frame {
            element,
            node,
            rules,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::MalformedDocument("unbalanced end tag".into()))?;
        match self.path.rfind('/') {
            Some(i) => self.path.truncate(i),
            None => self.path.clear(),
        }

        let Some(node) = frame.node else {
            return Ok(());
        };
        if self.graph.node_type(node)? == NodeType::Table {
            self.graph
                .ensure_table_folders(node, PopulationState::Unpopulated);
        }
        for rule in frame.rules {
            match rule {
                LinkChild => {
                    let parent = self.nearest_node().ok_or_else(|| {
                        Error::MalformedDocument(format!("<{}> outside a node", frame.element))
                    })?;
                    self.graph
                        .attach_loaded(parent, node)
                        .map_err(as_document_error)?;
                }
                LinkSourceDatabase => {
                    let root = self.graph.root();
                    self.graph
                        .attach_loaded(root, node)
                        .map_err(as_document_error)?;
                }
                LinkTarget => self.target = Some(node),
                _ => {}
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<(Project, IdentityMap)> {
        if !self.frames.is_empty() {
            return Err(Error::MalformedDocument(format!(
                "document ended inside {}",
                self.path
            )));
        }
        let Some(name) = self.name else {
            return Err(Error::MalformedDocument(
                "missing architect-project element".into(),
            ));
        };
        let mut graph = self.graph;
        let target = match self.target {
            Some(target) => target,
            None => graph.create(NodeKind::Database(DatabaseProps::new(
                crate::project::DEFAULT_TARGET_NAME,
            ))),
        };
        debug!(project = %name, identifiers = self.ids.len(), "Read project document");
        let project = Project::from_parts(
            name,
            graph,
            target,
            self.connections,
            self.ddl,
            self.diagram,
        );
        Ok((project, self.ids))
    }

    fn nearest_node(&self) -> Option<NodeId> {
        self.frames.iter().rev().find_map(|f| f.node)
    }

    fn header(&mut self, attrs: &Attrs) {
        if let Some(version) = attrs.get("version") {
            if version != FORMAT_VERSION {
                warn!(version, expected = FORMAT_VERSION, "Unexpected document version");
            }
        }
        self.name = Some(
            attrs
                .get("name")
                .unwrap_or(crate::project::DEFAULT_PROJECT_NAME)
                .to_string(),
        );
    }

    fn connection(&mut self, attrs: &Attrs) -> Result<()> {
        let id = attrs.require(ATTR_ID, "dbcs")?.to_string();
        let text = |name: &str| attrs.get(name).unwrap_or_default().to_string();
        let spec = ConnectionSpec {
            name: text("connection-name"),
            display_name: text("display-name"),
            driver_class: text("driver-class"),
            url: text("jdbc-url"),
            user: text("user-name"),
            password: text("user-pass"),
            seq_no: match attrs.get("sequence-number") {
                Some(_) => attrs.int("sequence-number", "dbcs")?,
                None => 0,
            },
            single_login: attrs.flag("single-login", false),
        };
        if self.connection_ids.contains_key(&id) {
            return Err(Error::DuplicateIdentifier(id));
        }
        self.connection_ids.insert(id, spec.name.clone());
        self.connections.push(spec);
        Ok(())
    }

    /// Resolve a reference attribute that may be absent.
    ///
    /// A miss is fatal unless the attribute is configured as optional.
    fn resolve(&self, attrs: &Attrs, attribute: &str) -> Result<Option<NodeId>> {
        let Some(id) = attrs.get(attribute) else {
            return Ok(None);
        };
        match self.ids.node_of(id) {
            Some(node) => Ok(Some(node)),
            None if self.config.is_optional(attribute) => {
                warn!(attribute, id, "Ignoring reference to an unknown element");
                Ok(None)
            }
            None => Err(Error::DanglingReference {
                id: id.to_string(),
                attribute: attribute.to_string(),
            }),
        }
    }

    /// Resolve a mandatory reference to a node of `expected` type.
    fn require_ref(
        &self,
        attrs: &Attrs,
        attribute: &str,
        element: &str,
        expected: NodeType,
    ) -> Result<NodeId> {
        let id = attrs.require(attribute, element)?;
        let node = self
            .ids
            .node_of(id)
            .ok_or_else(|| Error::DanglingReference {
                id: id.to_string(),
                attribute: attribute.to_string(),
            })?;
        let actual = self.graph.node_type(node)?;
        if actual != expected {
            return Err(Error::MalformedDocument(format!(
                "{attribute}=\"{id}\" names a {actual}, expected a {expected}"
            )));
        }
        Ok(node)
    }

    fn state_of(attrs: &Attrs) -> PopulationState {
        if attrs.flag(ATTR_POPULATED, true) {
            PopulationState::Populated
        } else {
            PopulationState::Unpopulated
        }
    }

    /// Node factories.
    fn create(&mut self, node_type: NodeType, element: &str, attrs: &Attrs) -> Result<NodeId> {
        let state = Self::state_of(attrs);
        let node = match node_type {
            NodeType::Database => {
                let mut props = DatabaseProps::default();
                if let Some(id) = attrs.get(ATTR_DBCS_REF) {
                    match self.connection_ids.get(id) {
                        Some(name) => props.connection = Some(name.clone()),
                        None if self.config.is_optional(ATTR_DBCS_REF) => {
                            warn!(id, "Ignoring reference to an unknown connection spec");
                        }
                        None => {
                            return Err(Error::DanglingReference {
                                id: id.to_string(),
                                attribute: ATTR_DBCS_REF.to_string(),
                            })
                        }
                    }
                }
                self.graph.alloc(NodeKind::Database(props), state)
            }
            NodeType::Catalog => self
                .graph
                .alloc(NodeKind::Catalog(CatalogProps::new("")), state),
            NodeType::Schema => self
                .graph
                .alloc(NodeKind::Schema(SchemaProps::new("")), state),
            // Laziness of a table lives in its folders.
            NodeType::Table => self.graph.alloc(
                NodeKind::Table(TableProps::new("")),
                PopulationState::Populated,
            ),
            NodeType::Folder => {
                let folder_type = match attrs.get(ATTR_TYPE) {
                    Some(raw) => raw
                        .trim()
                        .parse()
                        .ok()
                        .and_then(FolderType::from_code)
                        .ok_or_else(|| {
                            Error::MalformedDocument(format!("unknown folder type \"{raw}\""))
                        })?,
                    None => attrs
                        .get("name")
                        .and_then(FolderType::from_name)
                        .ok_or_else(|| {
                            Error::MalformedDocument(
                                "folder has neither a type nor a known name".into(),
                            )
                        })?,
                };
                self.graph
                    .alloc(NodeKind::Folder(FolderProps::new(folder_type)), state)
            }
            NodeType::Column => {
                let mut props = ColumnProps::new("", 0);
                props.source_column = self.resolve(attrs, ATTR_SOURCE_COLUMN_REF)?;
                self.graph.alloc(NodeKind::Column(props), state)
            }
            NodeType::Relationship => self.relationship(element, attrs)?,
            NodeType::ColumnMapping => {
                let pk_column =
                    self.require_ref(attrs, ATTR_PK_COLUMN_REF, element, NodeType::Column)?;
                let fk_column =
                    self.require_ref(attrs, ATTR_FK_COLUMN_REF, element, NodeType::Column)?;
                self.graph.alloc(
                    NodeKind::ColumnMapping {
                        pk_column,
                        fk_column,
                    },
                    PopulationState::Populated,
                )
            }
            NodeType::Root | NodeType::ExceptionPlaceholder => {
                return Err(Error::UnsupportedNodeVariant(node_type))
            }
        };
        if let Some(id) = attrs.get(ATTR_ID) {
            self.ids.insert(id.to_string(), node)?;
        }
        Ok(node)
    }

    /// Build a relationship, attach it to the primary-key table and link it
    /// into the foreign-key table.
    fn relationship(&mut self, element: &str, attrs: &Attrs) -> Result<NodeId> {
        let pk_table = self.require_ref(attrs, ATTR_PK_TABLE_REF, element, NodeType::Table)?;
        let fk_table = self.require_ref(attrs, ATTR_FK_TABLE_REF, element, NodeType::Table)?;
        let exported = self
            .graph
            .folder(pk_table, FolderType::ExportedKeys)
            .ok_or_else(|| Error::MalformedDocument(format!("{pk_table} has no exported keys")))?;
        let imported = self
            .graph
            .folder(fk_table, FolderType::ImportedKeys)
            .ok_or_else(|| Error::MalformedDocument(format!("{fk_table} has no imported keys")))?;
        // A key folder the document left out holds what the document records.
        for folder in [exported, imported] {
            if self.graph.population_state(folder)? == PopulationState::Unpopulated {
                self.graph.set_state(folder, PopulationState::Populated);
            }
        }

        let relationship = self.graph.alloc(
            NodeKind::Relationship {
                fk_table,
                props: RelationshipProps::new(""),
            },
            PopulationState::Populated,
        );
        self.graph.attach_loaded(exported, relationship)?;
        self.graph.link_loaded(imported, relationship)?;
        Ok(relationship)
    }

    fn set_properties(&mut self, node: NodeId, attrs: &Attrs) -> Result<()> {
        let node_type = self.graph.node_type(node)?;
        for (name, raw) in &attrs.0 {
            if name == ATTR_ID || name == ATTR_POPULATED || is_reference_attribute(name) {
                continue;
            }
            if node_type == NodeType::Folder && name == ATTR_TYPE {
                continue;
            }
            match PropertyDescriptor::by_attribute(node_type, name) {
                Some(desc) => {
                    let value = desc.value_type.parse(raw).map_err(|e| match e {
                        Error::MalformedDocument(msg) => {
                            Error::MalformedDocument(format!("{node_type} {name}: {msg}"))
                        }
                        other => other,
                    })?;
                    self.graph.set_loaded(node, desc.property, value)?;
                }
                None => debug!(%node_type, attribute = %name, "Ignoring unknown attribute"),
            }
        }
        Ok(())
    }

    /// Relink a registered node where the reference appears.
    fn reference(&mut self, element: &str, attrs: &Attrs) -> Result<()> {
        let id = attrs.require(ATTR_REF_ID, element)?;
        let node = self.ids.node_of(id).ok_or_else(|| Error::DanglingReference {
            id: id.to_string(),
            attribute: ATTR_REF_ID.to_string(),
        })?;
        let node_type = self.graph.node_type(node)?;
        if let Some(declared) = attrs.get(ATTR_TYPE) {
            if node_type.element_name() != Some(declared) {
                return Err(Error::MalformedDocument(format!(
                    "reference {id} declares type {declared} but names a {node_type}"
                )));
            }
        }
        let parent = self
            .nearest_node()
            .ok_or_else(|| Error::MalformedDocument(format!("reference {id} outside a node")))?;

        let is_imported_keys = matches!(
            self.graph.kind(parent)?,
            NodeKind::Folder(f) if f.folder_type == FolderType::ImportedKeys
        );
        if node_type == NodeType::Relationship && is_imported_keys {
            if !self.graph.children(parent).contains(&node) {
                self.graph.link_loaded(parent, node)?;
            }
            return Ok(());
        }
        match self.graph.parent(node) {
            None => self.graph.attach_loaded(parent, node),
            Some(owner) if owner == parent => Ok(()),
            Some(owner) => Err(Error::MalformedDocument(format!(
                "reference {id} would give {node} a second parent (already under {owner})"
            ))),
        }
    }

    fn target_reference(&mut self, element: &str, attrs: &Attrs) -> Result<()> {
        let node = self.require_ref(attrs, ATTR_REF_ID, element, NodeType::Database)?;
        if let Some(declared) = attrs.get(ATTR_TYPE) {
            if declared != "database" {
                return Err(Error::MalformedDocument(format!(
                    "target database reference declares type {declared}"
                )));
            }
        }
        self.target = Some(node);
        Ok(())
    }

    fn ddl_generator(&mut self, attrs: &Attrs) {
        if let Some(generator) = attrs.get(ATTR_TYPE) {
            self.ddl.generator = generator.to_string();
        }
        self.ddl.allow_connection = attrs.flag("allow-connection", true);
        self.ddl.target_catalog = attrs.get("target-catalog").map(str::to_string);
        self.ddl.target_schema = attrs.get("target-schema").map(str::to_string);
    }

    fn table_pane(&mut self, element: &str, attrs: &Attrs) -> Result<()> {
        let Some(table) = self.resolve(attrs, "table-ref")? else {
            return Ok(());
        };
        if self.graph.node_type(table)? != NodeType::Table {
            return Err(Error::MalformedDocument(format!(
                "table-ref names a {}, expected a table",
                self.graph.node_type(table)?
            )));
        }
        let (x, y) = (attrs.int("x", element)?, attrs.int("y", element)?);
        self.diagram.place_table(table, x, y);
        Ok(())
    }

    fn table_link(&mut self, element: &str, attrs: &Attrs) -> Result<()> {
        let Some(relationship) = self.resolve(attrs, "relationship-ref")? else {
            return Ok(());
        };
        if self.graph.node_type(relationship)? != NodeType::Relationship {
            return Err(Error::MalformedDocument(
                "relationship-ref does not name a relationship".into(),
            ));
        }
        let pk = (attrs.int("pk-x", element)?, attrs.int("pk-y", element)?);
        let fk = (attrs.int("fk-x", element)?, attrs.int("fk-y", element)?);
        self.diagram.place_link(relationship, pk, fk);
        Ok(())
    }
}
