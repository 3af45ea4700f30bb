//! A design project: the schema graph plus its connection specs, DDL
//! settings and diagram layout.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{LoadConfig, SaveConfig};
use crate::error::{Error, Result};
use crate::event::{ListenerId, ModificationTracker};
use crate::model::{DatabaseProps, NodeId, NodeKind, NodeType, Populator, SchemaGraph};
use crate::persist::{IdentityMap, ProjectReader, ProjectWriter};
use crate::progress::{NoProgress, ProgressSink};

/// Project shared between threads: many readers or one writer.
pub type SharedProject = Arc<RwLock<Project>>;

/// Default name of a new project.
pub const DEFAULT_PROJECT_NAME: &str = "New Project";

/// Default name of the target database.
pub const DEFAULT_TARGET_NAME: &str = "Target Database";

/// Default DDL generator identifier.
pub const DEFAULT_DDL_GENERATOR: &str = "generic";

/// A named database connection the source databases were read from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionSpec {
    /// Unique name; databases refer to it.
    pub name: String,
    /// Name shown to users.
    pub display_name: String,
    /// Driver identifier.
    pub driver_class: String,
    /// Connection URL.
    pub url: String,
    /// User name.
    pub user: String,
    /// Password, stored as given.
    pub password: String,
    /// Ordering among connections.
    pub seq_no: i32,
    /// Whether one login is shared by every use.
    pub single_login: bool,
}

impl ConnectionSpec {
    /// Create a connection spec with the given name and URL.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the driver identifier.
    pub fn with_driver(mut self, driver_class: impl Into<String>) -> Self {
        self.driver_class = driver_class.into();
        self
    }

    /// Set the credentials.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }
}

/// Settings of the DDL generator, persisted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlGeneratorSettings {
    /// Generator identifier.
    pub generator: String,
    /// Whether the generator may execute against a live connection.
    pub allow_connection: bool,
    /// Catalog to generate into.
    pub target_catalog: Option<String>,
    /// Schema to generate into.
    pub target_schema: Option<String>,
    /// Output script path.
    pub file: Option<PathBuf>,
}

impl Default for DdlGeneratorSettings {
    fn default() -> Self {
        Self {
            generator: DEFAULT_DDL_GENERATOR.to_string(),
            allow_connection: true,
            target_catalog: None,
            target_schema: None,
            file: None,
        }
    }
}

/// Position of a table on the diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePlacement {
    /// The table.
    pub table: NodeId,
    /// Horizontal position.
    pub x: i32,
    /// Vertical position.
    pub y: i32,
}

/// Connection points of a relationship line on the diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPlacement {
    /// The relationship.
    pub relationship: NodeId,
    /// Point on the primary-key table.
    pub pk_point: (i32, i32),
    /// Point on the foreign-key table.
    pub fk_point: (i32, i32),
}

/// Diagram layout of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramLayout {
    /// Table positions, in drawing order.
    pub tables: Vec<TablePlacement>,
    /// Relationship lines.
    pub links: Vec<LinkPlacement>,
}

impl DiagramLayout {
    /// Place `table` at (x, y), replacing an earlier placement.
    pub fn place_table(&mut self, table: NodeId, x: i32, y: i32) {
        match self.tables.iter_mut().find(|p| p.table == table) {
            Some(p) => {
                p.x = x;
                p.y = y;
            }
            None => self.tables.push(TablePlacement { table, x, y }),
        }
    }

    /// Set the connection points of `relationship`.
    pub fn place_link(&mut self, relationship: NodeId, pk_point: (i32, i32), fk_point: (i32, i32)) {
        match self.links.iter_mut().find(|l| l.relationship == relationship) {
            Some(l) => {
                l.pk_point = pk_point;
                l.fk_point = fk_point;
            }
            None => self.links.push(LinkPlacement {
                relationship,
                pk_point,
                fk_point,
            }),
        }
    }

    /// Placement of `table`.
    pub fn table(&self, table: NodeId) -> Option<&TablePlacement> {
        self.tables.iter().find(|p| p.table == table)
    }

    /// Number of diagram components.
    pub fn len(&self) -> usize {
        self.tables.len() + self.links.len()
    }

    /// Whether the diagram is empty.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.links.is_empty()
    }
}

/// A schema design project.
#[derive(Debug)]
pub struct Project {
    name: String,
    graph: SchemaGraph,
    target_database: NodeId,
    connections: Vec<ConnectionSpec>,
    ddl_generator: DdlGeneratorSettings,
    diagram: DiagramLayout,
    tracker: Arc<ModificationTracker>,
    tracker_id: ListenerId,
}

impl Default for Project {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECT_NAME)
    }
}

impl Project {
    /// Create an empty project with a detached target database.
    pub fn new(name: impl Into<String>) -> Self {
        let mut graph = SchemaGraph::new();
        let target_database =
            graph.create(NodeKind::Database(DatabaseProps::new(DEFAULT_TARGET_NAME)));
        Self::from_parts(
            name.into(),
            graph,
            target_database,
            Vec::new(),
            DdlGeneratorSettings::default(),
            DiagramLayout::default(),
        )
    }

    pub(crate) fn from_parts(
        name: String,
        mut graph: SchemaGraph,
        target_database: NodeId,
        connections: Vec<ConnectionSpec>,
        ddl_generator: DdlGeneratorSettings,
        diagram: DiagramLayout,
    ) -> Self {
        let tracker = Arc::new(ModificationTracker::new());
        let tracker_id = graph.subscribe(tracker.clone());
        Self {
            name,
            graph,
            target_database,
            connections,
            ddl_generator,
            diagram,
            tracker,
            tracker_id,
        }
    }

    /// Wrap the project for sharing between threads.
    pub fn into_shared(self) -> SharedProject {
        Arc::new(RwLock::new(self))
    }

    /// Project name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the project.
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name != self.name {
            self.name = name;
            self.tracker.mark_modified();
        }
    }

    /// The schema graph.
    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    /// Mutable access to the schema graph.
    pub fn graph_mut(&mut self) -> &mut SchemaGraph {
        &mut self.graph
    }

    /// Source databases, in order.
    pub fn source_databases(&self) -> Vec<NodeId> {
        self.graph.children(self.graph.root()).to_vec()
    }

    /// Append a source database.
    pub fn add_source_database(&mut self, database: NodeId) -> Result<()> {
        let root = self.graph.root();
        self.graph.append_child(root, database)
    }

    /// Replace the source databases as one compound edit.
    ///
    /// Everything is checked before the first removal, so a rejected list
    /// leaves the current databases in place.
    pub fn set_source_databases(&mut self, databases: &[NodeId]) -> Result<()> {
        let root = self.graph.root();
        for (i, &db) in databases.iter().enumerate() {
            if self.graph.node_type(db)? != NodeType::Database {
                return Err(Error::InvalidStructure(format!("{db} is not a database")));
            }
            if let Some(owner) = self.graph.parent(db).filter(|&p| p != root) {
                return Err(Error::InvalidStructure(format!(
                    "{db} already belongs to {owner}"
                )));
            }
            if databases[..i].contains(&db) {
                return Err(Error::InvalidStructure(format!("{db} is listed twice")));
            }
        }
        for &db in self.graph.children(root) {
            self.graph.check_unmapped(db)?;
        }
        self.graph.compound("Replace source databases", |g| {
            for db in g.children(root).to_vec().into_iter().rev() {
                g.remove_child(root, db)?;
            }
            for &db in databases {
                g.append_child(root, db)?;
            }
            Ok(())
        })
    }

    /// The target database. It may also be one of the source databases.
    pub fn target_database(&self) -> NodeId {
        self.target_database
    }

    /// Replace the target database.
    pub fn set_target_database(&mut self, database: NodeId) -> Result<()> {
        if self.graph.node_type(database)? != NodeType::Database {
            return Err(Error::InvalidStructure(format!(
                "{database} is not a database"
            )));
        }
        if database != self.target_database {
            self.target_database = database;
            self.tracker.mark_modified();
        }
        Ok(())
    }

    /// Connection specs, in order.
    pub fn connections(&self) -> &[ConnectionSpec] {
        &self.connections
    }

    /// Connection spec named `name`.
    pub fn connection(&self, name: &str) -> Option<&ConnectionSpec> {
        self.connections.iter().find(|c| c.name == name)
    }

    /// Register a connection spec. Names must be unique.
    pub fn add_connection(&mut self, spec: ConnectionSpec) -> Result<()> {
        if self.connection(&spec.name).is_some() {
            return Err(Error::DuplicateIdentifier(spec.name));
        }
        self.connections.push(spec);
        self.tracker.mark_modified();
        Ok(())
    }

    /// DDL generator settings.
    pub fn ddl_generator(&self) -> &DdlGeneratorSettings {
        &self.ddl_generator
    }

    /// Replace the DDL generator settings.
    pub fn set_ddl_generator(&mut self, settings: DdlGeneratorSettings) {
        if settings != self.ddl_generator {
            self.ddl_generator = settings;
            self.tracker.mark_modified();
        }
    }

    /// Diagram layout.
    pub fn diagram(&self) -> &DiagramLayout {
        &self.diagram
    }

    /// Mutable diagram layout. Marks the project modified.
    pub fn diagram_mut(&mut self) -> &mut DiagramLayout {
        self.tracker.mark_modified();
        &mut self.diagram
    }

    /// Whether the project changed since it was last saved or loaded.
    pub fn is_modified(&self) -> bool {
        self.tracker.is_modified()
    }

    /// The dirty-flag listener.
    pub fn tracker(&self) -> &Arc<ModificationTracker> {
        &self.tracker
    }

    /// Listener handle of the dirty-flag tracker.
    pub fn tracker_id(&self) -> ListenerId {
        self.tracker_id
    }

    // ============== Persistence ==============

    /// Write the project document to `out`.
    pub fn save<W: Write>(&mut self, out: W, config: &SaveConfig) -> Result<IdentityMap> {
        self.save_with(out, config, None, &mut NoProgress)
    }

    /// Write the project document, populating lazily loaded subtrees through
    /// `populator` when the configuration asks for the entire source.
    pub fn save_with<W: Write>(
        &mut self,
        out: W,
        config: &SaveConfig,
        populator: Option<&dyn Populator>,
        progress: &mut dyn ProgressSink,
    ) -> Result<IdentityMap> {
        let ids = self.write_document(out, config, populator, progress)?;
        self.tracker.mark_saved();
        Ok(ids)
    }

    /// Emit the document without touching the dirty flag.
    fn write_document<W: Write>(
        &mut self,
        out: W,
        config: &SaveConfig,
        populator: Option<&dyn Populator>,
        progress: &mut dyn ProgressSink,
    ) -> Result<IdentityMap> {
        let mut writer = ProjectWriter::new(config.clone());
        if let Some(populator) = populator {
            writer = writer.with_populator(populator);
        }
        writer.write(self, out, progress)
    }

    /// Save to `path` by writing a sibling file and renaming it into place.
    ///
    /// The project counts as saved only once the rename succeeds.
    pub fn save_to_path(&mut self, path: impl AsRef<Path>, config: &SaveConfig) -> Result<IdentityMap> {
        let path = path.as_ref();
        let mut tmp_name = path.file_name().map(|n| n.to_os_string()).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a file path", path.display()),
            ))
        })?;
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        match self.write_file(&tmp, config) {
            Ok(ids) => {
                if let Err(e) = fs::rename(&tmp, path) {
                    let _ = fs::remove_file(&tmp);
                    return Err(e.into());
                }
                self.tracker.mark_saved();
                info!(path = %path.display(), nodes = ids.len(), "Saved project");
                Ok(ids)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e)
            }
        }
    }

    fn write_file(&mut self, path: &Path, config: &SaveConfig) -> Result<IdentityMap> {
        let mut out = BufWriter::new(File::create(path)?);
        let ids = self.write_document(&mut out, config, None, &mut NoProgress)?;
        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(ids)
    }

    /// Read a project document.
    pub fn load<R: Read>(input: R, config: &LoadConfig) -> Result<(Project, IdentityMap)> {
        ProjectReader::new(config.clone()).read(BufReader::new(input))
    }

    /// Read a project document from `path`.
    pub fn load_from_path(path: impl AsRef<Path>, config: &LoadConfig) -> Result<(Project, IdentityMap)> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let loaded = Self::load(file, config)?;
        debug!(path = %path.display(), nodes = loaded.1.len(), "Loaded project");
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TableProps;

    fn database(project: &mut Project, name: &str) -> NodeId {
        project
            .graph_mut()
            .create(NodeKind::Database(DatabaseProps::new(name)))
    }

    #[test]
    fn test_new_project_is_clean() {
        let project = Project::new("p");

        assert!(!project.is_modified());
        assert!(project.source_databases().is_empty());
        assert!(project.graph().parent(project.target_database()).is_none());
    }

    #[test]
    fn test_edits_mark_modified() {
        let mut project = Project::new("p");
        let db = database(&mut project, "db");

        project.add_source_database(db).unwrap();

        assert!(project.is_modified());
        project.tracker().mark_saved();
        project.diagram_mut().place_table(db, 1, 2);
        assert!(project.is_modified());
    }

    #[test]
    fn test_set_source_databases_replaces_in_order() {
        let mut project = Project::new("p");
        let a = database(&mut project, "a");
        let b = database(&mut project, "b");
        let c = database(&mut project, "c");
        project.add_source_database(a).unwrap();
        project.add_source_database(b).unwrap();

        project.set_source_databases(&[c, a]).unwrap();

        assert_eq!(project.source_databases(), vec![c, a]);
        assert_eq!(project.graph().parent(b), None);
        assert_eq!(project.graph().compound_depth(), 0);
    }

    #[test]
    fn test_set_source_databases_rejects_non_database() {
        let mut project = Project::new("p");
        let table = project.graph_mut().create_table(TableProps::new("t"));

        assert!(project.set_source_databases(&[table]).is_err());
    }

    #[test]
    fn test_failed_save_keeps_modified() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::new("p");
        let db = database(&mut project, "db");
        project.add_source_database(db).unwrap();

        // a non-empty directory cannot be replaced by the rename
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();
        let result = project.save_to_path(&path, &SaveConfig::default());

        assert!(result.is_err());
        assert!(project.is_modified());
        assert!(!dir.path().join("occupied.tmp").exists());

        let path = dir.path().join("p.architect");
        project.save_to_path(&path, &SaveConfig::default()).unwrap();
        assert!(!project.is_modified());
    }

    #[test]
    fn test_duplicate_connection_name() {
        let mut project = Project::new("p");
        project
            .add_connection(ConnectionSpec::new("prod", "jdbc:postgresql://db/prod"))
            .unwrap();

        let result = project.add_connection(ConnectionSpec::new("prod", "jdbc:other"));

        assert!(matches!(result, Err(Error::DuplicateIdentifier(_))));
    }

    #[test]
    fn test_root_in_target_slot_is_unsupported() {
        let mut project = Project::new("p");
        project.target_database = project.graph().root();

        let result = project.save(Vec::new(), &SaveConfig::default());

        assert!(matches!(
            result,
            Err(Error::UnsupportedNodeVariant(NodeType::Root))
        ));
    }

    #[test]
    fn test_diagram_placement_replaces() {
        let mut layout = DiagramLayout::default();
        layout.place_table(NodeId(3), 1, 1);
        layout.place_table(NodeId(3), 5, 6);

        assert_eq!(layout.tables.len(), 1);
        assert_eq!(layout.table(NodeId(3)).map(|p| (p.x, p.y)), Some((5, 6)));
    }
}
