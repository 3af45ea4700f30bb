//! Command implementations.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use schemagraph_core::{NodeId, NodeKind, NodeType, PopulationState, Project, SchemaGraph};

use crate::config::CliConfig;
use crate::error::{Error, Result};
use crate::formatter::{create_formatter, OutputFormat};

/// Totals for one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseSummary {
    pub name: String,
    /// "source", "target" or "source, target".
    pub role: &'static str,
    pub state: &'static str,
    pub connection: Option<String>,
    pub tables: usize,
    pub columns: usize,
    pub relationships: usize,
    /// Containers whose children were never fetched or failed to load.
    pub unpopulated: usize,
}

/// Totals for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub connections: usize,
    pub diagram_items: usize,
    pub databases: Vec<DatabaseSummary>,
}

/// One node of the printed tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeLine {
    pub depth: usize,
    pub kind: String,
    pub name: String,
    pub state: &'static str,
    /// The node is a relationship linked into an imported-keys folder.
    pub link: bool,
}

fn state_label(state: PopulationState) -> &'static str {
    match state {
        PopulationState::Populated => "populated",
        PopulationState::Unpopulated => "unpopulated",
        PopulationState::PopulationFailed => "failed",
    }
}

/// Databases shown for a project with their roles: the sources in order,
/// then the target when it is not one of them.
fn databases(project: &Project) -> Vec<(NodeId, &'static str)> {
    let target = project.target_database();
    let mut dbs: Vec<(NodeId, &'static str)> = project
        .source_databases()
        .into_iter()
        .map(|db| (db, if db == target { "source, target" } else { "source" }))
        .collect();
    if !dbs.iter().any(|(db, _)| *db == target) {
        dbs.push((target, "target"));
    }
    dbs
}

fn summarize_database(graph: &SchemaGraph, db: NodeId, role: &'static str) -> Result<DatabaseSummary> {
    let (name, connection) = match graph.kind(db)? {
        NodeKind::Database(props) => (props.name.clone(), props.connection.clone()),
        other => (other.display_name().unwrap_or_default().to_string(), None),
    };
    let mut summary = DatabaseSummary {
        name,
        role,
        state: state_label(graph.population_state(db)?),
        connection,
        tables: 0,
        columns: 0,
        relationships: 0,
        unpopulated: 0,
    };
    for node in graph.subtree(db) {
        match graph.node_type(node)? {
            NodeType::Table => summary.tables += 1,
            NodeType::Column => summary.columns += 1,
            NodeType::Relationship => summary.relationships += 1,
            _ => {}
        }
        if graph.population_state(node)? != PopulationState::Populated {
            summary.unpopulated += 1;
        }
    }
    Ok(summary)
}

/// Per-database totals of `project`.
pub fn summarize(project: &Project) -> Result<ProjectSummary> {
    let graph = project.graph();
    let databases = databases(project)
        .into_iter()
        .map(|(db, role)| summarize_database(graph, db, role))
        .collect::<Result<Vec<_>>>()?;
    Ok(ProjectSummary {
        name: project.name().to_string(),
        connections: project.connections().len(),
        diagram_items: project.diagram().len(),
        databases,
    })
}

fn walk(graph: &SchemaGraph, node: NodeId, depth: usize, link: bool, lines: &mut Vec<TreeLine>) -> Result<()> {
    let kind = graph.kind(node)?;
    lines.push(TreeLine {
        depth,
        kind: kind.node_type().to_string(),
        name: kind.display_name().unwrap_or_default().to_string(),
        state: state_label(graph.population_state(node)?),
        link,
    });
    if link {
        return Ok(());
    }
    for &child in graph.children(node) {
        walk(graph, child, depth + 1, graph.is_link(node, child), lines)?;
    }
    Ok(())
}

/// Every node of `project`, depth first.
pub fn tree(project: &Project) -> Result<Vec<TreeLine>> {
    let graph = project.graph();
    let mut lines = Vec::new();
    for (db, _) in databases(project) {
        walk(graph, db, 0, false, &mut lines)?;
    }
    Ok(lines)
}

/// Count nodes below the shown databases that still wait for population.
fn count_unpopulated(project: &Project) -> Result<usize> {
    let graph = project.graph();
    let mut count = 0;
    for (db, _) in databases(project) {
        for node in graph.subtree(db) {
            if graph.population_state(node)? != PopulationState::Populated {
                count += 1;
            }
        }
    }
    Ok(count)
}

/// Summarize a project document.
pub fn inspect(path: &Path, config: &CliConfig, format: OutputFormat, as_tree: bool) -> Result<String> {
    let (project, _) = Project::load_from_path(path, &config.load)?;
    let formatter = create_formatter(format);
    if as_tree {
        formatter.format_tree(&tree(&project)?)
    } else {
        formatter.format_summary(&summarize(&project)?)
    }
}

/// Load a document and save it to `output`, or back over `path`.
pub fn resave(path: &Path, output: Option<&Path>, config: &CliConfig) -> Result<String> {
    let (mut project, _) = Project::load_from_path(path, &config.load)?;
    if config.save.save_entire_source {
        let count = count_unpopulated(&project)?;
        if count > 0 {
            return Err(Error::Incomplete { count });
        }
    }
    let target = output.unwrap_or(path);
    let ids = project.save_to_path(target, &config.save)?;
    info!(from = %path.display(), to = %target.display(), "Resaved project");
    Ok(format!("Wrote {} element(s) to {}", ids.len(), target.display()))
}

/// Verify that a document loads and saves back to identical bytes.
pub fn check(path: &Path, config: &CliConfig) -> Result<String> {
    let original = fs::read(path)?;
    let (mut project, ids) = Project::load(&original[..], &config.load)?;

    let mut first = Vec::new();
    project.save(&mut first, &config.save)?;
    let (mut reloaded, _) = Project::load(&first[..], &config.load)?;
    let mut second = Vec::new();
    reloaded.save(&mut second, &config.save)?;

    if first != second {
        let offset = first
            .iter()
            .zip(&second)
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| first.len().min(second.len()));
        return Err(Error::Unstable { offset });
    }

    let canonical = original == first;
    if !canonical {
        warn!(path = %path.display(), "Document is not in canonical form");
    }
    Ok(format!(
        "{}: {} element(s), round trip stable, {}",
        path.display(),
        ids.len(),
        if canonical { "canonical" } else { "not canonical (run resave)" }
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemagraph_core::{
        ColumnProps, DatabaseProps, LoadConfig, RelationshipProps, SaveConfig, TableProps,
    };
    use std::path::PathBuf;

    fn config() -> CliConfig {
        CliConfig {
            load: LoadConfig::default(),
            save: SaveConfig::default(),
        }
    }

    fn write_sample(dir: &Path) -> PathBuf {
        let mut project = Project::new("shop");
        let graph = project.graph_mut();
        let db = graph.create(NodeKind::Database(DatabaseProps::new("sales")));
        let customer = graph.create_table(TableProps::new("customer"));
        graph.append_child(db, customer).unwrap();
        let id = graph
            .add_column(customer, ColumnProps::new("id", 4).primary_key(1))
            .unwrap();
        let orders = graph.create_table(TableProps::new("orders"));
        graph.append_child(db, orders).unwrap();
        let fk = graph
            .add_column(orders, ColumnProps::new("customer_id", 4))
            .unwrap();
        graph
            .create_relationship(customer, orders, RelationshipProps::new("fk"), &[(id, fk)])
            .unwrap();
        let lazy = graph
            .create_unpopulated(NodeKind::Database(DatabaseProps::new("lazy")))
            .unwrap();
        project.add_source_database(db).unwrap();
        project.add_source_database(lazy).unwrap();

        let path = dir.join("shop.architect");
        project.save_to_path(&path, &SaveConfig::default()).unwrap();
        path
    }

    #[test]
    fn test_inspect_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());
        let (project, _) = Project::load_from_path(&path, &LoadConfig::default()).unwrap();

        let summary = summarize(&project).unwrap();

        assert_eq!(summary.databases.len(), 3);
        let sales = &summary.databases[0];
        assert_eq!(sales.name, "sales");
        assert_eq!(sales.tables, 2);
        assert_eq!(sales.columns, 2);
        assert_eq!(sales.relationships, 1);
        assert_eq!(summary.databases[1].state, "unpopulated");
        assert_eq!(summary.databases[2].role, "target");
    }

    #[test]
    fn test_tree_shows_relationship_link() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());
        let (project, _) = Project::load_from_path(&path, &LoadConfig::default()).unwrap();

        let lines = tree(&project).unwrap();

        let relationships: Vec<&TreeLine> =
            lines.iter().filter(|l| l.kind == "relationship").collect();
        assert_eq!(relationships.len(), 2);
        assert_eq!(relationships.iter().filter(|l| l.link).count(), 1);
        assert_eq!(lines[0].depth, 0);
    }

    #[test]
    fn test_inspect_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let output = inspect(&path, &config(), OutputFormat::Json, false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["name"], "shop");
    }

    #[test]
    fn test_check_canonical_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let message = check(&path, &config()).unwrap();

        assert!(message.ends_with(", canonical"), "{message}");
    }

    #[test]
    fn test_resave_with_wider_indent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());
        let out = dir.path().join("wide.architect");
        let mut config = config();
        config.save = SaveConfig::new().with_indent(4);

        resave(&path, Some(&out), &config).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("\n    <source-databases>"));
        assert!(check(&out, &config).unwrap().ends_with(", canonical"));
        assert!(check(&out, &self::config()).unwrap().contains("not canonical"));
    }

    #[test]
    fn test_resave_entire_source_refuses_lazy_subtrees() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());
        let mut config = config();
        config.save = SaveConfig::new().with_entire_source(true);

        let result = resave(&path, None, &config);

        assert!(matches!(result, Err(Error::Incomplete { count }) if count > 0));
    }

    #[test]
    fn test_check_reports_dangling_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());
        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.replace("fk-table-ref=\"", "fk-table-ref=\"X")).unwrap();

        let result = check(&path, &config());

        assert!(matches!(
            result,
            Err(Error::Core(schemagraph_core::Error::DanglingReference { .. }))
        ));
    }
}
