//! Integration tests for the change-notification and undo contract.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use schemagraph_core::{
    CatalogProps, ColumnProps, DatabaseProps, Error, FolderType, GraphEvent, GraphListener,
    NoProgress, NodeId, NodeKind, NodeTemplate, NodeType, PopulationError, PopulationState,
    Populator, ProgressSink, Project, Property, PropertyDescriptor, PropertyValue, RelationshipProps,
    SchemaGraph, SchemaProps, TableProps, UndoConfig, UndoError, UndoManager,
};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<GraphEvent>>,
}

impl Recorder {
    fn take(&self) -> Vec<GraphEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl GraphListener for Recorder {
    fn on_event(&self, event: &GraphEvent) {
        self.events.lock().push(event.clone());
    }
}

struct Templates(Vec<NodeTemplate>);

impl Populator for Templates {
    fn populate(
        &self,
        _graph: &SchemaGraph,
        _node: NodeId,
        _progress: &mut dyn ProgressSink,
    ) -> Result<Vec<NodeTemplate>, PopulationError> {
        Ok(self.0.clone())
    }
}

struct Refused;

impl Populator for Refused {
    fn populate(
        &self,
        _graph: &SchemaGraph,
        _node: NodeId,
        _progress: &mut dyn ProgressSink,
    ) -> Result<Vec<NodeTemplate>, PopulationError> {
        Err(PopulationError::new("login failed"))
    }
}

/// One attached node of every variant that has settable properties.
fn node_of_every_type(graph: &mut SchemaGraph) -> Vec<NodeId> {
    let root = graph.root();
    let db = graph.create(NodeKind::Database(DatabaseProps::new("db")));
    graph.append_child(root, db).unwrap();
    let catalog = graph.create(NodeKind::Catalog(CatalogProps::new("cat")));
    graph.append_child(db, catalog).unwrap();
    let schema = graph.create(NodeKind::Schema(SchemaProps::new("public")));
    graph.append_child(catalog, schema).unwrap();

    let parent = graph.create_table(TableProps::new("parent"));
    graph.append_child(schema, parent).unwrap();
    let child = graph.create_table(TableProps::new("child"));
    graph.append_child(schema, child).unwrap();
    let pk = graph
        .add_column(parent, ColumnProps::new("id", 4).primary_key(1))
        .unwrap();
    let fk = graph
        .add_column(child, ColumnProps::new("parent_id", 4))
        .unwrap();
    let relationship = graph
        .create_relationship(parent, child, RelationshipProps::new("fk_parent"), &[(pk, fk)])
        .unwrap();
    let folder = graph.folder(parent, FolderType::Columns).unwrap();

    let broken = graph
        .create_unpopulated(NodeKind::Database(DatabaseProps::new("broken")))
        .unwrap();
    graph.append_child(root, broken).unwrap();
    graph.populate(broken, &Refused, &mut NoProgress).unwrap();
    let placeholder = graph.children(broken)[0];

    vec![db, catalog, schema, parent, folder, pk, relationship, placeholder]
}

#[test]
fn test_every_descriptor_setter_is_undoable() {
    let mut graph = SchemaGraph::new();
    let nodes = node_of_every_type(&mut graph);
    let recorder = Arc::new(Recorder::default());
    graph.subscribe(recorder.clone());
    let undo = UndoManager::attach(&mut graph, UndoConfig::default());

    let mut covered = BTreeSet::new();
    for node in nodes {
        let node_type = graph.node_type(node).unwrap();
        for desc in PropertyDescriptor::for_type(node_type) {
            let old = graph.property(node, desc.property).unwrap();
            let new = desc.value_type.distinct_from(&old);

            assert!(graph.set_property(node, desc.property, new.clone()).unwrap());
            let events = recorder.take();
            assert_eq!(events.len(), 1, "{node_type} {}", desc.property);
            match &events[0] {
                GraphEvent::PropertyChanged(change) => {
                    assert_eq!(change.node, node);
                    assert_eq!(change.property, desc.property);
                    assert_eq!(change.old, old);
                    assert_eq!(change.new, new);
                }
                other => panic!("expected a property change, got {other:?}"),
            }

            assert!(undo.undo(&mut graph).unwrap());
            assert_eq!(graph.property(node, desc.property).unwrap(), old);
            assert!(undo.redo(&mut graph).unwrap());
            assert_eq!(graph.property(node, desc.property).unwrap(), new);
            recorder.take();
            covered.insert((format!("{node_type}"), desc.attribute));
        }
    }

    let all: BTreeSet<_> = schemagraph_core::model::PROPERTIES
        .iter()
        .map(|d| (format!("{}", d.node_type), d.attribute))
        .collect();
    assert_eq!(covered, all);
    assert!(undo.diagnostics().is_empty());
}

#[test]
fn test_setter_with_wrong_type_is_rejected() {
    let mut graph = SchemaGraph::new();
    let table = graph.create_table(TableProps::new("t"));
    let column = graph.add_column(table, ColumnProps::new("c", 4)).unwrap();

    let result = graph.set_property(column, Property::Nullable, PropertyValue::Int(9));

    assert!(matches!(result, Err(Error::InvalidProperty(_))));
    assert!(matches!(
        graph.set_property(table, Property::Scale, PropertyValue::Int(1)),
        Err(Error::InvalidProperty(_))
    ));
}

#[test]
fn test_compound_then_rename_undoes_in_two_steps() {
    let mut graph = SchemaGraph::new();
    let root = graph.root();
    let db = graph.create(NodeKind::Database(DatabaseProps::new("db")));
    graph.append_child(root, db).unwrap();
    let undo = UndoManager::attach(&mut graph, UndoConfig::default());

    let (table, column) = graph
        .compound("Create table T1", |g| {
            let table = g.create_table(TableProps::new("T1"));
            g.append_child(db, table)?;
            let column = g.add_column(table, ColumnProps::new("C1", 12))?;
            Ok((table, column))
        })
        .unwrap();
    graph
        .set_property(column, Property::Name, PropertyValue::Text("C2".into()))
        .unwrap();
    assert_eq!(undo.undo_count(), 2);

    assert!(undo.undo(&mut graph).unwrap());
    assert_eq!(
        graph.property(column, Property::Name).unwrap(),
        PropertyValue::Text("C1".into())
    );
    assert_eq!(graph.children(db), &[table]);

    assert!(undo.undo(&mut graph).unwrap());
    assert!(graph.children(db).is_empty());
    assert!(!undo.can_undo());

    assert!(undo.redo(&mut graph).unwrap());
    assert_eq!(graph.children(db), &[table]);
    assert_eq!(graph.columns(table), vec![column]);
    assert!(undo.redo(&mut graph).unwrap());
    assert_eq!(
        graph.property(column, Property::Name).unwrap(),
        PropertyValue::Text("C2".into())
    );
}

#[test]
fn test_relationship_undo_restores_both_folders() {
    let mut graph = SchemaGraph::new();
    let parent = graph.create_table(TableProps::new("parent"));
    let child = graph.create_table(TableProps::new("child"));
    let undo = UndoManager::attach(&mut graph, UndoConfig::default());

    let relationship = graph
        .create_relationship(parent, child, RelationshipProps::new("fk"), &[])
        .unwrap();
    graph.remove_relationship(relationship).unwrap();
    assert!(graph.imported_keys(child).is_empty());

    assert!(undo.undo(&mut graph).unwrap());
    assert_eq!(graph.exported_keys(parent), vec![relationship]);
    assert_eq!(graph.imported_keys(child), vec![relationship]);

    assert!(undo.undo(&mut graph).unwrap());
    assert!(graph.exported_keys(parent).is_empty());
    assert!(graph.imported_keys(child).is_empty());
}

#[test]
fn test_population_is_not_undoable() {
    let mut graph = SchemaGraph::new();
    let db = graph
        .create_unpopulated(NodeKind::Database(DatabaseProps::new("db")))
        .unwrap();
    graph.append_child(graph.root(), db).unwrap();
    let recorder = Arc::new(Recorder::default());
    graph.subscribe(recorder.clone());
    let undo = UndoManager::attach(&mut graph, UndoConfig::default());

    let populator = Templates(vec![NodeTemplate::new(NodeKind::Table(TableProps::new(
        "fetched",
    )))]);
    let state = graph.populate(db, &populator, &mut NoProgress).unwrap();

    assert_eq!(state, PopulationState::Populated);
    assert_eq!(undo.undo_count(), 0);
    assert!(undo.diagnostics().is_empty());
    let events = recorder.take();
    assert!(matches!(events.first(), Some(GraphEvent::PopulationStarted { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        GraphEvent::PopulationFinished {
            state: PopulationState::Populated,
            ..
        }
    )));
    let table = graph.children(db)[0];
    assert_eq!(graph.node_type(table).unwrap(), NodeType::Table);
    assert_eq!(graph.children(table).len(), 3);
}

#[test]
fn test_unignored_populated_flag_disables_undo() {
    let mut graph = SchemaGraph::new();
    let db = graph
        .create_unpopulated(NodeKind::Database(DatabaseProps::new("db")))
        .unwrap();
    graph.append_child(graph.root(), db).unwrap();
    let config = UndoConfig {
        ignored_properties: BTreeSet::new(),
        ..UndoConfig::default()
    };
    let undo = UndoManager::attach(&mut graph, config);
    let table = graph.create_table(TableProps::new("t"));
    let other = graph.create(NodeKind::Database(DatabaseProps::new("other")));
    graph.append_child(graph.root(), other).unwrap();
    graph.append_child(other, table).unwrap();
    assert!(undo.can_undo());

    graph
        .populate(db, &Templates(Vec::new()), &mut NoProgress)
        .unwrap();

    let diagnostics = undo.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(matches!(
        &diagnostics[0],
        UndoError::Unrecordable { property, .. } if property == "populated"
    ));
    assert!(!undo.can_undo());
    assert!(matches!(
        undo.undo(&mut graph),
        Err(Error::Undo(UndoError::HistoryIncomplete { .. }))
    ));
    assert_eq!(graph.children(other), &[table]);
}

#[test]
fn test_retry_population_after_failure() {
    let mut graph = SchemaGraph::new();
    let db = graph
        .create_unpopulated(NodeKind::Database(DatabaseProps::new("db")))
        .unwrap();
    let undo = UndoManager::attach(&mut graph, UndoConfig::default());

    assert_eq!(
        graph.populate(db, &Refused, &mut NoProgress).unwrap(),
        PopulationState::PopulationFailed
    );
    graph.retry_population(db).unwrap();
    assert_eq!(
        graph.population_state(db).unwrap(),
        PopulationState::Unpopulated
    );
    assert!(graph.children(db).is_empty());

    let populator = Templates(vec![NodeTemplate::new(NodeKind::Schema(SchemaProps::new(
        "public",
    )))]);
    assert_eq!(
        graph.populate(db, &populator, &mut NoProgress).unwrap(),
        PopulationState::Populated
    );
    assert_eq!(undo.undo_count(), 0);
    assert!(undo.diagnostics().is_empty());
}

#[test]
fn test_replace_source_databases_undoes_in_one_step() {
    let mut project = Project::new("p");
    let [a, b, c] = ["a", "b", "c"].map(|name| {
        project
            .graph_mut()
            .create(NodeKind::Database(DatabaseProps::new(name)))
    });
    project.add_source_database(a).unwrap();
    project.add_source_database(b).unwrap();
    let undo = UndoManager::attach(project.graph_mut(), UndoConfig::default());

    project.set_source_databases(&[c, b]).unwrap();
    assert_eq!(project.source_databases(), vec![c, b]);
    assert_eq!(undo.undo_count(), 1);
    assert_eq!(undo.undo_label().as_deref(), Some("Replace source databases"));

    assert!(undo.undo(project.graph_mut()).unwrap());
    assert_eq!(project.source_databases(), vec![a, b]);
    assert_eq!(project.graph().parent(c), None);
    assert!(undo.redo(project.graph_mut()).unwrap());
    assert_eq!(project.source_databases(), vec![c, b]);
}

#[test]
fn test_rejected_source_database_list_changes_nothing() {
    let mut project = Project::new("p");
    let a = project
        .graph_mut()
        .create(NodeKind::Database(DatabaseProps::new("a")));
    let b = project
        .graph_mut()
        .create(NodeKind::Database(DatabaseProps::new("b")));
    project.add_source_database(a).unwrap();
    let undo = UndoManager::attach(project.graph_mut(), UndoConfig::default());

    let result = project.set_source_databases(&[b, b]);

    assert!(matches!(result, Err(Error::InvalidStructure(_))));
    assert_eq!(project.source_databases(), vec![a]);
    assert_eq!(undo.undo_count(), 0);
}
