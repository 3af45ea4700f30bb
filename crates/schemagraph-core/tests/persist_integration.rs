//! Integration tests for saving and loading project documents.

use schemagraph_core::{
    ColumnProps, ConnectionSpec, DatabaseProps, Error, FolderType, LoadConfig, NodeId, NodeKind,
    NodeTemplate, PopulationError, PopulationState, Populator, ProgressSink, Project, Property,
    PropertyValue, RelationshipProps, SaveConfig, SchemaGraph, TableProps,
};

struct Sample {
    project: Project,
    customer: NodeId,
    orders: NodeId,
    relationship: NodeId,
}

fn sample_project() -> Sample {
    let mut project = Project::new("shop");
    project
        .add_connection(
            ConnectionSpec::new("prod", "jdbc:postgresql://db/shop")
                .with_driver("org.postgresql.Driver")
                .with_credentials("app", "secret"),
        )
        .unwrap();

    let graph = project.graph_mut();
    let db = graph.create(NodeKind::Database(
        DatabaseProps::new("shop").with_connection("prod"),
    ));

    let customer = graph.create_table(TableProps::new("customer").with_remarks("people who buy"));
    graph.append_child(db, customer).unwrap();
    let customer_id = graph
        .add_column(customer, ColumnProps::new("id", 4).primary_key(1))
        .unwrap();
    graph
        .add_column(customer, ColumnProps::new("email", 12).with_native_type("VARCHAR", 255))
        .unwrap();

    let orders = graph.create_table(TableProps::new("orders"));
    graph.append_child(db, orders).unwrap();
    graph
        .add_column(orders, ColumnProps::new("id", 4).primary_key(1))
        .unwrap();
    let order_customer = graph
        .add_column(orders, ColumnProps::new("customer_id", 4).not_null())
        .unwrap();

    let relationship = graph
        .create_relationship(
            customer,
            orders,
            RelationshipProps::new("fk_orders_customer"),
            &[(customer_id, order_customer)],
        )
        .unwrap();

    let target = project.target_database();
    let graph = project.graph_mut();
    let copy = graph.create_table(TableProps::new("customer"));
    graph.append_child(target, copy).unwrap();
    graph
        .add_column(
            copy,
            ColumnProps::new("id", 4).primary_key(1).with_source_column(customer_id),
        )
        .unwrap();

    project.add_source_database(db).unwrap();
    project.diagram_mut().place_table(copy, 40, 80);

    Sample {
        project,
        customer,
        orders,
        relationship,
    }
}

fn save(project: &mut Project) -> Vec<u8> {
    let mut out = Vec::new();
    project.save(&mut out, &SaveConfig::default()).unwrap();
    out
}

fn load(doc: &[u8]) -> Project {
    Project::load(doc, &LoadConfig::default()).unwrap().0
}

fn table_named(graph: &SchemaGraph, parent: NodeId, name: &str) -> NodeId {
    graph
        .child_named(parent, name)
        .unwrap_or_else(|| panic!("no table named {name}"))
}

#[test]
fn test_round_trip_preserves_structure() {
    let mut sample = sample_project();
    let doc = save(&mut sample.project);

    let loaded = load(&doc);
    let graph = loaded.graph();

    assert_eq!(loaded.name(), "shop");
    let sources = loaded.source_databases();
    assert_eq!(sources.len(), 1);
    let db = sources[0];
    assert_eq!(
        graph.property(db, Property::Connection).unwrap(),
        PropertyValue::OptText(Some("prod".into()))
    );
    assert_eq!(loaded.connection("prod").unwrap().user, "app");

    let customer = table_named(graph, db, "customer");
    let orders = table_named(graph, db, "orders");
    assert_eq!(graph.columns(customer).len(), 2);
    assert_eq!(
        graph.property(customer, Property::Remarks).unwrap(),
        PropertyValue::OptText(Some("people who buy".into()))
    );

    let exported = graph.exported_keys(customer);
    assert_eq!(exported.len(), 1);
    let relationship = exported[0];
    assert_eq!(graph.fk_table(relationship), Some(orders));
    assert_eq!(graph.pk_table(relationship), Some(customer));
    assert_eq!(graph.children(relationship).len(), 1);

    let target = loaded.target_database();
    assert!(!sources.contains(&target));
    let copy = table_named(graph, target, "customer");
    let copy_id = graph.columns(copy)[0];
    match graph.kind(copy_id).unwrap() {
        NodeKind::Column(props) => {
            assert_eq!(props.source_column, Some(graph.columns(customer)[0]))
        }
        other => panic!("expected a column, got {other:?}"),
    }
    assert_eq!(loaded.diagram().table(copy).map(|p| (p.x, p.y)), Some((40, 80)));
    assert!(!loaded.is_modified());
}

#[test]
fn test_save_load_save_is_byte_identical() {
    let mut sample = sample_project();
    let first = save(&mut sample.project);

    let mut loaded = load(&first);
    let second = save(&mut loaded);

    assert_eq!(
        String::from_utf8(first).unwrap(),
        String::from_utf8(second).unwrap()
    );
}

#[test]
fn test_relationship_identity_shared_by_both_tables() {
    let mut sample = sample_project();
    assert_eq!(
        sample.project.graph().imported_keys(sample.orders),
        vec![sample.relationship]
    );
    let (loaded, _) = Project::load(&save(&mut sample.project)[..], &LoadConfig::default()).unwrap();
    let graph = loaded.graph();

    let db = loaded.source_databases()[0];
    let customer = table_named(graph, db, "customer");
    let orders = table_named(graph, db, "orders");

    assert_eq!(graph.exported_keys(customer), graph.imported_keys(orders));
    let relationship = graph.exported_keys(customer)[0];
    let imported = graph.folder(orders, FolderType::ImportedKeys).unwrap();
    assert!(graph.is_link(imported, relationship));
}

#[test]
fn test_relationship_written_once() {
    let mut sample = sample_project();
    let doc = String::from_utf8(save(&mut sample.project)).unwrap();

    assert_eq!(doc.matches("<relationship ").count(), 1);
    assert_eq!(doc.matches("<column-mapping ").count(), 1);
    let block = doc.find("<relationships>").unwrap();
    assert!(doc[..block].contains("tableName=\"orders\""));
}

struct Unreachable;

impl Populator for Unreachable {
    fn populate(
        &self,
        _graph: &SchemaGraph,
        _node: NodeId,
        _progress: &mut dyn ProgressSink,
    ) -> Result<Vec<NodeTemplate>, PopulationError> {
        Err(PopulationError::new("connection refused"))
    }
}

#[test]
fn test_unpopulated_and_failed_nodes_reload_unpopulated() {
    let mut project = Project::new("lazy");
    let graph = project.graph_mut();
    let lazy = graph
        .create_unpopulated(NodeKind::Database(DatabaseProps::new("lazy")))
        .unwrap();
    let broken = graph
        .create_unpopulated(NodeKind::Database(DatabaseProps::new("broken")))
        .unwrap();
    let state = graph
        .populate(broken, &Unreachable, &mut schemagraph_core::NoProgress)
        .unwrap();
    assert_eq!(state, PopulationState::PopulationFailed);
    project.add_source_database(lazy).unwrap();
    project.add_source_database(broken).unwrap();

    let doc = save(&mut project);
    let text = String::from_utf8(doc.clone()).unwrap();
    assert!(!text.contains("sql-exception"));
    assert!(!text.contains("connection refused"));

    let loaded = load(&doc);
    for db in loaded.source_databases() {
        assert_eq!(
            loaded.graph().population_state(db).unwrap(),
            PopulationState::Unpopulated
        );
        assert!(loaded.graph().children(db).is_empty());
    }
}

#[test]
fn test_dangling_reference_fails_load() {
    let mut sample = sample_project();
    let mut out = Vec::new();
    let ids = sample
        .project
        .save(&mut out, &SaveConfig::default())
        .unwrap();
    let orders_id = ids.id_of(sample.orders).unwrap().to_string();
    let doc = String::from_utf8(out)
        .unwrap()
        .replace(&format!("fk-table-ref=\"{orders_id}\""), "fk-table-ref=\"TAB999\"");

    let result = Project::load(doc.as_bytes(), &LoadConfig::default());

    match result {
        Err(Error::DanglingReference { id, attribute }) => {
            assert_eq!(id, "TAB999");
            assert_eq!(attribute, "fk-table-ref");
        }
        other => panic!("expected a dangling reference, got {other:?}"),
    }
}

#[test]
fn test_identifiers_match_loaded_nodes() {
    let mut sample = sample_project();
    let mut out = Vec::new();
    let saved_ids = sample
        .project
        .save(&mut out, &SaveConfig::default())
        .unwrap();

    let (loaded, loaded_ids) = Project::load(&out[..], &LoadConfig::default()).unwrap();

    assert_eq!(saved_ids.len(), loaded_ids.len());
    let customer_id = saved_ids.id_of(sample.customer).unwrap();
    let customer = loaded_ids.node_of(customer_id).unwrap();
    assert_eq!(
        loaded.graph().property(customer, Property::Name).unwrap(),
        PropertyValue::Text("customer".into())
    );
}

#[test]
fn test_save_to_path_and_load_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.architect");
    let mut sample = sample_project();
    assert!(sample.project.is_modified());

    sample
        .project
        .save_to_path(&path, &SaveConfig::default())
        .unwrap();

    assert!(!sample.project.is_modified());
    assert!(!dir.path().join("shop.architect.tmp").exists());
    let (loaded, _) = Project::load_from_path(&path, &LoadConfig::default()).unwrap();
    assert_eq!(loaded.source_databases().len(), 1);
}

#[test]
fn test_load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();

    let result = Project::load_from_path(dir.path().join("absent.architect"), &LoadConfig::default());

    assert!(matches!(result, Err(Error::Io(_))));
}
