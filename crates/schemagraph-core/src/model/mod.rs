//! Schema graph model: nodes, properties, the graph arena and population.

mod graph;
mod node;
mod population;
mod property;

pub use graph::SchemaGraph;
pub use node::{
    cardinality, CatalogProps, ColumnProps, DatabaseProps, Deferrability, FolderProps, FolderType,
    KeyRule, Node, NodeId, NodeKind, NodeType, Nullability, RelationshipProps, SchemaProps,
    TableProps,
};
pub use population::{NodeTemplate, PopulationState, Populator};
pub use property::{Property, PropertyDescriptor, PropertyValue, ValueType, PROPERTIES};
