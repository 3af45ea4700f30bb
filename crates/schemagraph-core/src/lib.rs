//! Schemagraph Core - observable schema-design graph and project persistence.
//!
//! This crate provides the schema tree (databases, catalogs, schemas, tables,
//! columns, relationships), its change-notification and undo contract, lazy
//! population, and the XML project format reader and writer.

pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod persist;
pub mod progress;
pub mod project;

pub use config::{LoadConfig, SaveConfig, UndoConfig};
pub use error::{Error, PopulationError, Result, UndoError};
pub use event::{GraphEvent, GraphListener, ListenerId, ModificationTracker, PropertyChange, UndoManager};
pub use model::{
    CatalogProps, ColumnProps, DatabaseProps, Deferrability, FolderProps, FolderType, KeyRule, Node, NodeId,
    NodeKind, NodeTemplate, NodeType, Nullability, PopulationState, Populator, Property,
    PropertyDescriptor, PropertyValue, RelationshipProps, SchemaGraph, SchemaProps, TableProps,
    ValueType,
};
pub use persist::{IdentityMap, ProjectReader, ProjectWriter};
pub use progress::{LoggingProgress, NoProgress, ProgressSink};
pub use project::{
    ConnectionSpec, DdlGeneratorSettings, DiagramLayout, LinkPlacement, Project, SharedProject,
    TablePlacement,
};
