//! Node variants and their attribute sets.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::population::PopulationState;

/// Handle of a node inside a [`SchemaGraph`](super::SchemaGraph) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Arena slot of this handle.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    /// Invisible container holding the source databases.
    Root,
    /// A database (source or target).
    Database,
    /// A catalog inside a database.
    Catalog,
    /// A schema inside a database or catalog.
    Schema,
    /// A table.
    Table,
    /// One of the three per-table folders.
    Folder,
    /// A table column.
    Column,
    /// A foreign-key relationship between two tables.
    Relationship,
    /// Primary-key to foreign-key column pairing inside a relationship.
    ColumnMapping,
    /// Sentinel recording a failed population attempt.
    ExceptionPlaceholder,
}

impl NodeType {
    /// All node types, in declaration order.
    pub const ALL: [NodeType; 10] = [
        NodeType::Root,
        NodeType::Database,
        NodeType::Catalog,
        NodeType::Schema,
        NodeType::Table,
        NodeType::Folder,
        NodeType::Column,
        NodeType::Relationship,
        NodeType::ColumnMapping,
        NodeType::ExceptionPlaceholder,
    ];

    /// Element name used by the document format. `None` for [`NodeType::Root`].
    pub fn element_name(self) -> Option<&'static str> {
        match self {
            NodeType::Root => None,
            NodeType::Database => Some("database"),
            NodeType::Catalog => Some("catalog"),
            NodeType::Schema => Some("schema"),
            NodeType::Table => Some("table"),
            NodeType::Folder => Some("folder"),
            NodeType::Column => Some("column"),
            NodeType::Relationship => Some("relationship"),
            NodeType::ColumnMapping => Some("column-mapping"),
            NodeType::ExceptionPlaceholder => Some("sql-exception"),
        }
    }

    /// Prefix of identifiers assigned by the writer.
    pub fn id_prefix(self) -> Option<&'static str> {
        match self {
            NodeType::Root => None,
            NodeType::Database => Some("DB"),
            NodeType::Catalog => Some("CAT"),
            NodeType::Schema => Some("SCH"),
            NodeType::Table => Some("TAB"),
            NodeType::Folder => Some("FOL"),
            NodeType::Column => Some("COL"),
            NodeType::Relationship => Some("REL"),
            NodeType::ColumnMapping => Some("CMP"),
            NodeType::ExceptionPlaceholder => Some("EXC"),
        }
    }

    /// Child types a node of this type may own.
    ///
    /// Every container may also hold a single exception placeholder after a
    /// failed population attempt.
    pub fn allowed_children(self) -> &'static [NodeType] {
        match self {
            NodeType::Root => &[NodeType::Database],
            NodeType::Database => &[
                NodeType::Catalog,
                NodeType::Schema,
                NodeType::Table,
                NodeType::ExceptionPlaceholder,
            ],
            NodeType::Catalog => &[
                NodeType::Schema,
                NodeType::Table,
                NodeType::ExceptionPlaceholder,
            ],
            NodeType::Schema => &[NodeType::Table, NodeType::ExceptionPlaceholder],
            NodeType::Table => &[NodeType::Folder],
            NodeType::Folder => &[
                NodeType::Column,
                NodeType::Relationship,
                NodeType::ExceptionPlaceholder,
            ],
            NodeType::Relationship => &[NodeType::ColumnMapping],
            NodeType::Column | NodeType::ColumnMapping | NodeType::ExceptionPlaceholder => &[],
        }
    }

    /// Whether this type can have children at all.
    pub fn allows_children(self) -> bool {
        !self.allowed_children().is_empty()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.element_name() {
            Some(name) => f.write_str(name),
            None => f.write_str("root"),
        }
    }
}

/// Column nullability, using the JDBC metadata codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nullability {
    /// Might not allow NULL values.
    NoNulls,
    /// Definitely allows NULL values.
    Nullable,
    /// Nullability unknown.
    Unknown,
}

impl Nullability {
    /// Valid codes, in order.
    pub const CODES: &'static [i32] = &[0, 1, 2];

    /// JDBC code of this value.
    pub fn code(self) -> i32 {
        match self {
            Nullability::NoNulls => 0,
            Nullability::Nullable => 1,
            Nullability::Unknown => 2,
        }
    }

    /// Decode a JDBC code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Nullability::NoNulls),
            1 => Some(Nullability::Nullable),
            2 => Some(Nullability::Unknown),
            _ => None,
        }
    }
}

/// Referential action on update or delete, using the JDBC codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyRule {
    /// Propagate the change to the referencing rows.
    Cascade,
    /// Reject the change while referencing rows exist.
    Restrict,
    /// Set the referencing columns to NULL.
    SetNull,
    /// Reject the change at the end of the statement.
    NoAction,
    /// Set the referencing columns to their defaults.
    SetDefault,
}

impl KeyRule {
    /// Valid codes, in order.
    pub const CODES: &'static [i32] = &[0, 1, 2, 3, 4];

    /// JDBC code of this rule.
    pub fn code(self) -> i32 {
        match self {
            KeyRule::Cascade => 0,
            KeyRule::Restrict => 1,
            KeyRule::SetNull => 2,
            KeyRule::NoAction => 3,
            KeyRule::SetDefault => 4,
        }
    }

    /// Decode a JDBC code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(KeyRule::Cascade),
            1 => Some(KeyRule::Restrict),
            2 => Some(KeyRule::SetNull),
            3 => Some(KeyRule::NoAction),
            4 => Some(KeyRule::SetDefault),
            _ => None,
        }
    }
}

/// Constraint deferrability, using the JDBC codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Deferrability {
    /// Checked at commit time by default.
    InitiallyDeferred,
    /// Checked per statement by default, may be deferred.
    InitiallyImmediate,
    /// Always checked per statement.
    NotDeferrable,
}

impl Deferrability {
    /// Valid codes, in order.
    pub const CODES: &'static [i32] = &[5, 6, 7];

    /// JDBC code of this value.
    pub fn code(self) -> i32 {
        match self {
            Deferrability::InitiallyDeferred => 5,
            Deferrability::InitiallyImmediate => 6,
            Deferrability::NotDeferrable => 7,
        }
    }

    /// Decode a JDBC code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            5 => Some(Deferrability::InitiallyDeferred),
            6 => Some(Deferrability::InitiallyImmediate),
            7 => Some(Deferrability::NotDeferrable),
            _ => None,
        }
    }
}

/// Relationship cardinality flags.
pub mod cardinality {
    /// Zero rows.
    pub const ZERO: i32 = 1;
    /// Exactly one row.
    pub const ONE: i32 = 2;
    /// Many rows.
    pub const MANY: i32 = 4;
}

/// The three folders every table owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FolderType {
    /// Holds the table's columns.
    Columns,
    /// Links to relationships where this table is the foreign-key side.
    ImportedKeys,
    /// Owns relationships where this table is the primary-key side.
    ExportedKeys,
}

impl FolderType {
    /// Folders in the order a table holds them.
    pub const ALL: [FolderType; 3] = [
        FolderType::Columns,
        FolderType::ImportedKeys,
        FolderType::ExportedKeys,
    ];

    /// Persisted folder type code.
    pub fn code(self) -> i32 {
        match self {
            FolderType::Columns => 1,
            FolderType::ImportedKeys => 2,
            FolderType::ExportedKeys => 3,
        }
    }

    /// Decode a persisted folder type code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(FolderType::Columns),
            2 => Some(FolderType::ImportedKeys),
            3 => Some(FolderType::ExportedKeys),
            _ => None,
        }
    }

    /// Default display name.
    pub fn default_name(self) -> &'static str {
        match self {
            FolderType::Columns => "Columns",
            FolderType::ImportedKeys => "Imported Keys",
            FolderType::ExportedKeys => "Exported Keys",
        }
    }

    /// Derive the folder type from a display name (documents without a `type`).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.default_name() == name)
    }
}

/// Database attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatabaseProps {
    /// Display name.
    pub name: String,
    /// Name of the connection spec this database was read from.
    pub connection: Option<String>,
}

impl DatabaseProps {
    /// Create database attributes with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection: None,
        }
    }

    /// Set the connection spec name.
    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }
}

/// Catalog attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProps {
    /// Catalog name.
    pub name: String,
    /// What the source platform calls a catalog.
    pub native_term: String,
}

impl CatalogProps {
    /// Create catalog attributes with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_term: "catalog".to_string(),
        }
    }
}

/// Schema attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaProps {
    /// Schema name.
    pub name: String,
    /// What the source platform calls a schema.
    pub native_term: String,
}

impl SchemaProps {
    /// Create schema attributes with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_term: "schema".to_string(),
        }
    }
}

/// Table attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableProps {
    /// Table name.
    pub name: String,
    /// Free-form remarks.
    pub remarks: Option<String>,
    /// Object type reported by the source (TABLE, VIEW, ...).
    pub object_type: String,
    /// Name of the primary key constraint.
    pub primary_key_name: Option<String>,
}

impl TableProps {
    /// Create table attributes with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remarks: None,
            object_type: "TABLE".to_string(),
            primary_key_name: None,
        }
    }

    /// Set the remarks.
    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    /// Set the primary key constraint name.
    pub fn with_primary_key_name(mut self, name: impl Into<String>) -> Self {
        self.primary_key_name = Some(name.into());
        self
    }
}

/// Folder attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderProps {
    /// Display name.
    pub name: String,
    /// Which of the three table folders this is.
    pub folder_type: FolderType,
}

impl FolderProps {
    /// Create a folder of the given type with its default name.
    pub fn new(folder_type: FolderType) -> Self {
        Self {
            name: folder_type.default_name().to_string(),
            folder_type,
        }
    }
}

/// Column attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnProps {
    /// Column name.
    pub name: String,
    /// SQL type code (java.sql.Types numbering).
    pub sql_type: i32,
    /// Type name in the source database.
    pub native_type: Option<String>,
    /// Length of the column.
    pub scale: i32,
    /// Digits after the decimal point for numeric types.
    pub precision: i32,
    /// Nullability.
    pub nullable: Nullability,
    /// Free-form remarks.
    pub remarks: Option<String>,
    /// Default value expression.
    pub default_value: Option<String>,
    /// Position in the primary key, `None` when not part of it.
    pub primary_key_seq: Option<i32>,
    /// Whether the column auto-increments.
    pub auto_increment: bool,
    /// Column this one was copied from.
    pub source_column: Option<NodeId>,
}

impl ColumnProps {
    /// Create a nullable column with the given name and SQL type code.
    pub fn new(name: impl Into<String>, sql_type: i32) -> Self {
        Self {
            name: name.into(),
            sql_type,
            native_type: None,
            scale: 0,
            precision: 0,
            nullable: Nullability::Nullable,
            remarks: None,
            default_value: None,
            primary_key_seq: None,
            auto_increment: false,
            source_column: None,
        }
    }

    /// Set the native type name and its length.
    pub fn with_native_type(mut self, native_type: impl Into<String>, scale: i32) -> Self {
        self.native_type = Some(native_type.into());
        self.scale = scale;
        self
    }

    /// Place the column in the primary key at the given position.
    pub fn primary_key(mut self, seq: i32) -> Self {
        self.primary_key_seq = Some(seq);
        self.nullable = Nullability::NoNulls;
        self
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = Nullability::NoNulls;
        self
    }

    /// Set the default value expression.
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    /// Record the column this one was copied from.
    pub fn with_source_column(mut self, source: NodeId) -> Self {
        self.source_column = Some(source);
        self
    }
}

/// Relationship attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipProps {
    /// Constraint name.
    pub name: String,
    /// Action on primary-key update.
    pub update_rule: KeyRule,
    /// Action on primary-key delete.
    pub delete_rule: KeyRule,
    /// Constraint deferrability.
    pub deferrability: Deferrability,
    /// Cardinality flags on the primary-key side.
    pub pk_cardinality: i32,
    /// Cardinality flags on the foreign-key side.
    pub fk_cardinality: i32,
    /// Whether the foreign key is part of the child's primary key.
    pub identifying: bool,
}

impl RelationshipProps {
    /// Create a one-to-zero-or-more relationship with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            update_rule: KeyRule::Restrict,
            delete_rule: KeyRule::Restrict,
            deferrability: Deferrability::NotDeferrable,
            pk_cardinality: cardinality::ONE,
            fk_cardinality: cardinality::ZERO | cardinality::MANY,
            identifying: false,
        }
    }

    /// Mark the relationship identifying.
    pub fn identifying(mut self) -> Self {
        self.identifying = true;
        self
    }

    /// Set the delete rule.
    pub fn with_delete_rule(mut self, rule: KeyRule) -> Self {
        self.delete_rule = rule;
        self
    }
}

/// Variant-specific payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Source database container.
    Root,
    /// A database.
    Database(DatabaseProps),
    /// A catalog.
    Catalog(CatalogProps),
    /// A schema.
    Schema(SchemaProps),
    /// A table.
    Table(TableProps),
    /// A table folder.
    Folder(FolderProps),
    /// A column.
    Column(ColumnProps),
    /// A relationship, owned by the primary-key table.
    Relationship {
        /// Foreign-key (referenced, "many") side table.
        fk_table: NodeId,
        /// Relationship attributes.
        props: RelationshipProps,
    },
    /// A column pairing inside a relationship.
    ColumnMapping {
        /// Primary-key column.
        pk_column: NodeId,
        /// Foreign-key column.
        fk_column: NodeId,
    },
    /// Records why population failed.
    ExceptionPlaceholder {
        /// Error message of the failed attempt.
        message: String,
    },
}

impl NodeKind {
    /// Variant tag.
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Root => NodeType::Root,
            NodeKind::Database(_) => NodeType::Database,
            NodeKind::Catalog(_) => NodeType::Catalog,
            NodeKind::Schema(_) => NodeType::Schema,
            NodeKind::Table(_) => NodeType::Table,
            NodeKind::Folder(_) => NodeType::Folder,
            NodeKind::Column(_) => NodeType::Column,
            NodeKind::Relationship { .. } => NodeType::Relationship,
            NodeKind::ColumnMapping { .. } => NodeType::ColumnMapping,
            NodeKind::ExceptionPlaceholder { .. } => NodeType::ExceptionPlaceholder,
        }
    }

    /// Short name for display, if the variant has one.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            NodeKind::Root | NodeKind::ColumnMapping { .. } => None,
            NodeKind::Database(p) => Some(&p.name),
            NodeKind::Catalog(p) => Some(&p.name),
            NodeKind::Schema(p) => Some(&p.name),
            NodeKind::Table(p) => Some(&p.name),
            NodeKind::Folder(p) => Some(&p.name),
            NodeKind::Column(p) => Some(&p.name),
            NodeKind::Relationship { props, .. } => Some(&props.name),
            NodeKind::ExceptionPlaceholder { message } => Some(message),
        }
    }
}

/// A node stored in the graph arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) state: PopulationState,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, state: PopulationState) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            state,
        }
    }

    /// Variant payload.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Variant tag.
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Owning parent, `None` for detached nodes and the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Ordered children, including non-owning relationship links.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Population state.
    pub fn state(&self) -> PopulationState {
        self.state
    }

    /// Whether the children reflect a completed fetch.
    pub fn is_populated(&self) -> bool {
        self.state == PopulationState::Populated
    }
}
