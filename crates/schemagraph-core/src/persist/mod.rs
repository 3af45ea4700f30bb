//! XML project document format.
//!
//! ```text
//! architect-project (version, name)
//!   project-connection-specs / dbcs*
//!   source-databases / database*
//!     catalog | schema | table / folder / column
//!     relationships / relationship / column-mapping
//!   target-database / (database | reference)
//!   ddl-generator / file?
//!   play-pen / (table-pane | table-link)*
//! ```
//!
//! Every schema element carries an `id` and a `populated` flag. Attributes
//! ending in `-ref` name the `id` of an element earlier in the document.

mod ids;
mod reader;
mod writer;

pub use ids::IdentityMap;
pub use reader::ProjectReader;
pub use writer::ProjectWriter;

/// Document format version written and accepted.
pub const FORMAT_VERSION: &str = "1.0";

pub(crate) const EL_PROJECT: &str = "architect-project";
pub(crate) const EL_CONNECTION_SPECS: &str = "project-connection-specs";
pub(crate) const EL_CONNECTION_SPEC: &str = "dbcs";
pub(crate) const EL_SOURCE_DATABASES: &str = "source-databases";
pub(crate) const EL_TARGET_DATABASE: &str = "target-database";
pub(crate) const EL_RELATIONSHIPS: &str = "relationships";
pub(crate) const EL_REFERENCE: &str = "reference";
pub(crate) const EL_DDL_GENERATOR: &str = "ddl-generator";
pub(crate) const EL_DDL_FILE: &str = "file";
pub(crate) const EL_PLAY_PEN: &str = "play-pen";
pub(crate) const EL_TABLE_PANE: &str = "table-pane";
pub(crate) const EL_TABLE_LINK: &str = "table-link";

pub(crate) const ATTR_ID: &str = "id";
pub(crate) const ATTR_POPULATED: &str = "populated";
pub(crate) const ATTR_TYPE: &str = "type";
pub(crate) const ATTR_REF_ID: &str = "ref-id";
pub(crate) const ATTR_SOURCE_COLUMN_REF: &str = "source-column-ref";
pub(crate) const ATTR_PK_TABLE_REF: &str = "pk-table-ref";
pub(crate) const ATTR_FK_TABLE_REF: &str = "fk-table-ref";
pub(crate) const ATTR_PK_COLUMN_REF: &str = "pk-column-ref";
pub(crate) const ATTR_FK_COLUMN_REF: &str = "fk-column-ref";
pub(crate) const ATTR_DBCS_REF: &str = "dbcs-ref";

/// Whether an attribute names another element instead of holding a value.
pub(crate) fn is_reference_attribute(name: &str) -> bool {
    name.ends_with("-ref") || name.ends_with("Ref")
}
