//! Property descriptors and typed property values.
//!
//! Every settable attribute of every node variant is listed once in
//! [`PROPERTIES`]. The graph setter, the undo recorder, the reader's
//! set-properties rule and the writer all consult this table, so adding an
//! attribute is a one-line change here plus the accessor arms below.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::node::{
    Deferrability, KeyRule, NodeKind, NodeType, Nullability,
};
use crate::error::{Error, Result};

/// Property names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Property {
    /// Display or object name.
    Name,
    /// Platform term for catalogs or schemas.
    NativeTerm,
    /// Free-form remarks.
    Remarks,
    /// Connection spec name of a database.
    Connection,
    /// Source object type of a table.
    ObjectType,
    /// Primary key constraint name.
    PrimaryKeyName,
    /// SQL type code of a column.
    SqlType,
    /// Native type name of a column.
    NativeType,
    /// Column length.
    Scale,
    /// Column decimal digits.
    Precision,
    /// Column nullability code.
    Nullable,
    /// Column default expression.
    DefaultValue,
    /// Position in the primary key.
    PrimaryKeySeq,
    /// Auto-increment flag.
    AutoIncrement,
    /// Relationship update rule code.
    UpdateRule,
    /// Relationship delete rule code.
    DeleteRule,
    /// Relationship deferrability code.
    Deferrability,
    /// Primary-key side cardinality.
    PkCardinality,
    /// Foreign-key side cardinality.
    FkCardinality,
    /// Identifying relationship flag.
    Identifying,
    /// Exception placeholder message.
    Message,
    /// Population flag. Changed only by the population state machine.
    Populated,
}

impl Property {
    /// Name used in change events and undo configuration.
    pub fn name(self) -> &'static str {
        match self {
            Property::Name => "name",
            Property::NativeTerm => "nativeTerm",
            Property::Remarks => "remarks",
            Property::Connection => "connection",
            Property::ObjectType => "objectType",
            Property::PrimaryKeyName => "primaryKeyName",
            Property::SqlType => "type",
            Property::NativeType => "sourceDBTypeName",
            Property::Scale => "scale",
            Property::Precision => "precision",
            Property::Nullable => "nullable",
            Property::DefaultValue => "defaultValue",
            Property::PrimaryKeySeq => "primaryKeySeq",
            Property::AutoIncrement => "autoIncrement",
            Property::UpdateRule => "updateRule",
            Property::DeleteRule => "deleteRule",
            Property::Deferrability => "deferrability",
            Property::PkCardinality => "pkCardinality",
            Property::FkCardinality => "fkCardinality",
            Property::Identifying => "identifying",
            Property::Message => "message",
            Property::Populated => "populated",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Required text.
    Text(String),
    /// Optional text.
    OptText(Option<String>),
    /// Integer or code.
    Int(i32),
    /// Optional integer.
    OptInt(Option<i32>),
    /// Flag.
    Bool(bool),
}

impl PropertyValue {
    /// Attribute text for this value, `None` when the value is absent.
    pub fn to_attribute(&self) -> Option<String> {
        match self {
            PropertyValue::Text(s) => Some(s.clone()),
            PropertyValue::OptText(s) => s.clone(),
            PropertyValue::Int(n) => Some(n.to_string()),
            PropertyValue::OptInt(n) => n.map(|n| n.to_string()),
            PropertyValue::Bool(b) => Some(b.to_string()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_attribute() {
            Some(s) => f.write_str(&s),
            None => f.write_str("<none>"),
        }
    }
}

/// Semantic type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Required text.
    Text,
    /// Optional text.
    OptionalText,
    /// Integer.
    Int,
    /// Optional integer.
    OptionalInt,
    /// Flag.
    Bool,
    /// Integer restricted to a closed code set.
    Code(&'static [i32]),
}

impl ValueType {
    /// Whether `value` is a legal value of this type.
    pub fn accepts(self, value: &PropertyValue) -> bool {
        match (self, value) {
            (ValueType::Text, PropertyValue::Text(_))
            | (ValueType::OptionalText, PropertyValue::OptText(_))
            | (ValueType::Int, PropertyValue::Int(_))
            | (ValueType::OptionalInt, PropertyValue::OptInt(_))
            | (ValueType::Bool, PropertyValue::Bool(_)) => true,
            (ValueType::Code(codes), PropertyValue::Int(n)) => codes.contains(n),
            _ => false,
        }
    }

    /// Parse attribute text into a value of this type.
    pub fn parse(self, raw: &str) -> Result<PropertyValue> {
        let int = |raw: &str| {
            raw.trim()
                .parse::<i32>()
                .map_err(|_| Error::MalformedDocument(format!("expected an integer, found \"{raw}\"")))
        };
        match self {
            ValueType::Text => Ok(PropertyValue::Text(raw.to_string())),
            ValueType::OptionalText => Ok(PropertyValue::OptText(Some(raw.to_string()))),
            ValueType::Int => Ok(PropertyValue::Int(int(raw)?)),
            ValueType::OptionalInt => Ok(PropertyValue::OptInt(Some(int(raw)?))),
            ValueType::Bool => match raw.trim() {
                "true" => Ok(PropertyValue::Bool(true)),
                "false" => Ok(PropertyValue::Bool(false)),
                other => Err(Error::MalformedDocument(format!(
                    "expected true or false, found \"{other}\""
                ))),
            },
            ValueType::Code(codes) => {
                let n = int(raw)?;
                if codes.contains(&n) {
                    Ok(PropertyValue::Int(n))
                } else {
                    Err(Error::MalformedDocument(format!(
                        "code {n} is not one of {codes:?}"
                    )))
                }
            }
        }
    }

    /// Produce a value of this type that differs from `old`.
    ///
    /// Used by setter coverage tests to exercise every descriptor without
    /// knowing its type up front.
    pub fn distinct_from(self, old: &PropertyValue) -> PropertyValue {
        match (self, old) {
            (ValueType::Code(codes), PropertyValue::Int(n)) => {
                let pos = codes.iter().position(|c| c == n).unwrap_or(0);
                PropertyValue::Int(codes[(pos + 1) % codes.len()])
            }
            (ValueType::Code(codes), _) => PropertyValue::Int(codes[0]),
            (_, PropertyValue::Text(s)) => PropertyValue::Text(format!("{s}_changed")),
            (_, PropertyValue::OptText(None)) => PropertyValue::OptText(Some("changed".into())),
            (_, PropertyValue::OptText(Some(s))) => {
                PropertyValue::OptText(Some(format!("{s}_changed")))
            }
            (_, PropertyValue::Int(n)) => PropertyValue::Int(n.wrapping_add(1)),
            (_, PropertyValue::OptInt(None)) => PropertyValue::OptInt(Some(1)),
            (_, PropertyValue::OptInt(Some(n))) => PropertyValue::OptInt(Some(n.wrapping_add(1))),
            (_, PropertyValue::Bool(b)) => PropertyValue::Bool(!b),
        }
    }
}

/// Describes one settable property of one node type.
#[derive(Debug, Clone, Copy)]
pub struct PropertyDescriptor {
    /// Node type owning the property.
    pub node_type: NodeType,
    /// Property name.
    pub property: Property,
    /// Persisted attribute name.
    pub attribute: &'static str,
    /// Semantic value type.
    pub value_type: ValueType,
    /// The attribute names another element and is resolved through the
    /// identity map instead of bound directly.
    pub reference: bool,
}

const fn prop(
    node_type: NodeType,
    property: Property,
    attribute: &'static str,
    value_type: ValueType,
) -> PropertyDescriptor {
    PropertyDescriptor {
        node_type,
        property,
        attribute,
        value_type,
        reference: false,
    }
}

/// Every settable property.
pub static PROPERTIES: &[PropertyDescriptor] = &[
    prop(NodeType::Database, Property::Name, "name", ValueType::Text),
    PropertyDescriptor {
        node_type: NodeType::Database,
        property: Property::Connection,
        attribute: "dbcs-ref",
        value_type: ValueType::OptionalText,
        reference: true,
    },
    prop(NodeType::Catalog, Property::Name, "catalogName", ValueType::Text),
    prop(NodeType::Catalog, Property::NativeTerm, "nativeTerm", ValueType::Text),
    prop(NodeType::Schema, Property::Name, "schemaName", ValueType::Text),
    prop(NodeType::Schema, Property::NativeTerm, "nativeTerm", ValueType::Text),
    prop(NodeType::Table, Property::Name, "tableName", ValueType::Text),
    prop(NodeType::Table, Property::Remarks, "remarks", ValueType::OptionalText),
    prop(NodeType::Table, Property::ObjectType, "objectType", ValueType::Text),
    prop(NodeType::Table, Property::PrimaryKeyName, "primaryKeyName", ValueType::OptionalText),
    prop(NodeType::Folder, Property::Name, "name", ValueType::Text),
    prop(NodeType::Column, Property::Name, "columnName", ValueType::Text),
    prop(NodeType::Column, Property::SqlType, "type", ValueType::Int),
    prop(NodeType::Column, Property::NativeType, "sourceDBTypeName", ValueType::OptionalText),
    prop(NodeType::Column, Property::Scale, "scale", ValueType::Int),
    prop(NodeType::Column, Property::Precision, "precision", ValueType::Int),
    prop(NodeType::Column, Property::Nullable, "nullable", ValueType::Code(Nullability::CODES)),
    prop(NodeType::Column, Property::Remarks, "remarks", ValueType::OptionalText),
    prop(NodeType::Column, Property::DefaultValue, "defaultValue", ValueType::OptionalText),
    prop(NodeType::Column, Property::PrimaryKeySeq, "primaryKeySeq", ValueType::OptionalInt),
    prop(NodeType::Column, Property::AutoIncrement, "autoIncrement", ValueType::Bool),
    prop(NodeType::Relationship, Property::Name, "name", ValueType::Text),
    prop(NodeType::Relationship, Property::UpdateRule, "updateRule", ValueType::Code(KeyRule::CODES)),
    prop(NodeType::Relationship, Property::DeleteRule, "deleteRule", ValueType::Code(KeyRule::CODES)),
    prop(
        NodeType::Relationship,
        Property::Deferrability,
        "deferrability",
        ValueType::Code(Deferrability::CODES),
    ),
    prop(NodeType::Relationship, Property::PkCardinality, "pkCardinality", ValueType::Int),
    prop(NodeType::Relationship, Property::FkCardinality, "fkCardinality", ValueType::Int),
    prop(NodeType::Relationship, Property::Identifying, "identifying", ValueType::Bool),
    prop(NodeType::ExceptionPlaceholder, Property::Message, "message", ValueType::Text),
];

impl PropertyDescriptor {
    /// Look up the descriptor of `property` on `node_type`.
    pub fn find(node_type: NodeType, property: Property) -> Option<&'static PropertyDescriptor> {
        PROPERTIES
            .iter()
            .find(|d| d.node_type == node_type && d.property == property)
    }

    /// Look up the descriptor bound to a persisted attribute of `node_type`.
    pub fn by_attribute(node_type: NodeType, attribute: &str) -> Option<&'static PropertyDescriptor> {
        PROPERTIES
            .iter()
            .find(|d| d.node_type == node_type && d.attribute == attribute)
    }

    /// All descriptors of `node_type`.
    pub fn for_type(node_type: NodeType) -> impl Iterator<Item = &'static PropertyDescriptor> {
        PROPERTIES.iter().filter(move |d| d.node_type == node_type)
    }
}

fn mismatch(property: Property, value: &PropertyValue) -> Error {
    Error::InvalidProperty(format!("value {value:?} does not fit property {property}"))
}

impl NodeKind {
    /// Current value of `property`, `None` if the variant has no such property.
    pub fn get(&self, property: Property) -> Option<PropertyValue> {
        use PropertyValue::*;
        let value = match (self, property) {
            (NodeKind::Database(p), Property::Name) => Text(p.name.clone()),
            (NodeKind::Database(p), Property::Connection) => OptText(p.connection.clone()),
            (NodeKind::Catalog(p), Property::Name) => Text(p.name.clone()),
            (NodeKind::Catalog(p), Property::NativeTerm) => Text(p.native_term.clone()),
            (NodeKind::Schema(p), Property::Name) => Text(p.name.clone()),
            (NodeKind::Schema(p), Property::NativeTerm) => Text(p.native_term.clone()),
            (NodeKind::Table(p), Property::Name) => Text(p.name.clone()),
            (NodeKind::Table(p), Property::Remarks) => OptText(p.remarks.clone()),
            (NodeKind::Table(p), Property::ObjectType) => Text(p.object_type.clone()),
            (NodeKind::Table(p), Property::PrimaryKeyName) => OptText(p.primary_key_name.clone()),
            (NodeKind::Folder(p), Property::Name) => Text(p.name.clone()),
            (NodeKind::Column(p), Property::Name) => Text(p.name.clone()),
            (NodeKind::Column(p), Property::SqlType) => Int(p.sql_type),
            (NodeKind::Column(p), Property::NativeType) => OptText(p.native_type.clone()),
            (NodeKind::Column(p), Property::Scale) => Int(p.scale),
            (NodeKind::Column(p), Property::Precision) => Int(p.precision),
            (NodeKind::Column(p), Property::Nullable) => Int(p.nullable.code()),
            (NodeKind::Column(p), Property::Remarks) => OptText(p.remarks.clone()),
            (NodeKind::Column(p), Property::DefaultValue) => OptText(p.default_value.clone()),
            (NodeKind::Column(p), Property::PrimaryKeySeq) => OptInt(p.primary_key_seq),
            (NodeKind::Column(p), Property::AutoIncrement) => Bool(p.auto_increment),
            (NodeKind::Relationship { props, .. }, prop) => match prop {
                Property::Name => Text(props.name.clone()),
                Property::UpdateRule => Int(props.update_rule.code()),
                Property::DeleteRule => Int(props.delete_rule.code()),
                Property::Deferrability => Int(props.deferrability.code()),
                Property::PkCardinality => Int(props.pk_cardinality),
                Property::FkCardinality => Int(props.fk_cardinality),
                Property::Identifying => Bool(props.identifying),
                _ => return None,
            },
            (NodeKind::ExceptionPlaceholder { message }, Property::Message) => Text(message.clone()),
            _ => return None,
        };
        Some(value)
    }

    /// Replace the value of `property`, returning the previous value.
    ///
    /// Fails with [`Error::InvalidProperty`] when the variant has no such
    /// property or the value has the wrong type.
    pub fn set(&mut self, property: Property, value: PropertyValue) -> Result<PropertyValue> {
        let old = self.get(property).ok_or_else(|| {
            Error::InvalidProperty(format!(
                "{} has no property {property}",
                self.node_type()
            ))
        })?;

        macro_rules! assign {
            ($field:expr, $variant:ident) => {
                match value {
                    PropertyValue::$variant(v) => $field = v,
                    other => return Err(mismatch(property, &other)),
                }
            };
        }
        macro_rules! assign_code {
            ($field:expr, $ty:ident) => {
                match value {
                    PropertyValue::Int(code) => {
                        $field = $ty::from_code(code).ok_or_else(|| {
                            Error::InvalidProperty(format!("{code} is not a valid {property} code"))
                        })?
                    }
                    other => return Err(mismatch(property, &other)),
                }
            };
        }

        match (self, property) {
            (NodeKind::Database(p), Property::Name) => assign!(p.name, Text),
            (NodeKind::Database(p), Property::Connection) => assign!(p.connection, OptText),
            (NodeKind::Catalog(p), Property::Name) => assign!(p.name, Text),
            (NodeKind::Catalog(p), Property::NativeTerm) => assign!(p.native_term, Text),
            (NodeKind::Schema(p), Property::Name) => assign!(p.name, Text),
            (NodeKind::Schema(p), Property::NativeTerm) => assign!(p.native_term, Text),
            (NodeKind::Table(p), Property::Name) => assign!(p.name, Text),
            (NodeKind::Table(p), Property::Remarks) => assign!(p.remarks, OptText),
            (NodeKind::Table(p), Property::ObjectType) => assign!(p.object_type, Text),
            (NodeKind::Table(p), Property::PrimaryKeyName) => assign!(p.primary_key_name, OptText),
            (NodeKind::Folder(p), Property::Name) => assign!(p.name, Text),
            (NodeKind::Column(p), Property::Name) => assign!(p.name, Text),
            (NodeKind::Column(p), Property::SqlType) => assign!(p.sql_type, Int),
            (NodeKind::Column(p), Property::NativeType) => assign!(p.native_type, OptText),
            (NodeKind::Column(p), Property::Scale) => assign!(p.scale, Int),
            (NodeKind::Column(p), Property::Precision) => assign!(p.precision, Int),
            (NodeKind::Column(p), Property::Nullable) => assign_code!(p.nullable, Nullability),
            (NodeKind::Column(p), Property::Remarks) => assign!(p.remarks, OptText),
            (NodeKind::Column(p), Property::DefaultValue) => assign!(p.default_value, OptText),
            (NodeKind::Column(p), Property::PrimaryKeySeq) => assign!(p.primary_key_seq, OptInt),
            (NodeKind::Column(p), Property::AutoIncrement) => assign!(p.auto_increment, Bool),
            (NodeKind::Relationship { props, .. }, Property::Name) => assign!(props.name, Text),
            (NodeKind::Relationship { props, .. }, Property::UpdateRule) => {
                assign_code!(props.update_rule, KeyRule)
            }
            (NodeKind::Relationship { props, .. }, Property::DeleteRule) => {
                assign_code!(props.delete_rule, KeyRule)
            }
            (NodeKind::Relationship { props, .. }, Property::Deferrability) => {
                assign_code!(props.deferrability, Deferrability)
            }
            (NodeKind::Relationship { props, .. }, Property::PkCardinality) => {
                assign!(props.pk_cardinality, Int)
            }
            (NodeKind::Relationship { props, .. }, Property::FkCardinality) => {
                assign!(props.fk_cardinality, Int)
            }
            (NodeKind::Relationship { props, .. }, Property::Identifying) => {
                assign!(props.identifying, Bool)
            }
            (NodeKind::ExceptionPlaceholder { message }, Property::Message) => {
                assign!(*message, Text)
            }
            (kind, _) => {
                return Err(Error::InvalidProperty(format!(
                    "{} has no property {property}",
                    kind.node_type()
                )))
            }
        }
        Ok(old)
    }
}
