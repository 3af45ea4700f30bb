//! Core error types.

use crate::model::{NodeId, NodeType};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Core schema graph errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Illegal tree mutation attempt.
    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    /// A `*-ref` attribute names an identifier that was never registered.
    #[error("dangling reference: {attribute}=\"{id}\" names no element defined earlier in the document")]
    DanglingReference {
        /// The missing identifier.
        id: String,
        /// The attribute that referenced it.
        attribute: String,
    },

    /// Parse-level syntax error or a document that violates the format.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// On-demand population failed.
    #[error(transparent)]
    Population(#[from] PopulationError),

    /// Serialization met a node type the document format does not define.
    #[error("unsupported node variant: {0}")]
    UnsupportedNodeVariant(NodeType),

    /// The handle does not name a node in this graph.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// A property does not exist on the node type or the value has the wrong type.
    #[error("invalid property: {0}")]
    InvalidProperty(String),

    /// Two different nodes claimed the same identifier in one pass.
    #[error("duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    /// Undo history error.
    #[error(transparent)]
    Undo(#[from] UndoError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        match e {
            quick_xml::Error::Io(io) => Error::Io(std::io::Error::new(io.kind(), io.to_string())),
            other => Error::MalformedDocument(other.to_string()),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Error::MalformedDocument(e.to_string())
    }
}

/// Failure reported by a population provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("population failed: {message}")]
pub struct PopulationError {
    /// Human-readable reason, stored on the exception placeholder.
    pub message: String,
}

impl PopulationError {
    /// Create a population error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Undo history errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UndoError {
    /// An edit could not be captured as a reversible operation.
    #[error("cannot record edit of {property} on {node_type}: {reason}")]
    Unrecordable {
        /// Node type the edit was made on.
        node_type: NodeType,
        /// Property name.
        property: String,
        /// Why the edit is not reversible.
        reason: String,
    },

    /// History has gaps; undo and redo are refused.
    #[error("undo history is incomplete: {count} edit(s) could not be recorded")]
    HistoryIncomplete {
        /// Number of unrecordable edits.
        count: usize,
    },

    /// Undo or redo was requested while a compound edit is open.
    #[error("compound edit \"{label}\" is still open")]
    CompoundOpen {
        /// Label of the open compound edit.
        label: String,
    },

    /// Replaying a recorded edit was rejected by the graph.
    #[error("replay of \"{label}\" failed: {reason}")]
    ReplayFailed {
        /// Label of the undo unit.
        label: String,
        /// The graph error.
        reason: String,
    },
}
