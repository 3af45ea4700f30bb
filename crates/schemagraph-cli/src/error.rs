//! CLI errors.

use thiserror::Error;

/// Errors reported by the `schemagraph` commands.
#[derive(Debug, Error)]
pub enum Error {
    /// Loading or saving the project failed.
    #[error(transparent)]
    Core(#[from] schemagraph_core::Error),

    /// Reading or writing a file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output could not be produced.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An entire-source save was requested for a project with lazy subtrees.
    #[error("{count} node(s) are not populated; an entire-source save needs a live connection")]
    Incomplete { count: usize },

    /// Saving the loaded document twice produced different bytes.
    #[error("document does not round-trip: saves differ from byte {offset}")]
    Unstable { offset: usize },
}

/// Result type for CLI commands.
pub type Result<T> = std::result::Result<T, Error>;
