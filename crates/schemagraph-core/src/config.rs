//! Save, load and undo configuration.

use std::collections::BTreeSet;

/// Reference attribute whose miss is tolerated by default.
pub const DEFAULT_OPTIONAL_REFERENCE: &str = "source-column-ref";

/// Property excluded from undo history by default.
pub const DEFAULT_IGNORED_PROPERTY: &str = "populated";

/// Default indentation width of saved documents.
pub const DEFAULT_INDENT: usize = 1;

/// Options for writing a project document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveConfig {
    /// Populate unpopulated subtrees before writing them, when a populator
    /// is available.
    pub save_entire_source: bool,

    /// Spaces per nesting level.
    pub indent: usize,
}

impl SaveConfig {
    /// Create a configuration that respects population state.
    pub fn new() -> Self {
        Self {
            save_entire_source: false,
            indent: DEFAULT_INDENT,
        }
    }

    /// Populate and write every subtree.
    pub fn with_entire_source(mut self, enabled: bool) -> Self {
        self.save_entire_source = enabled;
        self
    }

    /// Set the indentation width.
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for reading a project document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    /// Reference attributes that may name a missing element without failing
    /// the load.
    pub optional_references: BTreeSet<String>,
}

impl LoadConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self {
            optional_references: BTreeSet::from([DEFAULT_OPTIONAL_REFERENCE.to_string()]),
        }
    }

    /// Tolerate misses of another reference attribute.
    pub fn with_optional_reference(mut self, attribute: impl Into<String>) -> Self {
        self.optional_references.insert(attribute.into());
        self
    }

    /// Make every reference attribute mandatory.
    pub fn strict(mut self) -> Self {
        self.optional_references.clear();
        self
    }

    /// Whether a miss of `attribute` is tolerated.
    pub fn is_optional(&self, attribute: &str) -> bool {
        self.optional_references.contains(attribute)
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for the undo recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoConfig {
    /// Property names never recorded as undoable edits.
    pub ignored_properties: BTreeSet<String>,

    /// Maximum number of undo units kept. None keeps everything.
    pub limit: Option<usize>,
}

impl UndoConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self {
            ignored_properties: BTreeSet::from([DEFAULT_IGNORED_PROPERTY.to_string()]),
            limit: None,
        }
    }

    /// Exclude another property from undo history.
    pub fn with_ignored_property(mut self, property: impl Into<String>) -> Self {
        self.ignored_properties.insert(property.into());
        self
    }

    /// Replace the whole ignore list.
    pub fn with_ignored_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_properties = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Cap the number of undo units.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit.max(1));
        self
    }

    /// Whether edits of `property` are skipped.
    pub fn is_ignored(&self, property: &str) -> bool {
        self.ignored_properties.contains(property)
    }
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self::new()
    }
}
