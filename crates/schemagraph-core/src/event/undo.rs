//! Undo history recorder.
//!
//! The recorder is a [`GraphListener`]: it turns each committed mutation into
//! a reversible edit, groups edits made inside a compound scope into one
//! unit, and replays inverses on [`UndoManager::undo`]. Edits made during
//! population or during its own replay are not recorded.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use super::events::{GraphEvent, GraphListener, ListenerId, PropertyChange};
use crate::config::UndoConfig;
use crate::error::{Result, UndoError};
use crate::model::{NodeId, Property, PropertyDescriptor, PropertyValue, SchemaGraph};

/// A recorded, reversible mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum UndoableEdit {
    Property {
        node: NodeId,
        property: Property,
        old: PropertyValue,
        new: PropertyValue,
    },
    Insert {
        parent: NodeId,
        child: NodeId,
        index: usize,
    },
    Remove {
        parent: NodeId,
        child: NodeId,
        index: usize,
    },
    Link {
        parent: NodeId,
        target: NodeId,
        index: usize,
    },
    Unlink {
        parent: NodeId,
        target: NodeId,
        index: usize,
    },
}

impl UndoableEdit {
    fn revert(&self, graph: &mut SchemaGraph) -> Result<()> {
        match self {
            UndoableEdit::Property {
                node, property, old, ..
            } => graph.set_property(*node, *property, old.clone()).map(|_| ()),
            UndoableEdit::Insert { parent, child, .. } => {
                graph.remove_child(*parent, *child).map(|_| ())
            }
            UndoableEdit::Remove {
                parent,
                child,
                index,
            } => graph.add_child(*parent, *child, *index),
            UndoableEdit::Link { parent, target, .. } => {
                graph.unlink_child(*parent, *target).map(|_| ())
            }
            UndoableEdit::Unlink {
                parent,
                target,
                index,
            } => graph.link_child(*parent, *target, *index),
        }
    }

    fn apply(&self, graph: &mut SchemaGraph) -> Result<()> {
        match self {
            UndoableEdit::Property {
                node, property, new, ..
            } => graph.set_property(*node, *property, new.clone()).map(|_| ()),
            UndoableEdit::Insert {
                parent,
                child,
                index,
            } => graph.add_child(*parent, *child, *index),
            UndoableEdit::Remove { parent, child, .. } => {
                graph.remove_child(*parent, *child).map(|_| ())
            }
            UndoableEdit::Link {
                parent,
                target,
                index,
            } => graph.link_child(*parent, *target, *index),
            UndoableEdit::Unlink { parent, target, .. } => {
                graph.unlink_child(*parent, *target).map(|_| ())
            }
        }
    }
}

/// One undo step: a single edit or a whole compound scope.
#[derive(Debug, Clone)]
struct UndoUnit {
    label: String,
    edits: Vec<UndoableEdit>,
}

#[derive(Debug, Default)]
struct History {
    undo: Vec<UndoUnit>,
    redo: Vec<UndoUnit>,
    open: Option<UndoUnit>,
    depth: usize,
    population_depth: usize,
    replaying: bool,
    diagnostics: Vec<UndoError>,
}

impl History {
    fn push(&mut self, unit: UndoUnit, limit: Option<usize>) {
        self.undo.push(unit);
        self.redo.clear();
        if let Some(limit) = limit {
            if self.undo.len() > limit {
                let excess = self.undo.len() - limit;
                self.undo.drain(..excess);
            }
        }
    }

    fn check_replayable(&self) -> Result<(), UndoError> {
        if !self.diagnostics.is_empty() {
            return Err(UndoError::HistoryIncomplete {
                count: self.diagnostics.len(),
            });
        }
        if let Some(open) = &self.open {
            return Err(UndoError::CompoundOpen {
                label: open.label.clone(),
            });
        }
        if self.depth > 0 {
            return Err(UndoError::CompoundOpen {
                label: String::new(),
            });
        }
        Ok(())
    }
}

/// Records graph edits and replays them backward or forward.
#[derive(Debug)]
pub struct UndoManager {
    config: UndoConfig,
    history: Mutex<History>,
    listener: Mutex<Option<ListenerId>>,
}

impl UndoManager {
    /// Create a recorder that is not yet subscribed to any graph.
    pub fn new(config: UndoConfig) -> Self {
        Self {
            config,
            history: Mutex::new(History::default()),
            listener: Mutex::new(None),
        }
    }

    /// Create a recorder and subscribe it to `graph`.
    pub fn attach(graph: &mut SchemaGraph, config: UndoConfig) -> Arc<Self> {
        let manager = Arc::new(Self::new(config));
        let id = graph.subscribe(manager.clone());
        *manager.listener.lock() = Some(id);
        manager
    }

    /// Unsubscribe from `graph`. History is kept.
    pub fn detach(&self, graph: &mut SchemaGraph) -> bool {
        match self.listener.lock().take() {
            Some(id) => graph.unsubscribe(id),
            None => false,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &UndoConfig {
        &self.config
    }

    /// Number of undo steps available.
    pub fn undo_count(&self) -> usize {
        self.history.lock().undo.len()
    }

    /// Number of redo steps available.
    pub fn redo_count(&self) -> usize {
        self.history.lock().redo.len()
    }

    /// Whether [`undo`](Self::undo) would replay something.
    pub fn can_undo(&self) -> bool {
        let history = self.history.lock();
        history.check_replayable().is_ok() && !history.undo.is_empty()
    }

    /// Whether [`redo`](Self::redo) would replay something.
    pub fn can_redo(&self) -> bool {
        let history = self.history.lock();
        history.check_replayable().is_ok() && !history.redo.is_empty()
    }

    /// Label of the next undo step.
    pub fn undo_label(&self) -> Option<String> {
        self.history.lock().undo.last().map(|u| u.label.clone())
    }

    /// Edits that could not be recorded. Non-empty means undo is refused.
    pub fn diagnostics(&self) -> Vec<UndoError> {
        self.history.lock().diagnostics.clone()
    }

    /// Drop all history and diagnostics.
    pub fn clear(&self) {
        let mut history = self.history.lock();
        history.undo.clear();
        history.redo.clear();
        history.diagnostics.clear();
    }

    /// Revert the most recent step. Returns false when there is nothing to undo.
    pub fn undo(&self, graph: &mut SchemaGraph) -> Result<bool> {
        self.replay(graph, Direction::Undo)
    }

    /// Re-apply the most recently undone step. Returns false when there is
    /// nothing to redo.
    pub fn redo(&self, graph: &mut SchemaGraph) -> Result<bool> {
        self.replay(graph, Direction::Redo)
    }

    fn replay(&self, graph: &mut SchemaGraph, direction: Direction) -> Result<bool> {
        let unit = {
            let mut history = self.history.lock();
            history.check_replayable()?;
            if graph.compound_depth() > 0 {
                return Err(UndoError::CompoundOpen {
                    label: String::new(),
                }
                .into());
            }
            let stack = match direction {
                Direction::Undo => &mut history.undo,
                Direction::Redo => &mut history.redo,
            };
            let Some(unit) = stack.pop() else {
                return Ok(false);
            };
            history.replaying = true;
            unit
        };

        // The lock is released here: the graph calls back into on_event.
        let result = match direction {
            Direction::Undo => unit.edits.iter().rev().try_for_each(|e| e.revert(graph)),
            Direction::Redo => unit.edits.iter().try_for_each(|e| e.apply(graph)),
        };

        let mut history = self.history.lock();
        history.replaying = false;
        match result {
            Ok(()) => {
                debug!(label = %unit.label, ?direction, edits = unit.edits.len(), "Replayed undo unit");
                match direction {
                    Direction::Undo => history.redo.push(unit),
                    Direction::Redo => history.undo.push(unit),
                }
                Ok(true)
            }
            Err(e) => {
                let failure = UndoError::ReplayFailed {
                    label: unit.label.clone(),
                    reason: e.to_string(),
                };
                error!(error = %failure, "Undo history is out of sync with the graph");
                history.diagnostics.push(failure);
                Err(e)
            }
        }
    }

    fn capture(&self, event: &GraphEvent) -> Result<Option<UndoableEdit>, UndoError> {
        let edit = match event {
            GraphEvent::PropertyChanged(change) => return self.capture_property(change),
            GraphEvent::ChildInserted {
                parent,
                child,
                index,
            } => UndoableEdit::Insert {
                parent: *parent,
                child: *child,
                index: *index,
            },
            GraphEvent::ChildRemoved {
                parent,
                child,
                index,
            } => UndoableEdit::Remove {
                parent: *parent,
                child: *child,
                index: *index,
            },
            GraphEvent::LinkInserted {
                parent,
                target,
                index,
            } => UndoableEdit::Link {
                parent: *parent,
                target: *target,
                index: *index,
            },
            GraphEvent::LinkRemoved {
                parent,
                target,
                index,
            } => UndoableEdit::Unlink {
                parent: *parent,
                target: *target,
                index: *index,
            },
            _ => return Ok(None),
        };
        Ok(Some(edit))
    }

    fn capture_property(&self, change: &PropertyChange) -> Result<Option<UndoableEdit>, UndoError> {
        if self.config.is_ignored(change.property.name()) {
            return Ok(None);
        }
        let unrecordable = |reason: &str| UndoError::Unrecordable {
            node_type: change.node_type,
            property: change.property.name().to_string(),
            reason: reason.to_string(),
        };
        let desc = PropertyDescriptor::find(change.node_type, change.property)
            .ok_or_else(|| unrecordable("no property descriptor"))?;
        if !desc.value_type.accepts(&change.old) || !desc.value_type.accepts(&change.new) {
            return Err(unrecordable("value does not match the declared type"));
        }
        Ok(Some(UndoableEdit::Property {
            node: change.node,
            property: change.property,
            old: change.old.clone(),
            new: change.new.clone(),
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Undo,
    Redo,
}

impl GraphListener for UndoManager {
    fn on_event(&self, event: &GraphEvent) {
        let mut history = self.history.lock();
        if history.replaying {
            return;
        }
        match event {
            GraphEvent::PopulationStarted { .. } => {
                history.population_depth += 1;
                return;
            }
            GraphEvent::PopulationFinished { .. } => {
                history.population_depth = history.population_depth.saturating_sub(1);
                return;
            }
            _ if history.population_depth > 0 => return,
            _ => {}
        }

        match event {
            GraphEvent::CompoundStarted { label } => {
                if history.depth == 0 {
                    history.open = Some(UndoUnit {
                        label: label.clone(),
                        edits: Vec::new(),
                    });
                }
                history.depth += 1;
            }
            GraphEvent::CompoundEnded => {
                history.depth = history.depth.saturating_sub(1);
                if history.depth == 0 {
                    if let Some(unit) = history.open.take() {
                        if !unit.edits.is_empty() {
                            history.push(unit, self.config.limit);
                        }
                    }
                }
            }
            _ => match self.capture(event) {
                Ok(Some(edit)) => match history.open.as_mut() {
                    Some(unit) => unit.edits.push(edit),
                    None => {
                        let label = describe(&edit);
                        history.push(
                            UndoUnit {
                                label,
                                edits: vec![edit],
                            },
                            self.config.limit,
                        );
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Edit could not be recorded; undo is disabled");
                    history.diagnostics.push(e);
                }
            },
        }
    }
}

fn describe(edit: &UndoableEdit) -> String {
    match edit {
        UndoableEdit::Property { property, .. } => format!("Set {property}"),
        UndoableEdit::Insert { .. } => "Insert child".to_string(),
        UndoableEdit::Remove { .. } => "Remove child".to_string(),
        UndoableEdit::Link { .. } => "Link relationship".to_string(),
        UndoableEdit::Unlink { .. } => "Unlink relationship".to_string(),
    }
}
