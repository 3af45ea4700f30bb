//! Project dirty flag driven by the event stream.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::events::{GraphEvent, GraphListener};
use crate::model::{PopulationState, Property};

/// Tracks whether the graph changed since the last save.
///
/// Mutations made while populating only count when the population ends in
/// [`PopulationState::Populated`]; a failed population leaves the flag
/// alone, the same as a node that was never populated.
#[derive(Debug, Default)]
pub struct ModificationTracker {
    modified: AtomicBool,
    population_depth: AtomicUsize,
}

impl ModificationTracker {
    /// Create a clean tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything changed since the last [`mark_saved`](Self::mark_saved).
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    /// Flag the project as changed.
    pub fn mark_modified(&self) {
        self.modified.store(true, Ordering::Release);
    }

    /// Clear the flag after a successful save or load.
    pub fn mark_saved(&self) {
        self.modified.store(false, Ordering::Release);
    }
}

impl GraphListener for ModificationTracker {
    fn on_event(&self, event: &GraphEvent) {
        match event {
            GraphEvent::PopulationStarted { .. } => {
                self.population_depth.fetch_add(1, Ordering::AcqRel);
            }
            GraphEvent::PopulationFinished { state, .. } => {
                let _ = self.population_depth.fetch_update(
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    |d| Some(d.saturating_sub(1)),
                );
                if *state == PopulationState::Populated {
                    self.mark_modified();
                }
            }
            GraphEvent::PropertyChanged(change) if change.property == Property::Populated => {}
            e if e.is_mutation() && self.population_depth.load(Ordering::Acquire) == 0 => {
                self.mark_modified();
            }
            _ => {}
        }
    }
}
