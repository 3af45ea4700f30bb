//! Change notification, undo history and dirty tracking.

mod events;
mod tracker;
mod undo;

pub use events::{GraphEvent, GraphListener, ListenerId, PropertyChange};
pub use tracker::ModificationTracker;
pub use undo::UndoManager;
