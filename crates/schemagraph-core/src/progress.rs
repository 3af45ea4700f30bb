//! Progress reporting for long-running passes.

use tracing::debug;

/// Receives progress from saves and population.
///
/// The counter only moves forward: `advance` is called once per finished
/// item after `set_total` announced how many to expect.
pub trait ProgressSink {
    /// Announce the number of items in the pass.
    fn set_total(&mut self, total: usize);

    /// Mark one item done; `label` names the item just finished.
    fn advance(&mut self, label: &str);

    /// The pass is over.
    fn close(&mut self);
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set_total(&mut self, _total: usize) {}

    fn advance(&mut self, _label: &str) {}

    fn close(&mut self) {}
}

/// Logs progress at debug level and keeps the counters.
#[derive(Debug, Clone, Default)]
pub struct LoggingProgress {
    /// Items announced.
    pub total: usize,
    /// Items finished.
    pub done: usize,
    /// Whether `close` was called.
    pub closed: bool,
}

impl ProgressSink for LoggingProgress {
    fn set_total(&mut self, total: usize) {
        self.total = total;
        self.done = 0;
        debug!(total, "Progress started");
    }

    fn advance(&mut self, label: &str) {
        self.done += 1;
        debug!(done = self.done, total = self.total, item = label, "Progress");
    }

    fn close(&mut self) {
        self.closed = true;
        debug!(done = self.done, total = self.total, "Progress finished");
    }
}
