//! Process-wide "firmware update in progress" flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag raised by the update subsystem. While it is set the
/// coordinator skips every tick.
#[derive(Debug, Clone, Default)]
pub struct UpdateGate {
    in_progress: Arc<AtomicBool>,
}

impl UpdateGate {
    /// Gate with no update running.
    pub fn new() -> Self {
        Self::default()
    }

    /// An update has started; ticks pause until `finish`.
    pub fn begin(&self) {
        self.in_progress.store(true, Ordering::SeqCst);
    }

    /// The update ended.
    pub fn finish(&self) {
        self.in_progress.store(false, Ordering::SeqCst);
    }

    /// Whether an update is running.
    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }
}
