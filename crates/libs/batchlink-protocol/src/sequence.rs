use std::sync::atomic::{AtomicU64, Ordering};

/// Per-connection counter stamped on every client-originated message.
///
/// The first value handed out is 1. Safe to share between submitting threads
/// and the connection driver.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Last value handed out, 0 if none yet.
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}
