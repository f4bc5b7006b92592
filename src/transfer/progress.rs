//! Shared transfer progress

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Percentage in `[0, 100]` written by one task and readable from anywhere.
///
/// Clones share the same value. Within one transfer the value never goes
/// down, and 100 is only reported once the transfer has completed.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    value: Arc<AtomicU8>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current percentage
    pub fn get(&self) -> u8 {
        self.value.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.get() == 100
    }

    /// Start of a new transfer
    pub(crate) fn reset(&self) {
        self.value.store(0, Ordering::Release);
    }

    /// Record intermediate progress; capped at 99 and never decreasing
    pub(crate) fn advance(&self, percent: u8) {
        self.value.fetch_max(percent.min(99), Ordering::AcqRel);
    }

    pub(crate) fn complete(&self) {
        self.value.store(100, Ordering::Release);
    }
}

/// `done * 100 / total`, saturating at 100; an empty total counts as done
pub(crate) fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (done as u128 * 100 / total as u128).min(100);
    pct as u8
}
