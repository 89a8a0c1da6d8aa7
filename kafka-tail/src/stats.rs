use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::metrics_consts::RECORDS_CONSUMED;

/// Running count of records accepted from the stream.
///
/// Clones share the same counter. Only the dispatcher increments it; readers
/// may observe it from any task.
#[derive(Clone, Debug, Default)]
pub struct ConsumptionStats {
    consumed: Arc<AtomicU64>,
}

impl ConsumptionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(RECORDS_CONSUMED).increment(1);
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }
}
