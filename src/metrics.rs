//! Operation timers.
//!
//! Storage operations report their wall-clock duration under a named timer.
//! The sink is pluggable; the default one emits a `tracing` event.

use std::time::Duration;

pub const TIMER_FETCH: &str = "Fetch";
pub const TIMER_FLUSH_BATCH: &str = "FlushBatch";
pub const TIMER_END_BATCH: &str = "EndBatch";
pub const TIMER_STORE_BLOCK: &str = "StoreBlock";

pub trait TimerSink: Send + Sync {
    fn record(&self, name: &str, elapsed: Duration);
}

/// Reports timers as debug-level trace events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTimerSink;

impl TimerSink for TracingTimerSink {
    fn record(&self, name: &str, elapsed: Duration) {
        tracing::debug!(metric = name, nanos = elapsed.as_nanos() as u64, "timer");
    }
}

/// Builds `<prefix>_<operation>`.
pub fn timer_name(prefix: &str, operation: &str) -> String {
    format!("{}_{}", prefix, operation)
}
