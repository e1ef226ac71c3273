use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free scheduler counters, shared with the diagnostics endpoint.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    pub jobs_executed: AtomicU64,
    pub jobs_retried: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_enqueued: AtomicU64,
}

impl SchedulerMetrics {
    pub fn snapshot(&self, active_repeating: usize, failed_listed: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_executed: self.jobs_executed.load(Ordering::Relaxed),
            jobs_retried: self.jobs_retried.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            active_repeating,
            failed_listed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_executed: u64,
    pub jobs_retried: u64,
    pub jobs_failed: u64,
    pub jobs_enqueued: u64,
    pub active_repeating: usize,
    pub failed_listed: usize,
}
