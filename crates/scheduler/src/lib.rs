//! Asynchronous job scheduler and queue.
//!
//! Drives the periodic fetch-and-reconstruct workflows: repeating
//! definitions are deduplicated by key (re-scheduling replaces), occurrences
//! sharing a dedup key never run concurrently, failures are classified and
//! retried with backoff, and exhausted jobs land in a bounded failed-job
//! list for diagnostics.

pub mod job;
pub mod metrics;
pub mod scheduler;

pub use job::{FailedJob, Job, JobError, JobHandler};
pub use metrics::{MetricsSnapshot, SchedulerMetrics};
pub use scheduler::{JobScheduler, SchedulerConfig};
