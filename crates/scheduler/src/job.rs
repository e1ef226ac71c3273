use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use adflux_core::SyncError;

/// One occurrence handed to a queue handler.
#[derive(Debug, Clone)]
pub struct Job {
    pub queue: String,
    /// Occurrences sharing a dedup key execute sequentially.
    pub dedup_key: Option<String>,
    pub payload: Value,
    /// 0-based attempt counter, incremented on each retry.
    pub attempt: u32,
}

/// Handler failure classification: the scheduler only retries `Retryable`.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("retryable: {0}")]
    Retryable(String),
}

impl From<SyncError> for JobError {
    fn from(e: SyncError) -> Self {
        if e.is_retryable() {
            JobError::Retryable(e.to_string())
        } else {
            JobError::Fatal(e.to_string())
        }
    }
}

/// Boxed async function consuming jobs for one queue.
pub type JobHandler =
    Arc<dyn Fn(Job) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync>;

/// Diagnostics entry for a job dropped after exhausting its attempts (or
/// failing fatally).
#[derive(Debug, Clone, Serialize)]
pub struct FailedJob {
    pub queue: String,
    pub dedup_key: Option<String>,
    pub payload: Value,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}
