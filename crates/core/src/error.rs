use thiserror::Error;

/// Error taxonomy for the fetch-and-reconstruct workflows.
///
/// The variant decides how the scheduler treats a failed job:
/// configuration problems are never retried, upstream and storage
/// failures go through the backoff policy, and data integrity problems
/// are skipped at the single-record level.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upstream API error: {0}")]
    Upstream(String),

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Whether the scheduler should retry a job that failed with this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Upstream(_) | SyncError::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::Upstream("rate limited".into()).is_retryable());
        assert!(SyncError::Storage("connection reset".into()).is_retryable());
        assert!(!SyncError::Configuration("tenant not connected".into()).is_retryable());
        assert!(!SyncError::DataIntegrity("missing data field".into()).is_retryable());
    }
}
