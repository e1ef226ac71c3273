pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::{Config, PollingOverride};
pub use error::SyncError;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use types::*;
