use thiserror::Error;

use adflux_core::SyncError;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected request ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response shape: {0}")]
    Shape(String),
}

impl From<ProviderError> for SyncError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Shape(msg) => SyncError::DataIntegrity(msg),
            other => SyncError::Upstream(other.to_string()),
        }
    }
}
