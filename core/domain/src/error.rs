use thiserror::Error;
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Failed to parse sip server address: {0:?}")]
    ParseSipServerAddress(String),
}
