//! Render backend gateway error types.

use thiserror::Error;

pub type ComfyResult<T> = Result<T, ComfyError>;

#[derive(Debug, Error)]
pub enum ComfyError {
    #[error("Job rejected by backend: {0}")]
    QueueRejected(String),

    #[error("Backend API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ComfyError {
    pub fn queue_rejected(msg: impl Into<String>) -> Self {
        Self::QueueRejected(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }
}
