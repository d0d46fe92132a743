//! Pipeline error types.
//!
//! Gateway errors bubble up undecorated; the pipelines decide locally
//! whether a failure is cut/chunk-scoped (logged, run continues) or
//! run-scoped (terminates the stream with one error event).

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Render backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("No cuts to process")]
    NoCuts,

    #[error("Render wait elapsed with no output")]
    RenderTimeout,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(#[from] storycut_llm::LlmError),

    #[error("Render backend error: {0}")]
    Comfy(#[from] storycut_comfy::ComfyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn backend_unreachable(msg: impl Into<String>) -> Self {
        Self::BackendUnreachable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
