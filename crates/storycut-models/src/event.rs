//! Progress event schema.
//!
//! Both pipelines emit to one observable stream of these events. The stream
//! is append-only and ordered by emission; the terminal event is always
//! `Complete`/`Done` or `Error`.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Cut, ProjectMetadata};

/// A story draft produced during authoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoryDraft {
    pub id: u32,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub theme: String,
}

/// Progress event envelope.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Streaming LLM text fragment (chunking pipeline)
    Delta { text: String },

    /// Human-readable progress note (render pipeline)
    Log {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none", rename = "cutIndex")]
        cut_index: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    /// A just-rendered asset, for live display
    Preview {
        /// Data URL (`data:image/png;base64,...`)
        image: String,
        #[serde(rename = "cutIndex")]
        cut_index: u32,
    },

    /// One generated story draft finished
    Draft { draft: StoryDraft },

    /// One chunk of generated cuts finished
    ChunkCompleted {
        #[serde(rename = "chunkIndex")]
        chunk_index: u32,
        #[serde(rename = "cutCount")]
        cut_count: u32,
    },

    /// Chunking pipeline success terminal event
    Complete {
        cuts: Vec<Cut>,
        #[serde(rename = "characterPrompt")]
        character_prompt: String,
        #[serde(rename = "fullText")]
        full_text: String,
    },

    /// Render pipeline success terminal event
    Done { result: ProjectMetadata },

    /// Unrecoverable failure terminal event
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    /// Create a delta event.
    pub fn delta(text: impl Into<String>) -> Self {
        ProgressEvent::Delta { text: text.into() }
    }

    /// Create a log event.
    pub fn log(message: impl Into<String>) -> Self {
        ProgressEvent::Log {
            message: message.into(),
            cut_index: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a log event tagged with a cut index.
    pub fn log_for_cut(message: impl Into<String>, cut_index: u32) -> Self {
        ProgressEvent::Log {
            message: message.into(),
            cut_index: Some(cut_index),
            timestamp: Utc::now(),
        }
    }

    /// Create a preview event.
    pub fn preview(image: impl Into<String>, cut_index: u32) -> Self {
        ProgressEvent::Preview {
            image: image.into(),
            cut_index,
        }
    }

    /// Create a draft event.
    pub fn draft(draft: StoryDraft) -> Self {
        ProgressEvent::Draft { draft }
    }

    /// Create a chunk-completed event.
    pub fn chunk_completed(chunk_index: u32, cut_count: u32) -> Self {
        ProgressEvent::ChunkCompleted {
            chunk_index,
            cut_count,
        }
    }

    /// Create the chunking success terminal event.
    pub fn complete(
        cuts: Vec<Cut>,
        character_prompt: impl Into<String>,
        full_text: impl Into<String>,
    ) -> Self {
        ProgressEvent::Complete {
            cuts,
            character_prompt: character_prompt.into(),
            full_text: full_text.into(),
        }
    }

    /// Create the render success terminal event.
    pub fn done(result: ProjectMetadata) -> Self {
        ProgressEvent::Done { result }
    }

    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Whether this event closes the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Done { .. } | ProgressEvent::Error { .. }
        )
    }
}
