//! Generation job definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::Cut;

/// Unique identifier for a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output aspect mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VisualMode {
    /// 16:9 landscape (1920x1080)
    #[default]
    LongForm,
    /// 9:16 portrait (1080x1920)
    ShortForm,
}

impl VisualMode {
    /// Lenient parse from user-facing mode strings.
    pub fn parse(s: &str) -> Self {
        let lower = s.to_lowercase();
        if lower == "long" || lower.contains("long form") || lower == "long_form" {
            VisualMode::LongForm
        } else {
            VisualMode::ShortForm
        }
    }

    /// Render resolution (width, height).
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            VisualMode::LongForm => (1920, 1080),
            VisualMode::ShortForm => (1080, 1920),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisualMode::LongForm => "LONG_FORM",
            VisualMode::ShortForm => "SHORT_FORM",
        }
    }
}

/// Parameters for one render run, created by the caller and consumed once
/// by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    /// Unique job ID
    #[serde(default)]
    pub job_id: JobId,

    /// Selected project title
    pub title: String,

    /// Story concept label ("Epic", "Viral", ...)
    #[serde(default)]
    pub concept: String,

    /// Aspect/resolution mode
    #[serde(default)]
    pub mode: VisualMode,

    /// Target cut count
    pub total_cuts: u32,

    /// Protagonist reference prompt injected into synthesized image prompts
    #[serde(default)]
    pub character_prompt: String,

    /// Optional reference image path for visual continuity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,

    /// Full ordered cut list to render
    pub cuts: Vec<Cut>,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl GenerationJob {
    /// Create a new job over a finished cut list.
    pub fn new(title: impl Into<String>, mode: VisualMode, cuts: Vec<Cut>) -> Self {
        let total_cuts = cuts.len() as u32;
        Self {
            job_id: JobId::new(),
            title: title.into(),
            concept: String::new(),
            mode,
            total_cuts,
            character_prompt: String::new(),
            reference_image: None,
            cuts,
            created_at: Utc::now(),
        }
    }
}
