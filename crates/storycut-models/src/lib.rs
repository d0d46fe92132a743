//! Shared data models for the Storycut backend.
//!
//! This crate provides Serde-serializable types for:
//! - Cuts (scene records) and chunk guides
//! - Generation jobs and project metadata
//! - Progress event schemas
//! - Per-run control state

pub mod control;
pub mod cut;
pub mod event;
pub mod job;
pub mod project;
pub mod utils;

// Re-export common types
pub use control::{RunControl, RunState};
pub use cut::{ChunkGuide, Cut};
pub use event::{ProgressEvent, StoryDraft};
pub use job::{GenerationJob, JobId, VisualMode};
pub use project::ProjectMetadata;
pub use utils::{clean_string, sanitize_filename};
