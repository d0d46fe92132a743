//! Storycut pipelines.
//!
//! This crate provides:
//! - The content chunking pipeline (blueprint, parallel chunk generation,
//!   reassembly)
//! - The render job orchestrator (pre-flight, per-cut state machine,
//!   reference chaining, finalize)
//! - Authoring helpers (drafts, titles, cut regeneration, batch video
//!   prompts)
//! - Progress emission, configuration, prompt templates, and the on-disk
//!   project store

pub mod authoring;
pub mod chunking;
pub mod config;
pub mod error;
pub mod progress;
pub mod prompts;
pub mod render;
pub mod store;

pub use authoring::{Authoring, RegenerateRequest, TitleSuggestion};
pub use chunking::{chunk_ranges, ChunkingOutcome, ChunkingPipeline, ChunkingRequest};
pub use config::StudioConfig;
pub use error::{PipelineError, PipelineResult};
pub use progress::ProgressSender;
pub use prompts::PromptSet;
pub use render::RenderOrchestrator;
pub use store::{ProjectHandle, ProjectStore};
