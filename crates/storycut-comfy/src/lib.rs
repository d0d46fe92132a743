//! Render backend gateway.
//!
//! This crate provides:
//! - A TCP reachability probe for fast pre-flight gating
//! - Job submission, history polling, and asset fetch against a
//!   ComfyUI-style HTTP API
//! - Checkpoint/adapter inventory (API introspection plus filesystem scan)
//! - Pure model-selection fallback ladders
//! - A typed render-graph builder that emits the backend's flat node map at
//!   the boundary only

pub mod client;
pub mod error;
pub mod graph;
pub mod inventory;
pub mod probe;
pub mod selection;

pub use client::{AssetRef, ComfyClient};
pub use error::{ComfyError, ComfyResult};
pub use graph::{ReferenceInput, RenderGraph};
pub use probe::is_reachable;
pub use selection::{select_adapter, select_checkpoint, AdapterChoice, CheckpointChoice};
