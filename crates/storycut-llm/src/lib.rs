//! LLM gateway for the Storycut backend.
//!
//! This crate provides:
//! - A chat-completion client (blocking and SSE-streaming) over an
//!   OpenAI-compatible API
//! - A robust text-to-structure decoder for free-form model output
//!
//! Retry policy deliberately lives at call sites; the gateway reports typed
//! failures and nothing more.

pub mod client;
pub mod decode;
pub mod error;

pub use client::{LlmClient, LlmConfig};
pub use decode::robust_json;
pub use error::{LlmError, LlmResult};
