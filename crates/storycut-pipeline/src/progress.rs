//! Progress emission.
//!
//! Both pipelines publish to one in-process channel per invocation. The
//! sender half is cheaply clonable so fan-out tasks can emit directly; the
//! receiver is a live, append-only sequence consumed by the caller.

use tokio::sync::mpsc;
use tracing::debug;

use storycut_models::{Cut, ProgressEvent, ProjectMetadata, StoryDraft};

/// Sending half of a progress stream.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    /// Create a channel for one pipeline invocation.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event. A closed receiver means the caller went away; the
    /// run keeps going and the event is dropped.
    pub fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            debug!("Progress receiver dropped; event discarded");
        }
    }

    /// Emit a streaming text fragment.
    pub fn delta(&self, text: impl Into<String>) {
        self.send(ProgressEvent::delta(text));
    }

    /// Emit a progress note.
    pub fn log(&self, message: impl Into<String>) {
        self.send(ProgressEvent::log(message));
    }

    /// Emit a progress note tagged with a cut index.
    pub fn log_for_cut(&self, message: impl Into<String>, cut_index: u32) {
        self.send(ProgressEvent::log_for_cut(message, cut_index));
    }

    /// Emit a rendered-asset preview.
    pub fn preview(&self, image: impl Into<String>, cut_index: u32) {
        self.send(ProgressEvent::preview(image, cut_index));
    }

    /// Emit a finished draft.
    pub fn draft(&self, draft: StoryDraft) {
        self.send(ProgressEvent::draft(draft));
    }

    /// Emit a chunk-completed notification.
    pub fn chunk_completed(&self, chunk_index: u32, cut_count: u32) {
        self.send(ProgressEvent::chunk_completed(chunk_index, cut_count));
    }

    /// Emit the chunking success terminal event.
    pub fn complete(
        &self,
        cuts: Vec<Cut>,
        character_prompt: impl Into<String>,
        full_text: impl Into<String>,
    ) {
        self.send(ProgressEvent::complete(cuts, character_prompt, full_text));
    }

    /// Emit the render success terminal event.
    pub fn done(&self, result: ProjectMetadata) {
        self.send(ProgressEvent::done(result));
    }

    /// Emit the failure terminal event.
    pub fn error(&self, message: impl Into<String>) {
        self.send(ProgressEvent::error(message));
    }
}
