//! Persisted project metadata.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Cut;

/// The durable artifact of a render run: one JSON record per project
/// directory, written once at finalize time (including on early or forced
/// termination).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectMetadata {
    /// Project title
    pub title: String,

    /// Mode name ("LONG_FORM" / "SHORT_FORM")
    pub mode: String,

    /// Resolution string, e.g. "1920x1080"
    pub resolution: String,

    /// Total planned cuts
    pub cuts: u32,

    /// Creation time, "YYYYMMDD-HHMMSS"
    pub created_at: String,

    /// Every cut, rendered or not
    pub cuts_data: Vec<Cut>,

    /// Project directory name under the outputs root
    pub folder_name: String,

    /// Completion flag
    pub completed: bool,
}

impl ProjectMetadata {
    /// Format a creation timestamp the way project folders are named.
    pub fn timestamp(now: DateTime<Utc>) -> String {
        now.format("%Y%m%d-%H%M%S").to_string()
    }

    /// Count of cuts that actually rendered.
    pub fn rendered_count(&self) -> usize {
        self.cuts_data.iter().filter(|c| c.is_rendered()).count()
    }
}
