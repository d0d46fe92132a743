//! Run request file format.

use serde::Deserialize;

use storycut_models::{Cut, VisualMode};

/// One generation run, as supplied by the caller. When `cuts` is present
/// the chunking pipeline is skipped and the list renders as-is.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub title: String,

    /// Story premise driving the chunking pipeline.
    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default = "default_total_cuts")]
    pub total_cuts: u32,

    /// Mode string, parsed leniently ("long", "Long Form (16:9)", ...).
    #[serde(default)]
    pub mode: Option<String>,

    #[serde(default)]
    pub character_tag: String,

    #[serde(default)]
    pub character_prompt: String,

    #[serde(default)]
    pub reference_image: Option<String>,

    /// Pre-made cut list to render directly.
    #[serde(default)]
    pub cuts: Option<Vec<Cut>>,

    /// Generate cuts only; do not render.
    #[serde(default)]
    pub skip_render: bool,
}

fn default_total_cuts() -> u32 {
    20
}

impl RunRequest {
    pub async fn load(path: &str) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn mode(&self) -> VisualMode {
        self.mode
            .as_deref()
            .map(VisualMode::parse)
            .unwrap_or_default()
    }
}
