//! Cut and chunk guide definitions.
//!
//! A `Cut` is the atomic unit of both pipelines: the chunking pipeline
//! creates them, the render orchestrator enriches them in place, and the
//! project store persists them once at run end. Field names on the wire are
//! camelCase to stay compatible with the persisted metadata format.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One scene record combining narrative and rendering instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cut {
    /// Position within the project, 1-based. Assigned by the pipeline,
    /// never trusted from generated text.
    pub cut_number: u32,

    /// Scene description in the story's target language.
    #[serde(default)]
    pub description: String,

    /// Pre-authored render prompt. Synthesized from the structured fields
    /// when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,

    /// Canonical protagonist tag, identical across every cut in a project.
    #[serde(default)]
    pub character_tag: String,

    /// Emotional intensity 1-10.
    #[serde(default = "default_emotion_level")]
    pub emotion_level: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_angle: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lighting_condition: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather_atmosphere: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub physics_detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sfx_guide: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_hint: Option<String>,

    /// Secondary video-direction prompt, filled by the auxiliary task
    /// during rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_prompt: Option<String>,

    /// Rendered asset filename within the project directory.
    /// Empty string means "not rendered".
    #[serde(default)]
    pub filename: String,
}

fn default_emotion_level() -> u8 {
    5
}

impl Cut {
    /// Create an empty cut at a given position.
    pub fn new(cut_number: u32) -> Self {
        Self {
            cut_number,
            description: String::new(),
            image_prompt: None,
            character_tag: String::new(),
            emotion_level: default_emotion_level(),
            camera_angle: None,
            lighting_condition: None,
            weather_atmosphere: None,
            physics_detail: None,
            sfx_guide: None,
            transition_hint: None,
            video_prompt: None,
            filename: String::new(),
        }
    }

    /// Whether a rendered asset exists for this cut.
    pub fn is_rendered(&self) -> bool {
        !self.filename.is_empty()
    }
}

/// Planning record produced once per project by the blueprint call.
///
/// Read-only after creation and never persisted beyond the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChunkGuide {
    /// Zero-based chunk position.
    pub chunk_index: u32,

    /// First cut number covered by this chunk (inclusive).
    pub start_cut: u32,

    /// Last cut number covered by this chunk (inclusive).
    pub end_cut: u32,

    /// Pacing tag ("slow build", "climax", ...). Advisory.
    #[serde(default)]
    pub pacing: String,

    /// What must happen within this chunk.
    #[serde(default)]
    pub guide: String,

    /// State at chunk start (location, time, weather).
    #[serde(default)]
    pub context: String,

    /// State at chunk end, feeding the next chunk's context.
    #[serde(default)]
    pub transition: String,
}

impl ChunkGuide {
    /// Degraded-path guide used when the blueprint response is unparsable.
    pub fn generic(chunk_index: u32, start_cut: u32, end_cut: u32) -> Self {
        Self {
            chunk_index,
            start_cut,
            end_cut,
            pacing: String::new(),
            guide: "Follow the general story arc.".to_string(),
            context: "Standard scene context.".to_string(),
            transition: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_serializes_camel_case() {
        let mut cut = Cut::new(3);
        cut.description = "The wolf crosses the river".to_string();
        cut.image_prompt = Some("a wolf, river crossing".to_string());
        cut.character_tag = "The Wild Animal".to_string();

        let json = serde_json::to_string(&cut).unwrap();
        assert!(json.contains("\"cutNumber\":3"));
        assert!(json.contains("\"imagePrompt\""));
        assert!(json.contains("\"characterTag\""));
        assert!(json.contains("\"filename\":\"\""));
    }

    #[test]
    fn test_cut_deserializes_sparse_llm_output() {
        // LLM output regularly omits optional fields; only cutNumber is
        // structurally required here.
        let json = r#"{"cutNumber": 7, "description": "dawn over the valley"}"#;
        let cut: Cut = serde_json::from_str(json).unwrap();
        assert_eq!(cut.cut_number, 7);
        assert_eq!(cut.emotion_level, 5);
        assert!(cut.image_prompt.is_none());
        assert!(!cut.is_rendered());
    }

    #[test]
    fn test_cut_is_rendered() {
        let mut cut = Cut::new(1);
        assert!(!cut.is_rendered());
        cut.filename = "cut_000_42.png".to_string();
        assert!(cut.is_rendered());
    }

    #[test]
    fn test_generic_guide() {
        let guide = ChunkGuide::generic(2, 21, 23);
        assert_eq!(guide.chunk_index, 2);
        assert_eq!(guide.start_cut, 21);
        assert_eq!(guide.end_cut, 23);
        assert!(!guide.guide.is_empty());
    }
}
