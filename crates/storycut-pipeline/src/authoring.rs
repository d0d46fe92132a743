//! Authoring helpers.
//!
//! Everything here happens before or after a render run: story draft
//! generation, title suggestions, single-cut regeneration, and batch video
//! prompts for an existing cut list.

use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use storycut_llm::{robust_json, LlmClient};
use storycut_models::{clean_string, Cut, StoryDraft};

use crate::error::PipelineResult;
use crate::progress::ProgressSender;
use crate::prompts::{render, PromptSet};

const DRAFT_COUNT: u32 = 10;

/// An alternative title proposal.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TitleSuggestion {
    pub title: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub hook: String,
}

/// Context for regenerating one cut in place.
#[derive(Debug, Clone)]
pub struct RegenerateRequest {
    pub title: String,
    pub cut_number: u32,
    pub character_tag: String,
    pub prev_description: Option<String>,
    pub next_description: Option<String>,
    /// Inclusive emotion-level bounds for the rewritten cut.
    pub emotion_range: (u8, u8),
}

/// Pre/post-run LLM operations.
pub struct Authoring {
    llm: Arc<LlmClient>,
    prompts: PromptSet,
}

impl Authoring {
    pub fn new(llm: Arc<LlmClient>, prompts: PromptSet) -> Self {
        Self { llm, prompts }
    }

    /// Generate story drafts one at a time, streaming text as it arrives.
    /// Each draft's summary feeds the next call's anti-duplication context.
    /// A draft that fails to parse becomes a placeholder rather than
    /// aborting the batch.
    pub async fn generate_drafts_stream(
        &self,
        concept: &str,
        progress: &ProgressSender,
    ) -> PipelineResult<Vec<StoryDraft>> {
        let mut drafts: Vec<StoryDraft> = Vec::with_capacity(DRAFT_COUNT as usize);
        let mut used_summaries: Vec<String> = Vec::new();

        for id in 1..=DRAFT_COUNT {
            let used = if used_summaries.is_empty() {
                "(none yet)".to_string()
            } else {
                used_summaries.join("; ")
            };
            let user = render(
                &self.prompts.draft_generation,
                &[("concept", concept), ("used_summaries", &used)],
            );

            let mut text = String::new();
            let mut stream = self
                .llm
                .complete_streaming("You invent story premises. Respond with JSON only.", &user)
                .await?;
            while let Some(delta) = stream.next().await {
                match delta {
                    Ok(fragment) => {
                        progress.delta(&fragment);
                        text.push_str(&fragment);
                    }
                    Err(err) => {
                        warn!(draft = id, error = %err, "Draft stream interrupted");
                        break;
                    }
                }
            }

            let draft = match parse_draft(&text, id) {
                Some(draft) => draft,
                None => {
                    warn!(draft = id, "Draft output unparsable; using placeholder");
                    StoryDraft {
                        id,
                        title: format!("Untitled draft {}", id),
                        summary: String::new(),
                        theme: String::new(),
                    }
                }
            };
            if !draft.summary.is_empty() {
                used_summaries.push(draft.summary.clone());
            }
            progress.draft(draft.clone());
            drafts.push(draft);
        }

        Ok(drafts)
    }

    /// Replace one draft, avoiding every premise the caller already holds.
    /// Decode failure degrades to a placeholder, as in the batch path.
    pub async fn regenerate_draft(
        &self,
        concept: &str,
        used_summaries: &[String],
        id: u32,
    ) -> PipelineResult<StoryDraft> {
        let used = if used_summaries.is_empty() {
            "(none yet)".to_string()
        } else {
            used_summaries.join("; ")
        };
        let user = render(
            &self.prompts.draft_generation,
            &[("concept", concept), ("used_summaries", &used)],
        );
        let text = self
            .llm
            .complete_json("You invent story premises. Respond with JSON only.", &user)
            .await?;

        Ok(parse_draft(&text, id).unwrap_or_else(|| {
            warn!(draft = id, "Regenerated draft unparsable; using placeholder");
            StoryDraft {
                id,
                title: format!("Untitled draft {}", id),
                summary: String::new(),
                theme: String::new(),
            }
        }))
    }

    /// Turn a user-pasted script into an ordered cut list. Positions and
    /// the canonical tag are stamped on; decode failure yields an empty
    /// list.
    pub async fn parse_script(
        &self,
        script: &str,
        total_cuts: u32,
        character_tag: &str,
    ) -> PipelineResult<Vec<Cut>> {
        let user = render(
            &self.prompts.script_parse,
            &[
                ("script", &clean_string(script)),
                ("total_cuts", &total_cuts.to_string()),
                ("character_tag", character_tag),
            ],
        );
        let text = self
            .llm
            .complete_json("You split scripts into scenes. Respond with JSON only.", &user)
            .await?;

        let Some(mut cuts) = crate::chunking::parse_cuts(&text) else {
            warn!("Script parse output unparsable");
            return Ok(Vec::new());
        };
        cuts.truncate(total_cuts as usize);
        for (i, cut) in cuts.iter_mut().enumerate() {
            cut.cut_number = i as u32 + 1;
            cut.character_tag = character_tag.to_string();
        }
        Ok(cuts)
    }

    /// Suggest alternative titles for a chosen premise. An unparsable
    /// response yields an empty list.
    pub async fn generate_titles(&self, summary: &str) -> PipelineResult<Vec<TitleSuggestion>> {
        let user = render(&self.prompts.title_generation, &[("summary", summary)]);
        let text = self
            .llm
            .complete_json("You suggest story titles. Respond with JSON only.", &user)
            .await?;

        let Some(value) = robust_json(&text) else {
            warn!("Title response unparsable");
            return Ok(Vec::new());
        };
        let items = match &value {
            serde_json::Value::Array(items) => items.clone(),
            serde_json::Value::Object(map) => map
                .get("titles")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect())
    }

    /// Rewrite one cut with its neighbors as context. Position and tag on
    /// the returned cut are authoritative, not the model's.
    pub async fn regenerate_cut(&self, request: &RegenerateRequest) -> PipelineResult<Option<Cut>> {
        let (emotion_min, emotion_max) = request.emotion_range;
        let user = render(
            &self.prompts.cut_regeneration,
            &[
                ("title", &request.title),
                ("cut_number", &request.cut_number.to_string()),
                ("character_tag", &request.character_tag),
                (
                    "prev_description",
                    request.prev_description.as_deref().unwrap_or("(story start)"),
                ),
                (
                    "next_description",
                    request.next_description.as_deref().unwrap_or("(story end)"),
                ),
                ("emotion_min", &emotion_min.to_string()),
                ("emotion_max", &emotion_max.to_string()),
            ],
        );
        let text = self
            .llm
            .complete_json("You rewrite single scenes. Respond with JSON only.", &user)
            .await?;

        let Some(value) = robust_json(&text) else {
            warn!(cut = request.cut_number, "Regeneration output unparsable");
            return Ok(None);
        };
        match serde_json::from_value::<Cut>(value) {
            Ok(mut cut) => {
                cut.cut_number = request.cut_number;
                cut.character_tag = request.character_tag.clone();
                cut.emotion_level = cut.emotion_level.clamp(emotion_min, emotion_max);
                Ok(Some(cut))
            }
            Err(err) => {
                warn!(cut = request.cut_number, error = %err, "Regeneration output malformed");
                Ok(None)
            }
        }
    }

    /// Generate video prompts for a whole cut list in one call. Returns a
    /// map keyed by cut number; decode failure yields an empty map.
    pub async fn video_prompts_batch(
        &self,
        cuts: &[Cut],
    ) -> PipelineResult<HashMap<u32, String>> {
        if cuts.is_empty() {
            return Ok(HashMap::new());
        }
        let scenes = cuts
            .iter()
            .map(|c| format!("{}. {}", c.cut_number, c.description))
            .collect::<Vec<_>>()
            .join("\n");
        let user = render(&self.prompts.video_prompt_batch, &[("scenes", &scenes)]);
        let text = self
            .llm
            .complete_json(
                "You write camera-direction prompts. Respond with JSON only.",
                &user,
            )
            .await?;

        Ok(parse_batch_prompts(&text))
    }
}

fn parse_draft(text: &str, id: u32) -> Option<StoryDraft> {
    let value = robust_json(text)?;
    let mut draft: StoryDraft = serde_json::from_value(value).ok()?;
    draft.id = id;
    Some(draft)
}

fn parse_batch_prompts(text: &str) -> HashMap<u32, String> {
    let mut out = HashMap::new();
    let Some(value) = robust_json(text) else {
        warn!("Batch video prompt response unparsable");
        return out;
    };
    let Some(items) = value.get("prompts").and_then(|v| v.as_array()) else {
        warn!("Batch video prompt response missing prompts array");
        return out;
    };
    for item in items {
        let Some(cut_number) = item.get("cutNumber").and_then(|v| v.as_u64()) else {
            continue;
        };
        let Some(prompt) = item.get("videoPrompt").and_then(|v| v.as_str()) else {
            continue;
        };
        out.insert(cut_number as u32, prompt.to_string());
    }
    out
}
