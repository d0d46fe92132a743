//! Prompt templates.
//!
//! Every LLM call in the system goes through one of these templates.
//! Templates use `{{name}}` placeholders and can be replaced wholesale
//! through configuration overrides.

use std::collections::HashMap;

/// The full set of prompt templates used by the pipelines.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Whole-story planning call, one per project.
    pub blueprint: String,
    /// Per-chunk cut generation.
    pub chunk_generation: String,
    /// Story draft authoring.
    pub draft_generation: String,
    /// Title suggestions for a chosen draft.
    pub title_generation: String,
    /// Single-cut regeneration with neighbor context.
    pub cut_regeneration: String,
    /// User-pasted script to cut-list conversion.
    pub script_parse: String,
    /// Video-direction prompt for one rendered cut.
    pub video_prompt: String,
    /// Batch video-direction prompts over a whole cut list.
    pub video_prompt_batch: String,
    /// Positive render prompt scaffold.
    pub positive_template: String,
    /// Negative render prompt.
    pub negative_prompt: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            blueprint: "\
You are a story planner for a visual production. Story: \"{{title}}\". \
Summary: {{summary}}. The story is told in {{total_cuts}} cuts split into \
{{chunk_count}} chunks of up to {{chunk_size}} cuts. Produce a JSON array of \
chunk guides, one per chunk, each with keys chunkIndex, startCut, endCut, \
pacing, guide, context, transition. The guides together must cover the whole \
arc with no repeated beats. Respond with JSON only."
                .to_string(),
            chunk_generation: "\
You write scene lists for a visual story titled \"{{title}}\". Protagonist \
tag: \"{{character_tag}}\" (use this exact tag in every cut). Generate cuts \
{{start_cut}} through {{end_cut}}. Pacing: {{pacing}}. Guide: {{guide}}. \
Scene context at start: {{context}}. Hand off to the next chunk with: \
{{transition}}. Respond with a JSON array of cut objects with keys cutNumber, \
description, imagePrompt, characterTag, emotionLevel, cameraAngle, \
lightingCondition, weatherAtmosphere, physicsDetail, sfxGuide, \
transitionHint. JSON only."
                .to_string(),
            draft_generation: "\
Invent one original short-form story premise for the concept \"{{concept}}\". \
Avoid these already-used premises: {{used_summaries}}. Respond with a JSON \
object with keys id, title, summary, theme. JSON only."
                .to_string(),
            title_generation: "\
Suggest 5 alternative titles for this story premise: {{summary}}. Respond \
with a JSON array of objects with keys title, style, hook. JSON only."
                .to_string(),
            cut_regeneration: "\
Rewrite cut {{cut_number}} of the story \"{{title}}\". Previous cut: \
{{prev_description}}. Next cut: {{next_description}}. Protagonist tag: \
\"{{character_tag}}\". Target emotion level between {{emotion_min}} and \
{{emotion_max}}. Respond with a single JSON cut object with keys cutNumber, \
description, imagePrompt, characterTag, emotionLevel, cameraAngle, \
lightingCondition, weatherAtmosphere, physicsDetail, sfxGuide, \
transitionHint. JSON only."
                .to_string(),
            script_parse: "\
Split this script into {{total_cuts}} visual scenes. Protagonist tag: \
\"{{character_tag}}\" (use this exact tag in every cut). Script: \
{{script}}. Respond with a JSON array of cut objects with keys cutNumber, \
description, imagePrompt, characterTag, emotionLevel, cameraAngle, \
lightingCondition, weatherAtmosphere, physicsDetail, sfxGuide, \
transitionHint. JSON only."
                .to_string(),
            video_prompt: "\
Write one camera-direction prompt for animating this still frame. Scene: \
{{description}}. Physics: {{physics}}. Sound: {{sfx}}. One paragraph, \
present tense, no preamble."
                .to_string(),
            video_prompt_batch: "\
Write one camera-direction prompt per scene for animating still frames. \
Scenes: {{scenes}}. Respond with a JSON object {\"prompts\": [{\"cutNumber\": \
n, \"videoPrompt\": \"...\"}]}. JSON only."
                .to_string(),
            positive_template: "photorealistic, 8K UHD, cinematic lighting, {{scene}}".to_string(),
            negative_prompt:
                "bad quality, blurry, watermark, text, extra limbs, deformed".to_string(),
        }
    }
}

impl PromptSet {
    /// Replace templates named in the override map. Unknown names are
    /// ignored.
    pub fn apply_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        for (name, template) in overrides {
            match name.as_str() {
                "blueprint" => self.blueprint = template.clone(),
                "chunk_generation" => self.chunk_generation = template.clone(),
                "draft_generation" => self.draft_generation = template.clone(),
                "title_generation" => self.title_generation = template.clone(),
                "cut_regeneration" => self.cut_regeneration = template.clone(),
                "script_parse" => self.script_parse = template.clone(),
                "video_prompt" => self.video_prompt = template.clone(),
                "video_prompt_batch" => self.video_prompt_batch = template.clone(),
                "positive_template" => self.positive_template = template.clone(),
                "negative_prompt" => self.negative_prompt = template.clone(),
                _ => {}
            }
        }
        self
    }
}

/// Substitute `{{name}}` placeholders. Placeholders without a binding are
/// left in place.
pub fn render(template: &str, bindings: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in bindings {
        out = out.replace(&format!("{{{{{name}}}}}"), value);
    }
    out
}
