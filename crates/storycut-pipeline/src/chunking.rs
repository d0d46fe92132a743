//! Content chunking pipeline.
//!
//! One planning call produces per-chunk guides; chunks then generate in
//! parallel and reassemble into a single ordered cut list. Continuity is
//! carried by the guides, not by sequencing the chunk calls.

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use storycut_llm::{robust_json, LlmClient};
use storycut_models::{ChunkGuide, Cut};

use crate::error::{PipelineError, PipelineResult};
use crate::progress::ProgressSender;
use crate::prompts::{render, PromptSet};

const CHUNK_ATTEMPTS: u32 = 3;

/// Inputs for one chunking run.
#[derive(Debug, Clone)]
pub struct ChunkingRequest {
    pub title: String,
    pub summary: String,
    pub total_cuts: u32,
    pub chunk_size: u32,
    /// Canonical protagonist tag stamped onto every generated cut.
    pub character_tag: String,
}

/// Result of a chunking run, also carried by the terminal progress event.
#[derive(Debug, Clone)]
pub struct ChunkingOutcome {
    /// Ordered, contiguous cut list covering 1..=total_cuts.
    pub cuts: Vec<Cut>,
    /// Numbered plain-text rendition of the cut descriptions.
    pub transcript: String,
}

/// Split a total cut count into inclusive chunk ranges.
pub fn chunk_ranges(total_cuts: u32, chunk_size: u32) -> Vec<(u32, u32)> {
    if total_cuts == 0 || chunk_size == 0 {
        return Vec::new();
    }
    let mut ranges = Vec::new();
    let mut start = 1;
    while start <= total_cuts {
        let end = (start + chunk_size - 1).min(total_cuts);
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

/// Outcome of one chunk task. Degradation is tagged explicitly so the
/// caller can never mistake an empty contribution for a full one.
enum ChunkYield {
    Full(Vec<Cut>),
    Degraded(String),
}

/// The chunking pipeline itself.
pub struct ChunkingPipeline {
    llm: Arc<LlmClient>,
    prompts: PromptSet,
}

impl ChunkingPipeline {
    pub fn new(llm: Arc<LlmClient>, prompts: PromptSet) -> Self {
        Self { llm, prompts }
    }

    /// Run the full pipeline. Emits progress throughout and exactly one
    /// terminal event; returns the assembled outcome on success.
    pub async fn run(
        &self,
        request: ChunkingRequest,
        progress: &ProgressSender,
    ) -> PipelineResult<ChunkingOutcome> {
        match self.run_inner(&request, progress).await {
            Ok(outcome) => {
                progress.complete(
                    outcome.cuts.clone(),
                    request.character_tag.clone(),
                    outcome.transcript.clone(),
                );
                Ok(outcome)
            }
            Err(err) => {
                progress.error(err.to_string());
                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        request: &ChunkingRequest,
        progress: &ProgressSender,
    ) -> PipelineResult<ChunkingOutcome> {
        let ranges = chunk_ranges(request.total_cuts, request.chunk_size);
        if ranges.is_empty() {
            return Err(PipelineError::NoCuts);
        }

        progress.delta(format!(
            "Planning \"{}\" across {} chunks...\n",
            request.title,
            ranges.len()
        ));
        let guides = self.blueprint(request, &ranges).await?;

        let mut tasks: JoinSet<(u32, ChunkYield)> = JoinSet::new();
        for guide in guides {
            let llm = Arc::clone(&self.llm);
            let prompts = self.prompts.clone();
            let title = request.title.clone();
            let character_tag = request.character_tag.clone();
            tasks.spawn(async move {
                let result = generate_chunk(&llm, &prompts, &title, &character_tag, &guide).await;
                (guide.chunk_index, result)
            });
        }

        let mut cuts: Vec<Cut> = Vec::with_capacity(request.total_cuts as usize);
        while let Some(joined) = tasks.join_next().await {
            let (chunk_index, result) = joined.map_err(|err| {
                PipelineError::config(format!("Chunk task panicked: {err}"))
            })?;
            match result {
                ChunkYield::Full(chunk_cuts) => {
                    progress.delta(format!(
                        "Chunk {} finished with {} cuts\n",
                        chunk_index + 1,
                        chunk_cuts.len()
                    ));
                    progress.chunk_completed(chunk_index, chunk_cuts.len() as u32);
                    cuts.extend(chunk_cuts);
                }
                // A dead chunk contributes nothing; its siblings stand.
                ChunkYield::Degraded(reason) => {
                    warn!(chunk = chunk_index, %reason, "Chunk contributed no cuts");
                    progress.delta(format!(
                        "Chunk {} produced no usable cuts ({})\n",
                        chunk_index + 1,
                        reason
                    ));
                }
            }
        }

        // Chunks complete in arbitrary order; position is restored here.
        cuts.sort_by_key(|c| c.cut_number);
        if cuts.is_empty() {
            return Err(PipelineError::NoCuts);
        }

        let transcript = cuts
            .iter()
            .map(|c| format!("{}. {}", c.cut_number, c.description))
            .collect::<Vec<_>>()
            .join("\n");

        info!(cuts = cuts.len(), "Chunking pipeline finished");
        Ok(ChunkingOutcome { cuts, transcript })
    }

    /// Planning call. A transport failure is fatal; an unparsable response
    /// degrades to generic guides over the same ranges.
    async fn blueprint(
        &self,
        request: &ChunkingRequest,
        ranges: &[(u32, u32)],
    ) -> PipelineResult<Vec<ChunkGuide>> {
        let user = render(
            &self.prompts.blueprint,
            &[
                ("title", &request.title),
                ("summary", &request.summary),
                ("total_cuts", &request.total_cuts.to_string()),
                ("chunk_count", &ranges.len().to_string()),
                ("chunk_size", &request.chunk_size.to_string()),
            ],
        );
        let text = self
            .llm
            .complete_json("You are a story planner. Respond with JSON only.", &user)
            .await?;

        match parse_guides(&text, ranges) {
            Some(guides) => Ok(guides),
            None => {
                warn!("Blueprint response unparsable; using generic chunk guides");
                Ok(ranges
                    .iter()
                    .enumerate()
                    .map(|(i, &(start, end))| ChunkGuide::generic(i as u32, start, end))
                    .collect())
            }
        }
    }
}

/// Decode blueprint output into guides aligned with the planned ranges.
/// Accepts a bare array or an object keyed "chunks"/"guides". The planned
/// ranges always win over whatever the model claimed.
fn parse_guides(text: &str, ranges: &[(u32, u32)]) -> Option<Vec<ChunkGuide>> {
    let value = robust_json(text)?;
    let items = match &value {
        serde_json::Value::Array(items) => items.clone(),
        serde_json::Value::Object(map) => map
            .get("chunks")
            .or_else(|| map.get("guides"))?
            .as_array()?
            .clone(),
        _ => return None,
    };

    let mut guides = Vec::with_capacity(ranges.len());
    for (i, &(start, end)) in ranges.iter().enumerate() {
        let guide = match items.get(i) {
            Some(item) => match serde_json::from_value::<ChunkGuide>(item.clone()) {
                Ok(mut guide) => {
                    guide.chunk_index = i as u32;
                    guide.start_cut = start;
                    guide.end_cut = end;
                    guide
                }
                Err(_) => ChunkGuide::generic(i as u32, start, end),
            },
            None => ChunkGuide::generic(i as u32, start, end),
        };
        guides.push(guide);
    }
    Some(guides)
}

/// Generate and normalize the cuts for one chunk, retrying on unusable
/// output. Failure at this granularity is never fatal to the run.
async fn generate_chunk(
    llm: &LlmClient,
    prompts: &PromptSet,
    title: &str,
    character_tag: &str,
    guide: &ChunkGuide,
) -> ChunkYield {
    let user = render(
        &prompts.chunk_generation,
        &[
            ("title", title),
            ("character_tag", character_tag),
            ("start_cut", &guide.start_cut.to_string()),
            ("end_cut", &guide.end_cut.to_string()),
            ("pacing", &guide.pacing),
            ("guide", &guide.guide),
            ("context", &guide.context),
            ("transition", &guide.transition),
        ],
    );

    let mut last_reason = String::new();
    for attempt in 1..=CHUNK_ATTEMPTS {
        let text = match llm
            .complete_json("You write scene lists. Respond with JSON only.", &user)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    chunk = guide.chunk_index,
                    attempt, error = %err, "Chunk generation call failed"
                );
                last_reason = err.to_string();
                continue;
            }
        };

        match parse_cuts(&text) {
            Some(raw) if !raw.is_empty() => {
                let cuts = normalize_cuts(raw, guide, character_tag);
                if cuts.iter().any(|c| !c.description.is_empty()) {
                    return ChunkYield::Full(cuts);
                }
                warn!(
                    chunk = guide.chunk_index,
                    attempt, "Chunk output had only empty descriptions; retrying"
                );
                last_reason = "only empty descriptions".to_string();
            }
            _ => {
                warn!(
                    chunk = guide.chunk_index,
                    attempt, "Chunk output unparsable; retrying"
                );
                last_reason = "unparsable output".to_string();
            }
        }
    }

    ChunkYield::Degraded(format!(
        "no usable cuts after {} attempts: {}",
        CHUNK_ATTEMPTS, last_reason
    ))
}

/// Decode generated text into cuts. Accepts a bare array or an object
/// keyed `cuts`.
pub(crate) fn parse_cuts(text: &str) -> Option<Vec<Cut>> {
    let value = robust_json(text)?;
    let items = match &value {
        serde_json::Value::Array(items) => items.clone(),
        serde_json::Value::Object(map) => map.get("cuts")?.as_array()?.clone(),
        _ => return None,
    };
    let cuts = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<Cut>(item).ok())
        .collect::<Vec<_>>();
    if cuts.is_empty() {
        None
    } else {
        Some(cuts)
    }
}

/// Stamp authoritative positions and the canonical tag, and clamp the chunk
/// to its planned range.
fn normalize_cuts(mut cuts: Vec<Cut>, guide: &ChunkGuide, character_tag: &str) -> Vec<Cut> {
    let expected = (guide.end_cut - guide.start_cut + 1) as usize;
    cuts.truncate(expected);
    for (i, cut) in cuts.iter_mut().enumerate() {
        cut.cut_number = guide.start_cut + i as u32;
        cut.character_tag = character_tag.to_string();
    }
    cuts
}
