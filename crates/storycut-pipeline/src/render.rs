//! Render job orchestrator.
//!
//! Drives a whole generation run: pre-flight against the backend, model
//! resolution, then one render per cut in order, with an overlapped
//! video-prompt task per cut and optional reference chaining. The run
//! responds to its control handle between cuts and while waiting on the
//! backend.

use base64::Engine;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use storycut_comfy::{
    inventory, is_reachable, select_adapter, select_checkpoint, AdapterChoice, AssetRef,
    CheckpointChoice, ComfyClient, ReferenceInput, RenderGraph,
};
use storycut_llm::LlmClient;
use storycut_models::{
    clean_string, Cut, GenerationJob, ProjectMetadata, RunControl, RunState, VisualMode,
};

use crate::config::StudioConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::progress::ProgressSender;
use crate::prompts::{render, PromptSet};
use crate::store::{ProjectHandle, ProjectStore};

enum PollOutcome {
    Ready(AssetRef),
    TimedOut,
    Stopped,
}

/// Orchestrates one render run end to end.
pub struct RenderOrchestrator {
    config: StudioConfig,
    prompts: PromptSet,
    comfy: Arc<ComfyClient>,
    /// Absent when no LLM credential is configured; rendering still works,
    /// cuts just go without video prompts.
    llm: Option<Arc<LlmClient>>,
    store: ProjectStore,
}

impl RenderOrchestrator {
    pub fn new(
        config: StudioConfig,
        prompts: PromptSet,
        comfy: Arc<ComfyClient>,
        llm: Option<Arc<LlmClient>>,
    ) -> Self {
        let store = ProjectStore::new(config.outputs_dir.clone());
        Self {
            config,
            prompts,
            comfy,
            llm,
            store,
        }
    }

    /// Run a generation job. Returns `Ok(None)` when the run was stopped by
    /// its control handle before finalizing; otherwise the written project
    /// metadata.
    ///
    /// Every fatal exit emits exactly one `Error` event and returns the
    /// control handle to idle; the inner body is free to `?` out of any
    /// step.
    pub async fn run(
        &self,
        job: GenerationJob,
        control: RunControl,
        progress: &ProgressSender,
    ) -> PipelineResult<Option<ProjectMetadata>> {
        match self.run_inner(job, control.clone(), progress).await {
            Ok(result) => Ok(result),
            Err(err) => {
                progress.error(err.to_string());
                control.reset();
                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        mut job: GenerationJob,
        control: RunControl,
        progress: &ProgressSender,
    ) -> PipelineResult<Option<ProjectMetadata>> {
        if job.cuts.is_empty() {
            return Err(PipelineError::NoCuts);
        }

        if !is_reachable(&self.config.comfy_host, self.config.comfy_port).await {
            return Err(PipelineError::backend_unreachable(format!(
                "{}:{}",
                self.config.comfy_host, self.config.comfy_port
            )));
        }

        control.set(RunState::Running);
        let project = self.store.create(&job.title).await?;
        progress.log(format!("Project folder: {}", project.folder_name()));

        let checkpoint = self.resolve_checkpoint(progress).await;
        let (adapter, mut reference) = self.resolve_reference(&job, progress).await;

        let total = job.cuts.len();
        let mut stopped = false;

        for idx in 0..total {
            match control.get() {
                RunState::Stopped => {
                    stopped = true;
                    break;
                }
                RunState::FinishEarly => {
                    progress.log("Finishing early; skipping remaining cuts");
                    break;
                }
                _ => {}
            }

            // Position is authoritative regardless of what generation
            // claimed.
            job.cuts[idx].cut_number = idx as u32 + 1;
            let cut_number = job.cuts[idx].cut_number;
            progress.log_for_cut(
                format!("Rendering cut {}/{}", cut_number, total),
                cut_number,
            );

            let positive = self.resolve_prompt(&job.cuts[idx], &job.character_prompt);
            let video_task = self.spawn_video_prompt(&job.cuts[idx]);

            let seed = rand::random::<u32>() as u64;
            let (width, height) = job.mode.resolution();
            let mut graph = RenderGraph::new(&checkpoint, &positive)
                .with_negative_prompt(&self.prompts.negative_prompt)
                .with_seed(seed)
                .with_resolution(width, height)
                .with_sampler(
                    self.config.steps,
                    self.config.cfg,
                    &self.config.sampler_name,
                    &self.config.scheduler,
                )
                .with_filename_prefix(format!("storycut_{}", project.folder_name()));
            if let (Some(adapter_name), Some(ref_filename)) = (&adapter, &reference) {
                graph = graph.with_reference(ReferenceInput {
                    image_filename: ref_filename.clone(),
                    adapter: adapter_name.clone(),
                    weight: self.config.reference_weight,
                });
            }

            match self.comfy.queue_prompt(&graph).await {
                Ok(prompt_id) => {
                    match self.poll_for_asset(&prompt_id, &control).await {
                        PollOutcome::Ready(asset) => {
                            match self
                                .save_rendered(&project, idx, seed, &asset, progress)
                                .await
                            {
                                Ok((filename, bytes)) => {
                                    job.cuts[idx].filename = filename;
                                    if self.config.use_reference_chaining {
                                        reference = self
                                            .chain_reference(&project, cut_number, &bytes)
                                            .await
                                            .or(reference);
                                    }
                                }
                                Err(err) => {
                                    warn!(cut = cut_number, error = %err, "Failed to save rendered asset");
                                    progress.log_for_cut(
                                        format!("Cut {} could not be saved, skipping", cut_number),
                                        cut_number,
                                    );
                                }
                            }
                            self.comfy.free_memory().await.ok();
                        }
                        PollOutcome::TimedOut => {
                            warn!(cut = cut_number, "Render wait elapsed with no output");
                            progress.log_for_cut(
                                format!("Cut {} timed out, skipping", cut_number),
                                cut_number,
                            );
                        }
                        PollOutcome::Stopped => {
                            stopped = true;
                        }
                    }
                }
                Err(err) => {
                    warn!(cut = cut_number, error = %err, "Backend rejected render job");
                    progress.log_for_cut(
                        format!("Cut {} was rejected by the backend, skipping", cut_number),
                        cut_number,
                    );
                }
            }

            if let Some(task) = video_task {
                if let Ok(Some(prompt)) = task.await {
                    project
                        .save_sidecar(&format!("cut_{:03}_video.txt", idx), &prompt)
                        .await
                        .ok();
                    job.cuts[idx].video_prompt = Some(prompt);
                }
            }

            if stopped {
                break;
            }
        }

        if stopped {
            progress.log("Generation stopped by request");
            progress.error("Generation stopped");
            control.reset();
            return Ok(None);
        }

        let metadata = self.finalize(&job, &project).await?;
        progress.done(metadata.clone());
        control.reset();
        Ok(Some(metadata))
    }

    /// Render a standalone character reference image and save it under the
    /// outputs root. The returned path is suitable as a job's
    /// `reference_image`.
    pub async fn generate_reference_image(
        &self,
        character_prompt: &str,
        mode: VisualMode,
        progress: &ProgressSender,
    ) -> PipelineResult<PathBuf> {
        if !is_reachable(&self.config.comfy_host, self.config.comfy_port).await {
            return Err(PipelineError::backend_unreachable(format!(
                "{}:{}",
                self.config.comfy_host, self.config.comfy_port
            )));
        }

        let checkpoint = self.resolve_checkpoint(progress).await;
        let positive = render(
            &self.prompts.positive_template,
            &[("scene", &clean_string(character_prompt))],
        );
        let seed = rand::random::<u32>() as u64;
        let (width, height) = mode.resolution();
        let graph = RenderGraph::new(&checkpoint, &positive)
            .with_negative_prompt(&self.prompts.negative_prompt)
            .with_seed(seed)
            .with_resolution(width, height)
            .with_sampler(
                self.config.steps,
                self.config.cfg,
                &self.config.sampler_name,
                &self.config.scheduler,
            )
            .with_filename_prefix("storycut_reference");

        progress.log("Rendering character reference image");
        let prompt_id = self.comfy.queue_prompt(&graph).await?;
        let asset = match self.poll_for_asset(&prompt_id, &RunControl::new()).await {
            PollOutcome::Ready(asset) => asset,
            PollOutcome::TimedOut | PollOutcome::Stopped => {
                return Err(PipelineError::RenderTimeout)
            }
        };

        let bytes = self.comfy.fetch_asset(&asset).await?;
        tokio::fs::create_dir_all(&self.config.outputs_dir).await?;
        let path = self
            .config
            .outputs_dir
            .join(format!("reference_{}.png", seed));
        tokio::fs::write(&path, &bytes).await?;
        self.comfy.free_memory().await.ok();

        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        progress.preview(format!("data:image/png;base64,{encoded}"), 0);
        progress.log("Character reference image ready");
        info!(path = %path.display(), "Saved reference image");
        Ok(path)
    }

    /// Pick the checkpoint actually sent to the backend. A missing
    /// configured model falls back to the first available one with a single
    /// warning; an empty inventory keeps the configured name unverified.
    async fn resolve_checkpoint(&self, progress: &ProgressSender) -> String {
        let available = inventory::list_checkpoints(
            &self.comfy,
            self.config.comfy_install_path.as_deref(),
        )
        .await;
        match select_checkpoint(&self.config.selected_checkpoint, &available) {
            CheckpointChoice::Configured => self.config.selected_checkpoint.clone(),
            CheckpointChoice::Fallback(fallback) => {
                warn!(
                    configured = %self.config.selected_checkpoint,
                    fallback = %fallback,
                    "Configured checkpoint not installed; falling back"
                );
                progress.log(format!(
                    "Checkpoint {} not found, using {}",
                    self.config.selected_checkpoint, fallback
                ));
                fallback
            }
            CheckpointChoice::Unverified => self.config.selected_checkpoint.clone(),
        }
    }

    /// Resolve the reference adapter and stage the job's reference image
    /// into the backend's input directory. Returns `(adapter, reference
    /// filename)`, either of which may be absent.
    async fn resolve_reference(
        &self,
        job: &GenerationJob,
        progress: &ProgressSender,
    ) -> (Option<String>, Option<String>) {
        if !self.config.use_reference_image
            || (job.reference_image.is_none() && !self.config.use_reference_chaining)
        {
            return (None, None);
        }

        let available = inventory::list_adapters(&self.comfy).await;
        let adapter = match select_adapter(&self.config.selected_adapter, &available) {
            AdapterChoice::Configured => Some(self.config.selected_adapter.clone()),
            AdapterChoice::Substitute(substitute) => {
                warn!(
                    configured = %self.config.selected_adapter,
                    substitute = %substitute,
                    "Configured reference adapter not installed; substituting"
                );
                progress.log(format!(
                    "Reference adapter {} not found, using {}",
                    self.config.selected_adapter, substitute
                ));
                Some(substitute)
            }
            AdapterChoice::Unavailable => {
                progress.log("No reference adapter installed; rendering without references");
                None
            }
        };
        if adapter.is_none() {
            return (None, None);
        }

        let reference = match &job.reference_image {
            Some(source) => self.stage_reference(source).await,
            None => None,
        };
        (adapter, reference)
    }

    /// Copy a caller-supplied reference image into the backend's input
    /// directory and return its bare filename.
    async fn stage_reference(&self, source: &str) -> Option<String> {
        let input_dir = self.input_dir()?;
        let source_path = PathBuf::from(source);
        let filename = source_path.file_name()?.to_string_lossy().into_owned();
        let destination = input_dir.join(&filename);
        match tokio::fs::copy(&source_path, &destination).await {
            Ok(_) => Some(filename),
            Err(err) => {
                warn!(source, error = %err, "Failed to stage reference image");
                None
            }
        }
    }

    fn input_dir(&self) -> Option<PathBuf> {
        let install = self.config.comfy_install_path.as_deref()?;
        let dir = inventory::input_dir(install);
        if dir.is_none() {
            warn!("Backend input directory not found; references disabled");
        }
        dir
    }

    /// Synthesize the positive render prompt for a cut. An authored image
    /// prompt wins; otherwise the structured fields are folded into the
    /// positive template.
    fn resolve_prompt(&self, cut: &Cut, character_prompt: &str) -> String {
        if let Some(authored) = &cut.image_prompt {
            let cleaned = clean_string(authored);
            if !cleaned.is_empty() {
                return cleaned;
            }
        }

        let mut parts = vec![clean_string(&cut.description)];
        for field in [
            &cut.physics_detail,
            &cut.lighting_condition,
            &cut.weather_atmosphere,
            &cut.camera_angle,
        ] {
            if let Some(value) = field {
                let cleaned = clean_string(value);
                if !cleaned.is_empty() {
                    parts.push(cleaned);
                }
            }
        }
        if !character_prompt.is_empty() {
            parts.push(clean_string(character_prompt));
        }
        let scene = parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        render(&self.prompts.positive_template, &[("scene", &scene)])
    }

    /// Kick off the per-cut video-prompt call so it overlaps the render
    /// wait.
    fn spawn_video_prompt(&self, cut: &Cut) -> Option<JoinHandle<Option<String>>> {
        let llm = self.llm.as_ref().map(Arc::clone)?;
        let user = render(
            &self.prompts.video_prompt,
            &[
                ("description", &clean_string(&cut.description)),
                ("physics", cut.physics_detail.as_deref().unwrap_or("")),
                ("sfx", cut.sfx_guide.as_deref().unwrap_or("")),
            ],
        );
        Some(tokio::spawn(async move {
            match llm
                .complete("You write camera-direction prompts.", &user)
                .await
            {
                Ok(text) => {
                    let cleaned = clean_string(&text);
                    if cleaned.is_empty() {
                        None
                    } else {
                        Some(cleaned)
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Video prompt generation failed");
                    None
                }
            }
        }))
    }

    /// Poll the backend for a finished output, bounded by the render wait,
    /// honoring a stop request between polls.
    async fn poll_for_asset(&self, prompt_id: &str, control: &RunControl) -> PollOutcome {
        let deadline = tokio::time::Instant::now() + self.config.render_wait;
        loop {
            if control.get() == RunState::Stopped {
                return PollOutcome::Stopped;
            }
            if tokio::time::Instant::now() >= deadline {
                return PollOutcome::TimedOut;
            }
            match self.comfy.poll_output(prompt_id).await {
                Ok(Some(asset)) => return PollOutcome::Ready(asset),
                Ok(None) => {}
                Err(err) => {
                    warn!(prompt_id, error = %err, "Status poll failed");
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Download a finished render, persist it, and emit a preview.
    async fn save_rendered(
        &self,
        project: &ProjectHandle,
        idx: usize,
        seed: u64,
        asset: &AssetRef,
        progress: &ProgressSender,
    ) -> PipelineResult<(String, Vec<u8>)> {
        let bytes = self.comfy.fetch_asset(asset).await?;
        let filename = format!("cut_{:03}_{}.png", idx, seed);
        project.save_asset(&filename, &bytes).await?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let cut_number = idx as u32 + 1;
        progress.preview(format!("data:image/png;base64,{encoded}"), cut_number);
        progress.log_for_cut(format!("Cut {} rendered", cut_number), cut_number);
        info!(cut = cut_number, %filename, "Saved rendered cut");
        Ok((filename, bytes))
    }

    /// Persist a just-rendered cut into the backend's input directory so
    /// the next cut can reference it.
    async fn chain_reference(
        &self,
        project: &ProjectHandle,
        cut_number: u32,
        bytes: &[u8],
    ) -> Option<String> {
        let input_dir = self.input_dir()?;
        let filename = format!("chain_ref_{}_{}.png", project.folder_name(), cut_number);
        match tokio::fs::write(input_dir.join(&filename), bytes).await {
            Ok(()) => Some(filename),
            Err(err) => {
                warn!(cut = cut_number, error = %err, "Failed to write chain reference");
                None
            }
        }
    }

    /// Write the project's metadata record. Runs for completed and
    /// finish-early runs alike; every cut appears whether it rendered or
    /// not.
    async fn finalize(
        &self,
        job: &GenerationJob,
        project: &ProjectHandle,
    ) -> PipelineResult<ProjectMetadata> {
        let (width, height) = job.mode.resolution();
        let created_at = project
            .folder_name()
            .split('_')
            .next()
            .unwrap_or_default()
            .to_string();
        let metadata = ProjectMetadata {
            title: job.title.clone(),
            mode: job.mode.as_str().to_string(),
            resolution: format!("{}x{}", width, height),
            cuts: job.cuts.len() as u32,
            created_at,
            cuts_data: job.cuts.clone(),
            folder_name: project.folder_name().to_string(),
            completed: true,
        };
        project.write_metadata(&metadata).await?;
        info!(
            folder = %metadata.folder_name,
            rendered = metadata.rendered_count(),
            total = metadata.cuts,
            "Finalized project"
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use storycut_models::{ProgressEvent, VisualMode};
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn orchestrator(config: StudioConfig) -> RenderOrchestrator {
        let comfy = Arc::new(ComfyClient::new(&config.comfy_host, config.comfy_port));
        RenderOrchestrator::new(config, PromptSet::default(), comfy, None)
    }

    fn sample_cut(description: &str) -> Cut {
        let mut cut = Cut::new(1);
        cut.description = description.to_string();
        cut
    }

    /// Backend mock plus a config pointed at it, with short waits and a
    /// temp outputs root.
    async fn mock_backend() -> (MockServer, StudioConfig, tempfile::TempDir) {
        let server = MockServer::start().await;
        let outputs = tempfile::tempdir().unwrap();
        let mut config = StudioConfig::default();
        config.comfy_port = server.address().port();
        config.outputs_dir = outputs.path().to_path_buf();
        config.render_wait = Duration::from_millis(300);
        config.poll_interval = Duration::from_millis(25);
        (server, config, outputs)
    }

    fn history_with_image() -> serde_json::Value {
        serde_json::json!({
            "p1": {
                "outputs": {
                    "7": {
                        "images": [
                            {"filename": "out_00001_.png", "subfolder": "", "type": "output"}
                        ]
                    }
                }
            }
        })
    }

    async fn mount_render_backend(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"prompt_id": "p1"})),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/view"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/free"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    async fn mount_checkpoints(server: &MockServer, names: &[&str]) {
        Mock::given(method("GET"))
            .and(path("/object_info/CheckpointLoaderSimple"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "CheckpointLoaderSimple": {
                    "input": {"required": {"ckpt_name": [names]}}
                }
            })))
            .mount(server)
            .await;
    }

    async fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_store_failure_emits_one_error_and_resets_control() {
        // A plain TCP listener satisfies the pre-flight probe; the project
        // store then fails because the outputs root sits under a file.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"x").await.unwrap();

        let mut config = StudioConfig::default();
        config.comfy_port = port;
        config.outputs_dir = blocker.join("outputs");
        let orch = orchestrator(config);
        let job = GenerationJob::new("t", VisualMode::LongForm, vec![sample_cut("scene")]);
        let (progress, mut rx) = ProgressSender::channel();
        let control = RunControl::new();

        let result = orch.run(job, control.clone(), &progress).await;
        assert!(matches!(result, Err(PipelineError::Io(_))));
        assert_eq!(control.get(), RunState::Idle);

        drop(progress);
        let errors = drain(&mut rx)
            .await
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Error { .. }))
            .count();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn test_stopped_run_persists_nothing() {
        let (server, config, _outputs) = mock_backend().await;
        mount_render_backend(&server).await;
        // History never reports an output, keeping the run in its poll loop.
        Mock::given(method("GET"))
            .and(path_regex("^/history/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let outputs_dir = config.outputs_dir.clone();
        let orch = orchestrator(config);
        let job = GenerationJob::new(
            "halted",
            VisualMode::LongForm,
            vec![sample_cut("one"), sample_cut("two")],
        );
        let (progress, mut rx) = ProgressSender::channel();
        let control = RunControl::new();

        let handle = {
            let control = control.clone();
            let orch = Arc::new(orch);
            tokio::spawn(async move { orch.run(job, control, &progress).await })
        };

        // Stop as soon as the first cut starts rendering.
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            if matches!(&event, ProgressEvent::Log { message, .. } if message.starts_with("Rendering cut")) {
                control.set(RunState::Stopped);
            }
            events.push(event);
        }

        let result = handle.await.unwrap();
        assert!(matches!(result, Ok(None)));
        assert_eq!(control.get(), RunState::Idle);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ProgressEvent::Error { .. }))
                .count(),
            1
        );
        assert!(!events.iter().any(|e| matches!(e, ProgressEvent::Done { .. })));
        // The project directory exists but holds no metadata, so the store
        // does not list it.
        let store = ProjectStore::new(outputs_dir);
        assert!(store.list_projects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_finish_early_persists_partial_metadata() {
        let (server, config, _outputs) = mock_backend().await;
        mount_render_backend(&server).await;
        // The first poll finds cut 1's output; every later poll finds
        // nothing, so cut 2 times out and cut 3 is skipped by the flag.
        Mock::given(method("GET"))
            .and(path_regex("^/history/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_with_image()))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex("^/history/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let outputs_dir = config.outputs_dir.clone();
        let orch = Arc::new(orchestrator(config));
        let job = GenerationJob::new(
            "partial",
            VisualMode::LongForm,
            vec![sample_cut("one"), sample_cut("two"), sample_cut("three")],
        );
        let (progress, mut rx) = ProgressSender::channel();
        let control = RunControl::new();

        let handle = {
            let control = control.clone();
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.run(job, control, &progress).await })
        };

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            if matches!(&event, ProgressEvent::Preview { .. }) {
                control.set(RunState::FinishEarly);
            }
            events.push(event);
        }

        let metadata = handle.await.unwrap().unwrap().expect("metadata written");
        assert!(metadata.completed);
        assert_eq!(metadata.cuts, 3);
        assert_eq!(metadata.rendered_count(), 1);
        assert_eq!(control.get(), RunState::Idle);
        assert!(events.iter().any(|e| matches!(e, ProgressEvent::Done { .. })));

        let store = ProjectStore::new(outputs_dir);
        let loaded = store.load_metadata(&metadata.folder_name).await.unwrap();
        assert_eq!(loaded.rendered_count(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_fallback_warns_with_both_names() {
        let (server, config, _outputs) = mock_backend().await;
        mount_render_backend(&server).await;
        mount_checkpoints(&server, &["other-model.safetensors"]).await;
        Mock::given(method("GET"))
            .and(path_regex("^/history/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let configured = config.selected_checkpoint.clone();
        let orch = orchestrator(config);
        let job = GenerationJob::new("fallback", VisualMode::LongForm, vec![sample_cut("scene")]);
        let (progress, mut rx) = ProgressSender::channel();

        let result = orch.run(job, RunControl::new(), &progress).await.unwrap();
        assert!(result.is_some());

        drop(progress);
        let events = drain(&mut rx).await;
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::Log { message, .. }
                if message.contains(&configured) && message.contains("other-model.safetensors")
        )));

        // The queued graph carries the fallback, not the configured name.
        let queued = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.url.path() == "/prompt")
            .expect("a render job was queued");
        let body = String::from_utf8(queued.body.clone()).unwrap();
        assert!(body.contains("other-model.safetensors"));
        assert!(!body.contains(&configured));
    }

    #[tokio::test]
    async fn test_reference_chaining_rewires_second_cut() {
        let (server, mut config, _outputs) = mock_backend().await;
        mount_render_backend(&server).await;
        mount_checkpoints(&server, &["RealVisXL_V5.0.safetensors"]).await;
        Mock::given(method("GET"))
            .and(path("/object_info/IPAdapterModelLoader"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "IPAdapterModelLoader": {
                    "input": {"required": {"ipadapter_file": [["ip-adapter-plus_sdxl_vit-h.safetensors"]]}}
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex("^/history/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_with_image()))
            .mount(&server)
            .await;

        let install = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(install.path().join("input"))
            .await
            .unwrap();
        config.use_reference_chaining = true;
        config.comfy_install_path = Some(install.path().to_path_buf());

        let orch = orchestrator(config);
        let job = GenerationJob::new(
            "chained",
            VisualMode::LongForm,
            vec![sample_cut("one"), sample_cut("two")],
        );
        let (progress, _rx) = ProgressSender::channel();

        let metadata = orch
            .run(job, RunControl::new(), &progress)
            .await
            .unwrap()
            .expect("metadata written");
        assert_eq!(metadata.rendered_count(), 2);

        let queued: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path() == "/prompt")
            .map(|r| String::from_utf8(r.body).unwrap())
            .collect();
        assert_eq!(queued.len(), 2);
        // Cut 1 renders unreferenced; cut 2 is rewired to cut 1's output.
        assert!(!queued[0].contains("IPAdapterAdvanced"));
        let chain_name = format!("chain_ref_{}_1.png", metadata.folder_name);
        assert!(queued[1].contains("IPAdapterAdvanced"));
        assert!(queued[1].contains(&chain_name));
        assert!(install.path().join("input").join(&chain_name).is_file());
    }

    #[tokio::test]
    async fn test_generate_reference_image_saves_under_outputs() {
        let (server, config, outputs) = mock_backend().await;
        mount_render_backend(&server).await;
        Mock::given(method("GET"))
            .and(path_regex("^/history/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_with_image()))
            .mount(&server)
            .await;

        let orch = orchestrator(config);
        let (progress, _rx) = ProgressSender::channel();
        let path = orch
            .generate_reference_image("grey wolf, yellow eyes", VisualMode::LongForm, &progress)
            .await
            .unwrap();
        assert!(path.starts_with(outputs.path()));
        assert!(path.is_file());

        let queued = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.url.path() == "/prompt")
            .expect("a render job was queued");
        let body = String::from_utf8(queued.body).unwrap();
        assert!(body.contains("grey wolf, yellow eyes"));
    }

    #[tokio::test]
    async fn test_generate_reference_image_unreachable_backend() {
        let mut config = StudioConfig::default();
        config.comfy_port = 1;
        let orch = orchestrator(config);
        let (progress, _rx) = ProgressSender::channel();
        let result = orch
            .generate_reference_image("wolf", VisualMode::LongForm, &progress)
            .await;
        assert!(matches!(result, Err(PipelineError::BackendUnreachable(_))));
    }

    #[test]
    fn test_authored_prompt_wins() {
        let orch = orchestrator(StudioConfig::default());
        let mut cut = sample_cut("the wolf crosses");
        cut.image_prompt = Some("  a wolf,\n mid-river  ".to_string());
        assert_eq!(orch.resolve_prompt(&cut, "grey wolf"), "a wolf, mid-river");
    }

    #[test]
    fn test_synthesized_prompt_folds_fields() {
        let orch = orchestrator(StudioConfig::default());
        let mut cut = sample_cut("the wolf crosses the river");
        cut.lighting_condition = Some("golden hour".to_string());
        cut.physics_detail = Some("water spray".to_string());

        let prompt = orch.resolve_prompt(&cut, "grey wolf, yellow eyes");
        assert!(prompt.starts_with("photorealistic, 8K UHD"));
        assert!(prompt.contains("the wolf crosses the river"));
        assert!(prompt.contains("water spray"));
        assert!(prompt.contains("golden hour"));
        assert!(prompt.contains("grey wolf, yellow eyes"));
    }

    #[test]
    fn test_empty_authored_prompt_falls_through() {
        let orch = orchestrator(StudioConfig::default());
        let mut cut = sample_cut("dawn over the valley");
        cut.image_prompt = Some("   \n ".to_string());
        let prompt = orch.resolve_prompt(&cut, "");
        assert!(prompt.contains("dawn over the valley"));
    }

    #[tokio::test]
    async fn test_empty_job_is_rejected() {
        let orch = orchestrator(StudioConfig::default());
        let job = GenerationJob::new("empty", VisualMode::LongForm, vec![]);
        let (progress, mut rx) = ProgressSender::channel();
        let control = RunControl::new();

        let result = orch.run(job, control, &progress).await;
        assert!(matches!(result, Err(PipelineError::NoCuts)));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails_preflight() {
        // Port 1 on localhost refuses connections.
        let mut config = StudioConfig::default();
        config.comfy_port = 1;
        let orch = orchestrator(config);
        let job = GenerationJob::new(
            "unreachable",
            VisualMode::LongForm,
            vec![sample_cut("scene")],
        );
        let (progress, mut rx) = ProgressSender::channel();
        let control = RunControl::new();

        let result = orch.run(job, control.clone(), &progress).await;
        assert!(matches!(result, Err(PipelineError::BackendUnreachable(_))));
        assert_eq!(control.get(), RunState::Idle);
        match rx.recv().await.unwrap() {
            ProgressEvent::Error { message, .. } => {
                assert!(message.contains("unreachable"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
