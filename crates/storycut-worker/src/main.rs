//! Generation worker binary.
//!
//! Reads a run request from a JSON file, drives the chunking pipeline and
//! the render orchestrator, and writes progress events to stdout as JSON
//! lines. First Ctrl-C finishes the current cut and finalizes; second
//! Ctrl-C stops outright.

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storycut_comfy::ComfyClient;
use storycut_llm::LlmClient;
use storycut_models::{GenerationJob, ProgressEvent, RunControl, RunState};
use storycut_pipeline::{
    ChunkingPipeline, ChunkingRequest, ProgressSender, PromptSet, StudioConfig,
};

mod request;

use request::RunRequest;

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("storycut=info".parse().unwrap())
        .add_directive("hyper=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting storycut-worker");

    let Some(request_path) = std::env::args().nth(1) else {
        error!("Usage: storycut-worker <request.json>");
        std::process::exit(2);
    };

    let request = match RunRequest::load(&request_path).await {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to load run request: {}", e);
            std::process::exit(2);
        }
    };

    let config = StudioConfig::from_env();
    let prompts = PromptSet::default().apply_overrides(&config.prompt_overrides);

    let llm = match LlmClient::from_env() {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("LLM unavailable ({}); rendering without prompts", e);
            None
        }
    };

    let control = RunControl::new();
    install_signal_handler(control.clone());

    let (progress, mut events) = ProgressSender::channel();
    let printer = tokio::spawn(async move {
        let mut failed = false;
        while let Some(event) = events.recv().await {
            if matches!(event, ProgressEvent::Error { .. }) {
                failed = true;
            }
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize progress event: {}", e),
            }
        }
        failed
    });

    let result = run(request, config, prompts, llm, control, &progress).await;
    drop(progress);
    let saw_error = printer.await.unwrap_or(true);

    match result {
        Ok(()) if !saw_error => info!("Worker finished"),
        Ok(()) => std::process::exit(1),
        Err(e) => {
            error!("Run failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(
    request: RunRequest,
    config: StudioConfig,
    prompts: PromptSet,
    llm: Option<Arc<LlmClient>>,
    control: RunControl,
    progress: &ProgressSender,
) -> anyhow::Result<()> {
    let cuts = match request.cuts.clone() {
        Some(cuts) if !cuts.is_empty() => cuts,
        _ => {
            let Some(llm) = llm.clone() else {
                anyhow::bail!("An LLM credential is required to generate cuts");
            };
            let pipeline = ChunkingPipeline::new(llm, prompts.clone());
            let outcome = pipeline
                .run(
                    ChunkingRequest {
                        title: request.title.clone(),
                        summary: request.summary.clone().unwrap_or_default(),
                        total_cuts: request.total_cuts,
                        chunk_size: config.chunk_size,
                        character_tag: request.character_tag.clone(),
                    },
                    progress,
                )
                .await?;
            outcome.cuts
        }
    };

    if request.skip_render {
        info!("Render skipped by request");
        return Ok(());
    }

    let mut job = GenerationJob::new(&request.title, request.mode(), cuts);
    job.character_prompt = request.character_prompt.clone();
    job.reference_image = request.reference_image.clone();

    let comfy = Arc::new(ComfyClient::new(&config.comfy_host, config.comfy_port));
    let orchestrator =
        storycut_pipeline::RenderOrchestrator::new(config, prompts, comfy, llm);
    orchestrator.run(job, control, progress).await?;
    Ok(())
}

/// First Ctrl-C requests an early finish, the second a hard stop.
fn install_signal_handler(control: RunControl) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("Finish-early requested; current cut will complete");
        control.set(RunState::FinishEarly);

        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("Stop requested");
        control.set(RunState::Stopped);
    });
}
