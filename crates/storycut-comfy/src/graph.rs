//! Typed render-graph builder.
//!
//! The backend consumes a flat node-id-to-descriptor map. Everything above
//! this module works with named slots; the flat representation is emitted
//! here, at the boundary only.

use serde_json::{json, Value};

// Stable node ids within the emitted graph.
const NODE_CHECKPOINT: &str = "1";
const NODE_POSITIVE: &str = "2";
const NODE_NEGATIVE: &str = "3";
const NODE_LATENT: &str = "4";
const NODE_SAMPLER: &str = "5";
const NODE_DECODE: &str = "6";
const NODE_SAVE: &str = "7";
const NODE_REF_IMAGE: &str = "10";
const NODE_ADAPTER_LOADER: &str = "11";
const NODE_ADAPTER_APPLY: &str = "12";

/// Visual-continuity reference wired ahead of the sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceInput {
    /// Image filename within the backend's input directory (bare name, not
    /// a path).
    pub image_filename: String,
    /// Adapter model to apply the reference with.
    pub adapter: String,
    /// Adapter strength.
    pub weight: f64,
}

/// Declarative render job with named slots.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderGraph {
    pub checkpoint: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub seed: u64,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg: f64,
    pub sampler_name: String,
    pub scheduler: String,
    pub filename_prefix: String,
    pub reference: Option<ReferenceInput>,
}

impl RenderGraph {
    /// Create a graph with default sampler parameters.
    pub fn new(checkpoint: impl Into<String>, positive_prompt: impl Into<String>) -> Self {
        Self {
            checkpoint: checkpoint.into(),
            positive_prompt: positive_prompt.into(),
            negative_prompt: "bad quality, blurry".to_string(),
            seed: 0,
            width: 1920,
            height: 1080,
            steps: 30,
            cfg: 7.5,
            sampler_name: "dpmpp_2m".to_string(),
            scheduler: "karras".to_string(),
            filename_prefix: "storycut".to_string(),
            reference: None,
        }
    }

    pub fn with_negative_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.negative_prompt = prompt.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_sampler(
        mut self,
        steps: u32,
        cfg: f64,
        sampler_name: impl Into<String>,
        scheduler: impl Into<String>,
    ) -> Self {
        self.steps = steps;
        self.cfg = cfg;
        self.sampler_name = sampler_name.into();
        self.scheduler = scheduler.into();
        self
    }

    pub fn with_filename_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filename_prefix = prefix.into();
        self
    }

    pub fn with_reference(mut self, reference: ReferenceInput) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Emit the backend's flat node map.
    pub fn to_prompt(&self) -> Value {
        // The sampler draws its model either from the checkpoint loader or,
        // when a reference is present, from the adapter node rewired in
        // front of it.
        let sampler_model = if self.reference.is_some() {
            json!([NODE_ADAPTER_APPLY, 0])
        } else {
            json!([NODE_CHECKPOINT, 0])
        };

        let mut prompt = json!({
            NODE_CHECKPOINT: {
                "class_type": "CheckpointLoaderSimple",
                "inputs": { "ckpt_name": self.checkpoint }
            },
            NODE_POSITIVE: {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": self.positive_prompt, "clip": [NODE_CHECKPOINT, 1] }
            },
            NODE_NEGATIVE: {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": self.negative_prompt, "clip": [NODE_CHECKPOINT, 1] }
            },
            NODE_LATENT: {
                "class_type": "EmptyLatentImage",
                "inputs": { "width": self.width, "height": self.height, "batch_size": 1 }
            },
            NODE_SAMPLER: {
                "class_type": "KSampler",
                "inputs": {
                    "seed": self.seed,
                    "steps": self.steps,
                    "cfg": self.cfg,
                    "sampler_name": self.sampler_name,
                    "scheduler": self.scheduler,
                    "denoise": 1.0,
                    "model": sampler_model,
                    "positive": [NODE_POSITIVE, 0],
                    "negative": [NODE_NEGATIVE, 0],
                    "latent_image": [NODE_LATENT, 0]
                }
            },
            NODE_DECODE: {
                "class_type": "VAEDecode",
                "inputs": { "samples": [NODE_SAMPLER, 0], "vae": [NODE_CHECKPOINT, 2] }
            },
            NODE_SAVE: {
                "class_type": "SaveImage",
                "inputs": { "images": [NODE_DECODE, 0], "filename_prefix": self.filename_prefix }
            },
        });

        if let Some(reference) = &self.reference {
            let map = prompt.as_object_mut().expect("prompt is an object");
            map.insert(
                NODE_REF_IMAGE.to_string(),
                json!({
                    "class_type": "LoadImage",
                    "inputs": { "image": reference.image_filename }
                }),
            );
            map.insert(
                NODE_ADAPTER_LOADER.to_string(),
                json!({
                    "class_type": "IPAdapterModelLoader",
                    "inputs": { "ipadapter_file": reference.adapter }
                }),
            );
            map.insert(
                NODE_ADAPTER_APPLY.to_string(),
                json!({
                    "class_type": "IPAdapterAdvanced",
                    "inputs": {
                        "model": [NODE_CHECKPOINT, 0],
                        "ipadapter": [NODE_ADAPTER_LOADER, 0],
                        "image": [NODE_REF_IMAGE, 0],
                        "weight": reference.weight,
                        "weight_type": "linear",
                        "start_at": 0.0,
                        "end_at": 1.0
                    }
                }),
            );
        }

        prompt
    }
}
