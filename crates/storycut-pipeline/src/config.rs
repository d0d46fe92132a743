//! Studio configuration.
//!
//! Settings come from three layers: built-in defaults, an optional JSON
//! settings file, and environment variables. Later layers win.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::PipelineResult;

/// Runtime configuration for both pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Render backend host
    pub comfy_host: String,

    /// Render backend port
    pub comfy_port: u16,

    /// Backend install directory, used for disk model discovery and for
    /// locating the input directory that reference images are staged into
    pub comfy_install_path: Option<PathBuf>,

    /// Root directory projects are written under
    pub outputs_dir: PathBuf,

    /// Sampler steps
    pub steps: u32,

    /// Classifier-free guidance scale
    pub cfg: f64,

    /// Sampler name
    pub sampler_name: String,

    /// Scheduler name
    pub scheduler: String,

    /// Configured checkpoint filename
    pub selected_checkpoint: String,

    /// Configured reference-adapter filename
    pub selected_adapter: String,

    /// Whether a caller-supplied reference image is applied
    pub use_reference_image: bool,

    /// Whether each rendered cut seeds the next cut's reference
    pub use_reference_chaining: bool,

    /// Reference adapter strength
    pub reference_weight: f64,

    /// Cuts per chunk in the chunking pipeline
    pub chunk_size: u32,

    /// Per-cut render wait ceiling
    #[serde(with = "duration_secs")]
    pub render_wait: Duration,

    /// Interval between render status polls
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Per-template prompt overrides, keyed by template name
    pub prompt_overrides: HashMap<String, String>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            comfy_host: "127.0.0.1".to_string(),
            comfy_port: 8188,
            comfy_install_path: None,
            outputs_dir: PathBuf::from("outputs"),
            steps: 30,
            cfg: 7.5,
            sampler_name: "dpmpp_2m".to_string(),
            scheduler: "karras".to_string(),
            selected_checkpoint: "RealVisXL_V5.0.safetensors".to_string(),
            selected_adapter: "ip-adapter-plus_sdxl_vit-h.safetensors".to_string(),
            use_reference_image: true,
            use_reference_chaining: false,
            reference_weight: 0.8,
            chunk_size: 10,
            render_wait: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
            prompt_overrides: HashMap::new(),
        }
    }
}

impl StudioConfig {
    /// Load configuration from environment variables over defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("STORYCUT_COMFY_HOST") {
            config.comfy_host = host;
        }
        if let Some(port) = parse_env("STORYCUT_COMFY_PORT") {
            config.comfy_port = port;
        }
        if let Ok(path) = std::env::var("STORYCUT_COMFY_INSTALL_PATH") {
            config.comfy_install_path = Some(PathBuf::from(path));
        }
        if let Ok(dir) = std::env::var("STORYCUT_OUTPUTS_DIR") {
            config.outputs_dir = PathBuf::from(dir);
        }
        if let Ok(checkpoint) = std::env::var("STORYCUT_CHECKPOINT") {
            config.selected_checkpoint = checkpoint;
        }
        if let Ok(adapter) = std::env::var("STORYCUT_ADAPTER") {
            config.selected_adapter = adapter;
        }
        if let Some(steps) = parse_env("STORYCUT_STEPS") {
            config.steps = steps;
        }
        if let Some(cfg) = parse_env("STORYCUT_CFG") {
            config.cfg = cfg;
        }
        if let Some(size) = parse_env("STORYCUT_CHUNK_SIZE") {
            config.chunk_size = size;
        }
        if let Some(secs) = parse_env::<u64>("STORYCUT_RENDER_WAIT_SECS") {
            config.render_wait = Duration::from_secs(secs);
        }
        if let Some(chaining) = parse_env("STORYCUT_REFERENCE_CHAINING") {
            config.use_reference_chaining = chaining;
        }

        config
    }

    /// Replace this configuration with a JSON settings file. Fields absent
    /// from the file fall back to built-in defaults. A missing file is not
    /// an error; a malformed one is.
    pub async fn merge_settings_file(self, path: &Path) -> PipelineResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(self),
            Err(err) => Err(err.into()),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, raw = %raw, "Ignoring unparsable environment override");
                None
            }
        },
        Err(_) => None,
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StudioConfig::default();
        assert_eq!(config.comfy_port, 8188);
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.render_wait, Duration::from_secs(120));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(config.use_reference_image);
        assert!(!config.use_reference_chaining);
    }

    #[tokio::test]
    async fn test_missing_settings_file_keeps_defaults() {
        let config = StudioConfig::default()
            .merge_settings_file(Path::new("/nonexistent/settings.json"))
            .await
            .unwrap();
        assert_eq!(config.comfy_port, 8188);
    }

    #[tokio::test]
    async fn test_settings_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(
            &path,
            r#"{"comfy_port": 9000, "selected_checkpoint": "other.safetensors"}"#,
        )
        .await
        .unwrap();

        let config = StudioConfig::default()
            .merge_settings_file(&path)
            .await
            .unwrap();
        assert_eq!(config.comfy_port, 9000);
        assert_eq!(config.selected_checkpoint, "other.safetensors");
        // Unspecified fields keep their defaults.
        assert_eq!(config.steps, 30);
    }

    #[tokio::test]
    async fn test_malformed_settings_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let result = StudioConfig::default().merge_settings_file(&path).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_duration_round_trips_as_seconds() {
        let config = StudioConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"render_wait\":120"));
        let back: StudioConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.render_wait, Duration::from_secs(120));
    }
}
