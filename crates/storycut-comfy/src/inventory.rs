//! Model and adapter inventory.
//!
//! The backend's introspection endpoint is the primary source; a filesystem
//! scan of well-known model directories is the fallback. An empty result is
//! "nothing available" or "feature unavailable", never an error.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::client::ComfyClient;

const CHECKPOINT_LOADER: &str = "CheckpointLoaderSimple";
const ADAPTER_LOADER: &str = "IPAdapterModelLoader";

/// List checkpoint models, merging API introspection with a disk scan of
/// the configured install path. API results come first; disk results fill
/// in when the API is unavailable or incomplete.
pub async fn list_checkpoints(client: &ComfyClient, install_path: Option<&Path>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut models = Vec::new();

    for name in checkpoints_from_api(client).await {
        if seen.insert(name.clone()) {
            models.push(name);
        }
    }

    if let Some(path) = install_path {
        for name in checkpoints_from_disk(path) {
            if seen.insert(name.clone()) {
                models.push(name);
            }
        }
    }

    models
}

/// List adapter models via API introspection. Empty means the adapter
/// feature is unavailable on this backend.
pub async fn list_adapters(client: &ComfyClient) -> Vec<String> {
    node_allowed_values(client, ADAPTER_LOADER, "ipadapter_file").await
}

/// Checkpoint names from the introspection endpoint.
pub async fn checkpoints_from_api(client: &ComfyClient) -> Vec<String> {
    node_allowed_values(client, CHECKPOINT_LOADER, "ckpt_name").await
}

/// Query one node class for the allowed values of a required input.
///
/// Introspection shape:
/// `{class: {"input": {"required": {field: [["a", "b", ...], ...]}}}}`
async fn node_allowed_values(client: &ComfyClient, node_class: &str, field: &str) -> Vec<String> {
    let info = match client.object_info(node_class).await {
        Ok(info) => info,
        Err(e) => {
            warn!("Introspection of {} failed: {}", node_class, e);
            return Vec::new();
        }
    };

    let values = info
        .get(node_class)
        .and_then(|n| n.get("input"))
        .and_then(|i| i.get("required"))
        .and_then(|r| r.get(field))
        .and_then(|f| f.get(0));

    match values {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Scan well-known model directories under the backend install path.
///
/// Returns paths relative to their search root (subdirectories preserved,
/// as the backend expects), deduplicated and sorted.
pub fn checkpoints_from_disk(install_path: &Path) -> Vec<String> {
    let search_paths = [
        install_path.join("models").join("checkpoints"),
        install_path.join("ComfyUI").join("models").join("checkpoints"),
        install_path.join("models").join("diffusion_models"),
    ];

    let mut found = BTreeSet::new();
    for root in &search_paths {
        debug!("Scanning {} for checkpoints", root.display());
        collect_model_files(root, root, &mut found);
    }

    found.into_iter().collect()
}

fn collect_model_files(root: &Path, dir: &Path, found: &mut BTreeSet<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_model_files(root, &path, found);
        } else if is_model_file(&path) {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            found.insert(rel.to_string_lossy().into_owned());
        }
    }
}

fn is_model_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("safetensors") | Some("ckpt")
    )
}

/// Locate the backend's input directory under the install path.
///
/// Used for reference-image intake and chaining; the orchestrator is the
/// only writer.
pub fn input_dir(install_path: &Path) -> Option<PathBuf> {
    let candidates = [
        install_path.join("ComfyUI").join("input"),
        install_path.join("input"),
        install_path
            .parent()
            .map(|p| p.join("ComfyUI").join("input"))
            .unwrap_or_else(|| install_path.join("input")),
    ];
    candidates.into_iter().find(|p| p.is_dir())
}
