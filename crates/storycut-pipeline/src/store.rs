//! On-disk project store.
//!
//! Layout: one directory per project under the outputs root, named
//! `{timestamp}_{sanitized title}`. Each project holds its rendered assets,
//! optional per-cut sidecar files, and a single `metadata.json` written at
//! finalize time.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::info;

use storycut_models::{sanitize_filename, ProjectMetadata};

use crate::error::PipelineResult;

const METADATA_FILE: &str = "metadata.json";

/// Root handle over the outputs directory.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

/// One project directory, created at run start.
#[derive(Debug, Clone)]
pub struct ProjectHandle {
    dir: PathBuf,
    folder_name: String,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh project directory for a run starting now.
    pub async fn create(&self, title: &str) -> PipelineResult<ProjectHandle> {
        let timestamp = ProjectMetadata::timestamp(Utc::now());
        let folder_name = format!("{}_{}", timestamp, sanitize_filename(title));
        let dir = self.root.join(&folder_name);
        tokio::fs::create_dir_all(&dir).await?;
        info!(folder = %folder_name, "Created project directory");
        Ok(ProjectHandle { dir, folder_name })
    }

    /// List project folder names, newest first. Non-directories and entries
    /// without metadata are skipped.
    pub async fn list_projects(&self) -> PipelineResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if !entry.path().join(METADATA_FILE).exists() {
                continue;
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        // Folder names start with the creation timestamp, so lexical order
        // is chronological order.
        names.sort();
        names.reverse();
        Ok(names)
    }

    /// Load a project's metadata by folder name.
    pub async fn load_metadata(&self, folder_name: &str) -> PipelineResult<ProjectMetadata> {
        let path = self.root.join(folder_name).join(METADATA_FILE);
        let text = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Remove a project directory and everything in it.
    pub async fn delete_project(&self, folder_name: &str) -> PipelineResult<()> {
        let dir = self.root.join(folder_name);
        tokio::fs::remove_dir_all(&dir).await?;
        info!(folder = %folder_name, "Deleted project");
        Ok(())
    }
}

impl ProjectHandle {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Write a rendered asset into the project directory.
    pub async fn save_asset(&self, filename: &str, bytes: &[u8]) -> PipelineResult<PathBuf> {
        let path = self.dir.join(filename);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Write a text sidecar next to an asset.
    pub async fn save_sidecar(&self, filename: &str, text: &str) -> PipelineResult<()> {
        let path = self.dir.join(filename);
        tokio::fs::write(&path, text).await?;
        Ok(())
    }

    /// Write the project's metadata record.
    pub async fn write_metadata(&self, metadata: &ProjectMetadata) -> PipelineResult<()> {
        let path = self.dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(metadata)?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storycut_models::Cut;

    fn sample_metadata(folder_name: &str, completed: bool) -> ProjectMetadata {
        ProjectMetadata {
            title: "The River".to_string(),
            mode: "LONG_FORM".to_string(),
            resolution: "1920x1080".to_string(),
            cuts: 1,
            created_at: "20250101-000000".to_string(),
            cuts_data: vec![Cut::new(1)],
            folder_name: folder_name.to_string(),
            completed,
        }
    }

    #[tokio::test]
    async fn test_create_sanitizes_title() {
        let root = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(root.path());
        let handle = store.create("The Wolf: Part 2?").await.unwrap();
        assert!(handle.folder_name().ends_with("_The_Wolf_Part_2"));
        assert!(handle.dir().is_dir());
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(root.path());
        let handle = store.create("trip").await.unwrap();
        let metadata = sample_metadata(handle.folder_name(), true);
        handle.write_metadata(&metadata).await.unwrap();

        let loaded = store.load_metadata(handle.folder_name()).await.unwrap();
        assert_eq!(loaded.title, "The River");
        assert!(loaded.completed);
        assert_eq!(loaded.cuts_data.len(), 1);
    }

    #[tokio::test]
    async fn test_list_skips_directories_without_metadata() {
        let root = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(root.path());

        let with_meta = store.create("kept").await.unwrap();
        with_meta
            .write_metadata(&sample_metadata(with_meta.folder_name(), false))
            .await
            .unwrap();
        tokio::fs::create_dir(root.path().join("no_metadata"))
            .await
            .unwrap();

        let names = store.list_projects().await.unwrap();
        assert_eq!(names, vec![with_meta.folder_name().to_string()]);
    }

    #[tokio::test]
    async fn test_list_on_missing_root_is_empty() {
        let store = ProjectStore::new("/nonexistent/outputs");
        assert!(store.list_projects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_project_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(root.path());
        let handle = store.create("gone").await.unwrap();
        handle
            .write_metadata(&sample_metadata(handle.folder_name(), false))
            .await
            .unwrap();

        store.delete_project(handle.folder_name()).await.unwrap();
        assert!(!handle.dir().exists());
    }

    #[tokio::test]
    async fn test_save_asset_and_sidecar() {
        let root = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(root.path());
        let handle = store.create("assets").await.unwrap();

        let path = handle.save_asset("cut_000_42.png", b"png-bytes").await.unwrap();
        handle
            .save_sidecar("cut_000_42.txt", "pan slowly left")
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"png-bytes");
        assert_eq!(
            tokio::fs::read_to_string(handle.dir().join("cut_000_42.txt"))
                .await
                .unwrap(),
            "pan slowly left"
        );
    }
}
