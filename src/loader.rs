use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::session::{AudioSession, ImageSession, PoseSession};

/// A model load can only fail one way as far as a panel is concerned:
/// the artifact or the runtime capability is not there. A panel that
/// sees this downgrades itself to demo mode for its whole activation.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
}

/// Class-label list carried in the model's metadata descriptor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Resolved on-disk artifact: topology/weights descriptor plus parsed
/// metadata.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub topology: PathBuf,
    pub metadata: ModelMetadata,
}

/// The externally supplied inference runtime. Each modality is an
/// optional capability; the default body stands in for a host that
/// does not ship that capability at all.
pub trait ModelRuntime: Send + Sync {
    fn load_image(&self, _artifact: &ModelArtifact) -> Result<Box<dyn ImageSession>, LoadError> {
        Err(LoadError::ModelUnavailable(
            "image capability not present".to_string(),
        ))
    }

    fn load_audio(&self, _artifact: &ModelArtifact) -> Result<Box<dyn AudioSession>, LoadError> {
        Err(LoadError::ModelUnavailable(
            "audio capability not present".to_string(),
        ))
    }

    fn load_pose(&self, _artifact: &ModelArtifact) -> Result<Box<dyn PoseSession>, LoadError> {
        Err(LoadError::ModelUnavailable(
            "pose capability not present".to_string(),
        ))
    }
}

/// Runtime with no capabilities at all. The shipped binary uses this,
/// which keeps every panel on the demo-mode path.
pub struct NullRuntime;

impl ModelRuntime for NullRuntime {}

pub struct LoadedImageModel {
    pub session: Box<dyn ImageSession>,
    pub labels: Vec<String>,
}

pub struct LoadedAudioModel {
    pub session: Box<dyn AudioSession>,
    pub labels: Vec<String>,
}

pub struct LoadedPoseModel {
    pub session: Box<dyn PoseSession>,
    pub labels: Vec<String>,
}

/// Resolves a base path to a live session through the injected
/// runtime. One attempt, no retries.
#[derive(Clone)]
pub struct ModelLoader {
    runtime: Arc<dyn ModelRuntime>,
}

impl ModelLoader {
    pub fn new(runtime: Arc<dyn ModelRuntime>) -> Self {
        Self { runtime }
    }

    pub async fn load_image(&self, base_path: &Path) -> Result<LoadedImageModel, LoadError> {
        let artifact = fetch_artifact(base_path).await?;
        let session = self.runtime.load_image(&artifact)?;
        let labels = resolve_labels(session.class_labels(), &artifact);
        info!("Image model loaded from {} ({} labels)", base_path.display(), labels.len());
        Ok(LoadedImageModel { session, labels })
    }

    pub async fn load_audio(&self, base_path: &Path) -> Result<LoadedAudioModel, LoadError> {
        let artifact = fetch_artifact(base_path).await?;
        let session = self.runtime.load_audio(&artifact)?;
        let labels = resolve_labels(session.class_labels(), &artifact);
        info!("Audio model loaded from {} ({} labels)", base_path.display(), labels.len());
        Ok(LoadedAudioModel { session, labels })
    }

    pub async fn load_pose(&self, base_path: &Path) -> Result<LoadedPoseModel, LoadError> {
        let artifact = fetch_artifact(base_path).await?;
        let session = self.runtime.load_pose(&artifact)?;
        let labels = resolve_labels(session.class_labels(), &artifact);
        info!("Pose model loaded from {} ({} labels)", base_path.display(), labels.len());
        Ok(LoadedPoseModel { session, labels })
    }
}

/// Prefer labels the session itself reports; fall back to the metadata
/// descriptor. An empty result is legal and means the panel should use
/// its hard-coded default class set.
fn resolve_labels(session_labels: Vec<String>, artifact: &ModelArtifact) -> Vec<String> {
    if !session_labels.is_empty() {
        session_labels
    } else {
        artifact.metadata.labels.clone()
    }
}

/// Reads `model.json` + `metadata.json` under the base path. Any
/// missing or unparsable piece collapses to `ModelUnavailable`.
pub async fn fetch_artifact(base_path: &Path) -> Result<ModelArtifact, LoadError> {
    let topology = base_path.join("model.json");
    let metadata_path = base_path.join("metadata.json");

    tokio::fs::metadata(&topology).await.map_err(|e| {
        LoadError::ModelUnavailable(format!("{}: {}", topology.display(), e))
    })?;

    let raw = tokio::fs::read_to_string(&metadata_path).await.map_err(|e| {
        LoadError::ModelUnavailable(format!("{}: {}", metadata_path.display(), e))
    })?;
    let metadata: ModelMetadata = serde_json::from_str(&raw).map_err(|e| {
        LoadError::ModelUnavailable(format!("{}: {}", metadata_path.display(), e))
    })?;

    debug!(
        "Fetched artifact from {} with {} metadata labels",
        base_path.display(),
        metadata.labels.len()
    );
    Ok(ModelArtifact { topology, metadata })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_artifact(dir: &Path, metadata_json: &str) {
        fs::write(dir.join("model.json"), "{}").unwrap();
        fs::write(dir.join("metadata.json"), metadata_json).unwrap();
    }

    #[tokio::test]
    async fn fetches_labels_from_metadata() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), r#"{"labels":["soccer","basketball","tennis"]}"#);
        let artifact = fetch_artifact(dir.path()).await.unwrap();
        assert_eq!(artifact.metadata.labels, vec!["soccer", "basketball", "tennis"]);
    }

    #[tokio::test]
    async fn metadata_without_labels_is_accepted() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), r#"{"modelName":"sports"}"#);
        let artifact = fetch_artifact(dir.path()).await.unwrap();
        assert!(artifact.metadata.labels.is_empty());
    }

    #[tokio::test]
    async fn missing_topology_is_unavailable() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("metadata.json"), "{}").unwrap();
        let err = fetch_artifact(dir.path()).await.unwrap_err();
        assert!(matches!(err, LoadError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn garbled_metadata_is_unavailable() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), "not json");
        let err = fetch_artifact(dir.path()).await.unwrap_err();
        assert!(matches!(err, LoadError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn null_runtime_has_no_capabilities() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), r#"{"labels":["a"]}"#);
        let loader = ModelLoader::new(Arc::new(NullRuntime));
        assert!(loader.load_image(dir.path()).await.is_err());
        assert!(loader.load_audio(dir.path()).await.is_err());
        assert!(loader.load_pose(dir.path()).await.is_err());
    }
}
