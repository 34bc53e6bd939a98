//! Versioned model artifact registry
//!
//! On disk a slot looks like:
//!
//! ```text
//! <root>/<slot>/versions/<version>.json
//! <root>/<slot>/active.json
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so
//! readers see either the previous or the next state. `active.json` records
//! the blake3 digest of the version file it points at; loads verify it.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::classifier::{ModelArtifact, ARTIFACT_FORMAT_VERSION};

const ACTIVE_FILE: &str = "active.json";
const VERSIONS_DIR: &str = "versions";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact i/o failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("artifact `{version}` digest mismatch (expected {expected}, found {actual})")]
    Corrupt { version: String, expected: String, actual: String },
    #[error("artifact format version {found} is not supported (expected {expected})")]
    FormatMismatch { found: u32, expected: u32 },
    #[error("artifact version `{0}` does not exist")]
    UnknownVersion(String),
    #[error("`{0}` is not a valid slot or version name")]
    InvalidName(String),
}

/// The pointer naming a slot's active version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveArtifact {
    pub version: String,
    /// blake3 hex digest of the serialized version file
    pub digest: String,
    pub activated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist a new version and make it active.
    async fn save(&self, slot: &str, artifact: &ModelArtifact)
        -> Result<ActiveArtifact, ArtifactError>;

    /// The active artifact, or `None` when the slot has never been trained.
    async fn load(&self, slot: &str) -> Result<Option<ModelArtifact>, ArtifactError> {
        match self.active_version(slot).await? {
            Some(active) => self.load_active(slot, &active).await.map(Some),
            None => Ok(None),
        }
    }

    async fn active_version(&self, slot: &str) -> Result<Option<ActiveArtifact>, ArtifactError>;

    /// Load the version a pointer names, verifying its digest.
    async fn load_active(
        &self,
        slot: &str,
        active: &ActiveArtifact,
    ) -> Result<ModelArtifact, ArtifactError>;

    /// Stored versions, oldest name first.
    async fn versions(&self, slot: &str) -> Result<Vec<String>, ArtifactError>;

    /// Point the slot at an existing version (rollback).
    async fn activate(&self, slot: &str, version: &str) -> Result<ActiveArtifact, ArtifactError>;
}

fn validate_name(name: &str) -> Result<(), ArtifactError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ArtifactError::InvalidName(name.to_string()))
    }
}

fn digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn encode(artifact: &ModelArtifact) -> Result<Vec<u8>, ArtifactError> {
    Ok(serde_json::to_vec_pretty(artifact)?)
}

fn decode(active: &ActiveArtifact, bytes: &[u8]) -> Result<ModelArtifact, ArtifactError> {
    let actual = digest(bytes);
    if actual != active.digest {
        return Err(ArtifactError::Corrupt {
            version: active.version.clone(),
            expected: active.digest.clone(),
            actual,
        });
    }

    let artifact: ModelArtifact = serde_json::from_slice(bytes)?;
    if artifact.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(ArtifactError::FormatMismatch {
            found: artifact.format_version,
            expected: ARTIFACT_FORMAT_VERSION,
        });
    }
    Ok(artifact)
}

/// Filesystem registry rooted at a directory.
#[derive(Clone, Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_dir(&self, slot: &str) -> Result<PathBuf, ArtifactError> {
        validate_name(slot)?;
        Ok(self.root.join(slot))
    }

    fn version_path(&self, slot: &str, version: &str) -> Result<PathBuf, ArtifactError> {
        validate_name(version)?;
        Ok(self.slot_dir(slot)?.join(VERSIONS_DIR).join(format!("{version}.json")))
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
        let io_err = |source| ArtifactError::Io { path: path.to_path_buf(), source };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let file_name = path.file_name().and_then(|name| name.to_str()).unwrap_or("artifact");
        let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, bytes).await.map_err(io_err)?;
        if let Err(source) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err(source));
        }
        Ok(())
    }

    async fn write_pointer(
        &self,
        slot: &str,
        version: &str,
        digest: String,
    ) -> Result<ActiveArtifact, ArtifactError> {
        let active =
            ActiveArtifact { version: version.to_string(), digest, activated_at: Utc::now() };
        let path = self.slot_dir(slot)?.join(ACTIVE_FILE);
        Self::write_atomic(&path, &serde_json::to_vec_pretty(&active)?).await?;
        Ok(active)
    }

    async fn read_version(&self, slot: &str, version: &str) -> Result<Vec<u8>, ArtifactError> {
        let path = self.version_path(slot, version)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::UnknownVersion(version.to_string()))
            }
            Err(source) => Err(ArtifactError::Io { path, source }),
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn save(
        &self,
        slot: &str,
        artifact: &ModelArtifact,
    ) -> Result<ActiveArtifact, ArtifactError> {
        let bytes = encode(artifact)?;
        let path = self.version_path(slot, &artifact.version)?;
        Self::write_atomic(&path, &bytes).await?;

        let active = self.write_pointer(slot, &artifact.version, digest(&bytes)).await?;
        tracing::info!(
            event_name = "model.artifact.saved",
            slot,
            version = %active.version,
            digest = %active.digest,
            "model artifact saved and activated"
        );
        Ok(active)
    }

    async fn active_version(&self, slot: &str) -> Result<Option<ActiveArtifact>, ArtifactError> {
        let path = self.slot_dir(slot)?.join(ACTIVE_FILE);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ArtifactError::Io { path, source }),
        }
    }

    async fn load_active(
        &self,
        slot: &str,
        active: &ActiveArtifact,
    ) -> Result<ModelArtifact, ArtifactError> {
        let bytes = self.read_version(slot, &active.version).await?;
        decode(active, &bytes)
    }

    async fn versions(&self, slot: &str) -> Result<Vec<String>, ArtifactError> {
        let dir = self.slot_dir(slot)?.join(VERSIONS_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ArtifactError::Io { path: dir, source }),
        };

        let mut versions = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => return Err(ArtifactError::Io { path: dir, source }),
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(version) = name.strip_suffix(".json") {
                if !version.starts_with('.') {
                    versions.push(version.to_string());
                }
            }
        }
        versions.sort();
        Ok(versions)
    }

    async fn activate(&self, slot: &str, version: &str) -> Result<ActiveArtifact, ArtifactError> {
        let bytes = self.read_version(slot, version).await?;
        let pointer = ActiveArtifact {
            version: version.to_string(),
            digest: digest(&bytes),
            activated_at: Utc::now(),
        };
        decode(&pointer, &bytes)?;

        let active = self.write_pointer(slot, version, pointer.digest).await?;
        tracing::info!(
            event_name = "model.artifact.activated",
            slot,
            version,
            "model artifact activated"
        );
        Ok(active)
    }
}

#[derive(Debug, Default)]
struct SlotState {
    versions: BTreeMap<String, Vec<u8>>,
    active: Option<ActiveArtifact>,
}

/// Process-local registry for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    slots: RwLock<HashMap<String, SlotState>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a stored version's bytes without updating the pointer.
    #[cfg(test)]
    pub(crate) async fn overwrite_raw(&self, slot: &str, version: &str, bytes: Vec<u8>) {
        let mut slots = self.slots.write().await;
        slots.entry(slot.to_string()).or_default().versions.insert(version.to_string(), bytes);
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save(
        &self,
        slot: &str,
        artifact: &ModelArtifact,
    ) -> Result<ActiveArtifact, ArtifactError> {
        validate_name(slot)?;
        validate_name(&artifact.version)?;
        let bytes = encode(artifact)?;
        let active = ActiveArtifact {
            version: artifact.version.clone(),
            digest: digest(&bytes),
            activated_at: Utc::now(),
        };

        let mut slots = self.slots.write().await;
        let state = slots.entry(slot.to_string()).or_default();
        state.versions.insert(artifact.version.clone(), bytes);
        state.active = Some(active.clone());
        Ok(active)
    }

    async fn active_version(&self, slot: &str) -> Result<Option<ActiveArtifact>, ArtifactError> {
        let slots = self.slots.read().await;
        Ok(slots.get(slot).and_then(|state| state.active.clone()))
    }

    async fn load_active(
        &self,
        slot: &str,
        active: &ActiveArtifact,
    ) -> Result<ModelArtifact, ArtifactError> {
        let slots = self.slots.read().await;
        let bytes = slots
            .get(slot)
            .and_then(|state| state.versions.get(&active.version))
            .ok_or_else(|| ArtifactError::UnknownVersion(active.version.clone()))?;
        decode(active, bytes)
    }

    async fn versions(&self, slot: &str) -> Result<Vec<String>, ArtifactError> {
        let slots = self.slots.read().await;
        Ok(slots.get(slot).map(|state| state.versions.keys().cloned().collect()).unwrap_or_default())
    }

    async fn activate(&self, slot: &str, version: &str) -> Result<ActiveArtifact, ArtifactError> {
        let mut slots = self.slots.write().await;
        let state = slots
            .get_mut(slot)
            .ok_or_else(|| ArtifactError::UnknownVersion(version.to_string()))?;
        let bytes = state
            .versions
            .get(version)
            .ok_or_else(|| ArtifactError::UnknownVersion(version.to_string()))?;

        let active =
            ActiveArtifact { version: version.to_string(), digest: digest(bytes), activated_at: Utc::now() };
        decode(&active, bytes)?;
        state.active = Some(active.clone());
        Ok(active)
    }
}
