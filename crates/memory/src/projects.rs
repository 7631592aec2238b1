//! Project key to folder map, persisted as a pretty JSON object.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use studiobot_security::{PathValidationError, validate_project_key};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ProjectPathError {
    #[error(transparent)]
    InvalidKey(#[from] PathValidationError),

    #[error("No local path configured for project '{0}'")]
    NotConfigured(String),

    #[error("Project path must not be empty")]
    EmptyPath,

    #[error("Failed to save project paths: {0}")]
    Storage(String),
}

pub struct ProjectPaths {
    file: PathBuf,
    entries: RwLock<BTreeMap<String, PathBuf>>,
}

impl ProjectPaths {
    /// Open the map stored at `file`; a missing or malformed file starts empty.
    pub fn open(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let entries = Self::load_from_disk(&file);
        Self {
            file,
            entries: RwLock::new(entries),
        }
    }

    fn load_from_disk(file: &Path) -> BTreeMap<String, PathBuf> {
        let Ok(content) = std::fs::read_to_string(file) else {
            return BTreeMap::new();
        };
        match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(&content) {
            Ok(raw) => raw
                .into_iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k, PathBuf::from(s))))
                .collect(),
            Err(e) => {
                warn!(path = %file.display(), error = %e, "Ignoring malformed project paths file");
                BTreeMap::new()
            }
        }
    }

    fn flush(&self, entries: &BTreeMap<String, PathBuf>) -> Result<(), ProjectPathError> {
        if let Some(parent) = self.file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProjectPathError::Storage(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| ProjectPathError::Storage(e.to_string()))?;
        std::fs::write(&self.file, json).map_err(|e| ProjectPathError::Storage(e.to_string()))
    }

    pub async fn list(&self) -> BTreeMap<String, PathBuf> {
        self.entries.read().await.clone()
    }

    /// Unknown or invalid keys resolve to `None`.
    pub async fn get(&self, key: &str) -> Option<PathBuf> {
        let key = validate_project_key(key).ok()?;
        self.entries.read().await.get(&key).cloned()
    }

    /// Like [`ProjectPaths::get`], but a missing entry is an error.
    pub async fn require(&self, key: &str) -> Result<PathBuf, ProjectPathError> {
        let key = validate_project_key(key)?;
        self.entries
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(ProjectPathError::NotConfigured(key))
    }

    pub async fn set(&self, key: &str, path: &str) -> Result<(), ProjectPathError> {
        let key = validate_project_key(key)?;
        let path = path.trim();
        if path.is_empty() {
            return Err(ProjectPathError::EmptyPath);
        }
        let mut entries = self.entries.write().await;
        entries.insert(key.clone(), PathBuf::from(path));
        self.flush(&entries)?;
        info!(project = %key, path = %path, "Project path set");
        Ok(())
    }

    /// Returns whether an entry existed.
    pub async fn remove(&self, key: &str) -> Result<bool, ProjectPathError> {
        let key = validate_project_key(key)?;
        let mut entries = self.entries.write().await;
        let existed = entries.remove(&key).is_some();
        if existed {
            self.flush(&entries)?;
        }
        Ok(existed)
    }
}
