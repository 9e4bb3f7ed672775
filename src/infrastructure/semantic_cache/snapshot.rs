//! JSON snapshot persistence

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::DomainError;
use crate::domain::semantic_cache::CacheEntry;

/// Current on-disk format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized state of a semantic cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    pub dimensions: usize,
    pub min_relevance: f32,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<CacheEntry>,
}

impl CacheSnapshot {
    pub fn new(dimensions: usize, min_relevance: f32, entries: Vec<CacheEntry>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            dimensions,
            min_relevance,
            saved_at: Utc::now(),
            entries,
        }
    }
}

/// Reads and writes snapshots at a fixed path
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, `None` when no file exists yet
    pub async fn load(&self) -> Result<Option<CacheSnapshot>, DomainError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DomainError::storage(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let snapshot: CacheSnapshot = serde_json::from_str(&contents).map_err(|e| {
            DomainError::storage(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(DomainError::storage(format!(
                "Unsupported snapshot version {} in {}",
                snapshot.version,
                self.path.display()
            )));
        }

        Ok(Some(snapshot))
    }

    /// Write the snapshot to a sibling temp file, then rename it into place
    pub async fn save(&self, snapshot: &CacheSnapshot) -> Result<(), DomainError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DomainError::storage(format!("Failed to create directory: {}", e))
            })?;
        }

        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| DomainError::storage(format!("Failed to serialize snapshot: {}", e)))?;

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            DomainError::storage(format!("Failed to write {}: {}", tmp.display(), e))
        })?;

        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            DomainError::storage(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        debug!(
            path = %self.path.display(),
            entries = snapshot.entries.len(),
            "Saved semantic cache snapshot"
        );

        Ok(())
    }

    /// Sibling temp file, unique per write
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.tmp", Uuid::new_v4()));
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::semantic_cache::NewCacheItem;
    use serde_json::json;

    fn temp_store() -> (SnapshotStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("semantic-cache-{}", Uuid::new_v4()));
        (SnapshotStore::new(dir.join("snapshot.json")), dir)
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let (store, _dir) = temp_store();

        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let (store, dir) = temp_store();
        let entry = CacheEntry::from_item(NewCacheItem::new("q", &[], vec![1.0, 0.0], json!("a")))
            .with_hits(4, None);

        store
            .save(&CacheSnapshot::new(2, 0.9, vec![entry.clone()]))
            .await
            .unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded.version, SNAPSHOT_VERSION);
        assert_eq!(loaded.dimensions, 2);
        assert_eq!(loaded.min_relevance, 0.9);
        assert_eq!(loaded.entries, vec![entry]);

        let mut files = tokio::fs::read_dir(&dir).await.unwrap();
        let mut names = Vec::new();
        while let Some(file) = files.next_entry().await.unwrap() {
            names.push(file.file_name());
        }
        assert_eq!(names, vec![std::ffi::OsString::from("snapshot.json")]);

        tokio::fs::remove_dir_all(dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_unknown_version() {
        let (store, dir) = temp_store();
        let mut snapshot = CacheSnapshot::new(2, 0.9, vec![]);
        snapshot.version = 99;
        store.save(&snapshot).await.unwrap();

        let result = store.load().await;

        assert!(matches!(result, Err(DomainError::Storage { .. })));
        tokio::fs::remove_dir_all(dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_corrupt_file() {
        let (store, dir) = temp_store();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(store.path(), "{not json").await.unwrap();

        assert!(store.load().await.is_err());
        tokio::fs::remove_dir_all(dir).await.unwrap();
    }
}
