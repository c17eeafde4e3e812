// SPDX-License-Identifier: MIT

//! Instance persistence
//!
//! Stores only ever serialize and deserialize copies; they never mutate an
//! instance. Operations are atomic per instance but a save is not
//! transactional with the engine call that preceded it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

use super::model::WorkflowInstance;
use crate::flowgate::error::PersistenceError;

type StoreResult<T> = std::result::Result<T, PersistenceError>;

/// Listing entry for a stored instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: String,
    pub workflow_name: String,
    pub current_state: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkflowInstance> for InstanceRecord {
    fn from(instance: &WorkflowInstance) -> Self {
        Self {
            id: instance.id().to_string(),
            workflow_name: instance.workflow_name().to_string(),
            current_state: instance.current_state().to_string(),
            updated_at: instance.updated_at(),
        }
    }
}

/// Durable key/value storage of instance snapshots, keyed by instance id
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Idempotent upsert
    async fn save(&self, instance: &WorkflowInstance) -> StoreResult<()>;

    async fn load(&self, id: &str) -> StoreResult<Option<WorkflowInstance>>;

    /// Returns whether anything was deleted
    async fn delete(&self, id: &str) -> StoreResult<bool>;

    /// All instances, most recently updated first
    async fn list(&self) -> StoreResult<Vec<InstanceRecord>>;

    /// Delete instances not updated within `days`; returns the count deleted
    async fn cleanup_older_than(&self, days: u32) -> StoreResult<usize>;

    /// Most recently updated instance of a workflow. Snapshots that list
    /// but fail to load are skipped in favour of the next newest.
    async fn get_active_instance(
        &self,
        workflow_name: &str,
    ) -> StoreResult<Option<WorkflowInstance>> {
        let records = self.list().await?;
        for record in records.iter().filter(|r| r.workflow_name == workflow_name) {
            match self.load(&record.id).await {
                Ok(Some(instance)) => return Ok(Some(instance)),
                Ok(None) => continue,
                Err(e) => log::warn!("Skipping instance {}: {}", record.id, e),
            }
        }
        Ok(None)
    }
}

/// Oldest `updated_at` that survives a cleanup. `None` when the window
/// reaches past the representable range, in which case nothing is old enough.
fn cutoff(days: u32) -> Option<DateTime<Utc>> {
    Utc::now().checked_sub_signed(Duration::try_days(i64::from(days))?)
}

fn sort_recent_first(records: &mut [InstanceRecord]) {
    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// One pretty-printed JSON file per instance: `<root>/<id>.json`
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(PersistenceError::Directory)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn instance_path(&self, id: &str) -> StoreResult<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(PersistenceError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(format!("{}.json", id)))
    }

    /// Snapshot files currently in the store directory
    async fn snapshot_files(&self) -> StoreResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(PersistenceError::Directory)?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(PersistenceError::Directory)?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    async fn read_record(path: &Path) -> Option<InstanceRecord> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Skipping unreadable snapshot {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Skipping corrupt snapshot {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl InstanceStore for FileStore {
    async fn save(&self, instance: &WorkflowInstance) -> StoreResult<()> {
        let path = self.instance_path(instance.id())?;
        let json = serde_json::to_string_pretty(instance).map_err(|source| {
            PersistenceError::Serialization {
                operation: "save",
                id: instance.id().to_string(),
                source,
            }
        })?;

        // Write-then-rename keeps a half-written snapshot from ever being visible
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| PersistenceError::Io {
            operation: "save",
            id: instance.id().to_string(),
            source,
        };
        fs::write(&tmp, json).await.map_err(io_err)?;
        fs::rename(&tmp, &path).await.map_err(io_err)?;

        log::debug!("Saved instance {} to {}", instance.id(), path.display());
        Ok(())
    }

    async fn load(&self, id: &str) -> StoreResult<Option<WorkflowInstance>> {
        let path = self.instance_path(id)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    operation: "load",
                    id: id.to_string(),
                    source,
                })
            }
        };
        let instance =
            serde_json::from_str(&content).map_err(|source| PersistenceError::Serialization {
                operation: "load",
                id: id.to_string(),
                source,
            })?;
        Ok(Some(instance))
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let path = self.instance_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(PersistenceError::Io {
                operation: "delete",
                id: id.to_string(),
                source,
            }),
        }
    }

    async fn list(&self) -> StoreResult<Vec<InstanceRecord>> {
        let mut records = Vec::new();
        for path in self.snapshot_files().await? {
            if let Some(record) = Self::read_record(&path).await {
                records.push(record);
            }
        }
        sort_recent_first(&mut records);
        Ok(records)
    }

    async fn cleanup_older_than(&self, days: u32) -> StoreResult<usize> {
        let Some(cutoff) = cutoff(days) else {
            return Ok(0);
        };
        let mut deleted = 0;

        for path in self.snapshot_files().await? {
            let Some(record) = Self::read_record(&path).await else {
                continue;
            };
            if record.updated_at >= cutoff {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        log::info!("Cleaned up {} instances older than {} days", deleted, days);
        Ok(deleted)
    }
}

/// Process-local store, shared between clones
#[derive(Clone, Default)]
pub struct MemoryStore {
    instances: Arc<RwLock<HashMap<String, WorkflowInstance>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn save(&self, instance: &WorkflowInstance) -> StoreResult<()> {
        let mut instances = self.instances.write().await;
        instances.insert(instance.id().to_string(), instance.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> StoreResult<Option<WorkflowInstance>> {
        let instances = self.instances.read().await;
        Ok(instances.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let mut instances = self.instances.write().await;
        Ok(instances.remove(id).is_some())
    }

    async fn list(&self) -> StoreResult<Vec<InstanceRecord>> {
        let instances = self.instances.read().await;
        let mut records: Vec<InstanceRecord> =
            instances.values().map(InstanceRecord::from).collect();
        sort_recent_first(&mut records);
        Ok(records)
    }

    async fn cleanup_older_than(&self, days: u32) -> StoreResult<usize> {
        let Some(cutoff) = cutoff(days) else {
            return Ok(0);
        };
        let mut instances = self.instances.write().await;
        let before = instances.len();
        instances.retain(|_, instance| instance.updated_at() >= cutoff);
        Ok(before - instances.len())
    }
}
