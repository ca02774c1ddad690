//! Per-stage review comment baselines.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Last observation of a stage's pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MrCommentTracking {
    pub stage_id: String,
    pub last_poll_timestamp: DateTime<Utc>,
    pub last_known_unresolved_count: u32,
}

impl MrCommentTracking {
    pub fn now(stage_id: &str, unresolved: u32) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            last_poll_timestamp: Utc::now(),
            last_known_unresolved_count: unresolved,
        }
    }
}

#[async_trait]
pub trait CommentTrackingStore: Send + Sync {
    async fn get(&self, stage_id: &str) -> Result<Option<MrCommentTracking>>;
    async fn upsert(&self, row: MrCommentTracking) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryTrackingStore {
    rows: Mutex<HashMap<String, MrCommentTracking>>,
}

impl MemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CommentTrackingStore for MemoryTrackingStore {
    async fn get(&self, stage_id: &str) -> Result<Option<MrCommentTracking>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| anyhow::anyhow!("tracking store lock poisoned"))?;
        Ok(rows.get(stage_id).cloned())
    }

    async fn upsert(&self, row: MrCommentTracking) -> Result<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| anyhow::anyhow!("tracking store lock poisoned"))?;
        rows.insert(row.stage_id.clone(), row);
        Ok(())
    }
}

/// Rows kept in one JSON object keyed by stage id, rewritten on every upsert.
pub struct JsonTrackingStore {
    path: PathBuf,
    // Serializes read-modify-write of the file within this process.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonTrackingStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, MrCommentTracking>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read tracking file: {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse tracking file: {}", self.path.display()))
    }
}

#[async_trait]
impl CommentTrackingStore for JsonTrackingStore {
    async fn get(&self, stage_id: &str) -> Result<Option<MrCommentTracking>> {
        Ok(self.load().await?.remove(stage_id))
    }

    async fn upsert(&self, row: MrCommentTracking) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut rows = self.load().await?;
        rows.insert(row.stage_id.clone(), row);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create tracking directory: {}", parent.display())
            })?;
        }
        let content = serde_json::to_string_pretty(&rows)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("Failed to write tracking file: {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace tracking file: {}", self.path.display()))
    }
}
