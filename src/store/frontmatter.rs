//! Markdown-file record store.
//!
//! Every `*.md` file under the repository root whose frontmatter carries an
//! `id` is a record. The id → path index is built lazily with `walkdir` and
//! rebuilt once when a lookup misses, so files created after startup are
//! still found.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

use super::{PendingStage, PendingStageSource, Record, RecordKind, RecordStore, keys};

pub struct FrontmatterStore {
    root: PathBuf,
    index: Arc<Mutex<HashMap<String, PathBuf>>>,
}

impl FrontmatterStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            index: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a record id to its file, rescanning the tree on a miss.
    pub async fn path_for(&self, id: &str) -> Result<PathBuf> {
        if let Some(path) = self.cached(id)? {
            return Ok(path);
        }

        let fresh = self.rescan().await?;
        fresh
            .get(id)
            .cloned()
            .with_context(|| format!("No record with id '{}' under {}", id, self.root.display()))
    }

    fn cached(&self, id: &str) -> Result<Option<PathBuf>> {
        let index = self
            .index
            .lock()
            .map_err(|e| anyhow::anyhow!("Record index lock poisoned: {}", e))?;
        Ok(index.get(id).cloned())
    }

    async fn rescan(&self) -> Result<HashMap<String, PathBuf>> {
        let root = self.root.clone();
        let scanned = tokio::task::spawn_blocking(move || scan_records(&root))
            .await
            .context("Record scan task panicked")??;

        let mut index = self
            .index
            .lock()
            .map_err(|e| anyhow::anyhow!("Record index lock poisoned: {}", e))?;
        *index = scanned
            .iter()
            .map(|(id, (path, _))| (id.clone(), path.clone()))
            .collect();
        Ok(index.clone())
    }
}

/// Walk the tree and parse every markdown file that has an `id` field.
fn scan_records(root: &Path) -> Result<HashMap<String, (PathBuf, Record)>> {
    let mut records = HashMap::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        e.depth() == 0
            || !e
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with('.') || name == "node_modules")
    });

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md")
        {
            continue;
        }

        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        let Ok(record) = Record::parse(&content) else {
            continue;
        };
        if let Some(id) = record.get_str(keys::ID).map(str::to_string) {
            records.insert(id, (path.to_path_buf(), record));
        }
    }

    Ok(records)
}

#[async_trait]
impl RecordStore for FrontmatterStore {
    async fn read(&self, kind: RecordKind, id: &str) -> Result<Record> {
        let path = self.path_for(id).await?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {} {} at {}", kind, id, path.display()))?;
        Record::parse(&content)
            .with_context(|| format!("Failed to parse {} {} at {}", kind, id, path.display()))
    }

    async fn write(&self, kind: RecordKind, id: &str, record: &Record) -> Result<()> {
        let path = self.path_for(id).await?;
        let content = record.render()?;

        // Write to a sibling .tmp and rename, so an interrupted write never
        // leaves a truncated record behind.
        let tmp_path = path.with_extension("md.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("Failed to write {} {} at {}", kind, id, tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to replace {} {} at {}", kind, id, path.display()))
    }
}

#[async_trait]
impl PendingStageSource for FrontmatterStore {
    async fn stages_with_status(&self, status: &str) -> Result<Vec<PendingStage>> {
        let root = self.root.clone();
        let records = tokio::task::spawn_blocking(move || scan_records(&root))
            .await
            .context("Record scan task panicked")??;

        let mut stages: Vec<PendingStage> = records
            .into_iter()
            .filter(|(id, (_, record))| {
                RecordKind::from_id(id) == Some(RecordKind::Stage)
                    && record.get_str(keys::STATUS) == Some(status)
            })
            .map(|(id, (file, record))| PendingStage {
                pr_url: record.get_str(keys::PR_URL).map(str::to_string),
                status: status.to_string(),
                id,
                file,
            })
            .collect();
        stages.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stages)
    }
}
