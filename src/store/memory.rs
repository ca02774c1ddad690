use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{PendingStage, PendingStageSource, Record, RecordKind, RecordStore, keys};

/// In-process record store. Counts every read and write.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(RecordKind, String), Record>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without counting it as a write.
    pub fn insert(&self, kind: RecordKind, id: &str, record: Record) {
        if let Ok(mut records) = self.records.lock() {
            records.insert((kind, id.to_string()), record);
        }
    }

    /// Snapshot a record without counting it as a read.
    pub fn get(&self, kind: RecordKind, id: &str) -> Option<Record> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(&(kind, id.to_string())).cloned())
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn read(&self, kind: RecordKind, id: &str) -> Result<Record> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let records = self
            .records
            .lock()
            .map_err(|e| anyhow!("Memory store lock poisoned: {}", e))?;
        records
            .get(&(kind, id.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("No {} with id '{}'", kind, id))
    }

    async fn write(&self, kind: RecordKind, id: &str, record: &Record) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut records = self
            .records
            .lock()
            .map_err(|e| anyhow!("Memory store lock poisoned: {}", e))?;
        records.insert((kind, id.to_string()), record.clone());
        Ok(())
    }
}

#[async_trait]
impl PendingStageSource for MemoryStore {
    async fn stages_with_status(&self, status: &str) -> Result<Vec<PendingStage>> {
        let records = self
            .records
            .lock()
            .map_err(|e| anyhow!("Memory store lock poisoned: {}", e))?;
        let mut stages: Vec<PendingStage> = records
            .iter()
            .filter(|((kind, _), record)| {
                *kind == RecordKind::Stage && record.get_str(keys::STATUS) == Some(status)
            })
            .map(|((_, id), record)| PendingStage {
                id: id.clone(),
                file: PathBuf::from(format!("{}.md", id)),
                status: status.to_string(),
                pr_url: record.get_str(keys::PR_URL).map(str::to_string),
            })
            .collect();
        stages.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stages)
    }
}
