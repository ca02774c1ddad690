//! Per-stage advisory lock.
//!
//! The lock is the `session_active` flag inside the stage's own record. There
//! is no separate lock table: after a crash the truth is one record read
//! away. Acquire and release are plain read-modify-write round trips; the
//! store is expected to serialize concurrent writers to the same record.

use serde_yaml::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::LockError;
use crate::store::{RecordKind, RecordStore, keys, yaml_type_name};

pub struct StageLock {
    store: Arc<dyn RecordStore>,
}

impl StageLock {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Mark the stage as having an active session.
    ///
    /// Fails with `AlreadyLocked` if another session holds it. Every other
    /// field and the body are written back unchanged.
    pub async fn acquire(&self, stage_id: &str) -> Result<(), LockError> {
        let mut record = self.store.read(RecordKind::Stage, stage_id).await?;
        if record.get_bool(keys::SESSION_ACTIVE) == Some(true) {
            debug!(stage_id, "Stage lock contended");
            return Err(LockError::AlreadyLocked {
                stage_id: stage_id.to_string(),
            });
        }

        record.set(keys::SESSION_ACTIVE, Value::Bool(true));
        self.store.write(RecordKind::Stage, stage_id, &record).await?;
        info!(stage_id, "Stage lock acquired");
        Ok(())
    }

    /// Clear the session flag. Releasing an unlocked stage is not an error.
    pub async fn release(&self, stage_id: &str) -> Result<(), LockError> {
        let mut record = self.store.read(RecordKind::Stage, stage_id).await?;
        record.set(keys::SESSION_ACTIVE, Value::Bool(false));
        self.store.write(RecordKind::Stage, stage_id, &record).await?;
        info!(stage_id, "Stage lock released");
        Ok(())
    }

    /// True iff `session_active` is literally `true`. An absent field reads as unlocked.
    pub async fn is_locked(&self, stage_id: &str) -> Result<bool, LockError> {
        let record = self.store.read(RecordKind::Stage, stage_id).await?;
        Ok(record.get_bool(keys::SESSION_ACTIVE) == Some(true))
    }

    pub async fn read_status(&self, stage_id: &str) -> Result<String, LockError> {
        let record = self.store.read(RecordKind::Stage, stage_id).await?;
        match record.get(keys::STATUS) {
            None => Err(LockError::MissingStatus {
                stage_id: stage_id.to_string(),
            }),
            Some(Value::String(status)) => Ok(status.clone()),
            Some(other) => Err(LockError::InvalidStatusType {
                stage_id: stage_id.to_string(),
                found: yaml_type_name(other),
            }),
        }
    }
}
