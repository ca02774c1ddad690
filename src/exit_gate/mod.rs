//! Exit gate: propagate a stage's new status up through ticket and epic.
//!
//! Writes happen strictly stage → ticket → epic, then the resync collaborator
//! is invoked. A crash part-way leaves the hierarchy consistent with some
//! prefix of that sequence. A resync failure is reported in the result and
//! does not undo the writes already made.

pub mod sync;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::ExitGateError;
use crate::store::{Record, RecordKind, RecordStore, keys};

pub use sync::{CommandSync, NoopSync, SyncResult, SyncRunner, sync_runner};

pub const STATUS_COMPLETE: &str = "Complete";
pub const STATUS_IN_PROGRESS: &str = "In Progress";
pub const STATUS_NOT_STARTED: &str = "Not Started";

/// One in-flight or just-finished unit of work.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub stage_id: String,
    pub stage_file: PathBuf,
    /// Isolated workspace the agent ran in. `None` for poller-driven transitions.
    pub worktree_path: Option<PathBuf>,
    pub status_before: String,
    pub started_at: DateTime<Utc>,
}

impl WorkerInfo {
    pub fn new(
        stage_id: &str,
        stage_file: impl Into<PathBuf>,
        worktree_path: Option<PathBuf>,
        status_before: &str,
    ) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            stage_file: stage_file.into(),
            worktree_path,
            status_before: status_before.to_string(),
            started_at: Utc::now(),
        }
    }

    /// Descriptor for a transition with no live agent workspace behind it.
    pub fn synthetic(stage_id: &str, stage_file: impl Into<PathBuf>, status_before: &str) -> Self {
        Self::new(stage_id, stage_file, None, status_before)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitGateResult {
    pub status_changed: bool,
    pub status_before: String,
    pub status_after: String,
    pub ticket_updated: bool,
    pub epic_updated: bool,
    /// `None` when the no-op fast path skipped the resync.
    pub sync_result: Option<SyncResult>,
}

/// Ticket status from its stages: all Complete → Complete, any stage past
/// Not Started → In Progress, otherwise Not Started.
pub fn derive_ticket_status<'a>(stage_statuses: impl IntoIterator<Item = &'a str>) -> &'static str {
    let statuses: Vec<&str> = stage_statuses.into_iter().collect();
    if statuses.is_empty() {
        return STATUS_NOT_STARTED;
    }
    if statuses.iter().all(|s| *s == STATUS_COMPLETE) {
        STATUS_COMPLETE
    } else if statuses.iter().any(|s| *s != STATUS_NOT_STARTED) {
        STATUS_IN_PROGRESS
    } else {
        STATUS_NOT_STARTED
    }
}

fn mapping_field(record: &Record, key: &str) -> Mapping {
    match record.get(key) {
        Some(Value::Mapping(map)) => map.clone(),
        _ => Mapping::new(),
    }
}

fn mapping_entry<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

pub struct ExitGateRunner {
    store: Arc<dyn RecordStore>,
    sync: Arc<dyn SyncRunner>,
}

impl ExitGateRunner {
    pub fn new(store: Arc<dyn RecordStore>, sync: Arc<dyn SyncRunner>) -> Self {
        Self { store, sync }
    }

    pub async fn run(
        &self,
        worker: &WorkerInfo,
        repo_root: &Path,
        new_status: &str,
    ) -> Result<ExitGateResult, ExitGateError> {
        let stage_id = worker.stage_id.as_str();

        if worker.status_before == new_status {
            debug!(stage_id, status = new_status, "Status unchanged, skipping exit gate");
            return Ok(ExitGateResult {
                status_changed: false,
                status_before: worker.status_before.clone(),
                status_after: new_status.to_string(),
                ticket_updated: false,
                epic_updated: false,
                sync_result: None,
            });
        }

        // Stage
        let mut stage = self.store.read(RecordKind::Stage, stage_id).await?;
        stage.set_str(keys::STATUS, new_status);
        self.store.write(RecordKind::Stage, stage_id, &stage).await?;

        let ticket_id = stage
            .get_str(keys::TICKET)
            .map(str::to_string)
            .ok_or_else(|| ExitGateError::MissingParent {
                stage_id: stage_id.to_string(),
                field: keys::TICKET,
            })?;

        // Ticket
        let mut ticket = self.store.read(RecordKind::Ticket, &ticket_id).await?;
        let mut stage_statuses = mapping_field(&ticket, keys::STAGE_STATUSES);
        let entry_changed = mapping_entry(&stage_statuses, stage_id) != Some(new_status);
        stage_statuses.insert(
            Value::String(stage_id.to_string()),
            Value::String(new_status.to_string()),
        );
        let ticket_status = derive_ticket_status(stage_statuses.values().filter_map(Value::as_str));
        let ticket_updated = entry_changed || ticket.get_str(keys::STATUS) != Some(ticket_status);

        if ticket_updated {
            ticket.set(keys::STAGE_STATUSES, Value::Mapping(stage_statuses));
            ticket.set_str(keys::STATUS, ticket_status);
            self.store.write(RecordKind::Ticket, &ticket_id, &ticket).await?;
        }

        let epic_id = stage
            .get_str(keys::EPIC)
            .or_else(|| ticket.get_str(keys::EPIC))
            .map(str::to_string)
            .ok_or_else(|| ExitGateError::MissingParent {
                stage_id: stage_id.to_string(),
                field: keys::EPIC,
            })?;

        // Epic
        let mut epic = self.store.read(RecordKind::Epic, &epic_id).await?;
        let mut ticket_statuses = mapping_field(&epic, keys::TICKET_STATUSES);
        let epic_updated = mapping_entry(&ticket_statuses, &ticket_id) != Some(ticket_status);

        if epic_updated {
            ticket_statuses.insert(
                Value::String(ticket_id.clone()),
                Value::String(ticket_status.to_string()),
            );
            epic.set(keys::TICKET_STATUSES, Value::Mapping(ticket_statuses));
            self.store.write(RecordKind::Epic, &epic_id, &epic).await?;
        }

        let sync_result = self.sync.resync(repo_root).await;
        if !sync_result.success {
            warn!(
                stage_id,
                error = sync_result.error.as_deref().unwrap_or(""),
                "Resync failed after exit gate; hierarchy writes kept"
            );
        }

        info!(
            stage_id,
            ticket_id = %ticket_id,
            epic_id = %epic_id,
            from = %worker.status_before,
            to = new_status,
            ticket_status,
            ticket_updated,
            epic_updated,
            "Exit gate applied"
        );

        Ok(ExitGateResult {
            status_changed: true,
            status_before: worker.status_before.clone(),
            status_after: new_status.to_string(),
            ticket_updated,
            epic_updated,
            sync_result: Some(sync_result),
        })
    }
}
