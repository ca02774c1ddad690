//! Review comment poller.
//!
//! Each cycle looks at every stage waiting on code review and turns what the
//! code host reports into pipeline transitions:
//!
//! - merged → the done status, whatever the comment count
//! - first observation → record a baseline, no transition
//! - more unresolved threads than the baseline → the feedback status
//! - same or fewer → refresh the baseline only
//!
//! One stage failing never stops the rest of the cycle.

pub mod tracking;

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{KanbanConfig, PollerSection};
use crate::exit_gate::{ExitGateResult, ExitGateRunner, WorkerInfo, sync_runner};
use crate::review::{CodeHostAdapter, adapter_from_config};
use crate::store::{FrontmatterStore, PendingStage, PendingStageSource};

pub use tracking::{
    CommentTrackingStore, JsonTrackingStore, MemoryTrackingStore, MrCommentTracking,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollAction {
    Merged,
    FirstPoll,
    NewComments,
    NoChange,
    Error,
}

impl std::fmt::Display for PollAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PollAction::Merged => "merged",
            PollAction::FirstPoll => "first_poll",
            PollAction::NewComments => "new_comments",
            PollAction::NoChange => "no_change",
            PollAction::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// What happened to one stage during a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    pub stage_id: String,
    pub action: PollAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unresolved_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<ExitGateResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollOutcome {
    fn new(stage_id: &str, action: PollAction, unresolved: u32) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            action,
            unresolved_count: Some(unresolved),
            transition: None,
            error: None,
        }
    }

    fn failed(stage_id: &str, error: &anyhow::Error) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            action: PollAction::Error,
            unresolved_count: None,
            transition: None,
            error: Some(format!("{:#}", error)),
        }
    }
}

pub struct MrCommentPoller {
    stages: Arc<dyn PendingStageSource>,
    tracking: Arc<dyn CommentTrackingStore>,
    exit_gate: Arc<ExitGateRunner>,
    code_host: Option<Arc<dyn CodeHostAdapter>>,
    settings: PollerSection,
}

impl MrCommentPoller {
    pub fn new(
        stages: Arc<dyn PendingStageSource>,
        tracking: Arc<dyn CommentTrackingStore>,
        exit_gate: Arc<ExitGateRunner>,
        code_host: Option<Arc<dyn CodeHostAdapter>>,
        settings: PollerSection,
    ) -> Self {
        Self {
            stages,
            tracking,
            exit_gate,
            code_host,
            settings,
        }
    }

    /// Wire the poller to a repository's record files, tracking file, resync
    /// command and code host.
    pub fn from_config(config: &KanbanConfig) -> Self {
        let store = Arc::new(FrontmatterStore::new(&config.repo_root));
        let exit_gate = Arc::new(ExitGateRunner::new(
            store.clone(),
            sync_runner(config.sync_command()),
        ));
        Self::new(
            store,
            Arc::new(JsonTrackingStore::new(config.tracking_path())),
            exit_gate,
            adapter_from_config(&config.toml.code_host),
            config.toml.poller.clone(),
        )
    }

    pub async fn poll_cycle(&self, repo_root: &Path) -> Vec<PollOutcome> {
        let Some(adapter) = self.code_host.as_ref() else {
            info!(repo = %repo_root.display(), "No code host configured, skipping poll");
            return Vec::new();
        };

        let pending = match self
            .stages
            .stages_with_status(&self.settings.review_status)
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                error!(
                    error = %e,
                    status = %self.settings.review_status,
                    "Failed to query pending stages"
                );
                return Vec::new();
            }
        };

        if pending.len() > self.settings.max_stages_per_cycle {
            info!(
                pending = pending.len(),
                limit = self.settings.max_stages_per_cycle,
                "More review stages than the per-cycle limit, polling the first ones"
            );
        }

        let mut outcomes = Vec::new();
        for stage in pending.iter().take(self.settings.max_stages_per_cycle) {
            let Some(url) = stage.pr_url.as_deref() else {
                warn!(stage_id = %stage.id, "Stage awaiting review has no PR URL, skipping");
                continue;
            };

            let outcome = match self.poll_stage(adapter.as_ref(), stage, url, repo_root).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(stage_id = %stage.id, error = %e, "Poll failed for stage");
                    PollOutcome::failed(&stage.id, &e)
                }
            };
            debug!(stage_id = %stage.id, action = %outcome.action, "Polled stage");
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn poll_stage(
        &self,
        adapter: &dyn CodeHostAdapter,
        stage: &PendingStage,
        url: &str,
        repo_root: &Path,
    ) -> Result<PollOutcome> {
        let status = adapter.get_status(url).await?;
        let unresolved = status.unresolved_thread_count;
        let row = MrCommentTracking::now(&stage.id, unresolved);

        if status.merged {
            let transition = self
                .transition(stage, &self.settings.done_status, repo_root)
                .await?;
            self.tracking.upsert(row).await?;
            info!(stage_id = %stage.id, "PR merged, stage done");
            return Ok(PollOutcome {
                transition: Some(transition),
                ..PollOutcome::new(&stage.id, PollAction::Merged, unresolved)
            });
        }

        let Some(previous) = self.tracking.get(&stage.id).await? else {
            self.tracking.upsert(row).await?;
            debug!(stage_id = %stage.id, unresolved, "Recorded review baseline");
            return Ok(PollOutcome::new(&stage.id, PollAction::FirstPoll, unresolved));
        };

        if unresolved > previous.last_known_unresolved_count {
            let transition = self
                .transition(stage, &self.settings.feedback_status, repo_root)
                .await?;
            self.tracking.upsert(row).await?;
            info!(
                stage_id = %stage.id,
                before = previous.last_known_unresolved_count,
                after = unresolved,
                "New review comments"
            );
            return Ok(PollOutcome {
                transition: Some(transition),
                ..PollOutcome::new(&stage.id, PollAction::NewComments, unresolved)
            });
        }

        self.tracking.upsert(row).await?;
        Ok(PollOutcome::new(&stage.id, PollAction::NoChange, unresolved))
    }

    async fn transition(
        &self,
        stage: &PendingStage,
        new_status: &str,
        repo_root: &Path,
    ) -> Result<ExitGateResult> {
        let worker = WorkerInfo::synthetic(&stage.id, &stage.file, &stage.status);
        Ok(self.exit_gate.run(&worker, repo_root, new_status).await?)
    }

    /// Run a cycle every `period` until `cancel` fires. The first cycle runs
    /// immediately.
    pub async fn run_periodic<F>(
        &self,
        repo_root: &Path,
        period: Duration,
        cancel: CancellationToken,
        mut on_cycle: F,
    ) where
        F: FnMut(&[PollOutcome]),
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Poller stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let outcomes = self.poll_cycle(repo_root).await;
            info!(stages = outcomes.len(), "Poll cycle complete");
            on_cycle(&outcomes);
        }
    }
}
