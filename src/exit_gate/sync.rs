//! Re-synchronization collaborator invoked after every hierarchy update.

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

/// Outcome of one resync call. Failures are reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Rebuilds derived state (indexes, databases) from the record files.
/// Idempotent and safe to call redundantly.
#[async_trait]
pub trait SyncRunner: Send + Sync {
    async fn resync(&self, repo_root: &Path) -> SyncResult;
}

/// Resync that does nothing and always succeeds.
pub struct NoopSync;

#[async_trait]
impl SyncRunner for NoopSync {
    async fn resync(&self, _repo_root: &Path) -> SyncResult {
        SyncResult::ok()
    }
}

/// Resync by running a shell command in the repository root.
pub struct CommandSync {
    command: String,
}

impl CommandSync {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

/// `CommandSync` for a configured command, `NoopSync` otherwise.
pub fn sync_runner(command: Option<String>) -> Arc<dyn SyncRunner> {
    match command {
        Some(command) => Arc::new(CommandSync::new(command)),
        None => Arc::new(NoopSync),
    }
}

#[async_trait]
impl SyncRunner for CommandSync {
    async fn resync(&self, repo_root: &Path) -> SyncResult {
        debug!(command = %self.command, repo = %repo_root.display(), "Running resync");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => SyncResult::ok(),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let message = if stderr.is_empty() {
                    format!("resync command exited with {}", output.status)
                } else {
                    stderr
                };
                warn!(command = %self.command, error = %message, "Resync failed");
                SyncResult::failed(message)
            }
            Err(e) => {
                warn!(command = %self.command, error = %e, "Failed to spawn resync command");
                SyncResult::failed(format!("Failed to spawn resync command: {}", e))
            }
        }
    }
}
