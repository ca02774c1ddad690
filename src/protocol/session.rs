use anyhow::{Context, Result};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::peer::{ProtocolHandler, ProtocolPeer};

/// Flags that put the agent CLI into stream-json mode with permission
/// prompts routed over stdio.
pub const STREAM_JSON_FLAGS: &[&str] = &[
    "-p",
    "--input-format",
    "stream-json",
    "--output-format",
    "stream-json",
    "--verbose",
    "--permission-prompt-tool",
    "stdio",
];

/// One agent subprocess wired to a [`ProtocolPeer`].
pub struct AgentSession {
    child: Child,
    peer: ProtocolPeer,
}

impl AgentSession {
    pub fn spawn(
        claude_cmd: &str,
        working_dir: &Path,
        handler: Arc<dyn ProtocolHandler>,
    ) -> Result<Self> {
        let mut child = Command::new(claude_cmd)
            .args(STREAM_JSON_FLAGS)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn agent process '{}'", claude_cmd))?;

        let stdin = child.stdin.take().context("Failed to get agent stdin")?;
        let stdout = child.stdout.take().context("Failed to get agent stdout")?;

        info!(
            pid = child.id().unwrap_or(0),
            cmd = claude_cmd,
            dir = %working_dir.display(),
            "Agent session started"
        );

        Ok(Self {
            child,
            peer: ProtocolPeer::new(stdout, stdin, handler),
        })
    }

    pub fn peer(&self) -> &ProtocolPeer {
        &self.peer
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the agent to close its output and exit on its own.
    pub async fn wait(mut self) -> Result<ExitStatus> {
        self.peer.wait_for_close().await?;
        let status = self
            .child
            .wait()
            .await
            .context("Failed to wait for agent process")?;
        debug!(code = status.code().unwrap_or(-1), "Agent process exited");
        Ok(status)
    }

    /// Stop reading, then kill the subprocess.
    pub async fn shutdown(mut self) -> Result<()> {
        self.peer.destroy();
        let closed = self.peer.wait_for_close().await;

        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "Agent process already gone");
        }
        info!(dropped_lines = self.peer.dropped_lines(), "Agent session shut down");

        closed.map_err(Into::into)
    }
}
