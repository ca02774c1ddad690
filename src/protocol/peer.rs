//! Bidirectional control channel over one agent subprocess's stdio.
//!
//! The read loop runs on its own task. Lines that are not protocol records are
//! dropped and counted; the agent interleaves diagnostic output with them.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::messages::{
    ControlRequestBody, ControlResponseBody, InboundControlRequest, InboundMessage,
    OutboundMessage, PermissionDecision, ResultMessage, UserMessage,
};
use crate::errors::ProtocolError;

/// Callbacks for the inbound messages this layer understands.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// A tool-permission request. Returning a decision makes the peer answer
    /// it; returning `None` leaves the answer to the caller.
    async fn on_control_request(
        &self,
        request_id: &str,
        request: &InboundControlRequest,
    ) -> Option<PermissionDecision>;

    async fn on_cancel_request(&self, _request_id: &str) {}

    async fn on_result(&self, _result: &ResultMessage) {}
}

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

pub struct ProtocolPeer {
    writer: SharedWriter,
    cancel: CancellationToken,
    read_task: Mutex<Option<JoinHandle<Result<(), ProtocolError>>>>,
    dropped: Arc<AtomicU64>,
}

impl ProtocolPeer {
    /// Start the read loop over `reader` and use `writer` for outbound records.
    pub fn new<R, W>(reader: R, writer: W, handler: Arc<dyn ProtocolHandler>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: SharedWriter = Arc::new(Mutex::new(Box::new(writer)));
        let cancel = CancellationToken::new();
        let dropped = Arc::new(AtomicU64::new(0));

        let read_task = tokio::spawn(read_loop(
            reader,
            handler,
            writer.clone(),
            cancel.clone(),
            dropped.clone(),
        ));

        Self {
            writer,
            cancel,
            read_task: Mutex::new(Some(read_task)),
            dropped,
        }
    }

    /// Lines discarded because they did not decode as a protocol record.
    pub fn dropped_lines(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop the read loop. The subprocess itself is left running.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }

    /// Wait for the read loop to finish. Cancellation via `destroy` counts as
    /// a clean close; read failures and panics are returned.
    pub async fn wait_for_close(&self) -> Result<(), ProtocolError> {
        let Some(handle) = self.read_task.lock().await.take() else {
            return Ok(());
        };
        match handle.await {
            Ok(Ok(())) | Ok(Err(ProtocolError::Cancelled)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(ProtocolError::ReadLoopPanicked(e.to_string())),
        }
    }

    pub async fn send(&self, message: &OutboundMessage) -> Result<(), ProtocolError> {
        write_message(&self.writer, message).await
    }

    pub async fn send_user_message(
        &self,
        content: impl Into<Value>,
        session_id: &str,
    ) -> Result<(), ProtocolError> {
        self.send(&OutboundMessage::User {
            message: UserMessage {
                role: "user".to_string(),
                content: content.into(),
            },
            parent_tool_use_id: None,
            session_id: session_id.to_string(),
        })
        .await
    }

    /// Returns the generated request id.
    pub async fn interrupt(&self) -> Result<String, ProtocolError> {
        self.control_request(ControlRequestBody::Interrupt).await
    }

    pub async fn initialize(&self) -> Result<String, ProtocolError> {
        self.control_request(ControlRequestBody::Initialize).await
    }

    pub async fn set_permission_mode(&self, mode: &str) -> Result<String, ProtocolError> {
        self.control_request(ControlRequestBody::SetPermissionMode {
            mode: mode.to_string(),
        })
        .await
    }

    pub async fn send_permission_response(
        &self,
        request_id: &str,
        decision: PermissionDecision,
    ) -> Result<(), ProtocolError> {
        write_message(&self.writer, &permission_response(request_id, decision)).await
    }

    async fn control_request(&self, request: ControlRequestBody) -> Result<String, ProtocolError> {
        let request_id = new_request_id();
        self.send(&OutboundMessage::ControlRequest {
            request_id: request_id.clone(),
            request,
        })
        .await?;
        Ok(request_id)
    }
}

impl Drop for ProtocolPeer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn new_request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

fn permission_response(request_id: &str, decision: PermissionDecision) -> OutboundMessage {
    OutboundMessage::ControlResponse {
        response: ControlResponseBody {
            subtype: "success".to_string(),
            request_id: request_id.to_string(),
            response: decision,
        },
    }
}

async fn write_message(
    writer: &SharedWriter,
    message: &OutboundMessage,
) -> Result<(), ProtocolError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');

    let mut writer = writer.lock().await;
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(ProtocolError::Write)?;
    writer.flush().await.map_err(ProtocolError::Write)
}

async fn read_loop<R>(
    reader: R,
    handler: Arc<dyn ProtocolHandler>,
    writer: SharedWriter,
    cancel: CancellationToken,
    dropped: Arc<AtomicU64>,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Send + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            _ = cancel.cancelled() => return Err(ProtocolError::Cancelled),
            read = reader.read_until(b'\n', &mut buf) => read.map_err(ProtocolError::Read)?,
        };

        if read == 0 {
            debug!("Agent output closed");
            return Ok(());
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                trace!(error = %e, len = buf.len(), "Dropping non-UTF-8 line");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<InboundMessage>(line) {
            Ok(message) => message,
            Err(e) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                trace!(error = %e, line, "Dropping non-protocol line");
                continue;
            }
        };

        match message {
            InboundMessage::ControlRequest {
                request_id,
                request,
            } => {
                debug!(
                    request_id = %request_id,
                    subtype = %request.subtype,
                    tool = request.tool_name.as_deref().unwrap_or(""),
                    "Control request from agent"
                );
                if let Some(decision) = handler.on_control_request(&request_id, &request).await {
                    write_message(&writer, &permission_response(&request_id, decision)).await?;
                }
            }
            InboundMessage::ControlCancelRequest { request_id } => {
                debug!(request_id = %request_id, "Agent cancelled control request");
                handler.on_cancel_request(&request_id).await;
            }
            InboundMessage::Result(result) => {
                if result.is_error {
                    warn!(subtype = %result.subtype, "Agent finished with error");
                } else {
                    debug!(subtype = %result.subtype, "Agent finished");
                }
                handler.on_result(&result).await;
            }
            InboundMessage::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

    #[derive(Default)]
    struct RecordingHandler {
        calls: StdMutex<Vec<String>>,
        allow: bool,
    }

    impl RecordingHandler {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProtocolHandler for RecordingHandler {
        async fn on_control_request(
            &self,
            request_id: &str,
            request: &InboundControlRequest,
        ) -> Option<PermissionDecision> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("control_request:{}", request_id));
            self.allow.then(|| PermissionDecision::Allow {
                updated_input: request.input.clone(),
            })
        }

        async fn on_cancel_request(&self, request_id: &str) {
            self.calls.lock().unwrap().push(format!("cancel:{}", request_id));
        }

        async fn on_result(&self, result: &ResultMessage) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("result:{}", result.subtype));
        }
    }

    struct Harness {
        peer: ProtocolPeer,
        handler: Arc<RecordingHandler>,
        agent_stdout: DuplexStream,
        agent_stdin: tokio::io::Lines<BufReader<DuplexStream>>,
    }

    fn harness(allow: bool) -> Harness {
        let (peer_reader, agent_stdout) = duplex(4096);
        let (peer_writer, agent_stdin) = duplex(4096);
        let handler = Arc::new(RecordingHandler {
            allow,
            ..Default::default()
        });
        let peer = ProtocolPeer::new(peer_reader, peer_writer, handler.clone());
        Harness {
            peer,
            handler,
            agent_stdout,
            agent_stdin: BufReader::new(agent_stdin).lines(),
        }
    }

    #[tokio::test]
    async fn test_malformed_line_then_result() {
        let mut h = harness(false);
        h.agent_stdout
            .write_all(
                b"not json at all\n{\"type\":\"result\",\"subtype\":\"success\",\"is_error\":false}\n",
            )
            .await
            .unwrap();
        drop(h.agent_stdout);

        h.peer.wait_for_close().await.unwrap();
        assert_eq!(h.handler.calls(), vec!["result:success"]);
        assert_eq!(h.peer.dropped_lines(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_then_result() {
        let mut h = harness(false);
        h.agent_stdout
            .write_all(
                b"diag \xff\xfe bytes\n{\"type\":\"result\",\"subtype\":\"success\",\"is_error\":false}\n",
            )
            .await
            .unwrap();
        drop(h.agent_stdout);

        h.peer.wait_for_close().await.unwrap();
        assert_eq!(h.handler.calls(), vec!["result:success"]);
        assert_eq!(h.peer.dropped_lines(), 1);
    }

    #[tokio::test]
    async fn test_streaming_content_is_ignored_not_dropped() {
        let mut h = harness(false);
        h.agent_stdout
            .write_all(b"{\"type\":\"assistant\",\"message\":{\"content\":[]}}\n\n")
            .await
            .unwrap();
        drop(h.agent_stdout);

        h.peer.wait_for_close().await.unwrap();
        assert!(h.handler.calls().is_empty());
        assert_eq!(h.peer.dropped_lines(), 0);
    }

    #[tokio::test]
    async fn test_control_request_is_answered() {
        let mut h = harness(true);
        h.agent_stdout
            .write_all(
                b"{\"type\":\"control_request\",\"request_id\":\"r1\",\"request\":{\"subtype\":\"can_use_tool\",\"tool_name\":\"Bash\",\"input\":{\"command\":\"ls\"}}}\n",
            )
            .await
            .unwrap();

        let line = h.agent_stdin.next_line().await.unwrap().unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            response,
            json!({
                "type": "control_response",
                "response": {
                    "subtype": "success",
                    "request_id": "r1",
                    "response": {"behavior": "allow", "updatedInput": {"command": "ls"}}
                }
            })
        );
        assert_eq!(h.handler.calls(), vec!["control_request:r1"]);
    }

    #[tokio::test]
    async fn test_cancel_request_dispatch() {
        let mut h = harness(false);
        h.agent_stdout
            .write_all(b"{\"type\":\"control_cancel_request\",\"request_id\":\"r9\"}\n")
            .await
            .unwrap();
        drop(h.agent_stdout);

        h.peer.wait_for_close().await.unwrap();
        assert_eq!(h.handler.calls(), vec!["cancel:r9"]);
    }

    #[tokio::test]
    async fn test_destroy_is_clean_close() {
        let h = harness(false);
        h.peer.destroy();
        h.peer.wait_for_close().await.unwrap();
        // Second wait has nothing left to join.
        h.peer.wait_for_close().await.unwrap();
        drop(h.agent_stdout);
    }

    #[tokio::test]
    async fn test_outbound_control_requests_get_unique_ids() {
        let mut h = harness(false);
        let first = h.peer.interrupt().await.unwrap();
        let second = h.peer.set_permission_mode("acceptEdits").await.unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("req_"));

        let line = h.agent_stdin.next_line().await.unwrap().unwrap();
        let msg: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(msg["type"], "control_request");
        assert_eq!(msg["request_id"], first.as_str());
        assert_eq!(msg["request"]["subtype"], "interrupt");

        let line = h.agent_stdin.next_line().await.unwrap().unwrap();
        let msg: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(msg["request"]["mode"], "acceptEdits");
    }

    #[tokio::test]
    async fn test_send_user_message_and_deny() {
        let mut h = harness(false);
        h.peer.send_user_message("fix the tests", "sess-1").await.unwrap();
        h.peer
            .send_permission_response(
                "r2",
                PermissionDecision::Deny {
                    message: "no network".to_string(),
                },
            )
            .await
            .unwrap();

        let line = h.agent_stdin.next_line().await.unwrap().unwrap();
        let msg: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(msg["type"], "user");
        assert_eq!(msg["message"]["content"], "fix the tests");
        assert_eq!(msg["session_id"], "sess-1");

        let line = h.agent_stdin.next_line().await.unwrap().unwrap();
        let msg: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(msg["response"]["request_id"], "r2");
        assert_eq!(msg["response"]["response"]["behavior"], "deny");
    }
}
