//! Control-message envelopes for the agent's stream-json channel.
//!
//! One JSON object per line in each direction, discriminated by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages written to the agent's stdin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    User {
        message: UserMessage,
        parent_tool_use_id: Option<String>,
        session_id: String,
    },
    ControlRequest {
        request_id: String,
        request: ControlRequestBody,
    },
    ControlResponse {
        response: ControlResponseBody,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMessage {
    pub role: String,
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ControlRequestBody {
    Interrupt,
    Initialize,
    SetPermissionMode { mode: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlResponseBody {
    pub subtype: String,
    pub request_id: String,
    pub response: PermissionDecision,
}

/// Answer to a tool-permission request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "lowercase")]
pub enum PermissionDecision {
    Allow {
        #[serde(rename = "updatedInput")]
        updated_input: Value,
    },
    Deny {
        message: String,
    },
}

/// Messages read from the agent's stdout that this layer acts on.
///
/// Streaming content (`assistant`, `user`, `system`, ...) decodes to `Other`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    ControlRequest {
        request_id: String,
        request: InboundControlRequest,
    },
    ControlCancelRequest {
        request_id: String,
    },
    Result(ResultMessage),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundControlRequest {
    pub subtype: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub input: Value,
}

/// Terminal message of an agent run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultMessage {
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub num_turns: Option<u32>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
}
