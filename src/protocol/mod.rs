//! Driving an agent subprocess over its stream-json control protocol.

pub mod messages;
pub mod peer;
pub mod session;

pub use messages::{InboundControlRequest, OutboundMessage, PermissionDecision, ResultMessage};
pub use peer::{ProtocolHandler, ProtocolPeer};
pub use session::AgentSession;
