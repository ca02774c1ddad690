//! Typed error hierarchy for the pipeline engine.
//!
//! One enum per subsystem:
//! - `PipelineError`: loading and validating a pipeline definition
//! - `LockError`: stage lock and status precondition failures
//! - `ExitGateError`: status propagation through the work-item hierarchy
//! - `ProtocolError`: the agent control channel

use thiserror::Error;

/// Errors from loading or validating a pipeline definition.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to read pipeline file at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse pipeline YAML: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("Phase '{name}' is malformed: {message}")]
    InvalidPhase { name: String, message: String },

    #[error("{}", format_itemized("Pipeline validation failed", errors))]
    ValidationFailed { errors: Vec<String> },
}

fn format_itemized(header: &str, items: &[String]) -> String {
    let mut out = format!("{} with {} error(s):", header, items.len());
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("\n  {}: {}", i + 1, item));
    }
    out
}

/// Errors from the stage lock and stage status reads.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Stage {stage_id} is already locked")]
    AlreadyLocked { stage_id: String },

    #[error("Stage {stage_id} is missing status field")]
    MissingStatus { stage_id: String },

    #[error("Stage {stage_id} has invalid status type: expected string, found {found}")]
    InvalidStatusType {
        stage_id: String,
        found: &'static str,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the exit gate runner.
#[derive(Debug, Error)]
pub enum ExitGateError {
    #[error("Stage {stage_id} has no '{field}' reference")]
    MissingParent {
        stage_id: String,
        field: &'static str,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the agent protocol peer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Protocol read loop cancelled")]
    Cancelled,

    #[error("Failed to read from agent stdout: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to write to agent stdin: {0}")]
    Write(#[source] std::io::Error),

    #[error("Failed to serialize control message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Protocol read loop panicked: {0}")]
    ReadLoopPanicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failed_lists_every_error() {
        let err = PipelineError::ValidationFailed {
            errors: vec![
                "Phase 'A' cannot reach Done".to_string(),
                "Phase 'B' cannot reach Done".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 error(s)"));
        assert!(msg.contains("1: Phase 'A'"));
        assert!(msg.contains("2: Phase 'B'"));
    }

    #[test]
    fn lock_error_invalid_status_type_names_type() {
        let err = LockError::InvalidStatusType {
            stage_id: "STAGE-001-001-001".into(),
            found: "number",
        };
        assert!(err.to_string().contains("number"));
        assert!(err.to_string().contains("STAGE-001-001-001"));
    }

    #[test]
    fn lock_error_converts_from_anyhow() {
        let err: LockError = anyhow::anyhow!("disk gone").into();
        assert!(matches!(err, LockError::Other(_)));
    }

    #[test]
    fn exit_gate_missing_parent_is_matchable() {
        let err = ExitGateError::MissingParent {
            stage_id: "STAGE-1".into(),
            field: "ticket",
        };
        match &err {
            ExitGateError::MissingParent { field, .. } => assert_eq!(*field, "ticket"),
            _ => panic!("Expected MissingParent"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&PipelineError::ValidationFailed { errors: vec![] });
        assert_std_error(&LockError::MissingStatus {
            stage_id: "x".into(),
        });
        assert_std_error(&ExitGateError::Other(anyhow::anyhow!("x")));
        assert_std_error(&ProtocolError::Cancelled);
    }
}
