//! Declarative pipeline definition.
//!
//! - `model`: phases, the skill/resolver split, YAML loading
//! - `state_machine`: read-only lookups over a loaded pipeline

pub mod model;
pub mod state_machine;

pub use model::{DONE_TARGET, Phase, PhaseKind, PipelineConfig, default_pipeline};
pub use state_machine::PipelineStateMachine;
