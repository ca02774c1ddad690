//! Pipeline definition and YAML loading.
//!
//! A pipeline file looks like:
//!
//! ```yaml
//! workflow:
//!   entry_phase: Design
//!   phases:
//!     - name: Design
//!       skill: phase-design
//!       status: Design
//!       transitions_to: [Build]
//!     - name: Build
//!       skill: phase-build
//!       status: Build
//!       transitions_to: [PR Created]
//!     - name: PR Created
//!       resolver: pr-status
//!       status: PR Created
//!       transitions_to: [Done, Addressing Comments]
//! ```
//!
//! Loading checks only that each phase declares exactly one of `skill` or
//! `resolver`. Everything else is left to the validator layers so that an
//! unsound pipeline can still be loaded and diagnosed.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::PipelineError;

/// Reserved transition target meaning "the stage has finished the pipeline".
pub const DONE_TARGET: &str = "Done";

/// How a phase is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseKind {
    /// Run the agent instructions with this skill name.
    Skill(String),
    /// Call the registered resolver with this name to pick the next phase.
    Resolver(String),
}

/// One named state of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub name: String,
    /// Externally visible label stored on stage/ticket/epic records.
    pub status: String,
    /// Phase names (or `Done`) this phase may move to.
    pub transitions_to: Vec<String>,
    pub kind: PhaseKind,
}

impl Phase {
    pub fn skill(name: &str, skill: &str, status: &str, transitions_to: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            status: status.to_string(),
            transitions_to: transitions_to.iter().map(|s| s.to_string()).collect(),
            kind: PhaseKind::Skill(skill.to_string()),
        }
    }

    pub fn resolver(name: &str, resolver: &str, status: &str, transitions_to: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            status: status.to_string(),
            transitions_to: transitions_to.iter().map(|s| s.to_string()).collect(),
            kind: PhaseKind::Resolver(resolver.to_string()),
        }
    }

    pub fn skill_name(&self) -> Option<&str> {
        match &self.kind {
            PhaseKind::Skill(s) => Some(s),
            PhaseKind::Resolver(_) => None,
        }
    }

    pub fn resolver_name(&self) -> Option<&str> {
        match &self.kind {
            PhaseKind::Resolver(r) => Some(r),
            PhaseKind::Skill(_) => None,
        }
    }

    /// True if `target` is one of this phase's declared transitions.
    pub fn can_transition_to(&self, target: &str) -> bool {
        self.transitions_to.iter().any(|t| t == target)
    }
}

/// Phase as written in YAML, before the skill/resolver split is checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPhase {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resolver: Option<String>,
    status: String,
    #[serde(default)]
    transitions_to: Vec<String>,
}

impl TryFrom<RawPhase> for Phase {
    type Error = PipelineError;

    fn try_from(raw: RawPhase) -> Result<Self, Self::Error> {
        let kind = match (raw.skill, raw.resolver) {
            (Some(skill), None) => PhaseKind::Skill(skill),
            (None, Some(resolver)) => PhaseKind::Resolver(resolver),
            (Some(_), Some(_)) => {
                return Err(PipelineError::InvalidPhase {
                    name: raw.name,
                    message: "declares both 'skill' and 'resolver'".to_string(),
                });
            }
            (None, None) => {
                return Err(PipelineError::InvalidPhase {
                    name: raw.name,
                    message: "must declare either 'skill' or 'resolver'".to_string(),
                });
            }
        };
        Ok(Self {
            name: raw.name,
            status: raw.status,
            transitions_to: raw.transitions_to,
            kind,
        })
    }
}

impl From<&Phase> for RawPhase {
    fn from(phase: &Phase) -> Self {
        Self {
            name: phase.name.clone(),
            skill: phase.skill_name().map(str::to_string),
            resolver: phase.resolver_name().map(str::to_string),
            status: phase.status.clone(),
            transitions_to: phase.transitions_to.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RawWorkflow {
    entry_phase: String,
    #[serde(default)]
    phases: Vec<RawPhase>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawPipelineFile {
    workflow: RawWorkflow,
}

/// Entry phase plus the ordered list of phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub entry_phase: String,
    pub phases: Vec<Phase>,
}

impl PipelineConfig {
    pub fn new(entry_phase: &str, phases: Vec<Phase>) -> Self {
        Self {
            entry_phase: entry_phase.to_string(),
            phases,
        }
    }

    /// Load a pipeline from a YAML file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| PipelineError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&content)
    }

    /// Parse a pipeline from a YAML string.
    pub fn parse(content: &str) -> Result<Self, PipelineError> {
        let file: RawPipelineFile = serde_yaml::from_str(content).map_err(PipelineError::Parse)?;
        let phases = file
            .workflow
            .phases
            .into_iter()
            .map(Phase::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            entry_phase: file.workflow.entry_phase,
            phases,
        })
    }

    /// Serialize back to the YAML file format.
    pub fn to_yaml(&self) -> Result<String, PipelineError> {
        let file = RawPipelineFile {
            workflow: RawWorkflow {
                entry_phase: self.entry_phase.clone(),
                phases: self.phases.iter().map(RawPhase::from).collect(),
            },
        };
        serde_yaml::to_string(&file).map_err(PipelineError::Parse)
    }
}

/// Pipeline written by `kanban init`: design, build, then review with a
/// rework loop back through `Addressing Comments`.
pub fn default_pipeline() -> PipelineConfig {
    PipelineConfig::new(
        "Design",
        vec![
            Phase::skill("Design", "phase-design", "Design", &["Build"]),
            Phase::skill("Build", "phase-build", "Build", &["PR Created"]),
            Phase::resolver(
                "PR Created",
                "pr-status",
                "PR Created",
                &[DONE_TARGET, "Addressing Comments"],
            ),
            Phase::skill(
                "Addressing Comments",
                "review-cycle",
                "Addressing Comments",
                &["PR Created"],
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE_YAML: &str = r#"
workflow:
  entry_phase: Design
  phases:
    - name: Design
      skill: phase-design
      status: Design
      transitions_to: [Build]
    - name: Build
      skill: phase-build
      status: Build
      transitions_to: [PR Created]
    - name: PR Created
      resolver: pr-status
      status: PR Created
      transitions_to: [Done, Build]
"#;

    #[test]
    fn test_parse_pipeline() {
        let config = PipelineConfig::parse(PIPELINE_YAML).unwrap();
        assert_eq!(config.entry_phase, "Design");
        assert_eq!(config.phases.len(), 3);
        assert_eq!(config.phases[0].skill_name(), Some("phase-design"));
        assert_eq!(config.phases[2].resolver_name(), Some("pr-status"));
        assert!(config.phases[2].can_transition_to(DONE_TARGET));
    }

    #[test]
    fn test_phase_with_both_skill_and_resolver_rejected() {
        let yaml = r#"
workflow:
  entry_phase: A
  phases:
    - name: A
      skill: s
      resolver: r
      status: A
      transitions_to: [Done]
"#;
        let err = PipelineConfig::parse(yaml).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPhase { ref name, .. } if name == "A"));
    }

    #[test]
    fn test_phase_with_neither_rejected() {
        let yaml = r#"
workflow:
  entry_phase: A
  phases:
    - name: A
      status: A
      transitions_to: [Done]
"#;
        let err = PipelineConfig::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("either 'skill' or 'resolver'"));
    }

    #[test]
    fn test_invalid_pipeline_still_loads() {
        // Missing entry phase and dangling target are validator concerns, not parse errors.
        let yaml = r#"
workflow:
  entry_phase: Missing
  phases:
    - name: A
      skill: s
      status: A
      transitions_to: [Nowhere]
"#;
        let config = PipelineConfig::parse(yaml).unwrap();
        assert_eq!(config.entry_phase, "Missing");
    }

    #[test]
    fn test_yaml_round_trip_preserves_default_pipeline() {
        let config = default_pipeline();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(PipelineConfig::parse(&yaml).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load(Path::new("/nonexistent/pipeline.yaml")).unwrap_err();
        assert!(matches!(err, PipelineError::ReadFailed { .. }));
    }
}
