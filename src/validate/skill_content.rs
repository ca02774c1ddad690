//! Advisory check that each skill's text names its phase's transition targets.
//!
//! Everything this layer finds is a warning. A skill that never mentions where
//! to go next still runs; the agent just has less guidance.

use anyhow::Result;
use async_trait::async_trait;

use super::ValidationReport;
use crate::pipeline::PipelineConfig;

/// Source of skill instruction text.
pub trait SkillReader: Send + Sync {
    /// `Ok(None)` when the skill does not exist.
    fn read_skill(&self, name: &str) -> Result<Option<String>>;
}

/// Decides which transition targets a skill's text fails to mention.
#[async_trait]
pub trait SkillContentAnalyzer: Send + Sync {
    async fn missing_targets(&self, content: &str, targets: &[String]) -> Result<Vec<String>>;
}

/// Plain substring search, case-sensitive.
pub struct SubstringAnalyzer;

#[async_trait]
impl SkillContentAnalyzer for SubstringAnalyzer {
    async fn missing_targets(&self, content: &str, targets: &[String]) -> Result<Vec<String>> {
        Ok(targets
            .iter()
            .filter(|t| !content.contains(t.as_str()))
            .cloned()
            .collect())
    }
}

pub async fn validate(
    config: &PipelineConfig,
    reader: &dyn SkillReader,
    analyzer: &dyn SkillContentAnalyzer,
) -> ValidationReport {
    let mut report = ValidationReport::new();

    for phase in &config.phases {
        let Some(skill) = phase.skill_name() else {
            continue;
        };

        let content = match reader.read_skill(skill) {
            Ok(Some(content)) => content,
            Ok(None) => {
                report.warning(format!(
                    "Skill '{}' for phase '{}' not found",
                    skill, phase.name
                ));
                continue;
            }
            Err(e) => {
                report.warning(format!(
                    "Failed to read skill '{}' for phase '{}': {:#}",
                    skill, phase.name, e
                ));
                continue;
            }
        };

        match analyzer.missing_targets(&content, &phase.transitions_to).await {
            Ok(missing) => {
                for target in missing {
                    report.warning(format!(
                        "Skill '{}' for phase '{}' does not mention transition target '{}'",
                        skill, phase.name, target
                    ));
                }
            }
            Err(e) => {
                report.warning(format!(
                    "Could not analyze skill '{}' for phase '{}': {:#}",
                    skill, phase.name, e
                ));
            }
        }
    }

    report
}
