//! Pipeline validation.
//!
//! Four independent layers, each producing a [`ValidationReport`]:
//!
//! - [`structural`]: entry phase, transition targets, unique names and statuses
//! - [`graph`]: every phase reachable from the entry and able to reach `Done`
//! - [`skill_content`]: skill text mentions each transition target (warnings only)
//! - [`resolver`]: resolver phases name registered resolvers, optionally dry-run
//!
//! A report with no errors means the pipeline is safe to execute.

pub mod graph;
pub mod resolver;
pub mod skill_content;
pub mod structural;

use serde::Serialize;
use std::sync::Arc;

use crate::errors::PipelineError;
use crate::pipeline::PipelineConfig;
use crate::resolvers::ResolverRegistry;

pub use skill_content::{SkillContentAnalyzer, SkillReader, SubstringAnalyzer};

/// Findings from one or more validator layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn a report with errors into `PipelineError::ValidationFailed`.
    pub fn into_result(self) -> Result<Vec<String>, PipelineError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(PipelineError::ValidationFailed {
                errors: self.errors,
            })
        }
    }
}

/// Runs all four layers against a pipeline.
pub struct PipelineValidator {
    registry: ResolverRegistry,
    skill_reader: Arc<dyn SkillReader>,
    analyzer: Arc<dyn SkillContentAnalyzer>,
    dry_run: bool,
}

impl PipelineValidator {
    pub fn new(registry: ResolverRegistry, skill_reader: Arc<dyn SkillReader>) -> Self {
        Self {
            registry,
            skill_reader,
            analyzer: Arc::new(SubstringAnalyzer),
            dry_run: false,
        }
    }

    /// Replace the default substring analyzer.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn SkillContentAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Invoke each resolver with synthetic data during validation.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn validate(&self, config: &PipelineConfig) -> ValidationReport {
        let mut report = structural::validate(config);
        report.merge(graph::validate(config));
        report.merge(
            skill_content::validate(config, self.skill_reader.as_ref(), self.analyzer.as_ref())
                .await,
        );
        report.merge(resolver::validate(config, &self.registry, self.dry_run).await);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Phase, default_pipeline};
    use anyhow::Result;
    use std::collections::HashMap;

    struct MapReader(HashMap<String, String>);

    impl SkillReader for MapReader {
        fn read_skill(&self, name: &str) -> Result<Option<String>> {
            Ok(self.0.get(name).cloned())
        }
    }

    fn reader_for(config: &PipelineConfig) -> Arc<dyn SkillReader> {
        let skills = config
            .phases
            .iter()
            .filter_map(|p| {
                p.skill_name()
                    .map(|s| (s.to_string(), p.transitions_to.join(", ")))
            })
            .collect();
        Arc::new(MapReader(skills))
    }

    #[tokio::test]
    async fn test_default_pipeline_is_clean() {
        let config = default_pipeline();
        let validator =
            PipelineValidator::new(ResolverRegistry::with_builtins(), reader_for(&config));
        let report = validator.validate(&config).await;
        assert!(report.is_ok(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
    }

    #[tokio::test]
    async fn test_layers_are_combined() {
        let config = PipelineConfig::new(
            "A",
            vec![
                Phase::skill("A", "a", "A", &["B"]),
                Phase::resolver("B", "missing-resolver", "B", &["A"]),
            ],
        );
        let validator = PipelineValidator::new(
            ResolverRegistry::with_builtins(),
            Arc::new(MapReader(HashMap::new())),
        );
        let report = validator.validate(&config).await;

        assert!(report.errors.iter().any(|e| e.contains("cannot reach Done")));
        assert!(report.errors.iter().any(|e| e.contains("missing-resolver")));
        assert!(report.warnings.iter().any(|w| w.contains("not found")));
    }

    #[test]
    fn test_into_result_itemizes_errors() {
        let mut report = ValidationReport::new();
        report.error("first");
        report.error("second");
        report.warning("ignored");

        let err = report.into_result().unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("2 error(s)"));
        assert!(rendered.contains("1: first"));
        assert!(rendered.contains("2: second"));
    }

    #[test]
    fn test_into_result_returns_warnings() {
        let mut report = ValidationReport::new();
        report.warning("heads up");
        assert_eq!(report.into_result().unwrap(), vec!["heads up"]);
    }
}
