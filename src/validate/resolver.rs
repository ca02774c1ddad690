use serde_yaml::Mapping;

use super::ValidationReport;
use crate::pipeline::PipelineConfig;
use crate::resolvers::{ResolverContext, ResolverRegistry, ResolverStage};

const DRY_RUN_STAGE_ID: &str = "STAGE-DRY-RUN";

/// Resolver phases must name a registered resolver. With `dry_run`, each
/// resolver is also called once with a synthetic stage.
pub async fn validate(
    config: &PipelineConfig,
    registry: &ResolverRegistry,
    dry_run: bool,
) -> ValidationReport {
    let mut report = ValidationReport::new();

    for phase in &config.phases {
        let Some(name) = phase.resolver_name() else {
            continue;
        };

        let Some(resolver) = registry.get(name) else {
            report.error(format!(
                "Resolver '{}' for phase '{}' is not registered",
                name, phase.name
            ));
            continue;
        };

        if !dry_run {
            continue;
        }

        let stage = ResolverStage {
            id: DRY_RUN_STAGE_ID.to_string(),
            status: phase.status.clone(),
            pr_url: None,
            fields: Mapping::new(),
        };
        let ctx = ResolverContext::default();

        match resolver.resolve(&stage, &ctx).await {
            Ok(None) => {}
            Ok(Some(next)) if phase.can_transition_to(&next) => {}
            Ok(Some(next)) => report.warning(format!(
                "Resolver '{}' for phase '{}' returned '{}', which is not a declared transition",
                name, phase.name, next
            )),
            Err(e) => report.error(format!(
                "Resolver '{}' for phase '{}' failed during dry run: {:#}",
                name, phase.name, e
            )),
        }
    }

    report
}
