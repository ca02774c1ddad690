//! Pipeline validation (`kanban validate`).

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use super::super::Cli;

pub async fn cmd_validate(
    repo_root: &Path,
    cli: &Cli,
    pipeline: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    use kanban_engine::pipeline::PipelineConfig;
    use kanban_engine::resolvers::ResolverRegistry;
    use kanban_engine::skills::SkillsLoader;
    use kanban_engine::validate::PipelineValidator;

    let config = super::load_config(repo_root, cli)?;
    let pipeline_path = match pipeline {
        Some(path) => path.to_path_buf(),
        None => config.pipeline_path(),
    };

    let pipeline = PipelineConfig::load(&pipeline_path)?;
    let validator = PipelineValidator::new(
        ResolverRegistry::with_builtins(),
        Arc::new(SkillsLoader::new(config.skills_dir())),
    )
    .with_dry_run(dry_run);
    let report = validator.validate(&pipeline).await;

    println!();
    println!("Validating {}", pipeline_path.display());
    println!();

    if !report.warnings.is_empty() {
        println!("{}", console::style("Warnings:").yellow().bold());
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
        println!();
    }

    if report.is_ok() {
        println!(
            "{} {} phase(s), entry '{}'",
            console::style("Pipeline is valid:").green().bold(),
            pipeline.phases.len(),
            pipeline.entry_phase
        );
        println!();
        return Ok(());
    }

    println!("{}", console::style("Errors:").red().bold());
    for error in &report.errors {
        println!("  - {}", error);
    }
    println!();

    report.into_result()?;
    Ok(())
}
