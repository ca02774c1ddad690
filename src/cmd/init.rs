//! Repository scaffolding (`kanban init`).

use anyhow::{Context, Result};
use std::path::Path;

pub fn cmd_init(repo_root: &Path, force: bool) -> Result<()> {
    use kanban_engine::config::{CONFIG_FILE, KanbanConfig, KanbanToml};
    use kanban_engine::pipeline::default_pipeline;
    use kanban_engine::skills::{SkillsLoader, stub_skill_content};

    let config = KanbanConfig::new(repo_root.to_path_buf())?;
    std::fs::create_dir_all(&config.kanban_dir).with_context(|| {
        format!("Failed to create {}", config.kanban_dir.display())
    })?;

    let mut created = Vec::new();
    let mut skipped = Vec::new();

    let config_path = config.kanban_dir.join(CONFIG_FILE);
    if force || !config_path.exists() {
        KanbanToml::default().save(&config_path)?;
        created.push(config_path);
    } else {
        skipped.push(config_path);
    }

    let pipeline = default_pipeline();
    let pipeline_path = config.pipeline_path();
    if force || !pipeline_path.exists() {
        if let Some(parent) = pipeline_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&pipeline_path, pipeline.to_yaml()?)
            .with_context(|| format!("Failed to write {}", pipeline_path.display()))?;
        created.push(pipeline_path);
    } else {
        skipped.push(pipeline_path);
    }

    let loader = SkillsLoader::new(config.skills_dir());
    for phase in &pipeline.phases {
        let Some(skill) = phase.skill_name() else {
            continue;
        };
        let skill_file = loader.skill_file(skill);
        if force || !skill_file.exists() {
            created.push(loader.create_skill(skill, &stub_skill_content(phase))?);
        } else {
            skipped.push(skill_file);
        }
    }

    println!();
    println!(
        "{}",
        console::style(format!("Initialized {}", config.kanban_dir.display())).bold()
    );
    println!();
    for path in &created {
        println!("  {} {}", console::style("created").green(), path.display());
    }
    for path in &skipped {
        println!("  {} {}", console::style("exists ").dim(), path.display());
    }
    println!();
    println!("Next: edit the pipeline, then run 'kanban validate'.");
    println!();

    Ok(())
}
