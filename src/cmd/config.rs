//! Configuration view and validation commands (`kanban config`).

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(repo_root: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use kanban_engine::config::{CONFIG_FILE, KanbanConfig, KanbanToml};

    let config = KanbanConfig::new(repo_root.to_path_buf())?;
    let config_path = config.kanban_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No {} found at {}, using defaults.", CONFIG_FILE, config_path.display());
            }
            println!();
            print!("{}", toml::to_string_pretty(&config.toml)?);
            println!();

            println!("Effective values (with env overrides):");
            println!("  claude_cmd = \"{}\"", config.claude_cmd());
            println!(
                "  sync_command = {}",
                config
                    .sync_command()
                    .map(|c| format!("\"{}\"", c))
                    .unwrap_or_else(|| "(none)".to_string())
            );
            println!("  pipeline = {}", config.pipeline_path().display());
            println!("  skills_dir = {}", config.skills_dir().display());
            println!("  tracking_file = {}", config.tracking_path().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let toml = KanbanToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
    }

    Ok(())
}
