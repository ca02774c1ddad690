//! Stage session lock commands (`kanban lock`).

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use super::super::{Cli, LockCommands};

pub async fn cmd_lock(repo_root: &Path, cli: &Cli, command: LockCommands) -> Result<()> {
    use kanban_engine::lock::StageLock;
    use kanban_engine::store::FrontmatterStore;

    let config = super::load_config(repo_root, cli)?;
    let lock = StageLock::new(Arc::new(FrontmatterStore::new(&config.repo_root)));

    match command {
        LockCommands::Acquire { stage_id } => {
            lock.acquire(&stage_id).await?;
            println!("{} {}", console::style("Locked").green(), stage_id);
        }
        LockCommands::Release { stage_id } => {
            lock.release(&stage_id).await?;
            println!("{} {}", console::style("Released").green(), stage_id);
        }
        LockCommands::Status { stage_id } => {
            let locked = lock.is_locked(&stage_id).await?;
            let status = lock.read_status(&stage_id).await?;
            println!("{}", stage_id);
            println!("  status: {}", status);
            println!(
                "  locked: {}",
                if locked {
                    console::style("yes").yellow()
                } else {
                    console::style("no").dim()
                }
            );
        }
    }

    Ok(())
}
