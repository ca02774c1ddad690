//! Manual status change through the exit gate (`kanban transition`).

use anyhow::{Result, bail};
use std::path::Path;
use std::sync::Arc;

use super::super::Cli;

pub async fn cmd_transition(
    repo_root: &Path,
    cli: &Cli,
    stage_id: &str,
    new_status: &str,
    force: bool,
) -> Result<()> {
    use kanban_engine::exit_gate::{ExitGateRunner, WorkerInfo, sync_runner};
    use kanban_engine::lock::StageLock;
    use kanban_engine::pipeline::{PipelineConfig, PipelineStateMachine};
    use kanban_engine::store::FrontmatterStore;

    let config = super::load_config(repo_root, cli)?;
    let store = Arc::new(FrontmatterStore::new(&config.repo_root));
    let status_before = StageLock::new(store.clone()).read_status(stage_id).await?;

    // Only transitions between statuses the pipeline knows about are checked.
    let pipeline_path = config.pipeline_path();
    if !force && pipeline_path.exists() {
        let machine = PipelineStateMachine::from_config(PipelineConfig::load(&pipeline_path)?);
        let known = |status: &str| {
            status == kanban_engine::pipeline::DONE_TARGET
                || machine.state_by_status(status).is_some()
        };
        if known(&status_before)
            && known(new_status)
            && status_before != new_status
            && !machine.is_valid_transition(&status_before, new_status)
        {
            bail!(
                "Transition from '{}' to '{}' is not declared in {} (use --force to override)",
                status_before,
                new_status,
                pipeline_path.display()
            );
        }
    }

    let stage_file = store.path_for(stage_id).await?;
    let worker = WorkerInfo::synthetic(stage_id, stage_file, &status_before);
    let runner = ExitGateRunner::new(store, sync_runner(config.sync_command()));
    let result = runner.run(&worker, &config.repo_root, new_status).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
