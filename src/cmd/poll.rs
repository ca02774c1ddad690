//! Review comment polling (`kanban poll`).

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use kanban_engine::poller::{PollAction, PollOutcome};

use super::super::Cli;

pub async fn cmd_poll(repo_root: &Path, cli: &Cli, watch: bool) -> Result<()> {
    use kanban_engine::poller::MrCommentPoller;
    use tokio_util::sync::CancellationToken;

    let config = super::load_config(repo_root, cli)?;
    let poller = MrCommentPoller::from_config(&config);

    if !watch {
        print_outcomes(&poller.poll_cycle(&config.repo_root).await);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let period = Duration::from_secs(config.toml.poller.interval_secs.max(1));
    println!(
        "Polling every {}s. Press Ctrl-C to stop.",
        period.as_secs()
    );
    poller
        .run_periodic(&config.repo_root, period, cancel, print_outcomes)
        .await;
    Ok(())
}

fn print_outcomes(outcomes: &[PollOutcome]) {
    if outcomes.is_empty() {
        println!("No stages polled.");
        return;
    }

    for outcome in outcomes {
        let action = match outcome.action {
            PollAction::Merged => console::style(outcome.action.to_string()).green(),
            PollAction::NewComments => console::style(outcome.action.to_string()).yellow(),
            PollAction::Error => console::style(outcome.action.to_string()).red(),
            PollAction::FirstPoll | PollAction::NoChange => {
                console::style(outcome.action.to_string()).dim()
            }
        };
        let detail = match (&outcome.error, outcome.unresolved_count) {
            (Some(error), _) => error.clone(),
            (None, Some(count)) => format!("{} unresolved", count),
            (None, None) => String::new(),
        };
        println!("  {:<24} {:<14} {}", outcome.stage_id, action, detail);
    }
}
