//! CLI command implementations.
//!
//! | Module       | Commands handled |
//! |--------------|------------------|
//! | `init`       | `Init`           |
//! | `validate`   | `Validate`       |
//! | `lock`       | `Lock`           |
//! | `transition` | `Transition`     |
//! | `poll`       | `Poll`           |
//! | `config`     | `Config`         |

pub mod config;
pub mod init;
pub mod lock;
pub mod poll;
pub mod transition;
pub mod validate;

pub use config::cmd_config;
pub use init::cmd_init;
pub use lock::cmd_lock;
pub use poll::cmd_poll;
pub use transition::cmd_transition;
pub use validate::cmd_validate;

use anyhow::Result;
use std::path::Path;

use kanban_engine::config::KanbanConfig;

use super::Cli;

fn load_config(repo_root: &Path, cli: &Cli) -> Result<KanbanConfig> {
    KanbanConfig::with_cli_args(repo_root.to_path_buf(), cli.verbose)
}
