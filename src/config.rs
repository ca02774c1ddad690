//! Configuration for the pipeline engine, read from `.kanban/kanban.toml`.
//!
//! Every section is optional. Layering is file → environment → CLI.
//!
//! ```toml
//! [project]
//! claude_cmd = "claude"
//!
//! [pipeline]
//! path = ".kanban/pipeline.yaml"
//! skills_dir = ".kanban/skills"
//!
//! [sync]
//! command = "kanban-cli sync"
//!
//! [poller]
//! review_status = "PR Created"
//! feedback_status = "Addressing Comments"
//! done_status = "Done"
//! max_stages_per_cycle = 20
//! interval_secs = 300
//! tracking_file = ".kanban/mr_tracking.json"
//!
//! [code_host]
//! provider = "github"
//! token_env = "GITHUB_TOKEN"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::review::github::GITHUB_GRAPHQL_URL;

/// Directory holding engine configuration inside a repository.
pub const KANBAN_DIR: &str = ".kanban";

/// Configuration file name inside `KANBAN_DIR`.
pub const CONFIG_FILE: &str = "kanban.toml";

/// Project-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Agent CLI command (default: "claude")
    #[serde(default)]
    pub claude_cmd: Option<String>,
}

/// Where the pipeline definition and its skills live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_pipeline_path")]
    pub path: String,
    #[serde(default = "default_skills_dir")]
    pub skills_dir: String,
}

fn default_pipeline_path() -> String {
    ".kanban/pipeline.yaml".to_string()
}

fn default_skills_dir() -> String {
    ".kanban/skills".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            path: default_pipeline_path(),
            skills_dir: default_skills_dir(),
        }
    }
}

/// Resync command run after every exit gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSection {
    /// Shell command run in the repository root. Empty disables resync.
    #[serde(default)]
    pub command: String,
}

/// Review-comment poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSection {
    /// Status of stages waiting on code review
    #[serde(default = "default_review_status")]
    pub review_status: String,
    /// Status a stage moves to when new review comments arrive
    #[serde(default = "default_feedback_status")]
    pub feedback_status: String,
    /// Status a stage moves to when its PR merges
    #[serde(default = "default_done_status")]
    pub done_status: String,
    #[serde(default = "default_max_stages_per_cycle")]
    pub max_stages_per_cycle: usize,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_tracking_file")]
    pub tracking_file: String,
}

fn default_review_status() -> String {
    "PR Created".to_string()
}

fn default_feedback_status() -> String {
    "Addressing Comments".to_string()
}

fn default_done_status() -> String {
    crate::pipeline::DONE_TARGET.to_string()
}

fn default_max_stages_per_cycle() -> usize {
    20
}

fn default_interval_secs() -> u64 {
    300
}

fn default_tracking_file() -> String {
    ".kanban/mr_tracking.json".to_string()
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            review_status: default_review_status(),
            feedback_status: default_feedback_status(),
            done_status: default_done_status(),
            max_stages_per_cycle: default_max_stages_per_cycle(),
            interval_secs: default_interval_secs(),
            tracking_file: default_tracking_file(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeHostProvider {
    #[default]
    Github,
    None,
}

impl std::fmt::Display for CodeHostProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeHostProvider::Github => write!(f, "github"),
            CodeHostProvider::None => write!(f, "none"),
        }
    }
}

/// Code host used to query pull request state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeHostSection {
    #[serde(default)]
    pub provider: CodeHostProvider,
    /// Environment variable holding the API token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_api_url() -> String {
    GITHUB_GRAPHQL_URL.to_string()
}

impl Default for CodeHostSection {
    fn default() -> Self {
        Self {
            provider: CodeHostProvider::default(),
            token_env: default_token_env(),
            api_url: default_api_url(),
        }
    }
}

/// The complete kanban.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KanbanToml {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub poller: PollerSection,
    #[serde(default)]
    pub code_host: CodeHostSection,
}

impl KanbanToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse kanban.toml")
    }

    /// Load `<kanban_dir>/kanban.toml`, or defaults if it doesn't exist.
    pub fn load_or_default(kanban_dir: &Path) -> Result<Self> {
        let config_path = kanban_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize kanban.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.poller.interval_secs == 0 {
            warnings.push("poller.interval_secs is 0; periodic polling would spin".to_string());
        }
        if self.poller.max_stages_per_cycle == 0 {
            warnings.push(
                "poller.max_stages_per_cycle is 0; no stage will ever be polled".to_string(),
            );
        }
        if self.poller.review_status == self.poller.feedback_status {
            warnings.push(format!(
                "poller.review_status and poller.feedback_status are both '{}'",
                self.poller.review_status
            ));
        }
        if self.code_host.provider != CodeHostProvider::None
            && self.code_host.token_env.is_empty()
        {
            warnings.push("code_host.token_env is empty".to_string());
        }

        warnings
    }
}

/// Configuration resolved for one repository, with environment overrides.
#[derive(Debug, Clone)]
pub struct KanbanConfig {
    pub repo_root: PathBuf,
    pub kanban_dir: PathBuf,
    pub toml: KanbanToml,
    pub verbose: bool,
}

impl KanbanConfig {
    pub fn new(repo_root: PathBuf) -> Result<Self> {
        Self::with_cli_args(repo_root, false)
    }

    pub fn with_cli_args(repo_root: PathBuf, verbose: bool) -> Result<Self> {
        let kanban_dir = repo_root.join(KANBAN_DIR);
        let toml = KanbanToml::load_or_default(&kanban_dir)?;
        Ok(Self {
            repo_root,
            kanban_dir,
            toml,
            verbose,
        })
    }

    /// Agent CLI command, with fallback to the `CLAUDE_CMD` environment variable.
    pub fn claude_cmd(&self) -> String {
        self.toml
            .project
            .claude_cmd
            .clone()
            .or_else(|| std::env::var("CLAUDE_CMD").ok())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Resync command; `KANBAN_SYNC_CMD` overrides the file setting.
    pub fn sync_command(&self) -> Option<String> {
        let command = std::env::var("KANBAN_SYNC_CMD")
            .unwrap_or_else(|_| self.toml.sync.command.clone());
        let command = command.trim().to_string();
        (!command.is_empty()).then_some(command)
    }

    pub fn pipeline_path(&self) -> PathBuf {
        self.resolve(&self.toml.pipeline.path)
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.resolve(&self.toml.pipeline.skills_dir)
    }

    pub fn tracking_path(&self) -> PathBuf {
        self.resolve(&self.toml.poller.tracking_file)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.repo_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let toml = KanbanToml::default();
        assert_eq!(toml.poller.review_status, "PR Created");
        assert_eq!(toml.poller.feedback_status, "Addressing Comments");
        assert_eq!(toml.poller.done_status, "Done");
        assert_eq!(toml.poller.max_stages_per_cycle, 20);
        assert_eq!(toml.code_host.provider, CodeHostProvider::Github);
        assert!(toml.sync.command.is_empty());
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file() {
        let toml = KanbanToml::parse(
            r#"
[poller]
review_status = "In Review"
max_stages_per_cycle = 5

[code_host]
provider = "none"
"#,
        )
        .unwrap();
        assert_eq!(toml.poller.review_status, "In Review");
        assert_eq!(toml.poller.max_stages_per_cycle, 5);
        assert_eq!(toml.poller.feedback_status, "Addressing Comments");
        assert_eq!(toml.code_host.provider, CodeHostProvider::None);
    }

    #[test]
    fn test_parse_invalid_provider() {
        assert!(KanbanToml::parse("[code_host]\nprovider = \"bitbucket\"\n").is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let mut toml = KanbanToml::default();
        toml.poller.interval_secs = 0;
        toml.poller.feedback_status = toml.poller.review_status.clone();
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("interval_secs")));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = KanbanToml::default();
        toml.sync.command = "kanban-cli sync".to_string();
        toml.save(&path).unwrap();

        let loaded = KanbanToml::load(&path).unwrap();
        assert_eq!(loaded.sync.command, "kanban-cli sync");
    }

    #[test]
    fn test_config_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let config = KanbanConfig::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(config.pipeline_path(), dir.path().join(".kanban/pipeline.yaml"));
        assert_eq!(config.skills_dir(), dir.path().join(".kanban/skills"));
        assert_eq!(config.tracking_path(), dir.path().join(".kanban/mr_tracking.json"));
    }

    #[test]
    fn test_config_reads_file_from_kanban_dir() {
        let dir = TempDir::new().unwrap();
        let kanban_dir = dir.path().join(KANBAN_DIR);
        std::fs::create_dir_all(&kanban_dir).unwrap();
        std::fs::write(
            kanban_dir.join(CONFIG_FILE),
            "[pipeline]\npath = \"/etc/pipeline.yaml\"\n",
        )
        .unwrap();

        let config = KanbanConfig::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(config.pipeline_path(), PathBuf::from("/etc/pipeline.yaml"));
    }
}
