//! Code-review (PR/MR) state queried by the poller and the `pr-status` resolver.

pub mod github;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{CodeHostProvider, CodeHostSection};

pub use github::GitHubAdapter;

/// Snapshot of one pull/merge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrStatus {
    pub merged: bool,
    pub unresolved_thread_count: u32,
    /// Host-reported state, e.g. `OPEN`, `CLOSED`, `MERGED`.
    pub state: String,
}

#[async_trait]
pub trait CodeHostAdapter: Send + Sync {
    async fn get_status(&self, url: &str) -> Result<PrStatus>;
}

/// Build the configured adapter, or `None` when no code host is usable.
pub fn adapter_from_config(section: &CodeHostSection) -> Option<Arc<dyn CodeHostAdapter>> {
    match section.provider {
        CodeHostProvider::None => None,
        CodeHostProvider::Github => {
            let token = std::env::var(&section.token_env).ok()?;
            if token.trim().is_empty() {
                return None;
            }
            Some(Arc::new(GitHubAdapter::new(&token, &section.api_url)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_none_has_no_adapter() {
        let section = CodeHostSection {
            provider: CodeHostProvider::None,
            ..CodeHostSection::default()
        };
        assert!(adapter_from_config(&section).is_none());
    }

    #[test]
    fn test_github_without_token_has_no_adapter() {
        let section = CodeHostSection {
            provider: CodeHostProvider::Github,
            token_env: "KANBAN_TEST_TOKEN_THAT_IS_NEVER_SET".to_string(),
            ..CodeHostSection::default()
        };
        assert!(adapter_from_config(&section).is_none());
    }
}
