use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use super::{CodeHostAdapter, PrStatus};

pub const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";

static PR_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://github\.com/([^/\s]+)/([^/\s]+)/pull/(\d+)").unwrap());

const PR_STATUS_QUERY: &str = r#"
query($owner: String!, $name: String!, $number: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    pullRequest(number: $number) {
      state
      merged
      reviewThreads(first: 100, after: $after) {
        nodes { isResolved }
        pageInfo { hasNextPage endCursor }
      }
    }
  }
}
"#;

/// Upper bound on review-thread pages fetched for one pull request.
const MAX_THREAD_PAGES: usize = 50;

/// Pull request coordinates parsed from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

/// Parse `https://github.com/<owner>/<repo>/pull/<n>` (trailing path segments allowed).
pub fn parse_pr_url(url: &str) -> Option<PrRef> {
    let caps = PR_URL_REGEX.captures(url.trim())?;
    Some(PrRef {
        owner: caps.get(1)?.as_str().to_string(),
        repo: caps.get(2)?.as_str().to_string(),
        number: caps.get(3)?.as_str().parse().ok()?,
    })
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    pull_request: Option<PullRequestNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestNode {
    state: String,
    merged: bool,
    review_threads: ReviewThreads,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewThreads {
    #[serde(default)]
    nodes: Vec<ReviewThread>,
    #[serde(default)]
    page_info: PageInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewThread {
    is_resolved: bool,
}

/// Unresolved-thread count accumulated across review-thread pages.
#[derive(Debug, Default)]
struct ThreadTally {
    state: String,
    merged: bool,
    unresolved: usize,
    pages: usize,
}

impl ThreadTally {
    /// Fold one response page in. Returns the cursor of the next page, if any.
    fn add_page(&mut self, resp: GraphQlResponse) -> Result<Option<String>> {
        if let Some(err) = resp.errors.first() {
            bail!("GitHub GraphQL error: {}", err.message);
        }
        let pr = resp
            .data
            .and_then(|d| d.repository)
            .and_then(|r| r.pull_request)
            .context("GitHub returned no pull request for this URL")?;

        self.pages += 1;
        self.state = pr.state;
        self.merged = pr.merged;
        self.unresolved += pr
            .review_threads
            .nodes
            .iter()
            .filter(|t| !t.is_resolved)
            .count();

        let page_info = pr.review_threads.page_info;
        if !page_info.has_next_page {
            return Ok(None);
        }
        let cursor = page_info
            .end_cursor
            .context("GitHub reported more review threads without a cursor")?;
        if self.pages >= MAX_THREAD_PAGES {
            bail!("Pull request has more than {} pages of review threads", MAX_THREAD_PAGES);
        }
        Ok(Some(cursor))
    }

    fn into_status(self) -> PrStatus {
        PrStatus {
            merged: self.merged,
            unresolved_thread_count: u32::try_from(self.unresolved).unwrap_or(u32::MAX),
            state: self.state,
        }
    }
}

/// Queries pull request state through the GitHub GraphQL API.
pub struct GitHubAdapter {
    client: reqwest::Client,
    token: String,
    api_url: String,
}

impl GitHubAdapter {
    pub fn new(token: &str, api_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.to_string(),
            api_url: api_url.to_string(),
        }
    }

    async fn query_page(&self, pr: &PrRef, after: Option<&str>) -> Result<GraphQlResponse> {
        let body = serde_json::json!({
            "query": PR_STATUS_QUERY,
            "variables": {
                "owner": pr.owner,
                "name": pr.repo,
                "number": pr.number,
                "after": after,
            }
        });

        self.client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", "kanban-engine")
            .json(&body)
            .send()
            .await
            .context("Failed to send pull request query to GitHub")?
            .error_for_status()
            .context("GitHub GraphQL API returned error status")?
            .json()
            .await
            .context("Failed to parse pull request response from GitHub")
    }
}

#[async_trait]
impl CodeHostAdapter for GitHubAdapter {
    async fn get_status(&self, url: &str) -> Result<PrStatus> {
        let pr = parse_pr_url(url)
            .with_context(|| format!("Not a GitHub pull request URL: {}", url))?;

        let mut tally = ThreadTally::default();
        let mut cursor: Option<String> = None;
        loop {
            let resp = self.query_page(&pr, cursor.as_deref()).await?;
            match tally.add_page(resp)? {
                Some(next) => cursor = Some(next),
                None => return Ok(tally.into_status()),
            }
        }
    }
}
