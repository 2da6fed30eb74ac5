//! GitHub REST API client for pull request creation.
//!
//! Only one endpoint is used: `POST /repos/{owner}/{repo}/pulls`. The
//! [`PullRequestApi`] trait lets the write-back coordinator run against any
//! hosting service (or a fake in tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::config::{Config, Credential};
use crate::error::{SyncError, SyncErrorKind, SyncResult};

/// Request body for a new pull request.
#[derive(Debug, Clone, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// Branch carrying the changes.
    pub head: String,
    /// Branch the changes should be merged into.
    pub base: String,
}

/// The pull request the hosting service created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestResult {
    pub number: u64,
    pub url: String,
    pub branch: String,
}

/// Hosting service that can open pull requests.
#[async_trait]
pub trait PullRequestApi: Send + Sync {
    async fn create_pull_request(&self, request: &NewPullRequest) -> SyncResult<PullRequestResult>;
}

#[derive(Debug, Deserialize)]
struct CreatedPull {
    number: u64,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

pub struct GithubClient {
    client: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    token: Credential,
}

impl GithubClient {
    pub fn new(
        api_url: &str,
        owner: &str,
        repo: &str,
        token: Credential,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("repo-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let gh = &config.github;
        let token = config
            .credential()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("github.token is not configured"))?;
        Self::new(
            &gh.api_url,
            &gh.owner,
            &gh.repo,
            token,
            Duration::from_secs(gh.timeout_secs),
        )
    }

    fn pulls_url(&self) -> String {
        format!("{}/repos/{}/{}/pulls", self.api_url, self.owner, self.repo)
    }
}

#[async_trait]
impl PullRequestApi for GithubClient {
    async fn create_pull_request(
        &self,
        request: &NewPullRequest,
    ) -> SyncResult<PullRequestResult> {
        let rejected = |detail: String| SyncError::new(SyncErrorKind::PullRequestRejected, detail);

        let response = self
            .client
            .post(self.pulls_url())
            .header("Authorization", format!("Bearer {}", self.token.expose()))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(request)
            .send()
            .await
            .map_err(|e| rejected(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(rejected(format!(
                "GitHub API error {}: {}",
                status,
                api_error_message(&body)
            )));
        }

        let created: CreatedPull = serde_json::from_str(&body)
            .map_err(|e| rejected(format!("unexpected GitHub response: {}", e)))?;

        info!(number = created.number, url = %created.html_url, "pull request opened");
        Ok(PullRequestResult {
            number: created.number,
            url: created.html_url,
            branch: request.head.clone(),
        })
    }
}

/// Pull the human-readable part out of a GitHub error body, e.g.
/// `Validation Failed: No commits between main and feature`.
fn api_error_message(body: &str) -> String {
    let Ok(err) = serde_json::from_str::<ApiError>(body) else {
        return body.trim().to_string();
    };
    let details: Vec<String> = err
        .errors
        .iter()
        .filter_map(|e| e.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .collect();
    if details.is_empty() {
        err.message
    } else {
        format!("{}: {}", err.message, details.join("; "))
    }
}
