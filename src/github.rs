//! GitHub REST adapter.
//!
//! [`RepoClient`] isolates the two repository-host calls the commit
//! pipeline makes: listing commits and fetching a single commit's diff.
//! [`GitHubClient`] implements it over the public REST API; response
//! parsing stays inside this module and only [`CommitInfo`] leaves it.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GithubConfig;
use crate::error::SyncError;
use crate::models::CommitInfo;

/// `owner/repo` pair parsed from a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

/// Parse the trailing `{owner}/{repo}` of a repository URL.
///
/// A trailing `/` and a `.git` suffix are ignored.
pub fn parse_repo_url(url: &str) -> Result<RepoRef, SyncError> {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    let mut segments = trimmed.rsplit('/');
    let repo = segments.next().unwrap_or_default();
    let owner = segments.next().unwrap_or_default();

    if owner.is_empty() || repo.is_empty() {
        return Err(SyncError::InvalidReference(url.to_string()));
    }

    Ok(RepoRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

#[async_trait]
pub trait RepoClient: Send + Sync {
    /// List the repository's recent commits, in whatever order the host returns.
    async fn list_commits(&self, repo: &RepoRef) -> Result<Vec<CommitInfo>>;

    /// Fetch the unified diff of one commit.
    async fn get_diff(&self, repo_url: &str, hash: &str) -> Result<String>;

    /// A client authenticating with `token` instead, if this backend supports it.
    fn with_token(&self, _token: &str) -> Option<Arc<dyn RepoClient>> {
        None
    }
}

/// REST client for github.com (or a GitHub Enterprise `api_url`).
#[derive(Clone)]
pub struct GitHubClient {
    api_url: String,
    token: Option<String>,
    per_page: u32,
    client: reqwest::Client,
}

impl GitHubClient {
    /// Build a client, reading the token from the environment variable named
    /// by `config.token_env`. Unauthenticated access is allowed.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::info!(
                token_env = %config.token_env,
                "no GitHub token set; using unauthenticated requests"
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            per_page: config.per_page,
            client,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    #[serde(default)]
    commit: ApiCommitDetail,
    #[serde(default)]
    author: Option<ApiUser>,
    #[serde(default)]
    parents: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiCommitDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    author: Option<ApiSignature>,
}

#[derive(Debug, Deserialize)]
struct ApiSignature {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    #[serde(default)]
    avatar_url: Option<String>,
}

impl From<ApiCommit> for CommitInfo {
    fn from(c: ApiCommit) -> Self {
        let signature = c.commit.author;
        CommitInfo {
            hash: c.sha,
            message: c.commit.message.unwrap_or_default(),
            author_name: signature
                .as_ref()
                .and_then(|s| s.name.clone())
                .unwrap_or_default(),
            author_avatar: c.author.and_then(|a| a.avatar_url).unwrap_or_default(),
            date: signature.and_then(|s| s.date).unwrap_or_default(),
            parent_count: c.parents.len(),
        }
    }
}

fn parse_commit_list(body: &str) -> Result<Vec<CommitInfo>> {
    let commits: Vec<ApiCommit> = serde_json::from_str(body)?;
    Ok(commits.into_iter().map(CommitInfo::from).collect())
}

#[async_trait]
impl RepoClient for GitHubClient {
    async fn list_commits(&self, repo: &RepoRef) -> Result<Vec<CommitInfo>> {
        let url = format!(
            "{}/repos/{}/{}/commits?per_page={}",
            self.api_url, repo.owner, repo.repo, self.per_page
        );
        let response = self
            .authorize(self.client.get(&url))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            bail!(
                "GitHub API error {} listing commits for {}/{}: {}",
                status,
                repo.owner,
                repo.repo,
                body
            );
        }

        parse_commit_list(&body)
    }

    async fn get_diff(&self, repo_url: &str, hash: &str) -> Result<String> {
        // Resolved against `api_url` so the token never leaves the API host.
        let repo = parse_repo_url(repo_url)?;
        let url = format!(
            "{}/repos/{}/{}/commits/{}",
            self.api_url, repo.owner, repo.repo, hash
        );

        let response = self
            .authorize(self.client.get(&url))
            .header("Accept", "application/vnd.github.v3.diff")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            bail!("GitHub diff request for {} failed with {}", hash, status);
        }
        Ok(response.text().await?)
    }

    fn with_token(&self, token: &str) -> Option<Arc<dyn RepoClient>> {
        let mut scoped = self.clone();
        scoped.token = Some(token.to_string());
        Some(Arc::new(scoped))
    }
}
