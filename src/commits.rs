//! Commit sync pipeline.
//!
//! ```text
//! fetch_commit_history → filter_unprocessed → summarize (concurrent, settle-all) → persist
//! ```
//!
//! Re-running [`poll_commits`] is safe: the set of unprocessed commits is
//! recomputed from the store on every call, so a second run with no new
//! upstream commits inserts nothing.

use anyhow::Result;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use futures::future::join_all;
use std::cmp::Reverse;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::SyncError;
use crate::generation::TextGenClient;
use crate::github::{parse_repo_url, RepoClient};
use crate::models::{Commit, CommitInfo, Project};
use crate::services::Services;
use crate::store::Store;

const MERGE_PR_PREFIX: &str = "Merge pull request";

const DIFF_SUMMARY_PROMPT: &str = "\
You are an expert programmer summarizing a git diff for a project changelog.

Reading the diff:
- Lines starting with `diff --git a/... b/...` name the file being changed.
- Lines starting with `+` were added, lines starting with `-` were removed.
- Other lines are unchanged context.

Write a short summary of what this commit changes and why it likely matters.
Use plain sentences or a few terse bullet points. Mention file names only
when they help. Do not repeat the diff itself.

";

/// A commit is a merge if it has more than one parent or its message marks
/// it as a merged pull request.
pub fn is_merge_commit(commit: &CommitInfo) -> bool {
    commit.parent_count > 1 || commit.message.starts_with(MERGE_PR_PREFIX)
}

/// Order newest-first by author date, drop merges, keep `max`, then return
/// them oldest-first.
///
/// The host's ordering is not trusted. Commits with an unparseable date
/// sort after all dated ones; ties keep their input order.
pub fn select_recent(mut commits: Vec<CommitInfo>, max: usize) -> Vec<CommitInfo> {
    commits.sort_by_cached_key(|c| Reverse(parse_date(&c.date)));

    let mut recent: Vec<CommitInfo> = commits
        .into_iter()
        .filter(|c| !is_merge_commit(c))
        .take(max)
        .collect();
    recent.reverse();
    recent
}

fn parse_date(date: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(date).ok()
}

/// Rewrite an RFC 3339 date as UTC (`2024-05-01T10:00:00Z`) so stored dates
/// sort as text in instant order. Unparseable input is kept as is.
pub fn normalize_date(date: &str) -> String {
    match parse_date(date) {
        Some(parsed) => parsed
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        None => date.to_string(),
    }
}

/// Fetch the most recent non-merge commits of `repo_url`, oldest first.
///
/// Fails with [`SyncError::InvalidReference`] if the URL does not end in
/// `{owner}/{repo}`.
pub async fn fetch_commit_history(
    repo: &dyn RepoClient,
    repo_url: &str,
    max: usize,
) -> Result<Vec<CommitInfo>> {
    let repo_ref = parse_repo_url(repo_url)?;
    let commits = repo.list_commits(&repo_ref).await?;
    Ok(select_recent(commits, max))
}

/// Keep only candidates whose hash is not yet stored for the project.
/// Candidate order is preserved.
pub async fn filter_unprocessed(
    store: &dyn Store,
    project_id: &str,
    candidates: Vec<CommitInfo>,
) -> Result<Vec<CommitInfo>> {
    let processed = store.processed_commit_hashes(project_id).await?;
    Ok(candidates
        .into_iter()
        .filter(|c| !processed.contains(&c.hash))
        .collect())
}

/// Summarize one commit's diff, returning any failure to the caller.
pub async fn try_summarize_commit(
    repo: &dyn RepoClient,
    generator: &dyn TextGenClient,
    repo_url: &str,
    hash: &str,
) -> Result<String> {
    let diff = repo.get_diff(repo_url, hash).await?;
    let prompt = format!("{}{}", DIFF_SUMMARY_PROMPT, diff);
    generator.generate(&prompt).await
}

/// Summarize one commit's diff. Any failure yields an empty string.
pub async fn summarize_commit(
    repo: &dyn RepoClient,
    generator: &dyn TextGenClient,
    repo_url: &str,
    hash: &str,
) -> String {
    match try_summarize_commit(repo, generator, repo_url, hash).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::warn!(hash, error = %e, "commit summarization failed");
            String::new()
        }
    }
}

async fn resolve_project(store: &dyn Store, project_id: &str) -> Result<(Project, String)> {
    let project = store
        .get_project(project_id)
        .await?
        .ok_or_else(|| SyncError::ProjectNotFound(project_id.to_string()))?;

    let url = project
        .github_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| SyncError::ProjectNotFound(project_id.to_string()))?;

    Ok((project, url))
}

/// Synchronize a project's stored commits with upstream.
///
/// Every unprocessed commit is summarized concurrently; a failed or empty
/// summary falls back to the commit message, so a bad diff or an AI outage
/// never keeps the commit itself from being stored. Returns the inserted
/// rows, oldest first.
pub async fn poll_commits(services: &Services, project_id: &str) -> Result<Vec<Commit>> {
    let store = services.store.as_ref();
    let (project, repo_url) = resolve_project(store, project_id).await?;

    let repo: Arc<dyn RepoClient> = project
        .github_token
        .as_deref()
        .and_then(|token| services.repo.with_token(token))
        .unwrap_or_else(|| services.repo.clone());

    let history =
        fetch_commit_history(repo.as_ref(), &repo_url, services.params.max_commits).await?;
    let unprocessed = filter_unprocessed(store, project_id, history).await?;

    if unprocessed.is_empty() {
        tracing::info!(project_id, "no new commits");
        return Ok(Vec::new());
    }

    let generator = services.generator.as_ref();
    let summaries = join_all(
        unprocessed
            .iter()
            .map(|c| try_summarize_commit(repo.as_ref(), generator, &repo_url, &c.hash)),
    )
    .await;

    let records: Vec<Commit> = unprocessed
        .into_iter()
        .zip(summaries)
        .map(|(info, summary)| {
            let summary = match summary {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    tracing::debug!(
                        project_id,
                        commit_hash = %info.hash,
                        "ai summary empty; falling back to commit message"
                    );
                    info.message.clone()
                }
                Err(e) => {
                    tracing::debug!(
                        project_id,
                        commit_hash = %info.hash,
                        error = %e,
                        "ai summary failed; falling back to commit message"
                    );
                    info.message.clone()
                }
            };

            Commit {
                id: Uuid::new_v4().to_string(),
                project_id: project_id.to_string(),
                commit_hash: info.hash,
                commit_message: info.message,
                commit_author_name: info.author_name,
                commit_author_avatar: info.author_avatar,
                commit_date: normalize_date(&info.date),
                summary,
            }
        })
        .collect();

    let inserted = store.insert_commits(&records).await?;
    tracing::info!(project_id, inserted = inserted.len(), "commits synced");
    Ok(inserted)
}
