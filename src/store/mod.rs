//! Storage abstraction for Chryonsus.
//!
//! The [`Store`] trait defines every storage operation the two pipelines
//! need: reading projects, reading and bulk-inserting commits, and the two
//! read paths over source-file embeddings (similarity search and the
//! documentation-file lookup).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::models::{Commit, FileReference, Project};

/// Lower-cased `LIKE` patterns identifying manifest and documentation files.
pub const DOCUMENTATION_PATTERNS: &[&str] = &[
    "readme%",
    "%package.json",
    "%pyproject%",
    "%requirements.txt",
    "setup.py",
];

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_project`](Store::get_project) | Look up a project by id |
/// | [`processed_commit_hashes`](Store::processed_commit_hashes) | All stored hashes for a project |
/// | [`insert_commits`](Store::insert_commits) | Bulk-insert summarized commits once |
/// | [`list_commits`](Store::list_commits) | Stored commits, newest first |
/// | [`similarity_search`](Store::similarity_search) | Cosine search over file summaries |
/// | [`documentation_files`](Store::documentation_files) | Manifest/README lookup |
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_project(&self, id: &str) -> Result<Option<Project>>;

    async fn processed_commit_hashes(&self, project_id: &str) -> Result<HashSet<String>>;

    /// Insert all commits in one batch. Rows whose `(project_id, commit_hash)`
    /// already exists are skipped. Returns the rows actually inserted.
    async fn insert_commits(&self, commits: &[Commit]) -> Result<Vec<Commit>>;

    async fn list_commits(&self, project_id: &str) -> Result<Vec<Commit>>;

    /// Rank the project's files by cosine similarity to `query_vec`.
    ///
    /// When `min_similarity` is set, only rows scoring strictly above it are
    /// kept. Results are ordered by similarity descending and truncated to
    /// `limit`. A stored vector whose length differs from the query's fails
    /// with [`StoreError::DimensionMismatch`].
    async fn similarity_search(
        &self,
        project_id: &str,
        query_vec: &[f32],
        min_similarity: Option<f64>,
        limit: i64,
    ) -> Result<Vec<FileReference>>;

    /// Up to `limit` files whose lower-cased name matches one of
    /// [`DOCUMENTATION_PATTERNS`]. No similarity ordering.
    async fn documentation_files(&self, project_id: &str, limit: i64)
        -> Result<Vec<FileReference>>;
}

/// Cosine similarity that refuses to compare vectors of different lengths
/// and rejects NaN or infinite scores.
pub(crate) fn checked_similarity(
    query: &[f32],
    stored: &[f32],
    file_name: &str,
) -> std::result::Result<f64, StoreError> {
    if query.len() != stored.len() {
        return Err(StoreError::DimensionMismatch {
            query: query.len(),
            stored: stored.len(),
            file_name: file_name.to_string(),
        });
    }
    let similarity = cosine_similarity(query, stored) as f64;
    if !similarity.is_finite() {
        return Err(StoreError::NonFiniteSimilarity {
            file_name: file_name.to_string(),
        });
    }
    Ok(similarity)
}

/// Filter, sort descending, and truncate scored rows.
pub(crate) fn rank(
    mut scored: Vec<FileReference>,
    min_similarity: Option<f64>,
    limit: i64,
) -> Vec<FileReference> {
    if let Some(floor) = min_similarity {
        scored.retain(|r| r.similarity.is_some_and(|s| s > floor));
    }
    let key = |r: &FileReference| r.similarity.unwrap_or(f64::NEG_INFINITY);
    scored.sort_by(|a, b| key(b).total_cmp(&key(a)));
    scored.truncate(limit.max(0) as usize);
    scored
}

/// SQL `LIKE` semantics for `%` wildcards over an already lower-cased name.
pub(crate) fn like_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !name.starts_with(first) {
        return false;
    }
    let mut rest = &name[first.len()..];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(pos) => rest = &rest[pos + middle.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

pub(crate) fn is_documentation_file(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    DOCUMENTATION_PATTERNS
        .iter()
        .any(|pattern| like_match(pattern, &lower))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documentation_patterns() {
        assert!(is_documentation_file("README.md"));
        assert!(is_documentation_file("readme"));
        assert!(is_documentation_file("frontend/package.json"));
        assert!(is_documentation_file("pyproject.toml"));
        assert!(is_documentation_file("backend/requirements.txt"));
        assert!(is_documentation_file("setup.py"));

        assert!(!is_documentation_file("docs/README.md"));
        assert!(!is_documentation_file("package.json.bak"));
        assert!(!is_documentation_file("src/setup.py"));
        assert!(!is_documentation_file("src/main.rs"));
    }

    #[test]
    fn like_match_handles_wildcard_positions() {
        assert!(like_match("%pyproject%", "tools/pyproject.toml"));
        assert!(like_match("a%b%c", "axxbyyc"));
        assert!(!like_match("a%b%c", "axxcyyb"));
        assert!(like_match("%", ""));
    }

    #[test]
    fn rank_applies_strict_floor() {
        let row = |name: &str, s: f64| FileReference {
            file_name: name.to_string(),
            source_code: String::new(),
            summary: String::new(),
            similarity: Some(s),
        };
        let ranked = rank(
            vec![row("a", 0.5), row("b", 0.9), row("c", 0.7)],
            Some(0.5),
            10,
        );
        let names: Vec<&str> = ranked.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn rank_orders_non_finite_scores_without_panicking() {
        let row = |name: &str, s: f64| FileReference {
            file_name: name.to_string(),
            source_code: String::new(),
            summary: String::new(),
            similarity: Some(s),
        };
        let scored: Vec<FileReference> = (0..64)
            .map(|i| {
                let s = if i % 7 == 0 { f64::NAN } else { i as f64 / 64.0 };
                row(&format!("f{i}"), s)
            })
            .collect();
        let ranked = rank(scored, None, 10);
        assert_eq!(ranked.len(), 10);
    }

    #[test]
    fn checked_similarity_rejects_nan() {
        let err = checked_similarity(&[1.0, 0.0], &[f32::NAN, 1.0], "bad.rs").unwrap_err();
        assert_eq!(
            err,
            StoreError::NonFiniteSimilarity {
                file_name: "bad.rs".to_string()
            }
        );
    }

    #[test]
    fn checked_similarity_rejects_mismatch() {
        let err = checked_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0], "x.rs").unwrap_err();
        assert_eq!(
            err,
            StoreError::DimensionMismatch {
                query: 2,
                stored: 3,
                file_name: "x.rs".to_string()
            }
        );
    }
}
