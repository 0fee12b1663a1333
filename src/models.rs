//! Core data models used throughout Chryonsus.
//!
//! These types represent the projects, commits, and source-file embeddings
//! that flow through the commit-sync and question-answering pipelines.

use serde::Serialize;

/// A linked repository. Read-only from the pipelines' point of view.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub github_url: Option<String>,
    /// Per-project token; overrides the global GitHub token when set.
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
}

/// Commit metadata as returned by the repository host, before summarization.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_avatar: String,
    /// RFC 3339 author date, kept as the host returned it.
    pub date: String,
    pub parent_count: usize,
}

/// A persisted, summarized commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Commit {
    pub id: String,
    pub project_id: String,
    pub commit_hash: String,
    pub commit_message: String,
    pub commit_author_name: String,
    pub commit_author_avatar: String,
    pub commit_date: String,
    pub summary: String,
}

/// One indexed source file. Produced by an external ingestion process.
#[derive(Debug, Clone)]
pub struct SourceCodeEmbedding {
    pub id: String,
    pub project_id: String,
    pub file_name: String,
    pub source_code: String,
    pub summary: String,
    /// `None` until ingestion has embedded the summary. Such rows are
    /// invisible to similarity search but still reachable as documentation.
    pub summary_embedding: Option<Vec<f32>>,
}

/// A retrieved file excerpt handed to prompt assembly and shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReference {
    pub file_name: String,
    pub source_code: String,
    pub summary: String,
    /// Cosine similarity; `None` for documentation-fallback rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}
