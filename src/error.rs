//! Typed error kinds surfaced by the pipelines.
//!
//! Operations return [`anyhow::Result`]; callers that need to branch on a
//! specific failure recover these with `err.downcast_ref::<SyncError>()`.

use thiserror::Error;

/// Failures that abort a commit sync.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The repository URL does not end in `{owner}/{repo}`.
    #[error("Invalid GitHub URL: {0}")]
    InvalidReference(String),

    /// The project does not exist or has no repository URL.
    #[error("Project with ID {0} not found")]
    ProjectNotFound(String),
}

/// Store-level failures with domain meaning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Query vector and stored vector have different lengths.
    #[error("embedding dimension mismatch: query has {query} dims, stored row '{file_name}' has {stored}")]
    DimensionMismatch {
        query: usize,
        stored: usize,
        file_name: String,
    },

    /// A stored vector scored NaN or infinity against the query.
    #[error("stored embedding for '{file_name}' produced a non-finite similarity")]
    NonFiniteSimilarity { file_name: String },
}

/// Terminal failure observed by the reader of an answer channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnswerError {
    /// The text generator failed.
    #[error("answer generation failed: {0}")]
    Generation(String),

    /// The producer went away without signalling done.
    #[error("answer stream ended without a done signal")]
    Interrupted,
}
