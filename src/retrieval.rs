//! Tiered retrieval over a project's source-file embeddings.
//!
//! Tiers run in order and the first non-empty one wins:
//!
//! | Tier | Query | Ordering |
//! |------|-------|----------|
//! | [`Tier::Strict`] | similarity > `min_similarity` | similarity desc |
//! | [`Tier::Relaxed`] | no floor | similarity desc |
//! | [`Tier::Documentation`] | README / manifest file names | none |
//!
//! The last tier means even a vague question on a sparsely indexed project
//! gets some grounding context.

use anyhow::Result;
use serde::Serialize;

use crate::embedding::EmbeddingClient;
use crate::models::FileReference;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Strict,
    Relaxed,
    Documentation,
}

impl Tier {
    /// Evaluation order.
    pub const CASCADE: [Tier; 3] = [Tier::Strict, Tier::Relaxed, Tier::Documentation];

    /// Run this tier. `None` means it found nothing and the next tier should run.
    async fn run(
        self,
        store: &dyn Store,
        project_id: &str,
        query_vec: &[f32],
        opts: &RetrievalOptions,
    ) -> Result<Option<Vec<FileReference>>> {
        let rows = match self {
            Tier::Strict => {
                store
                    .similarity_search(project_id, query_vec, Some(opts.min_similarity), opts.limit)
                    .await?
            }
            Tier::Relaxed => {
                store
                    .similarity_search(project_id, query_vec, None, opts.limit)
                    .await?
            }
            Tier::Documentation => store.documentation_files(project_id, opts.limit).await?,
        };
        Ok(if rows.is_empty() { None } else { Some(rows) })
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub min_similarity: f64,
    pub limit: i64,
}

/// Outcome of the cascade. `tier` is `None` when every tier came back empty.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub tier: Option<Tier>,
    pub files: Vec<FileReference>,
}

/// Run the tier cascade for a pre-computed query vector.
pub async fn retrieve(
    store: &dyn Store,
    project_id: &str,
    query_vec: &[f32],
    opts: &RetrievalOptions,
) -> Result<Retrieval> {
    for tier in Tier::CASCADE {
        if let Some(files) = tier.run(store, project_id, query_vec, opts).await? {
            tracing::debug!(project_id, ?tier, count = files.len(), "retrieval tier matched");
            return Ok(Retrieval {
                tier: Some(tier),
                files,
            });
        }
        tracing::debug!(project_id, ?tier, "retrieval tier empty; falling back");
    }

    Ok(Retrieval {
        tier: None,
        files: Vec::new(),
    })
}

/// Embed `question` and run the tier cascade.
pub async fn find_relevant_files(
    store: &dyn Store,
    embedder: &dyn EmbeddingClient,
    project_id: &str,
    question: &str,
    opts: &RetrievalOptions,
) -> Result<Retrieval> {
    let query_vec = embedder.embed(question).await?;
    retrieve(store, project_id, &query_vec, opts).await
}
