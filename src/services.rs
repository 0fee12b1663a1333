//! Bundle of collaborators shared by both pipelines.
//!
//! Every request receives the project id explicitly; [`Services`] carries
//! only the stateless clients and the tuning parameters.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, EmbeddingClient};
use crate::generation::{create_generator, TextGenClient};
use crate::github::{GitHubClient, RepoClient};
use crate::retrieval::RetrievalOptions;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

/// Tuning parameters decoupled from the TOML config.
#[derive(Debug, Clone)]
pub struct PipelineParams {
    pub max_commits: usize,
    pub min_similarity: f64,
    pub retrieval_limit: i64,
    pub channel_capacity: usize,
    /// Upper bound on the Q&A prompt; the context block shrinks to fit.
    pub max_prompt_chars: usize,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            max_commits: 10,
            min_similarity: 0.5,
            retrieval_limit: 10,
            channel_capacity: 32,
            max_prompt_chars: 100_000,
        }
    }
}

impl PipelineParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_commits: config.sync.max_commits,
            min_similarity: config.retrieval.min_similarity,
            retrieval_limit: config.retrieval.limit,
            channel_capacity: config.generation.channel_capacity,
            max_prompt_chars: config.generation.max_input_chars,
        }
    }

    pub fn retrieval_options(&self) -> RetrievalOptions {
        RetrievalOptions {
            min_similarity: self.min_similarity,
            limit: self.retrieval_limit,
        }
    }
}

#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub repo: Arc<dyn RepoClient>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub generator: Arc<dyn TextGenClient>,
    pub params: PipelineParams,
}

impl Services {
    /// Connect to the database and build the configured providers.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        Ok(Self {
            store: Arc::new(SqliteStore::new(pool)),
            repo: Arc::new(GitHubClient::new(&config.github)?),
            embedder: create_embedder(&config.embedding)?,
            generator: create_generator(&config.generation)?,
            params: PipelineParams::from_config(config),
        })
    }
}
