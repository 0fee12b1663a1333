//! In-memory [`Store`] implementation for tests and embedding into other hosts.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Similarity search is brute-force
//! cosine over every row of the project.

use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Commit, FileReference, Project, SourceCodeEmbedding};

use super::{checked_similarity, is_documentation_file, rank, Store};

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    projects: RwLock<Vec<Project>>,
    commits: RwLock<Vec<Commit>>,
    embeddings: RwLock<Vec<SourceCodeEmbedding>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&self, project: Project) -> Result<()> {
        write(&self.projects)?.push(project);
        Ok(())
    }

    pub fn insert_embedding(&self, row: SourceCodeEmbedding) -> Result<()> {
        write(&self.embeddings)?.push(row);
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        Ok(read(&self.projects)?.iter().find(|p| p.id == id).cloned())
    }

    async fn processed_commit_hashes(&self, project_id: &str) -> Result<HashSet<String>> {
        Ok(read(&self.commits)?
            .iter()
            .filter(|c| c.project_id == project_id)
            .map(|c| c.commit_hash.clone())
            .collect())
    }

    async fn insert_commits(&self, commits: &[Commit]) -> Result<Vec<Commit>> {
        let mut stored = write(&self.commits)?;
        let mut inserted = Vec::new();
        for commit in commits {
            let exists = stored
                .iter()
                .any(|c| c.project_id == commit.project_id && c.commit_hash == commit.commit_hash);
            if exists {
                continue;
            }
            stored.push(commit.clone());
            inserted.push(commit.clone());
        }
        Ok(inserted)
    }

    async fn list_commits(&self, project_id: &str) -> Result<Vec<Commit>> {
        let mut commits: Vec<Commit> = read(&self.commits)?
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        commits.sort_by(|a, b| b.commit_date.cmp(&a.commit_date));
        Ok(commits)
    }

    async fn similarity_search(
        &self,
        project_id: &str,
        query_vec: &[f32],
        min_similarity: Option<f64>,
        limit: i64,
    ) -> Result<Vec<FileReference>> {
        let rows = read(&self.embeddings)?;
        let mut scored = Vec::new();
        for row in rows.iter().filter(|r| r.project_id == project_id) {
            let Some(embedding) = &row.summary_embedding else {
                continue;
            };
            let similarity = checked_similarity(query_vec, embedding, &row.file_name)?;
            scored.push(FileReference {
                file_name: row.file_name.clone(),
                source_code: row.source_code.clone(),
                summary: row.summary.clone(),
                similarity: Some(similarity),
            });
        }
        Ok(rank(scored, min_similarity, limit))
    }

    async fn documentation_files(
        &self,
        project_id: &str,
        limit: i64,
    ) -> Result<Vec<FileReference>> {
        Ok(read(&self.embeddings)?
            .iter()
            .filter(|r| r.project_id == project_id && is_documentation_file(&r.file_name))
            .take(limit.max(0) as usize)
            .map(|r| FileReference {
                file_name: r.file_name.clone(),
                source_code: r.source_code.clone(),
                summary: r.summary.clone(),
                similarity: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[tokio::test]
    async fn nan_embedding_fails_search_without_panicking() {
        let store = InMemoryStore::new();
        for i in 0..64 {
            let vec = if i % 7 == 0 {
                vec![f32::NAN, 1.0]
            } else {
                vec![1.0, i as f32 / 64.0]
            };
            store
                .insert_embedding(SourceCodeEmbedding {
                    id: format!("e{i}"),
                    project_id: "p1".to_string(),
                    file_name: format!("src/f{i}.rs"),
                    source_code: String::new(),
                    summary: String::new(),
                    summary_embedding: Some(vec),
                })
                .unwrap();
        }

        let err = store
            .similarity_search("p1", &[1.0, 0.0], None, 10)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<StoreError>(),
            Some(&StoreError::NonFiniteSimilarity {
                file_name: "src/f0.rs".to_string()
            })
        );
    }

    #[tokio::test]
    async fn list_commits_newest_first() {
        let store = InMemoryStore::new();
        let commit = |hash: &str, date: &str| Commit {
            id: hash.to_string(),
            project_id: "p1".to_string(),
            commit_hash: hash.to_string(),
            commit_message: String::new(),
            commit_author_name: String::new(),
            commit_author_avatar: String::new(),
            commit_date: date.to_string(),
            summary: String::new(),
        };
        store
            .insert_commits(&[
                commit("a", "2024-05-01T10:00:00Z"),
                commit("b", "2024-05-03T10:00:00Z"),
                commit("c", "2024-05-02T10:00:00Z"),
            ])
            .await
            .unwrap();

        let listed = store.list_commits("p1").await.unwrap();
        let hashes: Vec<&str> = listed.iter().map(|c| c.commit_hash.as_str()).collect();
        assert_eq!(hashes, vec!["b", "c", "a"]);
    }
}
