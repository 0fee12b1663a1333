//! SQLite-backed [`Store`] implementation.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{Commit, FileReference, Project, SourceCodeEmbedding};

use super::{checked_similarity, rank, Store, DOCUMENTATION_PATTERNS};

/// SQLite implementation of the [`Store`] trait.
///
/// Wraps a [`SqlitePool`] and translates every `Store` method into SQL
/// against the `projects`, `commits`, and `source_code_embeddings` tables.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a project row. Used by the ingestion side and test fixtures.
    pub async fn insert_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            "INSERT INTO projects (id, name, github_url, github_token, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.github_url)
        .bind(&project.github_token)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store one source-file embedding row.
    pub async fn insert_embedding(&self, row: &SourceCodeEmbedding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO source_code_embeddings
                (id, project_id, file_name, source_code, summary, summary_embedding, dims)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.project_id)
        .bind(&row.file_name)
        .bind(&row.source_code)
        .bind(&row.summary)
        .bind(row.summary_embedding.as_deref().map(vec_to_blob))
        .bind(row.summary_embedding.as_ref().map(|v| v.len() as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT id, name, github_url, github_token FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Project {
            id: r.get("id"),
            name: r.get("name"),
            github_url: r.get("github_url"),
            github_token: r.get("github_token"),
        }))
    }

    async fn processed_commit_hashes(&self, project_id: &str) -> Result<HashSet<String>> {
        let hashes: Vec<String> =
            sqlx::query_scalar("SELECT commit_hash FROM commits WHERE project_id = ?")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(hashes.into_iter().collect())
    }

    async fn insert_commits(&self, commits: &[Commit]) -> Result<Vec<Commit>> {
        let now = chrono::Utc::now().timestamp();
        let mut inserted = Vec::with_capacity(commits.len());
        let mut tx = self.pool.begin().await?;

        for commit in commits {
            let result = sqlx::query(
                r#"
                INSERT INTO commits (id, project_id, commit_hash, commit_message,
                                     commit_author_name, commit_author_avatar,
                                     commit_date, summary, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(project_id, commit_hash) DO NOTHING
                "#,
            )
            .bind(&commit.id)
            .bind(&commit.project_id)
            .bind(&commit.commit_hash)
            .bind(&commit.commit_message)
            .bind(&commit.commit_author_name)
            .bind(&commit.commit_author_avatar)
            .bind(&commit.commit_date)
            .bind(&commit.summary)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted.push(commit.clone());
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_commits(&self, project_id: &str) -> Result<Vec<Commit>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, commit_hash, commit_message, commit_author_name,
                   commit_author_avatar, commit_date, summary
            FROM commits
            WHERE project_id = ?
            ORDER BY commit_date DESC, created_at DESC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Commit {
                id: r.get("id"),
                project_id: r.get("project_id"),
                commit_hash: r.get("commit_hash"),
                commit_message: r.get("commit_message"),
                commit_author_name: r.get("commit_author_name"),
                commit_author_avatar: r.get("commit_author_avatar"),
                commit_date: r.get("commit_date"),
                summary: r.get("summary"),
            })
            .collect())
    }

    async fn similarity_search(
        &self,
        project_id: &str,
        query_vec: &[f32],
        min_similarity: Option<f64>,
        limit: i64,
    ) -> Result<Vec<FileReference>> {
        let rows = sqlx::query(
            r#"
            SELECT file_name, source_code, summary, summary_embedding
            FROM source_code_embeddings
            WHERE project_id = ? AND summary_embedding IS NOT NULL
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let file_name: String = row.get("file_name");
            let blob: Vec<u8> = row.get("summary_embedding");
            let similarity = checked_similarity(query_vec, &blob_to_vec(&blob), &file_name)?;
            scored.push(FileReference {
                file_name,
                source_code: row.get("source_code"),
                summary: row.get("summary"),
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
        let clauses = DOCUMENTATION_PATTERNS
            .iter()
            .map(|_| "lower(file_name) LIKE ?")
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "SELECT file_name, source_code, summary FROM source_code_embeddings \
             WHERE project_id = ? AND ({}) LIMIT ?",
            clauses
        );

        let mut query = sqlx::query(&sql).bind(project_id);
        for pattern in DOCUMENTATION_PATTERNS {
            query = query.bind(*pattern);
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|r| FileReference {
                file_name: r.get("file_name"),
                source_code: r.get("source_code"),
                summary: r.get("summary"),
                similarity: None,
            })
            .collect())
    }
}
