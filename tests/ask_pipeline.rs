use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use chryonsus::ask_question;
use chryonsus::config::parse_config;
use chryonsus::db;
use chryonsus::embedding::EmbeddingClient;
use chryonsus::error::{AnswerError, StoreError};
use chryonsus::generation::TextGenClient;
use chryonsus::github::{RepoClient, RepoRef};
use chryonsus::migrate;
use chryonsus::models::{CommitInfo, FileReference, Project, SourceCodeEmbedding};
use chryonsus::retrieval::Tier;
use chryonsus::services::{PipelineParams, Services};
use chryonsus::store::sqlite::SqliteStore;
use chryonsus::store::Store;

// ============ Fakes ============

/// Maps a question to a fixed vector.
struct QuestionEmbedder(Vec<f32>);

#[async_trait]
impl EmbeddingClient for QuestionEmbedder {
    fn model_name(&self) -> &str {
        "fake"
    }
    fn dims(&self) -> usize {
        self.0.len()
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

/// Records every prompt and streams a fixed answer in two chunks.
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl TextGenClient for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Login lives in src/auth.rs.".to_string())
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        out: &chryonsus::answer::AnswerSender,
    ) -> Result<()> {
        let text = self.generate(prompt).await?;
        let (head, tail) = text.split_at(6);
        out.send(head).await;
        out.send(tail).await;
        Ok(())
    }
}

struct DownGenerator;

#[async_trait]
impl TextGenClient for DownGenerator {
    fn model_name(&self) -> &str {
        "down"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("503 Service Unavailable")
    }
}

struct NoRepo;

#[async_trait]
impl RepoClient for NoRepo {
    async fn list_commits(&self, _repo: &RepoRef) -> Result<Vec<CommitInfo>> {
        Ok(Vec::new())
    }
    async fn get_diff(&self, _repo_url: &str, _hash: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// Counts calls per store method and delegates to the SQLite store.
struct CountingStore {
    inner: Arc<SqliteStore>,
    searches: AtomicUsize,
    doc_lookups: AtomicUsize,
}

#[async_trait]
impl Store for CountingStore {
    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        self.inner.get_project(id).await
    }
    async fn processed_commit_hashes(
        &self,
        project_id: &str,
    ) -> Result<std::collections::HashSet<String>> {
        self.inner.processed_commit_hashes(project_id).await
    }
    async fn insert_commits(
        &self,
        commits: &[chryonsus::models::Commit],
    ) -> Result<Vec<chryonsus::models::Commit>> {
        self.inner.insert_commits(commits).await
    }
    async fn list_commits(&self, project_id: &str) -> Result<Vec<chryonsus::models::Commit>> {
        self.inner.list_commits(project_id).await
    }
    async fn similarity_search(
        &self,
        project_id: &str,
        query_vec: &[f32],
        min_similarity: Option<f64>,
        limit: i64,
    ) -> Result<Vec<FileReference>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner
            .similarity_search(project_id, query_vec, min_similarity, limit)
            .await
    }
    async fn documentation_files(&self, project_id: &str, limit: i64) -> Result<Vec<FileReference>> {
        self.doc_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.documentation_files(project_id, limit).await
    }
}

// ============ Setup ============

async fn sqlite_store(tmp: &TempDir) -> Arc<SqliteStore> {
    let cfg = parse_config(&format!(
        "[db]\npath = \"{}\"\n",
        tmp.path().join("chry.sqlite").display()
    ))
    .unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));
    store
        .insert_project(&Project {
            id: "p1".to_string(),
            name: "widgets".to_string(),
            github_url: Some("https://github.com/acme/widgets".to_string()),
            github_token: None,
        })
        .await
        .unwrap();
    store
}

async fn add_file(store: &SqliteStore, name: &str, embedding: Option<Vec<f32>>) {
    store
        .insert_embedding(&SourceCodeEmbedding {
            id: format!("emb-{name}"),
            project_id: "p1".to_string(),
            file_name: name.to_string(),
            source_code: format!("// contents of {name}"),
            summary: format!("What {name} does."),
            summary_embedding: embedding,
        })
        .await
        .unwrap();
}

fn services(
    store: Arc<dyn Store>,
    query: Vec<f32>,
    generator: Arc<dyn TextGenClient>,
) -> Services {
    Services {
        store,
        repo: Arc::new(NoRepo),
        embedder: Arc::new(QuestionEmbedder(query)),
        generator,
        params: PipelineParams::default(),
    }
}

fn counting(inner: Arc<SqliteStore>) -> Arc<CountingStore> {
    Arc::new(CountingStore {
        inner,
        searches: AtomicUsize::new(0),
        doc_lookups: AtomicUsize::new(0),
    })
}

fn recording() -> Arc<RecordingGenerator> {
    Arc::new(RecordingGenerator {
        prompts: Mutex::new(Vec::new()),
    })
}

// ============ Tests ============

#[tokio::test]
async fn test_close_match_uses_strict_tier_only() {
    let tmp = TempDir::new().unwrap();
    let sqlite = sqlite_store(&tmp).await;
    // cos([1,0], [0.9, 0.43589]) = 0.9
    add_file(&sqlite, "src/auth.rs", Some(vec![0.9, 0.435_889_9])).await;
    add_file(&sqlite, "src/ui.rs", Some(vec![0.0, 1.0])).await;
    add_file(&sqlite, "README.md", Some(vec![0.2, 0.98])).await;

    let store = counting(sqlite);
    let generator = recording();
    let svc = services(store.clone(), vec![1.0, 0.0], generator.clone());

    let resp = ask_question(&svc, "Where is login?", "p1").await.unwrap();
    assert_eq!(resp.tier, Some(Tier::Strict));
    assert_eq!(resp.file_references.len(), 1);
    assert_eq!(resp.file_references[0].file_name, "src/auth.rs");
    let sim = resp.file_references[0].similarity.unwrap();
    assert!((sim - 0.9).abs() < 1e-4, "similarity was {sim}");
    assert_eq!(store.searches.load(Ordering::SeqCst), 1);
    assert_eq!(store.doc_lookups.load(Ordering::SeqCst), 0);

    let answer = resp.answer.collect().await.unwrap();
    assert_eq!(answer, "Login lives in src/auth.rs.");

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Repository: https://github.com/acme/widgets"));
    assert!(prompts[0].contains("source: src/auth.rs\ncode content: // contents of src/auth.rs"));
    assert!(!prompts[0].contains("source: src/ui.rs"));
}

#[tokio::test]
async fn test_weak_matches_use_relaxed_tier() {
    let tmp = TempDir::new().unwrap();
    let sqlite = sqlite_store(&tmp).await;
    add_file(&sqlite, "src/a.rs", Some(vec![0.3, 0.954])).await;
    add_file(&sqlite, "src/b.rs", Some(vec![0.1, 0.995])).await;

    let store = counting(sqlite);
    let svc = services(store.clone(), vec![1.0, 0.0], recording());

    let resp = ask_question(&svc, "anything", "p1").await.unwrap();
    assert_eq!(resp.tier, Some(Tier::Relaxed));
    let names: Vec<&str> = resp
        .file_references
        .iter()
        .map(|f| f.file_name.as_str())
        .collect();
    assert_eq!(names, vec!["src/a.rs", "src/b.rs"]);
    assert_eq!(store.searches.load(Ordering::SeqCst), 2);
    assert_eq!(store.doc_lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_readme_only_project_uses_documentation_tier() {
    let tmp = TempDir::new().unwrap();
    let sqlite = sqlite_store(&tmp).await;
    // Indexed but not yet embedded: invisible to both similarity tiers.
    add_file(&sqlite, "README.md", None).await;
    add_file(&sqlite, "src/main.rs", None).await;

    let store = counting(sqlite);
    let svc = services(store.clone(), vec![1.0, 0.0], recording());

    let resp = ask_question(&svc, "What is this project?", "p1").await.unwrap();
    assert_eq!(resp.tier, Some(Tier::Documentation));
    assert_eq!(resp.file_references.len(), 1);
    assert_eq!(resp.file_references[0].file_name, "README.md");
    assert_eq!(resp.file_references[0].similarity, None);
    assert_eq!(store.doc_lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sqlite_documentation_files_match_manifest_patterns() {
    let tmp = TempDir::new().unwrap();
    let sqlite = sqlite_store(&tmp).await;
    for name in [
        "README.md",
        "frontend/package.json",
        "setup.py",
        "src/setup.py",
        "docs/README.md",
        "pyproject.toml",
        "backend/requirements.txt",
        "src/main.rs",
    ] {
        add_file(&sqlite, name, None).await;
    }

    let docs = sqlite.documentation_files("p1", 10).await.unwrap();
    let mut names: Vec<&str> = docs.iter().map(|f| f.file_name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(
        names,
        vec![
            "README.md",
            "backend/requirements.txt",
            "frontend/package.json",
            "pyproject.toml",
            "setup.py",
        ]
    );
    assert!(docs.iter().all(|f| f.similarity.is_none()));

    let capped = sqlite.documentation_files("p1", 2).await.unwrap();
    assert_eq!(capped.len(), 2);
    assert!(sqlite.documentation_files("other", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_large_context_keeps_question_in_prompt() {
    let tmp = TempDir::new().unwrap();
    let sqlite = sqlite_store(&tmp).await;
    for i in 0..10 {
        sqlite
            .insert_embedding(&SourceCodeEmbedding {
                id: format!("big-{i}"),
                project_id: "p1".to_string(),
                file_name: format!("src/big_{i}.rs"),
                source_code: "y".repeat(12_000),
                summary: format!("Large module {i}."),
                summary_embedding: Some(vec![1.0, 0.0]),
            })
            .await
            .unwrap();
    }

    let generator = recording();
    let svc = services(sqlite, vec![1.0, 0.0], generator.clone());
    let resp = ask_question(&svc, "WHERE IS LOGIN?", "p1").await.unwrap();
    assert_eq!(resp.file_references.len(), 10);
    resp.answer.collect().await.unwrap();

    let prompts = generator.prompts.lock().unwrap();
    let prompt = &prompts[0];
    assert!(prompt.chars().count() <= PipelineParams::default().max_prompt_chars);
    assert!(prompt.ends_with("START QUESTION\nWHERE IS LOGIN?\nEND QUESTION\n"));
}

#[tokio::test]
async fn test_dimension_mismatch_is_store_error() {
    let tmp = TempDir::new().unwrap();
    let sqlite = sqlite_store(&tmp).await;
    add_file(&sqlite, "src/a.rs", Some(vec![1.0, 0.0, 0.0])).await;

    let svc = services(sqlite, vec![1.0, 0.0], recording());
    let err = ask_question(&svc, "anything", "p1").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::DimensionMismatch {
            query: 2,
            stored: 3,
            ..
        })
    ));
}

#[tokio::test]
async fn test_generation_failure_is_terminal_error() {
    let tmp = TempDir::new().unwrap();
    let sqlite = sqlite_store(&tmp).await;
    add_file(&sqlite, "src/a.rs", Some(vec![1.0, 0.0])).await;

    let svc = services(sqlite, vec![1.0, 0.0], Arc::new(DownGenerator));
    let resp = ask_question(&svc, "anything", "p1").await.unwrap();
    assert_eq!(resp.file_references.len(), 1);

    let mut answer = resp.answer;
    match answer.recv().await {
        Some(Err(AnswerError::Generation(msg))) => assert!(msg.contains("503")),
        other => panic!("expected generation error, got {:?}", other),
    }
    assert!(answer.recv().await.is_none());
    assert!(answer.is_finished());
}

#[tokio::test]
async fn test_nothing_after_done() {
    let tmp = TempDir::new().unwrap();
    let sqlite = sqlite_store(&tmp).await;
    add_file(&sqlite, "src/a.rs", Some(vec![1.0, 0.0])).await;

    let svc = services(sqlite, vec![1.0, 0.0], recording());
    let mut answer = ask_question(&svc, "anything", "p1").await.unwrap().answer;

    let mut chunks = Vec::new();
    while let Some(chunk) = answer.recv().await {
        chunks.push(chunk.unwrap());
    }
    assert_eq!(chunks, vec!["Login ", "lives in src/auth.rs."]);
    assert!(answer.recv().await.is_none());
    assert!(answer.recv().await.is_none());
}
