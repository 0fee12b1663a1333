//! HTTP server exposing the sync and question-answering pipelines.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/projects/{id}/sync` | Sync recent commits, returns inserted rows |
//! | `GET`  | `/projects/{id}/commits` | Stored commits, newest first |
//! | `POST` | `/projects/{id}/ask` | Answer a question as a Server-Sent Events stream |
//!
//! # Ask stream
//!
//! `POST /projects/{id}/ask` with `{"question": "..."}` responds with:
//!
//! 1. one `references` event: `{"repo_url": ..., "tier": ..., "files": [...]}`
//! 2. zero or more `chunk` events, each a JSON string
//! 3. exactly one `done` event, or one `error` event carrying the message
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Project with ID p1 not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::answer::AnswerReceiver;
use crate::ask::ask_question;
use crate::commits::poll_commits;
use crate::config::Config;
use crate::error::SyncError;
use crate::models::{Commit, FileReference};
use crate::retrieval::Tier;
use crate::services::Services;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    services: Services,
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    let app = router(services);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router over an existing set of services.
pub fn router(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/projects/{id}/sync", post(handle_sync))
        .route("/projects/{id}/commits", get(handle_list_commits))
        .route("/projects/{id}/ask", post(handle_ask))
        .layer(cors)
        .with_state(AppState { services })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map a pipeline error to a status code by its typed kind.
fn classify_error(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<SyncError>() {
        Some(SyncError::InvalidReference(_)) => bad_request(err.to_string()),
        Some(SyncError::ProjectNotFound(_)) => not_found(err.to_string()),
        None => {
            tracing::error!(error = %err, "request failed");
            internal(err.to_string())
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /projects/{id}/sync ============

#[derive(Serialize)]
struct SyncResponse {
    inserted: usize,
    commits: Vec<Commit>,
}

async fn handle_sync(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncResponse>, AppError> {
    let commits = poll_commits(&state.services, &id)
        .await
        .map_err(classify_error)?;

    Ok(Json(SyncResponse {
        inserted: commits.len(),
        commits,
    }))
}

// ============ GET /projects/{id}/commits ============

#[derive(Serialize)]
struct CommitListResponse {
    commits: Vec<Commit>,
}

async fn handle_list_commits(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommitListResponse>, AppError> {
    let store = state.services.store.as_ref();
    if store.get_project(&id).await.map_err(classify_error)?.is_none() {
        return Err(not_found(SyncError::ProjectNotFound(id).to_string()));
    }
    let commits = store.list_commits(&id).await.map_err(classify_error)?;
    Ok(Json(CommitListResponse { commits }))
}

// ============ POST /projects/{id}/ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct ReferencesPayload<'a> {
    repo_url: Option<&'a str>,
    tier: Option<Tier>,
    files: &'a [FileReference],
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let resp = ask_question(&state.services, question, &id)
        .await
        .map_err(classify_error)?;

    let references = Event::default()
        .event("references")
        .json_data(ReferencesPayload {
            repo_url: resp.repo_url.as_deref(),
            tier: resp.tier,
            files: &resp.file_references,
        })
        .map_err(|e| internal(e.to_string()))?;

    Ok(Sse::new(answer_events(references, resp.answer)).keep_alive(KeepAlive::default()))
}

/// Adapt an answer channel into SSE events: the given head event, one
/// `chunk` per delivered chunk, then `done` or `error`.
fn answer_events(
    head: Event,
    answer: AnswerReceiver,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    let body = stream::unfold(Some(answer), |state| async move {
        let mut answer = state?;
        let event = match answer.recv().await {
            Some(Ok(chunk)) => {
                return Some((Event::default().event("chunk").json_data(chunk), Some(answer)));
            }
            Some(Err(e)) => Event::default().event("error").data(e.to_string()),
            None => Event::default().event("done").data(""),
        };
        Some((Ok(event), None))
    });

    stream::once(async move { Ok(head) }).chain(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::answer_channel;
    use crate::error::AnswerError;

    async fn event_count(answer: AnswerReceiver) -> usize {
        answer_events(Event::default().event("references").data("{}"), answer)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .filter(|e| e.is_ok())
            .count()
    }

    #[tokio::test]
    async fn stream_ends_after_done() {
        let (tx, rx) = answer_channel(4);
        tx.send("a").await;
        tx.send("b").await;
        tx.done().await;
        // references, a, b, done
        assert_eq!(event_count(rx).await, 4);
    }

    #[tokio::test]
    async fn stream_ends_after_error() {
        let (tx, rx) = answer_channel(4);
        tx.send("partial").await;
        tx.fail(AnswerError::Generation("boom".to_string())).await;
        assert_eq!(event_count(rx).await, 3);
    }

    #[test]
    fn sync_errors_map_to_status_codes() {
        let e = classify_error(SyncError::ProjectNotFound("p".into()).into());
        assert_eq!(e.status, StatusCode::NOT_FOUND);
        assert_eq!(e.code, "not_found");

        let e = classify_error(SyncError::InvalidReference("x".into()).into());
        assert_eq!(e.status, StatusCode::BAD_REQUEST);

        let e = classify_error(anyhow::anyhow!("db gone"));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.code, "internal");
    }
}
