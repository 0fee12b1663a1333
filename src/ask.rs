//! Question answering over a project's indexed source files.
//!
//! [`ask_question`] embeds the question, runs the retrieval cascade, builds
//! one prompt, and hands generation to a spawned producer. It returns as
//! soon as the context is known; the answer arrives on the
//! [`AnswerReceiver`] while the caller already has the file references.

use anyhow::Result;

use crate::answer::{answer_channel, AnswerReceiver};
use crate::error::AnswerError;
use crate::generation::truncate_input;
use crate::models::FileReference;
use crate::retrieval::{find_relevant_files, Tier};
use crate::services::Services;

const ASSISTANT_PREAMBLE: &str = "\
You are an AI code assistant who answers questions about a codebase. Your
audience is an intern or junior developer who is new to this repository.

You are a knowledgeable, helpful and articulate guide. Explain clearly and
step by step, and include short code snippets from the context when they
help. Base your answer on the context block below. If the context does not
contain the answer, say that you do not know rather than inventing one, and
point to the files that look most relevant.
";

/// Result of [`ask_question`]: the context used and the streaming answer.
#[derive(Debug)]
pub struct QuestionResponse {
    pub answer: AnswerReceiver,
    pub file_references: Vec<FileReference>,
    pub repo_url: Option<String>,
    /// Retrieval tier that produced `file_references`; `None` if nothing matched.
    pub tier: Option<Tier>,
}

/// Longest slice of a single file's source that goes into the context block.
pub const MAX_FILE_SOURCE_CHARS: usize = 8_000;

/// Assemble the single prompt sent to the generator.
///
/// The prompt never exceeds `max_chars` unless the question alone does.
/// Each file's source is capped at [`MAX_FILE_SOURCE_CHARS`], and files
/// that no longer fit in what remains after the fixed parts are dropped
/// from the end, so the question block always reaches the model.
pub fn build_prompt(
    repo_url: Option<&str>,
    files: &[FileReference],
    question: &str,
    max_chars: usize,
) -> String {
    let head = format!(
        "{}\nRepository: {}\n\nSTART CONTEXT BLOCK\n",
        ASSISTANT_PREAMBLE,
        repo_url.unwrap_or("unknown")
    );
    let tail = format!("END OF CONTEXT BLOCK\n\nSTART QUESTION\n{question}\nEND QUESTION\n");

    let mut remaining = max_chars
        .saturating_sub(head.chars().count())
        .saturating_sub(tail.chars().count());
    let mut context = String::new();
    for (included, file) in files.iter().enumerate() {
        let entry = format!(
            "source: {}\ncode content: {}\nsummary: {}\n\n",
            file.file_name,
            truncate_input(&file.source_code, MAX_FILE_SOURCE_CHARS),
            file.summary
        );
        let len = entry.chars().count();
        if len > remaining {
            tracing::debug!(
                included,
                dropped = files.len() - included,
                "context block full; dropping trailing files"
            );
            break;
        }
        remaining -= len;
        context.push_str(&entry);
    }

    format!("{head}{context}{tail}")
}

/// Answer `question` about `project_id`.
///
/// Embedding and retrieval failures are returned directly. A generation
/// failure arrives later as a terminal `Err(AnswerError::Generation)` on
/// the answer channel.
pub async fn ask_question(
    services: &Services,
    question: &str,
    project_id: &str,
) -> Result<QuestionResponse> {
    let opts = services.params.retrieval_options();
    let retrieval = find_relevant_files(
        services.store.as_ref(),
        services.embedder.as_ref(),
        project_id,
        question,
        &opts,
    )
    .await?;

    let repo_url = services
        .store
        .get_project(project_id)
        .await?
        .and_then(|p| p.github_url)
        .filter(|u| !u.trim().is_empty());

    let prompt = build_prompt(
        repo_url.as_deref(),
        &retrieval.files,
        question,
        services.params.max_prompt_chars,
    );
    let (tx, rx) = answer_channel(services.params.channel_capacity);
    let generator = services.generator.clone();

    tracing::info!(
        project_id,
        tier = ?retrieval.tier,
        files = retrieval.files.len(),
        model = generator.model_name(),
        "answering question"
    );

    tokio::spawn(async move {
        match generator.generate_stream(&prompt, &tx).await {
            Ok(()) => tx.done().await,
            Err(e) => {
                tracing::warn!(error = %e, "answer generation failed");
                tx.fail(AnswerError::Generation(e.to_string())).await;
            }
        }
    });

    Ok(QuestionResponse {
        answer: rx,
        file_references: retrieval.files,
        repo_url,
        tier: retrieval.tier,
    })
}
