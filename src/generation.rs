//! Text-generation client abstraction and implementations.
//!
//! [`TextGenClient`] is a single-prompt, single-response interface: no
//! conversation state is kept between calls. Providers:
//! - **[`DisabledGenerator`]** — always fails.
//! - **[`OpenAIGenerator`]** — OpenAI-compatible `/chat/completions` (also Ollama, gateways).
//! - **[`GeminiGenerator`]** — Google's `models/{model}:generateContent`.
//!
//! Prompts longer than `generation.max_input_chars` are cut from the end by
//! the adapter. Q&A prompts are already sized to fit by
//! [`crate::ask::build_prompt`]; in practice the cut only hits large diffs.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::answer::AnswerSender;
use crate::config::GenerationConfig;
use crate::embedding::GEMINI_BASE_URL;
use crate::http::{build_client, post_json_with_retry};

#[async_trait]
pub trait TextGenClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate a complete response for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate a response, writing it to `out` as it becomes available.
    ///
    /// The default sends the full text as one chunk. Backends with native
    /// streaming override this to forward partial output.
    async fn generate_stream(&self, prompt: &str, out: &AnswerSender) -> Result<()> {
        let text = self.generate(prompt).await?;
        out.send(text).await;
        Ok(())
    }
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_input(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl TextGenClient for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

// ============ OpenAI-compatible ============

/// Chat-completions client. Requires `OPENAI_API_KEY` unless `url` points
/// at a keyless endpoint such as a local Ollama (`http://localhost:11434/v1`).
pub struct OpenAIGenerator {
    model: String,
    url: String,
    api_key: Option<String>,
    max_retries: u32,
    max_input_chars: usize,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        if api_key.is_none() && config.url.is_none() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            model,
            url,
            api_key,
            max_retries: config.max_retries,
            max_input_chars: config.max_input_chars,
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl TextGenClient for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": truncate_input(prompt, self.max_input_chars) },
            ],
            "temperature": 0.3,
        });
        let json = post_json_with_retry(
            &self.client,
            "OpenAI",
            &format!("{}/chat/completions", self.url.trim_end_matches('/')),
            &body,
            self.max_retries,
            |req| match &self.api_key {
                Some(key) => req.bearer_auth(key),
                None => req,
            },
        )
        .await?;

        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("LLM returned empty response"))
}

// ============ Gemini ============

/// Gemini `generateContent` client. Requires `GEMINI_API_KEY`.
pub struct GeminiGenerator {
    model: String,
    url: String,
    api_key: String,
    max_retries: u32,
    max_input_chars: usize,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("generation.model required for Gemini provider"))?;
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow!("GEMINI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| GEMINI_BASE_URL.to_string());

        Ok(Self {
            model,
            url,
            api_key,
            max_retries: config.max_retries,
            max_input_chars: config.max_input_chars,
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl TextGenClient for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [
                { "parts": [{ "text": truncate_input(prompt, self.max_input_chars) }] }
            ],
        });
        let json = post_json_with_retry(
            &self.client,
            "Gemini",
            &format!(
                "{}/models/{}:generateContent",
                self.url.trim_end_matches('/'),
                self.model
            ),
            &body,
            self.max_retries,
            |req| req.header("x-goog-api-key", &self.api_key),
        )
        .await?;

        parse_gemini_response(&json)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing candidates[0].content.parts"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        bail!("LLM returned empty response");
    }
    Ok(text)
}

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn TextGenClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
