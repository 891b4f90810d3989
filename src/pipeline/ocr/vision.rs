//! Vision OCR via a local Ollama vision model (`/api/chat`).
//!
//! Vision models report no per-word confidence. Each page gets a heuristic
//! score from output length and structure, spread over its tokens.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{EngineHealth, Recognition};
use super::EngineError;
use crate::config::EngineSettings;
use crate::pipeline::extraction::NormalizedPage;

const SYSTEM_PROMPT: &str = "\
You are a medical lab report transcriber. Extract ALL visible text from the \
provided page image exactly as printed. Keep each test result on its own line \
with its value, unit and reference range. Do not interpret or summarize.";

const USER_PROMPT: &str = "\
Transcribe every line of this lab report page. Output plain text only.";

const CONNECT_TIMEOUT_SECS: u64 = 5;

pub struct VisionEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

impl VisionEngine {
    pub const NAME: &'static str = "vision";

    pub fn new(base_url: &str, model: &str) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| EngineError::unavailable(Self::NAME, format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_settings(settings: &EngineSettings) -> Result<Self, EngineError> {
        Self::new(&settings.ollama_host, &settings.vision_model)
    }

    pub async fn healthcheck(&self) -> EngineHealth {
        match self.list_models().await {
            Ok(models) if models.iter().any(|m| model_matches(m, &self.model)) => {
                EngineHealth::Healthy
            }
            Ok(_) => EngineHealth::Unhealthy(format!("model '{}' not pulled", self.model)),
            Err(e) => EngineHealth::Unhealthy(e.to_string()),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, EngineError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::unavailable(
                Self::NAME,
                format!("/api/tags returned {}", status.as_u16()),
            ));
        }

        let parsed: TagsResponse = response
            .json()
            .await
            .map_err(|e| EngineError::failed(Self::NAME, format!("bad /api/tags body: {e}")))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    pub async fn recognize(&self, pages: &[NormalizedPage]) -> Result<Recognition, EngineError> {
        let mut recognition = Recognition::default();
        for page in pages {
            let raw = self.transcribe_page(page).await?;
            let text = strip_markdown(&raw);
            let confidence = heuristic_confidence(&text);
            let tokens = text.split_whitespace().count();

            debug!(
                page = page.page_number,
                model = %self.model,
                chars = text.len(),
                confidence,
                "Vision page transcribed"
            );
            recognition
                .token_confidences
                .extend(std::iter::repeat(confidence).take(tokens));
            recognition.page_texts.push(text);
        }
        Ok(recognition)
    }

    async fn transcribe_page(&self, page: &NormalizedPage) -> Result<String, EngineError> {
        let image = base64::engine::general_purpose::STANDARD.encode(&page.png_bytes);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                    images: Vec::new(),
                },
                ChatMessage {
                    role: "user",
                    content: USER_PROMPT,
                    images: vec![image],
                },
            ],
            stream: false,
            options: ChatOptions { temperature: 0.0 },
        };

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::failed(
                Self::NAME,
                format!("/api/chat returned {}: {}", status.as_u16(), detail.trim()),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::failed(Self::NAME, format!("bad /api/chat body: {e}")))?;
        Ok(parsed.message.content)
    }

    fn map_request_error(&self, e: reqwest::Error) -> EngineError {
        if e.is_connect() {
            EngineError::unavailable(Self::NAME, format!("cannot reach Ollama at {}", self.base_url))
        } else {
            EngineError::failed(Self::NAME, e.to_string())
        }
    }
}

/// `llama3.2-vision` matches `llama3.2-vision:latest`.
fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || installed
            .strip_prefix(wanted)
            .is_some_and(|rest| rest.starts_with(':'))
}

/// Flatten the Markdown vision models like to emit into plain lines.
fn strip_markdown(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.starts_with("```"))
        .filter(|l| !is_table_rule(l))
        .map(|l| {
            let l = l.trim_start_matches('#').trim_start();
            let l = l.replace("**", "").replace("__", "");
            if l.contains('|') {
                l.split('|')
                    .map(str::trim)
                    .filter(|cell| !cell.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            } else {
                l
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// `|---|:---:|` separator rows.
fn is_table_rule(line: &str) -> bool {
    line.contains('-') && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Output length and lab-report structure mapped to 0–100, capped at 95.
fn heuristic_confidence(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }

    let len = text.chars().count();
    let base: f64 = if len < 50 {
        20.0
    } else if len < 200 {
        40.0
    } else if len < 500 {
        60.0
    } else {
        80.0
    };

    let lines: Vec<&str> = text.lines().collect();
    let numeric_lines = lines
        .iter()
        .filter(|l| l.chars().any(|c| c.is_ascii_digit()) && l.chars().any(char::is_alphabetic))
        .count();
    let has_ranges = lines
        .iter()
        .any(|l| l.contains('-') && l.chars().filter(char::is_ascii_digit).count() >= 2);

    let bonus = if numeric_lines >= 3 { 8.0 } else { 0.0 } + if has_ranges { 5.0 } else { 0.0 };

    (base + bonus).min(95.0)
}
