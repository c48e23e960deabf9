use std::future::Future;
use std::time::Duration;

use log::{debug, info};

use crate::TranscriptDocument;
use crate::error::SummarizationError;

pub const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

pub const DEFAULT_PROMPT: &str = "
Provide a summary of the following content in 300 words:
Content:{text}

";

const PLACEHOLDER: &str = "{text}";
const SUMMARY_SEPARATOR: &str = "\n\n";

/// Something that turns a prompt into a completion
pub trait ChatModel {
    fn complete(&self, prompt: String) -> impl Future<Output = Result<String, SummarizationError>> + Send;
}

/// Prompt with a single `{text}` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, SummarizationError> {
        let template = template.into();
        if !template.contains(PLACEHOLDER) {
            return Err(SummarizationError::Template);
        }
        Ok(Self { template })
    }

    pub fn format(&self, text: &str) -> String {
        self.template.replace(PLACEHOLDER, text)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT.to_string(),
        }
    }
}

/// Client for an OpenAI-compatible chat completions endpoint (Groq by default)
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SummarizationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

impl ChatModel for ChatClient {
    async fn complete(&self, prompt: String) -> Result<String, SummarizationError> {
        debug!("Requesting completion from {} with model {}", self.api_base, self.model);

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ]
        });

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SummarizationError::Api { status, body });
        }

        let json: serde_json::Value = resp.json().await?;
        extract_completion_text(&json)
    }
}

fn extract_completion_text(json: &serde_json::Value) -> Result<String, SummarizationError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|t| t.trim().to_string())
        .ok_or(SummarizationError::UnexpectedResponse)
}

/// Summarize each chunk on its own, then combine the partial summaries
#[derive(Debug, Clone)]
pub struct MapReduce<M> {
    model: M,
    map_prompt: PromptTemplate,
    combine_prompt: PromptTemplate,
    chunk_chars: usize,
    token_max_chars: usize,
}

impl<M: ChatModel + Sync> MapReduce<M> {
    pub fn new(model: M, prompt: PromptTemplate, chunk_chars: usize, token_max_chars: usize) -> Self {
        Self {
            model,
            map_prompt: prompt.clone(),
            combine_prompt: prompt,
            chunk_chars: chunk_chars.max(1),
            token_max_chars: token_max_chars.max(1),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub async fn summarize(&self, docs: &[TranscriptDocument]) -> Result<String, SummarizationError> {
        let chunks: Vec<String> = docs
            .iter()
            .flat_map(|d| chunk_text(&d.text, self.chunk_chars))
            .collect();
        info!("Summarizing {} chunk(s) from {} document(s)", chunks.len(), docs.len());

        let mut partials = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            partials.push(self.model.complete(self.map_prompt.format(chunk)).await?);
        }

        loop {
            if joined_len(&partials) <= self.token_max_chars || partials.len() <= 1 {
                break;
            }
            let batches = batch_by_length(&partials, self.token_max_chars);
            if batches.len() == partials.len() {
                debug!("Partial summaries cannot be collapsed further ({} left)", partials.len());
                break;
            }
            debug!("Collapsing {} partial summaries into {}", partials.len(), batches.len());
            let mut collapsed = Vec::with_capacity(batches.len());
            for batch in batches {
                let prompt = self.combine_prompt.format(&batch.join(SUMMARY_SEPARATOR));
                collapsed.push(self.model.complete(prompt).await?);
            }
            partials = collapsed;
        }

        let combined = partials.join(SUMMARY_SEPARATOR);
        self.model.complete(self.combine_prompt.format(&combined)).await
    }
}

fn joined_len(parts: &[String]) -> usize {
    let seps = parts.len().saturating_sub(1) * SUMMARY_SEPARATOR.len();
    parts.iter().map(|p| p.chars().count()).sum::<usize>() + seps
}

/// Group consecutive parts so each group's joined length stays within `limit`
fn batch_by_length(parts: &[String], limit: usize) -> Vec<Vec<String>> {
    let mut batches: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for part in parts {
        let mut candidate = current.clone();
        candidate.push(part.clone());
        if !current.is_empty() && joined_len(&candidate) > limit {
            batches.push(std::mem::take(&mut current));
            current.push(part.clone());
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Split on whitespace into chunks of at most `max_chars` characters.
///
/// A single word longer than the limit becomes its own chunk. Empty input
/// still yields one (empty) chunk so the model sees the document.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}
