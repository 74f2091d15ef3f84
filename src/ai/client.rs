//! Document-level AI operations built on an [`LlmProvider`].

use super::provider::{CompletionOptions, LlmError, LlmProvider};
use super::types::Message;
use crate::job_queue::Perspective;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum AiError {
    #[error("unsupported document type {0}")]
    UnsupportedDocument(String),

    #[error("document is empty")]
    EmptyDocument,

    #[error("model returned an unusable answer: {0}")]
    UnusableAnswer(String),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// A document made available to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub text: String,
}

/// AI operations the job templates need.
#[async_trait]
pub trait AiClient: Send + Sync {
    /// Make a document available to later calls.
    async fn upload_document(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<DocumentHandle, AiError>;

    /// Answer each prompt against the document. An empty list uses default prompts.
    async fn generate_perspectives(
        &self,
        document: &DocumentHandle,
        prompts: &[String],
    ) -> Result<Vec<Perspective>, AiError>;

    /// Short lowercase topic tags, with optional extra guidance.
    async fn generate_tags(
        &self,
        document: &DocumentHandle,
        prompts: &[String],
    ) -> Result<Vec<String>, AiError>;

    /// ISO 639-1 code of the document's main language.
    async fn detect_language(&self, document: &DocumentHandle) -> Result<String, AiError>;
}

#[derive(Debug, Clone)]
pub struct AiClientOptions {
    /// Documents are truncated to this many characters before prompting.
    pub max_document_chars: usize,
    pub max_tags: usize,
    pub completion: CompletionOptions,
}

impl Default for AiClientOptions {
    fn default() -> Self {
        Self {
            max_document_chars: 48_000,
            max_tags: 8,
            completion: CompletionOptions::default(),
        }
    }
}

const DEFAULT_PERSPECTIVE_PROMPTS: [&str; 3] = [
    "Summarize the main argument of this document in a few sentences.",
    "What would a skeptical reader object to in this document?",
    "Which questions does this document leave unanswered?",
];

const SYSTEM_PROMPT: &str = "You are an assistant helping collaborators understand a shared \
     document. Answer only from the document's content.";

/// [`AiClient`] that inlines document text into chat completions.
pub struct LlmAiClient {
    provider: Arc<dyn LlmProvider>,
    options: AiClientOptions,
}

impl LlmAiClient {
    pub fn new(provider: Arc<dyn LlmProvider>, options: AiClientOptions) -> Self {
        Self { provider, options }
    }

    async fn ask(&self, document: &DocumentHandle, instruction: &str) -> Result<String, AiError> {
        let messages = [
            Message::system(SYSTEM_PROMPT),
            Message::user(format!(
                "Document \"{}\":\n\n{}\n\n---\n\n{}",
                document.filename, document.text, instruction
            )),
        ];
        let response = self
            .provider
            .complete(&messages, &self.options.completion)
            .await?;
        debug!(
            provider = self.provider.name(),
            model = self.provider.model(),
            document = %document.id,
            total_tokens = ?response.usage.as_ref().map(|u| u.total_tokens),
            "Completion finished with {:?}",
            response.finish_reason
        );
        Ok(response.message.content.trim().to_string())
    }
}

fn is_textual(mime_type: &str) -> bool {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    essence.starts_with("text/")
        || matches!(
            essence,
            "application/json" | "application/xml" | "application/x-yaml" | "application/yaml"
        )
}

/// Decode a textual document, cut to at most `max_chars` characters.
pub fn extract_text(bytes: &[u8], mime_type: &str, max_chars: usize) -> Result<String, AiError> {
    if !is_textual(mime_type) {
        return Err(AiError::UnsupportedDocument(mime_type.to_string()));
    }
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() {
        return Err(AiError::EmptyDocument);
    }
    Ok(match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    })
}

/// Drops bullet ("- ", "* ", "# ") and numbering ("1. ", "2) ") prefixes.
fn strip_list_marker(s: &str) -> &str {
    let s = s.trim_start_matches(['-', '*', '#']).trim_start();
    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 && s[digits..].starts_with(['.', ')']) {
        s[digits + 1..].trim_start()
    } else {
        s
    }
}

/// Turn a free-form model answer into a deduplicated list of tags.
pub fn parse_tags(answer: &str, max_tags: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    answer
        .split([',', '\n', ';'])
        .map(|raw| {
            strip_list_marker(raw.trim())
                .trim()
                .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
                .to_lowercase()
        })
        .filter(|tag| !tag.is_empty() && tag.len() <= 40)
        .filter(|tag| seen.insert(tag.clone()))
        .take(max_tags)
        .collect()
}

/// Extract a language code such as `en` or `pt` from a model answer.
pub fn parse_language(answer: &str) -> Result<String, AiError> {
    let mut words = answer.split_whitespace();
    let (Some(word), None) = (words.next(), words.next()) else {
        return Err(AiError::UnusableAnswer(answer.to_string()));
    };
    let code: String = word
        .trim_matches(|c: char| !c.is_ascii_alphabetic())
        .to_lowercase();
    // Accept regional variants like en-US by keeping the primary subtag
    let primary = code.split(['-', '_']).next().unwrap_or_default();
    if (2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_lowercase()) {
        Ok(primary.to_string())
    } else {
        Err(AiError::UnusableAnswer(answer.to_string()))
    }
}

#[async_trait]
impl AiClient for LlmAiClient {
    async fn upload_document(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<DocumentHandle, AiError> {
        let text = extract_text(&bytes, mime_type, self.options.max_document_chars)?;
        let handle = DocumentHandle {
            id: format!("doc_{}", uuid::Uuid::new_v4().simple()),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            text,
        };
        info!(
            "Prepared document {} ({}, {} chars)",
            handle.id,
            filename,
            handle.text.chars().count()
        );
        Ok(handle)
    }

    async fn generate_perspectives(
        &self,
        document: &DocumentHandle,
        prompts: &[String],
    ) -> Result<Vec<Perspective>, AiError> {
        let prompts: Vec<String> = if prompts.is_empty() {
            DEFAULT_PERSPECTIVE_PROMPTS
                .iter()
                .map(|p| p.to_string())
                .collect()
        } else {
            prompts.to_vec()
        };

        let mut perspectives = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let response = self.ask(document, &prompt).await?;
            if response.is_empty() {
                return Err(AiError::UnusableAnswer(format!(
                    "empty answer to \"{}\"",
                    prompt
                )));
            }
            perspectives.push(Perspective { prompt, response });
        }
        Ok(perspectives)
    }

    async fn generate_tags(
        &self,
        document: &DocumentHandle,
        prompts: &[String],
    ) -> Result<Vec<String>, AiError> {
        let mut instruction = format!(
            "List at most {} short topic tags for this document as a single comma separated \
             line. Reply with the tags only.",
            self.options.max_tags
        );
        for prompt in prompts {
            instruction.push('\n');
            instruction.push_str(prompt);
        }

        let answer = self.ask(document, &instruction).await?;
        let tags = parse_tags(&answer, self.options.max_tags);
        if tags.is_empty() {
            return Err(AiError::UnusableAnswer(answer));
        }
        Ok(tags)
    }

    async fn detect_language(&self, document: &DocumentHandle) -> Result<String, AiError> {
        let answer = self
            .ask(
                document,
                "Reply with only the ISO 639-1 code of the main language of this document.",
            )
            .await?;
        parse_language(&answer)
    }
}
