//! AI client facade.
//!
//! Templates talk to [`AiClient`]; the production implementation sends chat
//! completions through an [`LlmProvider`], so any OpenAI-compatible backend
//! can be plugged in.

mod client;
mod openai;
mod provider;
mod types;

pub use client::{
    extract_text, parse_language, parse_tags, AiClient, AiClientOptions, AiError,
    DocumentHandle, LlmAiClient,
};
pub use openai::OpenAIProvider;
pub use provider::{CompletionOptions, LlmError, LlmProvider};
pub use types::{CompletionResponse, FinishReason, Message, MessageRole, TokenUsage};
