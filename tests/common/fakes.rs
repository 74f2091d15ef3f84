//! In-process stand-ins for the content store and the AI backend.

use super::constants::*;
use async_trait::async_trait;
use folio_server::ai::{AiClient, AiError, DocumentHandle};
use folio_server::content_store::{ContentDetails, ContentError, ContentStore};
use folio_server::job_queue::Perspective;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Content store serving the fixture documents.
pub struct FixtureContentStore {
    documents: HashMap<&'static str, &'static str>,
}

impl Default for FixtureContentStore {
    fn default() -> Self {
        Self {
            documents: HashMap::from([(DOC_EN_ID, DOC_EN_TEXT), (DOC_FR_ID, DOC_FR_TEXT)]),
        }
    }
}

#[async_trait]
impl ContentStore for FixtureContentStore {
    async fn get_content(&self, content_id: &str) -> Result<Vec<u8>, ContentError> {
        self.documents
            .get(content_id)
            .map(|text| text.as_bytes().to_vec())
            .ok_or_else(|| ContentError::NotFound(content_id.to_string()))
    }

    async fn get_details(&self, content_id: &str) -> Result<ContentDetails, ContentError> {
        let text = self
            .documents
            .get(content_id)
            .ok_or_else(|| ContentError::NotFound(content_id.to_string()))?;
        Ok(ContentDetails {
            filename: format!("{}.txt", content_id),
            size: text.len() as u64,
            mime_type: "text/plain".to_string(),
            creator: Some("tester".to_string()),
        })
    }
}

/// AI client answering deterministically from the document text.
///
/// With a gate, every model call waits for a permit, so tests can hold jobs
/// in the processing state.
#[derive(Default)]
pub struct FakeAiClient {
    gate: Option<Arc<Semaphore>>,
}

impl FakeAiClient {
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self { gate: Some(gate) }
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .expect("Gate semaphore closed")
                .forget();
        }
    }
}

#[async_trait]
impl AiClient for FakeAiClient {
    async fn upload_document(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<DocumentHandle, AiError> {
        Ok(DocumentHandle {
            id: format!("file-{}", filename),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            text: String::from_utf8_lossy(&bytes).to_string(),
        })
    }

    async fn generate_perspectives(
        &self,
        document: &DocumentHandle,
        prompts: &[String],
    ) -> Result<Vec<Perspective>, AiError> {
        self.pass_gate().await;
        Ok(prompts
            .iter()
            .map(|prompt| Perspective {
                prompt: prompt.clone(),
                response: format!("{} words", document.text.split_whitespace().count()),
            })
            .collect())
    }

    async fn generate_tags(
        &self,
        document: &DocumentHandle,
        _prompts: &[String],
    ) -> Result<Vec<String>, AiError> {
        self.pass_gate().await;
        Ok(document
            .text
            .split_whitespace()
            .filter(|w| w.len() > 5)
            .map(str::to_lowercase)
            .collect())
    }

    async fn detect_language(&self, document: &DocumentHandle) -> Result<String, AiError> {
        self.pass_gate().await;
        if document.text.starts_with("bonjour") {
            Ok("fr".to_string())
        } else {
            Ok("en".to_string())
        }
    }
}
