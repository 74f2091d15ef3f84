//! Built-in job templates.
//!
//! Each template materializes a document from the content store, hands it to
//! the AI client and returns what the model produced.

mod custom_prompt;
mod language;
mod perspectives;
mod tags;

pub use custom_prompt::{CustomPromptPayload, CustomPromptTemplate, CUSTOM_PROMPT_TEMPLATE};
pub use language::LanguageTemplate;
pub use perspectives::PerspectivesTemplate;
pub use tags::TagsTemplate;

use super::job::JobError;
use super::registry::TemplateRegistry;
use crate::ai::{AiClient, DocumentHandle};
use crate::content_store::ContentStore;
use std::sync::Arc;
use tracing::debug;

/// Collaborators shared by all built-in templates.
#[derive(Clone)]
pub struct TemplateDeps {
    pub content: Arc<dyn ContentStore>,
    pub ai: Arc<dyn AiClient>,
}

impl TemplateDeps {
    /// Fetch a document and upload it to the AI client.
    pub(crate) async fn prepare_document(
        &self,
        content_id: &str,
    ) -> Result<DocumentHandle, JobError> {
        let details = self.content.get_details(content_id).await?;
        let bytes = self.content.get_content(content_id).await?;
        debug!(
            "Fetched content {} ({}, {} bytes)",
            content_id,
            details.mime_type,
            bytes.len()
        );
        let document = self
            .ai
            .upload_document(bytes, &details.filename, &details.mime_type)
            .await?;
        Ok(document)
    }
}

/// Registry with every built-in template plus the custom-prompt template.
pub fn default_registry(deps: TemplateDeps) -> TemplateRegistry {
    let mut registry = TemplateRegistry::new();
    registry.register(Arc::new(PerspectivesTemplate::new(deps.clone())));
    registry.register(Arc::new(TagsTemplate::new(deps.clone())));
    registry.register(Arc::new(LanguageTemplate::new(deps.clone())));
    registry.register(Arc::new(CustomPromptTemplate::new(deps)));
    registry
}
