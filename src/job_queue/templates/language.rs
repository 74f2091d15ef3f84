use super::TemplateDeps;
use crate::job_queue::context::JobContext;
use crate::job_queue::job::{JobError, JobTemplate};
use crate::job_queue::models::{JobAttributes, JobKind, JobOutput, TemplateId};
use async_trait::async_trait;
use tracing::info;

/// Detects the main language of a document.
pub struct LanguageTemplate {
    deps: TemplateDeps,
}

impl LanguageTemplate {
    pub fn new(deps: TemplateDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobTemplate for LanguageTemplate {
    fn id(&self) -> TemplateId {
        TemplateId::Builtin(JobKind::Language)
    }

    fn description(&self) -> &'static str {
        "Detect the language of a document"
    }

    async fn execute(
        &self,
        ctx: &JobContext,
        attributes: &JobAttributes,
    ) -> Result<JobOutput, JobError> {
        let JobAttributes::Language(payload) = attributes else {
            return Err(JobError::InvalidAttributes(format!(
                "expected language payload, got {}",
                attributes.template_id()
            )));
        };

        let document = self.deps.prepare_document(&payload.content_id).await?;
        let language = self.deps.ai.detect_language(&document).await?;
        info!("Job {} detected language {}", ctx.request_id, language);
        Ok(JobOutput::Language(language))
    }
}
