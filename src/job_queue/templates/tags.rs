use super::TemplateDeps;
use crate::job_queue::context::JobContext;
use crate::job_queue::job::{JobError, JobTemplate};
use crate::job_queue::models::{JobAttributes, JobKind, JobOutput, TemplateId};
use async_trait::async_trait;
use tracing::info;

/// Suggests topic tags for a document.
pub struct TagsTemplate {
    deps: TemplateDeps,
}

impl TagsTemplate {
    pub fn new(deps: TemplateDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobTemplate for TagsTemplate {
    fn id(&self) -> TemplateId {
        TemplateId::Builtin(JobKind::Tags)
    }

    fn description(&self) -> &'static str {
        "Generate topic tags for a document"
    }

    async fn execute(
        &self,
        ctx: &JobContext,
        attributes: &JobAttributes,
    ) -> Result<JobOutput, JobError> {
        let JobAttributes::Tags(payload) = attributes else {
            return Err(JobError::InvalidAttributes(format!(
                "expected tags payload, got {}",
                attributes.template_id()
            )));
        };

        let document = self.deps.prepare_document(&payload.content_id).await?;
        let tags = self.deps.ai.generate_tags(&document, &payload.prompts).await?;
        info!("Job {} produced tags: {}", ctx.request_id, tags.join(", "));
        Ok(JobOutput::Tags(tags))
    }
}
