use super::TemplateDeps;
use crate::job_queue::context::JobContext;
use crate::job_queue::job::{JobError, JobTemplate};
use crate::job_queue::models::{JobAttributes, JobKind, JobOutput, TemplateId};
use async_trait::async_trait;
use tracing::info;

/// Answers a set of prompts against a document.
pub struct PerspectivesTemplate {
    deps: TemplateDeps,
}

impl PerspectivesTemplate {
    pub fn new(deps: TemplateDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobTemplate for PerspectivesTemplate {
    fn id(&self) -> TemplateId {
        TemplateId::Builtin(JobKind::Perspectives)
    }

    fn description(&self) -> &'static str {
        "Generate perspectives on a document"
    }

    async fn execute(
        &self,
        ctx: &JobContext,
        attributes: &JobAttributes,
    ) -> Result<JobOutput, JobError> {
        let JobAttributes::Perspectives(payload) = attributes else {
            return Err(JobError::InvalidAttributes(format!(
                "expected perspectives payload, got {}",
                attributes.template_id()
            )));
        };

        let document = self.deps.prepare_document(&payload.content_id).await?;
        let perspectives = self
            .deps
            .ai
            .generate_perspectives(&document, &payload.prompts)
            .await?;
        info!(
            "Job {} produced {} perspectives",
            ctx.request_id,
            perspectives.len()
        );
        Ok(JobOutput::Perspectives(perspectives))
    }
}
