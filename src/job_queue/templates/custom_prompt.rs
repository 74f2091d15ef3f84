use super::TemplateDeps;
use crate::job_queue::context::JobContext;
use crate::job_queue::job::{JobError, JobTemplate};
use crate::job_queue::models::{JobAttributes, JobOutput, TemplateId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Registry key of the custom-prompt template.
pub const CUSTOM_PROMPT_TEMPLATE: &str = "custom_prompt";

/// User supplied prompts to run against a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPromptPayload {
    pub content_id: String,
    pub prompts: Vec<String>,
}

impl CustomPromptPayload {
    pub fn into_attributes(self) -> Result<JobAttributes, serde_json::Error> {
        Ok(JobAttributes::Custom {
            template: CUSTOM_PROMPT_TEMPLATE.to_string(),
            payload: serde_json::to_value(self)?,
        })
    }

    fn from_value(value: &Value) -> Result<Self, JobError> {
        let payload: Self = serde_json::from_value(value.clone())
            .map_err(|e| JobError::InvalidAttributes(e.to_string()))?;
        if payload.prompts.iter().all(|p| p.trim().is_empty()) {
            return Err(JobError::InvalidAttributes(
                "custom prompt job needs at least one prompt".to_string(),
            ));
        }
        Ok(payload)
    }
}

/// Runs user-written prompts against a document. Every request gets a fresh
/// id, so the same prompts can be asked again.
pub struct CustomPromptTemplate {
    deps: TemplateDeps,
}

impl CustomPromptTemplate {
    pub fn new(deps: TemplateDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobTemplate for CustomPromptTemplate {
    fn id(&self) -> TemplateId {
        TemplateId::custom(CUSTOM_PROMPT_TEMPLATE)
    }

    fn description(&self) -> &'static str {
        "Answer user supplied prompts about a document"
    }

    async fn execute(
        &self,
        ctx: &JobContext,
        attributes: &JobAttributes,
    ) -> Result<JobOutput, JobError> {
        let payload = match attributes {
            JobAttributes::Custom { template, payload } if template == CUSTOM_PROMPT_TEMPLATE => {
                CustomPromptPayload::from_value(payload)?
            }
            other => {
                return Err(JobError::InvalidAttributes(format!(
                    "expected custom prompt payload, got {}",
                    other.template_id()
                )))
            }
        };

        let document = self.deps.prepare_document(&payload.content_id).await?;
        let answers = self
            .deps
            .ai
            .generate_perspectives(&document, &payload.prompts)
            .await?;
        info!(
            "Job {} answered {} custom prompts",
            ctx.request_id,
            answers.len()
        );
        Ok(JobOutput::Perspectives(answers))
    }
}
