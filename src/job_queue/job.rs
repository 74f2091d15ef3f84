use super::context::JobContext;
use super::models::{AttributesError, JobAttributes, JobOutput, TemplateId};
use crate::ai::AiError;
use crate::content_store::ContentError;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Errors a template can fail with. The `Display` text is what gets
/// persisted as the job's error.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid attributes: {0}")]
    InvalidAttributes(String),

    #[error("{0}")]
    Content(#[from] ContentError),

    #[error("{0}")]
    Ai(#[from] AiError),

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("Task panic: {0}")]
    Panicked(String),
}

impl JobError {
    pub fn failed(msg: impl Into<String>) -> Self {
        JobError::ExecutionFailed(msg.into())
    }
}

impl From<AttributesError> for JobError {
    fn from(e: AttributesError) -> Self {
        JobError::InvalidAttributes(e.to_string())
    }
}

/// A unit of work the queue knows how to run.
///
/// Templates are registered once at startup and invoked by the queue's
/// processing loop, one job at a time.
#[async_trait]
pub trait JobTemplate: Send + Sync {
    /// Registry key for this template.
    fn id(&self) -> TemplateId;

    /// Description of what this template does.
    fn description(&self) -> &'static str;

    async fn execute(
        &self,
        ctx: &JobContext,
        attributes: &JobAttributes,
    ) -> Result<JobOutput, JobError>;
}

type JobFuture = Pin<Box<dyn Future<Output = Result<JobOutput, JobError>> + Send>>;
type BoxedRun = Box<dyn Fn(JobContext, JobAttributes) -> JobFuture + Send + Sync>;

/// Template backed by a plain async function.
pub struct FnTemplate {
    id: TemplateId,
    run: BoxedRun,
}

impl FnTemplate {
    pub fn new<F, Fut>(id: TemplateId, f: F) -> Arc<Self>
    where
        F: Fn(JobContext, JobAttributes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, JobError>> + Send + 'static,
    {
        Arc::new(FnTemplate {
            id,
            run: Box::new(move |ctx: JobContext, attributes: JobAttributes| -> JobFuture {
                Box::pin(f(ctx, attributes))
            }),
        })
    }
}

#[async_trait]
impl JobTemplate for FnTemplate {
    fn id(&self) -> TemplateId {
        self.id.clone()
    }

    fn description(&self) -> &'static str {
        "function template"
    }

    async fn execute(
        &self,
        ctx: &JobContext,
        attributes: &JobAttributes,
    ) -> Result<JobOutput, JobError> {
        (self.run)(ctx.clone(), attributes.clone()).await
    }
}
