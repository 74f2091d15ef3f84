//! Durable single-flight job queue.
//!
//! Long-running AI work on documents is persisted in a status store, executed
//! one job at a time in FIFO order, and replayed after a restart.

mod context;
mod job;
mod models;
mod recovery;
mod registry;
mod scheduler;
mod schema;
mod store;
pub mod templates;

pub use context::{JobContext, StatusReporter, StatusUpdateError};
pub use job::{FnTemplate, JobError, JobTemplate};
pub use models::{
    random_request_id, AttributesError, JobAttributes, JobCounts, JobKind, JobOutput,
    JobRecord, JobStatus, JobStatusView, LanguagePayload, NewJob, Perspective,
    PerspectivesPayload, TagsPayload, TemplateId,
};
pub use recovery::RecoveryReport;
pub use registry::TemplateRegistry;
pub use scheduler::{EnqueueError, Enqueued, JobQueue};
pub use store::{JobStatusStore, SqliteJobStatusStore};
