use super::models::JobStatus;
use super::store::JobStatusStore;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StatusUpdateError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error("job {request_id} cannot move from {from} to {to}")]
    InvalidTransition {
        request_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {0} changed status concurrently")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// The only path through which job statuses change.
///
/// Cheap to clone and safe to call from any task, including collaborators
/// that finish work outside a template's own call stack.
#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<dyn JobStatusStore>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn JobStatusStore>) -> Self {
        Self { store }
    }

    /// Move a job to `status`, recording `error` alongside it.
    ///
    /// Only forward transitions are accepted, and a pending job cannot be
    /// marked processing: that belongs to the queue's loop. The write is
    /// conditional on the status that was read, so two concurrent reporters
    /// cannot both win.
    pub fn report(
        &self,
        request_id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StatusUpdateError> {
        let current = self
            .store
            .find_by_id(request_id)?
            .ok_or_else(|| StatusUpdateError::NotFound(request_id.to_string()))?
            .status;

        if !current.can_report(status) {
            warn!(
                "Rejected status update for job {}: {} -> {}",
                request_id, current, status
            );
            return Err(StatusUpdateError::InvalidTransition {
                request_id: request_id.to_string(),
                from: current,
                to: status,
            });
        }

        if !self.store.update_status(request_id, current, status, error)? {
            return Err(StatusUpdateError::Conflict(request_id.to_string()));
        }
        debug!("Job {} moved {} -> {}", request_id, current, status);
        Ok(())
    }
}

/// Context provided to templates during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Request id of the job being executed.
    pub request_id: String,

    /// Status update entry point, for work that completes in the background.
    pub reporter: StatusReporter,
}

impl JobContext {
    pub fn new(request_id: impl Into<String>, reporter: StatusReporter) -> Self {
        Self {
            request_id: request_id.into(),
            reporter,
        }
    }
}
