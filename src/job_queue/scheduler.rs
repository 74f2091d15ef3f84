//! Single-flight job queue.
//!
//! Jobs are persisted in the status store and mirrored in an in-memory FIFO.
//! One processing loop drains the FIFO, running exactly one template at a
//! time; `enqueue` only appends and wakes the loop if it is not running.

use super::context::{JobContext, StatusReporter, StatusUpdateError};
use super::job::JobError;
use super::models::{
    AttributesError, JobAttributes, JobCounts, JobOutput, JobStatus, JobStatusView, NewJob,
    TemplateId,
};
use super::recovery::{self, RecoveryReport};
use super::registry::TemplateRegistry;
use super::store::JobStatusStore;
use crate::server::metrics;
use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("no template registered for '{0}'")]
    UnknownTemplate(String),

    #[error(transparent)]
    InvalidAttributes(#[from] AttributesError),

    #[error("failed to persist job: {0}")]
    Store(#[from] anyhow::Error),
}

/// Outcome of a successful `enqueue` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enqueued {
    pub request_id: String,
    /// False when a job with this request id already existed.
    pub created: bool,
}

#[derive(Debug, Clone)]
pub(super) struct QueueEntry {
    pub request_id: String,
    pub template_id: TemplateId,
    pub attributes: JobAttributes,
    pub status: JobStatus,
    /// Assigned by `push_entry`. Tells a re-enqueued id apart from a deleted
    /// entry that is still running under the same id.
    token: u64,
}

impl QueueEntry {
    pub(super) fn new(
        request_id: String,
        template_id: TemplateId,
        attributes: JobAttributes,
    ) -> Self {
        Self {
            request_id,
            template_id,
            attributes,
            status: JobStatus::Pending,
            token: 0,
        }
    }
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    is_processing: bool,
    next_token: u64,
    results: HashMap<String, JobOutput>,
    recovery: RecoveryReport,
}

pub(super) struct QueueInner {
    pub(super) store: Arc<dyn JobStatusStore>,
    pub(super) registry: TemplateRegistry,
    reporter: StatusReporter,
    state: Mutex<QueueState>,
    /// Serializes the exists-check and insert of concurrent enqueues.
    admission: Mutex<()>,
    idle: Notify,
}

/// Handle to the job queue. Clones share the same queue.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl JobQueue {
    /// Build the queue and replay unfinished jobs from the store.
    ///
    /// Must be called from within a Tokio runtime. Recovery completes before
    /// this returns, so no enqueue can race it.
    pub fn start(store: Arc<dyn JobStatusStore>, registry: TemplateRegistry) -> Result<Self> {
        let reporter = StatusReporter::new(Arc::clone(&store));
        let inner = Arc::new(QueueInner {
            store,
            registry,
            reporter,
            state: Mutex::new(QueueState::default()),
            admission: Mutex::new(()),
            idle: Notify::new(),
        });

        let report = recovery::recover(&inner)?;
        info!(
            "Job queue started: {} jobs re-armed, {} skipped",
            report.rearmed,
            report.skipped.len()
        );
        inner.state.lock().unwrap().recovery = report;

        let queue = JobQueue { inner };
        queue.trigger();
        Ok(queue)
    }

    /// Schedule a job under `request_id`.
    ///
    /// Returns immediately. Enqueueing an id that already exists leaves the
    /// existing job untouched and reports `created: false`.
    pub fn enqueue(
        &self,
        request_id: impl Into<String>,
        attributes: JobAttributes,
    ) -> Result<Enqueued, EnqueueError> {
        let request_id = request_id.into();
        let template_id = attributes.template_id();

        if !self.inner.registry.contains(&template_id) {
            error!(
                "No template registered for '{}', not enqueueing job {}",
                template_id, request_id
            );
            metrics::record_job_enqueued(template_id.as_str(), "rejected");
            return Err(EnqueueError::UnknownTemplate(template_id.to_string()));
        }

        let job = NewJob::new(request_id.clone(), &attributes, now_millis())?;

        {
            let _admission = self.inner.admission.lock().unwrap();

            let created = self.inner.store.find_by_id(&request_id)?.is_none()
                && self.inner.store.insert(&job)?;
            if !created {
                info!("Job {} already exists, skipping", request_id);
                metrics::record_job_enqueued(template_id.as_str(), "duplicate");
                return Ok(Enqueued {
                    request_id,
                    created: false,
                });
            }

            self.inner.push_entry(QueueEntry::new(
                request_id.clone(),
                template_id.clone(),
                attributes,
            ));
        }

        info!("Enqueued job {} ({})", request_id, template_id);
        metrics::record_job_enqueued(template_id.as_str(), "created");
        self.trigger();

        Ok(Enqueued {
            request_id,
            created: true,
        })
    }

    /// Status of a job as reported to polling clients, `None` if unknown.
    pub fn get_status(&self, request_id: &str) -> Result<Option<JobStatusView>> {
        let Some(record) = self.inner.store.find_by_id(request_id)? else {
            return Ok(None);
        };

        let jobs_before = if record.status == JobStatus::Pending {
            let own_key = record.order_key();
            self.inner
                .store
                .find_pending_or_processing(Some(request_id))?
                .iter()
                .filter(|other| other.order_key() < own_key)
                .count() as i64
        } else {
            -1
        };

        Ok(Some(JobStatusView {
            status: record.status,
            timestamp: record.last_changed_at(),
            jobs_before,
            error: record.error,
        }))
    }

    /// Status transition entry point for collaborators.
    pub fn update_status(
        &self,
        request_id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StatusUpdateError> {
        self.inner.reporter.report(request_id, status, error)
    }

    /// A reporter that can be handed to collaborators living outside the queue.
    pub fn reporter(&self) -> StatusReporter {
        self.inner.reporter.clone()
    }

    /// Output of a completed job, if this process ran it.
    pub fn result(&self, request_id: &str) -> Option<JobOutput> {
        self.inner
            .state
            .lock()
            .unwrap()
            .results
            .get(request_id)
            .cloned()
    }

    /// Remove jobs from the store and from memory. A job that is currently
    /// running finishes, but its outcome is not persisted.
    pub fn delete_jobs(&self, request_ids: &[String]) -> Result<usize> {
        let deleted = self.inner.store.delete_many(request_ids)?;

        let ids: HashSet<&str> = request_ids.iter().map(String::as_str).collect();
        let mut state = self.inner.state.lock().unwrap();
        state
            .entries
            .retain(|entry| !ids.contains(entry.request_id.as_str()));
        state.results.retain(|id, _| !ids.contains(id.as_str()));
        metrics::set_job_queue_length(state.entries.len());

        info!("Deleted {} jobs", deleted);
        Ok(deleted)
    }

    /// Jobs in the in-memory queue, including the running one.
    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().unwrap().entries.len()
    }

    /// Request ids in the in-memory queue, in execution order.
    pub fn queued_ids(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(|e| e.request_id.clone())
            .collect()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().unwrap().is_processing
    }

    /// Persisted job counts, also published as metrics.
    pub fn counts(&self) -> Result<JobCounts> {
        let counts = self.inner.store.count_by_status()?;
        metrics::set_jobs_by_status("pending", counts.pending);
        metrics::set_jobs_by_status("processing", counts.processing);
        metrics::set_jobs_by_status("completed", counts.completed);
        metrics::set_jobs_by_status("failed", counts.failed);
        Ok(counts)
    }

    /// What recovery did when this queue started.
    pub fn recovery_report(&self) -> RecoveryReport {
        self.inner.state.lock().unwrap().recovery.clone()
    }

    pub fn template_ids(&self) -> Vec<String> {
        self.inner.registry.template_ids()
    }

    /// Wait until the in-memory queue is drained and the loop has stopped.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            {
                let state = self.inner.state.lock().unwrap();
                if !state.is_processing && state.entries.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Start the processing loop unless it is already running.
    fn trigger(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.is_processing || state.entries.is_empty() {
                return;
            }
            state.is_processing = true;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run_loop().await });
    }
}

impl QueueInner {
    /// Append an entry unless the same request id is already queued.
    pub(super) fn push_entry(&self, mut entry: QueueEntry) -> bool {
        let mut state = self.state.lock().unwrap();
        if state
            .entries
            .iter()
            .any(|e| e.request_id == entry.request_id)
        {
            return false;
        }
        entry.token = state.next_token;
        state.next_token += 1;
        state.entries.push_back(entry);
        metrics::set_job_queue_length(state.entries.len());
        true
    }

    async fn run_loop(self: Arc<Self>) {
        debug!("Job processing loop started");
        loop {
            let entry = {
                let mut state = self.state.lock().unwrap();
                match state.entries.front() {
                    Some(entry) => entry.clone(),
                    None => {
                        // Cleared under the same lock `trigger` checks, so no wakeup is lost
                        state.is_processing = false;
                        drop(state);
                        self.idle.notify_waiters();
                        debug!("Job processing loop idle");
                        return;
                    }
                }
            };

            self.process(&entry).await;

            let mut state = self.state.lock().unwrap();
            if state
                .entries
                .front()
                .is_some_and(|head| head.token == entry.token)
            {
                state.entries.pop_front();
            }
            metrics::set_job_queue_length(state.entries.len());
        }
    }

    fn set_head_status(&self, token: u64, status: JobStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(head) = state.entries.front_mut() {
            if head.token == token {
                head.status = status;
            }
        }
    }

    async fn process(&self, entry: &QueueEntry) {
        let request_id = entry.request_id.as_str();

        // The store is authoritative: the job may have been advanced or deleted meanwhile
        match self.store.find_by_id(request_id) {
            Ok(Some(record)) if record.status == JobStatus::Pending => {}
            Ok(Some(record)) => {
                info!(
                    "Job {} is {} in the store, not running it",
                    request_id, record.status
                );
                return;
            }
            Ok(None) => {
                warn!("Job {} no longer exists, dropping it", request_id);
                return;
            }
            Err(e) => {
                error!("Failed to read status of job {}: {}", request_id, e);
                return;
            }
        }

        let Some(template) = self.registry.get(&entry.template_id) else {
            error!(
                "No template registered for '{}', failing job {}",
                entry.template_id, request_id
            );
            self.persist_transition(
                request_id,
                JobStatus::Pending,
                JobStatus::Failed,
                Some("template not registered"),
            );
            return;
        };

        if !self.persist_transition(request_id, JobStatus::Pending, JobStatus::Processing, None) {
            return;
        }
        self.set_head_status(entry.token, JobStatus::Processing);
        info!("Running job {} ({})", request_id, entry.template_id);

        let ctx = JobContext::new(request_id, self.reporter.clone());
        let attributes = entry.attributes.clone();
        let start_time = Instant::now();

        // Run in its own task so a panicking template only fails its job
        let handle =
            tokio::spawn(async move { template.execute(&ctx, &attributes).await });
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(JobError::Panicked(e.to_string())),
        };
        let elapsed = start_time.elapsed();

        let template_label = entry.template_id.as_str();
        match result {
            Ok(output) => {
                info!("Job {} completed in {:?}", request_id, elapsed);
                self.state
                    .lock()
                    .unwrap()
                    .results
                    .insert(request_id.to_string(), output);
                self.set_head_status(entry.token, JobStatus::Completed);
                if !self.persist_transition(
                    request_id,
                    JobStatus::Processing,
                    JobStatus::Completed,
                    None,
                ) {
                    self.state.lock().unwrap().results.remove(request_id);
                }
                metrics::record_job_execution(template_label, "completed", elapsed);
            }
            Err(e) => {
                let message = e.to_string();
                error!("Job {} failed after {:?}: {}", request_id, elapsed, message);
                self.set_head_status(entry.token, JobStatus::Failed);
                self.persist_transition(
                    request_id,
                    JobStatus::Processing,
                    JobStatus::Failed,
                    Some(&message),
                );
                let outcome = match e {
                    JobError::Panicked(_) => "panic",
                    _ => "failed",
                };
                metrics::record_job_execution(template_label, outcome, elapsed);
            }
        }
    }

    /// Best-effort status write from the loop. Failures are logged, never raised.
    ///
    /// Returns false only when the job is no longer in `from` because someone
    /// else moved or deleted it.
    fn persist_transition(
        &self,
        request_id: &str,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> bool {
        match self.store.update_status(request_id, from, to, error) {
            Ok(true) => true,
            Ok(false) => {
                self.log_lost_transition(request_id, to);
                false
            }
            Err(e) => {
                metrics::record_error("persistence", "job_queue");
                error!("Failed to persist job {} as {}: {}", request_id, to, e);
                true
            }
        }
    }

    fn log_lost_transition(&self, request_id: &str, to: JobStatus) {
        match self.store.find_by_id(request_id) {
            Ok(Some(record)) => info!(
                "Job {} was already moved to {}, not marking it {}",
                request_id, record.status, to
            ),
            Ok(None) => info!(
                "Job {} was deleted while running, dropping its {} status",
                request_id, to
            ),
            Err(e) => error!("Failed to read status of job {}: {}", request_id, e),
        }
    }
}
