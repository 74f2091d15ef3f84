//! HTTP surface of the job queue.

use super::metrics::record_error;
use super::state::ServerState;
use super::ServerConfig;
use crate::job_queue::templates::CustomPromptPayload;
use crate::job_queue::{
    random_request_id, EnqueueError, JobAttributes, JobKind, JobOutput, JobQueue, JobStatusView,
    LanguagePayload, PerspectivesPayload, RecoveryReport, TagsPayload,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Deserialize, Debug, Default)]
struct PromptsBody {
    #[serde(default)]
    prompts: Vec<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DeleteJobsBody {
    request_ids: Vec<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EnqueueResponse {
    request_id: String,
    message: String,
    status_endpoint: String,
}

#[derive(Serialize, Debug)]
struct DeleteJobsResponse {
    deleted: usize,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueueStats {
    pending: usize,
    processing: usize,
    completed: usize,
    failed: usize,
    queue_length: usize,
    is_processing: bool,
    templates: Vec<String>,
    recovery: RecoveryReport,
}

fn attributes_for(kind: JobKind, content_id: String, prompts: Vec<String>) -> JobAttributes {
    match kind {
        JobKind::Perspectives => JobAttributes::Perspectives(PerspectivesPayload {
            content_id,
            prompts,
        }),
        JobKind::Tags => JobAttributes::Tags(TagsPayload {
            content_id,
            prompts,
        }),
        JobKind::Language => JobAttributes::Language(LanguagePayload { content_id }),
    }
}

fn enqueue_response(
    queue: &JobQueue,
    config: &ServerConfig,
    request_id: String,
    attributes: JobAttributes,
    endpoint: &str,
) -> Response {
    match queue.enqueue(request_id, attributes) {
        Ok(enqueued) => {
            let message = if enqueued.created {
                "Job queued"
            } else {
                "Job already exists"
            };
            let body = EnqueueResponse {
                status_endpoint: config.status_endpoint(&enqueued.request_id),
                request_id: enqueued.request_id,
                message: message.to_string(),
            };
            (StatusCode::ACCEPTED, Json(body)).into_response()
        }
        Err(EnqueueError::InvalidAttributes(err)) => {
            warn!("Rejected job: {}", err);
            record_error("invalid_attributes", endpoint);
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to enqueue job: {}", err);
            record_error("enqueue_failed", endpoint);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

fn parse_prompts(body: &Bytes) -> Result<PromptsBody, Response> {
    if body.is_empty() {
        return Ok(PromptsBody::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid body: {}", e)).into_response())
}

async fn enqueue_builtin(
    State(state): State<ServerState>,
    Path((kind, content_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let Some(kind) = JobKind::from_str(&kind) else {
        return (StatusCode::BAD_REQUEST, format!("Unknown job kind: {}", kind)).into_response();
    };
    let prompts = match parse_prompts(&body) {
        Ok(body) => body.prompts,
        Err(response) => return response,
    };

    let request_id = kind.request_id_for(&content_id);
    let attributes = attributes_for(kind, content_id, prompts);
    enqueue_response(
        &state.job_queue,
        &state.config,
        request_id,
        attributes,
        "/v1/jobs/{kind}/{content_id}",
    )
}

async fn enqueue_custom(
    State(state): State<ServerState>,
    Json(payload): Json<CustomPromptPayload>,
) -> Response {
    if payload.prompts.iter().all(|p| p.trim().is_empty()) {
        return (StatusCode::BAD_REQUEST, "At least one prompt is required").into_response();
    }
    let attributes = match payload.into_attributes() {
        Ok(attributes) => attributes,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    enqueue_response(
        &state.job_queue,
        &state.config,
        random_request_id(),
        attributes,
        "/v1/jobs/custom",
    )
}

async fn get_job_status(
    State(queue): State<JobQueue>,
    Path(request_id): Path<String>,
) -> Result<Json<Option<JobStatusView>>, StatusCode> {
    queue.get_status(&request_id).map(Json).map_err(|e| {
        error!("Failed to read status of job {}: {}", request_id, e);
        record_error("status_read_failed", "/v1/jobs/status/{request_id}");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn get_job_result(
    State(queue): State<JobQueue>,
    Path(request_id): Path<String>,
) -> Json<Option<JobOutput>> {
    Json(queue.result(&request_id))
}

async fn delete_jobs(
    State(queue): State<JobQueue>,
    Json(body): Json<DeleteJobsBody>,
) -> Result<Json<DeleteJobsResponse>, StatusCode> {
    queue
        .delete_jobs(&body.request_ids)
        .map(|deleted| Json(DeleteJobsResponse { deleted }))
        .map_err(|e| {
            error!("Failed to delete jobs: {}", e);
            record_error("delete_failed", "/v1/jobs/delete");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn get_queue_stats(State(queue): State<JobQueue>) -> Result<Json<QueueStats>, StatusCode> {
    let counts = queue.counts().map_err(|e| {
        error!("Failed to count jobs: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(QueueStats {
        pending: counts.pending,
        processing: counts.processing,
        completed: counts.completed,
        failed: counts.failed,
        queue_length: queue.queue_len(),
        is_processing: queue.is_processing(),
        templates: queue.template_ids(),
        recovery: queue.recovery_report(),
    }))
}

pub fn make_job_routes(state: ServerState) -> Router {
    Router::new()
        .route("/custom", post(enqueue_custom))
        .route("/delete", post(delete_jobs))
        .route("/stats", get(get_queue_stats))
        .route("/status/{request_id}", get(get_job_status))
        .route("/result/{request_id}", get(get_job_result))
        .route("/{kind}/{content_id}", post(enqueue_builtin))
        .with_state(state)
}
