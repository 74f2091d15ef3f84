use anyhow::Result;
use std::time::Duration;

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{job_routes::make_job_routes, log_requests, metrics, state::ServerState, ServerConfig};
use crate::job_queue::JobQueue;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: &'static str,
    pub queue_length: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION"),
        queue_length: state.job_queue.queue_len(),
    };
    Json(stats)
}

pub fn make_app(config: ServerConfig, job_queue: JobQueue) -> Result<Router> {
    let state = ServerState::new(config, job_queue);

    let home_router: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone());

    let app: Router = home_router
        .nest("/v1/jobs", make_job_routes(state.clone()))
        .layer(middleware::from_fn_with_state(state, log_requests));

    Ok(app)
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

/// Serves the API and the Prometheus endpoint until `shutdown` is cancelled.
pub async fn run_server(
    config: ServerConfig,
    job_queue: JobQueue,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(config, job_queue)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    let metrics_listener =
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port)).await?;

    info!("Ready to serve at port {}!", port);
    info!("Metrics available at port {}!", metrics_port);

    let api_shutdown = shutdown.clone();
    let api = axum::serve(listener, app)
        .with_graceful_shutdown(async move { api_shutdown.cancelled().await });
    let metrics = axum::serve(metrics_listener, make_metrics_app())
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    tokio::try_join!(api, metrics)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_queue::{JobKind, SqliteJobStatusStore, TemplateId, TemplateRegistry};
    use crate::job_queue::{JobOutput, JobStatusStore};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let store: Arc<dyn JobStatusStore> = Arc::new(SqliteJobStatusStore::in_memory().unwrap());
        let mut registry = TemplateRegistry::new();
        registry.register_fn(TemplateId::Builtin(JobKind::Language), |_ctx, _attrs| async {
            Ok(JobOutput::Language("en".to_string()))
        });
        let queue = JobQueue::start(store, registry).unwrap();
        make_app(ServerConfig::default(), queue).unwrap()
    }

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 01:01:01");
    }

    #[tokio::test]
    async fn unknown_status_is_null_not_404() {
        let app = test_app();
        let request = Request::builder()
            .uri("/v1/jobs/status/req_language_nope")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        assert_eq!(&body[..], b"null");
    }

    #[tokio::test]
    async fn unknown_kind_is_bad_request() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/jobs/summary/bafyABC")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn content_id_with_encoded_delimiters_is_bad_request() {
        for uri in [
            "/v1/jobs/language/..%2Fadmin",
            "/v1/jobs/language/doc%3Fraw=1",
            "/v1/jobs/language/doc%23frag",
        ] {
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            let response = test_app().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[tokio::test]
    async fn unregistered_template_is_server_error() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/jobs/tags/bafyABC")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
