//! HTTP client for end-to-end tests
//!
//! This module wraps reqwest and provides methods for all job endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Enqueue Endpoints
    // ========================================================================

    /// POST /v1/jobs/{kind}/{content_id}
    pub async fn enqueue(&self, kind: &str, content_id: &str) -> Response {
        self.client
            .post(format!("{}/v1/jobs/{}/{}", self.base_url, kind, content_id))
            .send()
            .await
            .expect("Enqueue request failed")
    }

    /// POST /v1/jobs/{kind}/{content_id} with a prompts body
    pub async fn enqueue_with_prompts(
        &self,
        kind: &str,
        content_id: &str,
        prompts: &[&str],
    ) -> Response {
        self.client
            .post(format!("{}/v1/jobs/{}/{}", self.base_url, kind, content_id))
            .json(&json!({ "prompts": prompts }))
            .send()
            .await
            .expect("Enqueue request failed")
    }

    /// POST /v1/jobs/custom
    pub async fn enqueue_custom(&self, content_id: &str, prompts: &[&str]) -> Response {
        self.client
            .post(format!("{}/v1/jobs/custom", self.base_url))
            .json(&json!({ "contentId": content_id, "prompts": prompts }))
            .send()
            .await
            .expect("Custom enqueue request failed")
    }

    /// Enqueues and returns the request id, asserting the job was accepted
    pub async fn enqueue_ok(&self, kind: &str, content_id: &str) -> String {
        let response = self.enqueue(kind, content_id).await;
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
        let body: Value = response.json().await.expect("Invalid enqueue response");
        body["requestId"]
            .as_str()
            .expect("Missing requestId")
            .to_string()
    }

    // ========================================================================
    // Query Endpoints
    // ========================================================================

    /// GET /v1/jobs/status/{request_id}
    pub async fn status(&self, request_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/jobs/status/{}", self.base_url, request_id))
            .send()
            .await
            .expect("Status request failed")
    }

    /// GET /v1/jobs/status/{request_id} decoded as JSON
    pub async fn status_json(&self, request_id: &str) -> Value {
        self.status(request_id)
            .await
            .json()
            .await
            .expect("Invalid status response")
    }

    /// GET /v1/jobs/result/{request_id} decoded as JSON
    pub async fn result_json(&self, request_id: &str) -> Value {
        self.client
            .get(format!("{}/v1/jobs/result/{}", self.base_url, request_id))
            .send()
            .await
            .expect("Result request failed")
            .json()
            .await
            .expect("Invalid result response")
    }

    /// GET /v1/jobs/stats decoded as JSON
    pub async fn stats_json(&self) -> Value {
        self.client
            .get(format!("{}/v1/jobs/stats", self.base_url))
            .send()
            .await
            .expect("Stats request failed")
            .json()
            .await
            .expect("Invalid stats response")
    }

    /// POST /v1/jobs/delete
    pub async fn delete(&self, request_ids: &[&str]) -> Response {
        self.client
            .post(format!("{}/v1/jobs/delete", self.base_url))
            .json(&json!({ "requestIds": request_ids }))
            .send()
            .await
            .expect("Delete request failed")
    }

    /// Polls the status endpoint until the job reaches `status`
    ///
    /// # Panics
    ///
    /// Panics if the status is not reached within [`JOB_STATUS_TIMEOUT_MS`].
    pub async fn wait_for_status(&self, request_id: &str, status: &str) -> Value {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(JOB_STATUS_TIMEOUT_MS);
        loop {
            let body = self.status_json(request_id).await;
            if body["status"] == status {
                return body;
            }
            if start.elapsed() > timeout {
                panic!(
                    "Job {} did not reach {} within {}ms, last status: {}",
                    request_id, status, JOB_STATUS_TIMEOUT_MS, body
                );
            }
            tokio::time::sleep(Duration::from_millis(JOB_STATUS_POLL_INTERVAL_MS)).await;
        }
    }
}
