//! HTTP client for the content store service.

use super::{ContentDetails, ContentError, ContentStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// Talks to a content store exposing `GET /v1/content/{id}` and
/// `GET /v1/content/{id}/details`.
pub struct HttpContentStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpContentStore {
    /// # Arguments
    /// * `base_url` - Base URL of the content store (e.g., "http://localhost:8090")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: &str, timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, content_id: &str, suffix: &str) -> Result<reqwest::Response, ContentError> {
        let url = format!("{}/v1/content/{}{}", self.base_url, content_id, suffix);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ContentError::Connection(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(ContentError::NotFound(content_id.to_string())),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(ContentError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn get_content(&self, content_id: &str) -> Result<Vec<u8>, ContentError> {
        let response = self.get(content_id, "").await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ContentError::InvalidResponse(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn get_details(&self, content_id: &str) -> Result<ContentDetails, ContentError> {
        self.get(content_id, "/details")
            .await?
            .json()
            .await
            .map_err(|e| ContentError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let store = HttpContentStore::new("http://localhost:8090/", 5).unwrap();
        assert_eq!(store.base_url, "http://localhost:8090");
    }

    #[test]
    fn test_details_deserialization() {
        let details: ContentDetails = serde_json::from_str(
            r#"{"filename":"notes.md","size":12,"mimeType":"text/markdown"}"#,
        )
        .unwrap();
        assert_eq!(details.filename, "notes.md");
        assert_eq!(details.mime_type, "text/markdown");
        assert!(details.creator.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_connection_error() {
        let store = HttpContentStore::new("http://127.0.0.1:1", 1).unwrap();
        assert!(matches!(
            store.get_content("cid").await,
            Err(ContentError::Connection(_))
        ));
    }
}
