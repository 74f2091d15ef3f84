//! Access to stored documents.
//!
//! Templates materialize a document through this facade before handing it
//! to the AI client.

mod http;

pub use http::HttpContentStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content {0} not found")]
    NotFound(String),

    #[error("content store unreachable: {0}")]
    Connection(String),

    #[error("content store returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid content store response: {0}")]
    InvalidResponse(String),
}

/// Metadata of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDetails {
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(default)]
    pub creator: Option<String>,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Raw bytes of the document.
    async fn get_content(&self, content_id: &str) -> Result<Vec<u8>, ContentError>;

    async fn get_details(&self, content_id: &str) -> Result<ContentDetails, ContentError>;
}
