//! Direct part upload to object storage.
//!
//! Performs exactly one HTTP PUT of chunk bytes to a presigned URL and
//! extracts the storage-assigned ETag. Retries live in the orchestrator,
//! not here.

use async_trait::async_trait;
use thiserror::Error;

/// Failure modes for a single part PUT.
#[derive(Debug, Error)]
pub enum PartUploadError {
    /// Storage answered with a non-success status.
    #[error("storage part upload failed with status {status}: {body}")]
    Failed {
        status: reqwest::StatusCode,
        body: String,
    },
    /// 2xx response without the ETag header the completion call requires.
    #[error("storage response is missing the ETag header")]
    MissingReceipt,
    /// The request never produced a response (connect, timeout, ...).
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Uploads one part's bytes and returns the storage receipt (ETag).
#[async_trait]
pub trait PartUploader: Send + Sync {
    async fn upload_part(&self, url: &str, bytes: &[u8]) -> Result<String, PartUploadError>;
}

/// Part uploader backed by a plain HTTP client.
#[derive(Clone, Default)]
pub struct S3PartUploader {
    client: reqwest::Client,
}

impl S3PartUploader {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PartUploader for S3PartUploader {
    async fn upload_part(&self, url: &str, bytes: &[u8]) -> Result<String, PartUploadError> {
        // No Content-Type header: the presigned signature does not cover
        // one, and adding it would invalidate the request.
        let response = self.client.put(url).body(bytes.to_vec()).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PartUploadError::Failed { status, body });
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or(PartUploadError::MissingReceipt)?;

        Ok(etag)
    }
}
