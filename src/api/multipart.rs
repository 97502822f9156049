//! Multipart upload endpoints.
//!
//! The backend brokers the S3 multipart protocol: it opens the upload,
//! presigns one URL per part, and finalizes or aborts the whole object.
//! Completing the upload also kicks off transcription server-side.

use super::ApiClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Upload session issued by the start call. Lives until complete or abort.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUpload {
    pub upload_id: String,
    pub key: String,
    pub part_size: u64,
}

/// Presigned URL for one part.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedPart {
    pub url: String,
    pub part_number: i32,
}

/// One entry of the completion manifest. Field names are the exact keys
/// the backend forwards to S3.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: i32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// Response of the completion call.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionReceipt {
    pub detail: String,
    pub audio_id: i64,
}

/// Backend collaborator driving the multipart protocol.
///
/// A trait so the orchestrator can run against a mock in tests; the real
/// implementation lives on [`ApiClient`].
#[async_trait]
pub trait MultipartApi: Send + Sync {
    async fn start_multipart(
        &self,
        session_id: i64,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> anyhow::Result<MultipartUpload>;

    async fn presign_part(
        &self,
        session_id: i64,
        upload_id: &str,
        part_number: i32,
    ) -> anyhow::Result<PresignedPart>;

    async fn complete_multipart(
        &self,
        session_id: i64,
        upload_id: &str,
        parts: &[CompletedPart],
        original_filename: Option<&str>,
        language_code: Option<&str>,
    ) -> anyhow::Result<CompletionReceipt>;

    async fn abort_multipart(&self, session_id: i64) -> anyhow::Result<()>;
}

#[async_trait]
impl MultipartApi for ApiClient {
    async fn start_multipart(
        &self,
        session_id: i64,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> anyhow::Result<MultipartUpload> {
        let mut payload = serde_json::Map::new();
        if let Some(filename) = filename {
            payload.insert("filename".into(), json!(filename));
        }
        if let Some(content_type) = content_type {
            payload.insert("content_type".into(), json!(content_type));
        }

        self.post_json(
            &format!("/sessions/{session_id}/audio/multipart/start/"),
            &serde_json::Value::Object(payload),
        )
        .await
    }

    async fn presign_part(
        &self,
        session_id: i64,
        upload_id: &str,
        part_number: i32,
    ) -> anyhow::Result<PresignedPart> {
        self.post_json(
            &format!("/sessions/{session_id}/audio/multipart/presign/"),
            &json!({ "uploadId": upload_id, "partNumber": part_number }),
        )
        .await
    }

    async fn complete_multipart(
        &self,
        session_id: i64,
        upload_id: &str,
        parts: &[CompletedPart],
        original_filename: Option<&str>,
        language_code: Option<&str>,
    ) -> anyhow::Result<CompletionReceipt> {
        let mut payload = serde_json::Map::new();
        payload.insert("uploadId".into(), json!(upload_id));
        payload.insert("parts".into(), serde_json::to_value(parts)?);
        if let Some(original_filename) = original_filename {
            payload.insert("original_filename".into(), json!(original_filename));
        }
        if let Some(language_code) = language_code {
            payload.insert("language_code".into(), json!(language_code));
        }

        self.post_json(
            &format!("/sessions/{session_id}/audio/multipart/complete/"),
            &serde_json::Value::Object(payload),
        )
        .await
    }

    async fn abort_multipart(&self, session_id: i64) -> anyhow::Result<()> {
        let _: serde_json::Value = self
            .post_json(
                &format!("/sessions/{session_id}/audio/multipart/abort/"),
                &json!({}),
            )
            .await?;
        Ok(())
    }
}
