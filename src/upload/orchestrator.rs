//! Multipart upload orchestration.
//!
//! Drives the full protocol against a chunk source: start, then for each
//! chunk presign + PUT + record the receipt, then complete with the ordered
//! part manifest. Runs concurrently with recording; when the source is not
//! ready yet the loop sleeps briefly and polls again. Any failure after a
//! successful start triggers a best-effort abort before the original error
//! is propagated, so the backend never keeps a phantom upload shell.

use crate::api::multipart::{CompletedPart, CompletionReceipt, MultipartApi};
use crate::upload::chunk::{ChunkSource, MIN_PART_BYTES};
use crate::upload::storage::{PartUploadError, PartUploader};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Backoff between polls while the chunk source has nothing ready.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Attempts per part before the whole upload is failed.
const MAX_PART_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to start multipart upload: {0:#}")]
    Start(#[source] anyhow::Error),
    #[error("failed to presign part {part_number}: {source:#}")]
    Presign {
        part_number: i32,
        #[source]
        source: anyhow::Error,
    },
    #[error("upload of part {part_number} failed after {attempts} attempts: {source}")]
    Part {
        part_number: i32,
        attempts: u32,
        #[source]
        source: PartUploadError,
    },
    #[error("failed to complete multipart upload: {0:#}")]
    Complete(#[source] anyhow::Error),
    #[error("reading audio chunk failed: {0:#}")]
    Source(#[source] anyhow::Error),
    #[error("upload cancelled")]
    Cancelled,
}

/// Metadata forwarded to the backend at start and completion time.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub language_code: Option<String>,
}

/// Runs one multipart upload to completion.
///
/// All-or-nothing from the caller's perspective: either the completion
/// receipt is returned, or the upload was aborted and the causing error is
/// returned. Cumulative uploaded bytes are published through
/// `uploaded_bytes`; setting `cancelled` makes the loop abort the upload and
/// finish with [`UploadError::Cancelled`].
pub async fn run_multipart_upload<A, U, S>(
    api: &A,
    uploader: &U,
    session_id: i64,
    request: &UploadRequest,
    source: &mut S,
    uploaded_bytes: &AtomicU64,
    cancelled: &AtomicBool,
) -> Result<CompletionReceipt, UploadError>
where
    A: MultipartApi + ?Sized,
    U: PartUploader + ?Sized,
    S: ChunkSource + ?Sized,
{
    let upload = api
        .start_multipart(
            session_id,
            request.filename.as_deref(),
            request.content_type.as_deref(),
        )
        .await
        .map_err(UploadError::Start)?;

    tracing::info!(
        "Multipart upload started: session={session_id} key={} uploadId={}",
        upload.key,
        upload.upload_id
    );

    match upload_parts_and_complete(
        api,
        uploader,
        session_id,
        request,
        &upload.upload_id,
        source,
        uploaded_bytes,
        cancelled,
    )
    .await
    {
        Ok(receipt) => {
            tracing::info!(
                "Multipart upload complete: session={session_id} audio_id={}",
                receipt.audio_id
            );
            Ok(receipt)
        }
        Err(err) => {
            // Best-effort abort; its own failure must never mask `err`.
            if let Err(abort_err) = api.abort_multipart(session_id).await {
                tracing::warn!("Failed to abort multipart upload: {abort_err:#}");
            }
            Err(err)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload_parts_and_complete<A, U, S>(
    api: &A,
    uploader: &U,
    session_id: i64,
    request: &UploadRequest,
    upload_id: &str,
    source: &mut S,
    uploaded_bytes: &AtomicU64,
    cancelled: &AtomicBool,
) -> Result<CompletionReceipt, UploadError>
where
    A: MultipartApi + ?Sized,
    U: PartUploader + ?Sized,
    S: ChunkSource + ?Sized,
{
    let mut parts: Vec<CompletedPart> = Vec::new();
    let mut part_number: i32 = 1;
    let mut total_bytes: u64 = 0;

    loop {
        if cancelled.load(Ordering::SeqCst) {
            return Err(UploadError::Cancelled);
        }

        let chunk = match source.next_chunk().map_err(UploadError::Source)? {
            // Recording is still producing audio; wait, this is not an error.
            None => {
                sleep(POLL_INTERVAL).await;
                continue;
            }
            Some(chunk) => chunk,
        };

        // Guard against acting on a partial buffer read: a non-final chunk
        // below the minimum part size is treated as not-ready.
        if !chunk.is_last && chunk.bytes.len() < MIN_PART_BYTES {
            tracing::warn!(
                "Dropping undersized non-final chunk ({} bytes) for part {part_number}",
                chunk.bytes.len()
            );
            sleep(POLL_INTERVAL).await;
            continue;
        }

        let presigned = api
            .presign_part(session_id, upload_id, part_number)
            .await
            .map_err(|source| UploadError::Presign {
                part_number,
                source,
            })?;

        let etag = upload_with_retry(uploader, &presigned.url, &chunk.bytes, part_number).await?;

        parts.push(CompletedPart { part_number, etag });
        total_bytes += chunk.bytes.len() as u64;
        uploaded_bytes.store(total_bytes, Ordering::Relaxed);
        tracing::debug!(
            "Uploaded part {part_number} ({} bytes, {total_bytes} total)",
            chunk.bytes.len()
        );

        part_number += 1;
        if chunk.is_last {
            break;
        }
    }

    if cancelled.load(Ordering::SeqCst) {
        return Err(UploadError::Cancelled);
    }

    api.complete_multipart(
        session_id,
        upload_id,
        &parts,
        request.filename.as_deref(),
        request.language_code.as_deref(),
    )
    .await
    .map_err(UploadError::Complete)
}

async fn upload_with_retry<U>(
    uploader: &U,
    url: &str,
    bytes: &[u8],
    part_number: i32,
) -> Result<String, UploadError>
where
    U: PartUploader + ?Sized,
{
    let mut attempt = 1;
    loop {
        match uploader.upload_part(url, bytes).await {
            Ok(etag) => return Ok(etag),
            Err(source) if attempt >= MAX_PART_ATTEMPTS => {
                return Err(UploadError::Part {
                    part_number,
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                tracing::warn!("Part {part_number} upload attempt {attempt} failed: {err}");
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::multipart::{MultipartUpload, PresignedPart};
    use crate::upload::chunk::{AudioChunk, ChunkBuffer, RecordingChunkSource};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;
    use std::sync::{Arc, Mutex};

    /// Scripted backend: records every call, optionally failing some.
    #[derive(Default)]
    struct MockApi {
        starts: AtomicU32,
        aborts: AtomicU32,
        completions: Mutex<Vec<Vec<CompletedPart>>>,
        fail_presign_from_part: Option<i32>,
    }

    #[async_trait]
    impl MultipartApi for MockApi {
        async fn start_multipart(
            &self,
            _session_id: i64,
            _filename: Option<&str>,
            _content_type: Option<&str>,
        ) -> anyhow::Result<MultipartUpload> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(MultipartUpload {
                upload_id: "upload-1".into(),
                key: "sessions/1/audio.wav".into(),
                part_size: 10 * 1024 * 1024,
            })
        }

        async fn presign_part(
            &self,
            _session_id: i64,
            _upload_id: &str,
            part_number: i32,
        ) -> anyhow::Result<PresignedPart> {
            if let Some(from) = self.fail_presign_from_part {
                if part_number >= from {
                    anyhow::bail!("presign rejected");
                }
            }
            Ok(PresignedPart {
                url: format!("https://storage.test/part/{part_number}"),
                part_number,
            })
        }

        async fn complete_multipart(
            &self,
            _session_id: i64,
            _upload_id: &str,
            parts: &[CompletedPart],
            _original_filename: Option<&str>,
            _language_code: Option<&str>,
        ) -> anyhow::Result<CompletionReceipt> {
            self.completions.lock().unwrap().push(parts.to_vec());
            Ok(CompletionReceipt {
                detail: "Audio uploaded. Transcription started.".into(),
                audio_id: 42,
            })
        }

        async fn abort_multipart(&self, _session_id: i64) -> anyhow::Result<()> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Uploader whose failures are scripted per part number. ETags encode
    /// the attempt that produced them, e.g. "etag-2-3".
    #[derive(Default)]
    struct MockUploader {
        failures_left: Mutex<HashMap<i32, u32>>,
        attempts: Mutex<HashMap<i32, u32>>,
        uploaded_sizes: Mutex<Vec<usize>>,
    }

    impl MockUploader {
        fn failing(part: i32, times: u32) -> Self {
            let uploader = Self::default();
            uploader.failures_left.lock().unwrap().insert(part, times);
            uploader
        }
    }

    #[async_trait]
    impl PartUploader for MockUploader {
        async fn upload_part(&self, url: &str, bytes: &[u8]) -> Result<String, PartUploadError> {
            let part: i32 = url.rsplit('/').next().unwrap().parse().unwrap();
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let entry = attempts.entry(part).or_insert(0);
                *entry += 1;
                *entry
            };

            let mut failures = self.failures_left.lock().unwrap();
            if let Some(left) = failures.get_mut(&part) {
                if *left > 0 {
                    *left -= 1;
                    return Err(PartUploadError::Failed {
                        status: reqwest::StatusCode::BAD_GATEWAY,
                        body: "simulated".into(),
                    });
                }
            }
            drop(failures);

            self.uploaded_sizes.lock().unwrap().push(bytes.len());
            Ok(format!("etag-{part}-{attempt}"))
        }
    }

    /// Chunk source scripted from a fixed sequence; None entries simulate
    /// the recording buffer not being ready yet.
    struct ScriptedSource {
        steps: Vec<Option<AudioChunk>>,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Option<AudioChunk>>) -> Self {
            Self { steps }
        }
    }

    impl ChunkSource for ScriptedSource {
        fn next_chunk(&mut self) -> anyhow::Result<Option<AudioChunk>> {
            if self.steps.is_empty() {
                anyhow::bail!("source polled past the end of the script");
            }
            Ok(self.steps.remove(0))
        }
    }

    fn chunk(size: usize, is_last: bool) -> Option<AudioChunk> {
        Some(AudioChunk {
            bytes: vec![0u8; size],
            is_last,
        })
    }

    async fn run(
        api: &MockApi,
        uploader: &MockUploader,
        source: &mut dyn ChunkSource,
        cancelled: &AtomicBool,
    ) -> Result<CompletionReceipt, UploadError> {
        let uploaded = AtomicU64::new(0);
        run_multipart_upload(
            api,
            uploader,
            1,
            &UploadRequest {
                filename: Some("recording.wav".into()),
                content_type: Some("audio/wav".into()),
                language_code: Some("en".into()),
            },
            source,
            &uploaded,
            cancelled,
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn manifest_is_gapless_and_ascending() {
        let api = MockApi::default();
        let uploader = MockUploader::default();
        let mut source = ScriptedSource::new(vec![
            chunk(MIN_PART_BYTES, false),
            None,
            chunk(MIN_PART_BYTES + 17, false),
            chunk(1000, true),
        ]);

        let receipt = run(&api, &uploader, &mut source, &AtomicBool::new(false))
            .await
            .expect("upload should succeed");
        assert_eq!(receipt.audio_id, 42);

        let completions = api.completions.lock().unwrap();
        assert_eq!(completions.len(), 1);
        let numbers: Vec<i32> = completions[0].iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(api.aborts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_reports_cumulative_bytes() {
        let api = MockApi::default();
        let uploader = MockUploader::default();
        let mut source = ScriptedSource::new(vec![
            chunk(MIN_PART_BYTES, false),
            chunk(500, true),
        ]);
        let uploaded = AtomicU64::new(0);

        run_multipart_upload(
            &api,
            &uploader,
            1,
            &UploadRequest::default(),
            &mut source,
            &uploaded,
            &AtomicBool::new(false),
        )
        .await
        .expect("upload should succeed");

        assert_eq!(uploaded.load(Ordering::Relaxed), (MIN_PART_BYTES + 500) as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn part_retry_succeeds_on_third_attempt() {
        // Part 2 fails twice; the manifest must carry the attempt-3 receipt.
        let api = MockApi::default();
        let uploader = MockUploader::failing(2, 2);
        let mut source = ScriptedSource::new(vec![
            chunk(MIN_PART_BYTES, false),
            chunk(100, true),
        ]);

        run(&api, &uploader, &mut source, &AtomicBool::new(false))
            .await
            .expect("upload should succeed after retries");

        let completions = api.completions.lock().unwrap();
        let part2 = completions[0].iter().find(|p| p.part_number == 2).unwrap();
        assert_eq!(part2.etag, "etag-2-3");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_exhaustion_aborts_and_propagates() {
        // Part 1 fails four times, past the three-attempt bound.
        let api = MockApi::default();
        let uploader = MockUploader::failing(1, 4);
        let mut source = ScriptedSource::new(vec![chunk(MIN_PART_BYTES, false)]);

        let err = run(&api, &uploader, &mut source, &AtomicBool::new(false))
            .await
            .expect_err("upload should fail");

        assert!(matches!(
            err,
            UploadError::Part {
                part_number: 1,
                attempts: 3,
                ..
            }
        ));
        assert_eq!(api.aborts.load(Ordering::SeqCst), 1);
        assert!(api.completions.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn presign_failure_aborts_and_propagates() {
        let api = MockApi {
            fail_presign_from_part: Some(1),
            ..MockApi::default()
        };
        let uploader = MockUploader::default();
        let mut source = ScriptedSource::new(vec![chunk(MIN_PART_BYTES, false)]);

        let err = run(&api, &uploader, &mut source, &AtomicBool::new(false))
            .await
            .expect_err("upload should fail");

        assert!(matches!(err, UploadError::Presign { part_number: 1, .. }));
        assert_eq!(api.aborts.load(Ordering::SeqCst), 1);
        assert!(api.completions.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_first_chunk_aborts_once() {
        // Start was called, complete never, abort exactly once.
        let api = MockApi::default();
        let uploader = MockUploader::default();
        let buffer = Arc::new(Mutex::new(ChunkBuffer::new()));
        let mut source = RecordingChunkSource::new(buffer);

        let err = run(&api, &uploader, &mut source, &AtomicBool::new(true))
            .await
            .expect_err("upload should be cancelled");

        assert!(matches!(err, UploadError::Cancelled));
        assert_eq!(api.starts.load(Ordering::SeqCst), 1);
        assert_eq!(api.aborts.load(Ordering::SeqCst), 1);
        assert!(api.completions.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn undersized_non_final_chunk_is_not_uploaded() {
        let api = MockApi::default();
        let uploader = MockUploader::default();
        let mut source = ScriptedSource::new(vec![
            chunk(100, false), // partial read race; must be skipped
            chunk(MIN_PART_BYTES, false),
            chunk(0, true),
        ]);

        run(&api, &uploader, &mut source, &AtomicBool::new(false))
            .await
            .expect("upload should succeed");

        let sizes = uploader.uploaded_sizes.lock().unwrap();
        assert_eq!(&sizes[..], &[MIN_PART_BYTES, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_polls_until_data_arrives() {
        let api = MockApi::default();
        let uploader = MockUploader::default();
        let mut source = ScriptedSource::new(vec![
            None,
            None,
            chunk(MIN_PART_BYTES, false),
            chunk(4, true),
        ]);

        let receipt = run(&api, &uploader, &mut source, &AtomicBool::new(false))
            .await
            .expect("upload should succeed");
        assert_eq!(receipt.detail, "Audio uploaded. Transcription started.");
    }
}
