//! Recording lifecycle control.
//!
//! Owns the microphone, the chunk buffer, and the two background tasks
//! that run while recording: the flush task (drains captured samples into
//! upload fragments on a fixed interval) and the upload task (the
//! multipart orchestrator, consuming chunks as they become ready). Upload
//! therefore starts long before recording finishes.
//!
//! Lifecycle: Idle -> Recording <-> Paused -> Stopping -> Idle, with
//! cancellation reachable from Recording and Paused.

use crate::api::multipart::CompletionReceipt;
use crate::api::ApiClient;
use crate::config::TherecConfig;
use crate::recording::audio::{encode_fragment, wav_stream_header, AudioRecorder};
use crate::recording::timer::RecordingTimer;
use crate::upload::{
    run_multipart_upload, ChunkBuffer, RecordingChunkSource, S3PartUploader, UploadError,
    UploadRequest,
};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Explicit recording state. One enum instead of a pile of booleans, so
/// contradictory combinations cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    Stopping,
}

impl RecorderState {
    pub fn can_pause(self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn can_resume(self) -> bool {
        matches!(self, Self::Paused)
    }

    pub fn can_stop(self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }

    pub fn can_cancel(self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

pub struct RecordingController {
    api: Arc<ApiClient>,
    device: String,
    sample_rate: u32,
    flush_interval: Duration,
    language_code: Option<String>,

    state: RecorderState,
    timer: RecordingTimer,
    recorder: Option<AudioRecorder>,
    buffer: Arc<Mutex<ChunkBuffer>>,
    session_id: Option<i64>,
    upload_task: Option<JoinHandle<std::result::Result<CompletionReceipt, UploadError>>>,
    flush_task: Option<JoinHandle<()>>,
    /// Header still to be emitted; taken by whichever flush happens first.
    pending_header: Arc<Mutex<Option<[u8; 44]>>>,
    cancelled: Arc<AtomicBool>,
    uploaded_bytes: Arc<AtomicU64>,
}

impl RecordingController {
    pub fn new(api: Arc<ApiClient>, config: &TherecConfig) -> Self {
        Self {
            api,
            device: config.audio.device.clone(),
            sample_rate: config.audio.sample_rate,
            flush_interval: Duration::from_secs(config.audio.flush_interval_secs),
            language_code: config.backend.language_code.clone(),
            state: RecorderState::Idle,
            timer: RecordingTimer::new(),
            recorder: None,
            buffer: Arc::new(Mutex::new(ChunkBuffer::new())),
            session_id: None,
            upload_task: None,
            flush_task: None,
            pending_header: Arc::new(Mutex::new(None)),
            cancelled: Arc::new(AtomicBool::new(false)),
            uploaded_bytes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates the backend session, acquires the microphone and launches
    /// the flush and upload tasks.
    ///
    /// On failure nothing is left running and the state stays Idle.
    pub async fn start(&mut self, patient_id: i64) -> Result<()> {
        if self.state != RecorderState::Idle {
            return Err(anyhow!("recording already in progress"));
        }

        let session_id = self
            .api
            .create_session(patient_id)
            .await
            .context("Could not create a session for this recording")?;

        let mut recorder = AudioRecorder::new(self.sample_rate, self.device.clone());
        recorder
            .start()
            .context("Microphone access failed. Check permissions and the configured device.")?;

        self.buffer = Arc::new(Mutex::new(ChunkBuffer::new()));
        self.cancelled = Arc::new(AtomicBool::new(false));
        self.uploaded_bytes = Arc::new(AtomicU64::new(0));
        self.pending_header = Arc::new(Mutex::new(Some(wav_stream_header(recorder.sample_rate()))));
        self.session_id = Some(session_id);

        self.spawn_flush_task(&recorder);
        self.spawn_upload_task(session_id);

        self.recorder = Some(recorder);
        self.timer.start();
        self.state = RecorderState::Recording;

        tracing::info!("Recording started for session {session_id}");
        Ok(())
    }

    /// Suspends capture and the timer; the upload task keeps draining
    /// whatever is already buffered.
    pub fn pause(&mut self) {
        if !self.state.can_pause() {
            tracing::warn!("Ignoring pause in state {:?}", self.state);
            return;
        }
        if let Some(recorder) = &self.recorder {
            recorder.pause();
        }
        self.timer.pause();
        self.state = RecorderState::Paused;
    }

    /// Resumes capture and timing from the accumulated duration.
    pub fn resume(&mut self) {
        if !self.state.can_resume() {
            tracing::warn!("Ignoring resume in state {:?}", self.state);
            return;
        }
        if let Some(recorder) = &self.recorder {
            recorder.resume();
        }
        self.timer.resume();
        self.state = RecorderState::Recording;
    }

    /// Flushes the tail of the recording, releases the microphone, and
    /// waits for the upload to complete.
    ///
    /// The microphone is released before the final parts finish uploading,
    /// so the UI can show "processing" without holding the hardware.
    pub async fn stop(&mut self) -> Result<CompletionReceipt> {
        if !self.state.can_stop() {
            return Err(anyhow!("no recording to stop"));
        }
        self.state = RecorderState::Stopping;
        self.timer.pause();

        if let Some(flush) = self.flush_task.take() {
            flush.abort();
            // The abort only lands at an await point; an in-flight drain may
            // still be pushing its fragment. Wait it out so the leftover
            // below is the last fragment before mark_done.
            let _ = flush.await;
        }

        // Stop the stream before draining, so samples the callback appends
        // up to the very end are part of the tail.
        let mut recorder = self
            .recorder
            .take()
            .ok_or_else(|| anyhow!("recorder missing while stopping"))?;
        recorder.stop();
        let leftover = recorder.take_pending();
        drop(recorder);

        self.push_fragment(&leftover);
        self.buffer
            .lock()
            .map_err(|_| anyhow!("chunk buffer poisoned"))?
            .mark_done();

        let task = self
            .upload_task
            .take()
            .ok_or_else(|| anyhow!("upload task missing while stopping"))?;
        let outcome = task.await.context("upload task panicked")?;

        self.state = RecorderState::Idle;
        self.session_id = None;

        match outcome {
            Ok(receipt) => {
                tracing::info!("Recording uploaded: audio_id={}", receipt.audio_id);
                Ok(receipt)
            }
            Err(err) => Err(anyhow::Error::new(err).context("Recording upload failed")),
        }
    }

    /// Discards the recording: releases the microphone, stops producing
    /// chunks, and lets the upload task abort the backend upload shell.
    /// Not an error path; completes silently.
    pub async fn cancel(&mut self) {
        if !self.state.can_cancel() {
            tracing::warn!("Ignoring cancel in state {:?}", self.state);
            return;
        }
        tracing::info!("Recording cancelled by user");

        // Order matters: the upload loop re-checks this flag before every
        // poll and before completing, so set it before waking the loop.
        self.cancelled.store(true, Ordering::SeqCst);

        if let Some(flush) = self.flush_task.take() {
            flush.abort();
            let _ = flush.await;
        }
        if let Some(mut recorder) = self.recorder.take() {
            recorder.stop();
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.mark_done();
        }

        if let Some(task) = self.upload_task.take() {
            match task.await {
                Ok(Err(UploadError::Cancelled)) => {
                    tracing::debug!("Upload task acknowledged cancellation")
                }
                Ok(Err(err)) => tracing::debug!("Upload task ended during cancel: {err}"),
                Ok(Ok(receipt)) => tracing::warn!(
                    "Upload completed before cancellation took effect (audio_id={})",
                    receipt.audio_id
                ),
                Err(join_err) => tracing::warn!("Upload task failed to join: {join_err}"),
            }
        }

        self.timer.pause();
        self.state = RecorderState::Idle;
        self.session_id = None;
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed()
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes.load(Ordering::Relaxed)
    }

    /// Latest captured samples for the waveform display; empty when idle.
    pub fn latest_samples(&self) -> Vec<i16> {
        self.recorder
            .as_ref()
            .map(AudioRecorder::latest_window)
            .unwrap_or_default()
    }

    fn push_fragment(&self, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }
        let header = self.pending_header.lock().ok().and_then(|mut h| h.take());
        let mut bytes = Vec::with_capacity(samples.len() * 2 + 44);
        if let Some(header) = header {
            bytes.extend_from_slice(&header);
        }
        bytes.extend_from_slice(&encode_fragment(samples));
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push_fragment(&bytes);
        }
    }

    fn spawn_flush_task(&mut self, recorder: &AudioRecorder) {
        self.flush_task = Some(spawn_flush_loop(
            recorder.pending_handle(),
            Arc::clone(&self.pending_header),
            Arc::clone(&self.buffer),
            self.flush_interval,
        ));
    }

    fn spawn_upload_task(&mut self, session_id: i64) {
        let api = Arc::clone(&self.api);
        let uploader = S3PartUploader::new();
        let mut source = RecordingChunkSource::new(Arc::clone(&self.buffer));
        let uploaded_bytes = Arc::clone(&self.uploaded_bytes);
        let cancelled = Arc::clone(&self.cancelled);
        let request = UploadRequest {
            filename: Some(format!(
                "recording_{}.wav",
                Utc::now().format("%Y%m%d_%H%M%S")
            )),
            content_type: Some("audio/wav".to_string()),
            language_code: self.language_code.clone(),
        };

        self.upload_task = Some(tokio::spawn(async move {
            run_multipart_upload(
                api.as_ref(),
                &uploader,
                session_id,
                &request,
                &mut source,
                &uploaded_bytes,
                &cancelled,
            )
            .await
        }));
    }
}

/// Periodically drains pending samples into upload fragments. The drain
/// holds no lock across an await, so an abort never leaves a fragment half
/// pushed; shutdown must still await the aborted handle before pushing the
/// tail, so an in-flight drain cannot land after it.
fn spawn_flush_loop(
    pending: Arc<Mutex<Vec<i16>>>,
    pending_header: Arc<Mutex<Option<[u8; 44]>>>,
    buffer: Arc<Mutex<ChunkBuffer>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so the first
        // fragment carries a full interval of audio.
        ticker.tick().await;
        loop {
            ticker.tick().await;

            let samples = std::mem::take(&mut *pending.lock().unwrap());
            if samples.is_empty() {
                continue;
            }

            let header = pending_header.lock().unwrap().take();
            let mut bytes = Vec::with_capacity(samples.len() * 2 + 44);
            if let Some(header) = header {
                bytes.extend_from_slice(&header);
            }
            bytes.extend_from_slice(&encode_fragment(&samples));

            let mut chunk_buffer = buffer.lock().unwrap();
            chunk_buffer.push_fragment(&bytes);
            tracing::debug!(
                "Flushed fragment: {} bytes ({} buffered)",
                bytes.len(),
                chunk_buffer.buffered_bytes()
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_is_only_valid_while_recording() {
        assert!(RecorderState::Recording.can_pause());
        assert!(!RecorderState::Idle.can_pause());
        assert!(!RecorderState::Paused.can_pause());
        assert!(!RecorderState::Stopping.can_pause());
    }

    #[test]
    fn resume_is_only_valid_while_paused() {
        assert!(RecorderState::Paused.can_resume());
        assert!(!RecorderState::Recording.can_resume());
        assert!(!RecorderState::Idle.can_resume());
    }

    #[tokio::test(start_paused = true)]
    async fn tail_fragment_is_last_after_flush_shutdown() {
        // Stop sequence: abort the flush loop, await its handle, then push
        // the tail and mark done. Nothing may reach the buffer between the
        // awaited abort and the tail, and the tail must be the final bytes.
        let pending = Arc::new(Mutex::new(vec![1i16; 100]));
        let header = Arc::new(Mutex::new(Some(wav_stream_header(16000))));
        let buffer = Arc::new(Mutex::new(ChunkBuffer::new()));
        let flush = spawn_flush_loop(
            Arc::clone(&pending),
            Arc::clone(&header),
            Arc::clone(&buffer),
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(25)).await;
        // One drain has run: header plus 100 samples.
        assert_eq!(buffer.lock().unwrap().buffered_bytes(), 44 + 200);
        assert!(pending.lock().unwrap().is_empty());

        flush.abort();
        let _ = flush.await;

        // Samples arriving now belong to the tail; the loop is gone and
        // must not pick them up even as time keeps passing.
        pending.lock().unwrap().extend_from_slice(&[2i16; 10]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(buffer.lock().unwrap().buffered_bytes(), 44 + 200);

        let tail = std::mem::take(&mut *pending.lock().unwrap());
        let mut locked = buffer.lock().unwrap();
        locked.push_fragment(&encode_fragment(&tail));
        locked.mark_done();

        let chunk = locked.next_chunk().expect("final chunk");
        assert!(chunk.is_last);
        assert_eq!(&chunk.bytes[..4], b"RIFF");
        assert_eq!(&chunk.bytes[chunk.bytes.len() - 20..], &[2u8, 0].repeat(10)[..]);
    }

    #[test]
    fn stop_and_cancel_are_valid_while_active() {
        for state in [RecorderState::Recording, RecorderState::Paused] {
            assert!(state.can_stop());
            assert!(state.can_cancel());
        }
        for state in [RecorderState::Idle, RecorderState::Stopping] {
            assert!(!state.can_stop());
            assert!(!state.can_cancel());
        }
    }
}
