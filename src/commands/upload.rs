//! Upload a finished audio file as a new session recording.
//!
//! The non-interactive counterpart of `record`: creates a session, slices the
//! file into fixed-size parts and runs the same multipart protocol.

use crate::api::ApiClient;
use crate::config;
use crate::upload::{run_multipart_upload, FileChunkSource, S3PartUploader, UploadRequest};
use cliclack::{intro, outro, spinner};
use console::style;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64};

/// Uploads an existing audio file to a new session for the given patient.
///
/// # Errors
/// - If the file does not exist or cannot be read
/// - If the backend rejects any step of the multipart protocol
pub async fn handle_upload(patient_id: i64, file_path: &Path) -> Result<(), anyhow::Error> {
    tracing::info!(
        "=== therec File Upload Started (patient {patient_id}, file {}) ===",
        file_path.display()
    );

    if !file_path.is_file() {
        return Err(anyhow::anyhow!(
            "File not found: {}",
            file_path.display()
        ));
    }

    let config_data = config::TherecConfig::load()?;
    let api = ApiClient::from_config(&config_data)?;

    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("recording")
        .to_string();
    let content_type = guess_content_type(&filename);

    intro(style(" upload ").on_white().black())?;

    let progress = spinner();
    progress.start("Creating session...");
    let session_id = api.create_session(patient_id).await?;
    progress.stop(format!("Session {session_id} created"));

    let mut source = FileChunkSource::open(file_path)?;
    let uploaded_bytes = AtomicU64::new(0);
    let cancelled = AtomicBool::new(false);
    let request = UploadRequest {
        filename: Some(filename.clone()),
        content_type: Some(content_type.to_string()),
        language_code: config_data.backend.language_code.clone(),
    };

    let progress = spinner();
    progress.start(format!("Uploading {filename}..."));
    let uploader = S3PartUploader::new();
    let receipt = match run_multipart_upload(
        &api,
        &uploader,
        session_id,
        &request,
        &mut source,
        &uploaded_bytes,
        &cancelled,
    )
    .await
    {
        Ok(receipt) => receipt,
        Err(err) => {
            progress.stop("Upload failed");
            return Err(anyhow::Error::new(err).context("File upload failed"));
        }
    };
    progress.stop("Upload complete");

    outro(format!(
        "{} (audio id {})",
        receipt.detail, receipt.audio_id
    ))?;

    Ok(())
}

fn guess_content_type(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(guess_content_type("session.wav"), "audio/wav");
        assert_eq!(guess_content_type("session.mp3"), "audio/mpeg");
        assert_eq!(guess_content_type("session.webm"), "audio/webm");
        assert_eq!(guess_content_type("session"), "application/octet-stream");
    }
}
