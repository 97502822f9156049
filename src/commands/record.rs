//! Interactive recording with live upload.
//!
//! Records audio with real-time waveform visualization while the multipart
//! upload runs in the background. Enter finishes the recording and waits for
//! the remaining parts to upload; Escape or 'q' discards it.

use crate::api::ApiClient;
use crate::config;
use crate::recording::{RecorderState, RecordingCommand, RecordingController, RecordingTui};
use crate::ui::ErrorScreen;
use std::sync::Arc;

enum Outcome {
    Saved(i64),
    Discarded,
}

/// Handles an interactive recording session for the given patient.
///
/// The session is created on the backend before any audio is captured, and
/// chunks upload continuously while recording. Finishing stops the microphone
/// first, then waits for the upload tail.
pub async fn handle_record(patient_id: i64) -> Result<(), anyhow::Error> {
    tracing::info!("=== therec Recording Started (patient {patient_id}) ===");

    let config_data = match config::TherecConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err}");
            let error_message = format!(
                "Configuration Error:\n\n{err}\n\nPlease check your ~/.config/therec/therec.toml file and try again."
            );
            let mut error_screen = ErrorScreen::new()?;
            error_screen.show_error(&error_message)?;
            error_screen.cleanup()?;
            return Err(anyhow::anyhow!("Configuration error: {err}"));
        }
    };

    tracing::info!(
        "Configuration loaded: device={}, sample_rate={}Hz, flush_interval={}s",
        config_data.audio.device,
        config_data.audio.sample_rate,
        config_data.audio.flush_interval_secs
    );

    let api = Arc::new(ApiClient::from_config(&config_data)?);
    let mut controller = RecordingController::new(api, &config_data);

    if let Err(e) = controller.start(patient_id).await {
        tracing::error!("Failed to start recording: {e:#}");
        let error_message = format!(
            "Recording Error:\n\n{e:#}\n\nPlease check your audio and backend configuration and try again."
        );
        let mut error_screen = ErrorScreen::new()?;
        error_screen.show_error(&error_message)?;
        error_screen.cleanup()?;
        return Err(e);
    }

    // The session and upload shell already exist; a UI failure from here on
    // must go through cancel so the backend upload is aborted.
    let mut tui = match RecordingTui::new() {
        Ok(tui) => tui,
        Err(e) => {
            tracing::error!("Failed to initialize UI: {e}");
            controller.cancel().await;
            return Err(anyhow::anyhow!("Failed to initialize UI: {e}"));
        }
    };

    let result = recording_loop(&mut controller, &mut tui).await;

    if let Err(cleanup_err) = tui.cleanup() {
        tracing::warn!("TUI cleanup failed: {cleanup_err}");
    }

    match result {
        Ok(Outcome::Saved(audio_id)) => {
            println!("Recording uploaded (audio id {audio_id}).");
            Ok(())
        }
        Ok(Outcome::Discarded) => {
            println!("Recording discarded.");
            Ok(())
        }
        Err(err) => {
            tracing::error!("Recording session failed: {err:#}");
            // The backend upload shell is aborted so no orphaned parts remain.
            controller.cancel().await;
            let mut error_screen = ErrorScreen::new()?;
            error_screen.show_error(&format!("Recording Error:\n\n{err:#}"))?;
            error_screen.cleanup()?;
            Err(err)
        }
    }
}

async fn recording_loop(
    controller: &mut RecordingController,
    tui: &mut RecordingTui,
) -> Result<Outcome, anyhow::Error> {
    loop {
        match tui.handle_input() {
            Ok(RecordingCommand::Continue) => {}
            Ok(RecordingCommand::TogglePause) => {
                if controller.state().can_pause() {
                    controller.pause();
                    tracing::info!("Recording paused");
                } else if controller.state().can_resume() {
                    controller.resume();
                    tracing::info!("Recording resumed");
                }
            }
            Ok(RecordingCommand::Stop) => {
                tracing::info!("Finishing recording");
                tui.render_processing()
                    .map_err(|e| anyhow::anyhow!("Render failed: {e}"))?;
                let receipt = controller.stop().await?;
                return Ok(Outcome::Saved(receipt.audio_id));
            }
            Ok(RecordingCommand::Cancel) => {
                controller.cancel().await;
                return Ok(Outcome::Discarded);
            }
            Err(e) => {
                tracing::error!("Input handling error: {}", e);
                return Err(anyhow::anyhow!("Input handling error: {e}"));
            }
        }

        let samples = controller.latest_samples();
        let paused = controller.state() == RecorderState::Paused;
        tui.render(
            &samples,
            paused,
            controller.elapsed(),
            controller.uploaded_bytes(),
        )
        .map_err(|e| anyhow::anyhow!("Render failed: {e}"))?;

        // Input polling already blocks for up to 50ms, no extra sleep needed.
        tokio::task::yield_now().await;
    }
}
