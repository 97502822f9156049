//! Backend authentication.
//!
//! Prompts for the backend API token and stores it with restricted
//! permissions. Pressing Enter without typing anything keeps the current
//! token.

use crate::config;
use cliclack::{intro, note, outro, password};
use console::style;

/// Handles API token entry and storage.
///
/// If a token is already saved, the user can press Enter to keep it.
pub async fn handle_auth() -> Result<(), anyhow::Error> {
    tracing::info!("=== therec Authentication ===");

    ctrlc::set_handler(move || {}).map_err(|e| anyhow::anyhow!("Ctrl-C handler: {e}"))?;

    intro(style(" auth ").on_white().black())?;

    let current_token = config::get_token().ok().flatten();

    if current_token.is_some() {
        note("token", "A token is already saved for this machine")?;
    }

    let prompt = if current_token.is_some() {
        "Enter backend API token (press Enter to keep current):"
    } else {
        "Enter backend API token:"
    };

    let entered: String = password(prompt)
        .allow_empty()
        .interact()
        .map_err(|e| anyhow::anyhow!("Token input cancelled: {e}"))?;

    if entered.trim().is_empty() {
        if current_token.is_some() {
            outro("Keeping the existing token.")?;
            tracing::info!("Auth finished, existing token kept");
            return Ok(());
        }
        return Err(anyhow::anyhow!("No token entered and none saved."));
    }

    config::save_token(&entered)?;

    outro("Token saved. You can now record and upload sessions.")?;
    Ok(())
}
