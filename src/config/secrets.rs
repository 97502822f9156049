//! Secure storage of the backend API token.
//!
//! The token lives in the user's local data directory with permissions
//! restricted to the owner. The `THEREC_TOKEN` environment variable
//! overrides the stored token, which keeps scripted use possible without
//! touching the keychain file.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::PathBuf;

const TOKEN_ENV_VAR: &str = "THEREC_TOKEN";

/// Returns the API token, preferring the environment override.
///
/// # Errors
/// - If the data directory cannot be determined
/// - If the token file exists but cannot be read
pub fn get_token() -> Result<Option<String>> {
    if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
        if !token.trim().is_empty() {
            return Ok(Some(token.trim().to_string()));
        }
    }

    let token_path = get_token_path()?;
    if !token_path.exists() {
        return Ok(None);
    }
    let token = fs::read_to_string(&token_path).context("Could not read saved token")?;
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }
    Ok(Some(token.to_string()))
}

/// Saves the API token with owner-only permissions.
///
/// # Errors
/// - If the data directory cannot be determined or created
/// - If the token file cannot be written
pub fn save_token(token: &str) -> Result<()> {
    let token_path = get_token_path()?;
    if let Some(parent) = token_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&token_path, token.trim())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&token_path, fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("API token saved");
    Ok(())
}

/// Removes the stored token, if any.
///
/// # Errors
/// - If the data directory cannot be determined
/// - If the token file cannot be removed
pub fn clear_token() -> Result<()> {
    let token_path = get_token_path()?;
    if token_path.exists() {
        fs::remove_file(&token_path)?;
        tracing::info!("API token cleared");
    }
    Ok(())
}

fn get_token_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_local_dir().ok_or_else(|| anyhow!("Could not find local data directory"))?;
    Ok(data_dir.join("therec").join("token"))
}
