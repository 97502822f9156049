//! Configuration file management for therec.
//!
//! This module handles loading and saving application configuration from TOML files.
//! Configuration is stored in the user's config directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Audio device to use. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `therec list-devices`
    /// - device name from `therec list-devices`
    pub device: String,
    /// Recording sample rate in Hz (16000 recommended for speech)
    pub sample_rate: u32,
    /// Seconds between flushes of captured audio into upload fragments
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

fn default_flush_interval_secs() -> u64 {
    5
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            sample_rate: 16000,
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

/// Backend API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend API, e.g. "https://api.example.com/api"
    pub base_url: String,
    /// Optional language hint attached to completed uploads (e.g. "es")
    #[serde(default)]
    pub language_code: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            language_code: None,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TherecConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

impl TherecConfig {
    /// Loads configuration from the user's config directory.
    ///
    /// A missing config file yields the defaults; a malformed one is an error.
    ///
    /// # Errors
    /// - If the config directory cannot be determined
    /// - If the config file cannot be read
    /// - If the TOML is malformed
    pub fn load() -> anyhow::Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let config_content = fs::read_to_string(&config_path)?;
        let config: TherecConfig = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Saves configuration to the user's config directory.
    ///
    /// # Errors
    /// - If the config directory cannot be determined or created
    /// - If the file cannot be written
    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = get_config_path()?;
        let config_content = toml::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        tracing::info!("Configuration saved");
        Ok(())
    }
}

/// Retrieves the path to the config file, creating its parent directory.
///
/// # Errors
/// - If the home directory cannot be determined
/// - If the config directory cannot be created
pub fn get_config_path() -> Result<PathBuf, std::io::Error> {
    let home_dir = dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find home directory",
        )
    })?;
    let config_path = home_dir.join(".config").join("therec").join("therec.toml");

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: TherecConfig = toml::from_str("").unwrap();
        assert_eq!(config.audio.device, "default");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.flush_interval_secs, 5);
        assert_eq!(config.backend.base_url, "http://localhost:8000/api");
        assert!(config.backend.language_code.is_none());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: TherecConfig = toml::from_str(
            "[backend]\nbase_url = \"https://api.example.com/api\"\nlanguage_code = \"es\"\n",
        )
        .unwrap();
        assert_eq!(config.backend.base_url, "https://api.example.com/api");
        assert_eq!(config.backend.language_code.as_deref(), Some("es"));
        assert_eq!(config.audio.sample_rate, 16000);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = TherecConfig::default();
        config.audio.device = "2".to_string();
        config.backend.language_code = Some("en".to_string());

        let serialized = toml::to_string_pretty(&config).unwrap();
        let decoded: TherecConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(decoded.audio.device, "2");
        assert_eq!(decoded.backend.language_code.as_deref(), Some("en"));
    }
}
