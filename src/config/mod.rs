//! Configuration management for therec.
//!
//! This module handles loading and saving application configuration from TOML
//! files, as well as secure storage of the backend API token. Configuration is
//! stored in the user's config directory, while the token is stored with
//! restricted permissions in the user's local data directory.

pub mod file;
pub mod secrets;

pub use file::{get_config_path, AudioConfig, BackendConfig, TherecConfig};
pub use secrets::{clear_token, get_token, save_token};
