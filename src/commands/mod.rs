//! Application command handlers for therec.
//!
//! This module organizes command handling into separate submodules, each responsible for a specific
//! application command.
//!
//! # Commands
//! - `auth`: Backend API token entry and storage
//! - `record`: Interactive audio recording with live multipart upload
//! - `upload`: Upload an existing audio file as a session recording
//! - `config`: Open configuration file in user's preferred editor
//! - `list_devices`: List available audio input devices
//! - `logs`: Display recent log entries

pub mod auth;
pub mod config;
pub mod list_devices;
pub mod logs;
pub mod record;
pub mod upload;

pub use auth::handle_auth;
pub use config::handle_config;
pub use list_devices::handle_list_devices;
pub use logs::handle_logs;
pub use record::handle_record;
pub use upload::handle_upload;
