//! Application orchestration and command routing.
//!
//! Handles command-line argument parsing and delegates to appropriate command handlers.

use crate::commands;
use crate::logging;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::env;
use std::io;
use std::path::PathBuf;
use std::process;

/// Suppress ALSA library warnings that are not relevant to the user.
/// These warnings come from the cpal audio library and don't indicate actual errors.
#[allow(dead_code)]
fn suppress_alsa_warnings() {
    // Set ALSA_CARD to a dummy value to suppress "Unknown PCM" warnings
    if env::var("ALSA_CARD").is_err() {
        env::set_var("ALSA_CARD", "dummy");
    }
}

/// A terminal session recorder that streams audio to the therapy-session backend
#[derive(Parser)]
#[command(name = "therec")]
#[command(version)]
#[command(about = "Record therapy sessions and stream them to the backend")]
#[command(arg_required_else_help = true)]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/therec/therec.toml\n    Logs:               ~/.local/state/therec/therec.log.*\n\nThe API token is read from THEREC_TOKEN or the file saved by 'therec auth'."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session with real-time visualization and live upload
    ///
    /// Press Enter to finish, Space to pause/resume, Escape/q to discard.
    /// Audio uploads continuously while you record; finishing only waits
    /// for the remaining parts.
    #[command(visible_alias = "r")]
    Record {
        /// Patient id the session belongs to
        #[arg(short, long, value_name = "ID")]
        patient: i64,
    },

    /// Upload an existing audio file as a session recording
    ///
    /// Creates a session for the patient and uploads the file in parts.
    ///
    /// Examples:
    ///   therec upload --patient 42 session.wav
    ///   therec upload -p 42 voice-memo.mp3
    #[command(visible_alias = "u")]
    Upload {
        /// Patient id the session belongs to
        #[arg(short, long, value_name = "ID")]
        patient: i64,

        /// Path to the audio file to upload
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Save the backend API token for this machine
    ///
    /// Prompts for the token and stores it with owner-only permissions.
    #[command(visible_alias = "a")]
    Auth,

    /// Open configuration file in your preferred editor
    ///
    /// Edit audio and backend settings. Uses $EDITOR or falls back to nano/vi.
    #[command(visible_alias = "c")]
    Config,

    /// List available audio input devices
    ///
    /// Shows device IDs, names, and configurations to help configure
    /// the correct input device in therec.toml.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show recent log entries from the application
    ///
    /// Display the last 50 lines of the most recent log file.
    /// Useful for troubleshooting issues.
    Logs,

    /// Generate shell completion script
    ///
    /// Generate completion script for your shell. Save the output to your
    /// shell's completion directory or source it directly.
    ///
    /// Examples:
    ///   therec completions bash > therec.bash
    ///   therec completions zsh > _therec
    ///   therec completions fish > therec.fish
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the main application based on command-line arguments.
///
/// # Errors
/// - If logging initialization fails
/// - If command execution fails
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Handle commands that don't need logging or config setup
    match &cli.command {
        Commands::Completions { shell } => {
            generate(*shell, &mut Cli::command(), "therec", &mut io::stdout());
            return Ok(());
        }
        Commands::ListDevices => {
            return match commands::handle_list_devices() {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            };
        }
        Commands::Logs => {
            return match commands::handle_logs() {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            };
        }
        _ => {}
    }

    // Initialize logging for all other commands
    logging::init_logging()?;

    // Route to appropriate command handler
    match cli.command {
        Commands::Record { patient } => {
            commands::handle_record(patient).await?;
        }
        Commands::Upload { patient, file } => {
            commands::handle_upload(patient, &file).await?;
        }
        Commands::Auth => {
            if let Err(e) = commands::handle_auth().await {
                // Check if it's a cancellation error (cliclack already displayed the message)
                let err_msg = e.to_string();
                if err_msg.contains("cancelled") || err_msg.contains("interrupted") {
                    // Silent exit - cliclack already showed "Operation cancelled"
                    process::exit(0);
                } else {
                    return Err(e);
                }
            }
        }
        Commands::Config => {
            commands::handle_config()?;
        }
        Commands::Completions { .. } | Commands::ListDevices | Commands::Logs => {
            unreachable!("These commands are handled earlier")
        }
    }

    Ok(())
}
