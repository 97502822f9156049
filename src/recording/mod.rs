//! Audio capture and the interactive recording session.

pub mod audio;
pub mod controller;
pub mod timer;
pub mod ui;
pub mod visualizations;

pub use audio::AudioRecorder;
pub use controller::{RecorderState, RecordingController};
pub use timer::RecordingTimer;
pub use ui::{RecordingCommand, RecordingTui};
