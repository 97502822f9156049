//! Visualization primitives for the recording display.

pub mod waveform;

pub use waveform::{resample, AmplitudeTracker, WaveformBuffer};
