//! Microphone capture for live session recording.
//!
//! Captures PCM from a cpal input device, downmixed to mono i16. Samples
//! accumulate in a pending buffer that the flush task periodically drains
//! into upload fragments; a small side window of the most recent samples
//! feeds the waveform display. The byte stream is framed as a streaming WAV
//! (unknown-length RIFF sentinels) because part 1 of the multipart object
//! cannot be rewritten once uploaded.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// Samples retained for the waveform amplitude window (one analysis frame
/// at typical speech sample rates).
const VIZ_WINDOW_SAMPLES: usize = 1024;

/// Records mono audio from a specified or default input device.
///
/// The stream keeps running across pause/resume; while paused the input
/// callback discards incoming data, so no samples accumulate and the
/// waveform window freezes.
pub struct AudioRecorder {
    /// Actual recording sample rate from the device
    sample_rate: u32,
    /// Samples awaiting the next upload flush (i16 PCM mono)
    pending: Arc<Mutex<Vec<i16>>>,
    /// Most recent samples, bounded, for the waveform display
    viz_window: Arc<Mutex<Vec<i16>>>,
    /// Active input stream (kept alive during recording)
    stream: Option<cpal::Stream>,
    is_paused: Arc<Mutex<bool>>,
    /// Device name, numeric index, or "default"
    device_name: String,
}

impl AudioRecorder {
    pub fn new(requested_sample_rate: u32, device_name: String) -> Self {
        Self {
            sample_rate: requested_sample_rate,
            pending: Arc::new(Mutex::new(Vec::new())),
            viz_window: Arc::new(Mutex::new(Vec::new())),
            stream: None,
            is_paused: Arc::new(Mutex::new(false)),
            device_name,
        }
    }

    /// Starts capturing from the configured input device.
    ///
    /// # Errors
    /// - If the specified device is not available
    /// - If device configuration fails
    /// - If the input stream cannot be created
    pub fn start(&mut self) -> Result<()> {
        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            if self.device_name == "default" {
                host.default_input_device()
                    .ok_or_else(|| anyhow!("No audio input device available"))
            } else {
                find_device_by_name(&host, &self.device_name)
            }
        })?;

        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::info!("Recording device: {}", device_name);

        let device_config = device.default_input_config()?;
        let device_sample_rate = device_config.sample_rate().0;
        let num_channels = device_config.channels() as usize;

        if device_sample_rate != self.sample_rate {
            tracing::warn!(
                "Requested sample rate {}Hz but device uses {}Hz. Recording at device rate.",
                self.sample_rate,
                device_sample_rate
            );
        }
        self.sample_rate = device_sample_rate;

        let pending = Arc::clone(&self.pending);
        let viz_window = Arc::clone(&self.viz_window);
        let pause_flag = Arc::clone(&self.is_paused);

        let stream = device.build_input_stream(
            &device_config.into(),
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if *pause_flag.lock().unwrap() {
                    return;
                }
                let mono = downmix_to_mono(data, num_channels);

                pending.lock().unwrap().extend_from_slice(&mono);

                let mut window = viz_window.lock().unwrap();
                window.extend_from_slice(&mono);
                let overflow = window.len().saturating_sub(VIZ_WINDOW_SAMPLES);
                if overflow > 0 {
                    window.drain(..overflow);
                }
            },
            |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )?;

        stream.play()?;
        self.stream = Some(stream);

        tracing::debug!(
            "Audio stream started: {}Hz, {} channels downmixed to mono",
            self.sample_rate,
            num_channels
        );
        Ok(())
    }

    /// Stops the stream and releases the input device immediately.
    pub fn stop(&mut self) {
        self.stream = None;
        tracing::debug!("Audio stream stopped, device released");
    }

    /// Drains and returns all samples accumulated since the last drain.
    pub fn take_pending(&self) -> Vec<i16> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    /// Shared handle to the pending buffer, for the flush task.
    pub fn pending_handle(&self) -> Arc<Mutex<Vec<i16>>> {
        Arc::clone(&self.pending)
    }

    /// Most recent samples for the waveform display.
    pub fn latest_window(&self) -> Vec<i16> {
        self.viz_window.lock().unwrap().clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn pause(&self) {
        *self.is_paused.lock().unwrap() = true;
        tracing::debug!("Recording paused");
    }

    pub fn resume(&self) {
        *self.is_paused.lock().unwrap() = false;
        tracing::debug!("Recording resumed");
    }
}

/// Converts interleaved multi-channel audio to mono by averaging channels.
pub fn downmix_to_mono(data: &[i16], num_channels: usize) -> Vec<i16> {
    match num_channels {
        0 | 1 => data.to_vec(),
        2 => data
            .chunks_exact(2)
            .map(|pair| {
                let left = pair[0] as i32;
                let right = pair[1] as i32;
                ((left + right) / 2) as i16
            })
            .collect(),
        _ => data
            .chunks_exact(num_channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / num_channels as i32) as i16
            })
            .collect(),
    }
}

/// Encodes samples as little-endian s16 PCM bytes.
pub fn encode_fragment(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Builds a 44-byte WAV header for a mono s16le stream of unknown length.
///
/// The RIFF and data chunk sizes carry the 0xFFFFFFFF streaming sentinel:
/// the total length is unknown while parts are still being uploaded, and
/// part 1 cannot be patched afterwards. ffmpeg and other decoders accept
/// this framing.
pub fn wav_stream_header(sample_rate: u32) -> [u8; 44] {
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * block_align as u32;

    let mut header = [0u8; 44];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&u32::MAX.to_le_bytes());
    header
}

/// Finds an audio input device by name or numeric index.
///
/// # Errors
/// - If no device with the specified name/index is found
fn find_device_by_name(host: &cpal::Host, device_spec: &str) -> Result<cpal::Device> {
    if let Ok(index) = device_spec.parse::<usize>() {
        let devices: Vec<_> = host
            .input_devices()
            .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?
            .collect();

        if index < devices.len() {
            return devices
                .into_iter()
                .nth(index)
                .ok_or_else(|| anyhow!("Device index {index} disappeared during enumeration"));
        }
        return Err(anyhow!(
            "Device index {} is out of range (0-{})",
            index,
            devices.len().saturating_sub(1)
        ));
    }

    let devices = host
        .input_devices()
        .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?;

    for device in devices {
        if let Ok(name) = device.name() {
            if name == device_spec {
                return Ok(device);
            }
        }
    }

    Err(anyhow!(
        "Audio input device '{device_spec}' not found. Use 'therec list-devices' to see available devices."
    ))
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library warnings on Linux.
/// On non-Linux platforms, this is a no-op since ALSA doesn't exist.
#[cfg(target_os = "linux")]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let dev_null = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|e| anyhow!("Failed to open /dev/null: {e}"))?;

    let dev_null_fd = dev_null.as_raw_fd();

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return Err(anyhow!("Failed to duplicate stderr"));
    }

    let redirect_result = unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) };
    if redirect_result == -1 {
        unsafe { libc::close(old_stderr) };
        return Err(anyhow!("Failed to redirect stderr"));
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_stereo_averages_pairs() {
        let stereo = [100i16, 200, -50, 50, i16::MAX, i16::MAX];
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono, vec![150, 0, i16::MAX]);
    }

    #[test]
    fn downmix_mono_passes_through() {
        let data = [1i16, 2, 3];
        assert_eq!(downmix_to_mono(&data, 1), data.to_vec());
    }

    #[test]
    fn downmix_four_channels_averages_frames() {
        let data = [4i16, 8, 12, 16, -4, -8, -12, -16];
        assert_eq!(downmix_to_mono(&data, 4), vec![10, -10]);
    }

    #[test]
    fn fragment_encoding_is_little_endian() {
        let bytes = encode_fragment(&[0x0102i16, -2]);
        assert_eq!(bytes, vec![0x02, 0x01, 0xFE, 0xFF]);
    }

    #[test]
    fn pending_samples_survive_stream_stop() {
        // The final drain happens after the stream is released, so the tail
        // captured up to the stop must still be there.
        let mut recorder = AudioRecorder::new(16_000, "default".to_string());
        recorder
            .pending_handle()
            .lock()
            .unwrap()
            .extend_from_slice(&[5i16; 8]);

        recorder.stop();
        assert_eq!(recorder.take_pending(), vec![5i16; 8]);
        assert!(recorder.take_pending().is_empty());
    }

    #[test]
    fn wav_header_layout() {
        let header = wav_stream_header(16_000);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(&header[36..40], b"data");
        // Streaming sentinels for the unknown total length.
        assert_eq!(header[4..8], u32::MAX.to_le_bytes());
        assert_eq!(header[40..44], u32::MAX.to_le_bytes());
        // PCM, mono, 16-bit at the requested rate.
        assert_eq!(header[20..22], 1u16.to_le_bytes());
        assert_eq!(header[22..24], 1u16.to_le_bytes());
        assert_eq!(header[24..28], 16_000u32.to_le_bytes());
        assert_eq!(header[28..32], 32_000u32.to_le_bytes());
        assert_eq!(header[34..36], 16u16.to_le_bytes());
    }
}
