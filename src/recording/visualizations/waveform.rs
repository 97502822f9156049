//! Scrolling amplitude waveform.
//!
//! Turns raw time-domain samples into a smoothed loudness signal and keeps
//! a fixed-capacity circular history of it, one slot per visible bar. The
//! display never blocks or observes the upload path.

/// Input gain applied to the raw RMS value.
const INPUT_GAIN: f32 = 4.0;
/// Power-law response exponent; < 1 visually boosts quiet passages.
const RESPONSE_CURVE: f32 = 0.75;
/// Exponential smoothing weight of the previous frame.
const SMOOTHING: f32 = 0.85;
/// Minimum stored bar value so silent stretches still render a baseline.
const BAR_FLOOR: f32 = 0.05;

/// Converts sample windows into a smoothed 0.0-1.0 amplitude signal.
#[derive(Debug, Default)]
pub struct AmplitudeTracker {
    last: f32,
}

impl AmplitudeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one window of samples and returns the smoothed amplitude.
    ///
    /// RMS of the window, scaled by the input gain, shaped by the response
    /// curve, then blended with the previous frame. An empty window decays
    /// the signal toward zero instead of holding it.
    pub fn update(&mut self, samples: &[i16]) -> f32 {
        let rms = if samples.is_empty() {
            0.0
        } else {
            let mean_square = samples
                .iter()
                .map(|&s| (s as f64) * (s as f64))
                .sum::<f64>()
                / samples.len() as f64;
            (mean_square.sqrt() / f64::from(i16::MAX) as f64) as f32
        };

        let shaped = (rms * INPUT_GAIN).min(1.0).powf(RESPONSE_CURVE);
        let smoothed = self.last * SMOOTHING + shaped * (1.0 - SMOOTHING);
        self.last = smoothed;
        smoothed
    }
}

/// Fixed-capacity circular buffer of bar amplitudes.
///
/// Writes overwrite the oldest slot; `ordered` returns bars oldest to
/// newest for drawing. Resizing resamples the history into the new bar
/// count instead of discarding it, so the visual shape survives layout
/// changes.
#[derive(Debug)]
pub struct WaveformBuffer {
    bars: Vec<f32>,
    write_index: usize,
}

impl WaveformBuffer {
    pub fn new(bar_count: usize) -> Self {
        Self {
            bars: vec![BAR_FLOOR; bar_count.max(1)],
            write_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Writes one amplitude into the oldest slot.
    pub fn push(&mut self, amplitude: f32) {
        self.bars[self.write_index] = amplitude.max(BAR_FLOOR);
        self.write_index = (self.write_index + 1) % self.bars.len();
    }

    /// Bars in chronological order, oldest first.
    pub fn ordered(&self) -> Vec<f32> {
        let n = self.bars.len();
        (0..n)
            .map(|i| self.bars[(self.write_index + i) % n])
            .collect()
    }

    /// Changes the bar count, preserving history by linear resampling.
    pub fn resize(&mut self, bar_count: usize) {
        let bar_count = bar_count.max(1);
        if bar_count == self.bars.len() {
            return;
        }
        self.bars = resample(&self.ordered(), bar_count);
        // Stored chronologically after a resample: index 0 is the oldest.
        self.write_index = 0;
    }
}

/// Linearly resamples `samples` into `new_count` values, preserving shape.
pub fn resample(samples: &[f32], new_count: usize) -> Vec<f32> {
    let old_count = samples.len();
    if old_count <= 1 {
        return vec![samples.first().copied().unwrap_or(BAR_FLOOR); new_count];
    }
    if new_count == 1 {
        return vec![samples[old_count - 1]];
    }

    (0..new_count)
        .map(|i| {
            let t = (i as f32 / (new_count - 1) as f32) * (old_count - 1) as f32;
            let i0 = t.floor() as usize;
            let i1 = (i0 + 1).min(old_count - 1);
            let frac = t - i0 as f32;
            samples[i0] * (1.0 - frac) + samples[i1] * frac
        })
        .collect()
}
