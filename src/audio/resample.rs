use crate::error::{ParleyError, Result};

use super::buffer::Waveform;

/// Sample rate expected by the transcription endpoint.
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Block-average sample rate converter.
///
/// Each output sample is the mean of the input samples that fall inside its
/// window. There is no low-pass stage, so content above the target Nyquist
/// frequency aliases; speech recognition tolerates this.
#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    target_rate: u32,
}

impl Resampler {
    pub fn new(target_rate: u32) -> Result<Self> {
        if target_rate == 0 {
            return Err(ParleyError::Audio(
                "target sample rate must be non-zero".to_string(),
            ));
        }
        Ok(Self { target_rate })
    }

    #[must_use]
    pub const fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Convert `waveform` to the target rate. Returns the input untouched when
    /// the rates already match.
    #[must_use]
    pub fn resample(&self, waveform: Waveform) -> Waveform {
        if waveform.sample_rate == self.target_rate {
            return waveform;
        }

        let samples = block_average(&waveform.samples, waveform.sample_rate, self.target_rate);
        tracing::debug!(
            "resampled {} samples at {} Hz to {} samples at {} Hz",
            waveform.samples.len(),
            waveform.sample_rate,
            samples.len(),
            self.target_rate
        );

        Waveform::new(samples, self.target_rate)
    }
}

impl Default for Resampler {
    fn default() -> Self {
        Self {
            target_rate: TARGET_SAMPLE_RATE,
        }
    }
}

fn block_average(input: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == 0 || input.is_empty() {
        return Vec::new();
    }

    let ratio = f64::from(source_rate) / f64::from(target_rate);
    let output_len = (input.len() as f64 / ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);

    let mut window_start = 0usize;
    for i in 0..output_len {
        let window_end = (((i + 1) as f64) * ratio).round() as usize;
        let start = window_start.min(input.len());
        let end = window_end.min(input.len());

        // Upsampling can produce windows with no input samples.
        let sample = if end > start {
            let window = &input[start..end];
            let sum: f64 = window.iter().map(|&s| f64::from(s)).sum();
            (sum / window.len() as f64) as f32
        } else {
            0.0
        };
        output.push(sample);
        window_start = window_end;
    }

    output
}

/// Average interleaved frames down to a single channel.
#[must_use]
pub fn mix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    let ch = channels as usize;
    let frame_count = interleaved.len() / ch;
    let mut mono = Vec::with_capacity(frame_count);
    for frame in interleaved.chunks_exact(ch) {
        let sum: f32 = frame.iter().sum();
        mono.push(sum / ch as f32);
    }
    mono
}
