//! Sample-rate conversion and channel (de)interleaving for 16-bit PCM.
//!
//! The capture path converts the hardware's native input rate to the
//! canonical pipeline rate; the playback path converts the decoder's rate to
//! the hardware's output rate.  A two-channel input (mic + echo reference) is
//! split with [`deinterleave`], each channel converted on its own, and joined
//! again with [`interleave`].
//!
//! Conversion is linear interpolation, frame by frame.  It is cheap enough to
//! run on the audio thread for every capture frame.

// ---------------------------------------------------------------------------
// Resampler
// ---------------------------------------------------------------------------

/// Linear-interpolation resampler between two fixed rates.
///
/// # Example
///
/// ```rust
/// use voice_device::audio::Resampler;
///
/// // 30 ms at 48 kHz → 30 ms at 16 kHz
/// let r = Resampler::new(48_000, 16_000);
/// assert_eq!(r.output_samples(1_440), 480);
/// assert_eq!(r.process(&vec![100_i16; 1_440]).len(), 480);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resampler {
    input_rate: u32,
    output_rate: u32,
}

impl Resampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            input_rate,
            output_rate,
        }
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// `true` when the rates match (or either is zero) and [`process`](Self::process)
    /// copies its input unchanged.
    pub fn is_passthrough(&self) -> bool {
        self.input_rate == self.output_rate || self.input_rate == 0 || self.output_rate == 0
    }

    /// Number of output samples produced for `input_samples` input samples.
    pub fn output_samples(&self, input_samples: usize) -> usize {
        if self.is_passthrough() {
            return input_samples;
        }
        let ratio = self.output_rate as f64 / self.input_rate as f64;
        (input_samples as f64 * ratio).ceil() as usize
    }

    /// Convert one mono frame.
    pub fn process(&self, samples: &[i16]) -> Vec<i16> {
        if self.is_passthrough() {
            return samples.to_vec();
        }
        if samples.is_empty() {
            return Vec::new();
        }

        let ratio = self.output_rate as f64 / self.input_rate as f64;
        let output_len = self.output_samples(samples.len());
        let mut output = Vec::with_capacity(output_len);

        for i in 0..output_len {
            let src_pos = i as f64 / ratio;
            let idx = src_pos as usize;
            let frac = (src_pos - idx as f64) as f32;

            let sample = if idx + 1 < samples.len() {
                samples[idx] as f32 * (1.0 - frac) + samples[idx + 1] as f32 * frac
            } else if idx < samples.len() {
                samples[idx] as f32
            } else {
                0.0
            };

            output.push(sample.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16);
        }

        output
    }
}

// ---------------------------------------------------------------------------
// Channel helpers
// ---------------------------------------------------------------------------

/// Split an interleaved two-channel frame into `(first, second)` channels.
///
/// A trailing odd sample is ignored.
pub fn deinterleave(samples: &[i16]) -> (Vec<i16>, Vec<i16>) {
    samples
        .chunks_exact(2)
        .map(|frame| (frame[0], frame[1]))
        .unzip()
}

/// Join two mono channels into one interleaved frame.
///
/// The output is as long as the shorter channel allows.
pub fn interleave(first: &[i16], second: &[i16]) -> Vec<i16> {
    first
        .iter()
        .zip(second)
        .flat_map(|(&a, &b)| [a, b])
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
