//! Capture-side consumers: the voice-activity / noise-suppression stage and
//! the wake-word detector.
//!
//! The audio loop hands each canonical-rate capture frame to exactly one of
//! these (wake word first, then the processor).  Both are started and stopped
//! by state-machine entry actions on the main loop and fed from the audio
//! thread, so the pipeline keeps them behind a mutex.
//!
//! [`EnergyVad`] is the built-in processor: RMS energy against a threshold,
//! mic channel forwarded for encoding.

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Result of feeding one frame to an [`AudioProcessor`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorOutput {
    /// Processed mono audio ready for the encoder.
    pub audio: Option<Vec<i16>>,
    /// `Some(speaking)` when the voice-activity state flipped on this frame.
    pub vad_change: Option<bool>,
}

/// Voice-activity detection / noise-suppression stage.
pub trait AudioProcessor: Send {
    fn is_running(&self) -> bool;

    fn start(&mut self);

    fn stop(&mut self);

    /// Samples per channel expected by [`feed`](Self::feed), at the pipeline rate.
    fn feed_size(&self) -> usize;

    /// Consume one interleaved frame of `feed_size() * channels` samples.
    fn feed(&mut self, frame: &[i16]) -> ProcessorOutput;
}

/// Wake-phrase detector.
pub trait WakeWordDetector: Send {
    fn is_running(&self) -> bool;

    fn start_detection(&mut self);

    fn stop_detection(&mut self);

    /// Samples per channel expected by [`feed`](Self::feed), at the pipeline rate.
    fn feed_size(&self) -> usize;

    /// Returns the detected phrase, if this frame completed one.
    fn feed(&mut self, frame: &[i16]) -> Option<String>;
}

// ---------------------------------------------------------------------------
// EnergyVad
// ---------------------------------------------------------------------------

/// Energy-based voice-activity processor.
///
/// # Example
///
/// ```rust
/// use voice_device::audio::{AudioProcessor, EnergyVad};
///
/// let mut vad = EnergyVad::new(0.01, 480, 1);
/// vad.start();
///
/// let out = vad.feed(&vec![8_000_i16; 480]);
/// assert_eq!(out.vad_change, Some(true));
/// assert_eq!(out.audio.map(|a| a.len()), Some(480));
/// ```
pub struct EnergyVad {
    /// RMS threshold on normalised `[-1.0, 1.0]` samples.
    rms_threshold: f32,
    frame_size: usize,
    channels: usize,
    running: bool,
    speaking: bool,
}

impl EnergyVad {
    /// `frame_size` is samples per channel; `channels` is 1 or 2 (the second
    /// channel, if present, is the echo reference and is not analysed).
    pub fn new(rms_threshold: f32, frame_size: usize, channels: u16) -> Self {
        assert!(frame_size > 0, "frame_size must be > 0");
        Self {
            rms_threshold,
            frame_size,
            channels: channels.max(1) as usize,
            running: false,
            speaking: false,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.rms_threshold
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    fn is_voice_frame(&self, mic: &[i16]) -> bool {
        if mic.is_empty() {
            return false;
        }
        let mean_sq: f32 = mic
            .iter()
            .map(|&s| {
                let s = s as f32 / i16::MAX as f32;
                s * s
            })
            .sum::<f32>()
            / mic.len() as f32;
        mean_sq.sqrt() > self.rms_threshold
    }
}

impl AudioProcessor for EnergyVad {
    fn is_running(&self) -> bool {
        self.running
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
        self.speaking = false;
    }

    fn feed_size(&self) -> usize {
        self.frame_size
    }

    fn feed(&mut self, frame: &[i16]) -> ProcessorOutput {
        if !self.running {
            return ProcessorOutput::default();
        }

        let mic: Vec<i16> = frame.iter().step_by(self.channels).copied().collect();
        let voice = self.is_voice_frame(&mic);
        let vad_change = (voice != self.speaking).then_some(voice);
        self.speaking = voice;

        ProcessorOutput {
            audio: Some(mic),
            vad_change,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
