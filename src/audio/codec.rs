//! Hardware audio codec and compressed-frame codec interfaces.
//!
//! [`AudioCodec`] is the PCM hardware boundary: read/write interleaved
//! 16-bit samples at the hardware's native rates.  [`OpusFactory`] builds the
//! packet encoder/decoder used on the network side of the pipeline; the
//! compression algorithm itself is opaque to this crate.
//!
//! Both are shared between the audio thread and the background worker, so
//! they are `Send + Sync` and take `&self` (implementations use interior
//! mutability where they need it).

use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioCodec
// ---------------------------------------------------------------------------

/// PCM capture/playback hardware.
pub trait AudioCodec: Send + Sync {
    /// Fill `buffer` with interleaved input samples.  Returns `false` if no
    /// data could be read (input disabled, device gone).
    fn read_input(&self, buffer: &mut [i16]) -> bool;

    /// Queue mono samples for playback at [`output_sample_rate`](Self::output_sample_rate).
    fn write_output(&self, pcm: &[i16]);

    fn input_sample_rate(&self) -> u32;

    fn output_sample_rate(&self) -> u32;

    /// Interleaved input channels: 1 (mic) or 2 (mic + echo reference).
    fn input_channels(&self) -> u16;

    fn enable_input(&self, enable: bool);

    fn enable_output(&self, enable: bool);

    fn output_enabled(&self) -> bool;

    /// Power up the hardware.  Called once before the audio loop starts.
    fn start(&self);
}

// ---------------------------------------------------------------------------
// Compressed-frame codec
// ---------------------------------------------------------------------------

/// Errors from decoding a single compressed packet.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CodecError {
    #[error("corrupt packet: {0}")]
    Corrupt(String),
}

/// Stateful PCM → packet encoder.
pub trait OpusEncode: Send {
    /// Buffer `pcm` and return every complete packet it produced (zero or
    /// more, one per frame duration).
    fn encode(&mut self, pcm: &[i16]) -> Vec<Vec<u8>>;

    /// Discard buffered samples and internal predictor state.
    fn reset_state(&mut self);
}

/// Stateful packet → PCM decoder.
pub trait OpusDecode: Send {
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>, CodecError>;

    fn reset_state(&mut self);

    fn sample_rate(&self) -> u32;

    fn frame_duration_ms(&self) -> u32;
}

/// Builds encoders and decoders for a given `(rate, channels, frame duration)`.
pub trait OpusFactory: Send + Sync {
    fn new_encoder(&self, sample_rate: u32, channels: u16, frame_duration_ms: u32)
        -> Box<dyn OpusEncode>;

    fn new_decoder(&self, sample_rate: u32, channels: u16, frame_duration_ms: u32)
        -> Box<dyn OpusDecode>;
}

// Compile-time assertion: the traits must stay object-safe.
const _: fn() = || {
    fn _assert_object_safe(
        _: Box<dyn AudioCodec>,
        _: Box<dyn OpusEncode>,
        _: Box<dyn OpusDecode>,
        _: Box<dyn OpusFactory>,
    ) {
    }
};
