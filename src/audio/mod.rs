//! Audio pipeline: capture → resample → encode → send, and
//! receive → decode queue → decode → resample → play.
//!
//! # Pipeline
//!
//! ```text
//! AudioCodec::read_input → Resampler (per channel) → WakeWordDetector
//!                                                  | AudioProcessor
//!                                                  | direct (Listening)
//!                        → OpusEncode (worker) → Command::SendAudio
//!
//! network / P3 asset → DecodeQueue → OpusDecode (worker) → Resampler
//!                    → AudioCodec::write_output
//! ```
//!
//! The hardware and compression codecs are traits ([`AudioCodec`],
//! [`OpusFactory`]); [`AudioPipeline`] owns the threads and ordering rules.

pub mod asset;
pub mod buffer;
pub mod codec;
pub mod decode_queue;
pub mod pipeline;
pub mod processor;
pub mod resample;

pub use asset::{parse_p3, AssetError, DirSoundBank, Sound, SoundBank};
pub use buffer::RingBuffer;
pub use codec::{AudioCodec, CodecError, OpusDecode, OpusEncode, OpusFactory};
pub use decode_queue::{DecodeQueue, OutputPoll};
pub use pipeline::{AudioPipeline, PipelineError};
pub use processor::{AudioProcessor, EnergyVad, ProcessorOutput, WakeWordDetector};
pub use resample::{deinterleave, interleave, Resampler};
