//! Full-duplex host audio via `cpal`.
//!
//! [`CpalCodec`] implements [`AudioCodec`] on the default input and output
//! devices.  Capture is downmixed to mono 16-bit and buffered in a ring the
//! audio loop reads from; playback is written to a second ring drained by the
//! output callback (silence on underrun).  Writers block while the playback
//! ring is full, so decoded audio is paced at the device rate.
//!
//! `cpal::Stream` is not `Send`, so both streams are built and kept alive on
//! a dedicated `cpal-streams` thread.  Dropping the codec stops them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use crate::audio::{AudioCodec, RingBuffer};

/// How long `read_input` waits for a full frame.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// How long `write_output` waits for room before dropping the rest.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Ring capacity, in seconds of audio.
const BUFFER_SECS: usize = 2;

#[derive(Debug, Error)]
pub enum HostAudioError {
    #[error("no input device found on the default audio host")]
    NoInputDevice,

    #[error("no output device found on the default audio host")]
    NoOutputDevice,

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Sample conversion
// ---------------------------------------------------------------------------

/// Average interleaved `f32` frames into mono 16-bit samples.
pub fn downmix(data: &[f32], channels: usize) -> Vec<i16> {
    let channels = channels.max(1);
    data.chunks(channels)
        .map(|frame| to_i16(frame.iter().sum::<f32>() / frame.len() as f32))
        .collect()
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

// ---------------------------------------------------------------------------
// Shared ring state
// ---------------------------------------------------------------------------

struct Shared {
    input: Mutex<RingBuffer<i16>>,
    input_ready: Condvar,
    output: Mutex<RingBuffer<i16>>,
    output_room: Condvar,
    input_enabled: AtomicBool,
    output_enabled: AtomicBool,
}

impl Shared {
    fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            input: Mutex::new(RingBuffer::new(input_rate as usize * BUFFER_SECS)),
            input_ready: Condvar::new(),
            output: Mutex::new(RingBuffer::new(output_rate as usize * BUFFER_SECS)),
            output_room: Condvar::new(),
            input_enabled: AtomicBool::new(true),
            output_enabled: AtomicBool::new(true),
        }
    }

    fn on_input(&self, data: &[f32], channels: usize) {
        if !self.input_enabled.load(Ordering::Relaxed) {
            return;
        }
        lock(&self.input).push_slice(&downmix(data, channels));
        self.input_ready.notify_all();
    }

    fn fill_output(&self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let mut mono = vec![0i16; data.len() / channels];
        if self.output_enabled.load(Ordering::Relaxed) {
            self.pop_output(&mut mono);
        }
        for (frame, sample) in data.chunks_mut(channels).zip(mono) {
            frame.fill(to_f32(sample));
        }
    }

    fn pop_output(&self, out: &mut [i16]) -> usize {
        let popped = lock(&self.output).pop_into(out);
        if popped > 0 {
            self.output_room.notify_all();
        }
        popped
    }

    /// Append `pcm` to the playback ring, waiting for the output callback to
    /// make room.  Never overwrites unplayed audio: whatever does not fit
    /// within `timeout`, or arrives while output is disabled, is dropped.
    /// Returns the number of samples queued.
    fn write_output(&self, pcm: &[i16], timeout: Duration) -> usize {
        let mut written = 0;
        let mut ring = lock(&self.output);
        while written < pcm.len() {
            let chunk = (pcm.len() - written).min(ring.capacity());
            let (guard, wait) = self
                .output_room
                .wait_timeout_while(ring, timeout, |ring| {
                    self.output_enabled.load(Ordering::Relaxed)
                        && ring.capacity() - ring.len() < chunk
                })
                .unwrap_or_else(PoisonError::into_inner);
            ring = guard;
            if wait.timed_out() || !self.output_enabled.load(Ordering::Relaxed) {
                log::debug!("audio: playback stalled, dropped {} samples", pcm.len() - written);
                break;
            }
            ring.push_slice(&pcm[written..written + chunk]);
            written += chunk;
        }
        written
    }
}

// ---------------------------------------------------------------------------
// CpalCodec
// ---------------------------------------------------------------------------

pub struct CpalCodec {
    input: cpal::StreamConfig,
    output: cpal::StreamConfig,
    shared: Arc<Shared>,
    /// Dropping the sender stops the stream thread.
    stop: Mutex<Option<mpsc::Sender<()>>>,
}

impl CpalCodec {
    /// Query the default input and output devices.  Streams are not opened
    /// until [`AudioCodec::start`].
    pub fn open() -> Result<Self, HostAudioError> {
        let host = cpal::default_host();
        let input: cpal::StreamConfig = host
            .default_input_device()
            .ok_or(HostAudioError::NoInputDevice)?
            .default_input_config()?
            .into();
        let output: cpal::StreamConfig = host
            .default_output_device()
            .ok_or(HostAudioError::NoOutputDevice)?
            .default_output_config()?
            .into();

        Ok(Self {
            shared: Arc::new(Shared::new(input.sample_rate.0, output.sample_rate.0)),
            input,
            output,
            stop: Mutex::new(None),
        })
    }
}

fn open_streams(
    input: &cpal::StreamConfig,
    output: &cpal::StreamConfig,
    shared: &Arc<Shared>,
) -> Result<(cpal::Stream, cpal::Stream), HostAudioError> {
    let host = cpal::default_host();
    let input_device = host
        .default_input_device()
        .ok_or(HostAudioError::NoInputDevice)?;
    let output_device = host
        .default_output_device()
        .ok_or(HostAudioError::NoOutputDevice)?;

    let capture = Arc::clone(shared);
    let input_channels = input.channels as usize;
    let input_stream = input_device.build_input_stream(
        input,
        move |data: &[f32], _: &cpal::InputCallbackInfo| capture.on_input(data, input_channels),
        |err: cpal::StreamError| log::error!("audio: input stream error: {err}"),
        None,
    )?;

    let playback = Arc::clone(shared);
    let output_channels = output.channels as usize;
    let output_stream = output_device.build_output_stream(
        output,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            playback.fill_output(data, output_channels)
        },
        |err: cpal::StreamError| log::error!("audio: output stream error: {err}"),
        None,
    )?;

    input_stream.play()?;
    output_stream.play()?;
    Ok((input_stream, output_stream))
}

impl AudioCodec for CpalCodec {
    fn read_input(&self, buffer: &mut [i16]) -> bool {
        if !self.shared.input_enabled.load(Ordering::Relaxed) {
            return false;
        }
        let ring = lock(&self.shared.input);
        let (mut ring, _) = self
            .shared
            .input_ready
            .wait_timeout_while(ring, READ_TIMEOUT, |ring| ring.len() < buffer.len())
            .unwrap_or_else(PoisonError::into_inner);
        if ring.len() < buffer.len() {
            return false;
        }
        ring.pop_into(buffer) == buffer.len()
    }

    fn write_output(&self, pcm: &[i16]) {
        self.shared.write_output(pcm, WRITE_TIMEOUT);
    }

    fn input_sample_rate(&self) -> u32 {
        self.input.sample_rate.0
    }

    fn output_sample_rate(&self) -> u32 {
        self.output.sample_rate.0
    }

    fn input_channels(&self) -> u16 {
        1
    }

    fn enable_input(&self, enable: bool) {
        self.shared.input_enabled.store(enable, Ordering::Relaxed);
        if !enable {
            lock(&self.shared.input).clear();
        }
    }

    fn enable_output(&self, enable: bool) {
        self.shared.output_enabled.store(enable, Ordering::Relaxed);
        self.shared.output_room.notify_all();
    }

    fn output_enabled(&self) -> bool {
        self.shared.output_enabled.load(Ordering::Relaxed)
    }

    fn start(&self) {
        let mut stop = lock(&self.stop);
        if stop.is_some() {
            return;
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let input = self.input.clone();
        let output = self.output.clone();
        let shared = Arc::clone(&self.shared);

        let spawned = thread::Builder::new()
            .name("cpal-streams".into())
            .spawn(move || {
                let streams = match open_streams(&input, &output, &shared) {
                    Ok(streams) => streams,
                    Err(e) => {
                        log::error!("audio: host streams unavailable: {e}");
                        return;
                    }
                };
                log::info!(
                    "audio: host streams running (in {} Hz x{}, out {} Hz x{})",
                    input.sample_rate.0,
                    input.channels,
                    output.sample_rate.0,
                    output.channels
                );
                // Blocks until the codec is dropped.
                let _ = stop_rx.recv();
                drop(streams);
            });

        match spawned {
            Ok(_) => *stop = Some(stop_tx),
            Err(e) => log::error!("audio: failed to spawn stream thread: {e}"),
        }
    }
}

impl Drop for CpalCodec {
    fn drop(&mut self) {
        lock(&self.stop).take();
    }
}
