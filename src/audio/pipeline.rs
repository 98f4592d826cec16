//! Bidirectional audio pipeline: capture → encode → send, and
//! receive → decode → play.
//!
//! # Threads
//!
//! ```text
//!  audio-loop thread                 audio-worker thread        main loop
//!  ─────────────────                 ───────────────────        ─────────
//!  read frame ─▶ resample ─▶ claim ─▶ encode ──────────────────▶ SendAudio
//!  poll decode queue ──────────────▶ decode ─▶ resample ─▶ play
//! ```
//!
//! The audio loop only reads and writes hardware and submits work; codec CPU
//! cost runs on the single background worker; network I/O happens on the
//! main loop.  State-machine entry actions call in from the main loop to
//! reset codecs, start or stop the capture consumers and reconfigure the
//! decoder.
//!
//! # Cancellation
//!
//! [`AudioPipeline::abort`] sets a flag that every decode job checks when it
//! *runs*, so packets popped before the abort still produce no output.
//!
//! # Degraded mode
//!
//! Without an [`AudioCodec`] every audio operation is a no-op and the device
//! keeps working for non-audio interactions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use thiserror::Error;

use crate::config::AudioConfig;
use crate::device::{Board, Command, DeviceState, StateCell};
use crate::scheduler::{BackgroundWorker, Scheduler};

use super::asset::{parse_p3, AssetError};
use super::codec::{AudioCodec, OpusDecode, OpusEncode, OpusFactory};
use super::decode_queue::{DecodeQueue, OutputPoll};
use super::processor::{AudioProcessor, WakeWordDetector};
use super::resample::{deinterleave, interleave, Resampler};

/// Decode jobs the output path keeps queued on the worker at once.
const MAX_DECODES_IN_FLIGHT: usize = 2;

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Only mono and mic + reference stereo input are handled.
    #[error("unsupported input channel count {0} (expected 1 or 2)")]
    UnsupportedChannels(u16),

    #[error("failed to start audio thread: {0}")]
    Spawn(#[from] std::io::Error),
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Hardware
// ---------------------------------------------------------------------------

/// Everything that only exists when a codec is present.
struct Hardware {
    codec: Arc<dyn AudioCodec>,
    channels: u16,
    /// Native input rate → pipeline rate, applied per channel.
    input: Resampler,
    encoder: Mutex<Box<dyn OpusEncode>>,
    decoder: Mutex<Box<dyn OpusDecode>>,
}

// ---------------------------------------------------------------------------
// AudioPipeline
// ---------------------------------------------------------------------------

pub struct AudioPipeline {
    config: AudioConfig,
    hw: Option<Hardware>,
    opus: Arc<dyn OpusFactory>,
    queue: DecodeQueue,
    worker: BackgroundWorker,
    scheduler: Scheduler<Command>,
    state: StateCell,
    board: Arc<dyn Board>,
    processor: Mutex<Option<Box<dyn AudioProcessor>>>,
    wake_word: Mutex<Option<Box<dyn WakeWordDetector>>>,
    aborted: AtomicBool,
    last_output: Mutex<Instant>,
    idle_shown: AtomicBool,
    running: AtomicBool,
}

impl AudioPipeline {
    /// Build the pipeline and start its background worker.
    ///
    /// With `codec == None` the pipeline runs degraded.
    pub fn new(
        config: &AudioConfig,
        codec: Option<Arc<dyn AudioCodec>>,
        opus: Arc<dyn OpusFactory>,
        board: Arc<dyn Board>,
        scheduler: Scheduler<Command>,
        state: StateCell,
    ) -> Result<Self, PipelineError> {
        let hw = match codec {
            Some(codec) => {
                let channels = codec.input_channels();
                if !(1..=2).contains(&channels) {
                    return Err(PipelineError::UnsupportedChannels(channels));
                }
                let encoder =
                    opus.new_encoder(config.pipeline_sample_rate, 1, config.frame_duration_ms);
                let decoder =
                    opus.new_decoder(codec.output_sample_rate(), 1, config.frame_duration_ms);
                log::info!(
                    "audio: codec in {} Hz x{channels}, out {} Hz",
                    codec.input_sample_rate(),
                    codec.output_sample_rate()
                );
                Some(Hardware {
                    input: Resampler::new(codec.input_sample_rate(), config.pipeline_sample_rate),
                    codec,
                    channels,
                    encoder: Mutex::new(encoder),
                    decoder: Mutex::new(decoder),
                })
            }
            None => {
                log::warn!("audio: no audio codec, audio operations are disabled");
                None
            }
        };

        Ok(Self {
            config: config.clone(),
            hw,
            opus,
            queue: DecodeQueue::new(),
            worker: BackgroundWorker::spawn("audio-worker")?,
            scheduler,
            state,
            board,
            processor: Mutex::new(None),
            wake_word: Mutex::new(None),
            aborted: AtomicBool::new(false),
            last_output: Mutex::new(Instant::now()),
            idle_shown: AtomicBool::new(false),
            running: AtomicBool::new(false),
        })
    }

    /// Install the voice-activity / noise-suppression stage.
    pub fn with_processor(self, processor: Box<dyn AudioProcessor>) -> Self {
        *lock(&self.processor) = Some(processor);
        self
    }

    /// Install the wake-phrase detector.
    pub fn with_wake_word(self, detector: Box<dyn WakeWordDetector>) -> Self {
        *lock(&self.wake_word) = Some(detector);
        self
    }

    pub fn has_codec(&self) -> bool {
        self.hw.is_some()
    }

    /// Hardware playback rate, if there is hardware.
    pub fn output_sample_rate(&self) -> Option<u32> {
        self.hw.as_ref().map(|hw| hw.codec.output_sample_rate())
    }

    pub fn queue(&self) -> &DecodeQueue {
        &self.queue
    }

    pub fn background(&self) -> &BackgroundWorker {
        &self.worker
    }

    // ---- audio loop ---

    /// Power up the codec and run the audio loop on its own thread.
    ///
    /// Returns `Ok(None)` when there is no codec.
    pub fn spawn_loop(self: &Arc<Self>) -> std::io::Result<Option<JoinHandle<()>>> {
        let Some(hw) = &self.hw else {
            return Ok(None);
        };
        hw.codec.start();
        self.running.store(true, Ordering::Release);

        let pipeline = Arc::clone(self);
        thread::Builder::new()
            .name("audio-loop".into())
            .spawn(move || pipeline.run_loop())
            .map(Some)
    }

    /// Ask the audio loop to exit after its current iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn run_loop(self: Arc<Self>) {
        log::info!("audio: loop started");
        while self.running.load(Ordering::Acquire) {
            if !self.on_audio_input() {
                thread::sleep(self.config.idle_poll());
            }
            if self.hw.as_ref().is_some_and(|hw| hw.codec.output_enabled()) {
                self.on_audio_output();
            }
        }
        log::info!("audio: loop stopped");
    }

    // ---- capture path ---

    /// Read one frame and hand it to the highest-priority consumer.
    ///
    /// Returns `false` when nothing claimed a frame; the loop then sleeps.
    pub fn on_audio_input(self: &Arc<Self>) -> bool {
        let Some(hw) = &self.hw else {
            return false;
        };

        {
            let mut wake_word = lock(&self.wake_word);
            if let Some(detector) = wake_word.as_mut().filter(|d| d.is_running()) {
                let Some(frame) = self.read_audio(hw, detector.feed_size()) else {
                    return false;
                };
                if let Some(phrase) = detector.feed(&frame) {
                    log::info!("audio: wake word detected: {phrase}");
                    self.scheduler.schedule(Command::WakeWordDetected(phrase));
                }
                return true;
            }
        }

        {
            let mut processor = lock(&self.processor);
            if let Some(stage) = processor.as_mut().filter(|p| p.is_running()) {
                let Some(frame) = self.read_audio(hw, stage.feed_size()) else {
                    return false;
                };
                let output = stage.feed(&frame);
                drop(processor);

                if let Some(speaking) = output.vad_change {
                    if self.state.get() == DeviceState::Listening {
                        self.scheduler.schedule(Command::VoiceActivity(speaking));
                    }
                }
                if let Some(pcm) = output.audio {
                    self.encode_and_send(pcm);
                }
                return true;
            }
        }

        if self.state.get() == DeviceState::Listening {
            let Some(frame) = self.read_audio(hw, self.config.capture_frame_samples()) else {
                return false;
            };
            let mic = if hw.channels == 2 {
                deinterleave(&frame).0
            } else {
                frame
            };
            self.encode_and_send(mic);
            return true;
        }

        false
    }

    /// Read `samples` per channel, converted to the pipeline rate.
    fn read_audio(&self, hw: &Hardware, samples: usize) -> Option<Vec<i16>> {
        let channels = hw.channels as usize;
        let native = if hw.input.is_passthrough() {
            samples
        } else {
            samples * hw.input.input_rate() as usize / hw.input.output_rate() as usize
        };

        let mut data = vec![0i16; native * channels];
        if !hw.codec.read_input(&mut data) {
            return None;
        }
        if hw.input.is_passthrough() {
            return Some(data);
        }

        if channels == 2 {
            let (mic, reference) = deinterleave(&data);
            Some(interleave(
                &hw.input.process(&mic),
                &hw.input.process(&reference),
            ))
        } else {
            Some(hw.input.process(&data))
        }
    }

    /// Encode on the worker, then send from the main loop.
    fn encode_and_send(self: &Arc<Self>, pcm: Vec<i16>) {
        let pipeline = Arc::clone(self);
        self.worker.schedule(move || {
            let Some(hw) = &pipeline.hw else {
                return;
            };
            let packets = lock(&hw.encoder).encode(&pcm);
            for packet in packets {
                pipeline.scheduler.schedule(Command::SendAudio(packet));
            }
        });
    }

    // ---- output path ---

    /// Take the oldest queued packet and submit it for decoding.
    ///
    /// The codec write blocks at the device rate, so at most
    /// `MAX_DECODES_IN_FLIGHT` jobs are handed to the worker; the rest wait
    /// in the queue where barge-in can still drop them.
    pub fn on_audio_output(self: &Arc<Self>) {
        if self.hw.is_none() {
            return;
        }
        if self.worker.pending() >= MAX_DECODES_IN_FLIGHT {
            return;
        }

        let listening = self.state.get() == DeviceState::Listening;
        match self.queue.poll_output(listening) {
            OutputPoll::Empty => self.check_silence(),
            OutputPoll::Cleared(dropped) => {
                log::debug!("audio: barge-in, dropped {dropped} queued packets");
            }
            OutputPoll::Packet(packet) => {
                let pipeline = Arc::clone(self);
                self.worker
                    .schedule(move || pipeline.decode_and_play(&packet));
            }
        }
    }

    fn check_silence(&self) {
        if self.state.get() != DeviceState::Idle {
            return;
        }
        let silent_for = lock(&self.last_output).elapsed();
        if silent_for > self.config.max_silence() && !self.idle_shown.swap(true, Ordering::AcqRel)
        {
            log::debug!("audio: silent for {}s", silent_for.as_secs());
            self.board.show_device_state(DeviceState::Idle);
        }
    }

    fn decode_and_play(&self, packet: &[u8]) {
        if self.aborted.load(Ordering::Acquire) {
            return;
        }
        let Some(hw) = &self.hw else {
            return;
        };

        let (pcm, rate) = {
            let mut decoder = lock(&hw.decoder);
            match decoder.decode(packet) {
                Ok(pcm) => (pcm, decoder.sample_rate()),
                Err(e) => {
                    log::debug!("audio: dropping packet: {e}");
                    return;
                }
            }
        };

        let output_rate = hw.codec.output_sample_rate();
        let pcm = if rate != output_rate {
            Resampler::new(rate, output_rate).process(&pcm)
        } else {
            pcm
        };

        hw.codec.write_output(&pcm);
        self.mark_output();
    }

    fn mark_output(&self) {
        *lock(&self.last_output) = Instant::now();
        self.idle_shown.store(false, Ordering::Release);
    }

    // ---- codec control (main loop) ---

    /// Recreate the decoder for `(sample_rate, frame_duration_ms)`.
    ///
    /// No-op when the current decoder already matches; returns whether a new
    /// decoder was built.
    pub fn set_decode_sample_rate(&self, sample_rate: u32, frame_duration_ms: u32) -> bool {
        let Some(hw) = &self.hw else {
            return false;
        };
        {
            let decoder = lock(&hw.decoder);
            if decoder.sample_rate() == sample_rate
                && decoder.frame_duration_ms() == frame_duration_ms
            {
                return false;
            }
        }

        // Queued decode jobs must not see the decoder swapped under them.
        self.worker.wait_for_completion();
        *lock(&hw.decoder) = self.opus.new_decoder(sample_rate, 1, frame_duration_ms);

        let output_rate = hw.codec.output_sample_rate();
        if sample_rate != output_rate {
            log::info!("audio: resampling decoded audio {sample_rate} Hz -> {output_rate} Hz");
        }
        true
    }

    /// `(sample_rate, frame_duration_ms)` of the current decoder.
    pub fn decoder_format(&self) -> Option<(u32, u32)> {
        self.hw.as_ref().map(|hw| {
            let decoder = lock(&hw.decoder);
            (decoder.sample_rate(), decoder.frame_duration_ms())
        })
    }

    /// Reset decoder state, drop queued playback and re-enable output.
    pub fn reset_decoder(&self) {
        let Some(hw) = &self.hw else {
            return;
        };
        lock(&hw.decoder).reset_state();
        self.queue.clear();
        self.mark_output();
        hw.codec.enable_output(true);
    }

    pub fn reset_encoder(&self) {
        if let Some(hw) = &self.hw {
            lock(&hw.encoder).reset_state();
        }
    }

    /// Cancel playback: decode jobs that run from now on emit nothing.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn clear_abort(&self) {
        self.aborted.store(false, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    // ---- playback sources ---

    /// Queue a packet received from the network.
    pub fn push_incoming(&self, packet: Vec<u8>) {
        if self.hw.is_some() {
            self.queue.push(packet);
        }
    }

    /// Queue every packet of a P3 asset, switching the decoder to the asset
    /// format first.  Returns the number of packets queued.
    pub fn play_sound(&self, asset: &[u8]) -> Result<usize, AssetError> {
        if self.hw.is_none() {
            log::debug!("audio: no codec, sound skipped");
            return Ok(0);
        }
        let packets = parse_p3(asset)?;
        if self.is_aborted() {
            // Decodes of the interrupted stream still see the flag; local
            // cues must not.
            self.worker.wait_for_completion();
            self.clear_abort();
        }
        self.set_decode_sample_rate(
            self.config.asset_sample_rate,
            self.config.asset_frame_duration_ms,
        );
        let count = packets.len();
        self.queue.push_all(packets);
        Ok(count)
    }

    // ---- capture consumers (main loop) ---

    pub fn start_processor(&self) {
        if let Some(processor) = lock(&self.processor).as_mut() {
            processor.start();
        }
    }

    pub fn stop_processor(&self) {
        if let Some(processor) = lock(&self.processor).as_mut() {
            processor.stop();
        }
    }

    pub fn processor_running(&self) -> bool {
        lock(&self.processor)
            .as_ref()
            .is_some_and(|p| p.is_running())
    }

    pub fn start_wake_word(&self) {
        if let Some(detector) = lock(&self.wake_word).as_mut() {
            detector.start_detection();
        }
    }

    pub fn stop_wake_word(&self) {
        if let Some(detector) = lock(&self.wake_word).as_mut() {
            detector.stop_detection();
        }
    }

    pub fn wake_word_running(&self) -> bool {
        lock(&self.wake_word)
            .as_ref()
            .is_some_and(|d| d.is_running())
    }

    // ---- background worker ---

    /// Drain barrier: block until no codec job is queued or running.
    pub fn wait_for_background(&self) {
        self.worker.wait_for_completion();
    }

    /// Drain the worker and stop it for good.
    pub fn release_background(&self) {
        self.worker.release();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::EnergyVad;
    use crate::scheduler::TaskQueue;
    use crate::testing::{BoardEvent, MockBoard, MockCodec, MockOpus, MockWakeWord};
    use std::sync::mpsc;
    use std::time::Duration;

    struct Rig {
        pipeline: Arc<AudioPipeline>,
        codec: Arc<MockCodec>,
        opus: Arc<MockOpus>,
        board: Arc<MockBoard>,
        queue: TaskQueue<Command>,
        state: StateCell,
    }

    fn rig_with(codec: MockCodec, config: AudioConfig) -> Rig {
        let codec = Arc::new(codec);
        let opus = Arc::new(MockOpus::default());
        let board = Arc::new(MockBoard::default());
        let (scheduler, queue) = Scheduler::channel();
        let state = StateCell::new(DeviceState::Idle);
        let pipeline = AudioPipeline::new(
            &config,
            Some(codec.clone()),
            opus.clone(),
            board.clone(),
            scheduler,
            state.clone(),
        )
        .expect("pipeline");
        Rig {
            pipeline: Arc::new(pipeline),
            codec,
            opus,
            board,
            queue,
            state,
        }
    }

    fn rig() -> Rig {
        rig_with(MockCodec::new(16_000, 16_000, 1), AudioConfig::default())
    }

    fn sent_packets(queue: &mut TaskQueue<Command>) -> Vec<Vec<u8>> {
        queue
            .drain_ready()
            .into_iter()
            .filter_map(|c| match c {
                Command::SendAudio(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn drain_output(pipeline: &Arc<AudioPipeline>) {
        while !pipeline.queue().is_empty() {
            pipeline.on_audio_output();
        }
        pipeline.wait_for_background();
    }

    // ---- construction ---

    #[test]
    fn rejects_unsupported_channel_counts() {
        let (scheduler, _queue) = Scheduler::channel();
        let result = AudioPipeline::new(
            &AudioConfig::default(),
            Some(Arc::new(MockCodec::new(16_000, 16_000, 4))),
            Arc::new(MockOpus::default()),
            Arc::new(MockBoard::default()),
            scheduler,
            StateCell::default(),
        );
        assert!(matches!(result, Err(PipelineError::UnsupportedChannels(4))));
    }

    #[test]
    fn without_codec_everything_is_a_no_op() {
        let (scheduler, mut queue) = Scheduler::channel();
        let state = StateCell::new(DeviceState::Listening);
        let pipeline = Arc::new(
            AudioPipeline::new(
                &AudioConfig::default(),
                None,
                Arc::new(MockOpus::default()),
                Arc::new(MockBoard::default()),
                scheduler,
                state,
            )
            .unwrap(),
        );

        assert!(!pipeline.has_codec());
        assert!(!pipeline.on_audio_input());
        pipeline.push_incoming(vec![1]);
        assert!(pipeline.queue().is_empty());
        assert_eq!(pipeline.play_sound(&[0, 1, 9]), Ok(0));
        assert!(!pipeline.set_decode_sample_rate(24_000, 60));
        assert!(pipeline.spawn_loop().unwrap().is_none());
        assert!(queue.drain_ready().is_empty());
    }

    // ---- capture ---

    #[test]
    fn idle_without_consumers_claims_nothing() {
        let rig = rig();
        assert!(!rig.pipeline.on_audio_input());
        assert!(rig.codec.reads().is_empty());
    }

    #[test]
    fn listening_frames_are_encoded_and_sent_from_the_main_loop() {
        let mut rig = rig_with(MockCodec::new(48_000, 16_000, 1), AudioConfig::default());
        rig.state.set(DeviceState::Listening);

        assert!(rig.pipeline.on_audio_input());
        rig.pipeline.wait_for_background();

        // 30 ms at 48 kHz read, 480 samples encoded.
        assert_eq!(rig.codec.reads(), vec![1_440]);
        assert_eq!(sent_packets(&mut rig.queue), vec![MockOpus::encoded(480)]);
    }

    #[test]
    fn stereo_input_sends_the_mic_channel_only() {
        let mut rig = rig_with(MockCodec::new(16_000, 16_000, 2), AudioConfig::default());
        rig.state.set(DeviceState::Listening);

        assert!(rig.pipeline.on_audio_input());
        rig.pipeline.wait_for_background();

        assert_eq!(rig.codec.reads(), vec![960]);
        assert_eq!(sent_packets(&mut rig.queue), vec![MockOpus::encoded(480)]);
    }

    #[test]
    fn stereo_resampling_keeps_channels_interleaved() {
        let rig = rig_with(MockCodec::new(32_000, 16_000, 2), AudioConfig::default());
        let frame = rig.pipeline.read_audio(rig.pipeline.hw.as_ref().unwrap(), 4).unwrap();
        assert_eq!(rig.codec.reads(), vec![16]);
        assert_eq!(frame.len(), 8);
        // Mock input is +level on the mic channel, -level on the reference.
        assert!(frame.chunks(2).all(|pair| pair[0] > 0 && pair[1] < 0));
    }

    #[test]
    fn processor_claims_frames_and_reports_vad_only_while_listening() {
        let codec = MockCodec::new(16_000, 16_000, 1).with_level(10_000);
        let mut rig = rig_with(codec, AudioConfig::default());
        let pipeline = Arc::into_inner(rig.pipeline)
            .unwrap()
            .with_processor(Box::new(EnergyVad::new(0.01, 480, 1)));
        rig.pipeline = Arc::new(pipeline);
        rig.pipeline.start_processor();

        // Idle: frame consumed and encoded, VAD edge not forwarded.
        assert!(rig.pipeline.on_audio_input());
        rig.pipeline.wait_for_background();
        let commands = rig.queue.drain_ready();
        assert!(commands.iter().all(|c| matches!(c, Command::SendAudio(_))));

        // Listening: falling edge is forwarded.
        rig.state.set(DeviceState::Listening);
        rig.codec.set_level(0);
        assert!(rig.pipeline.on_audio_input());
        rig.pipeline.wait_for_background();
        let commands = rig.queue.drain_ready();
        assert!(commands
            .iter()
            .any(|c| matches!(c, Command::VoiceActivity(false))));
    }

    #[test]
    fn wake_word_has_priority_over_processor() {
        let rig = rig();
        let detector = MockWakeWord::new(Some("hey device"));
        let fed = detector.fed();
        let pipeline = Arc::into_inner(rig.pipeline)
            .unwrap()
            .with_wake_word(Box::new(detector))
            .with_processor(Box::new(EnergyVad::new(0.01, 480, 1)));
        let pipeline = Arc::new(pipeline);
        let mut queue = rig.queue;

        pipeline.start_processor();
        pipeline.start_wake_word();
        assert!(pipeline.on_audio_input());
        assert_eq!(fed.get(), 1);

        let commands = queue.drain_ready();
        assert_eq!(commands.len(), 1);
        assert!(matches!(&commands[0], Command::WakeWordDetected(w) if w == "hey device"));
    }

    #[test]
    fn failed_read_claims_nothing() {
        let rig = rig();
        rig.state.set(DeviceState::Listening);
        rig.codec.enable_input(false);
        assert!(!rig.pipeline.on_audio_input());
    }

    // ---- output ---

    #[test]
    fn asset_records_play_in_file_order() {
        let rig = rig();
        rig.state.set(DeviceState::Speaking);

        let asset = [0, 2, 1, 1, 0, 1, 2, 0, 3, 3, 3, 3];
        assert_eq!(rig.pipeline.play_sound(&asset), Ok(3));
        assert_eq!(rig.pipeline.queue().len(), 3);

        drain_output(&rig.pipeline);
        assert_eq!(rig.codec.written(), vec![vec![1, 1], vec![2], vec![3, 3, 3]]);
    }

    #[test]
    fn corrupt_asset_queues_nothing() {
        let rig = rig();
        assert!(rig.pipeline.play_sound(&[0, 5, 1]).is_err());
        assert!(rig.pipeline.queue().is_empty());
    }

    #[test]
    fn decoded_audio_is_resampled_to_the_output_rate() {
        let rig = rig_with(MockCodec::new(16_000, 24_000, 1), AudioConfig::default());
        rig.state.set(DeviceState::Speaking);
        rig.pipeline.set_decode_sample_rate(16_000, 60);

        rig.pipeline.push_incoming(vec![5; 4]);
        drain_output(&rig.pipeline);
        assert_eq!(rig.codec.written(), vec![vec![5; 6]]);
    }

    #[test]
    fn bad_packet_is_dropped_and_playback_continues() {
        let rig = rig();
        rig.state.set(DeviceState::Speaking);
        rig.pipeline.push_incoming(Vec::new());
        rig.pipeline.push_incoming(vec![7]);

        drain_output(&rig.pipeline);
        assert_eq!(rig.codec.written(), vec![vec![7]]);
    }

    #[test]
    fn listening_discards_queued_playback() {
        let rig = rig();
        rig.state.set(DeviceState::Listening);
        rig.pipeline.push_incoming(vec![1]);
        rig.pipeline.push_incoming(vec![2]);

        rig.pipeline.on_audio_output();
        rig.pipeline.wait_for_background();
        assert!(rig.pipeline.queue().is_empty());
        assert!(rig.codec.written().is_empty());
    }

    #[test]
    fn abort_cancels_decode_jobs_already_popped() {
        let rig = rig();
        rig.state.set(DeviceState::Speaking);

        // Hold the worker so the decode job is queued, not yet running.
        let (release, gate) = mpsc::channel::<()>();
        rig.pipeline.background().schedule(move || {
            let _ = gate.recv();
        });

        rig.pipeline.push_incoming(vec![1, 2, 3]);
        rig.pipeline.on_audio_output();
        assert!(rig.pipeline.queue().is_empty());

        rig.pipeline.abort();
        release.send(()).unwrap();
        rig.pipeline.wait_for_background();

        assert!(rig.codec.written().is_empty());
    }

    #[test]
    fn local_sound_after_abort_still_plays() {
        let rig = rig();
        rig.state.set(DeviceState::Speaking);
        rig.pipeline.abort();

        rig.pipeline.reset_decoder();
        assert_eq!(rig.pipeline.play_sound(&[0, 1, 9]), Ok(1));
        assert!(!rig.pipeline.is_aborted());

        drain_output(&rig.pipeline);
        assert_eq!(rig.codec.written(), vec![vec![9]]);
    }

    #[test]
    fn busy_worker_leaves_packets_in_the_queue() {
        let rig = rig();
        rig.state.set(DeviceState::Speaking);

        let mut releases = Vec::new();
        for _ in 0..2 {
            let (release, gate) = mpsc::channel::<()>();
            rig.pipeline.background().schedule(move || {
                let _ = gate.recv();
            });
            releases.push(release);
        }

        rig.pipeline.push_incoming(vec![1]);
        rig.pipeline.on_audio_output();
        assert_eq!(rig.pipeline.queue().len(), 1);

        // Barge-in can still drop what was held back.
        rig.state.set(DeviceState::Listening);
        for release in releases {
            release.send(()).unwrap();
        }
        rig.pipeline.wait_for_background();
        rig.pipeline.on_audio_output();
        assert!(rig.pipeline.queue().is_empty());
        assert!(rig.codec.written().is_empty());
    }

    #[test]
    fn clear_abort_resumes_playback() {
        let rig = rig();
        rig.state.set(DeviceState::Speaking);
        rig.pipeline.abort();
        rig.pipeline.clear_abort();
        assert!(!rig.pipeline.is_aborted());

        rig.pipeline.push_incoming(vec![4]);
        drain_output(&rig.pipeline);
        assert_eq!(rig.codec.written(), vec![vec![4]]);
    }

    #[test]
    fn long_silence_in_idle_shows_idle_once() {
        let mut config = AudioConfig::default();
        config.max_silence_secs = 0;
        let rig = rig_with(MockCodec::new(16_000, 16_000, 1), config);
        thread::sleep(Duration::from_millis(5));

        rig.pipeline.on_audio_output();
        rig.pipeline.on_audio_output();
        assert_eq!(rig.board.events(), vec![BoardEvent::State(DeviceState::Idle)]);
    }

    #[test]
    fn silence_is_not_reported_outside_idle() {
        let mut config = AudioConfig::default();
        config.max_silence_secs = 0;
        let rig = rig_with(MockCodec::new(16_000, 16_000, 1), config);
        rig.state.set(DeviceState::Speaking);
        thread::sleep(Duration::from_millis(5));

        rig.pipeline.on_audio_output();
        assert!(rig.board.events().is_empty());
    }

    // ---- decoder control ---

    #[test]
    fn identical_decode_rate_does_not_rebuild_the_decoder() {
        let rig = rig();
        let initial = rig.opus.decoders_created();

        assert!(rig.pipeline.set_decode_sample_rate(24_000, 60));
        assert!(!rig.pipeline.set_decode_sample_rate(24_000, 60));
        assert_eq!(rig.opus.decoders_created(), initial + 1);
        assert_eq!(rig.pipeline.decoder_format(), Some((24_000, 60)));

        assert!(rig.pipeline.set_decode_sample_rate(24_000, 20));
        assert_eq!(rig.opus.decoders_created(), initial + 2);
    }

    #[test]
    fn reset_decoder_clears_queue_and_enables_output() {
        let rig = rig();
        rig.codec.enable_output(false);
        rig.pipeline.push_incoming(vec![1]);

        rig.pipeline.reset_decoder();
        assert!(rig.pipeline.queue().is_empty());
        assert!(rig.codec.output_enabled());
        assert_eq!(rig.opus.decoder_resets(), 1);
    }

    #[test]
    fn release_background_rejects_later_jobs() {
        let rig = rig();
        rig.pipeline.release_background();
        assert!(rig.pipeline.background().is_released());
        rig.state.set(DeviceState::Speaking);
        rig.pipeline.push_incoming(vec![1]);
        rig.pipeline.on_audio_output();
        assert!(rig.codec.written().is_empty());
    }
}
