//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{json, Value};

use crate::audio::{
    AudioCodec, AudioPipeline, CodecError, EnergyVad, OpusDecode, OpusEncode, OpusFactory, Sound,
    WakeWordDetector,
};
use crate::config::DeviceConfig;
use crate::device::{
    AbortReason, Alert, Application, Board, ChannelEvents, Command, DeviceState, ListeningMode,
    NetworkChannel, StateCell,
};
use crate::scheduler::{Scheduler, TaskQueue};
use crate::upgrade::{UpgradeError, UpgradeProgress, UpgradeService};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Shared counters and flags
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub(crate) struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub(crate) struct Flag(Arc<AtomicBool>);

impl Flag {
    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockCodec
// ---------------------------------------------------------------------------

/// Hardware stand-in.  Input is a constant level: `+level` on the mic
/// channel and `-level` on the reference channel.
pub(crate) struct MockCodec {
    input_rate: u32,
    output_rate: u32,
    channels: u16,
    level: Mutex<i16>,
    input_enabled: AtomicBool,
    output_enabled: AtomicBool,
    reads: Mutex<Vec<usize>>,
    written: Mutex<Vec<Vec<i16>>>,
}

impl MockCodec {
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Self {
        Self {
            input_rate,
            output_rate,
            channels,
            level: Mutex::new(1_000),
            input_enabled: AtomicBool::new(true),
            output_enabled: AtomicBool::new(true),
            reads: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn with_level(self, level: i16) -> Self {
        self.set_level(level);
        self
    }

    pub fn set_level(&self, level: i16) {
        *lock(&self.level) = level;
    }

    /// Length of every buffer passed to `read_input`.
    pub fn reads(&self) -> Vec<usize> {
        lock(&self.reads).clone()
    }

    pub fn written(&self) -> Vec<Vec<i16>> {
        lock(&self.written).clone()
    }
}

impl AudioCodec for MockCodec {
    fn read_input(&self, buffer: &mut [i16]) -> bool {
        if !self.input_enabled.load(Ordering::SeqCst) {
            return false;
        }
        lock(&self.reads).push(buffer.len());
        let level = *lock(&self.level);
        if self.channels == 2 {
            for pair in buffer.chunks_mut(2) {
                pair[0] = level;
                if let Some(reference) = pair.get_mut(1) {
                    *reference = -level;
                }
            }
        } else {
            buffer.fill(level);
        }
        true
    }

    fn write_output(&self, pcm: &[i16]) {
        lock(&self.written).push(pcm.to_vec());
    }

    fn input_sample_rate(&self) -> u32 {
        self.input_rate
    }

    fn output_sample_rate(&self) -> u32 {
        self.output_rate
    }

    fn input_channels(&self) -> u16 {
        self.channels
    }

    fn enable_input(&self, enable: bool) {
        self.input_enabled.store(enable, Ordering::SeqCst);
    }

    fn enable_output(&self, enable: bool) {
        self.output_enabled.store(enable, Ordering::SeqCst);
    }

    fn output_enabled(&self) -> bool {
        self.output_enabled.load(Ordering::SeqCst)
    }

    fn start(&self) {}
}

// ---------------------------------------------------------------------------
// MockOpus
// ---------------------------------------------------------------------------

/// Transparent packet codec.  The encoder emits one packet per call; the
/// decoder turns each byte into one sample and rejects empty packets.
#[derive(Default)]
pub(crate) struct MockOpus {
    decoders: Counter,
    decoder_resets: Counter,
}

impl MockOpus {
    /// The packet the encoder emits for `samples` input samples.
    pub fn encoded(samples: usize) -> Vec<u8> {
        (samples as u32).to_be_bytes().to_vec()
    }

    /// Decoders built so far, including the initial one.
    pub fn decoders_created(&self) -> usize {
        self.decoders.get()
    }

    pub fn decoder_resets(&self) -> usize {
        self.decoder_resets.get()
    }
}

struct MockEncoder;

impl OpusEncode for MockEncoder {
    fn encode(&mut self, pcm: &[i16]) -> Vec<Vec<u8>> {
        vec![MockOpus::encoded(pcm.len())]
    }

    fn reset_state(&mut self) {}
}

struct MockDecoder {
    sample_rate: u32,
    frame_duration_ms: u32,
    resets: Counter,
}

impl OpusDecode for MockDecoder {
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>, CodecError> {
        if packet.is_empty() {
            return Err(CodecError::Corrupt("empty packet".into()));
        }
        Ok(packet.iter().map(|&b| i16::from(b)).collect())
    }

    fn reset_state(&mut self) {
        self.resets.bump();
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_duration_ms(&self) -> u32 {
        self.frame_duration_ms
    }
}

impl OpusFactory for MockOpus {
    fn new_encoder(&self, _: u32, _: u16, _: u32) -> Box<dyn OpusEncode> {
        Box::new(MockEncoder)
    }

    fn new_decoder(&self, sample_rate: u32, _: u16, frame_duration_ms: u32) -> Box<dyn OpusDecode> {
        self.decoders.bump();
        Box::new(MockDecoder {
            sample_rate,
            frame_duration_ms,
            resets: self.decoder_resets.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockBoard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BoardEvent {
    State(DeviceState),
    /// Alert status line.
    Alert(String),
    PowerSave(bool),
    VoiceActivity(bool),
    Reboot,
    Disconnect,
}

#[derive(Default)]
pub(crate) struct MockBoard {
    events: Mutex<Vec<BoardEvent>>,
}

impl MockBoard {
    pub fn events(&self) -> Vec<BoardEvent> {
        lock(&self.events).clone()
    }

    /// Only the displayed states, in order.
    pub fn states(&self) -> Vec<DeviceState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BoardEvent::State(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: BoardEvent) {
        lock(&self.events).push(event);
    }
}

impl Board for MockBoard {
    fn board_type(&self) -> &str {
        "mock"
    }

    fn show_device_state(&self, state: DeviceState) {
        self.record(BoardEvent::State(state));
    }

    fn show_alert(&self, alert: &Alert) {
        self.record(BoardEvent::Alert(alert.status.clone()));
    }

    fn set_power_save_mode(&self, enabled: bool) {
        self.record(BoardEvent::PowerSave(enabled));
    }

    fn on_voice_activity(&self, speaking: bool) {
        self.record(BoardEvent::VoiceActivity(speaking));
    }

    fn iot_descriptors(&self) -> Value {
        json!([{ "name": "Speaker" }])
    }

    fn iot_states(&self, _delta: bool) -> Option<Value> {
        Some(json!([{ "name": "Speaker", "state": { "volume": 70 } }]))
    }

    fn reboot(&self) {
        self.record(BoardEvent::Reboot);
    }

    fn disconnect_network(&self) {
        self.record(BoardEvent::Disconnect);
    }
}

// ---------------------------------------------------------------------------
// MockWakeWord
// ---------------------------------------------------------------------------

/// Reports `phrase` on every frame while running.
pub(crate) struct MockWakeWord {
    phrase: Option<String>,
    running: bool,
    fed: Counter,
}

impl MockWakeWord {
    pub fn new(phrase: Option<&str>) -> Self {
        Self {
            phrase: phrase.map(str::to_string),
            running: false,
            fed: Counter::default(),
        }
    }

    pub fn fed(&self) -> Counter {
        self.fed.clone()
    }
}

impl WakeWordDetector for MockWakeWord {
    fn is_running(&self) -> bool {
        self.running
    }

    fn start_detection(&mut self) {
        self.running = true;
    }

    fn stop_detection(&mut self) {
        self.running = false;
    }

    fn feed_size(&self) -> usize {
        512
    }

    fn feed(&mut self, _frame: &[i16]) -> Option<String> {
        self.fed.bump();
        self.phrase.clone()
    }
}

// ---------------------------------------------------------------------------
// MockNetwork
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NetCall {
    Start,
    Open,
    Close,
    Audio(Vec<u8>),
    StartListening(ListeningMode),
    StopListening,
    Abort(AbortReason),
    WakeWord(String),
    IotDescriptors,
    IotStates,
}

/// Records every call.  Clones share state, so a test can keep a handle
/// after the application takes ownership.
#[derive(Clone)]
pub(crate) struct MockNetwork {
    calls: Arc<Mutex<Vec<NetCall>>>,
    open_succeeds: Arc<AtomicBool>,
    opened: Arc<AtomicBool>,
    events: Arc<Mutex<Option<ChannelEvents>>>,
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self {
            calls: Arc::default(),
            open_succeeds: Arc::new(AtomicBool::new(true)),
            opened: Arc::default(),
            events: Arc::default(),
        }
    }
}

impl MockNetwork {
    pub fn calls(&self) -> Vec<NetCall> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn set_open_succeeds(&self, succeeds: bool) {
        self.open_succeeds.store(succeeds, Ordering::SeqCst);
    }

    pub fn set_opened(&self, opened: bool) {
        self.opened.store(opened, Ordering::SeqCst);
    }

    /// The sink registered by `start`, if any.
    pub fn events(&self) -> Option<ChannelEvents> {
        lock(&self.events).clone()
    }

    fn record(&self, call: NetCall) {
        lock(&self.calls).push(call);
    }
}

impl NetworkChannel for MockNetwork {
    fn start(&mut self, events: ChannelEvents) {
        *lock(&self.events) = Some(events);
        self.record(NetCall::Start);
    }

    fn open_audio_channel(&mut self) -> bool {
        self.record(NetCall::Open);
        let ok = self.open_succeeds.load(Ordering::SeqCst);
        self.opened.store(ok, Ordering::SeqCst);
        ok
    }

    fn close_audio_channel(&mut self) {
        self.record(NetCall::Close);
        self.opened.store(false, Ordering::SeqCst);
    }

    fn is_audio_channel_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    fn server_sample_rate(&self) -> u32 {
        24_000
    }

    fn server_frame_duration(&self) -> u32 {
        60
    }

    fn send_audio(&mut self, packet: &[u8]) {
        self.record(NetCall::Audio(packet.to_vec()));
    }

    fn send_start_listening(&mut self, mode: ListeningMode) {
        self.record(NetCall::StartListening(mode));
    }

    fn send_stop_listening(&mut self) {
        self.record(NetCall::StopListening);
    }

    fn send_abort_speaking(&mut self, reason: AbortReason) {
        self.record(NetCall::Abort(reason));
    }

    fn send_wake_word_detected(&mut self, text: &str) {
        self.record(NetCall::WakeWord(text.to_string()));
    }

    fn send_iot_descriptors(&mut self, _descriptors: &Value) {
        self.record(NetCall::IotDescriptors);
    }

    fn send_iot_states(&mut self, _states: &Value) {
        self.record(NetCall::IotStates);
    }
}

// ---------------------------------------------------------------------------
// MockUpgrade
// ---------------------------------------------------------------------------

/// Outcome of one `check_version` call.
#[derive(Debug, Clone)]
pub(crate) enum UpgradeScript {
    Fail,
    UpToDate,
    Activation(String),
    NewVersion(String),
}

/// Plays back a script of check results; checks past the end fail.
pub(crate) struct MockUpgrade {
    script: VecDeque<UpgradeScript>,
    new_version: Option<String>,
    activation: Option<String>,
    fail_upgrade: bool,
    check_calls: Counter,
    upgrade_calls: Counter,
    marked_valid: Flag,
}

impl MockUpgrade {
    pub fn new(script: Vec<UpgradeScript>) -> Self {
        Self {
            script: script.into(),
            new_version: None,
            activation: None,
            fail_upgrade: false,
            check_calls: Counter::default(),
            upgrade_calls: Counter::default(),
            marked_valid: Flag::default(),
        }
    }

    /// Make `start_upgrade` fail after reporting progress.
    pub fn failing_upgrade(mut self) -> Self {
        self.fail_upgrade = true;
        self
    }

    pub fn check_calls(&self) -> Counter {
        self.check_calls.clone()
    }

    pub fn upgrade_calls(&self) -> Counter {
        self.upgrade_calls.clone()
    }

    pub fn marked_valid(&self) -> Flag {
        self.marked_valid.clone()
    }
}

impl UpgradeService for MockUpgrade {
    fn check_version(&mut self) -> Result<(), UpgradeError> {
        self.check_calls.bump();
        self.new_version = None;
        self.activation = None;
        match self.script.pop_front() {
            None | Some(UpgradeScript::Fail) => {
                Err(UpgradeError::Check("server unreachable".into()))
            }
            Some(UpgradeScript::UpToDate) => Ok(()),
            Some(UpgradeScript::Activation(code)) => {
                self.activation = Some(code);
                Ok(())
            }
            Some(UpgradeScript::NewVersion(version)) => {
                self.new_version = Some(version);
                Ok(())
            }
        }
    }

    fn has_new_version(&self) -> bool {
        self.new_version.is_some()
    }

    fn firmware_version(&self) -> Option<String> {
        self.new_version.clone()
    }

    fn has_activation_code(&self) -> bool {
        self.activation.is_some()
    }

    fn activation_code(&self) -> String {
        self.activation.clone().unwrap_or_default()
    }

    fn mark_current_version_valid(&mut self) {
        self.marked_valid.set();
    }

    fn start_upgrade(
        &mut self,
        progress: &mut dyn FnMut(UpgradeProgress),
    ) -> Result<(), UpgradeError> {
        self.upgrade_calls.bump();
        for percent in [50, 50, 100] {
            progress(UpgradeProgress {
                percent,
                bytes_per_sec: 64 * 1024,
            });
        }
        if self.fail_upgrade {
            return Err(UpgradeError::Download("connection reset".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// An [`Application`] wired to mocks, starting in `Idle`, without an audio
/// loop.  Commands scheduled by collaborators are run with [`Harness::pump`].
pub(crate) struct Harness {
    pub app: Application,
    pub queue: TaskQueue<Command>,
    pub scheduler: Scheduler<Command>,
    pub codec: Arc<MockCodec>,
    pub opus: Arc<MockOpus>,
    pub network: MockNetwork,
    pub board: Arc<MockBoard>,
    pub pipeline: Arc<AudioPipeline>,
    pub state: StateCell,
}

const SOUNDS: [Sound; 14] = [
    Sound::Success,
    Sound::Upgrade,
    Sound::Exclamation,
    Sound::Activation,
    Sound::Digit(0),
    Sound::Digit(1),
    Sound::Digit(2),
    Sound::Digit(3),
    Sound::Digit(4),
    Sound::Digit(5),
    Sound::Digit(6),
    Sound::Digit(7),
    Sound::Digit(8),
    Sound::Digit(9),
];

impl Harness {
    pub fn new() -> Self {
        Self::with_config(DeviceConfig::without_delays())
    }

    pub fn with_config(config: DeviceConfig) -> Self {
        let (scheduler, queue) = Scheduler::channel();
        let state = StateCell::new(DeviceState::Idle);
        let codec = Arc::new(MockCodec::new(16_000, 16_000, 1));
        let opus = Arc::new(MockOpus::default());
        let board = Arc::new(MockBoard::default());
        let network = MockNetwork::default();

        let pipeline = AudioPipeline::new(
            &config.audio,
            Some(codec.clone()),
            opus.clone(),
            board.clone(),
            scheduler.clone(),
            state.clone(),
        )
        .expect("pipeline")
        .with_processor(Box::new(EnergyVad::new(
            config.audio.vad_threshold,
            config.audio.capture_frame_samples(),
            1,
        )))
        .with_wake_word(Box::new(MockWakeWord::new(None)));
        let pipeline = Arc::new(pipeline);

        // One single-packet record per sound, tagged so playback order is
        // observable in the decode queue.
        let sounds: HashMap<Sound, Vec<u8>> = SOUNDS
            .iter()
            .map(|&sound| {
                let mut record = vec![0, 1];
                record.extend(Self::sound_tag(sound));
                (sound, record)
            })
            .collect();

        let app = Application::new(
            config,
            Box::new(network.clone()),
            board.clone(),
            Arc::clone(&pipeline),
            Arc::new(sounds),
            state.clone(),
        );

        Self {
            app,
            queue,
            scheduler,
            codec,
            opus,
            network,
            board,
            pipeline,
            state,
        }
    }

    /// The single packet in the test asset for `sound`.
    pub fn sound_tag(sound: Sound) -> Vec<u8> {
        let tag = match sound {
            Sound::Success => 1,
            Sound::Upgrade => 2,
            Sound::Exclamation => 3,
            Sound::Activation => 4,
            Sound::Digit(d) => 10 + d,
        };
        vec![tag]
    }

    /// Run queued commands until the queue is empty.
    pub fn pump(&mut self) {
        loop {
            let batch = self.queue.drain_ready();
            if batch.is_empty() {
                return;
            }
            for command in batch {
                self.app.handle(command);
            }
        }
    }
}
