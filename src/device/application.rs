//! The device orchestrator: state machine and command dispatch.
//!
//! [`Application`] lives on the main loop and is the only code that mutates
//! [`DeviceState`], talks to the [`NetworkChannel`] or drives transitions.
//! Everything else reaches it through a [`Command`].
//!
//! # Transitions
//!
//! ```text
//! same state            ──▶ no-op (no drain, no display, no entry action)
//! X ──▶ Y               ──▶ drain worker, show Y, run Y's entry action
//!
//! Idle ──open ok──▶ Connecting ──▶ Listening
//! Idle ──open fail─▶ Connecting ──▶ Idle + alert
//! Listening ──stop──▶ Idle            (stop-listening sent first)
//! Speaking ──talk──▶ Listening        (abort sent first)
//! Idle ──▶ Upgrading                   (one-way, ends in reboot)
//! Idle ──▶ Activating ──▶ Idle
//! ```

use std::sync::Arc;
use std::thread;

use crate::audio::{AudioPipeline, Sound, SoundBank};
use crate::config::DeviceConfig;
use crate::upgrade::{UpgradeProgress, UpgradeService};

use super::{
    AbortReason, Alert, Board, ChannelEvents, Command, DeviceState, ListeningMode,
    NetworkChannel, ServerEvent, StateCell,
};

pub struct Application {
    config: DeviceConfig,
    state: DeviceState,
    snapshot: StateCell,
    listening_mode: ListeningMode,
    network: Box<dyn NetworkChannel>,
    board: Arc<dyn Board>,
    pipeline: Arc<AudioPipeline>,
    sounds: Arc<dyn SoundBank>,
    voice_detected: bool,
    clock_ticks: u32,
}

impl Application {
    /// The initial state is whatever `snapshot` holds.
    pub fn new(
        config: DeviceConfig,
        network: Box<dyn NetworkChannel>,
        board: Arc<dyn Board>,
        pipeline: Arc<AudioPipeline>,
        sounds: Arc<dyn SoundBank>,
        snapshot: StateCell,
    ) -> Self {
        Self {
            config,
            state: snapshot.get(),
            snapshot,
            listening_mode: ListeningMode::default(),
            network,
            board,
            pipeline,
            sounds,
            voice_detected: false,
            clock_ticks: 0,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn listening_mode(&self) -> ListeningMode {
        self.listening_mode
    }

    pub fn voice_detected(&self) -> bool {
        self.voice_detected
    }

    pub fn pipeline(&self) -> &Arc<AudioPipeline> {
        &self.pipeline
    }

    /// Bring up the transport.  Its callbacks arrive as commands.
    pub fn start_network(&mut self, events: ChannelEvents) {
        self.network.start(events);
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Execute one command.  Called only from the main loop.
    pub fn handle(&mut self, command: Command) {
        match command {
            Command::ToggleChat => self.toggle_chat_state(),
            Command::StartListening => self.start_listening(),
            Command::StopListening => self.stop_listening(),
            Command::WakeWordDetected(phrase) => self.wake_word_invoke(&phrase),
            Command::AbortSpeaking(reason) => self.abort_speaking(reason),
            Command::NfcCardDetected(uid) => self.on_nfc_card_detected(&uid),
            Command::NfcCardRemoved => self.on_nfc_card_removed(),
            Command::SendAudio(packet) => self.network.send_audio(&packet),
            Command::VoiceActivity(speaking) => self.on_voice_activity(speaking),
            Command::IncomingAudio(packet) => {
                if self.state != DeviceState::Upgrading {
                    self.pipeline.push_incoming(packet);
                }
            }
            Command::ChannelClosed => self.on_channel_closed(),
            Command::NetworkError(message) => self.on_network_error(message),
            Command::Server(event) => self.on_server_event(event),
            Command::EnterState(state) => self.set_device_state(state),
            Command::PlaySound(sound) => {
                self.pipeline.reset_decoder();
                self.play_sound(sound);
            }
            Command::Alert(alert) => self.alert(&alert),
            Command::Activate { code, ack } => {
                self.activate(&code);
                let _ = ack.send(());
            }
            Command::ReadActivationCode(code) => self.show_activation_code(&code),
            Command::ApplyUpgrade(service) => self.apply_upgrade(service),
            Command::ClockTick => self.on_clock_tick(),
        }
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    /// Transition to `state` and run its entry action.
    pub fn set_device_state(&mut self, state: DeviceState) {
        if self.state == state {
            return;
        }

        self.clock_ticks = 0;
        let previous = self.state;
        self.state = state;
        self.snapshot.set(state);
        log::info!("STATE: {}", state.label());

        // Nothing queued on the worker may outlive the previous state.
        self.pipeline.wait_for_background();
        self.board.show_device_state(state);

        match state {
            DeviceState::Unknown | DeviceState::Idle => {
                self.pipeline.stop_processor();
                self.pipeline.start_wake_word();
            }
            DeviceState::Listening => {
                self.pipeline.queue().clear();
                self.update_iot_states();

                if !self.pipeline.processor_running() {
                    self.network.send_start_listening(self.listening_mode);
                    if self.listening_mode == ListeningMode::AutoStop
                        && previous == DeviceState::Speaking
                    {
                        thread::sleep(self.config.chat.auto_stop_resume_delay());
                    }
                    self.pipeline.reset_encoder();
                    self.pipeline.stop_wake_word();
                    self.pipeline.start_processor();
                }
            }
            DeviceState::Speaking => {
                if self.listening_mode != ListeningMode::Realtime {
                    self.pipeline.stop_processor();
                    self.pipeline.start_wake_word();
                }
                self.pipeline.reset_decoder();
            }
            DeviceState::Upgrading => {
                self.pipeline.release_background();
            }
            _ => {}
        }
    }

    fn set_listening_mode(&mut self, mode: ListeningMode) {
        self.listening_mode = mode;
        self.set_device_state(DeviceState::Listening);
    }

    /// `Connecting` → open the audio channel.  On failure the device goes
    /// back to `Idle` and the user is alerted.
    ///
    /// The opened-channel setup runs before this returns, so whatever state
    /// follows already has the server's decode format and IoT descriptors.
    fn open_audio_channel(&mut self) -> bool {
        self.set_device_state(DeviceState::Connecting);
        if self.network.open_audio_channel() {
            self.on_channel_opened();
            return true;
        }

        log::error!("device: failed to open audio channel");
        self.set_device_state(DeviceState::Idle);
        self.alert(
            &Alert::new("Error", "Unable to reach the voice service", "sad")
                .with_sound(Sound::Exclamation),
        );
        false
    }

    // -----------------------------------------------------------------------
    // User / peripheral requests
    // -----------------------------------------------------------------------

    pub fn toggle_chat_state(&mut self) {
        match self.state {
            DeviceState::Activating => self.set_device_state(DeviceState::Idle),
            DeviceState::Idle => {
                if !self.open_audio_channel() {
                    return;
                }
                let mode = if self.config.chat.realtime_chat_enabled {
                    ListeningMode::Realtime
                } else {
                    ListeningMode::AutoStop
                };
                self.set_listening_mode(mode);
            }
            DeviceState::Speaking => self.abort_speaking(AbortReason::None),
            DeviceState::Listening => self.network.close_audio_channel(),
            _ => {}
        }
    }

    pub fn start_listening(&mut self) {
        match self.state {
            DeviceState::Activating => self.set_device_state(DeviceState::Idle),
            DeviceState::Idle => {
                if !self.network.is_audio_channel_opened() && !self.open_audio_channel() {
                    return;
                }
                self.set_listening_mode(ListeningMode::ManualStop);
            }
            DeviceState::Speaking => {
                self.abort_speaking(AbortReason::None);
                self.set_listening_mode(ListeningMode::ManualStop);
            }
            _ => {}
        }
    }

    pub fn stop_listening(&mut self) {
        if self.state == DeviceState::Listening {
            self.network.send_stop_listening();
            self.set_device_state(DeviceState::Idle);
        }
    }

    pub fn wake_word_invoke(&mut self, phrase: &str) {
        match self.state {
            DeviceState::Idle => {
                self.toggle_chat_state();
                if self.network.is_audio_channel_opened() {
                    self.network.send_wake_word_detected(phrase);
                }
            }
            DeviceState::Speaking => self.abort_speaking(AbortReason::WakeWordDetected),
            DeviceState::Listening => self.network.close_audio_channel(),
            DeviceState::Activating => self.set_device_state(DeviceState::Idle),
            _ => {}
        }
    }

    /// Cancel playback and tell the server.
    pub fn abort_speaking(&mut self, reason: AbortReason) {
        log::info!("device: abort speaking ({reason:?})");
        self.pipeline.abort();
        self.network.send_abort_speaking(reason);
    }

    fn on_nfc_card_detected(&mut self, uid: &str) {
        log::info!("device: NFC card detected: {uid}");
        if self.state == DeviceState::Idle {
            self.toggle_chat_state();
        }
    }

    fn on_nfc_card_removed(&mut self) {
        log::info!("device: NFC card removed");
        if matches!(self.state, DeviceState::Listening | DeviceState::Speaking) {
            self.stop_listening();
        }
        self.board.disconnect_network();
    }

    fn on_voice_activity(&mut self, speaking: bool) {
        if self.state == DeviceState::Listening {
            self.voice_detected = speaking;
            self.board.on_voice_activity(speaking);
        }
    }

    // -----------------------------------------------------------------------
    // Network events
    // -----------------------------------------------------------------------

    fn on_channel_opened(&mut self) {
        self.board.set_power_save_mode(false);

        if let Some(output_rate) = self.pipeline.output_sample_rate() {
            let server_rate = self.network.server_sample_rate();
            if server_rate != output_rate {
                log::warn!(
                    "device: server sample rate {server_rate} does not match output rate \
                     {output_rate}, resampling may cause distortion"
                );
            }
            self.pipeline
                .set_decode_sample_rate(server_rate, self.network.server_frame_duration());
        }

        let descriptors = self.board.iot_descriptors();
        self.network.send_iot_descriptors(&descriptors);
        if let Some(states) = self.board.iot_states(false) {
            self.network.send_iot_states(&states);
        }
    }

    fn on_channel_closed(&mut self) {
        self.board.set_power_save_mode(true);
        self.set_device_state(DeviceState::Idle);
    }

    fn on_network_error(&mut self, message: String) {
        self.set_device_state(DeviceState::Idle);
        self.alert(&Alert::new("Error", message, "sad").with_sound(Sound::Exclamation));
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::TtsStart => {
                self.pipeline.clear_abort();
                if matches!(self.state, DeviceState::Idle | DeviceState::Listening) {
                    self.set_device_state(DeviceState::Speaking);
                }
            }
            ServerEvent::TtsStop => {
                if self.state == DeviceState::Speaking {
                    if self.listening_mode == ListeningMode::ManualStop {
                        self.set_device_state(DeviceState::Idle);
                    } else {
                        self.set_device_state(DeviceState::Listening);
                    }
                }
            }
            ServerEvent::Transcript(text) => log::info!("device: >> {text}"),
        }
    }

    fn update_iot_states(&mut self) {
        if let Some(states) = self.board.iot_states(true) {
            self.network.send_iot_states(&states);
        }
    }

    // -----------------------------------------------------------------------
    // Alerts and sounds
    // -----------------------------------------------------------------------

    pub fn alert(&mut self, alert: &Alert) {
        log::warn!("{alert}");
        self.board.show_alert(alert);
        if let Some(sound) = alert.sound {
            if self.pipeline.has_codec() {
                self.pipeline.reset_decoder();
                self.play_sound(sound);
            }
        }
    }

    fn play_sound(&self, sound: Sound) {
        let Some(asset) = self.sounds.sound(sound) else {
            return;
        };
        if let Err(e) = self.pipeline.play_sound(&asset) {
            log::warn!("device: sound {sound:?} is corrupt: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Activation / upgrade
    // -----------------------------------------------------------------------

    fn activate(&mut self, code: &str) {
        self.set_device_state(DeviceState::Activating);
        self.alert(
            &Alert::new("Activation", format!("Activation code: {code}"), "happy")
                .with_sound(Sound::Activation),
        );
    }

    /// Read the code out, one digit sound per character.
    fn show_activation_code(&self, code: &str) {
        self.pipeline.wait_for_background();

        for digit in code.chars().filter_map(Sound::for_digit) {
            self.play_sound(digit);
        }
    }

    /// Non-cancelable commit.  Always ends in a reboot.
    fn apply_upgrade(&mut self, mut service: Box<dyn UpgradeService>) {
        self.set_device_state(DeviceState::Upgrading);
        self.board.set_power_save_mode(false);

        self.pipeline.stop();
        self.pipeline.queue().clear();
        self.pipeline.release_background();
        thread::sleep(self.config.upgrade.commit_settle());

        let mut last_percent = None;
        let mut report = |progress: UpgradeProgress| {
            if last_percent != Some(progress.percent) {
                last_percent = Some(progress.percent);
                log::info!(
                    "upgrade: {}% {}KB/s",
                    progress.percent,
                    progress.bytes_per_sec / 1024
                );
            }
        };

        match service.start_upgrade(&mut report) {
            Ok(()) => log::info!("upgrade: firmware applied, rebooting"),
            Err(e) => {
                log::error!("upgrade: firmware upgrade failed: {e}");
                thread::sleep(self.config.upgrade.failure_reboot_delay());
            }
        }
        log::info!("device: rebooting");
        self.board.reboot();
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    fn on_clock_tick(&mut self) {
        self.clock_ticks += 1;
        let every = self.config.diagnostics.report_every_ticks;
        if every > 0 && self.clock_ticks % every == 0 {
            log::info!(
                "device: state={} mode={} decode_queue={} background={} voice={}",
                self.state.label(),
                self.listening_mode.label(),
                self.pipeline.queue().len(),
                self.pipeline.background().pending(),
                self.voice_detected
            );
        }
    }

    pub fn clock_ticks(&self) -> u32 {
        self.clock_ticks
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
