//! Loopback voice service: plays the user's utterance back as server speech.
//!
//! ```text
//! send_audio ──▶ utterance buffer
//! stop listening / utterance limit ──▶ replay thread:
//!     TtsStart, IncomingAudio × n (paced by frame duration), TtsStop
//! abort ──▶ replay thread stops early
//! ```
//!
//! Useful for exercising the whole device on a desktop without a server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::device::{AbortReason, ChannelEvents, ListeningMode, NetworkChannel, ServerEvent};

pub struct LoopbackChannel {
    sample_rate: u32,
    frame_duration_ms: u32,
    /// Replay after this many packets in auto-stop / realtime modes.
    utterance_packets: usize,
    events: Option<ChannelEvents>,
    opened: bool,
    mode: ListeningMode,
    utterance: Vec<Vec<u8>>,
    cancel: Arc<AtomicBool>,
}

impl LoopbackChannel {
    /// Echo audio at `sample_rate` / `frame_duration_ms`; auto-stop turns are
    /// cut after `max_utterance`.
    pub fn new(sample_rate: u32, frame_duration_ms: u32, max_utterance: Duration) -> Self {
        let frame = u128::from(frame_duration_ms.max(1));
        Self {
            sample_rate,
            frame_duration_ms,
            utterance_packets: (max_utterance.as_millis() / frame).max(1) as usize,
            events: None,
            opened: false,
            mode: ListeningMode::default(),
            utterance: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn buffered_packets(&self) -> usize {
        self.utterance.len()
    }

    fn replay(&mut self) {
        let packets = std::mem::take(&mut self.utterance);
        let Some(events) = self.events.clone() else {
            return;
        };
        if packets.is_empty() {
            return;
        }

        log::info!("loopback: replaying {} packets", packets.len());
        self.cancel = Arc::new(AtomicBool::new(false));
        let cancel = Arc::clone(&self.cancel);
        let pace = Duration::from_millis(u64::from(self.frame_duration_ms));

        let spawned = thread::Builder::new()
            .name("loopback-tts".into())
            .spawn(move || {
                events.on_server_event(ServerEvent::TtsStart);
                for packet in packets {
                    if cancel.load(Ordering::Acquire) {
                        break;
                    }
                    events.on_incoming_audio(packet);
                    thread::sleep(pace);
                }
                events.on_server_event(ServerEvent::TtsStop);
            });
        if let Err(e) = spawned {
            log::error!("loopback: failed to spawn replay thread: {e}");
        }
    }
}

impl NetworkChannel for LoopbackChannel {
    fn start(&mut self, events: ChannelEvents) {
        log::info!("loopback: started ({} Hz, {} ms frames)", self.sample_rate, self.frame_duration_ms);
        self.events = Some(events);
    }

    fn open_audio_channel(&mut self) -> bool {
        if self.events.is_none() {
            return false;
        }
        self.opened = true;
        true
    }

    fn close_audio_channel(&mut self) {
        self.cancel.store(true, Ordering::Release);
        self.utterance.clear();
        if std::mem::take(&mut self.opened) {
            if let Some(events) = &self.events {
                events.on_audio_channel_closed();
            }
        }
    }

    fn is_audio_channel_opened(&self) -> bool {
        self.opened
    }

    fn server_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn server_frame_duration(&self) -> u32 {
        self.frame_duration_ms
    }

    fn send_audio(&mut self, packet: &[u8]) {
        if !self.opened {
            return;
        }
        self.utterance.push(packet.to_vec());
        if self.mode != ListeningMode::ManualStop && self.utterance.len() >= self.utterance_packets
        {
            self.replay();
        }
    }

    fn send_start_listening(&mut self, mode: ListeningMode) {
        log::debug!("loopback: listening ({})", mode.label());
        self.mode = mode;
        self.utterance.clear();
    }

    fn send_stop_listening(&mut self) {
        self.replay();
    }

    fn send_abort_speaking(&mut self, reason: AbortReason) {
        log::debug!("loopback: abort ({reason:?})");
        self.cancel.store(true, Ordering::Release);
    }

    fn send_wake_word_detected(&mut self, text: &str) {
        log::info!("loopback: wake word '{text}'");
    }

    fn send_iot_descriptors(&mut self, descriptors: &Value) {
        log::debug!("loopback: iot descriptors {descriptors}");
    }

    fn send_iot_states(&mut self, states: &Value) {
        log::debug!("loopback: iot states {states}");
    }
}
