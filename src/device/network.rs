//! Remote voice-service channel.
//!
//! The [`NetworkChannel`] is owned by the [`Application`](super::Application)
//! and called only from the main loop.  Everything the transport receives
//! comes back through [`ChannelEvents`], which turns each callback into a
//! [`Command`] on the main-loop queue, so incoming audio and control events
//! are handled in arrival order on one thread.

use serde_json::Value;

use crate::scheduler::Scheduler;

use super::{AbortReason, Command, ListeningMode};

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

/// Control messages pushed by the voice service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The server is about to stream speech.
    TtsStart,
    /// The server finished streaming speech.
    TtsStop,
    /// Speech-to-text result for the user's utterance.
    Transcript(String),
}

// ---------------------------------------------------------------------------
// NetworkChannel
// ---------------------------------------------------------------------------

pub trait NetworkChannel: Send {
    /// Bring up the transport and register the event sink.  Called once.
    fn start(&mut self, events: ChannelEvents);

    /// Open the audio channel, blocking until the server accepts it.
    /// Returns `false` on failure.
    ///
    /// A `true` return is the channel-opened notification: the caller runs
    /// its opened-channel setup immediately, on the main loop.
    fn open_audio_channel(&mut self) -> bool;

    fn close_audio_channel(&mut self);

    fn is_audio_channel_opened(&self) -> bool;

    /// Rate of the audio the server sends (Hz).
    fn server_sample_rate(&self) -> u32;

    /// Frame duration of the audio the server sends (ms).
    fn server_frame_duration(&self) -> u32;

    fn send_audio(&mut self, packet: &[u8]);

    fn send_start_listening(&mut self, mode: ListeningMode);

    fn send_stop_listening(&mut self);

    fn send_abort_speaking(&mut self, reason: AbortReason);

    fn send_wake_word_detected(&mut self, text: &str);

    fn send_iot_descriptors(&mut self, descriptors: &Value);

    fn send_iot_states(&mut self, states: &Value);
}

// ---------------------------------------------------------------------------
// ChannelEvents
// ---------------------------------------------------------------------------

/// Callback sink handed to the transport.  Cheap to clone; callable from any
/// thread.
#[derive(Clone)]
pub struct ChannelEvents {
    scheduler: Scheduler<Command>,
}

impl ChannelEvents {
    pub fn new(scheduler: Scheduler<Command>) -> Self {
        Self { scheduler }
    }

    pub fn on_incoming_audio(&self, packet: Vec<u8>) {
        self.scheduler.schedule(Command::IncomingAudio(packet));
    }

    pub fn on_audio_channel_closed(&self) {
        self.scheduler.schedule(Command::ChannelClosed);
    }

    pub fn on_network_error(&self, message: impl Into<String>) {
        self.scheduler
            .schedule(Command::NetworkError(message.into()));
    }

    pub fn on_server_event(&self, event: ServerEvent) {
        self.scheduler.schedule(Command::Server(event));
    }
}
