//! Messages delivered to the main loop.
//!
//! Every cross-thread request (button, wake phrase, network callback, audio
//! thread, upgrade flow, diagnostics timer) is one of these, executed by
//! [`Application::handle`](super::Application::handle) on the main loop.

use std::fmt;

use tokio::sync::oneshot;

use crate::audio::Sound;
use crate::upgrade::UpgradeService;

use super::{AbortReason, Alert, DeviceState, ServerEvent};

pub enum Command {
    // ---- user / peripheral ---
    ToggleChat,
    StartListening,
    StopListening,
    /// A wake phrase was heard by the detector.
    WakeWordDetected(String),
    AbortSpeaking(AbortReason),
    NfcCardDetected(String),
    NfcCardRemoved,

    // ---- audio thread ---
    /// An encoded capture packet ready to send.
    SendAudio(Vec<u8>),
    /// Voice-activity edge from the processor.
    VoiceActivity(bool),

    // ---- network ---
    IncomingAudio(Vec<u8>),
    ChannelClosed,
    NetworkError(String),
    Server(ServerEvent),

    // ---- upgrade / activation flow ---
    EnterState(DeviceState),
    PlaySound(Sound),
    Alert(Alert),
    /// Enter `Activating` and show `code`; `ack` fires once the prompt is
    /// queued.
    Activate {
        code: String,
        ack: oneshot::Sender<()>,
    },
    /// Queue one digit sound per character of the activation code.
    ReadActivationCode(String),
    /// Commit a downloaded upgrade.  Does not return to normal operation.
    ApplyUpgrade(Box<dyn UpgradeService>),

    // ---- diagnostics ---
    ClockTick,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ToggleChat => f.write_str("ToggleChat"),
            Command::StartListening => f.write_str("StartListening"),
            Command::StopListening => f.write_str("StopListening"),
            Command::WakeWordDetected(w) => f.debug_tuple("WakeWordDetected").field(w).finish(),
            Command::AbortSpeaking(r) => f.debug_tuple("AbortSpeaking").field(r).finish(),
            Command::NfcCardDetected(id) => f.debug_tuple("NfcCardDetected").field(id).finish(),
            Command::NfcCardRemoved => f.write_str("NfcCardRemoved"),
            Command::SendAudio(p) => write!(f, "SendAudio({} bytes)", p.len()),
            Command::VoiceActivity(v) => f.debug_tuple("VoiceActivity").field(v).finish(),
            Command::IncomingAudio(p) => write!(f, "IncomingAudio({} bytes)", p.len()),
            Command::ChannelClosed => f.write_str("ChannelClosed"),
            Command::NetworkError(m) => f.debug_tuple("NetworkError").field(m).finish(),
            Command::Server(e) => f.debug_tuple("Server").field(e).finish(),
            Command::EnterState(s) => f.debug_tuple("EnterState").field(s).finish(),
            Command::PlaySound(s) => f.debug_tuple("PlaySound").field(s).finish(),
            Command::Alert(a) => f.debug_tuple("Alert").field(a).finish(),
            Command::Activate { code, .. } => f.debug_struct("Activate").field("code", code).finish(),
            Command::ReadActivationCode(c) => {
                f.debug_tuple("ReadActivationCode").field(c).finish()
            }
            Command::ApplyUpgrade(_) => f.write_str("ApplyUpgrade"),
            Command::ClockTick => f.write_str("ClockTick"),
        }
    }
}
