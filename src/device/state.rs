//! Device operating modes and the lock-free state snapshot.
//!
//! [`DeviceState`] is owned by the [`Application`](super::Application) on the
//! main loop; it is the only writer.  Other threads (audio loop, upgrade
//! flow, status displays) read a [`StateCell`] snapshot, which is
//! eventually consistent and never used for control decisions off the main
//! loop.
//!
//! ```text
//! Starting ──▶ Idle ──▶ Connecting ──▶ Listening ◀──▶ Speaking
//!               ▲            │              │             │
//!               └────────────┴──────────────┴─────────────┘
//! Idle ──▶ Activating ──▶ Idle
//! Idle ──▶ Upgrading  (one-way: ends in reboot)
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// DeviceState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DeviceState {
    #[default]
    Unknown,
    Starting,
    /// Provisioning network credentials.
    Configuring,
    /// Waiting for a button press, wake phrase or card.
    Idle,
    /// Opening the audio channel.
    Connecting,
    /// Capturing and streaming microphone audio.
    Listening,
    /// Playing server speech.
    Speaking,
    /// Applying a firmware image.  Never left in-process.
    Upgrading,
    /// Announcing an activation code and waiting for it to be accepted.
    Activating,
    FatalError,
}

impl DeviceState {
    const ALL: [DeviceState; 10] = [
        DeviceState::Unknown,
        DeviceState::Starting,
        DeviceState::Configuring,
        DeviceState::Idle,
        DeviceState::Connecting,
        DeviceState::Listening,
        DeviceState::Speaking,
        DeviceState::Upgrading,
        DeviceState::Activating,
        DeviceState::FatalError,
    ];

    /// Lower-case label used in logs and by the board's status display.
    ///
    /// ```
    /// use voice_device::device::DeviceState;
    ///
    /// assert_eq!(DeviceState::Idle.label(), "idle");
    /// assert_eq!(DeviceState::FatalError.label(), "fatal_error");
    /// ```
    pub fn label(&self) -> &'static str {
        match self {
            DeviceState::Unknown => "unknown",
            DeviceState::Starting => "starting",
            DeviceState::Configuring => "configuring",
            DeviceState::Idle => "idle",
            DeviceState::Connecting => "connecting",
            DeviceState::Listening => "listening",
            DeviceState::Speaking => "speaking",
            DeviceState::Upgrading => "upgrading",
            DeviceState::Activating => "activating",
            DeviceState::FatalError => "fatal_error",
        }
    }

    fn from_u8(raw: u8) -> DeviceState {
        Self::ALL
            .get(raw as usize)
            .copied()
            .unwrap_or(DeviceState::Unknown)
    }
}

// ---------------------------------------------------------------------------
// ListeningMode / AbortReason
// ---------------------------------------------------------------------------

/// When a `Listening` session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListeningMode {
    /// Until the user explicitly stops (push-to-talk release).
    #[default]
    ManualStop,
    /// Until the server detects end of speech.
    AutoStop,
    /// Full duplex: capture keeps running while the device speaks.
    Realtime,
}

impl ListeningMode {
    /// Wire label sent with start-listening.
    pub fn label(&self) -> &'static str {
        match self {
            ListeningMode::ManualStop => "manual",
            ListeningMode::AutoStop => "auto",
            ListeningMode::Realtime => "realtime",
        }
    }
}

/// Why playback was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbortReason {
    #[default]
    None,
    WakeWordDetected,
}

// ---------------------------------------------------------------------------
// StateCell
// ---------------------------------------------------------------------------

/// Shared, relaxed snapshot of the current [`DeviceState`].
///
/// Cheap to clone (`Arc` clone).
#[derive(Debug, Clone, Default)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new(state: DeviceState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub fn get(&self) -> DeviceState {
        DeviceState::from_u8(self.0.load(Ordering::Relaxed))
    }

    /// Only the main loop calls this.
    pub(crate) fn set(&self, state: DeviceState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
