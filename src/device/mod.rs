//! Device orchestration: state machine, command dispatch and bring-up.
//!
//! ```text
//!  button / wake word / NFC ─┐
//!  network callbacks ────────┤
//!  audio thread ─────────────┼─▶ Scheduler<Command> ─▶ main loop ─▶ Application
//!  upgrade flow ─────────────┤                                      ├─ DeviceState
//!  clock ────────────────────┘                                      ├─ NetworkChannel
//!                                                                   ├─ AudioPipeline
//!                                                                   └─ Board
//! ```

pub mod alert;
pub mod application;
pub mod board;
pub mod command;
pub mod network;
pub mod runtime;
pub mod state;

pub use alert::Alert;
pub use application::Application;
pub use board::Board;
pub use command::Command;
pub use network::{ChannelEvents, NetworkChannel, ServerEvent};
pub use runtime::{Collaborators, Device, DeviceError};
pub use state::{AbortReason, DeviceState, ListeningMode, StateCell};
