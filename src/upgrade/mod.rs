//! Firmware upgrade and device activation.
//!
//! [`UpgradeService`] is the transport-facing interface; [`UpgradeFlow`] is
//! the retrying control loop that decides between upgrading, announcing an
//! activation code and settling into normal operation.  The commit itself
//! runs on the main loop (see `Command::ApplyUpgrade`) because it tears down
//! the audio pipeline and must not interleave with anything else.

pub mod flow;
pub mod service;

pub use flow::{FlowOutcome, UpgradeFlow};
pub use service::{UpgradeError, UpgradeProgress, UpgradeService};
