//! Firmware-update / registration service interface.
//!
//! The flow in [`super::flow`] drives the control logic (retry bound,
//! polling, activation); the transport behind these calls is opaque.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpgradeError {
    /// The version endpoint could not be reached or answered garbage.
    #[error("version check failed: {0}")]
    Check(String),

    #[error("firmware download failed: {0}")]
    Download(String),

    #[error("firmware image rejected: {0}")]
    InvalidImage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Progress report passed to the [`UpgradeService::start_upgrade`] callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeProgress {
    /// 0 – 100.
    pub percent: u8,
    pub bytes_per_sec: usize,
}

pub trait UpgradeService: Send {
    /// Ask the server for the latest version and any pending activation
    /// code.  The `has_*` / getter methods report what the last successful
    /// check returned.
    fn check_version(&mut self) -> Result<(), UpgradeError>;

    fn has_new_version(&self) -> bool;

    /// Version string of the pending firmware, if any.
    fn firmware_version(&self) -> Option<String> {
        None
    }

    fn has_activation_code(&self) -> bool;

    fn activation_code(&self) -> String;

    /// Anti-rollback bookkeeping: confirm the running image boots.
    fn mark_current_version_valid(&mut self);

    /// Download and stage the new image.  `Ok` means the image is ready and
    /// the device should reboot into it.
    fn start_upgrade(
        &mut self,
        progress: &mut dyn FnMut(UpgradeProgress),
    ) -> Result<(), UpgradeError>;
}
