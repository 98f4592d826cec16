//! Cross-platform device paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-device\
//!   macOS:   ~/Library/Application Support/voice-device/
//!   Linux:   ~/.config/voice-device/
//!
//! Data dir (sound assets, firmware images):
//!   Windows: %LOCALAPPDATA%\voice-device\
//!   macOS:   ~/Library/Application Support/voice-device/
//!   Linux:   ~/.local/share/voice-device/

use std::path::PathBuf;

/// Holds all resolved device directory/file paths.
#[derive(Debug, Clone)]
pub struct DevicePaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Default directory for `.p3` sound assets.
    pub sounds_dir: PathBuf,
    /// Directory watched by the local firmware service for new images.
    pub firmware_dir: PathBuf,
}

impl DevicePaths {
    const APP_NAME: &'static str = "voice-device";

    /// Resolves all paths using the `dirs` crate, falling back to the current
    /// directory when the platform has no standard location.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            sounds_dir: data_dir.join("sounds"),
            firmware_dir: data_dir.join("firmware"),
        }
    }
}

impl Default for DevicePaths {
    fn default() -> Self {
        Self::new()
    }
}
