//! Device settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`.
//! Every section is `#[serde(default)]`, so a partial `settings.toml` only
//! overrides the keys it names.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::DevicePaths;

// ---------------------------------------------------------------------------
// ChatConfig
// ---------------------------------------------------------------------------

/// Conversation behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Use full-duplex `Realtime` listening when a chat is toggled on;
    /// otherwise `AutoStop`.
    pub realtime_chat_enabled: bool,
    /// Pause before re-entering `Listening` from `Speaking` in `AutoStop`
    /// mode, letting the speaker empty its buffer.
    pub auto_stop_resume_delay_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            realtime_chat_enabled: false,
            auto_stop_resume_delay_ms: 120,
        }
    }
}

impl ChatConfig {
    pub fn auto_stop_resume_delay(&self) -> Duration {
        Duration::from_millis(self.auto_stop_resume_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Audio pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Canonical rate for encoding and voice-activity processing (Hz).
    pub pipeline_sample_rate: u32,
    /// Duration of one compressed packet (ms).
    pub frame_duration_ms: u32,
    /// Capture frame length when no processor is active (ms).
    pub capture_frame_ms: u32,
    /// Sleep when no consumer claims a capture frame (ms).
    pub idle_poll_ms: u64,
    /// Silence in `Idle` after which the idle visual is shown (s).
    pub max_silence_secs: u64,
    /// Rate the bundled sound assets were encoded at (Hz).
    pub asset_sample_rate: u32,
    /// Frame duration of the bundled sound assets (ms).
    pub asset_frame_duration_ms: u32,
    /// RMS threshold for the energy VAD (0.0 – 1.0).
    pub vad_threshold: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            pipeline_sample_rate: 16_000,
            frame_duration_ms: 60,
            capture_frame_ms: 30,
            idle_poll_ms: 30,
            max_silence_secs: 10,
            asset_sample_rate: 16_000,
            asset_frame_duration_ms: 60,
            vad_threshold: 0.01,
        }
    }
}

impl AudioConfig {
    /// Samples per channel in one un-processed capture frame at the pipeline
    /// rate.
    pub fn capture_frame_samples(&self) -> usize {
        (self.pipeline_sample_rate as usize * self.capture_frame_ms as usize) / 1000
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn max_silence(&self) -> Duration {
        Duration::from_secs(self.max_silence_secs)
    }
}

// ---------------------------------------------------------------------------
// UpgradeConfig
// ---------------------------------------------------------------------------

/// Version check, upgrade and activation timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Consecutive failed version checks before giving up for this cycle.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Poll interval while waiting for `Idle` before applying an upgrade.
    pub idle_poll_ms: u64,
    /// Number of polls while waiting for activation to complete.
    pub activation_polls: u32,
    pub activation_poll_ms: u64,
    /// Pause before reading out the activation code.
    pub announce_delay_ms: u64,
    /// Pause after tearing down audio, before the upgrade is applied.
    pub commit_settle_ms: u64,
    /// Pause between a failed upgrade and the reboot.
    pub failure_reboot_delay_ms: u64,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_delay_ms: 60_000,
            idle_poll_ms: 3_000,
            activation_polls: 60,
            activation_poll_ms: 1_000,
            announce_delay_ms: 1_000,
            commit_settle_ms: 1_000,
            failure_reboot_delay_ms: 3_000,
        }
    }
}

impl UpgradeConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn activation_poll(&self) -> Duration {
        Duration::from_millis(self.activation_poll_ms)
    }

    pub fn announce_delay(&self) -> Duration {
        Duration::from_millis(self.announce_delay_ms)
    }

    pub fn commit_settle(&self) -> Duration {
        Duration::from_millis(self.commit_settle_ms)
    }

    pub fn failure_reboot_delay(&self) -> Duration {
        Duration::from_millis(self.failure_reboot_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// ButtonConfig
// ---------------------------------------------------------------------------

/// Physical (or emulated) button bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    /// Push-to-talk key name (e.g. `"F9"`).
    pub push_to_talk_key: String,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            push_to_talk_key: "F9".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// DiagnosticsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Period of the clock tick delivered to the main loop.
    pub clock_interval_ms: u64,
    /// Log a status line every N ticks.
    pub report_every_ticks: u32,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            clock_interval_ms: 1_000,
            report_every_ticks: 10,
        }
    }
}

impl DiagnosticsConfig {
    pub fn clock_interval(&self) -> Duration {
        Duration::from_millis(self.clock_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// DeviceConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level device configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_device::config::DeviceConfig;
///
/// // Load (returns Default when file is missing)
/// let config = DeviceConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub chat: ChatConfig,
    pub audio: AudioConfig,
    pub upgrade: UpgradeConfig,
    pub button: ButtonConfig,
    pub diagnostics: DiagnosticsConfig,
    /// Directory holding the `.p3` sound assets.  `None` means the platform
    /// data directory.
    pub assets_dir: Option<PathBuf>,
}

impl DeviceConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(DeviceConfig::default())` when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&DevicePaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&DevicePaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolved sound-asset directory.
    pub fn assets_dir(&self) -> PathBuf {
        self.assets_dir
            .clone()
            .unwrap_or_else(|| DevicePaths::new().sounds_dir)
    }

    /// A configuration with every delay set to zero, for driving the device
    /// in tests without sleeping.
    #[cfg(test)]
    pub(crate) fn without_delays() -> Self {
        let mut config = Self::default();
        config.chat.auto_stop_resume_delay_ms = 0;
        config.audio.idle_poll_ms = 0;
        config.upgrade = UpgradeConfig {
            retry_delay_ms: 0,
            idle_poll_ms: 0,
            activation_poll_ms: 0,
            announce_delay_ms: 0,
            commit_settle_ms: 0,
            failure_reboot_delay_ms: 0,
            ..UpgradeConfig::default()
        };
        config
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
