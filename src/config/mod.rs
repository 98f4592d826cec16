//! Device configuration.
//!
//! Provides `DeviceConfig` (top-level settings), one sub-config per
//! subsystem, `DevicePaths` for cross-platform directories, and TOML
//! persistence via `DeviceConfig::load` / `DeviceConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::DevicePaths;
pub use settings::{
    AudioConfig, ButtonConfig, ChatConfig, DeviceConfig, DiagnosticsConfig, UpgradeConfig,
};
