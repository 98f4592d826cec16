//! Desktop entry point: runs the device core on host audio.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`DeviceConfig`] from disk (returns default on first run).
//! 3. Open the default audio devices (continue without audio if unavailable).
//! 4. Start the [`Device`] with the host collaborators.
//! 5. Start the push-to-talk key listener.
//! 6. Block on the main loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use voice_device::{
    audio::{AudioCodec, DirSoundBank, EnergyVad},
    config::{DeviceConfig, DevicePaths},
    device::{Collaborators, Device},
    host::{parse_key, ConsoleBoard, CpalCodec, LocalFirmware, LoopbackChannel, PushToTalk, RawPcmFactory},
};

/// Longest auto-stop turn the loopback service records before replying.
const LOOPBACK_UTTERANCE: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice-device {} starting up", env!("CARGO_PKG_VERSION"));

    // 2. Configuration
    let config = DeviceConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        DeviceConfig::default()
    });
    let paths = DevicePaths::new();

    // 3. Host audio
    let codec: Option<Arc<dyn AudioCodec>> = match CpalCodec::open() {
        Ok(codec) => Some(Arc::new(codec)),
        Err(e) => {
            log::warn!("Audio unavailable ({e}); running without audio");
            None
        }
    };
    let input_channels = codec.as_ref().map_or(1, |c| c.input_channels());

    // 4. Device
    let parts = Collaborators {
        codec,
        opus: Arc::new(RawPcmFactory),
        network: Box::new(LoopbackChannel::new(
            config.audio.pipeline_sample_rate,
            config.audio.frame_duration_ms,
            LOOPBACK_UTTERANCE,
        )),
        board: Arc::new(ConsoleBoard::new()),
        sounds: Arc::new(DirSoundBank::new(config.assets_dir())),
        upgrade: Box::new(LocalFirmware::new(
            &paths.firmware_dir,
            env!("CARGO_PKG_VERSION"),
        )),
        processor: Some(Box::new(EnergyVad::new(
            config.audio.vad_threshold,
            config.audio.capture_frame_samples(),
            input_channels,
        ))),
        wake_word: None,
    };
    let device = Device::start(config.clone(), parts).context("failed to start device")?;

    // 5. Push-to-talk
    let key = parse_key(&config.button.push_to_talk_key).unwrap_or_else(|| {
        log::warn!(
            "Unknown push-to-talk key '{}'; using F9",
            config.button.push_to_talk_key
        );
        rdev::Key::F9
    });
    let _push_to_talk =
        PushToTalk::start(key, device.scheduler()).context("failed to start push-to-talk")?;

    // 6. Run until the main loop exits
    device.join();
    Ok(())
}
