//! Runtime core of a voice-assistant device.
//!
//! - [`scheduler`]: the serialized main loop and the background codec worker
//! - [`audio`]: capture/playback pipeline, decode queue, sound assets
//! - [`device`]: state machine, command dispatch and bring-up
//! - [`upgrade`]: firmware check, activation and upgrade hand-off
//! - [`config`]: persisted settings
//! - [`host`]: desktop implementations of the platform collaborators

pub mod audio;
pub mod config;
pub mod device;
pub mod host;
pub mod scheduler;
pub mod upgrade;

#[cfg(test)]
pub(crate) mod testing;
