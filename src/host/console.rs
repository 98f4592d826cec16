//! Board that renders state and alerts to the log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde_json::{json, Value};

use crate::device::{Alert, Board, DeviceState};

pub struct ConsoleBoard {
    power_save: AtomicBool,
    last_states: Mutex<Option<Value>>,
}

impl ConsoleBoard {
    pub fn new() -> Self {
        Self {
            power_save: AtomicBool::new(false),
            last_states: Mutex::new(None),
        }
    }

    fn states(&self) -> Value {
        json!([{
            "name": "Console",
            "state": { "power_save": self.power_save.load(Ordering::Relaxed) }
        }])
    }
}

impl Default for ConsoleBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Board for ConsoleBoard {
    fn board_type(&self) -> &str {
        "console"
    }

    fn show_device_state(&self, state: DeviceState) {
        log::info!("[display] {}", state.label());
    }

    fn show_alert(&self, alert: &Alert) {
        log::info!("[display] ({}) {}", alert.emotion, alert.message);
    }

    fn set_power_save_mode(&self, enabled: bool) {
        self.power_save.store(enabled, Ordering::Relaxed);
    }

    fn on_voice_activity(&self, speaking: bool) {
        log::debug!("[display] voice {}", if speaking { "on" } else { "off" });
    }

    fn iot_descriptors(&self) -> Value {
        json!([{
            "name": "Console",
            "description": "Host console",
            "properties": { "power_save": { "type": "boolean" } }
        }])
    }

    fn iot_states(&self, delta: bool) -> Option<Value> {
        let states = self.states();
        let mut last = self.last_states.lock().unwrap_or_else(PoisonError::into_inner);
        if delta && last.as_ref() == Some(&states) {
            return None;
        }
        *last = Some(states.clone());
        Some(states)
    }

    /// The host has no hardware to reset, so the process exits.
    fn reboot(&self) {
        log::info!("[board] reboot requested, exiting");
        std::process::exit(0);
    }
}
