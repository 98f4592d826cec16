//! Board / peripheral layer: display sinks, IoT status and power control.
//!
//! Implementations are shared between the main loop and the audio thread
//! (the idle visual is raised from the output path), so the trait is
//! `Send + Sync` and takes `&self`.

use serde_json::Value;

use super::{Alert, DeviceState};

pub trait Board: Send + Sync {
    /// Short identifier logged at startup.
    fn board_type(&self) -> &str;

    /// Show the visual (LED colour, status line, ...) for `state`.
    fn show_device_state(&self, state: DeviceState);

    fn show_alert(&self, alert: &Alert);

    fn set_power_save_mode(&self, enabled: bool) {
        let _ = enabled;
    }

    /// Voice-activity indicator while listening.
    fn on_voice_activity(&self, speaking: bool) {
        let _ = speaking;
    }

    /// Descriptors of the device's controllable things, sent once per
    /// channel open.
    fn iot_descriptors(&self) -> Value {
        Value::Array(Vec::new())
    }

    /// Current IoT states.  With `delta` set, returns `None` when nothing
    /// changed since the last call.
    fn iot_states(&self, delta: bool) -> Option<Value> {
        let _ = delta;
        None
    }

    /// Restart the device.  On hardware this does not return.
    fn reboot(&self);

    /// Drop the network link (e.g. when the user removes their card).
    fn disconnect_network(&self) {}
}
