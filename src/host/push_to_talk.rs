//! Global push-to-talk key backed by `rdev`.
//!
//! Press queues [`Command::StartListening`], release queues
//! [`Command::StopListening`]; key repeat while held is ignored.
//!
//! `rdev::listen` blocks forever and has no shutdown API, so it lives on its
//! own OS thread.  Dropping [`PushToTalk`] sets a stop flag and the callback
//! discards further events; the thread stays parked in rdev until the
//! process exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::device::Command;
use crate::scheduler::Scheduler;

/// Parse a key name from the config into an [`rdev::Key`].
///
/// ```
/// use voice_device::host::parse_key;
///
/// assert_eq!(parse_key("F9"), Some(rdev::Key::F9));
/// assert_eq!(parse_key("space"), Some(rdev::Key::Space));
/// assert_eq!(parse_key("Ctrl+V"), None);
/// ```
pub fn parse_key(name: &str) -> Option<rdev::Key> {
    use rdev::Key;

    let key = match name.to_ascii_lowercase().as_str() {
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        "space" => Key::Space,
        "escape" | "esc" => Key::Escape,
        "return" | "enter" => Key::Return,
        "tab" => Key::Tab,
        "capslock" => Key::CapsLock,
        "scrolllock" => Key::ScrollLock,
        "pause" => Key::Pause,
        "insert" => Key::Insert,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        _ => return None,
    };
    Some(key)
}

/// Tracks the key so that auto-repeat presses map to a single command.
#[derive(Debug, Default)]
struct KeyEdge {
    held: bool,
}

impl KeyEdge {
    fn on_event(&mut self, key: rdev::Key, event: &rdev::EventType) -> Option<Command> {
        match *event {
            rdev::EventType::KeyPress(k) if k == key && !self.held => {
                self.held = true;
                Some(Command::StartListening)
            }
            rdev::EventType::KeyRelease(k) if k == key && self.held => {
                self.held = false;
                Some(Command::StopListening)
            }
            _ => None,
        }
    }
}

pub struct PushToTalk {
    stop: Arc<AtomicBool>,
    _thread: JoinHandle<()>,
}

impl PushToTalk {
    /// Start forwarding `key` presses to the main loop.
    pub fn start(key: rdev::Key, scheduler: Scheduler<Command>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("push-to-talk".into())
            .spawn(move || {
                let mut edge = KeyEdge::default();
                let result = rdev::listen(move |event| {
                    if stopped.load(Ordering::Relaxed) {
                        return;
                    }
                    if let Some(command) = edge.on_event(key, &event.event_type) {
                        scheduler.schedule(command);
                    }
                });
                if let Err(e) = result {
                    log::error!("push-to-talk: rdev::listen exited with error: {e:?}");
                }
            })?;

        log::info!("push-to-talk: listening for {key:?}");
        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for PushToTalk {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdev::{EventType, Key};

    #[test]
    fn key_names_are_case_insensitive() {
        assert_eq!(parse_key("F9"), Some(Key::F9));
        assert_eq!(parse_key("f12"), Some(Key::F12));
        assert_eq!(parse_key("Esc"), Some(Key::Escape));
        assert_eq!(parse_key("Enter"), Some(Key::Return));
    }

    #[test]
    fn unknown_key_names() {
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("F13"), None);
        assert_eq!(parse_key("Ctrl+V"), None);
    }

    #[test]
    fn press_and_release_map_to_listening_commands() {
        let mut edge = KeyEdge::default();
        assert!(matches!(
            edge.on_event(Key::F9, &EventType::KeyPress(Key::F9)),
            Some(Command::StartListening)
        ));
        assert!(matches!(
            edge.on_event(Key::F9, &EventType::KeyRelease(Key::F9)),
            Some(Command::StopListening)
        ));
    }

    #[test]
    fn auto_repeat_and_other_keys_are_ignored() {
        let mut edge = KeyEdge::default();
        edge.on_event(Key::F9, &EventType::KeyPress(Key::F9));
        assert!(edge
            .on_event(Key::F9, &EventType::KeyPress(Key::F9))
            .is_none());
        assert!(edge
            .on_event(Key::F9, &EventType::KeyPress(Key::F8))
            .is_none());
        assert!(edge
            .on_event(Key::F9, &EventType::KeyRelease(Key::F8))
            .is_none());
    }

    #[test]
    fn release_without_press_is_ignored() {
        let mut edge = KeyEdge::default();
        assert!(edge
            .on_event(Key::F9, &EventType::KeyRelease(Key::F9))
            .is_none());
    }
}
