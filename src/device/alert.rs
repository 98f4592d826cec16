//! User-facing alerts: the device's only error-reporting channel.

use std::fmt;

use crate::audio::Sound;

/// A status, a message, an emotion tag for the display and an optional cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub status: String,
    pub message: String,
    pub emotion: String,
    pub sound: Option<Sound>,
}

impl Alert {
    pub fn new(
        status: impl Into<String>,
        message: impl Into<String>,
        emotion: impl Into<String>,
    ) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
            emotion: emotion.into(),
            sound: None,
        }
    }

    pub fn with_sound(mut self, sound: Sound) -> Self {
        self.sound = Some(sound);
        self
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Alert {}: {} [{}]", self.status, self.message, self.emotion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let alert = Alert::new("Error", "channel failed", "sad").with_sound(Sound::Exclamation);
        assert_eq!(alert.to_string(), "Alert Error: channel failed [sad]");
        assert_eq!(alert.sound, Some(Sound::Exclamation));
    }
}
