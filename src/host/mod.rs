//! Desktop stand-ins for the device's platform collaborators.
//!
//! | Collaborator      | Host implementation                      |
//! |-------------------|------------------------------------------|
//! | `AudioCodec`      | [`CpalCodec`] (default input + output)   |
//! | `OpusFactory`     | [`RawPcmFactory`] (uncompressed frames)  |
//! | `NetworkChannel`  | [`LoopbackChannel`] (echoes utterances)  |
//! | `Board`           | [`ConsoleBoard`] (log output)            |
//! | `UpgradeService`  | [`LocalFirmware`] (firmware directory)   |
//! | button            | [`PushToTalk`] (global key via `rdev`)   |

pub mod console;
pub mod cpal_codec;
pub mod firmware;
pub mod loopback;
pub mod push_to_talk;
pub mod raw_codec;

pub use console::ConsoleBoard;
pub use cpal_codec::{CpalCodec, HostAudioError};
pub use firmware::LocalFirmware;
pub use loopback::LoopbackChannel;
pub use push_to_talk::{parse_key, PushToTalk};
pub use raw_codec::RawPcmFactory;
