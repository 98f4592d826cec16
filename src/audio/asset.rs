//! Local sound assets: the length-prefixed "P3" frame format and the sound
//! bank that loads them.
//!
//! # Format
//!
//! ```text
//! ┌──────────────┬─────────────────────┬──────────────┬─────
//! │ u16 BE  len  │ len bytes of packet │ u16 BE  len  │ ...
//! └──────────────┴─────────────────────┴──────────────┴─────
//! ```
//!
//! Each payload is one pre-encoded packet at the asset sample rate (16 kHz,
//! 60 ms frames in the stock asset set).  Packets are played through the same
//! decode queue as network audio.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

// ---------------------------------------------------------------------------
// AssetError / parse_p3
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssetError {
    /// Fewer than two bytes remain where a length prefix is expected.
    #[error("truncated length prefix at offset {offset}")]
    TruncatedHeader { offset: usize },

    /// The length prefix points past the end of the data.
    #[error("record at offset {offset} declares {declared} bytes but only {available} remain")]
    TruncatedPayload {
        offset: usize,
        declared: usize,
        available: usize,
    },
}

/// Split a P3 byte stream into its packets, in file order.
///
/// The whole stream is validated before anything is returned, so a corrupt
/// asset never plays partially.
///
/// ```rust
/// use voice_device::audio::parse_p3;
///
/// let data = [0x00, 0x02, 0xAA, 0xBB, 0x00, 0x01, 0xCC];
/// assert_eq!(parse_p3(&data).unwrap(), vec![vec![0xAA, 0xBB], vec![0xCC]]);
/// ```
pub fn parse_p3(data: &[u8]) -> Result<Vec<Vec<u8>>, AssetError> {
    let mut packets = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let header = data
            .get(offset..offset + 2)
            .ok_or(AssetError::TruncatedHeader { offset })?;
        let declared = u16::from_be_bytes([header[0], header[1]]) as usize;

        let start = offset + 2;
        let payload = data
            .get(start..start + declared)
            .ok_or(AssetError::TruncatedPayload {
                offset,
                declared,
                available: data.len() - start,
            })?;

        packets.push(payload.to_vec());
        offset = start + declared;
    }

    Ok(packets)
}

// ---------------------------------------------------------------------------
// Sound
// ---------------------------------------------------------------------------

/// Named prompts and tones shipped with the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sound {
    Success,
    Upgrade,
    Exclamation,
    Activation,
    /// A spoken digit, `0..=9`.
    Digit(u8),
}

/// Character → sound table used to read out activation codes.
const DIGIT_SOUNDS: [(char, Sound); 10] = [
    ('0', Sound::Digit(0)),
    ('1', Sound::Digit(1)),
    ('2', Sound::Digit(2)),
    ('3', Sound::Digit(3)),
    ('4', Sound::Digit(4)),
    ('5', Sound::Digit(5)),
    ('6', Sound::Digit(6)),
    ('7', Sound::Digit(7)),
    ('8', Sound::Digit(8)),
    ('9', Sound::Digit(9)),
];

impl Sound {
    /// Look up the spoken sound for one activation-code character.
    /// Characters without a recording yield `None` and are skipped.
    pub fn for_digit(c: char) -> Option<Sound> {
        DIGIT_SOUNDS
            .iter()
            .find(|(digit, _)| *digit == c)
            .map(|(_, sound)| *sound)
    }

    /// File name of the asset inside the sound directory.
    pub fn file_name(&self) -> String {
        match self {
            Sound::Success => "success.p3".into(),
            Sound::Upgrade => "upgrade.p3".into(),
            Sound::Exclamation => "exclamation.p3".into(),
            Sound::Activation => "activation.p3".into(),
            Sound::Digit(d) => format!("{d}.p3"),
        }
    }
}

// ---------------------------------------------------------------------------
// SoundBank
// ---------------------------------------------------------------------------

/// Source of raw P3 asset bytes.
pub trait SoundBank: Send + Sync {
    fn sound(&self, sound: Sound) -> Option<Arc<[u8]>>;
}

impl SoundBank for HashMap<Sound, Vec<u8>> {
    fn sound(&self, sound: Sound) -> Option<Arc<[u8]>> {
        self.get(&sound).map(|bytes| Arc::from(bytes.as_slice()))
    }
}

/// Loads `<dir>/<name>.p3` on first use and keeps it cached.
///
/// Record payloads are handed unchanged to whatever packet decoder the
/// pipeline was built with, so the files must be encoded for it: opus
/// frames on the device, little-endian PCM frames for
/// [`RawPcmFactory`](crate::host::RawPcmFactory) on a desktop.  Opus assets
/// played through the raw codec come out as noise.
pub struct DirSoundBank {
    dir: PathBuf,
    cache: Mutex<HashMap<Sound, Arc<[u8]>>>,
}

impl DirSoundBank {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SoundBank for DirSoundBank {
    fn sound(&self, sound: Sound) -> Option<Arc<[u8]>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bytes) = cache.get(&sound) {
            return Some(Arc::clone(bytes));
        }

        let path = self.dir.join(sound.file_name());
        match std::fs::read(&path) {
            Ok(bytes) => {
                let bytes: Arc<[u8]> = Arc::from(bytes);
                cache.insert(sound, Arc::clone(&bytes));
                Some(bytes)
            }
            Err(e) => {
                log::warn!("audio: sound asset {} unavailable: {e}", path.display());
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
