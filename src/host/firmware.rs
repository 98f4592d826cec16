//! Firmware service backed by a local directory.
//!
//! ```text
//! <firmware_dir>/
//!   voice-device-<x.y.z>.bin   candidate images; the highest newer one wins
//!   activation.txt             pending activation code (delete to accept)
//!   valid                      written by mark_current_version_valid
//!   staged.bin                 written by start_upgrade
//! ```

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::upgrade::{UpgradeError, UpgradeProgress, UpgradeService};

const IMAGE_PREFIX: &str = "voice-device-";
const IMAGE_SUFFIX: &str = ".bin";
const CHUNK: usize = 64 * 1024;

type Version = [u32; 3];

fn parse_version(text: &str) -> Option<Version> {
    let mut parts = text.split('.').map(|p| p.parse::<u32>().ok());
    let version = [parts.next()??, parts.next()??, parts.next()??];
    parts.next().is_none().then_some(version)
}

fn format_version(v: &Version) -> String {
    format!("{}.{}.{}", v[0], v[1], v[2])
}

pub struct LocalFirmware {
    dir: PathBuf,
    current: Version,
    pending: Option<(Version, PathBuf)>,
    activation: Option<String>,
}

impl LocalFirmware {
    /// `current_version` is `x.y.z`; anything else is treated as `0.0.0`.
    pub fn new(dir: impl AsRef<Path>, current_version: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            current: parse_version(current_version).unwrap_or_default(),
            pending: None,
            activation: None,
        }
    }

    fn newest_image(&self) -> Result<Option<(Version, PathBuf)>, UpgradeError> {
        let mut best: Option<(Version, PathBuf)> = None;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(version) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(IMAGE_PREFIX)?.strip_suffix(IMAGE_SUFFIX))
                .and_then(parse_version)
            else {
                continue;
            };
            if version > self.current && best.as_ref().map_or(true, |(b, _)| version > *b) {
                best = Some((version, path));
            }
        }
        Ok(best)
    }
}

impl UpgradeService for LocalFirmware {
    fn check_version(&mut self) -> Result<(), UpgradeError> {
        self.pending = None;
        self.activation = None;
        if !self.dir.is_dir() {
            log::debug!("upgrade: {} does not exist, nothing to do", self.dir.display());
            return Ok(());
        }

        self.pending = self.newest_image()?;
        self.activation = match fs::read_to_string(self.dir.join("activation.txt")) {
            Ok(code) => Some(code.trim().to_string()).filter(|c| !c.is_empty()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(())
    }

    fn has_new_version(&self) -> bool {
        self.pending.is_some()
    }

    fn firmware_version(&self) -> Option<String> {
        self.pending.as_ref().map(|(v, _)| format_version(v))
    }

    fn has_activation_code(&self) -> bool {
        self.activation.is_some()
    }

    fn activation_code(&self) -> String {
        self.activation.clone().unwrap_or_default()
    }

    fn mark_current_version_valid(&mut self) {
        if !self.dir.is_dir() {
            return;
        }
        if let Err(e) = fs::write(self.dir.join("valid"), format_version(&self.current)) {
            log::warn!("upgrade: could not record valid version: {e}");
        }
    }

    fn start_upgrade(
        &mut self,
        progress: &mut dyn FnMut(UpgradeProgress),
    ) -> Result<(), UpgradeError> {
        let Some((version, image)) = self.pending.clone() else {
            return Err(UpgradeError::Download("no pending image".into()));
        };

        let mut source = fs::File::open(&image)?;
        let total = source.metadata()?.len() as usize;
        if total == 0 {
            return Err(UpgradeError::InvalidImage(format!(
                "{} is empty",
                image.display()
            )));
        }

        let mut staged = fs::File::create(self.dir.join("staged.bin"))?;
        let started = Instant::now();
        let mut buf = vec![0u8; CHUNK];
        let mut written = 0usize;
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            staged.write_all(&buf[..n])?;
            written += n;

            let secs = started.elapsed().as_secs_f64().max(1e-3);
            progress(UpgradeProgress {
                percent: (written * 100 / total).min(100) as u8,
                bytes_per_sec: (written as f64 / secs) as usize,
            });
        }
        staged.sync_all()?;

        log::info!("upgrade: staged {} ({written} bytes)", format_version(&version));
        Ok(())
    }
}
