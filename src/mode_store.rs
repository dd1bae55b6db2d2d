//! Persisted robot operating mode.
//!
//! The only state the supervisor persists: whether the robot was left in
//! normal, maintenance, or lockdown mode. Read once at startup to choose the
//! initial state; written when maintenance/lockdown is entered or released.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Last-known operating mode of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    #[default]
    Normal,
    Maintenance,
    Lockdown,
}

/// JSON-file-backed store for the operating mode.
#[derive(Debug, Clone)]
pub struct ModeStore {
    path: PathBuf,
}

impl ModeStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read the persisted mode. A missing or unreadable file means Normal;
    /// startup must not fail because of a stale mode file.
    pub fn read(&self) -> OperatingMode {
        match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(mode) => mode,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Corrupt mode file, assuming normal mode");
                    OperatingMode::Normal
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => OperatingMode::Normal,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not read mode file, assuming normal mode");
                OperatingMode::Normal
            }
        }
    }

    /// Persist the mode.
    pub fn write(&self, mode: OperatingMode) -> io::Result<()> {
        let raw = serde_json::to_string(&mode).map_err(io::Error::other)?;
        fs::write(&self.path, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_means_normal() {
        let dir = tempdir().expect("tempdir");
        let store = ModeStore::new(dir.path().join("missing.json"));
        assert_eq!(store.read(), OperatingMode::Normal);
    }

    #[test]
    fn mode_round_trips_through_file() {
        let dir = tempdir().expect("tempdir");
        let store = ModeStore::new(dir.path().join("mode.json"));
        store.write(OperatingMode::Lockdown).expect("write");
        assert_eq!(store.read(), OperatingMode::Lockdown);
        store.write(OperatingMode::Normal).expect("write");
        assert_eq!(store.read(), OperatingMode::Normal);
    }

    #[test]
    fn corrupt_file_means_normal() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("mode.json");
        std::fs::write(&path, "not json at all").expect("write garbage");
        let store = ModeStore::new(path);
        assert_eq!(store.read(), OperatingMode::Normal);
    }
}
