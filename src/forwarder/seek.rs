// SPDX-License-Identifier: Apache-2.0

//! Persisted seek positions for tailed files.
//!
//! One small JSON side file per tailed source, named after the source's base
//! name inside the seek directory. The position is advisory: it only reduces
//! re-processing after a restart, so load failures degrade to "no position"
//! and store failures are logged and dropped.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::forwarder::error::{Error, Result};

/// A resume marker for one tailed file: the identity of the file the offset
/// was taken from, plus the byte offset immediately after the last processed
/// line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekPosition {
    /// Device ID of the file the offset refers to
    pub dev: u64,
    /// Inode of the file the offset refers to
    pub ino: u64,
    /// Byte offset just past the last processed line
    pub offset: u64,
}

impl SeekPosition {
    pub fn new(dev: u64, ino: u64, offset: u64) -> Self {
        Self { dev, ino, offset }
    }
}

/// Store for one tailed source's seek position.
pub struct SeekStore {
    path: PathBuf,
}

impl SeekStore {
    /// Create a store for `source` inside `seek_dir`. The side file is named
    /// after the source's base name.
    pub fn open(seek_dir: &Path, source: &Path) -> Result<Self> {
        let name = source
            .file_name()
            .ok_or_else(|| Error::SeekStore(format!("source has no file name: {:?}", source)))?;
        Ok(Self {
            path: seek_dir.join(name),
        })
    }

    /// Read the stored position. An absent, empty, or unparsable side file
    /// yields `None`; ingestion then starts from the beginning of the source.
    pub fn load(&self) -> Option<SeekPosition> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "unable to read seek file");
                return None;
            }
        };
        if data.is_empty() {
            return None;
        }
        match serde_json::from_slice(&data) {
            Ok(pos) => Some(pos),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "discarding unparsable seek file");
                None
            }
        }
    }

    /// Persist a position, replacing the previous one. Failures are logged
    /// and the update is dropped; the in-memory position stays ahead of the
    /// persisted one, which at worst re-delivers a few lines after a crash.
    pub fn store(&self, pos: &SeekPosition) {
        if let Err(e) = self.write_atomic(pos) {
            warn!(path = ?self.path, error = %e, "unable to persist seek position");
        }
    }

    // Write-temp-then-rename so a crash mid-write leaves the old position
    // intact rather than a truncated file.
    fn write_atomic(&self, pos: &SeekPosition) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, pos)?;
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Validate a loaded position against the live file's current size. An
/// offset beyond the end means the file was rotated or truncated since the
/// position was written, so the position is stale and discarded. Runs once
/// per stream at startup.
pub fn bounded_position(live: &Path, pos: Option<SeekPosition>) -> Option<SeekPosition> {
    let pos = pos?;
    let size = match fs::metadata(live) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => {
            warn!(path = ?live, error = %e, "unable to stat file for seek bounds check");
            return None;
        }
    };
    if pos.offset > size {
        warn!(
            path = ?live,
            offset = pos.offset,
            size,
            "stored seek position beyond end of file, starting from the beginning"
        );
        return None;
    }
    Some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SeekStore {
        SeekStore::open(dir.path(), Path::new("/logs/wmbusmeters.log")).unwrap()
    }

    #[test]
    fn round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.load(), None);

        let pos = SeekPosition::new(3, 1234, 987);
        store.store(&pos);
        assert_eq!(store.load(), Some(pos));

        // Overwrite replaces, not appends
        let pos2 = SeekPosition::new(3, 1234, 2000);
        store.store(&pos2);
        assert_eq!(store.load(), Some(pos2));
    }

    #[test]
    fn empty_file_is_no_position() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(dir.path().join("wmbusmeters.log"), b"").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn corrupt_file_is_no_position() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(dir.path().join("wmbusmeters.log"), b"not json").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn side_file_named_after_source() {
        let dir = TempDir::new().unwrap();
        let store = SeekStore::open(dir.path(), Path::new("/logs/meter_readings/m1")).unwrap();
        store.store(&SeekPosition::new(1, 2, 3));
        assert!(dir.path().join("m1").exists());
    }

    #[test]
    fn bounds_check_discards_stale_offset() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("live.log");
        let mut f = File::create(&live).unwrap();
        writeln!(f, "short").unwrap();

        let stale = SeekPosition::new(1, 2, 100_000);
        assert_eq!(bounded_position(&live, Some(stale)), None);

        let fine = SeekPosition::new(1, 2, 3);
        assert_eq!(bounded_position(&live, Some(fine)), Some(fine));
    }

    #[test]
    fn bounds_check_missing_file_keeps_only_zero() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("gone.log");

        assert_eq!(bounded_position(&live, Some(SeekPosition::new(1, 2, 9))), None);
        let zero = SeekPosition::new(1, 2, 0);
        assert_eq!(bounded_position(&live, Some(zero)), Some(zero));
        assert_eq!(bounded_position(&live, None), None);
    }
}
