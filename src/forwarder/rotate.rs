// SPDX-License-Identifier: Apache-2.0

//! Time-based rotation for files the upstream tool never rotates itself.
//!
//! On every tick each registered file is archived: numbered backups shift
//! down one slot, the current content is copied into slot 1, and the live
//! file is truncated to zero in place. Truncating (rather than renaming)
//! keeps the inode, so the upstream append-mode writer keeps writing into
//! the now-empty file and the tailer sees an ordinary truncation.
//!
//! Nothing in here is fatal: losing one rotation cycle is preferable to
//! stopping ingestion, so every error is logged and the sweep moves on.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Directory receiving the numbered backups
    pub backup_dir: PathBuf,
    /// Number of numbered backup slots to retain per file
    pub depth: u32,
    /// Time between sweeps
    pub interval: Duration,
}

/// Rotates a registered set of files on a fixed interval.
///
/// The file set only ever grows; registration takes the write lock and the
/// sweep holds the read lock for its full duration, so a sweep briefly
/// blocks new registrations but never blocks tailing.
pub struct LogRotator {
    config: RotationConfig,
    files: RwLock<Vec<PathBuf>>,
}

impl LogRotator {
    pub fn new(config: RotationConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            files: RwLock::new(Vec::new()),
        })
    }

    /// Add a file to the rotation set. Registering the same path twice is a
    /// no-op; there is no removal.
    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut files = match self.files.write() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "rotation file list lock poisoned");
                return;
            }
        };
        if !files.contains(&path) {
            files.push(path);
        }
    }

    /// Run the rotation timer until cancellation.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut timer = tokio::time::interval(self.config.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        timer.tick().await; // skip the immediate first tick

        loop {
            select! {
                _ = timer.tick() => self.sweep(),
                _ = cancel.cancelled() => {
                    debug!("rotation timer cancelled");
                    return;
                }
            }
        }
    }

    /// Rotate every registered file once. Public so tests (and operators
    /// via a future signal hook) can force a sweep without waiting a day.
    pub fn sweep(&self) {
        let files = match self.files.read() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "rotation file list lock poisoned");
                return;
            }
        };

        if let Err(e) = fs::create_dir_all(&self.config.backup_dir) {
            warn!(dir = ?self.config.backup_dir, error = %e, "unable to create backup dir");
            return;
        }

        for file in files.iter() {
            if let Err(e) = self.rotate_one(file) {
                warn!(file = ?file, error = %e, "unable to rotate file");
            }
        }
    }

    fn rotate_one(&self, file: &Path) -> std::io::Result<()> {
        // Missing or unreadable files are skipped this cycle.
        fs::metadata(file)?;

        let name = file
            .file_name()
            .ok_or_else(|| std::io::Error::other("file has no base name"))?;
        let slot = |n: u32| {
            let mut s = name.to_os_string();
            s.push(format!(".{}", n));
            self.config.backup_dir.join(s)
        };

        // Shift slot k into k+1, newest last so nothing is clobbered early.
        // The oldest slot is overwritten by the shift, bounding retention.
        for k in (1..self.config.depth).rev() {
            match fs::rename(slot(k), slot(k + 1)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = ?name, slot = k, error = %e, "unable to shift backup"),
            }
        }

        fs::copy(file, slot(1))?;

        // Truncate in place: same inode, the writer's next append lands at
        // offset zero of the emptied file.
        fs::OpenOptions::new().write(true).open(file)?.set_len(0)?;

        debug!(file = ?file, "rotated");
        Ok(())
    }
}
