// SPDX-License-Identifier: Apache-2.0

//! Creation events for the meter readings directory.
//!
//! Wraps a notify watcher and narrows its event stream down to "a file
//! appeared in this directory". The notify callback runs on its own thread;
//! events cross into async land over a bounded channel.

use std::path::{Path, PathBuf};

use notify::event::CreateKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::warn;

use crate::bounded_channel::{BoundedReceiver, bounded};
use crate::forwarder::error::{Error, Result};

const EVENT_BUFFER: usize = 64;

pub struct DirectoryWatcher {
    // Held for its Drop; dropping the watcher stops the notify thread.
    _watcher: RecommendedWatcher,
    events: BoundedReceiver<PathBuf>,
}

impl DirectoryWatcher {
    /// Watch `dir` (non-recursively) for newly created files.
    pub fn new(dir: &Path) -> Result<Self> {
        let (tx, events) = bounded::<PathBuf>(EVENT_BUFFER);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "watch error on readings directory");
                    return;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Create(CreateKind::File) | EventKind::Create(CreateKind::Any)
            ) {
                return;
            }
            for path in event.paths {
                // Receiver gone means the pipeline is shutting down.
                if tx.send_blocking(path).is_err() {
                    return;
                }
            }
        })
        .map_err(|e| Error::Watcher(e.to_string()))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watcher(e.to_string()))?;

        Ok(Self {
            _watcher: watcher,
            events,
        })
    }

    /// Next created file, or `None` once the watcher has shut down.
    pub async fn next_created(&mut self) -> Option<PathBuf> {
        self.events.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[tokio::test]
    async fn reports_created_files() {
        let dir = TempDir::new().unwrap();
        let mut watcher = DirectoryWatcher::new(dir.path()).unwrap();

        let path = dir.path().join("meter_1.log");
        fs::write(&path, "").unwrap();

        let seen = timeout(Duration::from_secs(5), watcher.next_created())
            .await
            .expect("no create event")
            .expect("watcher closed");
        assert_eq!(seen, path);
    }

    #[tokio::test]
    async fn ignores_modifications_to_existing_files() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("existing.log");
        fs::write(&existing, "before\n").unwrap();

        let mut watcher = DirectoryWatcher::new(dir.path()).unwrap();
        fs::write(&existing, "before\nafter\n").unwrap();

        let fresh = dir.path().join("fresh.log");
        fs::write(&fresh, "").unwrap();

        // The first event to arrive must be the creation, not the modify.
        let seen = timeout(Duration::from_secs(5), watcher.next_created())
            .await
            .expect("no create event")
            .expect("watcher closed");
        assert_eq!(seen, fresh);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(DirectoryWatcher::new(&missing).is_err());
    }
}
