// SPDX-License-Identifier: Apache-2.0

//! The orchestrator wiring tailers, parsers, registry and gateway together.
//!
//! Two top-level flows, each its own task:
//!
//! * the shared decoder log is tailed and fed through the telegram parser,
//!   every completed telegram published under the hub device, and
//! * the readings directory is scanned and watched, with one tailing task
//!   per discovered file feeding the reading extractor, the device registry
//!   and the decrypted event stream.
//!
//! A failure that the error taxonomy calls fatal (missing shared log,
//! uncreatable directory) cancels the shared token and tears the whole
//! pipeline down; everything else is logged and the streams keep going.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::forwarder::error::{Error, Result};
use crate::forwarder::reading;
use crate::forwarder::registry::DeviceRegistry;
use crate::forwarder::rotate::LogRotator;
use crate::forwarder::seek::{SeekStore, bounded_position};
use crate::forwarder::tail::Tailer;
use crate::forwarder::telegram::TelegramParser;
use crate::gateway::{DECRYPTED_SERVICE, Device, ENCRYPTED_SERVICE, Gateway};

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// The shared wmbusmeters log file
    pub wmbus_log_file: PathBuf,
    /// Directory wmbusmeters writes one reading file per meter into
    pub meter_readings_dir: PathBuf,
    /// Directory for seek position side files
    pub seek_dir: PathBuf,
    /// How often each tailer polls its file for new lines
    pub poll_interval: Duration,
    /// The device all encrypted telegram events are attributed to
    pub hub: Device,
}

pub struct LogForwarder {
    config: ForwarderConfig,
    gateway: Arc<dyn Gateway>,
    registry: Arc<DeviceRegistry>,
    rotator: Arc<LogRotator>,
}

impl LogForwarder {
    pub fn new(
        config: ForwarderConfig,
        gateway: Arc<dyn Gateway>,
        registry: Arc<DeviceRegistry>,
        rotator: Arc<LogRotator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            gateway,
            registry,
            rotator,
        })
    }

    /// Run both ingestion flows until cancellation. A fatal error in either
    /// flow cancels the token so the sibling flow (and the caller's other
    /// tasks) wind down too.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.seek_dir)
            .await
            .map_err(|_| Error::Directory(self.config.seek_dir.clone()))?;

        let mut flows: JoinSet<Result<()>> = JoinSet::new();
        {
            let fwd = self.clone();
            let cancel = cancel.clone();
            flows.spawn(async move { fwd.run_shared_log(cancel).await });
        }
        {
            let fwd = self.clone();
            let cancel = cancel.clone();
            flows.spawn(async move { fwd.run_readings_dir(cancel).await });
        }

        let mut result = Ok(());
        while let Some(joined) = flows.join_next().await {
            let flow_result = match joined {
                Ok(res) => res,
                Err(e) => Err(Error::Task(e.to_string())),
            };
            if let Err(e) = flow_result {
                error!(error = %e, "ingestion flow failed, shutting down");
                cancel.cancel();
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Tail the shared decoder log and publish assembled telegrams.
    async fn run_shared_log(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        // wmbusmeters never rotates its own log
        self.rotator.register(&self.config.wmbus_log_file);

        let store = SeekStore::open(&self.config.seek_dir, &self.config.wmbus_log_file)?;
        let start = bounded_position(&self.config.wmbus_log_file, store.load());

        // Pre-announce the hub so telegram events have a device to hang off.
        // The periodic refresh retries if the gateway is not up yet.
        if let Err(e) = self.registry.add_idempotent(self.config.hub.clone()).await {
            warn!(device_id = %self.config.hub.id, error = %e, "unable to announce hub device");
        }

        let mut tailer = Tailer::open(&self.config.wmbus_log_file, start)?;
        let mut parser = TelegramParser::new();
        let mut poll = poll_timer(self.config.poll_interval);

        loop {
            select! {
                _ = poll.tick() => {
                    for event in tailer.read_lines()? {
                        store.store(&event.position);
                        let Some(telegram) = parser.handle_line(&event.text) else {
                            continue;
                        };
                        debug!(meter_id = %telegram.meter_id, rssi = telegram.rssi, "assembled telegram");
                        let payload = serde_json::to_vec(&telegram)?;
                        if let Err(e) = self
                            .gateway
                            .publish(&self.config.hub.id, ENCRYPTED_SERVICE, &payload)
                            .await
                        {
                            error!(service = ENCRYPTED_SERVICE, error = %e, "unable to publish event");
                        }
                    }
                },
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }

    /// Scan and watch the readings directory, one tailing task per file.
    async fn run_readings_dir(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let dir = &self.config.meter_readings_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|_| Error::Directory(dir.clone()))?;

        let mut files: JoinSet<()> = JoinSet::new();
        let mut tailed: HashSet<PathBuf> = HashSet::new();

        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                continue;
            }
            self.spawn_reading_file(&mut files, &mut tailed, entry.path(), cancel.clone());
        }

        let mut watcher = crate::forwarder::watch::DirectoryWatcher::new(dir)?;
        loop {
            select! {
                created = watcher.next_created() => {
                    match created {
                        Some(path) => {
                            self.spawn_reading_file(&mut files, &mut tailed, path, cancel.clone())
                        }
                        None => break,
                    }
                },
                _ = cancel.cancelled() => break,
            }
        }

        // Let every per-file tailer observe cancellation and close its file.
        while files.join_next().await.is_some() {}
        Ok(())
    }

    fn spawn_reading_file(
        self: &Arc<Self>,
        files: &mut JoinSet<()>,
        tailed: &mut HashSet<PathBuf>,
        path: PathBuf,
        cancel: CancellationToken,
    ) {
        // A recreated file already has a tailer following it; a second one
        // would publish every line twice.
        if !tailed.insert(path.clone()) {
            return;
        }
        let fwd = self.clone();
        files.spawn(async move {
            if let Err(e) = fwd.run_reading_file(&path, cancel).await {
                error!(file = ?path, error = %e, "reading file stream failed");
            }
        });
    }

    /// Tail one per-meter reading file: each valid line registers its meter
    /// and is forwarded verbatim as a decrypted event.
    async fn run_reading_file(&self, path: &Path, cancel: CancellationToken) -> Result<()> {
        self.rotator.register(path);

        let store = SeekStore::open(&self.config.seek_dir, path)?;
        let start = bounded_position(path, store.load());
        let mut tailer = Tailer::open(path, start)?;
        let mut poll = poll_timer(self.config.poll_interval);

        loop {
            select! {
                _ = poll.tick() => {
                    for event in tailer.read_lines()? {
                        store.store(&event.position);
                        let Some(reading) = reading::extract(&event.text) else {
                            continue;
                        };
                        debug!(meter_id = %reading.id, name = %reading.name, "got meter reading");
                        // Device type is only known for the hub
                        let device = Device::new(reading.id.clone(), reading.name.clone(), "");
                        if let Err(e) = self.registry.add_idempotent(device).await {
                            warn!(device_id = %reading.id, error = %e, "unable to announce meter");
                        }
                        if let Err(e) = self
                            .gateway
                            .publish(&reading.id, DECRYPTED_SERVICE, reading.raw.as_bytes())
                            .await
                        {
                            error!(service = DECRYPTED_SERVICE, error = %e, "unable to publish event");
                        }
                    }
                },
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }
}

fn poll_timer(period: Duration) -> tokio::time::Interval {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    timer
}
