// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, info};

use crate::forwarder::pipeline::{ForwarderConfig, LogForwarder};
use crate::forwarder::registry::DeviceRegistry;
use crate::forwarder::rotate::{LogRotator, RotationConfig};
use crate::gateway::{DebugGateway, Device, Gateway};
use crate::init::args::AgentRun;
use crate::init::wait;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Agent {
    config: Box<AgentRun>,
}

impl Agent {
    pub fn new(config: Box<AgentRun>) -> Self {
        Self { config }
    }

    /// Assemble the pipeline and run it until cancellation or a fatal error.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BoxError> {
        let config = self.config;

        info!("Starting wmbus-forwarder.");

        let gateway: Arc<dyn Gateway> = Arc::new(DebugGateway);
        let registry = Arc::new(DeviceRegistry::new(gateway.clone()));
        let rotator = LogRotator::new(RotationConfig {
            backup_dir: config.backup_dir.clone(),
            depth: config.backup_depth,
            interval: config.rotate_interval,
        });
        let forwarder = LogForwarder::new(
            ForwarderConfig {
                wmbus_log_file: config.wmbus_log_file.clone(),
                meter_readings_dir: config.meter_readings_dir.clone(),
                seek_dir: config.seek_dir.clone(),
                poll_interval: config.poll_interval,
                hub: Device::new(
                    config.hub_id.clone(),
                    config.hub_name.clone(),
                    config.hub_device_type_id.clone(),
                ),
            },
            gateway,
            registry.clone(),
            rotator.clone(),
        );

        let mut tasks: JoinSet<Result<(), BoxError>> = JoinSet::new();
        {
            let cancel = cancel.clone();
            tasks.spawn(async move { forwarder.run(cancel).await.map_err(Into::into) });
        }
        {
            let cancel = cancel.clone();
            tasks.spawn(async move {
                rotator.run(cancel).await;
                Ok(())
            });
        }
        {
            let cancel = cancel.clone();
            let refresh_interval = config.refresh_interval;
            tasks.spawn(async move {
                refresh_loop(registry, refresh_interval, cancel).await;
                Ok(())
            });
        }

        // The first task to finish decides the outcome; the rest are wound
        // down behind it.
        let result = wait::wait_for_any_task(&mut tasks).await;
        cancel.cancel();
        wait::wait_for_tasks_with_timeout(&mut tasks, DRAIN_TIMEOUT).await?;

        result
    }
}

/// Periodically re-announce every known device, so a gateway that restarted
/// (or missed an announce) converges back to the full device set.
async fn refresh_loop(
    registry: Arc<DeviceRegistry>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    timer.tick().await; // skip the immediate first tick

    loop {
        select! {
            _ = timer.tick() => {
                debug!("refreshing devices at the gateway");
                registry.refresh().await;
            },
            _ = cancel.cancelled() => return,
        }
    }
}
