// SPDX-License-Identifier: Apache-2.0

use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Args, Clone)]
pub struct AgentRun {
    /// Log file written by wmbusmeters
    #[arg(
        long,
        env = "WMBUS_LOG_FILE",
        default_value = "/logs/wmbusmeters.log"
    )]
    pub wmbus_log_file: PathBuf,

    /// Directory wmbusmeters writes per-meter reading files into
    #[arg(
        long,
        env = "WMBUS_METER_READINGS_DIR",
        default_value = "/logs/meter_readings"
    )]
    pub meter_readings_dir: PathBuf,

    /// Directory for persisted seek positions
    #[arg(long, env = "WMBUS_SEEK_DIR", default_value = "/logs/seeks")]
    pub seek_dir: PathBuf,

    /// Directory for rotated log backups
    #[arg(long, env = "WMBUS_LOG_BACKUP_DIR", default_value = "/logs/backups")]
    pub backup_dir: PathBuf,

    /// Number of rotated backups to keep per file
    #[arg(long, env = "WMBUS_LOG_BACKUPS", default_value = "2")]
    pub backup_depth: u32,

    /// Time between log rotation sweeps
    #[arg(
        long,
        env = "WMBUS_ROTATE_INTERVAL",
        default_value = "24h",
        value_parser = humantime::parse_duration
    )]
    pub rotate_interval: std::time::Duration,

    /// How often tailed files are polled for new lines
    #[arg(
        long,
        env = "WMBUS_POLL_INTERVAL",
        default_value = "250ms",
        value_parser = humantime::parse_duration
    )]
    pub poll_interval: std::time::Duration,

    /// How often known devices are re-announced to the gateway
    #[arg(
        long,
        env = "WMBUS_REFRESH_INTERVAL",
        default_value = "5m",
        value_parser = humantime::parse_duration
    )]
    pub refresh_interval: std::time::Duration,

    /// Device id for the hub all telegram events are attributed to
    #[arg(long, env = "WMBUS_HUB_ID", default_value = "nimbus")]
    pub hub_id: String,

    /// Display name of the hub device
    #[arg(long, env = "WMBUS_HUB_NAME", default_value = "nimbus")]
    pub hub_name: String,

    /// Device type id of the hub device
    #[arg(long, env = "WMBUS_HUB_DEVICE_TYPE_ID", default_value = "")]
    pub hub_device_type_id: String,
}
