// SPDX-License-Identifier: Apache-2.0

//! Multi-line telegram assembly from the shared decoder log.
//!
//! The upstream decoder prints one telegram as a header line followed by a
//! handful of column-padded attribute lines and finally the raw frame on a
//! `telegram=|_...|` line. The parser accumulates attributes into a single
//! in-progress record and emits it when the frame line arrives; only the
//! frame line resets the accumulator. Lines that match no known prefix are
//! reported and skipped without disturbing the accumulator.

use serde::Serialize;
use tracing::{info, warn};

// Attribute prefixes exactly as the decoder pads them.
const METER_PREFIX: &str = "Received telegram from: ";
const MANUFACTURER_PREFIX: &str = "          manufacturer: ";
const TYPE_PREFIX: &str = "                  type: ";
const VERSION_PREFIX: &str = "                   ver: ";
const RSSI_PREFIX: &str = "                  rssi: ";
const DEVICE_PREFIX: &str = "                device: ";
const DRIVER_PREFIX: &str = "                driver: ";
const TELEGRAM_PREFIX: &str = "telegram=|_";
const TELEGRAM_SUFFIX: &str = "|";

/// One fully assembled telegram, ready to serialize for the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EncryptedTelegram {
    pub meter_id: String,
    pub manufacturer: String,
    pub device_type: String,
    pub version: String,
    pub rssi: f64,
    pub rssi_unit: String,
    pub device: String,
    pub driver: String,
    pub telegram: String,
}

/// Streaming assembler for telegrams.
///
/// Holds exactly one in-progress record containing the most recently seen
/// value for each attribute since the last emission.
#[derive(Debug, Default)]
pub struct TelegramParser {
    current: EncryptedTelegram,
}

impl TelegramParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one log line. Returns a completed telegram when the line is the
    /// closing frame line, `None` otherwise.
    pub fn handle_line(&mut self, line: &str) -> Option<EncryptedTelegram> {
        if let Some(rest) = line.strip_prefix(METER_PREFIX) {
            self.current.meter_id = rest.to_string();
        } else if let Some(rest) = line.strip_prefix(MANUFACTURER_PREFIX) {
            self.current.manufacturer = rest.to_string();
        } else if let Some(rest) = line.strip_prefix(TYPE_PREFIX) {
            self.current.device_type = rest.to_string();
        } else if let Some(rest) = line.strip_prefix(VERSION_PREFIX) {
            self.current.version = rest.to_string();
        } else if let Some(rest) = line.strip_prefix(RSSI_PREFIX) {
            self.set_rssi(rest);
        } else if let Some(rest) = line.strip_prefix(DEVICE_PREFIX) {
            self.current.device = rest.to_string();
        } else if let Some(rest) = line.strip_prefix(DRIVER_PREFIX) {
            self.current.driver = rest.to_string();
        } else if let Some(rest) = line.strip_prefix(TELEGRAM_PREFIX) {
            // The frame line always closes the current record, complete or
            // not, so a malformed telegram cannot wedge the parser.
            self.current.telegram = rest
                .split_once(TELEGRAM_SUFFIX)
                .map_or(rest, |(frame, _)| frame)
                .to_string();
            return Some(std::mem::take(&mut self.current));
        } else {
            info!(line, "unrecognized decoder line");
        }
        None
    }

    // The rssi attribute is "<value> <unit>", e.g. "-60.5 dBm".
    fn set_rssi(&mut self, rest: &str) {
        let mut parts = rest.split(' ');
        let value = parts.next().unwrap_or_default();
        match value.parse::<f64>() {
            Ok(v) => self.current.rssi = v,
            Err(e) => {
                warn!(value, error = %e, "unparsable rssi value");
                return;
            }
        }
        if let Some(unit) = parts.next() {
            self.current.rssi_unit = unit.to_string();
        }
    }
}
