// SPDX-License-Identifier: Apache-2.0

//! Ingestion pipeline for the wmbusmeters daemon's log output.
//!
//! Two flows run side by side: the shared decoder log is tailed and parsed
//! into encrypted telegrams, and the per-meter readings directory is watched
//! so each reading file gets its own tailer. Both flows persist seek
//! positions, share one rotation timer, and forward everything they decode
//! through the gateway boundary.

pub mod error;
pub mod pipeline;
pub mod reading;
pub mod registry;
pub mod rotate;
pub mod seek;
pub mod tail;
pub mod telegram;
pub mod watch;

pub use error::{Error, Result};
pub use pipeline::{ForwarderConfig, LogForwarder};
