// SPDX-License-Identifier: Apache-2.0

//! Library portion of the wmbus-forwarder agent.
//!
//! The agent tails the output of a wireless-metering daemon, reconstructs
//! structured readings from it, and forwards them as events to a device
//! gateway. See the `forwarder` module for the ingestion pipeline and the
//! `gateway` module for the delivery boundary.

pub mod bounded_channel;
pub mod forwarder;
pub mod gateway;
pub mod init;
