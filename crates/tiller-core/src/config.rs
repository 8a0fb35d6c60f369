//! Centralized configuration for tiller.
//!
//! This module provides timing and capacity constants for the election
//! protocol, the broadcast bus, the RPC substrate, and the station's store
//! and delivery connections.

use std::time::Duration;

/// Election timing parameters.
///
/// The defaults follow the protocol's recommended values; tests construct
/// scaled-down copies so a full election round fits in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionConfig {
    /// How long a probe waits for an answer before claiming leadership.
    pub probe_timeout: Duration,
    /// How long a standby instance sleeps before probing again.
    pub poll_interval: Duration,
}

impl ElectionConfig {
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

    /// Worst-case latency between a leader dying ungracefully and some
    /// standby instance claiming leadership.
    pub fn worst_case_takeover(&self) -> Duration {
        self.probe_timeout + self.poll_interval
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        ElectionConfig {
            probe_timeout: Self::DEFAULT_PROBE_TIMEOUT,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Which mutual-exclusion strategy an instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElectionStrategy {
    /// Probe/claim over the broadcast bus with timeout-based liveness.
    Bus,
    /// Acquire the host's socket lease and hold it for the socket's lifetime.
    Lease,
}

impl ElectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElectionStrategy::Bus => "bus",
            ElectionStrategy::Lease => "lease",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bus" => Some(ElectionStrategy::Bus),
            "lease" => Some(ElectionStrategy::Lease),
            _ => None,
        }
    }
}

impl Default for ElectionStrategy {
    fn default() -> Self {
        ElectionStrategy::Bus
    }
}

impl std::fmt::Display for ElectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Broadcast bus capacities.
pub struct BusConfig;

impl BusConfig {
    /// Ring-buffer depth per subscription. Election traffic is a handful of
    /// small messages per round, so a lagging subscriber indicates a stalled
    /// task rather than sustained volume.
    pub const CAPACITY: usize = 64;
}

/// RPC substrate capacities.
pub struct RpcConfig;

impl RpcConfig {
    /// In-flight request buffer on the client-to-server channel.
    pub const REQUEST_BUFFER: usize = 32;
    /// Server-to-client frame buffer (carries the ready handshake).
    pub const FRAME_BUFFER: usize = 4;
}

/// Station store parameters.
pub struct StoreConfig;

impl StoreConfig {
    pub const DB_FILENAME: &'static str = "station.db";
    pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Delivery relay connection parameters.
pub struct DeliveryConfig;

impl DeliveryConfig {
    pub const SEND_TIMEOUT: Duration = Duration::from_secs(15);
    /// Pause between socket sessions so a dead relay is not hammered.
    pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);
    pub const MESSAGE_CONTENT_TYPE: &'static str = "application/octet-stream";
    /// Path segment for both posting (`POST /messages/{id}`) and
    /// subscribing (`GET /messages/{id}`, WebSocket upgrade).
    pub const MESSAGES_PATH: &'static str = "messages";
    /// Path segment for invite URLs handed to the other party.
    pub const JOIN_PATH: &'static str = "join";
}
