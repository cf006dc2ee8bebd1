//! Station link status and information records.
//!
//! These are plain values handed out by the connection manager. They are
//! always copies; nothing here aliases live manager state.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Station-mode connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No association and no attempt in progress.
    #[default]
    Disconnected,
    /// Association in progress (including automatic retries).
    Connecting,
    /// Associated and an address has been assigned.
    Connected,
    /// Retry budget exhausted.
    Failed,
    /// The blocking connect wait ran out before a verdict.
    TimedOut,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
            ConnectionStatus::TimedOut => "timed_out",
        }
    }

    /// `Failed` and `TimedOut` are only left by a new `connect` call.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::Failed | ConnectionStatus::TimedOut)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addressing assigned to the station interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    pub address: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

/// Access point authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    #[default]
    Wpa2Psk,
    Wpa3Psk,
}

/// One access point as seen by a scan or by the current association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointRecord {
    pub ssid: String,
    pub bssid: [u8; 6],
    pub channel: u8,
    /// Signal strength in dBm.
    pub rssi: i8,
    #[serde(default)]
    pub auth_mode: AuthMode,
}

impl AccessPointRecord {
    /// Format the BSSID as `aa:bb:cc:dd:ee:ff`.
    pub fn bssid_string(&self) -> String {
        self.bssid
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// Snapshot of the station connection.
///
/// Link-level fields are only populated while `status` is `Connected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConnectionInfo {
    pub status: ConnectionStatus,
    pub ssid: String,
    /// Signal strength in dBm.
    pub rssi: i8,
    pub channel: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netmask: Option<Ipv4Addr>,
    /// Time spent in `Connected` so far, in milliseconds.
    pub connected_ms: u64,
    pub retry_count: u8,
}

impl ConnectionInfo {
    /// Info carrying only the status and retry counter.
    pub fn bare(status: ConnectionStatus, retry_count: u8) -> Self {
        Self {
            status,
            retry_count,
            ..Self::default()
        }
    }
}
