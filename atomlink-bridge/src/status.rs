//! Bridge status reporting.

use serde::{Deserialize, Serialize};

use atomlink_common::BridgeStatistics;

/// Message bridge status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    #[default]
    Disconnected,
    /// Started, waiting for the handshake timer.
    Connecting,
    Connected,
    /// Draining the telemetry queue; reverts to `Connected`.
    Publishing,
    /// Polling for inbound media; reverts to `Connected`.
    Subscribing,
    /// The handshake failed. Left by `retry_handshake` or `stop`.
    Error,
    TimedOut,
}

impl BridgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeStatus::Disconnected => "disconnected",
            BridgeStatus::Connecting => "connecting",
            BridgeStatus::Connected => "connected",
            BridgeStatus::Publishing => "publishing",
            BridgeStatus::Subscribing => "subscribing",
            BridgeStatus::Error => "error",
            BridgeStatus::TimedOut => "timed_out",
        }
    }

    /// `Connected`, `Publishing` or `Subscribing`.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            BridgeStatus::Connected | BridgeStatus::Publishing | BridgeStatus::Subscribing
        )
    }
}

impl std::fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time report of a bridge, suitable for logging as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    /// Node name from the active config.
    pub node: String,
    /// Crate version.
    pub version: String,
    pub status: BridgeStatus,
    pub mock_mode: bool,
    pub statistics: BridgeStatistics,
    /// Milliseconds since the last successful delivery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_publish_ms_ago: Option<u64>,
}

impl StatusReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"status\":\"{}\"}}", self.status))
    }
}
