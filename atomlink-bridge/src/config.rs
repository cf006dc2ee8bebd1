//! Message bridge configuration.

use serde::{Deserialize, Serialize};

use atomlink_common::{Error, Result};

/// Settings for [`MessageBridge::init`](crate::MessageBridge::init).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Node name announced by the transport.
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Key expression telemetry samples are published on.
    #[serde(default = "default_telemetry_topic")]
    pub telemetry_topic: String,

    /// Key expression media payloads arrive on.
    #[serde(default = "default_media_topic")]
    pub media_topic: String,

    /// Publish task cadence in Hz.
    #[serde(default = "default_publish_rate_hz")]
    pub publish_rate_hz: u32,

    /// Delay before the one-shot handshake timer fires, in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u32,

    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Subscribe task cadence in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u32,
}

fn default_node_name() -> String {
    "m5atom_test_node".to_string()
}

fn default_telemetry_topic() -> String {
    "m5atom/imu".to_string()
}

fn default_media_topic() -> String {
    "video_frames".to_string()
}

fn default_publish_rate_hz() -> u32 {
    10
}

fn default_connection_timeout_ms() -> u32 {
    30_000
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_poll_interval_ms() -> u32 {
    100
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            telemetry_topic: default_telemetry_topic(),
            media_topic: default_media_topic(),
            publish_rate_hz: default_publish_rate_hz(),
            connection_timeout_ms: default_connection_timeout_ms(),
            auto_reconnect: default_auto_reconnect(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.node_name.is_empty() {
            return Err(Error::invalid_argument("node_name must not be empty"));
        }
        if self.telemetry_topic.is_empty() {
            return Err(Error::invalid_argument("telemetry_topic must not be empty"));
        }
        if self.media_topic.is_empty() {
            return Err(Error::invalid_argument("media_topic must not be empty"));
        }
        if self.publish_rate_hz == 0 {
            return Err(Error::invalid_argument(
                "publish_rate_hz must be greater than 0",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::invalid_argument(
                "poll_interval_ms must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Publish task period derived from the rate.
    pub fn publish_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(u64::from(1000 / self.publish_rate_hz.max(1)).max(1))
    }
}
