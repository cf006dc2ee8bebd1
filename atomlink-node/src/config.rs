//! Configuration for the node binary.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use atomlink_bridge::BridgeConfig;
use atomlink_common::{AccessPointRecord, Format, LoggingConfig, ZenohConfig};
use atomlink_net::{ConnectionConfig, LinkScript};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Load(#[from] atomlink_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Zenoh connection settings, used by the zenoh transport.
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Station link settings.
    #[serde(default)]
    pub wifi: ConnectionConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Which middleware the bridge talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process transport with simulated camera frames.
    #[default]
    Mock,
    Zenoh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,

    /// Wire format for the zenoh transport.
    #[serde(default = "default_format")]
    pub format: Format,

    /// Simulated handshake duration for the mock transport.
    #[serde(default = "default_handshake_delay_ms")]
    pub mock_handshake_delay_ms: u64,

    /// Polls between simulated frames for the mock transport; 0 disables them.
    #[serde(default = "default_mock_arrival_every")]
    pub mock_arrival_every: u32,

    /// Accept injected payloads.
    #[serde(default)]
    pub mock_mode: bool,
}

fn default_format() -> Format {
    Format::Cbor
}

fn default_handshake_delay_ms() -> u64 {
    1000
}

fn default_mock_arrival_every() -> u32 {
    50
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            format: default_format(),
            mock_handshake_delay_ms: default_handshake_delay_ms(),
            mock_arrival_every: default_mock_arrival_every(),
            mock_mode: false,
        }
    }
}

/// IMU sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Samples per second.
    #[serde(default = "default_sample_rate_hz")]
    pub rate_hz: u32,

    /// Frame label stamped on every sample.
    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    /// Read attempts per sample.
    #[serde(default = "default_read_attempts")]
    pub read_attempts: u32,

    /// Pause between failed reads, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_sample_rate_hz() -> u32 {
    10
}

fn default_frame_id() -> String {
    "m5atom_imu".to_string()
}

fn default_read_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    50
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_sample_rate_hz(),
            frame_id: default_frame_id(),
            read_attempts: default_read_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Period of the statistics report and link checks, in seconds.
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

fn default_report_interval_secs() -> u64 {
    10
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

/// Behaviour of the simulated hardware.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub link: LinkSimulation,

    #[serde(default)]
    pub imu: ImuSimulation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkSimulation {
    #[serde(default)]
    pub script: LinkScript,

    /// Delay applied to every link event, in milliseconds.
    #[serde(default)]
    pub latency_ms: u64,

    /// Access points reported by scans.
    #[serde(default)]
    pub networks: Vec<AccessPointRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImuSimulation {
    /// Yaw rate of the simulated board, in degrees per second.
    #[serde(default = "default_yaw_rate")]
    pub yaw_rate_deg_s: f32,

    /// Fail every Nth read; 0 never fails.
    #[serde(default)]
    pub fail_every: u32,
}

fn default_yaw_rate() -> f32 {
    30.0
}

impl Default for ImuSimulation {
    fn default() -> Self {
        Self {
            yaw_rate_deg_s: default_yaw_rate(),
            fail_every: 0,
        }
    }
}

impl NodeConfig {
    /// Load configuration from a JSON5 file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: NodeConfig = atomlink_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.wifi
            .validate()
            .map_err(|e| ConfigError::Validation(format!("wifi: {}", e)))?;
        self.bridge
            .validate()
            .map_err(|e| ConfigError::Validation(format!("bridge: {}", e)))?;

        if self.sampler.rate_hz == 0 {
            return Err(ConfigError::Validation(
                "sampler.rate_hz must be > 0".to_string(),
            ));
        }
        if self.sampler.read_attempts == 0 {
            return Err(ConfigError::Validation(
                "sampler.read_attempts must be > 0".to_string(),
            ));
        }
        if self.supervisor.report_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "supervisor.report_interval_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: NodeConfig = json5::from_str("{}").unwrap();
        config.validate().unwrap();

        assert_eq!(config.wifi.ssid, "ros2_atom_ap");
        assert_eq!(config.wifi.max_retry, 5);
        assert_eq!(config.bridge.node_name, "m5atom_test_node");
        assert_eq!(config.transport.kind, TransportKind::Mock);
        assert_eq!(config.transport.format, Format::Cbor);
        assert_eq!(config.sampler.read_attempts, 3);
        assert_eq!(config.simulation.link.script, LinkScript::Associate { drops_before: 0 });
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            logging: { level: "debug", format: "json" },
            zenoh: { mode: "client", connect: ["tcp/192.168.4.1:7447"] },
            wifi: { ssid: "net-A", password: "secret", max_retry: 3, timeout_ms: 5000 },
            bridge: { publish_rate_hz: 20, connection_timeout_ms: 2000 },
            transport: { kind: "zenoh", format: "json" },
            sampler: { rate_hz: 20, frame_id: "imu_link" },
            supervisor: { report_interval_secs: 5 },
            simulation: {
                link: {
                    script: { mode: "associate", drops_before: 2 },
                    latency_ms: 20,
                    networks: [
                        { ssid: "net-A", bssid: [36, 10, 196, 0, 0, 1], channel: 6, rssi: -50 },
                    ],
                },
                imu: { yaw_rate_deg_s: 90.0, fail_every: 7 },
            },
        }"#;

        let config: NodeConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.wifi.ssid, "net-A");
        assert_eq!(config.wifi.timeout_ms, 5000);
        assert_eq!(config.bridge.publish_rate_hz, 20);
        assert_eq!(config.transport.kind, TransportKind::Zenoh);
        assert_eq!(config.transport.format, Format::Json);
        assert_eq!(config.sampler.frame_id, "imu_link");
        assert_eq!(config.simulation.link.networks.len(), 1);
        assert_eq!(config.simulation.imu.fail_every, 7);
    }

    #[test]
    fn test_validate_bad_wifi() {
        let json = r#"{ wifi: { ssid: "" } }"#;
        let config: NodeConfig = json5::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_zero_sample_rate() {
        let json = r#"{ sampler: { rate_hz: 0 } }"#;
        let config: NodeConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = NodeConfig::load("/nonexistent/atomlink.json5");
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
