//! atomlink common library
//!
//! Shared value types and utilities for the atomlink node:
//!
//! - [`status`] - Station link status and info records (`ConnectionStatus`, `ConnectionInfo`)
//! - [`telemetry`] - Telemetry samples and media payloads
//! - [`statistics`] - Message bridge statistics snapshot
//! - [`serialization`] - JSON/CBOR encoding and decoding
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`session`] - Zenoh session management
//! - [`error`] - Error taxonomy

pub mod config;
pub mod error;
pub mod serialization;
pub mod session;
pub mod statistics;
pub mod status;
pub mod telemetry;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, ZenohConfig, load_config, parse_config};
pub use error::{Error, ErrorKind, Result};
pub use serialization::{Format, decode, decode_auto, encode};
pub use session::connect;
pub use statistics::BridgeStatistics;
pub use status::{AccessPointRecord, AuthMode, ConnectionInfo, ConnectionStatus, IpInfo};
pub use telemetry::{
    Covariance, MediaPayload, Quaternion, TelemetrySample, Vector3, current_timestamp_millis,
    current_timestamp_nanos,
};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
