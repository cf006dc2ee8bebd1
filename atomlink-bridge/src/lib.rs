//! atomlink message bridge
//!
//! Relays telemetry samples out and media payloads in over a pluggable
//! middleware transport.
//!
//! # Overview
//!
//! - [`MessageBridge`] owns a bounded telemetry queue, a publish task, a
//!   subscribe task and a one-shot handshake timer
//! - [`Transport`] is the middleware seam, implemented by [`MockTransport`]
//!   and [`ZenohTransport`]
//! - [`BridgeConfig`] carries topics, rates and timeouts
//! - [`BridgeStatus`] and [`StatusReport`] describe the bridge state
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use atomlink_bridge::{BridgeConfig, MessageBridge, MockTransport};
//!
//! let bridge = MessageBridge::new(Arc::new(MockTransport::new()));
//! bridge.set_payload_callback(|frame| tracing::info!(len = frame.len(), "frame"));
//! bridge.init(&BridgeConfig::default())?;
//! bridge.start()?;
//! bridge.publish_telemetry(sample).await?;
//! ```

mod bridge;
mod config;
mod counters;
mod mock;
mod status;
mod transport;
mod zenoh_transport;

pub use bridge::{
    ENQUEUE_TIMEOUT, ErrorCallback, LinkMonitor, MessageBridge, PayloadCallback, QUEUE_CAPACITY,
    StatusCallback,
};
pub use config::BridgeConfig;
pub use counters::BridgeCounters;
pub use mock::{MOCK_FRAME_LEN, MockTransport};
pub use status::{BridgeStatus, StatusReport};
pub use transport::Transport;
pub use zenoh_transport::ZenohTransport;

// Re-export commonly used types from atomlink-common
pub use atomlink_common::{
    BridgeStatistics, ErrorKind, Format, MediaPayload, TelemetrySample, ZenohConfig,
};
